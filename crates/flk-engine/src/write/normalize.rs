use regex::Regex;

const RESERVED: &[&str] = &[
    "all", "alter", "and", "as", "by", "check", "column", "create", "default", "delete", "drop",
    "from", "group", "index", "insert", "into", "join", "key", "not", "null", "or", "order",
    "primary", "references", "select", "table", "union", "unique", "update", "where",
];

/// Turns raw type names into identifiers every bundled sink accepts
#[derive(Debug, Clone)]
pub struct TypeNameNormalizer {
    whitespace: Regex,
    invalid: Regex,
}

impl Default for TypeNameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeNameNormalizer {
    pub fn new() -> Self {
        Self {
            whitespace: Regex::new(r"\s").expect("static regex"),
            invalid: Regex::new(r"[^A-Za-z0-9_]").expect("static regex"),
        }
    }

    /// Whitespace becomes `_`, then identifier rules apply:
    /// other unsafe characters become `_`, a leading digit is prefixed with `_`
    /// and reserved words get a trailing `_`
    pub fn normalize(&self, raw: &str) -> String {
        let spaced = self.whitespace.replace_all(raw, "_");
        let mut name = self.invalid.replace_all(&spaced, "_").into_owned();

        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert(0, '_');
        }
        if RESERVED.contains(&name.to_ascii_lowercase().as_str()) {
            name.push('_');
        }
        name
    }
}
