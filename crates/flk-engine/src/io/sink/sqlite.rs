//! SQLite sink.
//!
//! Relational store with structural schema control. Geometry columns hold
//! GeoJSON text and are registered in a `geometry_columns` catalog table.
//! Every write handle opens its own connection to the database file.

use super::{
    quote_ident, ConnectionParams, Result, Sink, SinkError, StructuralOps, WriteHandle, WriteMode,
};
use flk_sdk::{AttributeDescriptor, AttributeKind, TypeDescriptor};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use tracing::{debug, info};

const GEOMETRY_CATALOG: &str = "geometry_columns";

/// SQLite database connection
pub struct SqliteStore {
    path: String,
    srid: i64,
    conn: Option<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("disposed", &self.conn.is_none())
            .finish()
    }
}

impl SqliteStore {
    /// Open the database named by `database`, creating the geometry catalog if missing
    ///
    /// `srid` (optional) is recorded for geometry columns created through this store.
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let path = params
            .get("database")
            .ok_or_else(|| SinkError::InvalidParams("sqlite needs a 'database' parameter".to_string()))?;
        if path == ":memory:" {
            // Write handles open their own connections and would not see the tables
            return Err(SinkError::InvalidParams(
                "sqlite sink needs a database file, not ':memory:'".to_string(),
            ));
        }
        let srid = match params.get("srid") {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| SinkError::InvalidParams(format!("invalid srid '{}'", raw)))?,
            None => 0,
        };

        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                f_table_name TEXT NOT NULL,
                f_geometry_column TEXT NOT NULL,
                geometry_type TEXT NOT NULL,
                srid INTEGER NOT NULL,
                PRIMARY KEY (f_table_name, f_geometry_column)
            )",
            GEOMETRY_CATALOG
        ))?;

        Ok(Self {
            path: path.to_string(),
            srid,
            conn: Some(conn),
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(SinkError::Disposed)
    }

    /// Read a table's descriptor from its columns and the geometry catalog
    pub fn describe(&self, name: &str) -> Result<TypeDescriptor> {
        describe_table(self.conn()?, name)
    }

    /// Number of rows in a table
    pub fn row_count(&self, name: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            &format!("SELECT count(*) FROM {}", quote_ident(name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl Sink for SqliteStore {
    fn type_names(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> ?1
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([GEOMETRY_CATALOG], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_schema(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        if self.table_exists(&descriptor.name)? {
            self.drop_table(&descriptor.name)?;
        }

        let columns: Vec<String> = descriptor
            .attributes
            .iter()
            .map(|attr| format!("{} {}", quote_ident(&attr.name), sql_type(attr.kind)))
            .collect();
        let table = quote_ident(&descriptor.name);

        let conn = self.conn()?;
        conn.execute_batch(&format!("CREATE TABLE {} ({})", table, columns.join(", ")))?;
        if let Some(geometry) = &descriptor.geometry_field {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} (f_table_name, f_geometry_column, geometry_type, srid)
                     VALUES (?1, ?2, 'GEOMETRY', ?3)",
                    GEOMETRY_CATALOG
                ),
                params![descriptor.name, geometry, self.srid],
            )?;
        }
        debug!(table = %descriptor.name, columns = columns.len(), "table created");
        Ok(())
    }

    fn structural(&mut self) -> Option<&mut dyn StructuralOps> {
        Some(self)
    }

    fn open_write_handle(&mut self, name: &str, mode: WriteMode) -> Result<Box<dyn WriteHandle>> {
        // Checked on the store connection so a disposed store cannot hand out handles
        let descriptor = self.describe(name)?;
        let conn = Connection::open(&self.path)?;
        if mode == WriteMode::Overwrite {
            conn.execute(&format!("DELETE FROM {}", quote_ident(name)), [])?;
        }
        Ok(Box::new(SqliteHandle::new(conn, descriptor)))
    }

    fn dispose(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(SinkError::Disposed)?;
        conn.close().map_err(|(_, e)| SinkError::Sqlite(e))
    }
}

impl StructuralOps for SqliteStore {
    fn drop_table(&mut self, name: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
        conn.execute(
            &format!("DELETE FROM {} WHERE f_table_name = ?1", GEOMETRY_CATALOG),
            [name],
        )?;
        info!(table = %name, "dropped table");
        Ok(())
    }

    fn truncate_table(&mut self, name: &str) -> Result<()> {
        let removed = self
            .conn()?
            .execute(&format!("DELETE FROM {}", quote_ident(name)), [])?;
        info!(table = %name, rows = removed, "emptied table");
        Ok(())
    }
}

/// Write handle holding its own connection; every row is committed on insert
pub struct SqliteHandle {
    conn: Connection,
    descriptor: TypeDescriptor,
    insert_sql: String,
    rows_written: usize,
}

impl SqliteHandle {
    fn new(conn: Connection, descriptor: TypeDescriptor) -> Self {
        let columns: Vec<String> = descriptor
            .attributes
            .iter()
            .map(|a| quote_ident(&a.name))
            .collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&descriptor.name),
            columns.join(", "),
            placeholders.join(", ")
        );
        Self {
            conn,
            descriptor,
            insert_sql,
            rows_written: 0,
        }
    }
}

impl WriteHandle for SqliteHandle {
    fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    fn append_row(&mut self, attributes: &Map<String, Value>) -> Result<()> {
        self.descriptor.check(attributes)?;

        let values: Vec<SqlValue> = self
            .descriptor
            .attributes
            .iter()
            .map(|attr| sql_value(attr, attributes.get(&attr.name)))
            .collect();

        let mut stmt = self.conn.prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(values))?;
        self.rows_written += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<usize> {
        let rows = self.rows_written;
        self.conn.close().map_err(|(_, e)| SinkError::Sqlite(e))?;
        Ok(rows)
    }
}

fn sql_type(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::String | AttributeKind::Geometry => "TEXT",
        AttributeKind::Integer => "INTEGER",
        AttributeKind::Float => "REAL",
        AttributeKind::Boolean => "BOOLEAN",
    }
}

fn kind_from_sql(decl: &str) -> AttributeKind {
    match decl.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => AttributeKind::Integer,
        "REAL" | "DOUBLE" | "FLOAT" => AttributeKind::Float,
        "BOOLEAN" | "BOOL" => AttributeKind::Boolean,
        _ => AttributeKind::String,
    }
}

fn sql_value(attr: &AttributeDescriptor, value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match (attr.kind, n.as_i64()) {
            (AttributeKind::Float, _) | (_, None) => SqlValue::Real(n.as_f64().unwrap_or_default()),
            (_, Some(i)) => SqlValue::Integer(i),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

fn describe_table(conn: &Connection, name: &str) -> Result<TypeDescriptor> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if columns.is_empty() {
        return Err(SinkError::UnknownType(name.to_string()));
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT f_geometry_column FROM {} WHERE f_table_name = ?1 ORDER BY f_geometry_column",
        GEOMETRY_CATALOG
    ))?;
    let geometry_columns = stmt
        .query_map([name], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut descriptor = TypeDescriptor::new(name);
    for (column, decl) in columns {
        let kind = if geometry_columns.contains(&column) {
            AttributeKind::Geometry
        } else {
            kind_from_sql(&decl)
        };
        descriptor
            .attributes
            .push(AttributeDescriptor::new(column, kind));
    }
    descriptor.geometry_field = geometry_columns.into_iter().next();
    Ok(descriptor)
}
