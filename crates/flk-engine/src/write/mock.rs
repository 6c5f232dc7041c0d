//! Recording sink for write stage tests.

use crate::io::sink::{
    ConnectionParams, Result, Sink, SinkError, SinkOpenFn, StructuralOps, WriteHandle, WriteMode,
};
use flk_sdk::TypeDescriptor;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Failure injected into the next `append_row`, or into the next `close` for `Close`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Io,
    Shape,
    Close,
}

/// State shared by every connection opened from one backend
#[derive(Default)]
pub struct Backend {
    pub events: Vec<String>,
    pub tables: BTreeMap<String, usize>,
    pub opens: usize,
    pub structural: bool,
    pub faults: Vec<Fault>,
}

pub type Shared = Rc<RefCell<Backend>>;

pub fn backend(structural: bool) -> Shared {
    Rc::new(RefCell::new(Backend {
        structural,
        ..Backend::default()
    }))
}

/// Opener handing out connections to the shared backend
pub fn opener(backend: &Shared) -> SinkOpenFn {
    let backend = backend.clone();
    Box::new(move |_params: &ConnectionParams| -> Result<Box<dyn Sink>> {
        let id = {
            let mut b = backend.borrow_mut();
            b.opens += 1;
            let id = b.opens;
            b.events.push(format!("open#{}", id));
            id
        };
        Ok(Box::new(MockSink {
            id,
            backend: backend.clone(),
            disposed: false,
        }))
    })
}

/// Opener that always fails
pub fn failing_opener(message: &'static str) -> SinkOpenFn {
    Box::new(move |_params: &ConnectionParams| -> Result<Box<dyn Sink>> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            message,
        )))
    })
}

pub struct MockSink {
    id: usize,
    backend: Shared,
    disposed: bool,
}

impl MockSink {
    fn record(&self, event: String) -> Result<()> {
        if self.disposed {
            return Err(SinkError::Disposed);
        }
        self.backend.borrow_mut().events.push(event);
        Ok(())
    }
}

impl Sink for MockSink {
    fn type_names(&self) -> Result<Vec<String>> {
        Ok(self.backend.borrow().tables.keys().cloned().collect())
    }

    fn table_exists(&self, name: &str) -> Result<bool> {
        self.record(format!("exists:{}", name))?;
        Ok(self.backend.borrow().tables.contains_key(name))
    }

    fn create_schema(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        self.record(format!("create:{}", descriptor.name))?;
        self.backend
            .borrow_mut()
            .tables
            .insert(descriptor.name.clone(), 0);
        Ok(())
    }

    fn structural(&mut self) -> Option<&mut dyn StructuralOps> {
        if self.backend.borrow().structural {
            Some(self)
        } else {
            None
        }
    }

    fn open_write_handle(&mut self, name: &str, _mode: WriteMode) -> Result<Box<dyn WriteHandle>> {
        self.record(format!("handle:{}@{}", name, self.id))?;
        Ok(Box::new(MockHandle {
            name: name.to_string(),
            backend: self.backend.clone(),
            rows: 0,
        }))
    }

    fn dispose(&mut self) -> Result<()> {
        self.record(format!("dispose#{}", self.id))?;
        self.disposed = true;
        Ok(())
    }
}

impl StructuralOps for MockSink {
    fn drop_table(&mut self, name: &str) -> Result<()> {
        self.record(format!("drop:{}", name))?;
        self.backend.borrow_mut().tables.remove(name);
        Ok(())
    }

    fn truncate_table(&mut self, name: &str) -> Result<()> {
        self.record(format!("truncate:{}", name))?;
        if let Some(rows) = self.backend.borrow_mut().tables.get_mut(name) {
            *rows = 0;
        }
        Ok(())
    }
}

pub struct MockHandle {
    name: String,
    backend: Shared,
    rows: usize,
}

impl WriteHandle for MockHandle {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn append_row(&mut self, _attributes: &Map<String, Value>) -> Result<()> {
        let mut backend = self.backend.borrow_mut();
        if let Some(i) = backend.faults.iter().position(|f| *f != Fault::Close) {
            return match backend.faults.remove(i) {
                Fault::Shape => Err(SinkError::ShapeMismatch {
                    attribute: "lanes".to_string(),
                    detail: "expected integer, got string".to_string(),
                }),
                _ => Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "connection reset",
                ))),
            };
        }
        backend.events.push(format!("row:{}", self.name));
        *backend.tables.entry(self.name.clone()).or_insert(0) += 1;
        self.rows += 1;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<usize> {
        let mut backend = self.backend.borrow_mut();
        backend.events.push(format!("close:{}", self.name));
        if let Some(i) = backend.faults.iter().position(|f| *f == Fault::Close) {
            backend.faults.remove(i);
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("flushing {} failed", self.name),
            )));
        }
        Ok(self.rows)
    }
}

/// Events matching a prefix, in order
pub fn events_with(backend: &Shared, prefix: &str) -> Vec<String> {
    backend
        .borrow()
        .events
        .iter()
        .filter(|e| e.starts_with(prefix))
        .cloned()
        .collect()
}
