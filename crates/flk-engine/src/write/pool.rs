use crate::io::sink::{
    ConnectionParams, Result, Sink, SinkError, SinkOpenFn, WriteHandle, WriteMode,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One open write handle per type, at most `max_handles` at a time
/// The cap comes from `ConnectionParams::max_connections`, which is always positive
pub struct WriterPool {
    handles: HashMap<String, Box<dyn WriteHandle>>,
    max_handles: usize,
    evictions: usize,
}

impl WriterPool {
    pub fn new(max_handles: usize) -> Self {
        Self {
            handles: HashMap::new(),
            max_handles,
            evictions: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handles.contains_key(type_name)
    }

    /// Number of flush-and-reopen cycles so far
    pub fn evictions(&self) -> usize {
        self.evictions
    }

    /// Get or open the handle for a type
    /// A full pool is flushed and the sink reopened before the new handle opens
    pub fn writer_for(
        &mut self,
        sink: &mut Box<dyn Sink>,
        open: &SinkOpenFn,
        params: &ConnectionParams,
        type_name: &str,
    ) -> Result<&mut dyn WriteHandle> {
        if !self.handles.contains_key(type_name) {
            if self.handles.len() + 1 > self.max_handles {
                self.evict(sink, open, params)?;
            }
            let handle = sink.open_write_handle(type_name, WriteMode::Append)?;
            debug!(type_name = %type_name, open_handles = self.handles.len() + 1, "opened write handle");
            self.handles.insert(type_name.to_string(), handle);
        }

        match self.handles.get_mut(type_name) {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(SinkError::UnknownType(type_name.to_string())),
        }
    }

    /// Close every handle and clear the pool
    /// All handles are closed even if one fails; the first failure is returned
    pub fn close_handles(&mut self) -> Result<usize> {
        let mut rows = 0;
        let mut first_error = None;
        for (type_name, handle) in self.handles.drain() {
            match handle.close() {
                Ok(n) => rows += n,
                Err(e) => {
                    warn!(type_name = %type_name, error = %e, "closing write handle failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(rows),
        }
    }

    /// Close every handle, then dispose the sink
    pub fn close_all(&mut self, sink: &mut dyn Sink) -> Result<usize> {
        let closed = self.close_handles();
        let disposed = sink.dispose();
        let rows = closed?;
        disposed?;
        Ok(rows)
    }

    fn evict(
        &mut self,
        sink: &mut Box<dyn Sink>,
        open: &SinkOpenFn,
        params: &ConnectionParams,
    ) -> Result<()> {
        let open_handles = self.handles.len();
        self.close_handles()?;
        sink.dispose()?;
        *sink = open(params)?;
        self.evictions += 1;
        warn!(
            open_handles,
            max_handles = self.max_handles,
            "closing all write handles (too many open), sink reopened"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::mock::{self, Fault};

    #[test]
    fn test_reuses_handle_per_type() {
        let backend = mock::backend(true);
        let open = mock::opener(&backend);
        let params = ConnectionParams::new();
        let mut sink = open(&params).unwrap();
        let mut pool = WriterPool::new(4);

        for _ in 0..3 {
            pool.writer_for(&mut sink, &open, &params, "roads").unwrap();
        }

        assert_eq!(pool.len(), 1);
        assert!(pool.contains("roads"));
        assert_eq!(mock::events_with(&backend, "handle:"), vec!["handle:roads@1"]);
    }

    #[test]
    fn test_single_slot_pool_evicts_per_new_type() {
        let backend = mock::backend(true);
        let open = mock::opener(&backend);
        let params = ConnectionParams::new();
        let mut sink = open(&params).unwrap();
        let mut pool = WriterPool::new(1);

        pool.writer_for(&mut sink, &open, &params, "roads").unwrap();
        pool.writer_for(&mut sink, &open, &params, "roads").unwrap();
        assert_eq!(pool.evictions(), 0);

        pool.writer_for(&mut sink, &open, &params, "rivers").unwrap();

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.evictions(), 1);
        assert_eq!(mock::events_with(&backend, "handle:rivers"), vec!["handle:rivers@2"]);
    }

    #[test]
    fn test_close_all_disposes_after_handles() {
        let backend = mock::backend(true);
        let open = mock::opener(&backend);
        let params = ConnectionParams::new();
        let mut sink = open(&params).unwrap();
        let mut pool = WriterPool::new(4);

        pool.writer_for(&mut sink, &open, &params, "roads")
            .unwrap()
            .append_row(&serde_json::Map::new())
            .unwrap();
        pool.writer_for(&mut sink, &open, &params, "rivers").unwrap();

        let rows = pool.close_all(sink.as_mut()).unwrap();

        assert_eq!(rows, 1);
        assert!(pool.is_empty());
        let events = backend.borrow().events.clone();
        assert_eq!(events.last().map(String::as_str), Some("dispose#1"));
        assert_eq!(mock::events_with(&backend, "close:").len(), 2);
    }

    #[test]
    fn test_failed_close_still_closes_rest_and_disposes() {
        let backend = mock::backend(true);
        let open = mock::opener(&backend);
        let params = ConnectionParams::new();
        let mut sink = open(&params).unwrap();
        let mut pool = WriterPool::new(4);
        for name in ["roads", "rivers", "rails"] {
            pool.writer_for(&mut sink, &open, &params, name).unwrap();
        }
        backend.borrow_mut().faults.extend([Fault::Close, Fault::Close]);

        let err = pool.close_all(sink.as_mut()).unwrap_err();

        let closes = mock::events_with(&backend, "close:");
        assert_eq!(closes.len(), 3);
        // The first handle to fail is the one reported
        let first = closes[0].trim_start_matches("close:");
        assert!(err.to_string().contains(&format!("flushing {} failed", first)));
        assert!(pool.is_empty());
        let events = backend.borrow().events.clone();
        assert_eq!(events.last().map(String::as_str), Some("dispose#1"));
    }
}
