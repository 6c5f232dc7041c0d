//! Write stage: persists features into a sink.
//!
//! Per feature the stage normalizes the type name, synchronizes the type's
//! schema the first time the type is seen, picks the type's write handle from
//! a bounded pool, drops features with an empty geometry collection and
//! appends the rest as single rows. The feature is handed back for later
//! stages.

use crate::io::sink::{
    open_sink, ConnectionParams, Sink, SinkError, SinkOpenFn, WriteHandle, DEFAULT_MAX_CONNECTIONS,
    MAX_CONNECTIONS,
};
use flk_sdk::{Action, Feature};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub mod error;
pub mod guard;
pub mod normalize;
pub mod pool;
pub mod schema_sync;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{Result, WriteError};
pub use guard::GeometryGuard;
pub use normalize::TypeNameNormalizer;
pub use pool::WriterPool;
pub use schema_sync::SchemaSynchronizer;

/// Counters of one write stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStats {
    pub features_written: usize,
    pub features_skipped: usize,
    pub fallback_writes: usize,
    pub evictions: usize,
    pub types_synchronized: usize,
}

enum WriterState {
    /// Opening the sink failed; the cause is reported on first use
    Uninitialized(SinkError),
    Ready(Box<dyn Sink>),
    Closed,
}

/// Pipeline action writing features into a file or relational sink
pub struct SinkWriter {
    params: ConnectionParams,
    open: SinkOpenFn,
    state: WriterState,
    normalizer: TypeNameNormalizer,
    schema: SchemaSynchronizer,
    pool: WriterPool,
    guard: GeometryGuard,
    stats: WriteStats,
}

impl SinkWriter {
    /// Writer that drops existing tables and never appends
    pub fn new(params: ConnectionParams) -> Self {
        Self::with_options(params, false, true)
    }

    pub fn with_options(params: ConnectionParams, append: bool, drop_first: bool) -> Self {
        Self::with_opener(params, append, drop_first, Box::new(open_sink))
    }

    /// Build with a custom sink opener
    /// An invalid `max connections` value or a failing opener leaves the writer
    /// uninitialized; `execute` then reports the cause
    pub fn with_opener(
        mut params: ConnectionParams,
        append: bool,
        drop_first: bool,
        open: SinkOpenFn,
    ) -> Self {
        if !params.contains_key(MAX_CONNECTIONS) {
            params.insert(MAX_CONNECTIONS, DEFAULT_MAX_CONNECTIONS.to_string());
        }

        let (state, max_handles) = match params.max_connections() {
            Ok(max_handles) => match open(&params) {
                Ok(sink) => (WriterState::Ready(sink), max_handles),
                Err(e) => (WriterState::Uninitialized(e), max_handles),
            },
            Err(e) => (WriterState::Uninitialized(e), DEFAULT_MAX_CONNECTIONS),
        };

        Self {
            params,
            open,
            state,
            normalizer: TypeNameNormalizer::new(),
            schema: SchemaSynchronizer::new(drop_first, append),
            pool: WriterPool::new(max_handles),
            guard: GeometryGuard,
            stats: WriteStats::default(),
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, WriterState::Ready(_))
    }

    pub fn stats(&self) -> WriteStats {
        WriteStats {
            evictions: self.pool.evictions(),
            types_synchronized: self.schema.synchronized(),
            ..self.stats.clone()
        }
    }

    /// Write one feature and hand it back with its normalized type name
    pub fn execute(&mut self, mut feature: Feature) -> Result<Feature> {
        let sink = match &mut self.state {
            WriterState::Ready(sink) => sink,
            WriterState::Uninitialized(cause) => {
                return Err(WriteError::Initialization {
                    params: self.params.to_string(),
                    cause: cause.to_string(),
                })
            }
            WriterState::Closed => return Err(WriteError::Closed),
        };

        let type_name = self.normalizer.normalize(feature.type_name());
        feature.set_type_name(type_name.as_str());

        self.schema
            .ensure(sink.as_mut(), &self.params, feature.descriptor())?;
        let handle = self
            .pool
            .writer_for(sink, &self.open, &self.params, &type_name)?;

        if self.guard.should_skip(&feature) {
            self.stats.features_skipped += 1;
            return Ok(feature);
        }

        match append(handle, &feature) {
            Ok(()) => {}
            Err(e @ WriteError::AttributeShapeMismatch { .. }) => return Err(e),
            Err(e) => {
                warn!(feature = %feature, error = %e, "write failed, retrying as plain write");
                append(handle, &feature)?;
                self.stats.fallback_writes += 1;
            }
        }
        self.stats.features_written += 1;
        Ok(feature)
    }

    /// Flush all handles and dispose the sink
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Ready(mut sink) => {
                self.pool.close_all(sink.as_mut())?;
                Ok(())
            }
            WriterState::Uninitialized(cause) => {
                let err = WriteError::Initialization {
                    params: self.params.to_string(),
                    cause: cause.to_string(),
                };
                self.state = WriterState::Uninitialized(cause);
                Err(err)
            }
            WriterState::Closed => Err(WriteError::Closed),
        }
    }
}

fn append(handle: &mut dyn WriteHandle, feature: &Feature) -> Result<()> {
    handle
        .append_row(feature.attributes())
        .map_err(|e| match e {
            SinkError::ShapeMismatch { attribute, detail } => WriteError::AttributeShapeMismatch {
                feature_id: feature.id().to_string(),
                type_name: feature.type_name().to_string(),
                detail: format!("attribute '{}': {}", attribute, detail),
            },
            other => WriteError::Sink(other),
        })
}

impl Action for SinkWriter {
    fn name(&self) -> &str {
        "datastore-writer"
    }

    fn execute(&mut self, feature: Feature) -> flk_sdk::Result<Feature> {
        Ok(SinkWriter::execute(self, feature)?)
    }

    fn close(&mut self) -> flk_sdk::Result<()> {
        Ok(SinkWriter::close(self)?)
    }
}

impl std::fmt::Display for SinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Write to datastore: {}", self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{self, Fault};
    use super::*;
    use flk_sdk::{AttributeKind, TypeDescriptor};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings<F: FnOnce()>(f: F) -> usize {
        let counter = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(counter.clone()));
        tracing::subscriber::with_default(subscriber, f);
        counter.load(Ordering::SeqCst)
    }

    fn descriptor(name: &str) -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new(name)
                .with_attribute("name", AttributeKind::String)
                .with_geometry("the_geom"),
        )
    }

    fn point() -> Value {
        json!({"type": "Point", "coordinates": [4.9, 52.4]})
    }

    fn feature(descriptor: &Arc<TypeDescriptor>, geometry: Value) -> Feature {
        let mut feature = Feature::new(descriptor.clone());
        feature.set_str("name", "segment");
        feature.set_value("the_geom", geometry);
        feature
    }

    fn mock_writer(backend: &mock::Shared, append: bool, drop_first: bool) -> SinkWriter {
        let params = ConnectionParams::new().with("dbtype", "mock");
        SinkWriter::with_opener(params, append, drop_first, mock::opener(backend))
    }

    fn position(backend: &mock::Shared, event: &str) -> usize {
        backend
            .borrow()
            .events
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("event {} not recorded", event))
    }

    #[test]
    fn test_execute_before_init_reports_cause() {
        let params = ConnectionParams::new()
            .with("dbtype", "sqlite")
            .with("database", "/readonly/out.db");
        let mut writer = SinkWriter::with_opener(
            params,
            false,
            true,
            mock::failing_opener("access denied to /readonly/out.db"),
        );
        assert!(!writer.is_ready());

        let err = writer
            .execute(feature(&descriptor("roads"), point()))
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, WriteError::Initialization { .. }));
        assert!(message.contains("database=/readonly/out.db"));
        assert!(message.contains("max connections=50"));
        assert!(message.contains("access denied to /readonly/out.db"));
    }

    #[test]
    fn test_invalid_pool_cap_reported_on_first_execute() {
        let backend = mock::backend(true);
        let params = ConnectionParams::new()
            .with("dbtype", "mock")
            .with(MAX_CONNECTIONS, "abc");
        let mut writer = SinkWriter::with_opener(params, false, true, mock::opener(&backend));

        assert!(!writer.is_ready());
        assert_eq!(backend.borrow().opens, 0);

        let err = writer
            .execute(feature(&descriptor("roads"), point()))
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, WriteError::Initialization { .. }));
        assert!(message.contains("max connections=abc"));
        assert!(message.contains("must be a positive integer"));
        assert!(matches!(writer.close(), Err(WriteError::Initialization { .. })));
    }

    #[test]
    fn test_type_name_normalized_before_sink_use() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);

        let out = writer
            .execute(feature(&descriptor("Road Segment"), point()))
            .unwrap();

        assert_eq!(out.type_name(), "Road_Segment");
        assert_eq!(mock::events_with(&backend, "create:"), vec!["create:Road_Segment"]);
        assert_eq!(mock::events_with(&backend, "handle:"), vec!["handle:Road_Segment@1"]);
    }

    #[test]
    fn test_schema_synchronized_once_per_type() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        let roads = descriptor("roads");

        for _ in 0..5 {
            writer.execute(feature(&roads, point())).unwrap();
        }

        assert_eq!(mock::events_with(&backend, "exists:").len(), 1);
        assert_eq!(mock::events_with(&backend, "create:").len(), 1);
        assert_eq!(mock::events_with(&backend, "row:").len(), 5);
        assert_eq!(writer.stats().types_synchronized, 1);
    }

    #[test]
    fn test_drop_first_recreates_existing_table() {
        let backend = mock::backend(true);
        backend.borrow_mut().tables.insert("Road_Segment".to_string(), 10);
        let mut writer = mock_writer(&backend, false, true);
        let roads = descriptor("Road Segment");

        for _ in 0..3 {
            writer.execute(feature(&roads, point())).unwrap();
        }

        let drop = position(&backend, "drop:Road_Segment");
        let create = position(&backend, "create:Road_Segment");
        let first_row = position(&backend, "row:Road_Segment");
        assert!(drop < create && create < first_row);
        assert_eq!(backend.borrow().tables["Road_Segment"], 3);
    }

    #[test]
    fn test_truncate_when_not_dropping_or_appending() {
        let backend = mock::backend(true);
        backend.borrow_mut().tables.insert("roads".to_string(), 10);
        let mut writer = mock_writer(&backend, false, false);
        let roads = descriptor("roads");

        writer.execute(feature(&roads, point())).unwrap();
        writer.execute(feature(&roads, point())).unwrap();

        assert!(position(&backend, "truncate:roads") < position(&backend, "row:roads"));
        assert!(mock::events_with(&backend, "create:").is_empty());
        assert_eq!(backend.borrow().tables["roads"], 2);
    }

    #[test]
    fn test_append_keeps_existing_rows() {
        let backend = mock::backend(true);
        backend.borrow_mut().tables.insert("roads".to_string(), 10);
        let mut writer = mock_writer(&backend, true, false);

        writer.execute(feature(&descriptor("roads"), point())).unwrap();

        assert!(mock::events_with(&backend, "truncate:").is_empty());
        assert!(mock::events_with(&backend, "drop:").is_empty());
        assert_eq!(backend.borrow().tables["roads"], 11);
    }

    #[test]
    fn test_non_structural_sink_skips_drop_and_truncate() {
        let backend = mock::backend(false);
        backend.borrow_mut().tables.insert("roads".to_string(), 10);
        let mut writer = mock_writer(&backend, false, false);

        writer.execute(feature(&descriptor("roads"), point())).unwrap();
        assert!(mock::events_with(&backend, "truncate:").is_empty());
        assert_eq!(backend.borrow().tables["roads"], 11);

        // Dropping falls back to recreating the schema
        let backend = mock::backend(false);
        backend.borrow_mut().tables.insert("roads".to_string(), 10);
        let mut writer = mock_writer(&backend, false, true);
        writer.execute(feature(&descriptor("roads"), point())).unwrap();
        assert!(mock::events_with(&backend, "drop:").is_empty());
        assert_eq!(mock::events_with(&backend, "create:"), vec!["create:roads"]);
        assert_eq!(backend.borrow().tables["roads"], 1);
    }

    #[test]
    fn test_eviction_closes_every_handle_and_reconnects() {
        let backend = mock::backend(true);
        let params = ConnectionParams::new()
            .with("dbtype", "mock")
            .with(MAX_CONNECTIONS, "2");
        let mut writer = SinkWriter::with_opener(params, false, true, mock::opener(&backend));

        for name in ["a", "b", "c"] {
            writer.execute(feature(&descriptor(name), point())).unwrap();
        }

        assert_eq!(mock::events_with(&backend, "close:a"), vec!["close:a"]);
        assert_eq!(mock::events_with(&backend, "close:b"), vec!["close:b"]);
        assert!(mock::events_with(&backend, "close:c").is_empty());

        let last_close = position(&backend, "close:a").max(position(&backend, "close:b"));
        let dispose = position(&backend, "dispose#1");
        let reopen = position(&backend, "open#2");
        let handle = position(&backend, "handle:c@2");
        assert!(last_close < dispose && dispose < reopen && reopen < handle);
        assert_eq!(writer.stats().evictions, 1);

        // Schema checks survive the eviction
        writer.execute(feature(&descriptor("a"), point())).unwrap();
        assert_eq!(mock::events_with(&backend, "exists:a").len(), 1);
        assert_eq!(mock::events_with(&backend, "handle:a@2").len(), 1);
    }

    #[test]
    fn test_empty_geometry_collection_is_skipped_with_one_warning() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        let roads = descriptor("roads");
        let empty = json!({"type": "GeometryCollection", "geometries": []});

        let warnings = count_warnings(|| {
            let out = writer.execute(feature(&roads, empty)).unwrap();
            assert_eq!(out.type_name(), "roads");
        });

        assert_eq!(warnings, 1);
        assert!(mock::events_with(&backend, "row:").is_empty());
        assert_eq!(writer.stats().features_skipped, 1);
    }

    #[test]
    fn test_missing_or_plain_geometry_is_written() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        let roads = descriptor("roads");

        writer.execute(feature(&roads, point())).unwrap();
        let mut without = Feature::new(roads.clone());
        without.set_str("name", "no geometry");
        writer.execute(without).unwrap();
        writer.execute(feature(&roads, Value::Null)).unwrap();

        assert_eq!(mock::events_with(&backend, "row:").len(), 3);
        assert_eq!(writer.stats().features_written, 3);
    }

    #[test]
    fn test_shape_mismatch_is_wrapped_not_retried() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        backend.borrow_mut().faults.push(Fault::Shape);

        let input = feature(&descriptor("Road Segment"), point()).with_id("feature-7");
        let err = writer.execute(input).unwrap_err();

        match &err {
            WriteError::AttributeShapeMismatch {
                feature_id,
                type_name,
                ..
            } => {
                assert_eq!(feature_id, "feature-7");
                assert_eq!(type_name, "Road_Segment");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("lanes"));
        assert!(mock::events_with(&backend, "row:").is_empty());
    }

    #[test]
    fn test_other_write_failure_falls_back_to_plain_write() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        backend.borrow_mut().faults.push(Fault::Io);

        writer.execute(feature(&descriptor("roads"), point())).unwrap();

        assert_eq!(mock::events_with(&backend, "row:roads").len(), 1);
        assert_eq!(writer.stats().fallback_writes, 1);

        backend.borrow_mut().faults.extend([Fault::Io, Fault::Io]);
        let err = writer
            .execute(feature(&descriptor("roads"), point()))
            .unwrap_err();
        assert!(matches!(err, WriteError::Sink(SinkError::Io(_))));
    }

    #[test]
    fn test_close_flushes_and_second_close_fails() {
        let backend = mock::backend(true);
        let mut writer = mock_writer(&backend, false, true);
        writer.execute(feature(&descriptor("a"), point())).unwrap();
        writer.execute(feature(&descriptor("b"), point())).unwrap();

        writer.close().unwrap();
        assert_eq!(mock::events_with(&backend, "close:").len(), 2);
        assert!(position(&backend, "close:a") < position(&backend, "dispose#1"));

        assert!(matches!(writer.close(), Err(WriteError::Closed)));
        assert!(matches!(
            writer.execute(feature(&descriptor("a"), point())),
            Err(WriteError::Closed)
        ));
    }

    #[test]
    fn test_action_passes_feature_through() {
        let backend = mock::backend(true);
        let mut action: Box<dyn Action> = Box::new(mock_writer(&backend, false, true));

        let input = feature(&descriptor("Road Segment"), point()).with_id("42");
        let out = action.execute(input).unwrap();

        assert_eq!(out.id(), "42");
        assert_eq!(out.type_name(), "Road_Segment");
        assert_eq!(out.get_str("name"), Some("segment"));
        assert_eq!(action.name(), "datastore-writer");
        action.close().unwrap();
    }
}
