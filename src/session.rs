//! Session: the process-wide entry point into an engine.
//!
//! A [`Session`] owns the engine behind one `parking_lot::Mutex`; every
//! handle method takes that lock for exactly one engine call and releases it
//! on return. The session also carries the state that must not live on the
//! handles themselves:
//!
//! - **suspend scopes**: while any [`SuspendGuard`] is alive, change events
//!   are queued instead of delivered. When the outermost guard ends they are
//!   deduplicated and sent once to the engine and to listeners.
//! - **soft cache**: array metadata (length, type, location) looked up while
//!   suspended is memoized in a side table keyed by [`ArrayKey`] and dropped
//!   on resume.
//! - **listeners** registered with [`Session::subscribe`].

use std::sync::Arc;

use itertools::Itertools;
use parking_lot::Mutex;

use crate::cache::MetaCache;
use crate::config::SessionConfig;
use crate::data::Dataset;
use crate::data_error::DataError;
use crate::engine::{ChangeEvent, Engine, InMemoryEngine};
use crate::handle::{ArrayKey, DatasetId};
use crate::types::{EngineVersion, ExecutionMode, Feature, Location, ValueType};

/// Metadata of an array that cannot change for the lifetime of its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArrayMeta {
    pub len: usize,
    pub value_type: ValueType,
    pub location: Location,
}

/// Registration token returned by [`Session::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct SessionState {
    suspend_depth: usize,
    pending: Vec<ChangeEvent>,
    cache: MetaCache,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

/// Owner of an engine and of the cross-handle state described in the module docs.
pub struct Session {
    engine: Mutex<Box<dyn Engine>>,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("suspended", &self.is_suspended())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session over a fresh [`InMemoryEngine`] built from `config`.
    pub fn new(config: SessionConfig) -> Self {
        let engine = InMemoryEngine::with_config(&config);
        Self::from_engine(Box::new(engine), config)
    }

    /// Session over a host-provided engine.
    pub fn from_engine(engine: Box<dyn Engine>, config: SessionConfig) -> Self {
        log::debug!(
            "session opened: {:?} mode, engine {}",
            engine.mode(),
            engine.version()
        );
        Self {
            engine: Mutex::new(engine),
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> ExecutionMode {
        self.with_engine(|e| e.mode())
    }

    pub fn version(&self) -> EngineVersion {
        self.with_engine(|e| e.version())
    }

    /// Run `f` with the engine lock held.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut dyn Engine) -> R) -> R {
        let mut engine = self.engine.lock();
        f(engine.as_mut())
    }

    /// Fail with `NotSupported` unless the engine provides `feature`.
    pub fn require(&self, feature: Feature) -> Result<(), DataError> {
        let found = self.version();
        let required = feature.required_version();
        if found < required {
            return Err(DataError::NotSupported {
                feature: feature.as_str(),
                required,
                found,
            });
        }
        Ok(())
    }

    pub fn create_dataset(&self, title: &str) -> Dataset<'_> {
        let id = self.with_engine(|e| e.create_dataset(title));
        Dataset::new(self, id)
    }

    /// Handle on an existing dataset.
    pub fn dataset(&self, id: DatasetId) -> Result<Dataset<'_>, DataError> {
        if self.with_engine(|e| e.dataset_ids()).contains(&id) {
            Ok(Dataset::new(self, id))
        } else {
            Err(DataError::DatasetNotFound(id))
        }
    }

    pub fn datasets(&self) -> Vec<Dataset<'_>> {
        self.with_engine(|e| e.dataset_ids())
            .into_iter()
            .map(|id| Dataset::new(self, id))
            .collect()
    }

    /// Destroy a dataset; every handle into it stops resolving.
    pub fn remove_dataset(&self, id: DatasetId) -> Result<(), DataError> {
        self.with_engine(|e| e.destroy_dataset(id))?;
        let mut state = self.state.lock();
        state.pending.retain(|ev| ev.dataset() != id);
        let deferred = state.suspend_depth > 0;
        state.cache.forget_dataset(id, deferred);
        Ok(())
    }

    /// Defer change notifications until the returned guard (and every other
    /// outstanding guard) is dropped or resumed.
    pub fn suspend(&self) -> SuspendGuard<'_> {
        let mut state = self.state.lock();
        state.suspend_depth += 1;
        log::trace!("suspend depth {}", state.suspend_depth);
        SuspendGuard {
            session: self,
            active: true,
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspend_depth > 0
    }

    /// Register a callback for every delivered change event.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(l, _)| *l != id);
        state.listeners.len() != before
    }

    /// Deliver `event` now, or queue it while suspended.
    pub(crate) fn emit(&self, event: ChangeEvent) {
        let listeners = {
            let mut state = self.state.lock();
            if state.suspend_depth > 0 {
                state.pending.push(event);
                return;
            }
            state.listeners.iter().map(|(_, l)| l.clone()).collect_vec()
        };
        self.deliver(&[event], &listeners);
    }

    fn deliver(&self, events: &[ChangeEvent], listeners: &[Listener]) {
        if events.is_empty() {
            return;
        }
        self.with_engine(|e| {
            for ev in events {
                e.notify(ev);
            }
        });
        for ev in events {
            for listener in listeners {
                listener(ev);
            }
        }
    }

    fn resume(&self) {
        let (events, listeners) = {
            let mut state = self.state.lock();
            state.suspend_depth = state.suspend_depth.saturating_sub(1);
            if state.suspend_depth > 0 {
                return;
            }
            let events = state.pending.drain(..).unique().collect_vec();
            let dropped = state.cache.run_invalidations();
            log::trace!("ran {dropped} cache invalidation(s)");
            let listeners = state.listeners.iter().map(|(_, l)| l.clone()).collect_vec();
            (events, listeners)
        };
        log::debug!("resumed; delivering {} deferred event(s)", events.len());
        self.deliver(&events, &listeners);
    }

    /// Length, type and location of an array; memoized while suspended.
    pub(crate) fn array_meta(&self, key: ArrayKey) -> Result<ArrayMeta, DataError> {
        if let Some(meta) = self.cached_meta(key) {
            return Ok(meta);
        }
        let info = self.with_engine(|e| e.array_info(key))?;
        let meta = ArrayMeta {
            len: info.len,
            value_type: info.value_type,
            location: info.location,
        };
        let mut state = self.state.lock();
        if state.suspend_depth > 0 {
            state.cache.insert(key, meta);
        }
        Ok(meta)
    }

    fn cached_meta(&self, key: ArrayKey) -> Option<ArrayMeta> {
        let state = self.state.lock();
        if state.suspend_depth == 0 {
            return None;
        }
        state.cache.get(&key)
    }

    /// Number of memoized array metadata entries.
    pub fn cached_entries(&self) -> usize {
        self.state.lock().cache.len()
    }
}

/// Scope returned by [`Session::suspend`].
#[must_use = "notifications resume as soon as the guard is dropped"]
pub struct SuspendGuard<'s> {
    session: &'s Session,
    active: bool,
}

impl SuspendGuard<'_> {
    /// End this scope now.
    pub fn resume(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if std::mem::take(&mut self.active) {
            self.session.resume();
        }
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn features_follow_engine_version() {
        let old = Session::new(SessionConfig::default().with_engine_version(EngineVersion::new(1, 1, 0)));
        assert!(old.require(Feature::FaceNeighborAssignment).is_ok());
        let err = old.require(Feature::ZoneMirroring).unwrap_err();
        assert!(matches!(err, DataError::NotSupported { .. }));
        assert!(Session::default().require(Feature::ZoneMirroring).is_ok());
    }

    #[test]
    fn nested_suspends_flush_once_deduplicated() {
        let session = Session::default();
        let ds = session.create_dataset("t").id();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let outer = session.suspend();
        {
            let _inner = session.suspend();
            session.emit(ChangeEvent::StructureAltered { dataset: ds });
        }
        session.emit(ChangeEvent::StructureAltered { dataset: ds });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        outer.resume();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!session.is_suspended());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let session = Session::default();
        let ds = session.create_dataset("t").id();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session.emit(ChangeEvent::StructureAltered { dataset: ds });
        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.emit(ChangeEvent::StructureAltered { dataset: ds });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
