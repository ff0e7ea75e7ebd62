//! Tests for the pluggable AuditSink / forward sink functionality.

use std::sync::{Arc, Mutex, Weak};

use sourcevault::{
    AccessEvent, AccessLevel, AccessOutcome, AccessPolicy, AuditSink, FileAuditSink, MockProvider, Operation,
    SearchQuery, SecurityContext, Source, SourceStore,
};

/// A test sink that collects events into a shared Vec.
struct SharedVecSink {
    events: Arc<Mutex<Vec<AccessEvent>>>,
}

impl AuditSink for SharedVecSink {
    fn append(&mut self, event: AccessEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn store() -> SourceStore {
    SourceStore::new(Arc::new(MockProvider::new()))
}

#[test]
fn test_forward_sink_receives_events() {
    let store = store();
    let events = Arc::new(Mutex::new(Vec::new()));
    store.add_audit_sink(Box::new(SharedVecSink {
        events: Arc::clone(&events),
    }));

    let policy = AccessPolicy::new(AccessLevel::Confidential, ["alice"], "default");
    let id = store.store(&Source::new(b"secret".to_vec()), &policy).unwrap();

    store.retrieve(&id, &SecurityContext::for_user("alice")).unwrap();
    let hits = store
        .search(&SearchQuery::text("secret"), &SecurityContext::for_user("alice"))
        .unwrap();
    assert_eq!(hits.len(), 1);

    // Primary log has both events.
    assert_eq!(store.audit_events().len(), 2);

    // Forward sink also received them.
    let collected = events.lock().unwrap();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0].operation, Operation::Retrieve);
    assert_eq!(collected[0].outcome, AccessOutcome::Granted);
    assert_eq!(collected[1].operation, Operation::Search);
    assert_eq!(collected[1].source_id, id);
}

#[test]
fn test_storing_is_not_an_access_event() {
    let store = store();
    let policy = AccessPolicy::new(AccessLevel::Public, ["alice"], "default");
    store.store(&Source::new(b"x".to_vec()), &policy).unwrap();
    assert!(store.audit_events().is_empty());
}

#[test]
fn test_file_sink_persists_refusals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.jsonl");

    let store = store();
    store.add_audit_sink(Box::new(FileAuditSink::new(&path).unwrap()));

    let policy = AccessPolicy::new(AccessLevel::Confidential, ["alice"], "default");
    let id = store.store(&Source::new(b"secret".to_vec()), &policy).unwrap();
    let _ = store.retrieve(&id, &SecurityContext::for_user("bob"));

    let written = std::fs::read_to_string(&path).unwrap();
    let event: AccessEvent = serde_json::from_str(written.lines().next().unwrap()).unwrap();
    assert_eq!(event.outcome, AccessOutcome::Denied);
    assert_eq!(event.user.as_deref(), Some("bob"));
    assert!(!written.contains("secret"));
}

/// Reads the store's own log from inside `append`.
struct ObservingSink {
    store: Weak<SourceStore>,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl AuditSink for ObservingSink {
    fn append(&mut self, _event: AccessEvent) {
        if let Some(store) = self.store.upgrade() {
            self.seen.lock().unwrap().push(store.audit_len());
        }
    }
}

#[test]
fn test_sinks_run_outside_the_log_lock() {
    let store = Arc::new(store());
    let seen = Arc::new(Mutex::new(Vec::new()));
    store.add_audit_sink(Box::new(ObservingSink {
        store: Arc::downgrade(&store),
        seen: Arc::clone(&seen),
    }));

    let policy = AccessPolicy::new(AccessLevel::Confidential, ["alice"], "default");
    let id = store.store(&Source::new(b"secret".to_vec()), &policy).unwrap();
    store.retrieve(&id, &SecurityContext::for_user("alice")).unwrap();
    let _ = store.retrieve(&id, &SecurityContext::for_user("bob"));

    // Each event is already in the log when sinks see it.
    assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

    // Draining the log does not affect what sinks received.
    assert_eq!(store.drain_audit_events().len(), 2);
    assert_eq!(seen.lock().unwrap().len(), 2);
}
