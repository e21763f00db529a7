use pslist::error::Result;
use pslist::{PidFilter, Platform, ProcBackend, ProcQuery, ProcessRecord, QueryConfig, QueryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every call and answers with one fixed record.
#[derive(Clone, Default)]
struct MockBackend {
    seen: Arc<Mutex<Vec<Option<PidFilter>>>>,
    pid: u32,
}

impl MockBackend {
    fn answering(pid: u32) -> Self {
        Self {
            pid,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Option<PidFilter>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProcBackend for MockBackend {
    async fn list(&self, pid: Option<&PidFilter>) -> Result<Vec<ProcessRecord>> {
        self.seen.lock().unwrap().push(pid.cloned());
        Ok(vec![ProcessRecord {
            pid: self.pid,
            command: "mock".into(),
            ..ProcessRecord::default()
        }])
    }
}

fn query_on(platform: Platform) -> (ProcQuery, MockBackend, MockBackend) {
    let unix = MockBackend::answering(1);
    let windows = MockBackend::answering(4);
    let mut query = ProcQuery::new(Some(QueryConfig::default().platform(platform)));
    query.set_unix_backend(unix.clone());
    query.set_windows_backend(windows.clone());
    (query, unix, windows)
}

#[tokio::test]
async fn unix_platform_routes_to_unix_backend() {
    let (query, unix, windows) = query_on(Platform::from_os("darwin"));
    let records = query.query(Some(PidFilter::from("77"))).await.unwrap();

    assert_eq!(records[0].pid, 1);
    assert_eq!(unix.calls(), vec![Some(PidFilter::from("77"))]);
    assert!(windows.calls().is_empty());
}

#[tokio::test]
async fn windows_platform_routes_to_windows_backend() {
    let (query, unix, windows) = query_on(Platform::from_os("win32"));
    let records = query.query(None).await.unwrap();

    assert_eq!(records[0].pid, 4);
    assert_eq!(windows.calls(), vec![None]);
    assert!(unix.calls().is_empty());
}

#[tokio::test]
async fn other_platform_is_unsupported() {
    let (query, unix, windows) = query_on(Platform::from_os("plan9"));
    let err = query.query(None).await.unwrap_err();

    assert!(matches!(err, QueryError::UnsupportedPlatform(ref name) if name == "plan9"));
    assert!(unix.calls().is_empty());
    assert!(windows.calls().is_empty());
}

#[tokio::test]
async fn platform_is_read_on_every_call() {
    let (mut query, unix, windows) = query_on(Platform::Unix);
    query.query(None).await.unwrap();
    query.set_platform(Platform::Windows);
    query.query(None).await.unwrap();

    assert_eq!(unix.calls().len(), 1);
    assert_eq!(windows.calls().len(), 1);
}

#[tokio::test]
async fn callback_sees_unsupported_platform_once() {
    let (query, unix, _) = query_on(Platform::Other("haiku".into()));
    let mut calls = 0;
    let result = query
        .query_with(None, |err, records| {
            calls += 1;
            assert!(matches!(err, Some(QueryError::UnsupportedPlatform(_))));
            assert!(records.is_empty());
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls, 1);
    assert!(unix.calls().is_empty());
}

#[tokio::test]
async fn deferred_callback_fires_once_across_observers() {
    let (query, unix, _) = query_on(Platform::Unix);
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();

    let deferred = query.deferred_with(Some(9u32.into()), move |err, records| {
        assert!(err.is_none());
        assert_eq!(records.len(), 1);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let first = deferred.clone().await.unwrap();
    let second = deferred.await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(unix.calls(), vec![Some(PidFilter::from(9u32))]);
}

#[tokio::test]
async fn deferred_without_callback_rejects_unsupported_platform() {
    let (query, unix, windows) = query_on(Platform::Other("haiku".into()));
    let err = query.deferred(None).await.unwrap_err();

    assert!(matches!(*err, QueryError::UnsupportedPlatform(_)));
    assert!(unix.calls().is_empty());
    assert!(windows.calls().is_empty());
}

#[tokio::test]
async fn list_and_lookup_go_through_query() {
    let (query, unix, _) = query_on(Platform::Unix);

    assert_eq!(query.list().await.unwrap().len(), 1);
    assert_eq!(query.lookup(1u32).await.unwrap().map(|r| r.pid), Some(1));
    assert!(query.lookup("77").await.unwrap().is_none());
    assert_eq!(
        unix.calls(),
        vec![None, Some(PidFilter::from(1u32)), Some(PidFilter::from("77"))]
    );
}

#[test]
fn deferred_outside_a_runtime_resolves_to_an_error() {
    let (query, unix, _) = query_on(Platform::Unix);
    let err = futures::executor::block_on(query.deferred(None)).unwrap_err();

    assert!(matches!(*err, QueryError::NoRuntime(_)));
    assert!(unix.calls().is_empty());
}
