//! Deferred results that many consumers can await, plus a one-shot callback.

use crate::error::QueryError;
use crate::record::ProcessRecord;
use futures::FutureExt;
use futures::future::Shared;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome as seen by every observer of a [`Deferred`].
pub type SharedResult = Result<Arc<[ProcessRecord]>, Arc<QueryError>>;

/// Completion handler, called with `(error, records)`.
pub type CompletionFn = Box<dyn FnOnce(Option<&QueryError>, &[ProcessRecord]) + Send>;

/// Invokes `callback` with the `(error, records)` view of `result`.
pub fn notify<F>(result: &Result<Vec<ProcessRecord>, QueryError>, callback: F)
where
    F: FnOnce(Option<&QueryError>, &[ProcessRecord]),
{
    match result {
        Ok(records) => callback(None, records),
        Err(err) => callback(Some(err), &[]),
    }
}

/// A query running on the Tokio runtime.
///
/// Clones observe the same outcome. The callback, if any, runs once inside
/// the task whether or not anything awaits the result.
#[derive(Clone)]
pub struct Deferred {
    inner: Shared<BoxFuture<'static, SharedResult>>,
}

impl Deferred {
    /// Spawns `op` on the current Tokio runtime.
    ///
    /// Outside a runtime nothing is spawned: the callback hears
    /// [`QueryError::NoRuntime`] straight away and the handle resolves to it.
    pub fn spawn<Fut>(op: Fut, callback: Option<CompletionFn>) -> Self
    where
        Fut: Future<Output = Result<Vec<ProcessRecord>, QueryError>> + Send + 'static,
    {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                let result = Err(QueryError::NoRuntime(err));
                if let Some(callback) = callback {
                    notify(&result, callback);
                }
                return Self::ready(result);
            }
        };

        let task = handle.spawn(async move {
            let result = op.await;
            if let Some(callback) = callback {
                notify(&result, callback);
            }
            result
        });

        let outcome: BoxFuture<'static, SharedResult> = async move {
            match task.await {
                Ok(result) => result.map(Arc::from).map_err(Arc::new),
                Err(join) => Err(Arc::new(QueryError::Task(join))),
            }
        }
        .boxed();

        Self {
            inner: outcome.shared(),
        }
    }

    fn ready(result: Result<Vec<ProcessRecord>, QueryError>) -> Self {
        let outcome: SharedResult = result.map(Arc::from).map_err(Arc::new);
        Self {
            inner: futures::future::ready(outcome).boxed().shared(),
        }
    }
}

impl Future for Deferred {
    type Output = SharedResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}
