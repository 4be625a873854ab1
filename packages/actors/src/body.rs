//! Job body and cancel hook types.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use jobgate_core::JobId;

/// Future produced by a job body.
pub type JobFuture<T, E> = BoxFuture<'static, Result<T, E>>;

/// Deferred unit of work. Called once, when the job is dispatched.
pub type JobBody<T, E> = Box<dyn FnOnce() -> JobFuture<T, E> + Send>;

/// Cleanup callback run once if, and only if, a job is cancelled, or times out
/// while running. Queue-wait timeouts never run it.
pub type CancelHook = Box<dyn FnOnce() + Send>;

/// Box a caller's closure into a [`JobBody`].
pub(crate) fn boxed_body<F, Fut, T, E>(body: F) -> JobBody<T, E>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Box::new(move || body().boxed())
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a job's cancel hook, containing any panic it raises.
pub(crate) fn run_cancel_hook(job_id: JobId, hook: Option<CancelHook>) {
    let Some(hook) = hook else {
        return;
    };
    if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
        tracing::warn!(
            "Cancel hook for job {} panicked: {}",
            job_id,
            panic_message(payload)
        );
    }
}
