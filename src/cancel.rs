//! Cancellation for blocking device I/O.
//!
//! `spawn_blocking` work keeps running after the future awaiting it is
//! dropped, so a `tokio::time::timeout` alone cannot stop a port write or a
//! spool submission. [`spawn_cancellable`] hands the closure a [`CancelFlag`]
//! that is raised as soon as the awaiting future goes away; the closure
//! checks it before every step that reaches the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinError;

use crate::error::{PrintError, PrintResult};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the waiter has given up on `operation`.
    pub fn check(&self, operation: &'static str) -> PrintResult<()> {
        if self.is_cancelled() {
            Err(PrintError::Cancelled(operation))
        } else {
            Ok(())
        }
    }
}

/// Raises the flag when dropped.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `f` on the blocking pool. Dropping the returned future (a timeout
/// firing, the caller going away) cancels the flag `f` was given. The flag
/// is also raised after `f` returns, which is harmless.
pub(crate) async fn spawn_cancellable<T, F>(f: F) -> Result<PrintResult<T>, JoinError>
where
    T: Send + 'static,
    F: FnOnce(CancelFlag) -> PrintResult<T> + Send + 'static,
{
    let flag = CancelFlag::new();
    let _guard = CancelOnDrop(flag.clone());
    tokio::task::spawn_blocking(move || f(flag)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn check_reports_the_operation() {
        let flag = CancelFlag::new();
        assert!(flag.check("raw print").is_ok());
        flag.cancel();
        let err = flag.check("raw print").unwrap_err();
        assert_eq!(err.to_string(), "raw print cancelled");
    }

    #[tokio::test]
    async fn completed_work_returns_its_result() {
        let out = spawn_cancellable(|flag| {
            flag.check("lookup")?;
            Ok(7)
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(out, 7);
    }

    #[tokio::test]
    async fn timed_out_work_skips_the_device_step() {
        let submitted = Arc::new(Mutex::new(Vec::<&str>::new()));
        let sink = submitted.clone();
        let work = spawn_cancellable(move |flag| {
            std::thread::sleep(Duration::from_millis(150));
            flag.check("spool")?;
            sink.lock().unwrap().push("job");
            Ok(())
        });

        let waited = tokio::time::timeout(Duration::from_millis(20), work).await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(submitted.lock().unwrap().is_empty());
    }
}
