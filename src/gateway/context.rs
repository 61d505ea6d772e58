//! Per-call timeout and cancellation

use crate::error::{GatewayError, GatewayResult};

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Bounds every suspending operation of one gateway call.
///
/// A cancelled or timed-out operation fails only the item it belongs to.
#[derive(Clone)]
pub struct CallContext {
    timeout: Duration,
    cancel: watch::Receiver<bool>,
}

impl CallContext {
    pub fn new(timeout: Duration, cancel: watch::Receiver<bool>) -> Self {
        Self { timeout, cancel }
    }

    /// Context that is never cancelled
    #[cfg(test)]
    pub fn detached(timeout: Duration) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(timeout, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run `fut` unless the call is cancelled, bounded by the call timeout.
    ///
    /// `fut` is not polled at all when the call is already cancelled.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        if self.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        let cancelled = async move {
            let closed = cancel.wait_for(|c| *c).await.is_err();
            if closed {
                // Sender gone: nothing can cancel us any more
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = timeout(self.timeout, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout {
                    operation: operation.to_string(),
                }),
            },
            _ = cancelled => Err(GatewayError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let ctx = CallContext::detached(Duration::from_secs(1));
        let value = ctx.run("noop", async { Ok(7u32) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = CallContext::detached(Duration::from_millis(20));
        let err = ctx
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { operation } if operation == "slow"));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let (tx, rx) = watch::channel(false);
        let ctx = CallContext::new(Duration::from_secs(5), rx);

        let pending = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                ctx.run("wait", async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
        assert!(ctx.is_cancelled());

        // Already cancelled: the future is never polled
        let err = ctx
            .run::<(), _>("never", async {
                Err(GatewayError::Internal("polled after cancellation".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let ctx = CallContext::new(Duration::from_secs(1), rx);
        assert!(ctx.run("ok", async { Ok(()) }).await.is_ok());
    }
}
