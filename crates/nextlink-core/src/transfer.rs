// ── Transfer supervision ──
//
// Runs one upload or download under two guards: caller cancellation and a
// stall timer. Progress re-arms the timer instead of cancelling it, so a
// slow but moving transfer never times out. Whatever wins the race, the
// in-flight future is dropped before the outcome is returned, which frees
// the request body and the timer and leaves nothing that could report
// back later.

use std::time::Duration;

use nextlink_api::{Request, Response, Transport};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::CoreError;

/// Execute `request`, failing with `Aborted` on cancellation or
/// `TransferTimeout` after `stall_timeout` without progress.
pub async fn supervise<T: Transport>(
    transport: &T,
    request: Request,
    cancel: &CancellationToken,
    stall_timeout: Duration,
) -> Result<Response, CoreError> {
    let (progress_tx, mut progress_rx) = watch::channel(0_u64);
    let transfer = transport.execute_with_progress(request, progress_tx);
    tokio::pin!(transfer);

    let stall = time::sleep(stall_timeout);
    tokio::pin!(stall);
    let mut progress_open = true;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("transfer aborted by caller");
                return Err(CoreError::Aborted);
            }
            result = &mut transfer => {
                return result.map_err(CoreError::from);
            }
            changed = progress_rx.changed(), if progress_open => {
                if changed.is_ok() {
                    trace!(bytes = *progress_rx.borrow_and_update(), "transfer progress");
                    stall.as_mut().reset(Instant::now() + stall_timeout);
                } else {
                    progress_open = false;
                }
            }
            () = &mut stall => {
                warn!(timeout_secs = stall_timeout.as_secs(), "transfer stalled");
                return Err(CoreError::TransferTimeout {
                    timeout_secs: stall_timeout.as_secs(),
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use bytes::Bytes;
    use nextlink_api::RequestBuilder;
    use nextlink_api::transport::StatusCode;

    use super::*;
    use crate::config::DEFAULT_STALL_TIMEOUT;

    /// Sends `ticks` progress updates `interval` apart, then succeeds.
    /// With `ticks == None` it never finishes.
    struct ScriptedTransport {
        interval: Duration,
        ticks: Option<u64>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl ScriptedTransport {
        fn new(interval_secs: u64, ticks: Option<u64>) -> Self {
            Self {
                interval: Duration::from_secs(interval_secs),
                ticks,
                dropped: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn execute(&self, _request: Request) -> Result<Response, nextlink_api::Error> {
            unreachable!("transfers go through execute_with_progress")
        }

        async fn execute_with_progress(
            &self,
            request: Request,
            progress: watch::Sender<u64>,
        ) -> Result<Response, nextlink_api::Error> {
            let _guard = DropFlag(Arc::clone(&self.dropped));
            let _body = request.body;
            match self.ticks {
                Some(ticks) => {
                    for tick in 1..=ticks {
                        time::sleep(self.interval).await;
                        let _ = progress.send(tick);
                    }
                    Ok(Response {
                        status: StatusCode::CREATED,
                        body: Bytes::new(),
                    })
                }
                None => std::future::pending().await,
            }
        }
    }

    fn upload() -> Request {
        RequestBuilder::basic("https://cloud.example.com", "alice", "pw")
            .unwrap()
            .upload("/remote.php/dav/files/alice/a.bin", vec![1_u8; 16], None)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn progress_keeps_a_slow_transfer_alive() {
        // Four ticks 50s apart: 200s total, never 60s without progress.
        let transport = ScriptedTransport::new(50, Some(4));
        let started = Instant::now();

        let cancel = CancellationToken::new();
        let response = supervise(&transport, upload(), &cancel, DEFAULT_STALL_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert!(started.elapsed() >= Duration::from_secs(200));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out_and_drops_the_transfer() {
        let transport = ScriptedTransport::new(1, None);
        let started = Instant::now();

        let cancel = CancellationToken::new();
        let err = supervise(&transport, upload(), &cancel, DEFAULT_STALL_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::TransferTimeout { timeout_secs: 60 }));
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn gap_longer_than_the_window_times_out() {
        let transport = ScriptedTransport::new(90, Some(2));
        let cancel = CancellationToken::new();
        let err = supervise(&transport, upload(), &cancel, DEFAULT_STALL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransferTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_and_releases() {
        let transport = ScriptedTransport::new(1, None);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let err = supervise(&transport, upload(), &cancel, DEFAULT_STALL_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Aborted));
        assert!(transport.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_starts_waiting() {
        let transport = ScriptedTransport::new(1, Some(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = supervise(&transport, upload(), &cancel, DEFAULT_STALL_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Aborted));
    }
}
