use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use calmirror_core::MirrorConfig;
use tokio::time::MissedTickBehavior;

use crate::commands::sync;

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Clears the busy flag when the batch task finishes, including when the
/// task panics; a stuck flag would skip every future trigger and leave the
/// shutdown drain loop spinning.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Long-running mode: run a full batch on a fixed interval. A trigger that
/// fires while the previous batch is still executing is skipped outright,
/// never queued. Ctrl-C stops future triggers, then waits for the in-flight
/// batch to drain before exiting.
pub async fn run(config: &MirrorConfig) -> Result<()> {
    let busy = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(config.sync.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::info!(
        "daemon started, interval {}",
        humantime::format_duration(config.sync.interval)
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if busy.swap(true, Ordering::SeqCst) {
                    log::warn!("previous cycle still running, skipping this trigger");
                    continue;
                }
                let config = config.clone();
                let guard = BusyGuard(Arc::clone(&busy));
                tokio::spawn(async move {
                    let _guard = guard;
                    match sync::run_batch(&config, None).await {
                        Ok(0) => {}
                        Ok(failed) => log::warn!("{failed} subscription(s) failed this cycle"),
                        Err(e) => log::error!("cycle aborted: {e}"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown requested");
                break;
            }
        }
    }

    while busy.load(Ordering::SeqCst) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
    log::info!("daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_busy_flag_resets_when_batch_task_panics() {
        let busy = Arc::new(AtomicBool::new(true));
        let guard = BusyGuard(Arc::clone(&busy));

        let handle = tokio::spawn(async move {
            let _guard = guard;
            panic!("batch blew up");
        });

        assert!(handle.await.is_err());
        assert!(!busy.load(Ordering::SeqCst));
    }
}
