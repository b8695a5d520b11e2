//! Background sweep loop for active expiry

use agentrelay_core::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something whose expired records can be removed in one pass.
#[async_trait]
pub trait Sweep: Send + Sync {
    fn namespace(&self) -> &str;
    async fn sweep(&self) -> Result<usize>;
}

/// Sweep every target each `interval` until `cancel` fires.
pub fn spawn_sweeper(targets: Vec<Arc<dyn Sweep>>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Sweeper started (every {:?}, {} namespace(s))", interval, targets.len());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    for target in &targets {
                        match target.sweep().await {
                            Ok(n) => debug!("Swept {}: {} removed", target.namespace(), n),
                            Err(e) => warn!("Sweep of {} failed: {}", target.namespace(), e),
                        }
                    }
                }
            }
        }
        info!("Sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Sweep for Counting {
        fn namespace(&self) -> &str {
            "test"
        }

        async fn sweep(&self) -> Result<usize> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_each_interval_until_cancelled() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(vec![counter.clone() as Arc<dyn Sweep>], Duration::from_secs(10), cancel.clone());

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}
