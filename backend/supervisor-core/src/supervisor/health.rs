use std::future::Future;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Periodic background check, cancelled on drop or via [`HealthPoller::stop`].
pub struct HealthPoller {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl HealthPoller {
    /// Run `check` every `period`. The first run happens one period from now.
    pub fn spawn<F, Fut>(period: Duration, check: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.child_token();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = child.cancelled() => break,
                            _ = check() => {}
                        }
                    }
                }
            }

            debug!("Health poller exited");
        });

        info!("Health polling every {period:?}");
        Self {
            token,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel and wait for an in-flight check to wind down.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
