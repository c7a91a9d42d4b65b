//! Remote capability-surface poller.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{debouncer, Reloadable};
use crate::error::McpResult;

/// Summarizes what the remote environment currently offers, e.g. its API groups.
///
/// Two equal fingerprints mean nothing a toolset depends on has changed.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    async fn fingerprint(&self) -> McpResult<String>;
}

pub struct TopologyPoller {
    source: Arc<dyn CapabilitySource>,
    poll_interval: Duration,
    window: Duration,
}

impl TopologyPoller {
    pub fn new(source: Arc<dyn CapabilitySource>, poll_interval: Duration, window: Duration) -> Self {
        Self {
            source,
            poll_interval,
            window,
        }
    }

    /// Poll until `target` is dropped or the task is aborted.
    ///
    /// The first fingerprint is the baseline. Fingerprint errors are logged and polling continues.
    pub fn spawn(self, target: Weak<dyn Reloadable>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Holding the handle keeps the debouncer open; changes are recorded directly.
            let (_handle, mut debouncer) = debouncer(self.window);
            let mut baseline: Option<String> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.source.fingerprint().await {
                            Ok(fingerprint) => {
                                match baseline.as_deref() {
                                    None => debug!("Recorded capability baseline"),
                                    Some(previous) if previous != fingerprint => {
                                        info!("Remote capability surface changed");
                                        debouncer.record();
                                    }
                                    Some(_) => {}
                                }
                                baseline = Some(fingerprint);
                            }
                            Err(e) => warn!(error = %e, "Capability fingerprint failed"),
                        }
                    }
                    fired = debouncer.next() => {
                        if fired.is_none() {
                            break;
                        }
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        if let Err(e) = target.reload().await {
                            warn!(error = %e, "Reload after capability change failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::{core::config::ServerConfig, error::McpError};

    /// Returns scripted fingerprints, repeating the last one.
    struct Scripted {
        values: Mutex<Vec<McpResult<String>>>,
    }

    impl Scripted {
        fn new(values: Vec<McpResult<String>>) -> Self {
            let mut values = values;
            values.reverse();
            Self {
                values: Mutex::new(values),
            }
        }
    }

    #[async_trait]
    impl CapabilitySource for Scripted {
        async fn fingerprint(&self) -> McpResult<String> {
            let mut values = self.values.lock();
            if values.len() > 1 {
                values.pop().unwrap_or_else(|| Ok(String::new()))
            } else {
                match values.last() {
                    Some(Ok(v)) => Ok(v.clone()),
                    Some(Err(e)) => Err(McpError::Provider(e.to_string())),
                    None => Ok(String::new()),
                }
            }
        }
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    #[async_trait]
    impl Reloadable for Counter {
        async fn reload(&self) -> McpResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reload_configuration(&self, _config: ServerConfig) -> McpResult<()> {
            Ok(())
        }
    }

    fn spawn(source: Scripted, target: &Arc<Counter>) -> JoinHandle<()> {
        let weak: Weak<dyn Reloadable> =
            Arc::downgrade(&(target.clone() as Arc<dyn Reloadable>));
        TopologyPoller::new(
            Arc::new(source),
            Duration::from_secs(1),
            Duration::from_millis(100),
        )
        .spawn(weak)
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_triggers_single_reload() {
        let target = Arc::new(Counter::default());
        let source = Scripted::new(vec![
            Ok("v1".to_string()),
            Ok("v1".to_string()),
            Ok("v2".to_string()),
        ]);
        let task = spawn(source, &target);

        tokio::time::sleep(Duration::from_secs(10)).await;
        task.abort();
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_surface_never_reloads() {
        let target = Arc::new(Counter::default());
        let task = spawn(Scripted::new(vec![Ok("v1".to_string())]), &target);

        tokio::time::sleep(Duration::from_secs(10)).await;
        task.abort();
        assert_eq!(target.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fingerprint_errors_do_not_stop_polling() {
        let target = Arc::new(Counter::default());
        let source = Scripted::new(vec![
            Ok("v1".to_string()),
            Err(McpError::Provider("unreachable".to_string())),
            Ok("v2".to_string()),
        ]);
        let task = spawn(source, &target);

        tokio::time::sleep(Duration::from_secs(10)).await;
        task.abort();
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_target_dropped() {
        let target = Arc::new(Counter::default());
        let task = spawn(
            Scripted::new(vec![Ok("v1".to_string()), Ok("v2".to_string())]),
            &target,
        );
        drop(target);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(task.is_finished());
    }
}
