use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ConnectivityConfig;

/// One reachability check
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Reachable means a TCP handshake with `addr` completes within `timeout`
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: String, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> bool {
        matches!(
            timeout(self.timeout, TcpStream::connect(&self.addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Publishes network availability as a watch channel.
///
/// The value starts out `true` and only changes on a transition, so
/// receivers wake once per connect/disconnect. The polling task is the only
/// writer and stops when the monitor is dropped.
pub struct ConnectivityMonitor {
    rx: watch::Receiver<bool>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub fn from_config(config: &ConnectivityConfig) -> Self {
        let probe = TcpProbe::new(config.probe_addr.clone(), config.timeout());
        Self::spawn(Arc::new(probe), config.interval())
    }

    pub fn spawn(probe: Arc<dyn Probe>, period: Duration) -> Self {
        let (tx, rx) = watch::channel(true);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let online = probe.check().await;
                        let changed = tx.send_if_modified(|current| {
                            if *current == online {
                                false
                            } else {
                                *current = online;
                                true
                            }
                        });
                        if changed {
                            tracing::info!(online, "connectivity changed");
                        }
                    }
                }
            }
        });

        Self { rx, cancel, task }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays a script of results, then repeats the last one
    struct ScriptedProbe {
        script: Mutex<VecDeque<bool>>,
        last: Mutex<bool>,
        checks: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: &[bool]) -> Self {
            Self {
                script: Mutex::new(script.iter().copied().collect()),
                last: Mutex::new(true),
                checks: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn check(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *last = next;
            }
            *last
        }
    }

    async fn next_value(rx: &mut watch::Receiver<bool>) -> bool {
        timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("no connectivity change")
            .unwrap();
        *rx.borrow_and_update()
    }

    #[tokio::test]
    async fn starts_connected() {
        let monitor = ConnectivityMonitor::spawn(Arc::new(ScriptedProbe::new(&[])), Duration::from_secs(60));
        assert!(monitor.is_connected());
    }

    #[tokio::test]
    async fn publishes_only_transitions() {
        let mut script = vec![true];
        script.extend(std::iter::repeat(false).take(20));
        script.push(true);
        let probe = Arc::new(ScriptedProbe::new(&script));
        let monitor = ConnectivityMonitor::spawn(probe.clone(), Duration::from_millis(5));
        let mut rx = monitor.subscribe();

        assert!(!next_value(&mut rx).await);
        assert!(next_value(&mut rx).await);
        assert!(probe.checks.load(Ordering::SeqCst) >= 22);
    }

    #[tokio::test]
    async fn drop_stops_polling() {
        let probe = Arc::new(ScriptedProbe::new(&[]));
        let monitor = ConnectivityMonitor::spawn(probe.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(monitor);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = probe.checks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(probe.checks.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn tcp_probe_reaches_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let probe = TcpProbe::new(addr, Duration::from_secs(1));
        assert!(probe.check().await);
    }

    #[tokio::test]
    async fn tcp_probe_fails_on_closed_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let probe = TcpProbe::new(addr, Duration::from_secs(1));
        assert!(!probe.check().await);
    }
}
