//! Liveness monitor
//!
//! Pings the host on a fixed interval and reports a disconnect when a ping
//! fails or does not answer in time. The loop keeps pinging after a failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hostmux_utils::Result;
use serde::Deserialize;
use tokio::sync::oneshot;

/// Anything that can round-trip a ping
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// When the disconnect callback fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPolicy {
    /// Once per healthy-to-failing transition
    #[default]
    OnTransition,
    /// On every failed ping
    EveryFailure,
}

/// Why the host was considered disconnected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    PingTimeout(Duration),
    PingRejected(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PingTimeout(timeout) => {
                write!(f, "ping timed out after {}ms", timeout.as_millis())
            }
            DisconnectReason::PingRejected(message) => write!(f, "ping failed: {}", message),
        }
    }
}

/// Monitor timing and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub policy: ReportPolicy,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            policy: ReportPolicy::default(),
        }
    }
}

/// Handle to a running ping loop; dropping it stops the loop
#[derive(Debug)]
pub struct LivenessMonitor {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl LivenessMonitor {
    /// Start pinging `pinger` in a background task
    pub fn spawn<P, F>(pinger: Arc<P>, config: LivenessConfig, on_disconnect: F) -> Self
    where
        P: Pinger + ?Sized + 'static,
        F: Fn(DisconnectReason) + Send + Sync + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        tokio::spawn(liveness_task(pinger, config, on_disconnect, cancel_rx));

        tracing::debug!(
            interval_ms = config.interval.as_millis() as u64,
            timeout_ms = config.timeout.as_millis() as u64,
            policy = ?config.policy,
            "Liveness monitor started"
        );

        Self {
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Stop the loop; later calls are no-ops
    pub fn stop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn check<P>(pinger: &P, timeout: Duration) -> std::result::Result<(), DisconnectReason>
where
    P: Pinger + ?Sized,
{
    match tokio::time::timeout(timeout, pinger.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DisconnectReason::PingRejected(e.to_string())),
        Err(_) => Err(DisconnectReason::PingTimeout(timeout)),
    }
}

async fn liveness_task<P, F>(
    pinger: Arc<P>,
    config: LivenessConfig,
    on_disconnect: F,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    P: Pinger + ?Sized,
    F: Fn(DisconnectReason),
{
    let mut reported = false;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {
                let result = tokio::select! {
                    result = check(pinger.as_ref(), config.timeout) => result,
                    _ = &mut cancel_rx => break,
                };

                match result {
                    Ok(()) => {
                        if reported {
                            tracing::info!("Host answering pings again");
                        }
                        reported = false;
                    }
                    Err(reason) => {
                        tracing::warn!(reason = %reason, "Liveness check failed");
                        let fire = match config.policy {
                            ReportPolicy::EveryFailure => true,
                            ReportPolicy::OnTransition => !reported,
                        };
                        reported = true;
                        if fire {
                            on_disconnect(reason);
                        }
                    }
                }
            }

            _ = &mut cancel_rx => break,
        }
    }

    tracing::debug!("Liveness monitor stopped");
}
