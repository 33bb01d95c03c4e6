//! Reconnecting stream client for the live data feed
//!
//! Maintains a push connection through a pluggable transport, normalizes
//! payloads into reading batches, and hands them to the feed service.
//! Transport failures are never fatal: the client backs off exponentially
//! (1s doubling, capped at 30s) and retries until explicitly stopped.
//! Connection status is published on a watch channel for the UI's
//! "connection lost, retrying" indicator.

use crate::domain::types::{epoch_ms, Reading};
use crate::infra::metrics::Metrics;
use crate::io::payload::parse_payload;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Default reconnect backoff base delay
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default reconnect backoff cap
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// A push transport the stream client can drive
///
/// Implementations own the socket/session; the client owns reconnect policy
/// and lifecycle.
#[async_trait]
pub trait StreamTransport: Send {
    /// Establish the connection
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Receive the next raw payload; `Ok(None)` means the peer closed cleanly
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Release the transport resources (idempotent)
    async fn close(&mut self);
}

/// Observable connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Open,
    /// Waiting out the backoff before reconnect attempt `attempt`
    Retrying { attempt: u32, delay_ms: u64 },
    Closed,
}

/// Exponential backoff: `min(cap, base * 2^attempt)`, attempt incremented
/// per failure and reset to zero on a successful open
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt)).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_CAP)
    }
}

/// Handle for stopping a running stream client
///
/// Safe to call multiple times and from multiple owners; the first call
/// wins, the rest are no-ops.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Create a stop handle plus the receiver to hand to `run`
pub fn stop_channel() -> (StopHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, rx)
}

/// Reconnecting client over a [`StreamTransport`]
pub struct StreamConnection<T: StreamTransport> {
    transport: T,
    policy: ReconnectPolicy,
    batch_tx: mpsc::Sender<Vec<Reading>>,
    status_tx: watch::Sender<ConnectionStatus>,
    metrics: Arc<Metrics>,
}

impl<T: StreamTransport> StreamConnection<T> {
    pub fn new(
        transport: T,
        policy: ReconnectPolicy,
        batch_tx: mpsc::Sender<Vec<Reading>>,
        metrics: Arc<Metrics>,
    ) -> (Self, watch::Receiver<ConnectionStatus>) {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);
        (Self { transport, policy, batch_tx, status_tx, metrics }, status_rx)
    }

    /// Connect, receive, and reconnect until stopped
    ///
    /// Stopping cancels a pending backoff timer, closes the transport if
    /// open, and leaves the status at `Closed`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        'outer: loop {
            self.set_status(ConnectionStatus::Connecting);
            let opened = tokio::select! {
                res = self.transport.open() => res,
                _ = wait_for_stop(&mut shutdown) => break 'outer,
            };

            match opened {
                Ok(()) => {
                    self.policy.reset();
                    self.set_status(ConnectionStatus::Open);
                    info!("stream_open");

                    loop {
                        let received = tokio::select! {
                            res = self.transport.recv() => res,
                            _ = wait_for_stop(&mut shutdown) => break 'outer,
                        };
                        match received {
                            Ok(Some(payload)) => {
                                if !self.handle_payload(&payload) {
                                    break 'outer;
                                }
                            }
                            Ok(None) => {
                                warn!("stream_closed_by_peer");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "stream_error");
                                break;
                            }
                        }
                    }
                    self.transport.close().await;
                }
                Err(e) => {
                    warn!(error = %e, "stream_connect_failed");
                    self.transport.close().await;
                }
            }

            let delay = self.policy.next_delay();
            self.metrics.record_reconnect();
            self.set_status(ConnectionStatus::Retrying {
                attempt: self.policy.attempt(),
                delay_ms: delay.as_millis() as u64,
            });
            info!(delay_ms = delay.as_millis() as u64, "stream_reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_for_stop(&mut shutdown) => break 'outer,
            }
        }

        self.transport.close().await;
        self.set_status(ConnectionStatus::Closed);
        info!("stream_stopped");
    }

    /// Normalize and forward one payload; false when the consumer is gone
    fn handle_payload(&self, payload: &str) -> bool {
        self.metrics.record_payload();
        let batch = parse_payload(payload, epoch_ms());
        if batch.malformed > 0 {
            self.metrics.record_malformed(batch.malformed as u64);
        }
        if batch.readings.is_empty() {
            return true;
        }
        debug!(readings = batch.readings.len(), "stream_batch");
        match self.batch_tx.try_send(batch.readings) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.record_batch_dropped();
                warn!("stream_batch_dropped: channel full");
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!("reading channel closed");
                false
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }
}

/// Resolve once the shutdown flag turns true (or its sender is dropped)
async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
