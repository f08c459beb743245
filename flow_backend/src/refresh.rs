use chrono::Local;
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use crate::config::FeedConfig;
use crate::overview::{fetch_snapshot, DashboardSnapshot};
use crate::tomtom::TomTomClient;

/// Refresh interval, kept inside 10..=300 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    secs: u64,
}

impl RefreshSchedule {
    pub const MIN_SECS: u64 = 10;
    pub const MAX_SECS: u64 = 300;
    pub const DEFAULT_SECS: u64 = 60;

    pub fn from_secs(secs: u64) -> Self {
        Self {
            secs: secs.clamp(Self::MIN_SECS, Self::MAX_SECS),
        }
    }

    pub fn secs(&self) -> u64 {
        self.secs
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.secs)
    }
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}

/// Frames pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedMessage {
    Snapshot(DashboardSnapshot),
    /// Wall clock, once a second.
    Clock { now: String },
}

pub trait SnapshotSource: Send + Sync + 'static {
    fn snapshot(&self) -> impl Future<Output = DashboardSnapshot> + Send;
}

/// TomTom-backed source.
pub struct LiveSource {
    pub client: TomTomClient,
    pub cfg: FeedConfig,
}

impl SnapshotSource for LiveSource {
    fn snapshot(&self) -> impl Future<Output = DashboardSnapshot> + Send {
        fetch_snapshot(&self.client, &self.cfg)
    }
}

/// Fan-out point between the refresh task and connected clients.
#[derive(Clone)]
pub struct FeedHub {
    tx: broadcast::Sender<FeedMessage>,
    latest: Arc<RwLock<Option<DashboardSnapshot>>>,
}

impl FeedHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.tx.subscribe()
    }

    pub fn latest(&self) -> Option<DashboardSnapshot> {
        self.latest.read().clone()
    }

    /// Stores `snap` as the latest and broadcasts it.
    pub fn publish_snapshot(&self, snap: DashboardSnapshot) {
        *self.latest.write() = Some(snap.clone());
        // no receivers is fine
        let _ = self.tx.send(FeedMessage::Snapshot(snap));
    }

    pub fn publish_clock(&self) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let _ = self.tx.send(FeedMessage::Clock { now });
    }
}

/// Refreshes on `schedule` and ticks the clock every second until `shutdown`
/// flips to `true` or its sender is dropped. Returns the number of snapshots
/// published.
pub async fn run_refresh<S: SnapshotSource>(
    source: Arc<S>,
    schedule: RefreshSchedule,
    hub: FeedHub,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut refresh = tokio::time::interval(schedule.interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut clock = tokio::time::interval(Duration::from_secs(1));
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("refresh started; every {}s", schedule.secs());
    let mut cycles = 0usize;
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = refresh.tick() => {
                // the clock keeps ticking and shutdown is honored while the
                // upstream calls are in flight
                let fetch = source.snapshot();
                tokio::pin!(fetch);
                let snap = loop {
                    tokio::select! {
                        snap = &mut fetch => break Some(snap),
                        _ = clock.tick() => hub.publish_clock(),
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break None;
                            }
                        }
                    }
                };
                let Some(snap) = snap else {
                    tracing::debug!("snapshot fetch abandoned on shutdown");
                    break;
                };
                cycles += 1;
                tracing::debug!("snapshot #{} published", cycles);
                hub.publish_snapshot(snap);
            }
            _ = clock.tick() => hub.publish_clock(),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!("refresh stopped after {} snapshots", cycles);
    cycles
}

#[derive(Debug, Error)]
enum ClientError {
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("send failed: {0}")]
    Send(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Runs one WebSocket client: handshake, the latest snapshot if there is one,
/// then every broadcast frame until the client closes or the hub goes away.
pub async fn serve_client(stream: TcpStream, hub: FeedHub) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("websocket handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();
    // subscribe first so nothing published after the latest snapshot is missed
    let mut rx = hub.subscribe();

    if let Some(snap) = hub.latest() {
        if let Err(e) = send_json(&mut write, &FeedMessage::Snapshot(snap)).await {
            tracing::debug!("client dropped on connect: {}", e);
            return;
        }
    }

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Ok(msg) => {
                    if let Err(e) = send_json(&mut write, &msg).await {
                        tracing::debug!("client dropped: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("client lagged; skipped {} frames", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("client read error: {}", e);
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_json<S>(write: &mut S, msg: &FeedMessage) -> Result<(), ClientError>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(msg)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overview::DashboardSnapshot;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl SnapshotSource for Counting {
        fn snapshot(&self) -> impl Future<Output = DashboardSnapshot> + Send {
            self.0.fetch_add(1, Ordering::SeqCst);
            async { DashboardSnapshot::from_responses(&Value::Null, &Value::Null, &Value::Null) }
        }
    }

    #[test]
    fn test_schedule_is_clamped() {
        assert_eq!(RefreshSchedule::from_secs(1).secs(), 10);
        assert_eq!(RefreshSchedule::from_secs(900).secs(), 300);
        assert_eq!(RefreshSchedule::from_secs(45).secs(), 45);
        assert_eq!(RefreshSchedule::default().secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_on_shutdown() {
        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let hub = FeedHub::new(256);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_refresh(
            source.clone(),
            RefreshSchedule::from_secs(10),
            hub.clone(),
            stop_rx,
        ));

        // ticks at t=0, 10, 20
        tokio::time::sleep(Duration::from_secs(25)).await;
        stop_tx.send(true).unwrap();

        let cycles = task.await.unwrap();
        assert_eq!(cycles, 3);
        assert_eq!(source.0.load(Ordering::SeqCst), 3);
        assert!(hub.latest().is_some());
    }

    struct Stalled;

    impl SnapshotSource for Stalled {
        fn snapshot(&self) -> impl Future<Output = DashboardSnapshot> + Send {
            std::future::pending()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_and_shutdown_during_slow_fetch() {
        let hub = FeedHub::new(64);
        let mut rx = hub.subscribe();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_refresh(
            Arc::new(Stalled),
            RefreshSchedule::default(),
            hub.clone(),
            stop_rx,
        ));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut clocks = 0;
        while let Ok(msg) = rx.try_recv() {
            assert!(matches!(msg, FeedMessage::Clock { .. }));
            clocks += 1;
        }
        assert!(clocks >= 3, "only {} clock frames while fetching", clocks);

        stop_tx.send(true).unwrap();
        let cycles = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("refresh loop ignored shutdown")
            .unwrap();
        assert_eq!(cycles, 0);
        assert!(hub.latest().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stops_when_sender_dropped() {
        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_refresh(
            source,
            RefreshSchedule::default(),
            FeedHub::new(16),
            stop_rx,
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(stop_tx);
        assert_eq!(task.await.unwrap(), 1);
    }
}
