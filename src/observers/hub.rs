//! WebSocket broadcast hub with per-connection liveness.
//!
//! # Responsibilities
//! - Register observers on connect, deregister on close or error
//! - Ping every heartbeat interval; force-close when no Pong arrives before the deadline
//! - Fan log entries and traffic snapshots out to every open connection
//! - Close observers whose bounded outbound queue overflows

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::body::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::logs::{LogBuffer, LogEntry};
use crate::net::ConnectionId;
use crate::observability::metrics;

/// Time allowed for queued frames to flush after a connection ends.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ObserverConfig {
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    /// Frames buffered per observer before it is considered too slow.
    pub queue_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            queue_capacity: 256,
        }
    }
}

/// Envelope of every message pushed to observers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum HubEvent<'a> {
    Log(&'a LogEntry),
    Update(&'a [Value]),
}

impl HubEvent<'_> {
    fn label(&self) -> &'static str {
        match self {
            HubEvent::Log(_) => "log",
            HubEvent::Update(_) => "update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseSignal {
    Open,
    Server,
    Overflow,
}

struct Observer {
    outbound: mpsc::Sender<Message>,
    close: watch::Sender<CloseSignal>,
    open: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    PongTimeout,
    Overflow,
    ServerClose,
    ClientClose,
    Error,
}

/// Registry of connected observers.
pub struct BroadcastHub {
    observers: DashMap<ConnectionId, Observer>,
    accepting: AtomicBool,
    config: ObserverConfig,
}

impl BroadcastHub {
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            observers: DashMap::new(),
            accepting: AtomicBool::new(true),
            config,
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        self.observers.len()
    }

    /// Serve one upgraded socket until it closes.
    pub async fn handle_socket(self: Arc<Self>, mut socket: WebSocket) {
        if !self.is_accepting() {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: "shutting down".into(),
                })))
                .await;
            return;
        }

        let id = ConnectionId::new();
        let (mut sink, mut stream) = socket.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(self.config.queue_capacity.max(1));
        let (close_tx, mut close_rx) = watch::channel(CloseSignal::Open);
        let open = Arc::new(AtomicBool::new(true));

        self.observers.insert(
            id,
            Observer {
                outbound: outbound.clone(),
                close: close_tx,
                open: Arc::clone(&open),
            },
        );
        metrics::set_observer_connections(self.observers.len());
        tracing::info!(connection_id = %id, "Observer connected");

        let mut writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let heartbeat_every = self.config.heartbeat_interval;
        let pong_timeout = self.config.pong_timeout;
        let mut heartbeat = time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        let pong_deadline = time::sleep(pong_timeout);
        tokio::pin!(pong_deadline);

        let reason = loop {
            tokio::select! {
                _ = heartbeat.tick() => match outbound.try_send(Message::Ping(Bytes::new())) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => break CloseReason::Overflow,
                    Err(mpsc::error::TrySendError::Closed(_)) => break CloseReason::Error,
                },
                _ = &mut pong_deadline => break CloseReason::PongTimeout,
                changed = close_rx.changed() => {
                    if changed.is_err() {
                        break CloseReason::ServerClose;
                    }
                    match *close_rx.borrow() {
                        CloseSignal::Open => {}
                        CloseSignal::Server => break CloseReason::ServerClose,
                        CloseSignal::Overflow => break CloseReason::Overflow,
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Message::Pong(_))) => {
                        pong_deadline.as_mut().reset(Instant::now() + pong_timeout);
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClose,
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %id, error = %e, "Observer socket error");
                        break CloseReason::Error;
                    }
                    Some(Ok(_)) => {}
                },
            }
        };

        open.store(false, Ordering::SeqCst);
        self.observers.remove(&id);
        metrics::set_observer_connections(self.observers.len());

        match reason {
            CloseReason::PongTimeout => {
                tracing::warn!(connection_id = %id, "Observer missed pong deadline, closing");
                let _ = outbound.try_send(close_message(close_code::POLICY, "pong timeout"));
            }
            CloseReason::Overflow => {
                tracing::warn!(connection_id = %id, "Observer outbound queue full, closing");
                let _ = outbound.try_send(close_message(close_code::AGAIN, "too slow"));
            }
            CloseReason::ServerClose => {
                let _ = outbound.try_send(close_message(close_code::AWAY, "server closing"));
            }
            CloseReason::ClientClose | CloseReason::Error => {}
        }
        drop(outbound);

        if time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }
        tracing::info!(connection_id = %id, ?reason, "Observer disconnected");
    }

    /// Push a log entry to every open observer. Returns the number reached.
    pub fn broadcast_log(&self, entry: &LogEntry) -> usize {
        self.broadcast(&HubEvent::Log(entry))
    }

    /// Push recent captured requests to every open observer.
    pub fn broadcast_snapshot(&self, requests: &[Value]) -> usize {
        self.broadcast(&HubEvent::Update(requests))
    }

    fn broadcast(&self, event: &HubEvent<'_>) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode observer event");
                return 0;
            }
        };

        let mut delivered = 0;
        for observer in self.observers.iter() {
            if !observer.open.load(Ordering::SeqCst) {
                continue;
            }
            match observer.outbound.try_send(Message::Text(text.clone().into())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    observer.open.store(false, Ordering::SeqCst);
                    let _ = observer.close.send(CloseSignal::Overflow);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        metrics::record_broadcast(event.label());
        delivered
    }

    /// Ask every connection to close. Returns how many were signalled.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for observer in self.observers.iter() {
            observer.open.store(false, Ordering::SeqCst);
            if observer.close.send(CloseSignal::Server).is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!(count = closed, "Closing all observers");
        }
        closed
    }

    /// Refuse new connections from now on.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Forward every new log entry to the hub until shutdown.
pub fn spawn_log_forwarder(
    hub: Arc<BroadcastHub>,
    logs: &LogBuffer,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut entries = logs.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                entry = entries.recv() => match entry {
                    Ok(entry) => {
                        hub.broadcast_log(&entry);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Log forwarder lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Log forwarder stopped");
    })
}
