//! Realtime sync channel — WebSocket push client.
//!
//! Holds exactly one live connection, translates inbound change
//! notifications into reconciliation-store calls, and recovers from drops
//! without manual intervention:
//!
//! 1. Connect to the configured push URL.
//! 2. Dispatch `created` / `updated` / `deleted` frames into the store,
//!    discarding frames whose `originTag` matches the local session tag
//!    (the optimistic path already applied those).
//! 3. On an abnormal drop, reconnect after a fixed 3 s delay. A normal
//!    close (code 1000) — remote or local teardown — is terminal.
//!
//! A single owned loop drives connect → drive → delay, so there is never a
//! second live connection, never more than one pending reconnect delay, and
//! no stale close handler that could reconnect a superseded connection.
//!
//! Malformed frames and unknown event types are logged and dropped; they
//! never crash the channel or corrupt store state.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::model::PushEnvelope;
use crate::session::SessionTag;
use crate::store::TaskStore;

/// Fixed delay before a reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─── Channel state ────────────────────────────────────────────────────────────

/// Connection state, published for the UI's connectivity indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "connected",
            ChannelState::Closed => "disconnected",
        };
        f.write_str(s)
    }
}

/// Why a connection (attempt) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Explicit local teardown. Terminal.
    LocalShutdown,
    /// Remote closed with the normal code (1000). Terminal.
    RemoteNormal,
    /// Network drop, protocol error, or non-normal close. Reconnects.
    Abnormal,
}

// ─── Handle ───────────────────────────────────────────────────────────────────

/// Handle to a running sync channel.
///
/// `shutdown()` performs the deliberate teardown: the connection is closed
/// with the normal code, any pending reconnect delay is cancelled, and the
/// channel task ends. Dropping the handle without calling it has the same
/// effect on the channel task.
pub struct SyncHandle {
    state: watch::Receiver<ChannelState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Subscribe to connection-state changes.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Deliberate teardown: normal close, no reconnect.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Start the sync channel against `ws_url`, dispatching accepted
/// notifications into `store`.
pub fn spawn(ws_url: String, tag: SessionTag, store: Arc<TaskStore>) -> SyncHandle {
    let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run(ws_url, tag, store, state_tx, shutdown_rx));
    SyncHandle {
        state: state_rx,
        shutdown: shutdown_tx,
        task,
    }
}

// ─── Connection loop ──────────────────────────────────────────────────────────

async fn run(
    url: String,
    tag: SessionTag,
    store: Arc<TaskStore>,
    state: watch::Sender<ChannelState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let _ = state.send(ChannelState::Connecting);
        info!(url = %url, "sync: connecting");

        let connected = tokio::select! {
            _ = wait_shutdown(&mut shutdown) => {
                let _ = state.send(ChannelState::Closed);
                return;
            }
            result = connect_async(url.as_str()) => result,
        };

        let disconnect = match connected {
            Ok((ws, _)) => {
                info!("sync: connected");
                let _ = state.send(ChannelState::Open);
                drive(ws, &tag, &store, &mut shutdown).await
            }
            Err(e) => {
                warn!(err = %e, "sync: connection failed");
                Disconnect::Abnormal
            }
        };

        let _ = state.send(ChannelState::Closed);

        match disconnect {
            Disconnect::LocalShutdown => {
                info!("sync: shut down");
                return;
            }
            Disconnect::RemoteNormal => {
                info!("sync: remote closed normally — not reconnecting");
                return;
            }
            Disconnect::Abnormal => {
                info!(
                    delay_ms = RECONNECT_DELAY.as_millis() as u64,
                    "sync: reconnecting after delay"
                );
                tokio::select! {
                    _ = wait_shutdown(&mut shutdown) => return,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}

/// Pump one open connection until it ends, dispatching text frames.
async fn drive(
    ws: WsStream,
    tag: &SessionTag,
    store: &TaskStore,
    shutdown: &mut watch::Receiver<bool>,
) -> Disconnect {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = wait_shutdown(shutdown) => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client teardown".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(err = %e, "sync: close frame not delivered");
                }
                return Disconnect::LocalShutdown;
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => apply_frame(&text, tag, store),
                Some(Ok(Message::Close(frame))) => return close_disconnect(frame),
                // Pings are answered by the library; the protocol carries
                // nothing else we care about.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(err = %e, "sync: stream error");
                    return Disconnect::Abnormal;
                }
                None => {
                    warn!("sync: stream ended without close");
                    return Disconnect::Abnormal;
                }
            }
        }
    }
}

/// Classify a remote close frame. Only the normal code is terminal.
fn close_disconnect(frame: Option<CloseFrame<'_>>) -> Disconnect {
    match frame {
        Some(f) if f.code == CloseCode::Normal => {
            info!("sync: remote close (normal)");
            Disconnect::RemoteNormal
        }
        Some(f) => {
            warn!(code = u16::from(f.code), "sync: remote close");
            Disconnect::Abnormal
        }
        None => {
            warn!("sync: remote close without frame");
            Disconnect::Abnormal
        }
    }
}

/// Resolves once shutdown is requested (or the handle is gone).
async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}

// ─── Frame handling ───────────────────────────────────────────────────────────

/// Parse one text frame and dispatch it into the store.
///
/// Self-originated frames are discarded before any type dispatch — the
/// local optimistic path already applied the change, whatever it was.
fn apply_frame(text: &str, tag: &SessionTag, store: &TaskStore) {
    let envelope: PushEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(err = %e, "sync: unparseable push frame — dropped");
            return;
        }
    };

    if tag.matches(envelope.origin_tag.as_deref()) {
        debug!(kind = %envelope.kind, "sync: self-originated event skipped");
        return;
    }

    match envelope.kind.as_str() {
        "created" => match envelope.task {
            Some(task) => store.insert(task),
            None => warn!("sync: created frame without task — dropped"),
        },
        "updated" => match envelope.task {
            Some(task) => store.replace(task),
            None => warn!("sync: updated frame without task — dropped"),
        },
        "deleted" => match envelope.id {
            Some(id) => store.remove(id),
            None => warn!("sync: deleted frame without id — dropped"),
        },
        // Execution facts have no effect on the task collection.
        "execution_created" => debug!("sync: execution event ignored"),
        other => warn!(kind = other, "sync: unknown push event type — dropped"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Priority, Task, TaskKind, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn task_json(id: i64) -> String {
        let task = Task {
            id,
            title: format!("task {id}"),
            description: None,
            kind: TaskKind::Task,
            status: TaskStatus::Active,
            priority: Some(Priority::Medium),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            due_date: None,
            context: None,
            recurrence: None,
        };
        serde_json::to_string(&task).unwrap()
    }

    fn frame(kind: &str, body: &str, origin: &str) -> String {
        format!(r#"{{"type":"{kind}",{body},"originTag":"{origin}"}}"#)
    }

    #[test]
    fn created_frame_inserts() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        let text = frame("created", &format!(r#""task":{}"#, task_json(1)), "peer-1");
        apply_frame(&text, &tag, &store);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn self_originated_frame_never_mutates() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        store.insert(serde_json::from_str(&task_json(1)).unwrap());
        let own = tag.as_str().to_string();

        // Regardless of type: a deletion echo must not remove the record.
        let text = frame("deleted", r#""id":1"#, &own);
        apply_frame(&text, &tag, &store);
        assert_eq!(store.tasks().len(), 1);

        let text = frame("created", &format!(r#""task":{}"#, task_json(2)), &own);
        apply_frame(&text, &tag, &store);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn updated_frame_replaces() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        store.insert(serde_json::from_str(&task_json(1)).unwrap());

        let mut updated: Task = serde_json::from_str(&task_json(1)).unwrap();
        updated.title = "renamed".into();
        let body = format!(r#""task":{}"#, serde_json::to_string(&updated).unwrap());
        apply_frame(&frame("updated", &body, "peer-1"), &tag, &store);
        assert_eq!(store.get(1).unwrap().title, "renamed");
    }

    #[test]
    fn deleted_frame_removes() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        store.insert(serde_json::from_str(&task_json(1)).unwrap());
        apply_frame(&frame("deleted", r#""id":1"#, "peer-1"), &tag, &store);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        store.insert(serde_json::from_str(&task_json(1)).unwrap());
        let before = store.tasks();

        apply_frame("not json at all", &tag, &store);
        apply_frame(r#"{"task":{}}"#, &tag, &store); // no type
        apply_frame(&frame("exploded", r#""id":1"#, "peer-1"), &tag, &store);
        apply_frame(&frame("deleted", r#""task":null"#, "peer-1"), &tag, &store); // no id
        apply_frame(&frame("execution_created", r#""id":1"#, "peer-1"), &tag, &store);

        assert_eq!(store.tasks(), before);
        // Message errors never reach the store's error flag.
        assert_eq!(store.error(), None);
    }

    #[test]
    fn frame_without_origin_tag_is_dispatched() {
        let store = TaskStore::new();
        let tag = SessionTag::generate();
        let text = format!(r#"{{"type":"created","task":{}}}"#, task_json(1));
        apply_frame(&text, &tag, &store);
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn only_normal_close_is_terminal() {
        let normal = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        assert_eq!(close_disconnect(Some(normal)), Disconnect::RemoteNormal);

        let abnormal = CloseFrame {
            code: CloseCode::Abnormal,
            reason: "".into(),
        };
        assert_eq!(close_disconnect(Some(abnormal)), Disconnect::Abnormal);

        let away = CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        };
        assert_eq!(close_disconnect(Some(away)), Disconnect::Abnormal);

        assert_eq!(close_disconnect(None), Disconnect::Abnormal);
    }
}
