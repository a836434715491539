use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use ride_api::{ServerEvent, SocketFrame};
use tokio::{
    net::TcpStream,
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientResult;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Connection {
    user_id: String,
    closer: Option<oneshot::Sender<()>>,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Push channel from the backend. Subscribers may register before or after
/// the socket is opened; each sees events published after it subscribed.
///
/// There is no acknowledgement or reconnection: once the socket ends the
/// channel reports disconnected until `connect` is called again.
pub struct RealtimeChannel {
    events: broadcast::Sender<ServerEvent>,
    conn: Mutex<Option<Connection>>,
}

impl RealtimeChannel {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            events,
            conn: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.conn
            .lock()
            .as_ref()
            .map(|c| c.alive.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Open the socket for `user_id`. A live connection for the same user is
    /// kept; one for another user is torn down first.
    pub async fn connect(&self, socket_url: &Url, user_id: &str) -> ClientResult<()> {
        let stale = {
            let mut guard = self.conn.lock();
            let reuse = guard
                .as_ref()
                .map(|c| c.user_id == user_id && c.alive.load(Ordering::SeqCst))
                .unwrap_or(false);
            if reuse {
                return Ok(());
            }
            guard.take()
        };
        if let Some(old) = stale {
            close(old).await;
        }

        let mut url = socket_url.clone();
        url.query_pairs_mut().append_pair("userId", user_id);
        let (ws, _) = connect_async(url.as_str()).await?;
        info!(%user_id, "realtime channel connected");

        let alive = Arc::new(AtomicBool::new(true));
        let (closer, close_rx) = oneshot::channel();
        let reader = tokio::spawn(pump(ws, self.events.clone(), alive.clone(), close_rx));
        let previous = self.conn.lock().replace(Connection {
            user_id: user_id.to_string(),
            closer: Some(closer),
            reader,
            alive,
        });
        // lost a race with a concurrent connect
        if let Some(previous) = previous {
            close(previous).await;
        }
        Ok(())
    }

    /// Close the socket, if any. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            close(conn).await;
            info!("realtime channel disconnected");
        }
    }
}

async fn close(mut conn: Connection) {
    if let Some(closer) = conn.closer.take() {
        let _ = closer.send(());
    }
    if tokio::time::timeout(Duration::from_secs(2), &mut conn.reader)
        .await
        .is_err()
    {
        debug!("realtime reader did not stop in time");
    }
    conn.alive.store(false, Ordering::SeqCst);
}

async fn pump(
    ws: Socket,
    events: broadcast::Sender<ServerEvent>,
    alive: Arc<AtomicBool>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(txt))) => dispatch(&events, &txt),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "realtime channel error");
                    break;
                }
            },
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("realtime reader finished");
}

fn dispatch(events: &broadcast::Sender<ServerEvent>, txt: &str) {
    let frame: SocketFrame = match serde_json::from_str(txt) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "malformed realtime frame");
            return;
        }
    };
    let name = frame.event.clone();
    match ServerEvent::from_frame(frame) {
        Ok(Some(ev)) => {
            // no subscribers is fine
            let _ = events.send(ev);
        }
        Ok(None) => debug!(event = %name, "ignoring realtime event"),
        Err(e) => warn!(event = %name, error = %e, "undecodable realtime payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_filters_frames() {
        let (tx, mut rx) = broadcast::channel(8);
        dispatch(&tx, "not json");
        dispatch(&tx, r#"{"event":"typing","data":{}}"#);
        dispatch(&tx, r#"{"event":"getOnlineUsers","data":["u1","u2"]}"#);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::OnlineUsers(vec!["u1".into(), "u2".into()])
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fresh_channel_is_disconnected() {
        let ch = RealtimeChannel::new(4);
        assert!(!ch.is_connected());
    }
}
