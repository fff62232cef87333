//! WebSocket transport shared by the ROS-bridge, ROS 2 bus, and raw
//! WebSocket adapters.
//!
//! A [`WsLink`] owns three tasks: a writer draining an outbound queue into
//! the socket, a reader decoding text frames into [`InboundMessage`]s, and
//! a keep-alive pinger. All three stop on [`WsLink::close`] or drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{InboundMessage, InboundSink};
use crate::error::GatewayError;

const OUTBOUND_QUEUE: usize = 64;
const CLOSE_GRACE: Duration = Duration::from_millis(250);

type Ack = oneshot::Sender<Result<(), String>>;

/// Live WebSocket connection with background reader, writer, and pinger.
#[derive(Debug)]
pub(crate) struct WsLink {
    url: String,
    outbound: mpsc::Sender<(Message, Option<Ack>)>,
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WsLink {
    /// Opens `url` and starts the background tasks.
    ///
    /// Every text frame is handed to `decode`; decoded messages go to
    /// `inbound`. Undecodable frames are dropped.
    pub(crate) async fn open<F>(
        url: &str,
        keepalive: Duration,
        inbound: InboundSink,
        decode: F,
    ) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<InboundMessage> + Send + Sync + 'static,
    {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| format!("{url}: {e}"))?;
        let (mut sink, mut source) = stream.split();
        let alive = Arc::new(AtomicBool::new(true));
        let (outbound, mut queue) = mpsc::channel::<(Message, Option<Ack>)>(OUTBOUND_QUEUE);

        let writer_alive = Arc::clone(&alive);
        let writer = tokio::spawn(async move {
            while let Some((message, ack)) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                let result = sink.send(message).await.map_err(|e| e.to_string());
                let failed = result.is_err();
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
                if failed || closing {
                    writer_alive.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });

        let reader_alive = Arc::clone(&alive);
        let reader_url = url.to_string();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(message) = decode(text.as_str())
                            && inbound.send(message).await.is_err()
                        {
                            tracing::debug!(url = %reader_url, "inbound receiver dropped");
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            tracing::debug!(url = %reader_url, "websocket link reader stopped");
        });

        let pinger_queue = outbound.clone();
        let pinger = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keepalive.max(Duration::from_millis(10)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if pinger_queue
                    .send((Message::Ping(Default::default()), None))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(Self {
            url: url.to_string(),
            outbound,
            alive,
            tasks: vec![writer, reader, pinger],
        })
    }

    /// Sends a text frame and waits until the socket accepted it.
    pub(crate) async fn send_text(&self, text: String) -> Result<(), GatewayError> {
        if !self.is_alive() {
            return Err(GatewayError::SendFailure(format!(
                "websocket link to {} is down",
                self.url
            )));
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound
            .send((Message::text(text), Some(ack_tx)))
            .await
            .map_err(|_| GatewayError::SendFailure(format!("writer for {} stopped", self.url)))?;
        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(GatewayError::SendFailure(e)),
            Err(_) => Err(GatewayError::SendFailure(format!(
                "writer for {} dropped the frame",
                self.url
            ))),
        }
    }

    /// Serializes `value` and sends it as a text frame.
    pub(crate) async fn send_json(&self, value: &serde_json::Value) -> Result<(), GatewayError> {
        let text =
            serde_json::to_string(value).map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.send_text(text).await
    }

    /// Returns `false` once either direction has failed or closed.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Sends a close frame (best-effort, bounded) and stops every task.
    pub(crate) async fn close(&self) {
        if self.is_alive() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if self
                .outbound
                .send((Message::Close(None), Some(ack_tx)))
                .await
                .is_ok()
            {
                let _ = tokio::time::timeout(CLOSE_GRACE, ack_rx).await;
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        self.abort_tasks();
    }

    fn abort_tasks(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}
