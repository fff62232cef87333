//! In-process robot endpoint for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// A fake robot: accepts WebSocket links, records every JSON text frame it
/// receives, and pushes frames to every connected gateway link.
pub struct FakeRobot {
    addr: SocketAddr,
    frames: Arc<Mutex<Vec<Value>>>,
    outbound: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeRobot {
    /// Binds an ephemeral port and starts accepting.
    pub async fn start() -> Option<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().ok()?;
        let frames = Arc::new(Mutex::new(Vec::new()));
        let (outbound, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let frames = Arc::clone(&frames);
            let outbound = outbound.clone();
            let connections = Arc::clone(&connections);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let rx = outbound.subscribe();
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&frames),
                        rx,
                        Arc::clone(&connections),
                    ));
                }
            }
        });

        Some(Self {
            addr,
            frames,
            outbound,
            connections,
            task,
        })
    }

    /// `ws://` URL of the endpoint.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Every frame received so far.
    pub async fn frames(&self) -> Vec<Value> {
        self.frames.lock().await.clone()
    }

    /// Waits up to two seconds for a frame matching `pred`.
    pub async fn wait_for(&self, pred: impl Fn(&Value) -> bool) -> Option<Value> {
        for _ in 0..200 {
            if let Some(found) = self.frames.lock().await.iter().find(|f| pred(f)) {
                return Some(found.clone());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// Waits up to two seconds until `n` frames match `pred`, then returns
    /// the matching frames.
    pub async fn wait_count(&self, pred: impl Fn(&Value) -> bool, n: usize) -> Vec<Value> {
        let mut matching = Vec::new();
        for _ in 0..200 {
            matching = self
                .frames
                .lock()
                .await
                .iter()
                .filter(|f| pred(f))
                .cloned()
                .collect();
            if matching.len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        matching
    }

    /// Waits until at least `n` gateway links are open.
    pub async fn wait_connected(&self, n: usize) -> bool {
        for _ in 0..200 {
            if self.connections.load(Ordering::SeqCst) >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Sends `text` to every open link.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.outbound.send(text.into());
    }
}

impl Drop for FakeRobot {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    frames: Arc<Mutex<Vec<Value>>>,
    mut outbound: broadcast::Receiver<String>,
    connections: Arc<AtomicUsize>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    connections.fetch_add(1, Ordering::SeqCst);
    let (mut tx, mut rx) = ws.split();
    loop {
        tokio::select! {
            msg = rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        frames.lock().await.push(value);
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                _ => {}
            },
            out = outbound.recv() => match out {
                Ok(text) => {
                    if tx.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    connections.fetch_sub(1, Ordering::SeqCst);
}

/// Returns a `ws://` URL on which nothing listens.
pub async fn dead_url() -> Option<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
    let addr = listener.local_addr().ok()?;
    drop(listener);
    Some(format!("ws://{addr}"))
}

/// Reads `path` (dot separated) out of a JSON value.
pub fn at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}
