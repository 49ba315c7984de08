//! WebSocket subscription server
//!
//! Clients open a persistent connection and subscribe to individual polls;
//! tally updates for those polls are pushed as JSON text frames. A
//! connection only ever sees updates published after it subscribed.

use crate::{SubscriptionId, SubscriptionManager};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use vote_events::PollId;

/// Client-to-server frames
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientRequest {
    Subscribe {
        #[serde(rename = "pollId")]
        poll_id: PollId,
    },
    Unsubscribe {
        #[serde(rename = "pollId")]
        poll_id: PollId,
    },
}

/// WebSocket server
pub struct WebSocketServer {
    manager: Arc<SubscriptionManager>,
}

impl WebSocketServer {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self { manager }
    }

    /// Run the WebSocket server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("WebSocket server listening on {}", addr);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            let manager = self.manager.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, manager).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle one subscriber connection
async fn handle_connection(
    stream: TcpStream,
    manager: Arc<SubscriptionManager>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // All outbound frames funnel through one writer task; forwarders for
    // each subscription feed it.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // This connection's subscriptions, one forwarder task each
    let mut active: HashMap<PollId, (SubscriptionId, JoinHandle<()>)> = HashMap::new();

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let request: ClientRequest = match serde_json::from_str(&text) {
                    Ok(req) => req,
                    Err(_) => continue,
                };

                match request {
                    ClientRequest::Subscribe { poll_id } => {
                        if active.contains_key(&poll_id) {
                            continue;
                        }
                        let (sub_id, receiver) = manager.subscribe(poll_id);
                        let forwarder = spawn_forwarder(receiver, out_tx.clone());
                        active.insert(poll_id, (sub_id, forwarder));

                        let ack = json!({ "subscribed": poll_id }).to_string();
                        let _ = out_tx.send(Message::Text(ack)).await;
                    }
                    ClientRequest::Unsubscribe { poll_id } => {
                        if let Some((sub_id, forwarder)) = active.remove(&poll_id) {
                            manager.unsubscribe(sub_id);
                            forwarder.abort();
                        }
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Clean up subscriptions on disconnect
    for (_, (sub_id, forwarder)) in active {
        manager.unsubscribe(sub_id);
        forwarder.abort();
    }
    writer.abort();

    Ok(())
}

/// Forward one subscription's updates into the connection's outbound queue
fn spawn_forwarder(
    mut receiver: broadcast::Receiver<vote_events::TallyUpdate>,
    out_tx: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    let payload = match serde_json::to_string(&update) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!("Failed to encode tally update: {}", e);
                            continue;
                        }
                    };
                    if out_tx.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Slow consumer: oldest updates dropped, keep going.
                    tracing::warn!("Subscriber lagged, {} tally updates dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
