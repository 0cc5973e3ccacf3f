//! New-head subscriptions over the node WebSocket (`chain_subscribeNewHeads`).
//!
//! Each subscription owns its socket and a background task that forwards
//! `chain_newHead` notifications as heights. Unsubscribing sends
//! `chain_unsubscribeNewHeads` and closes the socket; if the node drops the
//! socket the height stream simply ends.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use chainfeed_core::client::HeadSubscription;
use chainfeed_core::error::FeedError;

use crate::decode;

const SUBSCRIBE_ID: u64 = 1;
const UNSUBSCRIBE_ID: u64 = 2;
const HEAD_BUFFER: usize = 64;

pub(crate) fn subscribe_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": SUBSCRIBE_ID,
        "method": "chain_subscribeNewHeads",
        "params": []
    })
}

pub(crate) fn unsubscribe_request(subscription: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": UNSUBSCRIBE_ID,
        "method": "chain_unsubscribeNewHeads",
        "params": [subscription]
    })
}

/// What a frame from the node means to a head subscription.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Reply to the subscribe call carrying the subscription id.
    Subscribed(String),
    /// The node rejected the subscribe call.
    Rejected(String),
    Head(u64),
    Other,
}

pub(crate) fn parse_frame(text: &str, subscription: Option<&str>) -> Result<Frame, FeedError> {
    let val: Value = serde_json::from_str(text)?;

    if val.get("id").and_then(Value::as_u64) == Some(SUBSCRIBE_ID) {
        if let Some(err) = val.get("error") {
            return Ok(Frame::Rejected(err.to_string()));
        }
        return Ok(match val.get("result").and_then(Value::as_str) {
            Some(id) => Frame::Subscribed(id.to_string()),
            None => Frame::Rejected(format!("unexpected subscribe reply {val}")),
        });
    }

    if val.get("method").and_then(Value::as_str) != Some("chain_newHead") {
        return Ok(Frame::Other);
    }
    let params = &val["params"];
    if subscription.is_some() && params["subscription"].as_str() != subscription {
        return Ok(Frame::Other);
    }
    let number = params
        .get("result")
        .and_then(|header| header.get("number"))
        .ok_or_else(|| FeedError::Decode("chain_newHead without a number".into()))?;
    Ok(Frame::Head(decode::parse_number(number)?))
}

/// Open a socket to `url`, subscribe to new heads and return once the node
/// has confirmed the subscription.
pub async fn subscribe_new_heads(url: &str) -> Result<HeadSubscription, FeedError> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| FeedError::Connection(format!("{url}: {e}")))?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::Text(subscribe_request().to_string()))
        .await
        .map_err(|e| FeedError::Connection(e.to_string()))?;

    let subscription = loop {
        let msg = stream
            .next()
            .await
            .ok_or_else(|| FeedError::Connection("socket closed before subscribing".into()))?
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        let Message::Text(text) = msg else { continue };
        match parse_frame(&text, None)? {
            Frame::Subscribed(id) => break id,
            Frame::Rejected(reason) => {
                return Err(FeedError::Rpc(format!("chain_subscribeNewHeads: {reason}")))
            }
            _ => {}
        }
    };
    tracing::debug!(%url, %subscription, "subscribed to new heads");

    let (heads_tx, heads_rx) = mpsc::channel(HEAD_BUFFER);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let url = url.to_string();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    let req = unsubscribe_request(&subscription).to_string();
                    let _ = sink.send(Message::Text(req)).await;
                    let _ = sink.close().await;
                    tracing::debug!(%url, "head subscription cancelled");
                    return;
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text, Some(&subscription)) {
                            Ok(Frame::Head(height)) => {
                                if heads_tx.send(height).await.is_err() {
                                    return;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(%url, error = %e, "undecodable head notification"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!(%url, "node closed the head subscription socket");
                            return;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(%url, error = %e, "head subscription socket error");
                            return;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    });

    Ok(HeadSubscription::new(heads_rx, move || {
        let _ = cancel_tx.send(());
    }))
}
