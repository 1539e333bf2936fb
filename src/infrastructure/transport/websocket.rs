use crate::domain::errors::{RealtimeError, RealtimeResult};
use crate::domain::ports::transport::{Transport, TransportLink};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// WebSocket transport carrying one STOMP frame per text message
#[derive(Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> RealtimeResult<TransportLink> {
        let (stream, response) = connect_async(url).await?;
        debug!(url, status = %response.status(), "WebSocket opened");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<RealtimeResult<String>>();

        // Writer: runs until every sender is dropped, then closes the socket
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!("WebSocket write failed: {}", e);
                    return;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        // Reader: ends the inbound stream on close or error
        tokio::spawn(async move {
            while let Some(received) = source.next().await {
                let forwarded = match received {
                    Ok(Message::Text(text)) => Ok(text),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes).map_err(|_| {
                        RealtimeError::Protocol("binary frame is not valid UTF-8".to_string())
                    }),
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "WebSocket closed by peer");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(Err(e.into()));
                        break;
                    }
                };
                if inbound_tx.send(forwarded).is_err() {
                    break;
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
