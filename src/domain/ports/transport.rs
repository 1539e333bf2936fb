use crate::domain::errors::RealtimeResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One open, full-duplex text connection.
///
/// Dropping `outbound` closes the connection; `inbound` ending means the peer closed it.
/// An `Err` on `inbound` reports an abrupt failure and is followed by the end of the stream.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<RealtimeResult<String>>,
}

/// Opens message-oriented connections to the realtime endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> RealtimeResult<TransportLink>;
}
