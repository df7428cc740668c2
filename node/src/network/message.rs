//! Wire protocol: a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! body. No libp2p, no bincode — plain length-prefixed JSON over a TCP
//! stream.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{NetworkError, NodeResult};

/// Upper bound on a single framed message. A message whose declared length
/// exceeds this is rejected before its body is read.
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

const LENGTH_PREFIX_BYTES: usize = 4;

/// The exhaustive set of messages a FractalChain peer will send or accept.
/// Anything else deserializes into `Unknown` and is logged and dropped
/// rather than rejected outright, so a newer peer's additional message
/// types don't break an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Hello,
    GetPeers,
    Peers,
    NewBlock,
    BlockAnnouncement,
    NewTransaction,
    GetChainInfo,
    ChainInfo,
    GetBlocks,
    Blocks,
    Ping,
    Pong,
    Error,
    /// Catches any tag this build doesn't recognize, so a node running an
    /// older binary can still talk to peers that have grown new message
    /// types — `dispatch_inner` logs and drops these rather than tearing
    /// down the connection.
    #[serde(other)]
    Unknown,
}

/// The envelope every message travels in. `payload` carries the
/// message-type-specific body as a JSON value so the envelope's shape never
/// changes even as payloads vary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub msg_type: MessageType,
    pub payload: serde_json::Value,
    pub msg_id: String,
    pub timestamp: f64,
    pub sender_id: String,
}

impl NetworkMessage {
    pub fn new(
        msg_type: MessageType,
        payload: serde_json::Value,
        msg_id: String,
        timestamp: f64,
        sender_id: String,
    ) -> Self {
        Self {
            msg_type,
            payload,
            msg_id,
            timestamp,
            sender_id,
        }
    }

    pub fn to_frame(&self) -> NodeResult<Vec<u8>> {
        let body = serde_json::to_vec(self).map_err(|e| {
            NetworkError::ConnectFailed(self.sender_id.clone(), e.to_string())
        })?;
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::OversizeMessage(body.len()).into());
        }
        let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }
}

/// Writes one length-prefixed JSON frame to `writer`.
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    message: &NetworkMessage,
) -> NodeResult<()> {
    let frame = message.to_frame()?;
    writer.write_all(&frame).await.map_err(|e| {
        NetworkError::ConnectFailed(message.sender_id.clone(), e.to_string())
    })?;
    Ok(())
}

/// Reads one length-prefixed JSON frame from `reader`, rejecting declared
/// lengths over [`MAX_MESSAGE_SIZE`] without reading the body.
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> NodeResult<NetworkMessage> {
    let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| NetworkError::ConnectFailed("peer".to_string(), e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(NetworkError::OversizeMessage(len).into());
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| NetworkError::ConnectFailed("peer".to_string(), e.to_string()))?;

    serde_json::from_slice(&body)
        .map_err(|e| NetworkError::ConnectFailed("peer".to_string(), e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_a_duplex_stream() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        let msg = NetworkMessage::new(
            MessageType::Ping,
            serde_json::json!({}),
            "msg-1".to_string(),
            1_700_000_000.0,
            "node-a".to_string(),
        );

        write_message(&mut a, &msg).await.unwrap();
        let received = read_message(&mut b).await.unwrap();

        assert_eq!(received.msg_type, MessageType::Ping);
        assert_eq!(received.msg_id, "msg-1");
        assert_eq!(received.sender_id, "node-a");
    }

    #[test]
    fn message_type_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&MessageType::NewBlock).unwrap();
        assert_eq!(json, "\"NEW_BLOCK\"");
    }

    #[test]
    fn oversize_frame_is_rejected_before_serialization_succeeds() {
        let huge = serde_json::Value::String("x".repeat(MAX_MESSAGE_SIZE + 1));
        let msg = NetworkMessage::new(
            MessageType::NewTransaction,
            huge,
            "msg-2".to_string(),
            1_700_000_000.0,
            "node-a".to_string(),
        );
        assert!(matches!(
            msg.to_frame(),
            Err(crate::error::NodeError::Network(NetworkError::OversizeMessage(_)))
        ));
    }
}
