//! Wire protocol for the snapshot server.

use serde::{Deserialize, Serialize};

use crate::event::DisplayData;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Protocol version handshake.
    Hello { version: u8 },
    /// Published profiling snapshot.
    Snapshot(DisplayData),
    /// Server is shutting down.
    Goodbye,
}

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request protocol version.
    Hello,
    /// Demand an immediate republish, bypassing the publish interval.
    Invalidate,
    /// Client disconnecting.
    Goodbye,
}

/// Encode a message to bytes with length prefix.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    let data = bincode::serialize(msg)?;
    let len = data.len() as u32;
    let mut result = Vec::with_capacity(4 + data.len());
    result.extend_from_slice(&len.to_le_bytes());
    result.extend(data);
    Ok(result)
}

/// Decode a message from bytes (without length prefix).
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(data)
}
