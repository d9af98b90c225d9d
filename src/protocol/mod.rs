//! Wire format for framed TCP messages
//!
//! Every frame is a compact JSON header, the four byte delimiter `\r\n\r\n`,
//! then exactly `len` payload bytes:
//!
//! ```text
//! +---------------------------+------------+---------------------+
//! | header: UTF-8 JSON object | "\r\n\r\n" | payload (len bytes) |
//! +---------------------------+------------+---------------------+
//! ```
//!
//! Compact `serde_json` output escapes control characters inside strings,
//! so a serialized header can never contain the delimiter itself.

pub mod codec;

pub use codec::{
    discard_payload, encode_header, read_header, read_payload, write_frame, write_stream_frame,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Delimiter between header and payload
pub const HEADER_DELIMITER: &[u8; 4] = b"\r\n\r\n";

/// Upper bound for a serialized header, delimiter included
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// User supplied key/value pairs carried in the `md` header field
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Frame status, used for both user data and control traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    /// Regular user message
    Normal,
    /// Positive reply
    Success,
    /// Negative reply (e.g. sync request with no handler)
    Failure,
    /// Peer must authenticate before sending data
    AuthRequired,
    /// Authentication attempt carrying `psk`
    AuthRequested,
    /// Authentication accepted
    AuthSuccess,
    /// Authentication rejected; the connection will be closed
    AuthFailure,
    /// Server removed this client
    Removed,
    /// Server is shutting down
    Shutdown,
    /// Liveness probe with no payload
    Heartbeat,
    /// Idle timeout expired; the connection will be closed
    Timeout,
}

impl MessageStatus {
    /// Control frames never reach user event handlers
    pub fn is_control(&self) -> bool {
        !matches!(self, Self::Normal | Self::Success | Self::Failure)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// JSON frame header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Payload length in bytes
    #[serde(rename = "len")]
    pub content_length: u64,

    pub status: MessageStatus,

    #[serde(rename = "md", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(rename = "syncreq", default, skip_serializing_if = "is_false")]
    pub sync_request: bool,

    #[serde(rename = "syncresp", default, skip_serializing_if = "is_false")]
    pub sync_response: bool,

    /// Sync request expiration
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,

    /// Correlates a sync request with its response
    #[serde(rename = "convguid", default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,

    /// Pre-shared key, only present on `AuthRequested`
    #[serde(rename = "psk", default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<String>,

    /// Sender timestamp
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl FrameHeader {
    /// Create a header for a payload of `content_length` bytes
    pub fn new(status: MessageStatus, content_length: u64) -> Self {
        Self {
            content_length,
            status,
            metadata: None,
            sync_request: false,
            sync_response: false,
            expiration: None,
            conversation_id: None,
            preshared_key: None,
            timestamp: Utc::now(),
        }
    }

    /// Header for a regular data frame
    pub fn data(content_length: u64) -> Self {
        Self::new(MessageStatus::Normal, content_length)
    }

    /// Header for a payload-less control frame
    pub fn control(status: MessageStatus) -> Self {
        Self::new(status, 0)
    }

    /// Header for an authentication attempt
    pub fn auth_request(preshared_key: &str) -> Self {
        let mut header = Self::control(MessageStatus::AuthRequested);
        header.preshared_key = Some(preshared_key.to_string());
        header
    }

    /// Attach metadata; an empty map is dropped from the wire
    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata.filter(|md| !md.is_empty());
        self
    }

    /// Mark this frame as a sync request
    pub fn into_sync_request(mut self, conversation_id: Uuid, expiration: DateTime<Utc>) -> Self {
        self.sync_request = true;
        self.conversation_id = Some(conversation_id);
        self.expiration = Some(expiration);
        self
    }

    /// Mark this frame as the response to `conversation_id`
    pub fn into_sync_response(mut self, conversation_id: Uuid) -> Self {
        self.sync_response = true;
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Whether a sync request already expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// A received frame with its payload fully buffered
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub status: MessageStatus,
    pub metadata: Option<Metadata>,
    pub payload: Bytes,
    /// Sender timestamp
    pub timestamp: DateTime<Utc>,
    pub conversation_id: Option<Uuid>,
}

impl Message {
    /// Assemble a message from its header and payload
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self {
            status: header.status,
            metadata: header.metadata,
            payload,
            timestamp: header.timestamp,
            conversation_id: header.conversation_id,
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Look up a metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|md| md.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_header_uses_short_wire_keys() {
        let header = FrameHeader::data(12);
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["len"], 12);
        assert_eq!(json["status"], "Normal");
        assert!(json.get("ts").is_some());
        assert!(json.get("md").is_none());
        assert!(json.get("syncreq").is_none());
        assert!(json.get("psk").is_none());
    }

    #[test]
    fn test_sync_fields_serialized() {
        let id = Uuid::new_v4();
        let header = FrameHeader::data(0).into_sync_request(id, Utc::now());
        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["syncreq"], true);
        assert_eq!(json["convguid"], id.to_string());
        assert!(json.get("exp").is_some());
    }

    #[test]
    fn test_header_tolerates_missing_optional_keys() {
        let json = r#"{"len":3,"status":"Heartbeat","ts":"2024-01-01T00:00:00Z"}"#;
        let header: FrameHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.content_length, 3);
        assert_eq!(header.status, MessageStatus::Heartbeat);
        assert!(!header.sync_request);
        assert!(header.metadata.is_none());
    }

    #[test]
    fn test_empty_metadata_is_dropped() {
        let header = FrameHeader::data(0).with_metadata(Some(Metadata::new()));
        assert!(header.metadata.is_none());
    }

    #[test]
    fn test_expiration() {
        let now = Utc::now();
        let header = FrameHeader::data(0).into_sync_request(Uuid::new_v4(), now + Duration::seconds(5));
        assert!(!header.is_expired_at(now));
        assert!(header.is_expired_at(now + Duration::seconds(6)));
        assert!(!FrameHeader::data(0).is_expired_at(now));
    }

    #[test]
    fn test_control_statuses() {
        assert!(!MessageStatus::Normal.is_control());
        assert!(!MessageStatus::Failure.is_control());
        assert!(MessageStatus::AuthRequired.is_control());
        assert!(MessageStatus::Removed.is_control());
    }
}
