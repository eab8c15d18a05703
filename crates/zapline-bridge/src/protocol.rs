// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged with the WhatsApp Web bridge.
//!
//! Client -> bridge:
//! ```json
//! {"type": "start", "tenant_id": "acme", "credentials": "<base64>|null"}
//! {"type": "send_text", "request_id": "...", "to": "5511...@s.whatsapp.net", "text": "..."}
//! {"type": "send_media", "request_id": "...", "to": "...", "url": "https://...", "caption": "..."}
//! {"type": "logout"}
//! ```
//!
//! Bridge -> client:
//! ```json
//! {"type": "qr", "code": "2@..."}
//! {"type": "credentials", "blob": "<base64>"}
//! {"type": "connected", "phone_number": "5511...", "business_name": "..."}
//! {"type": "message", "id": "...", "from": "...", "text": "...", "from_me": false}
//! {"type": "closed", "reason": "connection_lost|logged_out|handshake_failed", "detail": "..."}
//! {"type": "ack", "request_id": "...", "message_id": "..."}
//! {"type": "error", "request_id": "...", "message": "..."}
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zapline_core::{
    CloseReason, CredentialBlob, GatewayEvent, InboundMessage, MessageId, ZaplineError,
};

/// Frame written to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Start {
        tenant_id: String,
        credentials: Option<String>,
    },
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
    SendMedia {
        request_id: String,
        to: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Logout,
}

/// Close codes the bridge reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCode {
    ConnectionLost,
    LoggedOut,
    HandshakeFailed,
}

/// Frame read from the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Qr {
        code: String,
    },
    Credentials {
        blob: String,
    },
    Connected {
        phone_number: String,
        #[serde(default)]
        business_name: Option<String>,
    },
    Message {
        id: String,
        from: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        from_me: bool,
        #[serde(default)]
        push_name: Option<String>,
        /// Unix seconds.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    Closed {
        reason: CloseCode,
        #[serde(default)]
        detail: Option<String>,
    },
    Ack {
        request_id: String,
        message_id: String,
    },
    Error {
        #[serde(default)]
        request_id: Option<String>,
        message: String,
    },
}

/// Where a decoded bridge frame goes.
#[derive(Debug, PartialEq)]
pub(crate) enum Routed {
    /// Onto the connection's event stream.
    Event(GatewayEvent),
    /// Completes a pending send.
    Ack {
        request_id: String,
        message_id: MessageId,
    },
    /// Fails a pending send, or is only logged when uncorrelated.
    Error {
        request_id: Option<String>,
        message: String,
    },
}

impl BridgeFrame {
    pub(crate) fn route(self) -> Result<Routed, ZaplineError> {
        let event = match self {
            Self::Qr { code } => GatewayEvent::Qr { code },
            Self::Credentials { blob } => GatewayEvent::CredentialsUpdated(decode_credentials(&blob)?),
            Self::Connected {
                phone_number,
                business_name,
            } => GatewayEvent::Connected {
                phone_number,
                business_name,
            },
            Self::Message {
                id,
                from,
                text,
                from_me,
                push_name,
                timestamp,
            } => GatewayEvent::Message(InboundMessage {
                id: MessageId(id),
                sender: from,
                text,
                from_me,
                push_name,
                timestamp: timestamp
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .unwrap_or_else(Utc::now),
            }),
            Self::Closed { reason, detail } => {
                let detail = detail.unwrap_or_default();
                GatewayEvent::Closed(match reason {
                    CloseCode::ConnectionLost => CloseReason::ConnectionLost(detail),
                    CloseCode::LoggedOut => CloseReason::LoggedOut,
                    CloseCode::HandshakeFailed => CloseReason::HandshakeFailed(detail),
                })
            }
            Self::Ack {
                request_id,
                message_id,
            } => {
                return Ok(Routed::Ack {
                    request_id,
                    message_id: MessageId(message_id),
                });
            }
            Self::Error {
                request_id,
                message,
            } => return Ok(Routed::Error { request_id, message }),
        };
        Ok(Routed::Event(event))
    }
}

pub fn encode_credentials(blob: &CredentialBlob) -> String {
    STANDARD.encode(blob.as_bytes())
}

pub fn decode_credentials(encoded: &str) -> Result<CredentialBlob, ZaplineError> {
    STANDARD
        .decode(encoded.trim())
        .map(CredentialBlob)
        .map_err(|e| ZaplineError::Gateway {
            message: "bridge sent malformed credentials".to_string(),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_text_wire_shape() {
        let frame = ClientFrame::SendText {
            request_id: "r1".into(),
            to: "5511988887777@s.whatsapp.net".into(),
            text: "Olá".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "send_text");
        assert_eq!(value["request_id"], "r1");
        assert_eq!(value["text"], "Olá");
    }

    #[test]
    fn start_without_credentials_sends_null() {
        let frame = ClientFrame::Start {
            tenant_id: "acme".into(),
            credentials: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"start","tenant_id":"acme","credentials":null}"#);
    }

    #[test]
    fn media_without_caption_omits_field() {
        let frame = ClientFrame::SendMedia {
            request_id: "r2".into(),
            to: "x@s.whatsapp.net".into(),
            url: "https://cdn.example.com/a.jpg".into(),
            caption: None,
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("caption").is_none());
    }

    #[test]
    fn closed_frames_map_to_close_reasons() {
        let frame: BridgeFrame =
            serde_json::from_str(r#"{"type":"closed","reason":"logged_out"}"#).unwrap();
        assert_eq!(
            frame.route().unwrap(),
            Routed::Event(GatewayEvent::Closed(CloseReason::LoggedOut))
        );

        let frame: BridgeFrame = serde_json::from_str(
            r#"{"type":"closed","reason":"handshake_failed","detail":"bad noise key"}"#,
        )
        .unwrap();
        assert_eq!(
            frame.route().unwrap(),
            Routed::Event(GatewayEvent::Closed(CloseReason::HandshakeFailed(
                "bad noise key".into()
            )))
        );
    }

    #[test]
    fn message_frame_defaults() {
        let frame: BridgeFrame = serde_json::from_str(
            r#"{"type":"message","id":"ABC","from":"5511988887777@s.whatsapp.net","text":"oi","timestamp":1700000000}"#,
        )
        .unwrap();
        let Routed::Event(GatewayEvent::Message(message)) = frame.route().unwrap() else {
            panic!("expected a message event");
        };
        assert_eq!(message.id, MessageId::from("ABC"));
        assert!(!message.from_me);
        assert!(message.push_name.is_none());
        assert_eq!(message.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn credentials_are_base64() {
        let blob = CredentialBlob(b"noise-key".to_vec());
        let encoded = encode_credentials(&blob);
        assert_eq!(encoded, "bm9pc2Uta2V5");
        let frame = BridgeFrame::Credentials { blob: encoded };
        assert_eq!(
            frame.route().unwrap(),
            Routed::Event(GatewayEvent::CredentialsUpdated(blob))
        );
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        let err = decode_credentials("not base64!").unwrap_err();
        assert!(matches!(err, ZaplineError::Gateway { .. }));
    }

    #[test]
    fn unknown_frame_type_fails_to_parse() {
        assert!(serde_json::from_str::<BridgeFrame>(r#"{"type":"presence"}"#).is_err());
    }
}
