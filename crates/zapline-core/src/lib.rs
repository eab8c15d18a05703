// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Zapline session orchestrator.
//!
//! This crate provides the trait definitions, error type and common types
//! shared by every other crate in the workspace. Credential stores, gateway
//! connectors and downstream handlers all plug in through traits defined here.

pub mod address;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use address::{normalize_recipient, phone_digits};
pub use error::ZaplineError;
pub use types::{
    AdapterType, CloseReason, CredentialBlob, FailureReason, GatewayEvent, HealthStatus,
    InboundBatch, InboundMessage, MessageId, OutboundMessage, SessionState, SessionStatus,
    TenantId,
};

pub use traits::{
    CredentialStore, GatewayConnection, GatewayConnector, GatewaySocket, InboundHandler,
    PluginAdapter, TenantResolver,
};

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    const ALL_STATES: [SessionState; 7] = [
        SessionState::Uninitialized,
        SessionState::Connecting,
        SessionState::AwaitingQrScan,
        SessionState::Connected,
        SessionState::Reconnecting,
        SessionState::Disconnected,
        SessionState::Failed,
    ];

    #[test]
    fn session_state_wire_names() {
        assert_eq!(SessionState::AwaitingQrScan.to_string(), "AWAITING_QR_SCAN");
        assert_eq!(
            SessionState::from_str("RECONNECTING").unwrap(),
            SessionState::Reconnecting
        );
        let json = serde_json::to_string(&SessionState::Connected).unwrap();
        assert_eq!(json, "\"CONNECTED\"");
    }

    #[test]
    fn lifecycle_edges() {
        use SessionState::*;
        assert!(Uninitialized.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(AwaitingQrScan));
        assert!(AwaitingQrScan.can_transition_to(Connecting));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Failed));
        assert!(Reconnecting.can_transition_to(Disconnected));

        assert!(!Uninitialized.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(AwaitingQrScan));
        assert!(!Failed.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connecting));
    }

    #[test]
    fn disconnected_is_a_sink() {
        for next in ALL_STATES {
            assert!(!SessionState::Disconnected.can_transition_to(next));
        }
    }

    #[test]
    fn live_and_terminal_are_disjoint() {
        for state in ALL_STATES {
            assert!(!(state.is_live() && state.is_terminal()), "{state}");
        }
        assert!(!SessionState::Uninitialized.is_live());
        assert!(!SessionState::Uninitialized.is_terminal());
    }

    #[test]
    fn failure_reason_codes() {
        assert_eq!(FailureReason::PairingTimeout.to_string(), "pairing_timeout");
        let json = serde_json::to_string(&FailureReason::ReconnectExhausted).unwrap();
        assert_eq!(json, "\"reconnect_exhausted\"");
    }

    #[test]
    fn status_serializes_camel_case() {
        let mut status = SessionStatus::uninitialized(TenantId::from("acme"));
        status.qr_code = Some("2@abc".into());
        status.status = SessionState::AwaitingQrScan;
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["tenantId"], "acme");
        assert_eq!(value["status"], "AWAITING_QR_SCAN");
        assert_eq!(value["qrCode"], "2@abc");
        assert_eq!(value["connected"], false);
        assert!(value["phoneNumber"].is_null());
    }

    #[test]
    fn credential_blob_debug_hides_bytes() {
        let blob = CredentialBlob(b"secret-noise-key".to_vec());
        assert_eq!(format!("{blob:?}"), "CredentialBlob(16 bytes)");
    }

    #[test]
    fn adapter_traits_are_object_safe() {
        fn _store(_: &dyn CredentialStore) {}
        fn _connector(_: &dyn GatewayConnector) {}
        fn _socket(_: &dyn GatewaySocket) {}
        fn _handler(_: &dyn InboundHandler) {}
        fn _resolver(_: &dyn TenantResolver) {}
    }

    proptest! {
        #[test]
        fn tenant_parse_trims(raw in "[ \t]{0,3}[a-z0-9-]{1,20}[ \t]{0,3}") {
            let tenant = TenantId::parse(&raw).unwrap();
            prop_assert_eq!(tenant.as_str(), raw.trim());
        }

        #[test]
        fn blank_tenant_rejected(raw in "[ \t\n]{0,8}") {
            prop_assert!(TenantId::parse(&raw).is_err());
        }
    }
}
