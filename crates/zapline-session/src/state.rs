// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-tenant session record owned by a connection actor.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use zapline_core::{
    CredentialBlob, FailureReason, SessionState, SessionStatus, TenantId, ZaplineError,
};

/// Mutable lifecycle record of one tenant's connection.
///
/// Only the owning actor mutates it; everyone else sees [`SessionStatus`]
/// snapshots.
#[derive(Debug)]
pub struct TenantSession {
    tenant_id: TenantId,
    state: SessionState,
    qr_code: Option<String>,
    phone_number: Option<String>,
    business_name: Option<String>,
    credentials: Option<CredentialBlob>,
    reconnect_attempts: u32,
    qr_rotations: u32,
    failure: Option<FailureReason>,
    last_activity: Instant,
    last_activity_at: DateTime<Utc>,
}

impl TenantSession {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            state: SessionState::Uninitialized,
            qr_code: None,
            phone_number: None,
            business_name: None,
            credentials: None,
            reconnect_attempts: 0,
            qr_rotations: 0,
            failure: None,
            last_activity: Instant::now(),
            last_activity_at: Utc::now(),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next` if the lifecycle allows it.
    ///
    /// Leaving `AwaitingQrScan` drops the QR so a stale code is never served.
    /// Reaching `Connected` clears the retry counters and any failure.
    pub fn transition(&mut self, next: SessionState) -> Result<SessionState, ZaplineError> {
        let previous = self.state;
        if !previous.can_transition_to(next) {
            return Err(ZaplineError::Internal(format!(
                "invalid session transition {previous} -> {next} for tenant {}",
                self.tenant_id
            )));
        }
        self.state = next;
        if next != SessionState::AwaitingQrScan {
            self.qr_code = None;
        }
        match next {
            SessionState::Connected => {
                self.reconnect_attempts = 0;
                self.qr_rotations = 0;
                self.failure = None;
            }
            SessionState::Connecting if previous == SessionState::Uninitialized => {
                self.failure = None;
            }
            _ => {}
        }
        Ok(previous)
    }

    /// Serves a fresh QR. Only meaningful while awaiting a scan.
    pub fn set_qr_code(&mut self, code: String) {
        if self.state == SessionState::AwaitingQrScan {
            self.qr_code = Some(code);
        }
    }

    pub fn set_account(&mut self, phone_number: String, business_name: Option<String>) {
        self.phone_number = Some(phone_number);
        self.business_name = business_name;
    }

    pub fn credentials(&self) -> Option<&CredentialBlob> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Option<CredentialBlob>) {
        self.credentials = credentials;
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Counts one more failed connection attempt and returns the new total.
    pub fn record_attempt(&mut self) -> u32 {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        self.reconnect_attempts
    }

    /// Counts one more expired QR and returns the new total.
    pub fn record_qr_rotation(&mut self) -> u32 {
        self.qr_rotations = self.qr_rotations.saturating_add(1);
        self.qr_rotations
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn set_failure(&mut self, reason: FailureReason) {
        self.failure = Some(reason);
    }

    /// Marks inbound or outbound traffic.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn snapshot(&self) -> SessionStatus {
        let connected = self.state == SessionState::Connected;
        SessionStatus {
            tenant_id: self.tenant_id.clone(),
            status: self.state,
            connected,
            qr_code: self.qr_code.clone(),
            phone_number: self.phone_number.clone(),
            business_name: self.business_name.clone(),
            reason: self.failure,
            reconnect_attempts: self.reconnect_attempts,
            last_activity_at: Some(self.last_activity_at),
        }
    }
}
