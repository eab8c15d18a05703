// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `zapline pair` command implementation.
//!
//! Starts one tenant's session without the HTTP API and renders every QR
//! code it serves in the terminal until the phone links, pairing fails, or
//! the user interrupts. Credentials persist so a later `serve` reconnects
//! without a QR.

use qrcode::QrCode;
use qrcode::render::unicode::Dense1x2;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use zapline_config::ZaplineConfig;
use zapline_core::{FailureReason, SessionState, TenantId, ZaplineError};
use zapline_session::SessionEvent;

use crate::serve::init_tracing;
use crate::shutdown;
use crate::stack;

pub async fn run_pair(config: ZaplineConfig, tenant: &str) -> Result<(), ZaplineError> {
    init_tracing(&config.service.log_level);
    let tenant_id = TenantId::parse(tenant)?;

    let cancel = shutdown::install_signal_handler();
    let stack = stack::build(&config, cancel.clone()).await?;
    let events = stack.manager.subscribe();

    let result = pair_until_linked(&stack, &tenant_id, events, &cancel).await;

    stack.shutdown().await;
    result
}

async fn pair_until_linked(
    stack: &stack::Stack,
    tenant_id: &TenantId,
    mut events: broadcast::Receiver<SessionEvent>,
    cancel: &CancellationToken,
) -> Result<(), ZaplineError> {
    let outcome = stack.manager.initialize_session(tenant_id).await?;
    if outcome.already_connected || outcome.status.status == SessionState::Connected {
        println!(
            "{tenant_id} is already linked to {}",
            outcome.status.phone_number.as_deref().unwrap_or("an unknown number")
        );
        return Ok(());
    }
    if let Some(code) = outcome.status.qr_code.as_deref() {
        show_qr(tenant_id, code)?;
    }

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = cancel.cancelled() => {
                println!("pairing interrupted");
                return Ok(());
            }
        };
        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => {
                return Err(ZaplineError::Internal("session event bus closed".into()));
            }
        };
        if event.tenant_id() != tenant_id {
            continue;
        }
        match event {
            SessionEvent::QrCode { code, .. } => show_qr(tenant_id, &code)?,
            SessionEvent::Connected { phone_number, .. } => {
                println!("{tenant_id} linked to {phone_number}");
                return Ok(());
            }
            SessionEvent::Failed { reason, .. } => {
                let rotations = stack.manager.settings().max_qr_rotations;
                return Err(pairing_error(tenant_id, reason, rotations));
            }
            SessionEvent::Disconnected { .. } => {
                return Err(ZaplineError::NotConnected {
                    tenant_id: tenant_id.clone(),
                    state: SessionState::Disconnected,
                });
            }
            _ => {}
        }
    }
}

fn pairing_error(tenant_id: &TenantId, reason: FailureReason, rotations: u32) -> ZaplineError {
    match reason {
        FailureReason::PairingTimeout => ZaplineError::PairingTimeout {
            tenant_id: tenant_id.clone(),
            rotations,
        },
        other => ZaplineError::Gateway {
            message: format!("pairing {tenant_id} failed: {other}"),
            source: None,
        },
    }
}

fn show_qr(tenant_id: &TenantId, code: &str) -> Result<(), ZaplineError> {
    println!("Scan with WhatsApp > Linked devices to pair {tenant_id}:\n");
    println!("{}", render_qr(code)?);
    Ok(())
}

/// Renders a pairing code as terminal block characters.
fn render_qr(code: &str) -> Result<String, ZaplineError> {
    let qr = QrCode::new(code.as_bytes())
        .map_err(|e| ZaplineError::InvalidInput(format!("cannot encode QR code: {e}")))?;
    Ok(qr
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(true)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_codes_render_as_blocks() {
        let rendered = render_qr("2@Zs0kXJd4q1,eWl1Tlh4,9yVw1Q==").unwrap();
        assert!(rendered.lines().count() > 10);
        assert!(rendered.contains('█') || rendered.contains('▀') || rendered.contains('▄'));
    }

    #[test]
    fn timeout_failure_maps_to_pairing_timeout() {
        let err = pairing_error(&TenantId::from("acme"), FailureReason::PairingTimeout, 5);
        assert!(matches!(err, ZaplineError::PairingTimeout { rotations: 5, .. }));
        let err = pairing_error(&TenantId::from("acme"), FailureReason::HandshakeFailed, 5);
        assert!(err.to_string().contains("handshake_failed"));
    }
}
