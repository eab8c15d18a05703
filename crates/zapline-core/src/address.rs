// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp address helpers.

use crate::error::ZaplineError;

/// Server suffix for individual user addresses.
pub const USER_SERVER: &str = "s.whatsapp.net";

/// Strips everything but ASCII digits from a phone number or JID user part.
///
/// `"+55 (11) 99999-0000"` and `"5511999990000@s.whatsapp.net"` both yield
/// `"5511999990000"`. Device suffixes (`:12`) after the user part are dropped.
pub fn phone_digits(raw: &str) -> String {
    let user = raw.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    user.chars().filter(char::is_ascii_digit).collect()
}

/// Turns a caller-supplied recipient into a full address.
///
/// Full JIDs (anything containing `@`) pass through untouched. Plain phone
/// numbers become `<digits>@s.whatsapp.net`.
pub fn normalize_recipient(raw: &str) -> Result<String, ZaplineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ZaplineError::InvalidInput("recipient must not be empty".into()));
    }
    if trimmed.contains('@') {
        return Ok(trimmed.to_string());
    }
    let digits = phone_digits(trimmed);
    if digits.is_empty() {
        return Err(ZaplineError::InvalidInput(format!(
            "recipient {trimmed:?} has no phone digits"
        )));
    }
    Ok(format!("{digits}@{USER_SERVER}"))
}
