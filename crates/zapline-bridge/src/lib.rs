// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Web bridge gateway connector.
//!
//! The bridge is an external process that owns the WhatsApp Web protocol.
//! Each tenant connection is one WebSocket: a `start` frame resumes or begins
//! pairing, after which the bridge streams QR codes, credential updates,
//! inbound messages and send acknowledgements as JSON frames.

pub mod connector;
pub mod protocol;
pub mod socket;

pub use connector::BridgeConnector;
pub use protocol::{BridgeFrame, ClientFrame, CloseCode};
pub use socket::BridgeSocket;
