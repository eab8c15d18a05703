// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound message deduplication and debounce.
//!
//! Customers often split one thought across several quick messages. The
//! engine buffers fragments per (tenant, sender) until a quiet period passes,
//! then hands the joined text downstream exactly once.

pub mod engine;

pub use engine::{AddOutcome, BatchKey, DebounceEngine, DebounceSettings, Dispatch, FlushCallback};
