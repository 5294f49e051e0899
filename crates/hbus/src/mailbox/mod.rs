// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mailbox abstraction
//!
//! A mailbox is a replicated value container kept consistent between two
//! bus endpoints. The trait covers the full dispatcher-facing contract:
//! produce an outgoing protocol message on demand, consume an incoming one
//! (possibly producing an immediate reply), and react to a bus reset.
//!
//! The scalar variant lives in [`scalar`].

pub mod scalar;

pub use scalar::ScalarMailbox;

use crate::error::Result;

/// Outcome of feeding an inbound message to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Message consumed; a reply of this many bytes was written
    Reply(usize),
    /// Message consumed; nothing to send back
    Consumed,
    /// Command byte not understood (protocol anomaly, never fatal)
    Unrecognized,
}

/// Reserved per-mailbox configuration flags (no consumers yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxFlags(pub u8);

impl MailboxFlags {
    /// No flags set
    pub const NONE: Self = Self(0);
}

/// Notified exactly once per accepted incoming change.
///
/// `changed` is true when the remote message announced a fresh write
/// (SEND_VALUE_CHANGE) rather than a routine resynchronization.
pub trait MailboxObserver {
    /// An inbound value was accepted into the mailbox.
    fn on_mailbox_change(&mut self, value: u32, changed: bool);
}

/// Dispatcher-facing mailbox contract.
pub trait Mailbox {
    /// Write the owed outgoing message into `buf`, returning its length.
    ///
    /// The dispatcher only calls this when `pending_message()` is true;
    /// generation resets the retry cooldown.
    fn generate_message(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Consume an inbound message, optionally writing a reply into `reply`.
    fn handle_message(&mut self, msg: &[u8], reply: &mut [u8]) -> Result<Disposition>;

    /// Recompute synchronization state after a bus-wide reset.
    fn bus_reset(&mut self);

    /// True iff a send is owed and the retry window is open.
    fn pending_message(&self) -> bool;

    /// Diagnostic label (never wire-visible).
    fn description(&self) -> &str;

    /// Reserved configuration flags.
    fn flags(&self) -> MailboxFlags;
}
