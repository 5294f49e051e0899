// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scalar mailbox: one replicated 32-bit value
//!
//! Implements the sync protocol over the 5-byte wire message: retransmit on
//! a cooldown until acknowledged, resolve contested writes in the
//! controller's favor, deliver one-shot change notifications, and re-derive
//! synchronization state across bus resets.

use crate::device::Role;
use crate::error::Result;
use crate::mailbox::{Disposition, Mailbox, MailboxFlags, MailboxObserver};
use crate::timing::RetryTimer;
use crate::wire::{MailboxCommand, MailboxMsg};
use std::time::Duration;

/// Replicated 32-bit value with retry, acknowledgment and contention
/// handling.
///
/// Flag-space state machine (`sync` = synchronized, `cc` = caller_changed):
///
/// ```text
///                          set(v) / trigger()
/// +---------------+ ----------------------------> +--------------------+
/// | Synchronized  |                               | PendingLocalChange |
/// |  sync=1 cc=0  | <---------------------------- |    sync=0 cc=1     |
/// +---------------+       ACK matches value       +--------------------+
///        ^                                             |
///        | accepted inbound value,                     | bus reset keeps it
///        | or ACK matches value                        | pending, retry re-armed
///        |                                             v
/// +---------------+                            (value re-sent until
/// | PendingResync |                             acknowledged or superseded
/// |  sync=0 cc=0  |                             by a new local write)
/// +---------------+
/// ```
///
/// A fresh mailbox starts in `PendingResync`: it announces its value on the
/// first poll and settles once acknowledged. A bus reset moves a mailbox
/// with no pending local write straight to `Synchronized` (the remote side
/// re-pushes its own state if it disagrees).
pub struct ScalarMailbox {
    description: String,
    flags: MailboxFlags,
    role: Role,
    value: u32,
    synchronized: bool,
    caller_changed: bool,
    change_trigger: bool,
    retry_timer: RetryTimer,
    observer: Option<Box<dyn MailboxObserver + Send>>,
}

impl ScalarMailbox {
    /// Create a zero-initialized mailbox with a diagnostic label.
    ///
    /// Role defaults to [`Role::Peripheral`] until the hosting node
    /// configures it.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            flags: MailboxFlags::NONE,
            role: Role::Peripheral,
            value: 0,
            synchronized: false,
            caller_changed: false,
            change_trigger: false,
            retry_timer: RetryTimer::new(),
            observer: None,
        }
    }

    /// Create a mailbox with an explicit role (tests, standalone use).
    #[must_use]
    pub fn with_role(description: impl Into<String>, role: Role) -> Self {
        let mut mb = Self::new(description);
        mb.role = role;
        mb
    }

    /// Inject the hosting node's role (configure-time).
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Set the reserved configuration flags.
    pub fn set_flags(&mut self, flags: MailboxFlags) {
        self.flags = flags;
    }

    /// Replace the retry cooldown.
    pub fn set_retry_cooldown(&mut self, cooldown: Duration) {
        self.retry_timer = RetryTimer::with_cooldown(cooldown);
    }

    /// Register the observer notified on accepted incoming changes.
    pub fn set_observer(&mut self, observer: Box<dyn MailboxObserver + Send>) {
        self.observer = Some(observer);
    }

    /// Local write: adopt `v` and schedule an immediate change notification.
    ///
    /// Last-writer-wins: any prior unacknowledged local value is simply
    /// overwritten, there is no queued history.
    pub fn set(&mut self, v: u32) {
        log::debug!(
            "[mailbox] {} local write value={} (was {})",
            self.description,
            v,
            self.value
        );
        self.value = v;
        self.synchronized = false;
        self.caller_changed = true;
        self.change_trigger = true;
        self.retry_timer.trigger();
    }

    /// Force a re-push of the currently-held value without changing it.
    pub fn trigger(&mut self) {
        log::debug!(
            "[mailbox] {} re-push triggered value={}",
            self.description,
            self.value
        );
        self.synchronized = false;
        self.caller_changed = true;
        self.change_trigger = true;
        self.retry_timer.trigger();
    }

    /// Current value, unsigned view.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.value
    }

    /// Current value reinterpreted as two's-complement signed.
    #[must_use]
    pub fn get_signed(&self) -> i32 {
        self.value as i32
    }

    /// Current value as little-endian bytes.
    #[must_use]
    pub fn bytes(&self) -> [u8; 4] {
        self.value.to_le_bytes()
    }

    /// Local write from little-endian bytes.
    pub fn set_bytes(&mut self, bytes: [u8; 4]) {
        self.set(u32::from_le_bytes(bytes));
    }

    /// True iff local and remote copies are believed equal.
    #[must_use]
    pub fn synchronized(&self) -> bool {
        self.synchronized
    }

    /// True iff a local write is still awaiting a matching acknowledgment.
    #[must_use]
    pub fn caller_changed(&self) -> bool {
        self.caller_changed
    }

    /// Inbound SEND_VALUE / SEND_VALUE_CHANGE.
    fn accept_value(&mut self, msg: MailboxMsg, reply: &mut [u8]) -> Result<Disposition> {
        if self.caller_changed {
            // Both endpoints wrote independently before seeing each other's
            // update. The controller's value stands; the mismatched ACK
            // tells the peer its write was not honored.
            if self.role == Role::Controller {
                log::warn!(
                    "[mailbox] {} contention: keeping local value={}, rejecting remote={}",
                    self.description,
                    self.value,
                    msg.value
                );
                self.synchronized = false;
                let ack = MailboxMsg::new(MailboxCommand::AckValue, self.value);
                let n = ack.encode(reply)?;
                return Ok(Disposition::Reply(n));
            }
            log::debug!(
                "[mailbox] {} contention: yielding local value={} to remote={}",
                self.description,
                self.value,
                msg.value
            );
        }

        self.value = msg.value;
        self.synchronized = true;
        self.caller_changed = false;
        if msg.command == MailboxCommand::SendValueChange {
            self.change_trigger = true;
        }
        let changed = self.change_trigger;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_mailbox_change(msg.value, changed);
        }
        self.change_trigger = false;

        log::debug!(
            "[mailbox] {} accepted value={} changed={}",
            self.description,
            self.value,
            changed
        );

        let ack = MailboxMsg::new(MailboxCommand::AckValue, self.value);
        let n = ack.encode(reply)?;
        Ok(Disposition::Reply(n))
    }

    /// Inbound ACK_VALUE. Never produces a reply.
    fn accept_ack(&mut self, msg: MailboxMsg) -> Disposition {
        if msg.value == self.value {
            self.synchronized = true;
            self.caller_changed = false;
            log::debug!(
                "[mailbox] {} acknowledged value={}",
                self.description,
                self.value
            );
        } else {
            // Not fatal: the retry window re-sends our value, or the peer's
            // own pending change reaches us first.
            log::warn!(
                "[mailbox] {} ack mismatch: acked={} holding={}",
                self.description,
                msg.value,
                self.value
            );
        }
        self.change_trigger = false;
        Disposition::Consumed
    }
}

impl Mailbox for ScalarMailbox {
    fn generate_message(&mut self, buf: &mut [u8]) -> Result<usize> {
        let command = if self.change_trigger && self.caller_changed {
            MailboxCommand::SendValueChange
        } else {
            MailboxCommand::SendValue
        };
        let msg = MailboxMsg::new(command, self.value);
        let n = msg.encode(buf)?;
        self.retry_timer.reset();
        log::debug!(
            "[mailbox] {} sending {:?} value={}",
            self.description,
            command,
            self.value
        );
        Ok(n)
    }

    fn handle_message(&mut self, msg: &[u8], reply: &mut [u8]) -> Result<Disposition> {
        let Some(decoded) = MailboxMsg::decode(msg) else {
            log::warn!(
                "[mailbox] {} unrecognized message: {:02x?}",
                self.description,
                msg
            );
            return Ok(Disposition::Unrecognized);
        };

        match decoded.command {
            MailboxCommand::SendValue | MailboxCommand::SendValueChange => {
                self.accept_value(decoded, reply)
            }
            MailboxCommand::AckValue => Ok(self.accept_ack(decoded)),
        }
    }

    fn bus_reset(&mut self) {
        self.retry_timer.trigger();
        self.synchronized = !self.caller_changed;
        self.change_trigger = false;
        log::debug!(
            "[mailbox] {} bus reset, synchronized={}",
            self.description,
            self.synchronized
        );
    }

    fn pending_message(&self) -> bool {
        !self.synchronized && self.retry_timer.ready()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn flags(&self) -> MailboxFlags {
        self.flags
    }
}

// ============================================================================
// TESTS
// ============================================================================
