// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Services: port-level protocol endpoints
//!
//! A service occupies one port of one peripheral proxy and speaks whatever
//! payload protocol that port carries. [`MailboxService`] is the common
//! case, hosting a single scalar mailbox behind a shared handle so that
//! application code can read and write the value while the registry owns
//! the service.

use crate::device::NodeContext;
use crate::error::Result;
use crate::mailbox::{Disposition, Mailbox, ScalarMailbox};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a hosted scalar mailbox.
pub type MailboxRef = Arc<Mutex<ScalarMailbox>>;

/// Port-level protocol endpoint.
pub trait Service {
    /// One-time setup during node initialization. Default: nothing.
    fn configure(&mut self, ctx: &NodeContext) {
        let _ = ctx;
    }

    /// Consume an inbound payload for this port, optionally writing a reply.
    fn handle_message(&mut self, msg: &[u8], reply: &mut [u8]) -> Result<Disposition>;

    /// Write an owed outgoing payload into `buf`, or return 0 when nothing
    /// is pending.
    fn poll_message(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Bus-wide reset: drop assumptions about remote state.
    fn bus_reset(&mut self);
}

/// Service hosting one replicated scalar value.
pub struct MailboxService {
    mailbox: MailboxRef,
}

impl MailboxService {
    /// New service around a zero-initialized mailbox.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self::from_mailbox(ScalarMailbox::new(description))
    }

    /// Wrap an existing mailbox.
    #[must_use]
    pub fn from_mailbox(mailbox: ScalarMailbox) -> Self {
        Self {
            mailbox: Arc::new(Mutex::new(mailbox)),
        }
    }

    /// Shared handle to the hosted mailbox; clone-cheap, lock per access.
    #[must_use]
    pub fn mailbox(&self) -> MailboxRef {
        Arc::clone(&self.mailbox)
    }
}

impl Service for MailboxService {
    fn configure(&mut self, ctx: &NodeContext) {
        self.mailbox.lock().set_role(ctx.role);
    }

    fn handle_message(&mut self, msg: &[u8], reply: &mut [u8]) -> Result<Disposition> {
        self.mailbox.lock().handle_message(msg, reply)
    }

    fn poll_message(&mut self, buf: &mut [u8]) -> Result<usize> {
        // Generation is gated here: only when a send is owed and the retry
        // window is open.
        let mut mb = self.mailbox.lock();
        if mb.pending_message() {
            mb.generate_message(buf)
        } else {
            Ok(0)
        }
    }

    fn bus_reset(&mut self) {
        self.mailbox.lock().bus_reset();
    }
}

// ============================================================================
// TESTS
// ============================================================================
