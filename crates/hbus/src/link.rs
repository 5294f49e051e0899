// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datalink seam and interrupt-boundary handoff
//!
//! The core never touches transport buffers directly. Inbound frames cross
//! the interrupt/async boundary by ownership transfer through a bounded
//! [`FrameQueue`]; the at-most-one staged reply lives in a [`ReplySlot`].
//! Both ends of the handoff own their [`Frame`] outright, so the callback
//! path and the cooperative path never share mutable bytes.
//!
//! [`LoopbackBus`] provides in-process endpoints for tests and demos;
//! [`NullLink`] discards everything.

use crate::config::{INBOUND_QUEUE_DEPTH, MAX_FRAME_LEN};
use crate::error::{Error, Result};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// FRAME
// ============================================================================

/// One owned frame, fixed capacity, as exchanged over the bus.
#[derive(Clone)]
pub struct Frame {
    len: usize,
    buf: [u8; MAX_FRAME_LEN],
}

impl Frame {
    /// Copy `bytes` into an owned frame.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(Error::FrameTooLarge);
        }
        let mut buf = [0u8; MAX_FRAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            len: bytes.len(),
            buf,
        })
    }

    /// Frame bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Frame length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True iff the frame carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({:02x?})", self.as_slice())
    }
}

// ============================================================================
// DATALINK
// ============================================================================

/// Transport seam. Implementations own the physical exchange; the core only
/// ever hands them complete frames.
pub trait Datalink {
    /// Bring the link up. Called once during node setup.
    fn initialize(&mut self) -> Result<()>;

    /// Move one frame onto the bus.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Local hardware address of this link.
    fn address(&self) -> u8;
}

/// Discards every frame, never delivers anything (testing).
#[derive(Debug, Default)]
pub struct NullLink {
    address: u8,
}

impl NullLink {
    /// Null link claiming `address`.
    #[must_use]
    pub const fn new(address: u8) -> Self {
        Self { address }
    }
}

impl Datalink for NullLink {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let _ = frame;
        Ok(())
    }

    fn address(&self) -> u8 {
        self.address
    }
}

// ============================================================================
// INBOUND QUEUE
// ============================================================================

/// Producer half of an inbound queue, cloneable into transport callbacks.
#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<Frame>,
}

impl FrameProducer {
    /// Hand a frame to the cooperative side. Fails with
    /// [`Error::QueueFull`] instead of blocking, so interrupt glue can
    /// count drops.
    pub fn offer(&self, frame: Frame) -> Result<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log::warn!("[link] inbound queue full, dropping frame");
                Err(Error::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::TransportError),
        }
    }
}

/// Bounded handoff between the transport's receive callback and the
/// cooperative tick. Single consumer; producers are cheap clones.
pub struct FrameQueue {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl FrameQueue {
    /// Queue with the default depth.
    #[must_use]
    pub fn new() -> Self {
        Self::with_depth(INBOUND_QUEUE_DEPTH)
    }

    /// Queue with a custom depth.
    #[must_use]
    pub fn with_depth(depth: usize) -> Self {
        let (tx, rx) = bounded(depth);
        Self { tx, rx }
    }

    /// Producer handle for the transport side.
    #[must_use]
    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            tx: self.tx.clone(),
        }
    }

    /// Take the next frame, if any. Never blocks.
    #[must_use]
    pub fn poll(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// REPLY SLOT
// ============================================================================

/// Single-slot stash for the one reply a node may owe at a time.
///
/// Staging over an unconsumed reply is a dispatcher fault worth hearing
/// about: it is logged and the newest frame wins.
#[derive(Default)]
pub struct ReplySlot {
    slot: Mutex<Option<Frame>>,
}

impl ReplySlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a reply for the next outbound opportunity.
    pub fn stage(&self, frame: Frame) {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            log::warn!("[link] staging a reply before the prior one was consumed, replacing");
        }
        *slot = Some(frame);
    }

    /// Consume the staged reply, if any.
    #[must_use]
    pub fn take(&self) -> Option<Frame> {
        self.slot.lock().take()
    }

    /// True iff a reply is waiting.
    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ============================================================================
// LOOPBACK BUS
// ============================================================================

/// In-process shared medium: every endpoint's sends are delivered into
/// every other endpoint's inbound queue, like a physical bus. Address
/// filtering stays where it belongs, in the dispatcher.
#[derive(Clone, Default)]
pub struct LoopbackBus {
    endpoints: Arc<Mutex<Vec<(u8, FrameProducer)>>>,
}

impl LoopbackBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint at `address`. Returns the link plus the inbound
    /// queue the owning node should drain.
    #[must_use]
    pub fn endpoint(&self, address: u8) -> (LoopbackLink, FrameQueue) {
        let queue = FrameQueue::new();
        self.endpoints.lock().push((address, queue.producer()));
        (
            LoopbackLink {
                address,
                endpoints: Arc::clone(&self.endpoints),
            },
            queue,
        )
    }
}

/// One endpoint of a [`LoopbackBus`].
pub struct LoopbackLink {
    address: u8,
    endpoints: Arc<Mutex<Vec<(u8, FrameProducer)>>>,
}

impl Datalink for LoopbackLink {
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let owned = Frame::from_slice(frame)?;
        log::debug!(
            "[link] 0x{:02x} put {} bytes on the bus",
            self.address,
            owned.len()
        );
        for (address, producer) in self.endpoints.lock().iter() {
            if *address != self.address {
                // A full peer queue drops the frame there, like a missed
                // transaction; retry timers cover it
                let _ = producer.offer(owned.clone());
            }
        }
        Ok(())
    }

    fn address(&self) -> u8 {
        self.address
    }
}

// ============================================================================
// TESTS
// ============================================================================
