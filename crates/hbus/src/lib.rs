// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HBUS - Device Networking for Shared-Bus Peripherals
//!
//! A lightweight framework for small device networks on a shared half-duplex
//! bus (I2C-class): discovery and addressing of remote peripherals, a routing
//! layer dispatching inbound frames to per-device service slots, and a
//! replicated-value protocol ("mailbox") that keeps a 32-bit scalar
//! consistent between two endpoints across an unreliable request/response
//! transport.
//!
//! The bus is asymmetric: one controller initiates every exchange and wins
//! contested writes; peripherals answer polls and piggy-back pending traffic
//! on controller-granted windows.
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------+
//! |  Application (reads/writes mailbox values)  |
//! +---------------------------------------------+
//!           v                    ^
//! +---------------------------------------------+
//! |  Node (role, frame routing, control plane)  |
//! +---------------------------------------------+
//!           v                    ^
//! +---------------------------------------------+
//! |  PeripheralRegistry (port table per device) |
//! +---------------------------------------------+
//!           v                    ^
//! +---------------------------------------------+
//! |  ScalarMailbox (replication state machine)  |
//! +---------------------------------------------+
//!           v                    ^
//! +---------------------------------------------+
//! |  Datalink (I2C glue / loopback / null)      |
//! +---------------------------------------------+
//! ```
//!
//! ## Example
//!
//! A controller replicating one value to the encoder at address 0x12:
//!
//! ```
//! use hbus::{DeviceProfile, DeviceType, MailboxService, Node, Role};
//!
//! # fn main() -> hbus::Result<()> {
//! let mut node = Node::builder(Role::Controller).build()?;
//!
//! let handle = node
//!     .registry_mut()
//!     .add(DeviceProfile::new(0x12, DeviceType::Encoder));
//! let service = MailboxService::new("position");
//! let position = service.mailbox();
//! node.registry_mut()
//!     .peripheral_mut(handle)
//!     .expect("Failed to look up proxy")
//!     .register_service(1, Box::new(service))?;
//! node.initialize()?;
//!
//! // Replicated on the next transmit window; retried until acknowledged
//! position.lock().set(42);
//! node.tick()?;
//! # Ok(())
//! # }
//! ```
//!
//! No global state anywhere: a `Node` is an ordinary value, and tests drive
//! several of them over [`LoopbackBus`] in one process.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Protocol constants (single source of truth)
pub mod config;

/// Device identity, bus roles, node context
pub mod device;

/// Network dispatcher (`Node`, `NodeBuilder`)
pub mod dispatch;

/// Port-0 discovery and addressing control plane
pub mod discovery;

/// Error types for HBUS
pub mod error;

/// Datalink seam, frame ownership handoff, loopback transport
pub mod link;

/// Mailbox contract and the scalar replication state machine
pub mod mailbox;

/// Peripheral proxies and their registry
pub mod registry;

/// Service attachment points for peripheral port tables
pub mod service;

/// Retry and periodic interval timers
pub mod timing;

/// Wire codecs (frame header, mailbox messages)
pub mod wire;

// Re-exports for convenience
pub use crate::config::MAX_FRAME_LEN;
pub use crate::device::{DeviceProfile, DeviceType, NodeContext, Role};
pub use crate::dispatch::{Node, NodeBuilder};
pub use crate::error::{Error, Result};
pub use crate::link::{Datalink, Frame, FrameProducer, FrameQueue, LoopbackBus, NullLink};
pub use crate::mailbox::{Disposition, Mailbox, MailboxFlags, MailboxObserver, ScalarMailbox};
pub use crate::registry::{Peripheral, PeripheralHandle, PeripheralRegistry};
pub use crate::service::{MailboxRef, MailboxService, Service};
pub use crate::timing::{Interval, RetryTimer};
pub use crate::wire::{FrameHeader, MailboxCommand, MailboxMsg};

/// Version of HBUS
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
