// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! hbus protocol configuration - Single Source of Truth
//!
//! This module centralizes all bus protocol constants.
//! **NEVER hardcode elsewhere!**

// =======================================================================
// Framing
// =======================================================================

/// Maximum frame length on the wire, header included.
///
/// Shared with every `Datalink` implementation; an I2C transaction never
/// carries more than this. **NEVER hardcode 255 elsewhere!**
pub const MAX_FRAME_LEN: usize = 255;

/// Routing header length: dest(1) + src(1) + port(1) + len(1)
pub const FRAME_HEADER_LEN: usize = 4;

/// Maximum payload a single frame can carry
///
/// Derived: `MAX_FRAME_LEN - FRAME_HEADER_LEN`
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_HEADER_LEN;

// =======================================================================
// Addressing
// =======================================================================

/// Address of a device that has not completed discovery yet
pub const ADDR_UNASSIGNED: u8 = 0x00;

/// Broadcast address, accepted by every device on the bus
pub const ADDR_BROADCAST: u8 = 0xFF;

/// Conventional controller address
///
/// Assignable device range is `0x01..=0xFE`; the controller takes the
/// bottom of it unless configured otherwise.
pub const ADDR_CONTROLLER: u8 = 0x01;

// =======================================================================
// Ports
// =======================================================================

/// Number of service slots per peripheral (ports `0..NUM_PORTS`)
pub const NUM_PORTS: usize = 8;

/// Control-plane port, owned by the node itself
///
/// `register_service` rejects this port; discovery and bus-reset commands
/// ride on it.
pub const PORT_CONTROL: u8 = 0;

// =======================================================================
// Timing
// =======================================================================

/// Cooldown between retransmissions of an unacknowledged mailbox value (ms)
pub const DEFAULT_RETRY_COOLDOWN_MS: u64 = 250;

/// Cadence of the controller's POLL_DEVICES broadcast (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

// =======================================================================
// Queueing
// =======================================================================

/// Depth of the inbound frame queue between the transport callback and the
/// cooperative tick
pub const INBOUND_QUEUE_DEPTH: usize = 16;
