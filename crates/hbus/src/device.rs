// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device identity and bus roles

use crate::config::ADDR_UNASSIGNED;
use std::fmt;

/// Bus role, fixed at node construction.
///
/// The controller initiates every transport-level exchange and wins
/// contested mailbox writes; peripherals answer polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiates exchanges, wins contention
    Controller,
    /// Answers polls
    Peripheral,
}

/// Device-type tag carried in discovery exchanges (1 byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceType {
    /// Bus controller
    Controller = 0x01,
    /// Rotary encoder
    Encoder = 0x02,
    /// Key matrix / button bank
    Keypad = 0x03,
    /// Display head
    Display = 0x04,
    /// Generic sensor
    Sensor = 0x05,
}

impl DeviceType {
    /// Parse from byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Controller),
            0x02 => Some(Self::Encoder),
            0x03 => Some(Self::Keypad),
            0x04 => Some(Self::Display),
            0x05 => Some(Self::Sensor),
            _ => None,
        }
    }
}

/// Device descriptor: bus address, type tag, and the discovery identity
/// (hardware id, generation) learned during the handshake.
///
/// A proxy starts with the configured address and type; `hardware_id` and
/// `generation` stay zero until a device binds to it. The generation is a
/// session counter: a bound device re-appearing with a different generation
/// has rebooted and needs its mailboxes resynchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Bus address (0x00 = unassigned)
    pub address: u8,
    /// Device-type tag
    pub device_type: DeviceType,
    /// Stable per-unit id, learned at discovery
    pub hardware_id: u16,
    /// Session counter, learned at discovery
    pub generation: u16,
}

impl DeviceProfile {
    /// Descriptor for a proxy at a configured address.
    #[must_use]
    pub const fn new(address: u8, device_type: DeviceType) -> Self {
        Self {
            address,
            device_type,
            hardware_id: 0,
            generation: 0,
        }
    }

    /// Descriptor for the local device itself (address assigned later).
    #[must_use]
    pub fn local(device_type: DeviceType, hardware_id: u16) -> Self {
        Self {
            address: ADDR_UNASSIGNED,
            device_type,
            hardware_id,
            generation: derive_generation(),
        }
    }

    /// True once a device has bound to this descriptor.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.hardware_id != 0
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}@0x{:02x} hw=0x{:04x} gen={}",
            self.device_type, self.address, self.hardware_id, self.generation
        )
    }
}

/// What a service learns about the node hosting it (configure-time
/// dependency injection, replacing any global lookup).
#[derive(Debug, Clone, Copy)]
pub struct NodeContext {
    /// Bus role of the hosting node
    pub role: Role,
    /// Local bus address at configure time
    pub address: u8,
}

/// Derive a fresh session generation from the process id and wall clock.
///
/// Zero is reserved for "unbound", so the result is forced non-zero.
pub(crate) fn derive_generation() -> u16 {
    let pid = std::process::id() as u16;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u16)
        .unwrap_or(0);
    let gen = pid ^ nanos.rotate_left(5);
    if gen == 0 {
        1
    } else {
        gen
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_round_trip() {
        for t in [
            DeviceType::Controller,
            DeviceType::Encoder,
            DeviceType::Keypad,
            DeviceType::Display,
            DeviceType::Sensor,
        ] {
            assert_eq!(DeviceType::from_u8(t as u8), Some(t));
        }
        assert_eq!(DeviceType::from_u8(0x00), None);
        assert_eq!(DeviceType::from_u8(0xEE), None);
    }

    #[test]
    fn fresh_proxy_is_unbound() {
        let p = DeviceProfile::new(0x12, DeviceType::Encoder);
        assert!(!p.is_bound());
        assert_eq!(p.generation, 0);
    }

    #[test]
    fn local_profile_gets_nonzero_generation() {
        let p = DeviceProfile::local(DeviceType::Sensor, 0xBEEF);
        assert_ne!(p.generation, 0);
        assert_eq!(p.address, ADDR_UNASSIGNED);
    }
}
