// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery control plane (port 0)
//!
//! Four commands, native to the node rather than to any registered service:
//!
//! - `POLL_DEVICES`: controller broadcast; unaddressed devices answer with
//!   REQUEST_ADDRESS, addressed ones stay silent so mailbox traffic can
//!   piggy-back instead.
//! - `REQUEST_ADDRESS`: device identity (type, hardware id, generation);
//!   the controller answers with the matching proxy's configured address.
//! - `ASSIGN_ADDRESS`: the device whose hardware id matches adopts the
//!   address and resynchronizes.
//! - `RESET_BUS`: controller broadcast; every receiver runs a bus reset.
//!
//! A bound device re-requesting with a new generation has rebooted: the
//! controller re-binds it and resets that proxy so its mailboxes resync.

use crate::config::ADDR_UNASSIGNED;
use crate::device::{DeviceProfile, DeviceType, Role};
use crate::error::{Error, Result};
use crate::registry::PeripheralRegistry;

// ============================================================================
// WIRE FORMATS
// ============================================================================

/// Control command (1 byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCommand {
    /// Controller broadcast inviting replies (0x00)
    PollDevices = 0x00,
    /// Device asks for its address (0x01)
    RequestAddress = 0x01,
    /// Controller assigns an address (0x02)
    AssignAddress = 0x02,
    /// Controller orders a bus-wide reset (0x03)
    ResetBus = 0x03,
}

impl ControlCommand {
    /// Parse from byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::PollDevices),
            0x01 => Some(Self::RequestAddress),
            0x02 => Some(Self::AssignAddress),
            0x03 => Some(Self::ResetBus),
            _ => None,
        }
    }
}

// Compile-time assertion to ensure enum discriminants are correct
const _: () = {
    assert!(
        ControlCommand::PollDevices as u8 == 0x00,
        "POLL_DEVICES command must be 0x00"
    );
    assert!(
        ControlCommand::RequestAddress as u8 == 0x01,
        "REQUEST_ADDRESS command must be 0x01"
    );
    assert!(
        ControlCommand::AssignAddress as u8 == 0x02,
        "ASSIGN_ADDRESS command must be 0x02"
    );
    assert!(
        ControlCommand::ResetBus as u8 == 0x03,
        "RESET_BUS command must be 0x03"
    );
};

/// REQUEST_ADDRESS payload: command(1) + device_type(1) + hardware_id(2 LE)
/// + generation(2 LE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAddressMsg {
    /// Requesting device's type tag
    pub device_type: DeviceType,
    /// Requesting device's stable unit id
    pub hardware_id: u16,
    /// Requesting device's session counter
    pub generation: u16,
}

impl RequestAddressMsg {
    /// Size on the wire
    pub const SIZE: usize = 6;

    /// Encode to bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall);
        }
        buf[0] = ControlCommand::RequestAddress as u8;
        buf[1] = self.device_type as u8;
        buf[2..4].copy_from_slice(&self.hardware_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.generation.to_le_bytes());
        Ok(Self::SIZE)
    }

    /// Decode from bytes (command byte included)
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE || buf[0] != ControlCommand::RequestAddress as u8 {
            return None;
        }
        Some(Self {
            device_type: DeviceType::from_u8(buf[1])?,
            hardware_id: u16::from_le_bytes([buf[2], buf[3]]),
            generation: u16::from_le_bytes([buf[4], buf[5]]),
        })
    }
}

/// ASSIGN_ADDRESS payload: command(1) + address(1) + hardware_id(2 LE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignAddressMsg {
    /// Address being granted
    pub address: u8,
    /// Which device the grant is for
    pub hardware_id: u16,
}

impl AssignAddressMsg {
    /// Size on the wire
    pub const SIZE: usize = 4;

    /// Encode to bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::SIZE {
            return Err(Error::BufferTooSmall);
        }
        buf[0] = ControlCommand::AssignAddress as u8;
        buf[1] = self.address;
        buf[2..4].copy_from_slice(&self.hardware_id.to_le_bytes());
        Ok(Self::SIZE)
    }

    /// Decode from bytes (command byte included)
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::SIZE || buf[0] != ControlCommand::AssignAddress as u8 {
            return None;
        }
        Some(Self {
            address: buf[1],
            hardware_id: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }
}

// ============================================================================
// CONTROL PLANE
// ============================================================================

/// What the node should do after a control exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlOutcome {
    /// Bytes of control reply written (0 = none)
    pub reply_len: usize,
    /// The node must run a bus reset
    pub bus_reset: bool,
}

/// Port-0 protocol handler, owned by the node.
#[derive(Debug, Default)]
pub struct ControlPlane;

impl ControlPlane {
    /// New control plane.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode a bare POLL_DEVICES payload.
    pub fn encode_poll(buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::BufferTooSmall);
        }
        buf[0] = ControlCommand::PollDevices as u8;
        Ok(1)
    }

    /// Encode a bare RESET_BUS payload.
    pub fn encode_reset(buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Err(Error::BufferTooSmall);
        }
        buf[0] = ControlCommand::ResetBus as u8;
        Ok(1)
    }

    /// Consume an inbound control payload.
    ///
    /// `local` is the node's own descriptor (devices adopt their address
    /// through it); the registry is only touched on the controller side.
    pub fn handle_message(
        &mut self,
        role: Role,
        registry: &mut PeripheralRegistry,
        local: &mut DeviceProfile,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<ControlOutcome> {
        let Some(command) = payload.first().copied().and_then(ControlCommand::from_u8) else {
            log::warn!("[control] unrecognized control payload: {:02x?}", payload);
            return Ok(ControlOutcome::default());
        };

        match command {
            ControlCommand::PollDevices => self.on_poll(role, local, reply),
            ControlCommand::RequestAddress => self.on_request(role, registry, payload, reply),
            ControlCommand::AssignAddress => Ok(self.on_assign(role, local, payload)),
            ControlCommand::ResetBus => Ok(self.on_reset(role)),
        }
    }

    fn on_poll(
        &mut self,
        role: Role,
        local: &mut DeviceProfile,
        reply: &mut [u8],
    ) -> Result<ControlOutcome> {
        if role != Role::Peripheral || local.address != ADDR_UNASSIGNED {
            // Addressed devices answer polls with mailbox traffic instead
            return Ok(ControlOutcome::default());
        }

        let msg = RequestAddressMsg {
            device_type: local.device_type,
            hardware_id: local.hardware_id,
            generation: local.generation,
        };
        let n = msg.encode(reply)?;
        log::debug!(
            "[control] requesting address for {:?} hw=0x{:04x} gen={}",
            local.device_type,
            local.hardware_id,
            local.generation
        );
        Ok(ControlOutcome {
            reply_len: n,
            bus_reset: false,
        })
    }

    fn on_request(
        &mut self,
        role: Role,
        registry: &mut PeripheralRegistry,
        payload: &[u8],
        reply: &mut [u8],
    ) -> Result<ControlOutcome> {
        if role != Role::Controller {
            log::debug!("[control] ignoring address request, not a controller");
            return Ok(ControlOutcome::default());
        }
        let Some(msg) = RequestAddressMsg::decode(payload) else {
            log::warn!("[control] malformed address request: {:02x?}", payload);
            return Ok(ControlOutcome::default());
        };

        // First proxy of the right type that is unbound, or already bound
        // to this same unit
        let Some(proxy) = registry.peripherals_mut().find(|p| {
            p.profile().device_type == msg.device_type
                && (!p.profile().is_bound() || p.profile().hardware_id == msg.hardware_id)
        }) else {
            log::warn!(
                "[control] no proxy for {:?} hw=0x{:04x}",
                msg.device_type,
                msg.hardware_id
            );
            return Ok(ControlOutcome::default());
        };

        let rebooted =
            proxy.profile().is_bound() && proxy.profile().generation != msg.generation;
        let granted = proxy.profile().address;

        {
            let profile = proxy.profile_mut();
            profile.hardware_id = msg.hardware_id;
            profile.generation = msg.generation;
        }

        if rebooted {
            // The unit came back with a fresh session: its mailbox state is
            // gone, resync this proxy
            log::info!(
                "[control] device hw=0x{:04x} rebooted (gen={}), resyncing proxy id={}",
                msg.hardware_id,
                msg.generation,
                proxy.id()
            );
            proxy.bus_reset();
        } else {
            log::info!(
                "[control] bound {:?} hw=0x{:04x} to address 0x{:02x}",
                msg.device_type,
                msg.hardware_id,
                granted
            );
        }

        let grant = AssignAddressMsg {
            address: granted,
            hardware_id: msg.hardware_id,
        };
        let n = grant.encode(reply)?;
        Ok(ControlOutcome {
            reply_len: n,
            bus_reset: false,
        })
    }

    fn on_assign(&mut self, role: Role, local: &mut DeviceProfile, payload: &[u8]) -> ControlOutcome {
        if role != Role::Peripheral {
            return ControlOutcome::default();
        }
        let Some(msg) = AssignAddressMsg::decode(payload) else {
            log::warn!("[control] malformed address grant: {:02x?}", payload);
            return ControlOutcome::default();
        };
        if msg.hardware_id != local.hardware_id {
            // Someone else's grant on the broadcast medium
            return ControlOutcome::default();
        }

        local.address = msg.address;
        log::info!("[control] adopted address 0x{:02x}", msg.address);
        // Fresh session: resynchronize everything we replicate
        ControlOutcome {
            reply_len: 0,
            bus_reset: true,
        }
    }

    fn on_reset(&mut self, role: Role) -> ControlOutcome {
        if role == Role::Controller {
            log::warn!("[control] ignoring RESET_BUS addressed to a controller");
            return ControlOutcome::default();
        }
        log::info!("[control] bus reset requested by controller");
        ControlOutcome {
            reply_len: 0,
            bus_reset: true,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ADDR_CONTROLLER;
    use crate::device::NodeContext;
    use crate::mailbox::Disposition;
    use crate::service::Service;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct ResetProbe(Arc<Mutex<u32>>);

    impl Service for ResetProbe {
        fn handle_message(&mut self, _msg: &[u8], _reply: &mut [u8]) -> Result<Disposition> {
            Ok(Disposition::Consumed)
        }
        fn poll_message(&mut self, _buf: &mut [u8]) -> Result<usize> {
            Ok(0)
        }
        fn bus_reset(&mut self) {
            *self.0.lock() += 1;
        }
        fn configure(&mut self, _ctx: &NodeContext) {}
    }

    #[test]
    fn request_msg_layout() {
        let msg = RequestAddressMsg {
            device_type: DeviceType::Encoder,
            hardware_id: 0x2211,
            generation: 0x4433,
        };
        let mut buf = [0u8; RequestAddressMsg::SIZE];
        let n = msg.encode(&mut buf).expect("Failed to encode");
        assert_eq!(n, 6);
        assert_eq!(buf, [0x01, 0x02, 0x11, 0x22, 0x33, 0x44]);
        assert_eq!(RequestAddressMsg::decode(&buf), Some(msg));
    }

    #[test]
    fn assign_msg_layout() {
        let msg = AssignAddressMsg {
            address: 0x12,
            hardware_id: 0xBEEF,
        };
        let mut buf = [0u8; AssignAddressMsg::SIZE];
        let n = msg.encode(&mut buf).expect("Failed to encode");
        assert_eq!(n, 4);
        assert_eq!(buf, [0x02, 0x12, 0xEF, 0xBE]);
        assert_eq!(AssignAddressMsg::decode(&buf), Some(msg));
    }

    fn request_payload(hw: u16, gen: u16) -> [u8; RequestAddressMsg::SIZE] {
        let mut buf = [0u8; RequestAddressMsg::SIZE];
        RequestAddressMsg {
            device_type: DeviceType::Sensor,
            hardware_id: hw,
            generation: gen,
        }
        .encode(&mut buf)
        .expect("Failed to encode request");
        buf
    }

    #[test]
    fn controller_grants_configured_address() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        reg.add(DeviceProfile::new(0x15, DeviceType::Sensor));
        let mut local = DeviceProfile::new(ADDR_CONTROLLER, DeviceType::Controller);

        let mut reply = [0u8; 16];
        let outcome = cp
            .handle_message(
                Role::Controller,
                &mut reg,
                &mut local,
                &request_payload(0xBEEF, 7),
                &mut reply,
            )
            .expect("Failed to handle request");

        assert_eq!(outcome.reply_len, AssignAddressMsg::SIZE);
        assert!(!outcome.bus_reset);
        assert_eq!(
            AssignAddressMsg::decode(&reply[..outcome.reply_len]),
            Some(AssignAddressMsg {
                address: 0x15,
                hardware_id: 0xBEEF
            })
        );

        let bound = reg.find_by_address(0x15).expect("Failed to find proxy");
        assert_eq!(bound.profile().hardware_id, 0xBEEF);
        assert_eq!(bound.profile().generation, 7);
    }

    #[test]
    fn rebooted_device_resets_its_proxy() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let h = reg.add(DeviceProfile::new(0x15, DeviceType::Sensor));
        let resets = Arc::new(Mutex::new(0));
        reg.peripheral_mut(h)
            .expect("Failed to look up handle")
            .register_service(1, Box::new(ResetProbe(Arc::clone(&resets))))
            .expect("Failed to register probe");
        let mut local = DeviceProfile::new(ADDR_CONTROLLER, DeviceType::Controller);

        let mut reply = [0u8; 16];
        cp.handle_message(
            Role::Controller,
            &mut reg,
            &mut local,
            &request_payload(0xBEEF, 1),
            &mut reply,
        )
        .expect("Failed to handle first request");
        assert_eq!(*resets.lock(), 0);

        // Same unit, new session counter: the proxy must resynchronize
        cp.handle_message(
            Role::Controller,
            &mut reg,
            &mut local,
            &request_payload(0xBEEF, 2),
            &mut reply,
        )
        .expect("Failed to handle re-request");
        assert_eq!(*resets.lock(), 1);
    }

    #[test]
    fn request_without_matching_proxy_is_dropped() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        reg.add(DeviceProfile::new(0x15, DeviceType::Keypad));
        let mut local = DeviceProfile::new(ADDR_CONTROLLER, DeviceType::Controller);

        let mut reply = [0u8; 16];
        let outcome = cp
            .handle_message(
                Role::Controller,
                &mut reg,
                &mut local,
                &request_payload(0xBEEF, 1),
                &mut reply,
            )
            .expect("Failed to handle request");
        assert_eq!(outcome, ControlOutcome::default());
    }

    #[test]
    fn unaddressed_device_answers_poll() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let mut local = DeviceProfile::local(DeviceType::Sensor, 0xBEEF);

        let mut reply = [0u8; 16];
        let poll = [ControlCommand::PollDevices as u8];
        let outcome = cp
            .handle_message(Role::Peripheral, &mut reg, &mut local, &poll, &mut reply)
            .expect("Failed to handle poll");

        let msg = RequestAddressMsg::decode(&reply[..outcome.reply_len])
            .expect("Failed to decode request");
        assert_eq!(msg.hardware_id, 0xBEEF);
        assert_eq!(msg.device_type, DeviceType::Sensor);
        assert_eq!(msg.generation, local.generation);
    }

    #[test]
    fn addressed_device_stays_silent_on_poll() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let mut local = DeviceProfile::local(DeviceType::Sensor, 0xBEEF);
        local.address = 0x15;

        let mut reply = [0u8; 16];
        let poll = [ControlCommand::PollDevices as u8];
        let outcome = cp
            .handle_message(Role::Peripheral, &mut reg, &mut local, &poll, &mut reply)
            .expect("Failed to handle poll");
        assert_eq!(outcome.reply_len, 0);
    }

    #[test]
    fn device_adopts_only_its_own_grant() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let mut local = DeviceProfile::local(DeviceType::Sensor, 0xBEEF);

        let mut grant = [0u8; AssignAddressMsg::SIZE];
        AssignAddressMsg {
            address: 0x22,
            hardware_id: 0x0BAD,
        }
        .encode(&mut grant)
        .expect("Failed to encode grant");

        let mut reply = [0u8; 16];
        let outcome = cp
            .handle_message(Role::Peripheral, &mut reg, &mut local, &grant, &mut reply)
            .expect("Failed to handle grant");
        assert_eq!(local.address, ADDR_UNASSIGNED);
        assert!(!outcome.bus_reset);

        AssignAddressMsg {
            address: 0x22,
            hardware_id: 0xBEEF,
        }
        .encode(&mut grant)
        .expect("Failed to encode grant");
        let outcome = cp
            .handle_message(Role::Peripheral, &mut reg, &mut local, &grant, &mut reply)
            .expect("Failed to handle grant");
        assert_eq!(local.address, 0x22);
        assert!(outcome.bus_reset);
    }

    #[test]
    fn reset_bus_reaches_devices_not_controllers() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let mut dev = DeviceProfile::local(DeviceType::Sensor, 1);
        let mut ctl = DeviceProfile::new(ADDR_CONTROLLER, DeviceType::Controller);

        let reset = [ControlCommand::ResetBus as u8];
        let mut reply = [0u8; 4];

        let on_dev = cp
            .handle_message(Role::Peripheral, &mut reg, &mut dev, &reset, &mut reply)
            .expect("Failed to handle reset");
        assert!(on_dev.bus_reset);

        let on_ctl = cp
            .handle_message(Role::Controller, &mut reg, &mut ctl, &reset, &mut reply)
            .expect("Failed to handle reset");
        assert!(!on_ctl.bus_reset);
    }

    #[test]
    fn unknown_control_command_is_benign() {
        let mut cp = ControlPlane::new();
        let mut reg = PeripheralRegistry::new();
        let mut local = DeviceProfile::local(DeviceType::Sensor, 1);

        let mut reply = [0u8; 4];
        let outcome = cp
            .handle_message(
                Role::Peripheral,
                &mut reg,
                &mut local,
                &[0x77, 1, 2],
                &mut reply,
            )
            .expect("Failed to handle");
        assert_eq!(outcome, ControlOutcome::default());
    }
}
