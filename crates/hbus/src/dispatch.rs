// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network dispatcher
//!
//! [`Node`] is the composition root: one per bus endpoint, owning the local
//! role and identity, the peripheral registry, the port-0 control plane, and
//! the datalink. There is no global state; tests run any number of nodes
//! side by side.
//!
//! Frame life cycle:
//!
//! ```text
//!   transport glue --FrameProducer--> inbound queue
//!                                          | tick()
//!                                          v
//!                                    handle_frame ---> registry / control
//!                                          |
//!                      reply staged <------+------> no reply: poll_frame
//!                                          v
//!                                    link.send_frame
//! ```
//!
//! Transport callbacks only move owned [`Frame`]s across the queue; every
//! protocol state change happens on the cooperative path.

use crate::config::{
    ADDR_BROADCAST, ADDR_CONTROLLER, ADDR_UNASSIGNED, DEFAULT_POLL_INTERVAL_MS, FRAME_HEADER_LEN,
    MAX_FRAME_LEN, MAX_PAYLOAD_LEN, NUM_PORTS, PORT_CONTROL,
};
use crate::device::{derive_generation, DeviceProfile, DeviceType, NodeContext, Role};
use crate::discovery::ControlPlane;
use crate::error::Result;
use crate::link::{Datalink, Frame, FrameProducer, FrameQueue, NullLink, ReplySlot};
use crate::mailbox::Disposition;
use crate::registry::PeripheralRegistry;
use crate::timing::Interval;
use crate::wire::{build_frame, FrameHeader};
use std::time::Duration;

// ============================================================================
// NODE
// ============================================================================

/// One bus endpoint: role, identity, registry, control plane, datalink.
pub struct Node {
    role: Role,
    profile: DeviceProfile,
    registry: PeripheralRegistry,
    control: ControlPlane,
    link: Box<dyn Datalink + Send>,
    inbound: FrameQueue,
    reply_slot: ReplySlot,
    discovery: Interval,
    trace_frames: bool,
}

impl Node {
    /// Start building a node with the given bus role.
    #[must_use]
    pub fn builder(role: Role) -> NodeBuilder {
        NodeBuilder::new(role)
    }

    /// Bus role fixed at construction.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current local bus address (0x00 until discovery assigns one).
    #[must_use]
    pub fn address(&self) -> u8 {
        self.profile.address
    }

    /// Local device descriptor.
    #[must_use]
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Peripheral registry.
    #[must_use]
    pub fn registry(&self) -> &PeripheralRegistry {
        &self.registry
    }

    /// Peripheral registry, mutable (register proxies and services here
    /// between `build()` and `initialize()`).
    pub fn registry_mut(&mut self) -> &mut PeripheralRegistry {
        &mut self.registry
    }

    /// Producer handle for transport glue to push inbound frames.
    #[must_use]
    pub fn inbound_producer(&self) -> FrameProducer {
        self.inbound.producer()
    }

    /// Run one-time setup: configure every registered service, then treat
    /// power-up as a bus reset so replication state is re-derived.
    pub fn initialize(&mut self) -> Result<()> {
        let ctx = NodeContext {
            role: self.role,
            address: self.profile.address,
        };
        log::debug!("[dispatch] initializing: role={:?} {}", self.role, self.profile);
        self.registry.configure_all(&ctx);
        self.bus_reset();
        Ok(())
    }

    /// Consume one inbound frame: validate, route to the control plane or
    /// the owning peripheral's service, and stage any produced reply.
    ///
    /// Returns the staged reply length; 0 means the frame was consumed,
    /// dropped, or produced nothing. Malformed and unroutable frames are
    /// anomalies (logged, never an error).
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<usize> {
        if self.trace_frames {
            log::debug!("[dispatch] rx {:02x?}", frame);
        }
        let Ok(header) = FrameHeader::decode(frame) else {
            log::warn!("[dispatch] runt frame ({} bytes), dropping", frame.len());
            return Ok(0);
        };
        if header.dest != self.profile.address && header.dest != ADDR_BROADCAST {
            // Shared medium, not addressed to us
            return Ok(0);
        }
        if frame.len() < header.frame_len() {
            log::warn!(
                "[dispatch] truncated frame from 0x{:02x}: header claims {} bytes, got {}",
                header.src,
                header.frame_len(),
                frame.len()
            );
            return Ok(0);
        }
        if usize::from(header.port) >= NUM_PORTS {
            log::warn!(
                "[dispatch] frame from 0x{:02x} for invalid port {}, dropping",
                header.src,
                header.port
            );
            return Ok(0);
        }
        let payload = &frame[FRAME_HEADER_LEN..header.frame_len()];

        let mut reply = [0u8; MAX_PAYLOAD_LEN];
        let (reply_len, reset) = if header.port == PORT_CONTROL {
            let outcome = self.control.handle_message(
                self.role,
                &mut self.registry,
                &mut self.profile,
                payload,
                &mut reply,
            )?;
            (outcome.reply_len, outcome.bus_reset)
        } else {
            let Some(peripheral) = self.registry.find_by_address(header.src) else {
                log::warn!(
                    "[dispatch] no peripheral registered at 0x{:02x}, dropping port {} frame",
                    header.src,
                    header.port
                );
                return Ok(0);
            };
            match peripheral.handle_message(header.port, payload, &mut reply)? {
                Disposition::Reply(n) => (n, false),
                Disposition::Consumed | Disposition::Unrecognized => (0, false),
            }
        };

        if reset {
            self.bus_reset();
        }
        if reply_len == 0 {
            return Ok(0);
        }

        // The reply re-uses the exchange: back to the sender, same port
        let mut out = [0u8; MAX_FRAME_LEN];
        let n = build_frame(
            header.src,
            self.profile.address,
            header.port,
            &reply[..reply_len],
            &mut out,
        )?;
        self.reply_slot.stage(Frame::from_slice(&out[..n])?);
        Ok(n)
    }

    /// Ask the registry for an owed outgoing frame (retry or fresh change).
    ///
    /// Scans proxies most-recently-registered first, ports ascending;
    /// writes a complete frame into `buf` and returns its length, or 0 when
    /// nothing is pending. An unaddressed device never transmits mailbox
    /// traffic; its sends wait for discovery.
    pub fn poll_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        let local = self.profile.address;
        if local == ADDR_UNASSIGNED {
            return Ok(0);
        }
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        for peripheral in self.registry.peripherals_mut() {
            if let Some((port, n)) = peripheral.poll(&mut payload)? {
                log::debug!(
                    "[dispatch] poll: {} owes {} byte(s) on port {}",
                    peripheral.profile(),
                    n,
                    port
                );
                let dest = peripheral.profile().address;
                return build_frame(dest, local, port, &payload[..n], buf);
            }
        }
        Ok(0)
    }

    /// Pull the staged reply, if any. This is the outbound-data-request
    /// hook for request/response transports; `tick()` flushes it through
    /// the datalink otherwise.
    pub fn take_reply(&mut self) -> Option<Frame> {
        self.reply_slot.take()
    }

    /// Abandon every in-flight exchange and re-derive replication state.
    pub fn bus_reset(&mut self) {
        log::debug!("[dispatch] bus reset");
        self.registry.bus_reset_all();
    }

    /// Broadcast RESET_BUS to every device, then reset locally.
    /// Controller only; devices log and ignore the call.
    pub fn broadcast_bus_reset(&mut self) -> Result<()> {
        if self.role != Role::Controller {
            log::warn!("[dispatch] only the controller may broadcast a bus reset");
            return Ok(());
        }
        let mut payload = [0u8; 1];
        let n = ControlPlane::encode_reset(&mut payload)?;
        let mut out = [0u8; FRAME_HEADER_LEN + 1];
        let len = build_frame(
            ADDR_BROADCAST,
            self.profile.address,
            PORT_CONTROL,
            &payload[..n],
            &mut out,
        )?;
        self.send_bytes(&out[..len])?;
        self.bus_reset();
        Ok(())
    }

    /// Cooperative periodic tick. Never blocks.
    ///
    /// Drains the inbound queue through `handle_frame`, flushing each
    /// staged reply; an exchange that produced no reply instead offers the
    /// transmit window to pending mailbox traffic. A controller
    /// additionally runs the discovery cadence and pushes its own pending
    /// sends (devices transmit only inside controller-granted windows).
    pub fn tick(&mut self) -> Result<()> {
        while let Some(frame) = self.inbound.poll() {
            let replied = self.handle_frame(frame.as_slice())?;
            if replied > 0 {
                self.flush_reply()?;
            } else {
                let mut buf = [0u8; MAX_FRAME_LEN];
                let n = self.poll_frame(&mut buf)?;
                if n > 0 {
                    self.send_bytes(&buf[..n])?;
                }
            }
        }

        if self.role == Role::Controller {
            if self.discovery.tick() {
                self.broadcast_poll()?;
            }
            let mut buf = [0u8; MAX_FRAME_LEN];
            let n = self.poll_frame(&mut buf)?;
            if n > 0 {
                self.send_bytes(&buf[..n])?;
            }
        }
        Ok(())
    }

    fn broadcast_poll(&mut self) -> Result<()> {
        let mut payload = [0u8; 1];
        let n = ControlPlane::encode_poll(&mut payload)?;
        let mut out = [0u8; FRAME_HEADER_LEN + 1];
        let len = build_frame(
            ADDR_BROADCAST,
            self.profile.address,
            PORT_CONTROL,
            &payload[..n],
            &mut out,
        )?;
        log::debug!("[dispatch] discovery poll");
        self.send_bytes(&out[..len])
    }

    fn flush_reply(&mut self) -> Result<()> {
        if let Some(frame) = self.reply_slot.take() {
            self.send_bytes(frame.as_slice())?;
        }
        Ok(())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.trace_frames {
            log::debug!("[dispatch] tx {:02x?}", bytes);
        }
        self.link.send_frame(bytes)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`Node`]. Defaults: controllers sit at 0x01 with a
/// controller type tag; devices start unaddressed as generic sensors.
pub struct NodeBuilder {
    role: Role,
    address: u8,
    device_type: DeviceType,
    hardware_id: u16,
    poll_interval: Duration,
    link: Option<Box<dyn Datalink + Send>>,
    inbound: Option<FrameQueue>,
}

impl NodeBuilder {
    fn new(role: Role) -> Self {
        let (address, device_type) = match role {
            Role::Controller => (ADDR_CONTROLLER, DeviceType::Controller),
            Role::Peripheral => (ADDR_UNASSIGNED, DeviceType::Sensor),
        };
        Self {
            role,
            address,
            device_type,
            hardware_id: 0,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            link: None,
            inbound: None,
        }
    }

    /// Fixed bus address. A device given one up front skips discovery.
    #[must_use]
    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Discovery identity: device-type tag plus stable hardware id.
    /// A nonzero hardware id gets a fresh session generation at build.
    #[must_use]
    pub fn device(mut self, device_type: DeviceType, hardware_id: u16) -> Self {
        self.device_type = device_type;
        self.hardware_id = hardware_id;
        self
    }

    /// Datalink to transmit through (defaults to a [`NullLink`]).
    #[must_use]
    pub fn link(mut self, link: Box<dyn Datalink + Send>) -> Self {
        self.link = Some(link);
        self
    }

    /// Inbound queue to drain; pair it with the matching transport
    /// endpoint so delivered frames reach this node.
    #[must_use]
    pub fn inbound(mut self, queue: FrameQueue) -> Self {
        self.inbound = Some(queue);
        self
    }

    /// Discovery poll cadence (controller role only).
    #[must_use]
    pub fn poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = period;
        self
    }

    /// Bring the datalink up and assemble the node.
    pub fn build(self) -> Result<Node> {
        let mut link = self
            .link
            .unwrap_or_else(|| Box::new(NullLink::new(self.address)));
        link.initialize()?;

        let mut profile = DeviceProfile::new(self.address, self.device_type);
        if self.hardware_id != 0 {
            profile.hardware_id = self.hardware_id;
            profile.generation = derive_generation();
        }

        let trace_frames = std::env::var_os("HBUS_TRACE_FRAMES").is_some();
        log::debug!("[dispatch] node built: role={:?} {}", self.role, profile);
        Ok(Node {
            role: self.role,
            profile,
            registry: PeripheralRegistry::new(),
            control: ControlPlane::new(),
            link,
            inbound: self.inbound.unwrap_or_default(),
            reply_slot: ReplySlot::new(),
            discovery: Interval::with_period(self.poll_interval),
            trace_frames,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
