// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peripheral registry
//!
//! One proxy object per remote device, owned by the registry (no global
//! state). Proxies get a stable handle at registration; traversal order is
//! most-recently-registered first and deterministic, and every lookup and
//! fan-out uses that same order.

use crate::config::{NUM_PORTS, PORT_CONTROL};
use crate::device::{DeviceProfile, NodeContext};
use crate::error::{Error, Result};
use crate::mailbox::Disposition;
use crate::service::Service;

/// Stable handle to a registered peripheral (valid for the registry's
/// lifetime; proxies are never removed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeripheralHandle(usize);

impl PeripheralHandle {
    /// Underlying slot index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// Proxy for one remote device: descriptor plus a port table of services.
pub struct Peripheral {
    id: u32,
    profile: DeviceProfile,
    services: [Option<Box<dyn Service + Send>>; NUM_PORTS],
}

impl Peripheral {
    fn new(id: u32, profile: DeviceProfile) -> Self {
        Self {
            id,
            profile,
            services: std::array::from_fn(|_| None),
        }
    }

    /// Tracking id assigned at registration.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Device descriptor.
    #[must_use]
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Device descriptor, mutable (discovery binds identity through here).
    pub fn profile_mut(&mut self) -> &mut DeviceProfile {
        &mut self.profile
    }

    /// Bind a service into the port table. Conflict policy is reject:
    /// an occupied port is an error, never an overwrite.
    pub fn register_service(&mut self, port: u8, service: Box<dyn Service + Send>) -> Result<()> {
        if usize::from(port) >= NUM_PORTS {
            return Err(Error::InvalidPort(port));
        }
        if port == PORT_CONTROL {
            return Err(Error::PortReserved(port));
        }
        let slot = &mut self.services[usize::from(port)];
        if slot.is_some() {
            return Err(Error::PortInUse(port));
        }
        *slot = Some(service);
        log::debug!(
            "[registry] peripheral id={} bound service at port {}",
            self.id,
            port
        );
        Ok(())
    }

    /// True iff a service is bound at `port`.
    #[must_use]
    pub fn has_service(&self, port: u8) -> bool {
        usize::from(port) < NUM_PORTS && self.services[usize::from(port)].is_some()
    }

    /// Route an inbound payload to the service at `port`.
    ///
    /// An empty slot is a protocol anomaly: logged, reported as
    /// unrecognized, never an error.
    pub fn handle_message(&mut self, port: u8, msg: &[u8], reply: &mut [u8]) -> Result<Disposition> {
        let Some(service) = self
            .services
            .get_mut(usize::from(port))
            .and_then(|s| s.as_mut())
        else {
            log::warn!(
                "[registry] peripheral id={} has no service at port {}, dropping {} bytes",
                self.id,
                port,
                msg.len()
            );
            return Ok(Disposition::Unrecognized);
        };
        service.handle_message(msg, reply)
    }

    /// Ask the port table for an owed outgoing payload, ascending port
    /// order; first service with bytes wins the slot.
    pub fn poll(&mut self, buf: &mut [u8]) -> Result<Option<(u8, usize)>> {
        for (port, slot) in self.services.iter_mut().enumerate() {
            if let Some(service) = slot.as_mut() {
                let n = service.poll_message(buf)?;
                if n > 0 {
                    return Ok(Some((port as u8, n)));
                }
            }
        }
        Ok(None)
    }

    /// One-time setup fan-out across the port table.
    pub fn configure(&mut self, ctx: &NodeContext) {
        for slot in self.services.iter_mut() {
            if let Some(service) = slot.as_mut() {
                service.configure(ctx);
            }
        }
    }

    /// Bus-reset fan-out across the port table.
    pub fn bus_reset(&mut self) {
        log::debug!("[registry] peripheral id={} bus reset", self.id);
        for slot in self.services.iter_mut() {
            if let Some(service) = slot.as_mut() {
                service.bus_reset();
            }
        }
    }
}

/// Owned, insertion-ordered collection of peripheral proxies.
#[derive(Default)]
pub struct PeripheralRegistry {
    peripherals: Vec<Peripheral>,
}

impl PeripheralRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proxy; returns its stable handle.
    pub fn add(&mut self, profile: DeviceProfile) -> PeripheralHandle {
        let id = self.peripherals.len() as u32;
        log::debug!("[registry] added peripheral {} id={}", profile, id);
        self.peripherals.push(Peripheral::new(id, profile));
        PeripheralHandle(self.peripherals.len() - 1)
    }

    /// Number of registered proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    /// True iff no proxy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peripherals.is_empty()
    }

    /// Proxy by handle.
    #[must_use]
    pub fn peripheral(&self, handle: PeripheralHandle) -> Option<&Peripheral> {
        self.peripherals.get(handle.0)
    }

    /// Proxy by handle, mutable.
    pub fn peripheral_mut(&mut self, handle: PeripheralHandle) -> Option<&mut Peripheral> {
        self.peripherals.get_mut(handle.0)
    }

    /// First proxy whose descriptor address matches, scanning
    /// most-recently-registered first.
    pub fn find_by_address(&mut self, address: u8) -> Option<&mut Peripheral> {
        self.peripherals
            .iter_mut()
            .rev()
            .find(|p| p.profile.address == address)
    }

    /// First proxy matching the descriptor's device type AND address,
    /// scanning most-recently-registered first (discovery/handshake path).
    pub fn find_for_device(&mut self, descriptor: &DeviceProfile) -> Option<&mut Peripheral> {
        self.peripherals.iter_mut().rev().find(|p| {
            p.profile.device_type == descriptor.device_type
                && p.profile.address == descriptor.address
        })
    }

    /// All proxies, most-recently-registered first.
    pub fn peripherals_mut(&mut self) -> impl Iterator<Item = &mut Peripheral> {
        self.peripherals.iter_mut().rev()
    }

    /// Run one-time setup on every proxy, most-recently-registered first.
    pub fn configure_all(&mut self, ctx: &NodeContext) {
        log::debug!(
            "[registry] configuring {} peripheral(s)",
            self.peripherals.len()
        );
        for p in self.peripherals.iter_mut().rev() {
            p.configure(ctx);
        }
    }

    /// Fan a bus reset out to every proxy, most-recently-registered first.
    pub fn bus_reset_all(&mut self) {
        log::debug!(
            "[registry] bus reset across {} peripheral(s)",
            self.peripherals.len()
        );
        for p in self.peripherals.iter_mut().rev() {
            p.bus_reset();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
