// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two nodes over a loopback bus: value replication, contention, bus reset.

use hbus::{
    DeviceProfile, DeviceType, LoopbackBus, MailboxObserver, MailboxRef, MailboxService, Node,
    Role,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const CONTROLLER: u8 = 0x01;
const DEVICE: u8 = 0x15;
const PORT: u8 = 1;

struct Recorder(Arc<Mutex<Vec<(u32, bool)>>>);

impl MailboxObserver for Recorder {
    fn on_mailbox_change(&mut self, value: u32, changed: bool) {
        self.0.lock().push((value, changed));
    }
}

/// Controller and pre-addressed device sharing one mailbox on port 1.
/// Discovery is quieted down so only mailbox traffic moves.
fn linked_pair() -> (Node, MailboxRef, Node, MailboxRef) {
    let bus = LoopbackBus::new();
    let (ctl_link, ctl_queue) = bus.endpoint(CONTROLLER);
    let (dev_link, dev_queue) = bus.endpoint(DEVICE);

    let mut controller = Node::builder(Role::Controller)
        .link(Box::new(ctl_link))
        .inbound(ctl_queue)
        .poll_interval(Duration::from_secs(3600))
        .build()
        .expect("Failed to build controller");
    let handle = controller
        .registry_mut()
        .add(DeviceProfile::new(DEVICE, DeviceType::Encoder));
    let service = MailboxService::new("position");
    let ctl_mailbox = service.mailbox();
    controller
        .registry_mut()
        .peripheral_mut(handle)
        .expect("Failed to look up proxy")
        .register_service(PORT, Box::new(service))
        .expect("Failed to register service");
    controller
        .initialize()
        .expect("Failed to initialize controller");

    let mut device = Node::builder(Role::Peripheral)
        .device(DeviceType::Encoder, 0xBEEF)
        .address(DEVICE)
        .link(Box::new(dev_link))
        .inbound(dev_queue)
        .build()
        .expect("Failed to build device");
    let handle = device
        .registry_mut()
        .add(DeviceProfile::new(CONTROLLER, DeviceType::Controller));
    let service = MailboxService::new("position");
    let dev_mailbox = service.mailbox();
    device
        .registry_mut()
        .peripheral_mut(handle)
        .expect("Failed to look up proxy")
        .register_service(PORT, Box::new(service))
        .expect("Failed to register service");
    device.initialize().expect("Failed to initialize device");

    (controller, ctl_mailbox, device, dev_mailbox)
}

fn settle(controller: &mut Node, device: &mut Node, rounds: usize) {
    for _ in 0..rounds {
        controller.tick().expect("Failed to tick controller");
        device.tick().expect("Failed to tick device");
    }
}

#[test]
fn controller_write_replicates_and_notifies_once() {
    let (mut controller, ctl_mailbox, mut device, dev_mailbox) = linked_pair();
    let events = Arc::new(Mutex::new(Vec::new()));
    dev_mailbox
        .lock()
        .set_observer(Box::new(Recorder(Arc::clone(&events))));

    ctl_mailbox.lock().set(42);
    settle(&mut controller, &mut device, 3);

    assert_eq!(ctl_mailbox.lock().get(), 42);
    assert_eq!(dev_mailbox.lock().get(), 42);
    assert!(ctl_mailbox.lock().synchronized());
    assert!(dev_mailbox.lock().synchronized());
    assert_eq!(events.lock().as_slice(), &[(42, true)]);

    // Quiet rounds move nothing and never re-notify
    settle(&mut controller, &mut device, 3);
    assert!(ctl_mailbox.lock().synchronized());
    assert_eq!(events.lock().as_slice(), &[(42, true)]);
}

#[test]
fn replication_holds_for_arbitrary_values() {
    let (mut controller, ctl_mailbox, mut device, dev_mailbox) = linked_pair();

    for _ in 0..32 {
        let v = fastrand::u32(..);
        ctl_mailbox.lock().set(v);
        settle(&mut controller, &mut device, 2);
        assert_eq!(ctl_mailbox.lock().get(), v);
        assert_eq!(dev_mailbox.lock().get(), v);
        assert!(ctl_mailbox.lock().synchronized());
        assert!(dev_mailbox.lock().synchronized());
    }
}

#[test]
fn contention_resolves_to_controller_value_on_both_sides() {
    let (mut controller, ctl_mailbox, mut device, dev_mailbox) = linked_pair();

    // Both sides write before either hears from the other
    ctl_mailbox.lock().set(100);
    dev_mailbox.lock().set(200);
    assert!(ctl_mailbox.lock().caller_changed());
    assert!(dev_mailbox.lock().caller_changed());

    settle(&mut controller, &mut device, 4);

    assert_eq!(ctl_mailbox.lock().get(), 100);
    assert_eq!(dev_mailbox.lock().get(), 100);
    assert!(ctl_mailbox.lock().synchronized());
    assert!(dev_mailbox.lock().synchronized());
}

#[test]
fn device_write_piggybacks_on_discovery_poll() {
    // Same pair but with the discovery cadence firing every controller tick:
    // the poll broadcast is the device's transmit window.
    let bus = LoopbackBus::new();
    let (ctl_link, ctl_queue) = bus.endpoint(CONTROLLER);
    let (dev_link, dev_queue) = bus.endpoint(DEVICE);

    let mut controller = Node::builder(Role::Controller)
        .link(Box::new(ctl_link))
        .inbound(ctl_queue)
        .poll_interval(Duration::ZERO)
        .build()
        .expect("Failed to build controller");
    let handle = controller
        .registry_mut()
        .add(DeviceProfile::new(DEVICE, DeviceType::Keypad));
    let service = MailboxService::new("keys");
    let ctl_mailbox = service.mailbox();
    controller
        .registry_mut()
        .peripheral_mut(handle)
        .expect("Failed to look up proxy")
        .register_service(PORT, Box::new(service))
        .expect("Failed to register service");
    controller
        .initialize()
        .expect("Failed to initialize controller");

    let mut device = Node::builder(Role::Peripheral)
        .device(DeviceType::Keypad, 0xCAFE)
        .address(DEVICE)
        .link(Box::new(dev_link))
        .inbound(dev_queue)
        .build()
        .expect("Failed to build device");
    let handle = device
        .registry_mut()
        .add(DeviceProfile::new(CONTROLLER, DeviceType::Controller));
    let service = MailboxService::new("keys");
    let dev_mailbox = service.mailbox();
    device
        .registry_mut()
        .peripheral_mut(handle)
        .expect("Failed to look up proxy")
        .register_service(PORT, Box::new(service))
        .expect("Failed to register service");
    device.initialize().expect("Failed to initialize device");

    dev_mailbox.lock().set(7);
    settle(&mut controller, &mut device, 3);

    assert_eq!(ctl_mailbox.lock().get(), 7);
    assert!(ctl_mailbox.lock().synchronized());
    assert!(dev_mailbox.lock().synchronized());
}

#[test]
fn broadcast_reset_rederives_state_and_retransmits() {
    let (mut controller, ctl_mailbox, mut device, dev_mailbox) = linked_pair();

    ctl_mailbox.lock().set(7);
    settle(&mut controller, &mut device, 3);
    assert_eq!(dev_mailbox.lock().get(), 7);

    // An unacknowledged write survives the reset and goes out again; the
    // quiet side comes back up synchronized
    ctl_mailbox.lock().set(9);
    controller
        .broadcast_bus_reset()
        .expect("Failed to broadcast reset");
    assert!(!ctl_mailbox.lock().synchronized());
    assert!(ctl_mailbox.lock().caller_changed());

    device.tick().expect("Failed to tick device");
    assert!(dev_mailbox.lock().synchronized());
    assert_eq!(dev_mailbox.lock().get(), 7);

    settle(&mut controller, &mut device, 3);
    assert_eq!(ctl_mailbox.lock().get(), 9);
    assert_eq!(dev_mailbox.lock().get(), 9);
    assert!(ctl_mailbox.lock().synchronized());
    assert!(dev_mailbox.lock().synchronized());
}

#[test]
fn reset_retransmission_is_not_a_fresh_change() {
    let (mut controller, ctl_mailbox, mut device, dev_mailbox) = linked_pair();
    let events = Arc::new(Mutex::new(Vec::new()));
    dev_mailbox
        .lock()
        .set_observer(Box::new(Recorder(Arc::clone(&events))));

    ctl_mailbox.lock().set(42);
    settle(&mut controller, &mut device, 3);
    assert_eq!(events.lock().as_slice(), &[(42, true)]);

    // The change notice for 43 is lost to the reset; what goes out after is
    // a routine resynchronization, delivered with the change flag down
    ctl_mailbox.lock().set(43);
    controller
        .broadcast_bus_reset()
        .expect("Failed to broadcast reset");
    settle(&mut controller, &mut device, 3);

    assert_eq!(dev_mailbox.lock().get(), 43);
    assert_eq!(events.lock().as_slice(), &[(42, true), (43, false)]);
}
