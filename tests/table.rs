mod common;

use common::{setup, Manager, MockLink, TestDelegate};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gatt_peripheral::attribute::{CharacteristicProp, Permissions};
use gatt_peripheral::peripheral::PeripheralManager;
use gatt_peripheral::{Error, Uuid};

const ACCESSORY_UUID: [u8; 16] = [
    0x91, 0x52, 0x76, 0xBB, 0x26, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x53, 0x00, 0x00, 0x00,
];

#[test]
fn handles_are_contiguous_and_monotonic() {
    setup();
    let delegate = TestDelegate::new();
    let (manager, level, state) = common::battery_manager(&delegate);

    assert_eq!(manager.resolve_handle(level.value).unwrap(), 3);
    assert_eq!(manager.resolve_handle(level.ccc.unwrap()).unwrap(), 4);
    assert_eq!(manager.resolve_handle(state.value).unwrap(), 6);
    assert!(state.ccc.is_none());
    assert_eq!(*manager.link().batches.borrow(), vec![6]);
}

#[test]
fn subscribable_characteristic_orders_value_before_ccc() {
    setup();
    let delegate = TestDelegate::new();
    let (manager, level, _) = common::battery_manager(&delegate);

    let value = manager.resolve_handle(level.value).unwrap();
    let ccc = manager.resolve_handle(level.ccc.unwrap()).unwrap();
    assert!(value != 0 && ccc != 0);
    assert!(value < ccc);
}

#[test]
fn resolve_before_publish_is_invalid_state() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    let level = manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();

    assert_eq!(manager.resolve_handle(level.value).unwrap_err(), Error::InvalidState);
    manager.publish_services().unwrap();
    assert_eq!(manager.resolve_handle(level.value).unwrap(), 3);
}

#[test]
fn each_service_is_registered_as_one_batch() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    manager.add_service(Uuid::new_long(ACCESSORY_UUID), true).unwrap();
    manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();
    // Staging the next service publishes the previous one.
    manager.add_service(Uuid::new_short(0x1801), true).unwrap();
    manager
        .add_characteristic(
            Uuid::new_short(0x2A05),
            [CharacteristicProp::Indicate].into(),
            None,
        )
        .unwrap();
    manager.publish_services().unwrap();

    assert_eq!(*manager.link().batches.borrow(), vec![3, 4]);
}

#[test]
fn registered_attributes_carry_their_base_index() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();
    manager.add_service(Uuid::new_long(ACCESSORY_UUID), true).unwrap();
    manager
        .add_characteristic(Uuid::new_long(ACCESSORY_UUID), [CharacteristicProp::Read].into(), None)
        .unwrap();
    manager.publish_services().unwrap();

    // SIG attributes resolve onto the Bluetooth base in slot 0; the vendor
    // service shares one pooled base in slot 1.
    assert_eq!(*manager.link().bases.borrow(), vec![0, 0, 0, 1, 1, 1]);
}

#[test]
fn building_after_finish_is_invalid_state() {
    setup();
    let delegate = TestDelegate::new();
    let (mut manager, _, _) = common::battery_manager(&delegate);

    assert_eq!(
        manager.add_service(Uuid::new_short(0x1801), true).unwrap_err(),
        Error::InvalidState
    );
    assert_eq!(
        manager
            .add_characteristic(Uuid::new_short(0x2A05), [CharacteristicProp::Read].into(), None)
            .unwrap_err(),
        Error::InvalidState
    );
    assert_eq!(manager.publish_services().unwrap_err(), Error::InvalidState);
}

#[test]
fn characteristic_requires_a_staged_service() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    assert_eq!(
        manager
            .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
            .unwrap_err(),
        Error::InvalidState
    );
}

#[test]
fn descriptor_requires_a_characteristic() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    assert_eq!(
        manager
            .add_descriptor(Uuid::new_short(0x2901), Permissions::READ, Some(b"level"))
            .unwrap_err(),
        Error::InvalidState
    );

    manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();
    let descriptor = manager
        .add_descriptor(Uuid::new_short(0x2901), Permissions::READ, Some(b"level"))
        .unwrap();
    manager.publish_services().unwrap();
    assert_eq!(manager.resolve_handle(descriptor).unwrap(), 4);
}

#[test]
fn attribute_capacity_overflow_is_out_of_resources() {
    setup();
    // Room for the service declaration plus one characteristic only.
    let mut manager: PeripheralManager<'_, NoopRawMutex, MockLink, 3, 8, 8, 8> =
        PeripheralManager::new(MockLink::new());
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();

    let before = manager.characteristic_count();
    assert_eq!(
        manager
            .add_characteristic(Uuid::new_short(0x2A1A), [CharacteristicProp::Read].into(), None)
            .unwrap_err(),
        Error::OutOfResources
    );
    // No partial append.
    assert_eq!(manager.characteristic_count(), before);
    manager.publish_services().unwrap();
    assert_eq!(*manager.link().batches.borrow(), vec![3]);
}

#[test]
fn rebuild_after_remove_all_services() {
    setup();
    let delegate = TestDelegate::new();
    let (mut manager, _, _) = common::battery_manager(&delegate);

    manager.remove_all_services().unwrap();
    assert_eq!(manager.link().unregistered.get(), 1);

    manager.add_service(Uuid::new_short(0x1801), true).unwrap();
    let changed = manager
        .add_characteristic(
            Uuid::new_short(0x2A05),
            [CharacteristicProp::Indicate].into(),
            None,
        )
        .unwrap();
    manager.publish_services().unwrap();
    // The link keeps handing out fresh handles; resolution still works.
    assert_eq!(manager.resolve_handle(changed.value).unwrap(), 9);
}

#[test]
fn failed_registration_leaves_the_service_staged() {
    setup();
    let mut manager = Manager::new(MockLink::new());
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    manager
        .add_characteristic(Uuid::new_short(0x2A19), [CharacteristicProp::Read].into(), None)
        .unwrap();

    manager.link().fail_register.set(true);
    assert_eq!(manager.publish_services().unwrap_err(), Error::OutOfResources);

    manager.link().fail_register.set(false);
    manager.publish_services().unwrap();
    assert_eq!(*manager.link().batches.borrow(), vec![3]);
}

#[test]
fn device_setup_passes_through_to_the_link() {
    setup();
    let manager = Manager::new(MockLink::new());
    manager.set_device_name("Accessory").unwrap();
    manager.set_device_address(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]).unwrap();
    assert_eq!(manager.link().device_name.borrow().as_deref(), Some("Accessory"));
    assert_eq!(
        manager.link().device_address.get(),
        Some([0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    );
}
