#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gatt_peripheral::advertise::{AdElement, AdvertisementParameters};
use gatt_peripheral::attribute::{AttributeInfo, CharacteristicProp};
use gatt_peripheral::connection::ConnectionEvent;
use gatt_peripheral::gatt::{GattControl, PeripheralDelegate, ReadError, WriteError};
use gatt_peripheral::link::LinkLayer;
use gatt_peripheral::peripheral::PeripheralManager;
use gatt_peripheral::table::CharacteristicHandles;
use gatt_peripheral::{AttributeHandle, ConnectionHandle, Error, Uuid};

pub const CONN: ConnectionHandle = 7;

pub type Manager<'d> = PeripheralManager<'d, NoopRawMutex, MockLink, 32, 8, 8, 8>;

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Link layer double recording every call and assigning handles contiguously
/// starting at 1.
pub struct MockLink {
    next_handle: Cell<AttributeHandle>,
    pub batches: RefCell<Vec<usize>>,
    /// Base pool index of every registered attribute, in table order.
    pub bases: RefCell<Vec<u8>>,
    pub unregistered: Cell<u32>,
    pub advertising: Cell<bool>,
    pub mtu_exchanges: RefCell<Vec<ConnectionHandle>>,
    pub disconnects: RefCell<Vec<ConnectionHandle>>,
    pub indications: RefCell<Vec<(ConnectionHandle, AttributeHandle, usize)>>,
    pub device_name: RefCell<Option<String>>,
    pub device_address: Cell<Option<[u8; 6]>>,
    pub fail_register: Cell<bool>,
    pub fail_indicate: Cell<bool>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            next_handle: Cell::new(1),
            batches: RefCell::new(Vec::new()),
            bases: RefCell::new(Vec::new()),
            unregistered: Cell::new(0),
            advertising: Cell::new(false),
            mtu_exchanges: RefCell::new(Vec::new()),
            disconnects: RefCell::new(Vec::new()),
            indications: RefCell::new(Vec::new()),
            device_name: RefCell::new(None),
            device_address: Cell::new(None),
            fail_register: Cell::new(false),
            fail_indicate: Cell::new(false),
        }
    }
}

impl LinkLayer for MockLink {
    fn register_service(&self, attributes: &[AttributeInfo<'_>]) -> Result<AttributeHandle, Error> {
        if self.fail_register.get() {
            return Err(Error::OutOfResources);
        }
        let first = self.next_handle.get();
        self.next_handle.set(first + attributes.len() as AttributeHandle);
        self.batches.borrow_mut().push(attributes.len());
        self.bases
            .borrow_mut()
            .extend(attributes.iter().map(|info| info.resolved.base));
        Ok(first)
    }

    fn unregister_all(&self) -> Result<(), Error> {
        self.unregistered.set(self.unregistered.get() + 1);
        Ok(())
    }

    fn start_advertising(
        &self,
        _parameters: &AdvertisementParameters,
        _adv_data: &[AdElement<'_>],
        _scan_response: &[AdElement<'_>],
    ) -> Result<(), Error> {
        self.advertising.set(true);
        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), Error> {
        self.advertising.set(false);
        Ok(())
    }

    fn initiate_mtu_exchange(&self, connection: ConnectionHandle) -> Result<(), Error> {
        self.mtu_exchanges.borrow_mut().push(connection);
        Ok(())
    }

    fn disconnect(&self, connection: ConnectionHandle) -> Result<(), Error> {
        self.disconnects.borrow_mut().push(connection);
        Ok(())
    }

    fn indicate(&self, connection: ConnectionHandle, attribute: AttributeHandle, value: &[u8]) -> Result<(), Error> {
        if self.fail_indicate.get() {
            return Err(Error::OutOfResources);
        }
        self.indications.borrow_mut().push((connection, attribute, value.len()));
        Ok(())
    }

    fn set_device_name(&self, name: &str) -> Result<(), Error> {
        *self.device_name.borrow_mut() = Some(name.to_string());
        Ok(())
    }

    fn set_device_address(&self, address: &[u8; 6]) -> Result<(), Error> {
        self.device_address.set(Some(*address));
        Ok(())
    }
}

/// Delegate double with scripted verdicts and recorded calls.
pub struct TestDelegate {
    pub value: RefCell<Vec<u8>>,
    pub read_error: Cell<Option<ReadError>>,
    pub write_error: Cell<Option<WriteError>>,
    pub disconnect_on_read: Cell<bool>,
    pub disconnect_on_write: Cell<bool>,
    pub reads: RefCell<Vec<AttributeHandle>>,
    pub writes: RefCell<Vec<(AttributeHandle, Vec<u8>)>>,
    pub connected: Cell<u32>,
    pub disconnected: Cell<u32>,
    pub ready: Cell<u32>,
}

impl TestDelegate {
    pub fn new() -> Self {
        Self {
            value: RefCell::new(Vec::new()),
            read_error: Cell::new(None),
            write_error: Cell::new(None),
            disconnect_on_read: Cell::new(false),
            disconnect_on_write: Cell::new(false),
            reads: RefCell::new(Vec::new()),
            writes: RefCell::new(Vec::new()),
            connected: Cell::new(0),
            disconnected: Cell::new(0),
            ready: Cell::new(0),
        }
    }

    pub fn with_value(value: &[u8]) -> Self {
        let delegate = Self::new();
        *delegate.value.borrow_mut() = value.to_vec();
        delegate
    }
}

impl PeripheralDelegate for TestDelegate {
    fn read_request(
        &self,
        _connection: ConnectionHandle,
        attribute: AttributeHandle,
        buffer: &mut [u8],
        control: &GattControl<'_>,
    ) -> Result<usize, ReadError> {
        self.reads.borrow_mut().push(attribute);
        if self.disconnect_on_read.get() {
            control.request_disconnect();
        }
        if let Some(err) = self.read_error.get() {
            return Err(err);
        }
        let value = self.value.borrow();
        if value.len() > buffer.len() {
            return Err(ReadError::OutOfResources);
        }
        buffer[..value.len()].copy_from_slice(&value);
        Ok(value.len())
    }

    fn write_request(
        &self,
        _connection: ConnectionHandle,
        attribute: AttributeHandle,
        value: &[u8],
        control: &GattControl<'_>,
    ) -> Result<(), WriteError> {
        self.writes.borrow_mut().push((attribute, value.to_vec()));
        if self.disconnect_on_write.get() {
            control.request_disconnect();
        }
        if let Some(err) = self.write_error.get() {
            return Err(err);
        }
        Ok(())
    }

    fn connected_central(&self, _connection: ConnectionHandle) {
        self.connected.set(self.connected.get() + 1);
    }

    fn disconnected_central(&self, _connection: ConnectionHandle) {
        self.disconnected.set(self.disconnected.get() + 1);
    }

    fn ready_to_update_subscribers(&self, _connection: ConnectionHandle) {
        self.ready.set(self.ready.get() + 1);
    }
}

/// A battery-style fixture: one primary service with two delegate-owned
/// characteristics, the first also subscribable. Handles come out as
/// 1 = service, 2/3/4 = declaration/value/ccc, 5/6 = declaration/value.
pub fn battery_manager<'d>(delegate: &'d TestDelegate) -> (Manager<'d>, CharacteristicHandles, CharacteristicHandles) {
    let mut manager = Manager::new(MockLink::new());
    manager.set_delegate(delegate);
    manager.add_service(Uuid::new_short(0x180F), true).unwrap();
    let level = manager
        .add_characteristic(
            Uuid::new_short(0x2A19),
            [
                CharacteristicProp::Read,
                CharacteristicProp::Write,
                CharacteristicProp::Indicate,
            ]
            .into(),
            None,
        )
        .unwrap();
    let state = manager
        .add_characteristic(
            Uuid::new_short(0x2A1A),
            [CharacteristicProp::Read, CharacteristicProp::Write].into(),
            None,
        )
        .unwrap();
    manager.publish_services().unwrap();
    (manager, level, state)
}

pub fn connect(manager: &Manager<'_>) {
    manager.handle_event(ConnectionEvent::Connected { connection: CONN });
}
