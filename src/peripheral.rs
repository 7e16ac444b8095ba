//! The peripheral manager.
//!
//! Owns the attribute table, the link layer and all runtime connection state.
//! The table is built with `&mut self` before any central shows up; once
//! [`publish_services`](PeripheralManager::publish_services) has run, the
//! link layer binding drives the manager through `&self` entry points, with
//! every mutable piece behind one blocking mutex.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::advertise::{decode_elements, AdvertisementParameters};
use crate::att::{AttErrorCode, WriteKind};
use crate::attribute::{copy_at_offset, AttributeKind, CharacteristicProps, Permissions};
use crate::connection::{Connection, ConnectionEvent};
use crate::gatt::{GattControl, GattOperation, PeripheralDelegate, Transaction};
use crate::link::LinkLayer;
use crate::table::{AttributeTable, CharacteristicHandles, PendingHandle};
use crate::types::uuid::Uuid;
use crate::{AttributeHandle, ConnectionHandle, Error, ATT_MTU_MIN, MAX_ATTRIBUTE_BYTES};

struct Shared<'d, const CCCS: usize> {
    delegate: Option<&'d dyn PeripheralDelegate>,
    connection: Option<Connection>,
    transaction: Transaction,
    /// Scratch buffer staging the value of the in-flight transaction.
    bytes: [u8; MAX_ATTRIBUTE_BYTES],
    /// Client Characteristic Configuration values, one slot per subscribable
    /// characteristic.
    ccc: [u16; CCCS],
}

impl<'d, const CCCS: usize> Shared<'d, CCCS> {
    fn new() -> Self {
        Self {
            delegate: None,
            connection: None,
            transaction: Transaction::default(),
            bytes: [0; MAX_ATTRIBUTE_BYTES],
            ccc: [0; CCCS],
        }
    }

    fn connection_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        match self.connection.as_mut() {
            Some(conn) if conn.handle == handle => Some(conn),
            _ => None,
        }
    }

    /// Discard a read transaction left open for a spurious Read Blob request
    /// that never arrived.
    ///
    /// Some central stacks negotiate a second, different MTU and then issue
    /// one Read Blob request past the end of a value; the read completion
    /// path keeps the transaction open for it. When any other request shows
    /// up first, the stale transaction is dropped here.
    fn sweep_stale_read(&mut self) {
        let second = match self.connection.as_ref() {
            Some(conn) => conn.second_client_mtu,
            None => return,
        };
        if second != 0
            && self.transaction.op == GattOperation::Read
            && self.transaction.offset == self.transaction.len
        {
            warn!("expected spurious ATT Read Blob Request not received, dropping stale read");
            self.transaction.reset();
        }
    }
}

/// A single-connection GATT peripheral.
pub struct PeripheralManager<
    'd,
    M: RawMutex,
    L: LinkLayer,
    const ATTS: usize,
    const CHARS: usize,
    const CCCS: usize,
    const BASES: usize,
> {
    link: L,
    table: AttributeTable<'d, ATTS, CHARS, CCCS, BASES>,
    state: Mutex<M, RefCell<Shared<'d, CCCS>>>,
}

impl<'d, M: RawMutex, L: LinkLayer, const ATTS: usize, const CHARS: usize, const CCCS: usize, const BASES: usize>
    PeripheralManager<'d, M, L, ATTS, CHARS, CCCS, BASES>
{
    pub fn new(link: L) -> Self {
        Self {
            link,
            table: AttributeTable::new(),
            state: Mutex::new(RefCell::new(Shared::new())),
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn set_delegate(&self, delegate: &'d dyn PeripheralDelegate) {
        self.state.lock(|state| {
            state.borrow_mut().delegate = Some(delegate);
        });
    }

    pub fn set_device_name(&self, name: &str) -> Result<(), Error> {
        self.link.set_device_name(name)
    }

    /// Set the random device address, 6 bytes little-endian.
    pub fn set_device_address(&self, address: &[u8; 6]) -> Result<(), Error> {
        self.link.set_device_address(address)
    }

    /// Stage a new service. Publishes the previously staged service first.
    pub fn add_service(&mut self, uuid: Uuid, primary: bool) -> Result<(), Error> {
        self.table.add_service(&self.link, uuid, primary)
    }

    /// Add a characteristic to the staged service.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        props: CharacteristicProps,
        const_value: Option<&'d [u8]>,
    ) -> Result<CharacteristicHandles, Error> {
        self.table.add_characteristic(uuid, props, const_value)
    }

    /// Add a descriptor to the most recently added characteristic.
    pub fn add_descriptor(
        &mut self,
        uuid: Uuid,
        permissions: Permissions,
        const_value: Option<&'d [u8]>,
    ) -> Result<PendingHandle, Error> {
        self.table.add_descriptor(uuid, permissions, const_value)
    }

    /// Publish any staged service and freeze the attribute table.
    pub fn publish_services(&mut self) -> Result<(), Error> {
        self.table.finish_all_services(&self.link)
    }

    /// Unregister every service and allow the table to be rebuilt.
    pub fn remove_all_services(&mut self) -> Result<(), Error> {
        self.link.unregister_all()?;
        self.table.clear();
        self.state.lock(|state| {
            let mut shared = state.borrow_mut();
            shared.transaction.reset();
            shared.bytes.fill(0);
            shared.ccc.fill(0);
        });
        Ok(())
    }

    /// Redeem a pending handle issued by the table builder.
    pub fn resolve_handle(&self, pending: PendingHandle) -> Result<AttributeHandle, Error> {
        self.table.resolve(pending)
    }

    /// Number of characteristics in the table, published or staged.
    pub fn characteristic_count(&self) -> usize {
        self.table.characteristic_count()
    }

    /// Number of services in the table, published or staged.
    pub fn service_count(&self) -> usize {
        self.table.service_count()
    }

    /// Validate raw advertising payloads and start advertising.
    pub fn start_advertising(
        &self,
        parameters: &AdvertisementParameters,
        adv_data: &[u8],
        scan_response: &[u8],
    ) -> Result<(), Error> {
        let adv = decode_elements(adv_data)?;
        let scan = decode_elements(scan_response)?;
        self.link.start_advertising(parameters, &adv, &scan)
    }

    pub fn stop_advertising(&self) -> Result<(), Error> {
        self.link.stop_advertising()
    }

    /// Tear down the central connection. Idempotent while a disconnect is
    /// already in progress.
    pub fn cancel_central_connection(&self, connection: ConnectionHandle) -> Result<(), Error> {
        let proceed = self.state.lock(|state| {
            let mut shared = state.try_borrow_mut().map_err(|_| Error::InvalidState)?;
            if shared.connection_mut(connection).is_none() {
                return Err(Error::InvalidState);
            }
            if shared.transaction.op == GattOperation::Disconnecting {
                return Ok(false);
            }
            shared.transaction.reset();
            shared.transaction.op = GattOperation::Disconnecting;
            Ok(true)
        })?;
        if proceed {
            info!("disconnecting central, connection {}", connection);
            self.link.disconnect(connection)?;
        }
        Ok(())
    }

    /// Send a Handle Value Indication for a characteristic value attribute.
    ///
    /// Only empty values are supported; a non-empty value would claim the
    /// transaction scratch buffer while a central-initiated transaction may
    /// be using it.
    pub fn send_handle_value_indication(
        &self,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        value: &[u8],
    ) -> Result<(), Error> {
        self.state.lock(|state| {
            let mut shared = state.try_borrow_mut().map_err(|_| Error::InvalidState)?;
            let conn = shared.connection_mut(connection).ok_or(Error::InvalidState)?;
            if conn.indication_in_flight {
                info!("an indication is already in progress");
                return Err(Error::InvalidState);
            }
            let mtu = conn.mtu;
            if shared.transaction.op == GattOperation::Disconnecting {
                info!("not sending indication while the connection is being terminated");
                return Err(Error::InvalidState);
            }
            // Handle Value Indication.
            // See Bluetooth Core Specification Version 5
            // Vol 3 Part F Section 3.4.7.2 Handle Value Indication
            if value.len() > (mtu - 3) as usize {
                info!("event value is too large");
                return Err(Error::OutOfResources);
            }
            if !value.is_empty() {
                info!("indications with a non-empty value are not supported");
                return Err(Error::OutOfResources);
            }
            if !self.table.is_characteristic_value(attribute) {
                return Err(Error::NotFound);
            }
            if let Some(conn) = shared.connection_mut(connection) {
                conn.indication_in_flight = true;
            }
            Ok(())
        })?;

        match self.link.indicate(connection, attribute, value) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state.lock(|state| {
                    if let Ok(mut shared) = state.try_borrow_mut() {
                        if let Some(conn) = shared.connection_mut(connection) {
                            conn.indication_in_flight = false;
                        }
                    }
                });
                Err(e)
            }
        }
    }

    /// Process a connection lifecycle event reported by the link layer.
    pub fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { connection } => {
                let delegate = self.state.lock(|state| {
                    let mut shared = match state.try_borrow_mut() {
                        Ok(shared) => shared,
                        Err(_) => return None,
                    };
                    if shared.connection.is_some() {
                        warn!("connected event while a central is already connected, ignoring");
                        return None;
                    }
                    shared.connection = Some(Connection::new(connection));
                    shared.delegate
                });
                if let Some(delegate) = delegate {
                    delegate.connected_central(connection);
                } else {
                    warn!("no connected handler plugged in");
                }
                match self.link.initiate_mtu_exchange(connection) {
                    Ok(()) => debug!("MTU exchange pending"),
                    Err(_) => warn!("failed to initiate MTU exchange"),
                }
            }
            ConnectionEvent::Disconnected { connection } => {
                let delegate = self.state.lock(|state| {
                    let mut shared = match state.try_borrow_mut() {
                        Ok(shared) => shared,
                        Err(_) => return None,
                    };
                    if shared.connection_mut(connection).is_none() {
                        warn!("disconnected event for unknown connection {}", connection);
                        return None;
                    }
                    shared.connection = None;
                    shared.transaction.reset();
                    shared.bytes.fill(0);
                    shared.ccc.fill(0);
                    shared.delegate
                });
                if let Some(delegate) = delegate {
                    delegate.disconnected_central(connection);
                }
            }
            ConnectionEvent::MtuExchanged { connection, mtu } => {
                self.state.lock(|state| {
                    let mut shared = match state.try_borrow_mut() {
                        Ok(shared) => shared,
                        Err(_) => return,
                    };
                    let conn = match shared.connection_mut(connection) {
                        Some(conn) => conn,
                        None => return,
                    };
                    let mtu = mtu.clamp(ATT_MTU_MIN, MAX_ATTRIBUTE_BYTES as u16);
                    if conn.mtu != ATT_MTU_MIN && conn.mtu != mtu {
                        // A second, different MTU arrived after the first
                        // exchange. Keep the negotiated one; the shadow value
                        // feeds the read completion heuristic.
                        info!("staying on previous MTU {} instead of new MTU {}", conn.mtu, mtu);
                        conn.second_client_mtu = mtu;
                    } else {
                        conn.mtu = mtu;
                        info!("new MTU: {}", mtu);
                    }
                });
            }
            ConnectionEvent::MtuExchangeFailed { connection } => {
                warn!("MTU exchange failed, connection {}", connection);
            }
            ConnectionEvent::ParamUpdateRequest { connection } | ConnectionEvent::ParamUpdate { connection } => {
                debug!("connection parameter event, connection {}", connection);
            }
            ConnectionEvent::IndicationComplete { connection, success } => {
                let delegate = self.state.lock(|state| {
                    let mut shared = match state.try_borrow_mut() {
                        Ok(shared) => shared,
                        Err(_) => return None,
                    };
                    let conn = shared.connection_mut(connection)?;
                    conn.indication_in_flight = false;
                    shared.delegate
                });
                info!("indication {}", if success { "success" } else { "fail" });
                if let Some(delegate) = delegate {
                    delegate.ready_to_update_subscribers(connection);
                }
            }
        }
    }

    /// Authorize and serve an ATT Read or Read Blob request.
    ///
    /// `offset` zero is a Read Request starting a new transaction; a nonzero
    /// offset continues the pending read as a Read Blob request. Any error
    /// tears the connection down, since several central stacks get stuck on
    /// ATT errors.
    pub fn handle_read(
        &self,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        offset: u16,
        out: &mut [u8],
    ) -> Result<usize, AttErrorCode> {
        let disconnect = Cell::new(false);
        let result = self.state.lock(|state| {
            let mut shared = state
                .try_borrow_mut()
                .map_err(|_| AttErrorCode::INSUFFICIENT_RESOURCES)?;
            self.read_locked(&mut shared, &disconnect, connection, attribute, offset, out)
        });
        if result.is_err() || disconnect.get() {
            // Idempotent while already disconnecting.
            let _ = self.cancel_central_connection(connection);
        }
        result
    }

    fn read_locked(
        &self,
        shared: &mut Shared<'d, CCCS>,
        disconnect: &Cell<bool>,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        offset: u16,
        out: &mut [u8],
    ) -> Result<usize, AttErrorCode> {
        if shared.connection_mut(connection).is_none() {
            warn!("read for unknown connection {}", connection);
            return Err(AttErrorCode::UNLIKELY_ERROR);
        }
        // A Read Blob continuing the pending transaction in sequence may be
        // the spurious request a held-open read is waiting for; everything
        // else drops a held-open read first.
        let continues_pending_read = offset != 0
            && shared.transaction.op == GattOperation::Read
            && shared.transaction.handle == attribute
            && shared.transaction.offset == offset;
        if !continues_pending_read {
            shared.sweep_stale_read();
        }

        let attr = self
            .table
            .attribute_at(attribute)
            .ok_or(AttErrorCode::INVALID_HANDLE)?;
        let Shared {
            delegate,
            connection: conn_state,
            transaction,
            bytes,
            ccc,
        } = shared;
        // Validated above.
        let conn = conn_state.as_mut().ok_or(AttErrorCode::UNLIKELY_ERROR)?;
        let mtu = conn.mtu;
        let cap = out.len().min((mtu - 1) as usize);

        match attr.kind {
            AttributeKind::ServiceDeclaration { .. } | AttributeKind::CharacteristicDeclaration => {
                return attr.render_declaration(offset as usize, &mut out[..cap]);
            }
            AttributeKind::CccDescriptor => {
                if offset != 0 {
                    return Err(AttErrorCode::INVALID_OFFSET);
                }
                if out.len() < 2 {
                    return Err(AttErrorCode::UNLIKELY_ERROR);
                }
                let slot = attr.ccc_slot.ok_or(AttErrorCode::UNLIKELY_ERROR)?;
                let value = ccc.get(slot as usize).ok_or(AttErrorCode::UNLIKELY_ERROR)?;
                out[..2].copy_from_slice(&value.to_le_bytes());
                return Ok(2);
            }
            AttributeKind::CharacteristicValue | AttributeKind::Descriptor => {}
        }

        if !attr.permissions.readable() {
            return Err(AttErrorCode::READ_NOT_PERMITTED);
        }
        if let Some(value) = attr.const_value() {
            return copy_at_offset(value, offset as usize, &mut out[..cap]);
        }

        if offset == 0 {
            // Read Request.
            // See Bluetooth Core Specification Version 5
            // Vol 3 Part F Section 3.4.4.3 Read Request
            debug!("ATT Read Request, handle {}", attribute);
            if transaction.op != GattOperation::None {
                info!("received Read Request while another operation is in progress");
                return Err(AttErrorCode::READ_NOT_PERMITTED);
            }
            let delegate = match delegate {
                Some(delegate) => *delegate,
                None => {
                    error!("no read request handler plugged in, sending error response");
                    return Err(AttErrorCode::READ_NOT_PERMITTED);
                }
            };
            let control = GattControl::new(disconnect);
            let len = delegate
                .read_request(connection, attribute, &mut bytes[..], &control)
                .map_err(|_| AttErrorCode::READ_NOT_PERMITTED)?;
            if disconnect.get() {
                info!("requested disconnect while handling read request");
                return Err(AttErrorCode::READ_NOT_PERMITTED);
            }
            if len > bytes.len() {
                return Err(AttErrorCode::UNLIKELY_ERROR);
            }
            transaction.op = GattOperation::Read;
            transaction.handle = attribute;
            transaction.offset = 0;
            transaction.len = len as u16;
        } else {
            // Read Blob Request.
            // See Bluetooth Core Specification Version 5
            // Vol 3 Part F Section 3.4.4.5 Read Blob Request
            debug!("ATT Read Blob Request, handle {}", attribute);
            if transaction.op != GattOperation::Read {
                error!("received Read Blob Request without prior Read Request");
                return Err(AttErrorCode::READ_NOT_PERMITTED);
            }
            if transaction.handle != attribute {
                error!("received Read Blob Request for a different attribute than prior Read Request");
                return Err(AttErrorCode::INVALID_HANDLE);
            }
            if transaction.offset != offset {
                error!(
                    "received Read Blob Request with non-sequential offset (expected: {}, actual: {})",
                    transaction.offset, offset
                );
                return Err(AttErrorCode::INVALID_OFFSET);
            }
        }

        // Serve the next chunk.
        let remaining = transaction.len - transaction.offset;
        let num_sent = remaining.min(mtu - 1);
        if out.len() < num_sent as usize {
            return Err(AttErrorCode::UNLIKELY_ERROR);
        }
        let start = transaction.offset as usize;
        out[..num_sent as usize].copy_from_slice(&bytes[start..start + num_sent as usize]);
        transaction.offset += num_sent;

        if transaction.offset == transaction.len {
            if num_sent == mtu - 1 {
                info!("expecting additional ATT Read Blob Request to resolve length ambiguity");
            } else if conn.second_client_mtu != 0 && num_sent >= conn.second_client_mtu - 1 {
                info!("expecting spurious ATT Read Blob Request");
            } else {
                transaction.reset();
            }
        }
        Ok(num_sent as usize)
    }

    /// Authorize an ATT write.
    ///
    /// Request, Command and Execute writes are identical single-shot writes
    /// handed to the delegate; Prepare writes are accepted and dropped. Any
    /// error tears the connection down.
    pub fn handle_write(
        &self,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        offset: u16,
        kind: WriteKind,
        data: &[u8],
    ) -> Result<usize, AttErrorCode> {
        let disconnect = Cell::new(false);
        let result = self.state.lock(|state| {
            let mut shared = state
                .try_borrow_mut()
                .map_err(|_| AttErrorCode::INSUFFICIENT_RESOURCES)?;
            self.write_locked(&mut shared, &disconnect, connection, attribute, offset, kind, data)
        });
        if result.is_err() || disconnect.get() {
            let _ = self.cancel_central_connection(connection);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn write_locked(
        &self,
        shared: &mut Shared<'d, CCCS>,
        disconnect: &Cell<bool>,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        offset: u16,
        kind: WriteKind,
        data: &[u8],
    ) -> Result<usize, AttErrorCode> {
        if shared.connection_mut(connection).is_none() {
            warn!("write for unknown connection {}", connection);
            return Err(AttErrorCode::UNLIKELY_ERROR);
        }
        shared.sweep_stale_read();

        if kind == WriteKind::Prepare {
            // Queued writes are reassembled by the central retrying as a
            // simple write; accept and drop.
            debug!("prepare write, doing nothing");
            return Ok(0);
        }

        debug!("ATT Write Request, handle {}", attribute);
        let attr = self
            .table
            .attribute_at(attribute)
            .ok_or(AttErrorCode::INVALID_HANDLE)?;
        let Shared {
            delegate,
            transaction,
            bytes,
            ccc,
            ..
        } = shared;

        if attr.kind == AttributeKind::CccDescriptor {
            if offset != 0 {
                return Err(AttErrorCode::INVALID_OFFSET);
            }
            if data.len() != 2 {
                return Err(AttErrorCode::INVALID_PDU);
            }
            let slot = attr.ccc_slot.ok_or(AttErrorCode::UNLIKELY_ERROR)?;
            let value = u16::from_le_bytes([data[0], data[1]]);
            match ccc.get_mut(slot as usize) {
                Some(stored) => *stored = value,
                None => return Err(AttErrorCode::UNLIKELY_ERROR),
            }
            debug!("client configuration slot {} = {}", slot, value);
            return Ok(data.len());
        }

        if !attr.permissions.writable() || attr.const_value().is_some() {
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        if transaction.op != GattOperation::None {
            error!("received write while another operation is in progress");
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        if offset != 0 {
            // Offsets only occur in prepare writes.
            error!("simple write should not have an offset");
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        if data.len() > bytes.len() {
            return Err(AttErrorCode::INSUFFICIENT_RESOURCES);
        }
        let delegate = match delegate {
            Some(delegate) => *delegate,
            None => {
                error!("no write request handler plugged in, sending error response");
                return Err(AttErrorCode::WRITE_NOT_PERMITTED);
            }
        };

        // The transaction stays marked Write while the delegate runs; an
        // error return leaves it for the disconnect path to clean up.
        transaction.op = GattOperation::Write;
        transaction.handle = attribute;
        transaction.offset = 0;
        transaction.len = data.len() as u16;
        bytes[..data.len()].copy_from_slice(data);

        let control = GattControl::new(disconnect);
        if delegate
            .write_request(connection, attribute, &bytes[..data.len()], &control)
            .is_err()
        {
            error!("write request handler rejected the value");
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        if disconnect.get() {
            info!("requested disconnect while handling write request");
            return Err(AttErrorCode::WRITE_NOT_PERMITTED);
        }
        transaction.reset();
        debug!("sending Write Response");
        Ok(data.len())
    }
}
