//! GATT transaction state and the delegate contract.

use core::cell::Cell;

use crate::{AttributeHandle, ConnectionHandle};

/// The ATT operation currently in flight. At most one exists at a time.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GattOperation {
    /// No transaction in progress.
    #[default]
    None,
    /// A read transaction, possibly spanning several Read Blob requests.
    Read,
    /// A write is being handed to the delegate.
    Write,
    /// The connection is being torn down; all further requests fail.
    Disconnecting,
}

/// The single in-flight ATT transaction.
#[derive(Default)]
pub(crate) struct Transaction {
    pub(crate) op: GattOperation,
    pub(crate) handle: AttributeHandle,
    /// For reads, the offset the next Read Blob request must carry.
    pub(crate) offset: u16,
    /// Total staged value length.
    pub(crate) len: u16,
}

impl Transaction {
    pub(crate) fn reset(&mut self) {
        self.op = GattOperation::None;
        self.handle = 0;
        self.offset = 0;
        self.len = 0;
    }
}

/// Handed to delegate request handlers.
///
/// Request handlers must not call back into the
/// [`PeripheralManager`](crate::peripheral::PeripheralManager); a handler
/// that decides the connection has to go marks it here and the engine tears
/// the connection down once the handler returns.
pub struct GattControl<'a> {
    disconnect: &'a Cell<bool>,
}

impl<'a> GattControl<'a> {
    pub(crate) fn new(disconnect: &'a Cell<bool>) -> Self {
        Self { disconnect }
    }

    /// Fail the current request and terminate the central connection.
    pub fn request_disconnect(&self) {
        self.disconnect.set(true);
    }
}

/// Verdicts a delegate read handler may return.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The value cannot be produced in the current session state.
    InvalidState,
    /// The value does not fit the offered buffer.
    OutOfResources,
}

/// Verdicts a delegate write handler may return.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// The write is not acceptable in the current session state.
    InvalidState,
    /// The value failed validation.
    InvalidData,
}

/// Application hooks for delegate-owned attribute values and connection
/// lifecycle notifications.
pub trait PeripheralDelegate {
    /// Produce the value of `attribute` into `buffer`, returning its length.
    fn read_request(
        &self,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        buffer: &mut [u8],
        control: &GattControl<'_>,
    ) -> Result<usize, ReadError>;

    /// Accept or reject a write of `value` to `attribute`.
    fn write_request(
        &self,
        connection: ConnectionHandle,
        attribute: AttributeHandle,
        value: &[u8],
        control: &GattControl<'_>,
    ) -> Result<(), WriteError>;

    /// A central connected.
    fn connected_central(&self, connection: ConnectionHandle);

    /// The central connection ended.
    fn disconnected_central(&self, connection: ConnectionHandle);

    /// A previously sent indication completed; more may be sent.
    fn ready_to_update_subscribers(&self, connection: ConnectionHandle);
}
