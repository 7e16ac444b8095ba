//! Boundary to the controller stack.

use crate::advertise::{AdElement, AdvertisementParameters};
use crate::attribute::AttributeInfo;
use crate::{AttributeHandle, ConnectionHandle, Error};

/// Operations the engine needs from the underlying radio stack.
///
/// An implementation binds the engine to a concrete controller, delivering
/// its callbacks as [`ConnectionEvent`](crate::connection::ConnectionEvent)s
/// and its authorization requests to
/// [`PeripheralManager::handle_read`](crate::peripheral::PeripheralManager::handle_read)
/// and [`handle_write`](crate::peripheral::PeripheralManager::handle_write).
/// All methods take `&self`; implementations do their own locking.
pub trait LinkLayer {
    /// Register one service worth of attributes and return the handle of the
    /// first one. Handles must be assigned contiguously in attribute order.
    fn register_service(&self, attributes: &[AttributeInfo<'_>]) -> Result<AttributeHandle, Error>;

    /// Remove every registered service.
    fn unregister_all(&self) -> Result<(), Error>;

    fn start_advertising(
        &self,
        parameters: &AdvertisementParameters,
        adv_data: &[AdElement<'_>],
        scan_response: &[AdElement<'_>],
    ) -> Result<(), Error>;

    fn stop_advertising(&self) -> Result<(), Error>;

    /// Ask the central for a larger ATT MTU.
    fn initiate_mtu_exchange(&self, connection: ConnectionHandle) -> Result<(), Error>;

    /// Tear down the connection to the central.
    fn disconnect(&self, connection: ConnectionHandle) -> Result<(), Error>;

    /// Send a Handle Value Indication carrying `value`.
    fn indicate(&self, connection: ConnectionHandle, attribute: AttributeHandle, value: &[u8]) -> Result<(), Error>;

    fn set_device_name(&self, name: &str) -> Result<(), Error>;

    /// Set the random device address, 6 bytes little-endian.
    fn set_device_address(&self, address: &[u8; 6]) -> Result<(), Error>;
}
