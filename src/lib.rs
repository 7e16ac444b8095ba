#![cfg_attr(not(test), no_std)]

//! A single-connection BLE GATT peripheral engine.
//!
//! This crate implements the server side of a GATT peripheral: a fixed
//! attribute table built once at startup, exposed to one connected central at
//! a time, and an ATT transaction state machine answering Read, Read Blob and
//! Write requests against that table. The meaning of attribute values is
//! owned by a [`gatt::PeripheralDelegate`]; the radio stack sits behind the
//! [`link::LinkLayer`] trait.

// This must go first so that the macros can be used in other modules.
mod fmt;

mod codec;
mod cursor;
pub(crate) mod types;

pub mod advertise;
pub mod att;
pub mod attribute;
pub mod connection;
pub mod gatt;
pub mod link;
pub mod peripheral;
pub mod registry;
pub mod table;

pub use types::uuid::Uuid;

/// Minimum ATT MTU mandated by the Bluetooth Core Specification.
pub const ATT_MTU_MIN: u16 = 23;

/// Maximum encoded size of an advertising or scan response payload.
pub const ADV_DATA_MAX: usize = 31;

// TODO: Make these configurable
pub(crate) const MAX_ATTRIBUTE_BYTES: usize = 512;
pub(crate) const MAX_SERVICES: usize = 8;
pub(crate) const MAX_AD_ELEMENTS: usize = 10;

/// A connection handle assigned by the link layer.
pub type ConnectionHandle = u16;

/// An attribute handle assigned by the link layer at publish time.
pub type AttributeHandle = u16;

/// Errors reported by this crate.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The operation is not valid in the current state.
    InvalidState,
    /// The supplied data could not be parsed or is out of contract.
    InvalidData,
    /// A fixed-capacity array or pool is exhausted.
    OutOfResources,
    /// No attribute or connection matches the supplied handle.
    NotFound,
    /// Encoding or decoding failed.
    Codec(codec::Error),
}

impl From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Self::Codec(error)
    }
}
