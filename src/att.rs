//! ATT protocol vocabulary shared by the transaction engine and the link layer.

use core::fmt::Display;

/// Attribute Error Code
///
/// The subset of `ATT_ERROR_RSP` codes from the Bluetooth Core Specification
/// Version 6.0 | Vol 3, Part F that a GATT server produces.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AttErrorCode {
    value: u8,
}

impl AttErrorCode {
    /// Attempted to use a handle that isn't valid on this server
    pub const INVALID_HANDLE: Self = Self { value: 0x01 };
    /// The attribute cannot be read
    pub const READ_NOT_PERMITTED: Self = Self { value: 0x02 };
    /// The attribute cannot be written
    pub const WRITE_NOT_PERMITTED: Self = Self { value: 0x03 };
    /// The attribute PDU was invalid
    pub const INVALID_PDU: Self = Self { value: 0x04 };
    /// Offset specified was past the end of the attribute
    pub const INVALID_OFFSET: Self = Self { value: 0x07 };
    /// The attribute request encountered an unlikely error and could not be completed
    pub const UNLIKELY_ERROR: Self = Self { value: 0x0e };
    /// Insufficient Resources to complete the request
    pub const INSUFFICIENT_RESOURCES: Self = Self { value: 0x11 };

    /// The raw error code sent on the wire.
    pub fn value(&self) -> u8 {
        self.value
    }
}

impl Display for AttErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            &Self::INVALID_HANDLE => {
                f.write_str("invalid handle: attempted to use a handle that isn't valid on this server")
            }
            &Self::READ_NOT_PERMITTED => f.write_str("read not permitted: the attribute cannot be read"),
            &Self::WRITE_NOT_PERMITTED => f.write_str("write not permitted: the attribute cannot be written"),
            &Self::INVALID_PDU => f.write_str("invalid pdu: the attribute PDU was invalid"),
            &Self::INVALID_OFFSET => f.write_str("invalid offset: offset specified was past the end of the attribute"),
            &Self::UNLIKELY_ERROR => {
                f.write_str("unlikely error: the attribute request encountered an error that was unlikely")
            }
            &Self::INSUFFICIENT_RESOURCES => {
                f.write_str("insufficient resources: insufficient resources to complete the request")
            }
            other => write!(f, "error code {}", other.value),
        }
    }
}

/// The flavour of write request arriving from the central.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// `ATT_WRITE_REQ`, acknowledged by a Write Response.
    Request,
    /// `ATT_WRITE_CMD`, unacknowledged.
    Command,
    /// `ATT_PREPARE_WRITE_REQ`, part of a queued write.
    Prepare,
    /// `ATT_EXECUTE_WRITE_REQ`, commits queued writes.
    Execute,
}
