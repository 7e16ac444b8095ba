//! UUID types.

use crate::codec::{Decode, Encode, Error, Type};

/// A 16-bit or 128-bit UUID.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Uuid {
    /// 16-bit UUID
    Uuid16([u8; 2]),
    /// 128-bit UUID
    Uuid128([u8; 16]),
}

impl From<u128> for Uuid {
    fn from(data: u128) -> Self {
        Uuid::Uuid128(data.to_le_bytes())
    }
}

impl From<[u8; 16]> for Uuid {
    fn from(data: [u8; 16]) -> Self {
        Uuid::Uuid128(data)
    }
}

impl From<[u8; 2]> for Uuid {
    fn from(data: [u8; 2]) -> Self {
        Uuid::Uuid16(data)
    }
}

impl From<u16> for Uuid {
    fn from(data: u16) -> Self {
        Uuid::Uuid16(data.to_le_bytes())
    }
}

impl Uuid {
    /// Create a new 16-bit UUID.
    pub const fn new_short(val: u16) -> Self {
        Self::Uuid16(val.to_le_bytes())
    }

    /// Create a new 128-bit UUID from little-endian bytes.
    pub const fn new_long(val: [u8; 16]) -> Self {
        Self::Uuid128(val)
    }

    /// Expand to the full 128-bit little-endian representation.
    ///
    /// A 16-bit UUID is placed on the Bluetooth base UUID, at bytes 12 and 13
    /// of the little-endian layout.
    pub fn as_long(&self) -> [u8; 16] {
        match self {
            Uuid::Uuid16(uuid) => {
                let mut bytes = BLUETOOTH_BASE_UUID;
                bytes[12] = uuid[0];
                bytes[13] = uuid[1];
                bytes
            }
            Uuid::Uuid128(uuid) => *uuid,
        }
    }

    /// Borrow the UUID bytes in little-endian order.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Uuid::Uuid16(uuid) => uuid,
            Uuid::Uuid128(uuid) => uuid,
        }
    }
}

/// The Bluetooth base UUID, 0000xxxx-0000-1000-8000-00805F9B34FB, in
/// little-endian byte order with the short part zeroed.
pub const BLUETOOTH_BASE_UUID: [u8; 16] = [
    0xFB, 0x34, 0x9B, 0x5F, 0x80, 0x00, 0x00, 0x80, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

impl TryFrom<&[u8]> for Uuid {
    type Error = crate::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value.len() {
            // Slice length has already been verified, so unwrap can be used
            2 => Ok(Uuid::Uuid16(value.try_into().unwrap())),
            16 => {
                let mut bytes = [0; 16];
                bytes.copy_from_slice(value);
                Ok(Uuid::Uuid128(bytes))
            }
            _ => Err(crate::Error::InvalidData),
        }
    }
}

impl Type for Uuid {
    fn size(&self) -> usize {
        self.as_raw().len()
    }
}

impl Decode<'_> for Uuid {
    fn decode(src: &[u8]) -> Result<Self, Error> {
        match src.len() {
            2 => Ok(Uuid::Uuid16([src[0], src[1]])),
            16 => Ok(Uuid::Uuid128(src.try_into().map_err(|_| Error::InvalidValue)?)),
            _ => Err(Error::InvalidValue),
        }
    }
}

impl Encode for Uuid {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        if dest.len() < self.size() {
            return Err(Error::InsufficientSpace);
        }
        dest[..self.size()].copy_from_slice(self.as_raw());
        Ok(())
    }
}
