//! Attribute metadata kept by the table.

use crate::att::AttErrorCode;
use crate::cursor::WriteCursor;
use crate::registry::ResolvedUuid;
pub use crate::types::uuid::Uuid;
use crate::AttributeHandle;

/// UUID for primary service declarations
pub const PRIMARY_SERVICE_UUID16: Uuid = Uuid::Uuid16(0x2800u16.to_le_bytes());

/// UUID for secondary service declarations
pub const SECONDARY_SERVICE_UUID16: Uuid = Uuid::Uuid16(0x2801u16.to_le_bytes());

/// UUID for characteristic declarations
pub const CHARACTERISTIC_UUID16: Uuid = Uuid::Uuid16(0x2803u16.to_le_bytes());

/// UUID for the Client Characteristic Configuration descriptor
pub const CHARACTERISTIC_CCCD_UUID16: Uuid = Uuid::Uuid16(0x2902u16.to_le_bytes());

/// Characteristic properties
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum CharacteristicProp {
    /// Broadcast
    Broadcast = 0x01,
    /// Read
    Read = 0x02,
    /// Write without response
    WriteWithoutResponse = 0x04,
    /// Write
    Write = 0x08,
    /// Notify
    Notify = 0x10,
    /// Indicate
    Indicate = 0x20,
    /// Authenticated writes
    AuthenticatedWrite = 0x40,
    /// Extended properties
    Extended = 0x80,
}

/// Properties of a characteristic.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharacteristicProps(pub(crate) u8);

impl<'a> From<&'a [CharacteristicProp]> for CharacteristicProps {
    fn from(props: &'a [CharacteristicProp]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= *prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl<const T: usize> From<[CharacteristicProp; T]> for CharacteristicProps {
    fn from(props: [CharacteristicProp; T]) -> Self {
        let mut val: u8 = 0;
        for prop in props {
            val |= prop as u8;
        }
        CharacteristicProps(val)
    }
}

impl CharacteristicProps {
    /// Check if any of the properties are set.
    pub fn any(&self, props: &[CharacteristicProp]) -> bool {
        for p in props {
            if (*p as u8) & self.0 != 0 {
                return true;
            }
        }
        false
    }

    /// The raw bitmask, as placed into the characteristic declaration.
    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Access permissions of an attribute value.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions(u8);

impl Permissions {
    /// No access.
    pub const NONE: Self = Self(0);
    /// The value may be read.
    pub const READ: Self = Self(0x01);
    /// The value may be written.
    pub const WRITE: Self = Self(0x02);
    /// Both read and write access.
    pub const READ_WRITE: Self = Self(0x03);

    pub fn readable(&self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub fn writable(&self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// The role an attribute plays in the table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Service declaration, primary or secondary.
    ServiceDeclaration { primary: bool },
    /// Characteristic declaration, value rendered from the table.
    CharacteristicDeclaration,
    /// Characteristic value, served through the delegate.
    CharacteristicValue,
    /// Client Characteristic Configuration, stored per connection.
    CccDescriptor,
    /// Any other descriptor, served through the delegate.
    Descriptor,
}

/// Where an attribute value lives when it is not delegate-owned.
pub(crate) enum ValueLocation<'d> {
    /// Reads and writes go to the registered delegate.
    Delegated,
    /// A constant value baked into the table.
    External(&'d [u8]),
}

/// One row of the attribute table.
pub(crate) struct Attribute<'d> {
    pub(crate) kind: AttributeKind,
    pub(crate) uuid: Uuid,
    pub(crate) resolved: ResolvedUuid,
    pub(crate) permissions: Permissions,
    pub(crate) props: CharacteristicProps,
    pub(crate) value: ValueLocation<'d>,
    /// Handle assigned at publish time, zero while staged.
    pub(crate) handle: AttributeHandle,
    /// For characteristic declarations, the handle of the value attribute.
    pub(crate) value_handle: AttributeHandle,
    /// For characteristic values, index of the per-connection CCC slot.
    pub(crate) ccc_slot: Option<u16>,
}

impl<'d> Attribute<'d> {
    /// Render a declaration value from table state.
    pub(crate) fn render_declaration(&self, offset: usize, data: &mut [u8]) -> Result<usize, AttErrorCode> {
        match self.kind {
            AttributeKind::ServiceDeclaration { .. } => copy_at_offset(self.uuid.as_raw(), offset, data),
            AttributeKind::CharacteristicDeclaration => {
                let uuid = self.uuid.as_raw();
                let mut full = [0u8; 19];
                let mut w = WriteCursor::new(&mut full);
                w.write(self.props.0).map_err(|_| AttErrorCode::UNLIKELY_ERROR)?;
                w.write(self.value_handle).map_err(|_| AttErrorCode::UNLIKELY_ERROR)?;
                w.append(uuid).map_err(|_| AttErrorCode::UNLIKELY_ERROR)?;
                let len = w.len();
                copy_at_offset(&full[..len], offset, data)
            }
            _ => Err(AttErrorCode::READ_NOT_PERMITTED),
        }
    }

    /// The constant value for attributes not owned by the delegate.
    pub(crate) fn const_value(&self) -> Option<&'d [u8]> {
        match self.value {
            ValueLocation::External(value) => Some(value),
            ValueLocation::Delegated => None,
        }
    }
}

pub(crate) fn copy_at_offset(value: &[u8], offset: usize, data: &mut [u8]) -> Result<usize, AttErrorCode> {
    if offset > value.len() {
        return Err(AttErrorCode::INVALID_OFFSET);
    }
    let len = data.len().min(value.len() - offset);
    data[..len].copy_from_slice(&value[offset..offset + len]);
    Ok(len)
}

/// Attribute description handed to the link layer when a service is registered.
pub struct AttributeInfo<'a> {
    pub kind: AttributeKind,
    pub uuid: &'a Uuid,
    /// Pooled base index and short part, for controllers that register UUID
    /// bases separately.
    pub resolved: ResolvedUuid,
    pub permissions: Permissions,
    pub properties: CharacteristicProps,
}
