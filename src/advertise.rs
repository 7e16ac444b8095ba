//! Advertising data codec.
//!
//! Advertising and scan response payloads are sequences of `(length, type,
//! data)` elements inside at most 31 octets. The engine validates raw
//! payloads before handing them to the link layer and offers a typed
//! [`AdStructure`] layer for assembling them.

use embassy_time::Duration;
use heapless::Vec;

use crate::codec;
use crate::cursor::{ReadCursor, WriteCursor};
use crate::{Error, ADV_DATA_MAX, MAX_AD_ELEMENTS};

pub const LE_LIMITED_DISCOVERABLE: u8 = 0b00000001;
pub const LE_GENERAL_DISCOVERABLE: u8 = 0b00000010;
pub const BR_EDR_NOT_SUPPORTED: u8 = 0b00000100;

/// Parameters for connectable undirected advertising.
pub struct AdvertisementParameters {
    /// Advertising interval
    pub interval_min: Duration,
    pub interval_max: Duration,
}

impl Default for AdvertisementParameters {
    fn default() -> Self {
        Self {
            interval_min: Duration::from_millis(250),
            interval_max: Duration::from_millis(250),
        }
    }
}

/// One raw advertising data element.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdElement<'d> {
    /// AD type byte.
    pub ty: u8,
    /// Payload following the type byte.
    pub data: &'d [u8],
}

/// Split a raw advertising payload into its elements.
///
/// The payload must fit 31 octets. A zero length byte ends the payload; any
/// bytes after it must also be zero. Anything malformed fails with
/// [`Error::InvalidData`] and no partial result.
pub fn decode_elements(data: &[u8]) -> Result<Vec<AdElement<'_>, MAX_AD_ELEMENTS>, Error> {
    if data.len() > ADV_DATA_MAX {
        return Err(Error::InvalidData);
    }
    let mut elements = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 {
            // Trailing padding, all zero.
            if data[pos..].iter().any(|&b| b != 0) {
                return Err(Error::InvalidData);
            }
            break;
        }
        if pos + 1 + len > data.len() {
            return Err(Error::InvalidData);
        }
        let element = AdElement {
            ty: data[pos + 1],
            data: &data[pos + 2..pos + 1 + len],
        };
        elements.push(element).map_err(|_| Error::OutOfResources)?;
        pos += 1 + len;
    }
    Ok(elements)
}

/// Serialize elements back into a raw payload, returning the length used.
pub fn encode_elements(elements: &[AdElement<'_>], dest: &mut [u8]) -> Result<usize, Error> {
    let bound = dest.len().min(ADV_DATA_MAX);
    let mut w = WriteCursor::new(&mut dest[..bound]);
    for element in elements {
        if element.data.len() + 1 > u8::MAX as usize {
            return Err(Error::InvalidData);
        }
        w.append(&[(element.data.len() + 1) as u8, element.ty])?;
        w.append(element.data)?;
    }
    Ok(w.len())
}

/// A typed advertising data structure.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdStructure<'a> {
    /// Device flags and baseband capabilities.
    ///
    /// Must not be used in scan response data.
    Flags(u8),

    /// Service data with 16-bit service UUID.
    ServiceData16 {
        /// The 16-bit service UUID.
        uuid: u16,
        /// The associated service data. May be empty.
        data: &'a [u8],
    },

    /// Sets the full (unabbreviated) device name.
    CompleteLocalName(&'a [u8]),

    /// Sets the shortened device name.
    ShortenedLocalName(&'a [u8]),

    /// Set manufacturer specific data
    ManufacturerSpecificData {
        company_identifier: u16,
        payload: &'a [u8],
    },

    /// An unknown or unimplemented AD structure stored as raw bytes.
    Unknown {
        /// Type byte.
        ty: u8,
        /// Raw data transmitted after the type.
        data: &'a [u8],
    },
}

impl<'d> AdStructure<'d> {
    pub fn encode_slice(data: &[AdStructure<'_>], dest: &mut [u8]) -> Result<usize, codec::Error> {
        let mut w = WriteCursor::new(dest);
        for item in data.iter() {
            item.encode(&mut w)?;
        }
        Ok(w.len())
    }

    pub fn encode(&self, w: &mut WriteCursor<'_>) -> Result<(), codec::Error> {
        match self {
            AdStructure::Flags(flags) => {
                w.append(&[0x02, 0x01, *flags])?;
            }
            AdStructure::ShortenedLocalName(name) => {
                w.append(&[(name.len() + 1) as u8, 0x08])?;
                w.append(name)?;
            }
            AdStructure::CompleteLocalName(name) => {
                w.append(&[(name.len() + 1) as u8, 0x09])?;
                w.append(name)?;
            }
            AdStructure::ServiceData16 { uuid, data } => {
                w.append(&[(data.len() + 3) as u8, 0x16])?;
                w.write(*uuid)?;
                w.append(data)?;
            }
            AdStructure::ManufacturerSpecificData {
                company_identifier,
                payload,
            } => {
                w.append(&[(payload.len() + 3) as u8, 0xff])?;
                w.write(*company_identifier)?;
                w.append(payload)?;
            }
            AdStructure::Unknown { ty, data } => {
                w.append(&[(data.len() + 1) as u8, *ty])?;
                w.append(data)?;
            }
        }
        Ok(())
    }

    pub fn decode(data: &[u8]) -> impl Iterator<Item = Result<AdStructure<'_>, codec::Error>> {
        AdStructureIter {
            cursor: ReadCursor::new(data),
        }
    }
}

pub struct AdStructureIter<'d> {
    cursor: ReadCursor<'d>,
}

impl<'d> AdStructureIter<'d> {
    fn read(&mut self) -> Result<AdStructure<'d>, codec::Error> {
        let len: u8 = self.cursor.read()?;
        if len == 0 {
            return Err(codec::Error::InvalidValue);
        }
        let code: u8 = self.cursor.read()?;
        let data = self.cursor.slice(len as usize - 1)?;
        match code {
            0x01 => Ok(AdStructure::Flags(data[0])),
            0x08 => Ok(AdStructure::ShortenedLocalName(data)),
            0x09 => Ok(AdStructure::CompleteLocalName(data)),
            0x16 => {
                let mut r = ReadCursor::new(data);
                let uuid: u16 = r.read()?;
                Ok(AdStructure::ServiceData16 {
                    uuid,
                    data: r.slice(r.available())?,
                })
            }
            ty => Ok(AdStructure::Unknown { ty, data }),
        }
    }
}

impl<'d> Iterator for AdStructureIter<'d> {
    type Item = Result<AdStructure<'d>, codec::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.available() == 0 {
            return None;
        }
        Some(self.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_round_trip_within_bound() {
        let flags = [LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED];
        let name = b"acc";
        let elements = [
            AdElement { ty: 0x01, data: &flags },
            AdElement { ty: 0x09, data: name },
        ];
        let mut buf = [0u8; ADV_DATA_MAX];
        let len = encode_elements(&elements, &mut buf).unwrap();
        assert_eq!(len, 3 + 5);

        let decoded = decode_elements(&buf[..len]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], elements[0]);
        assert_eq!(decoded[1], elements[1]);
    }

    #[test]
    fn zero_padding_is_tolerated() {
        let raw = [0x02, 0x01, 0x06, 0x00, 0x00, 0x00];
        let decoded = decode_elements(&raw).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].ty, 0x01);
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let raw = [0x02, 0x01, 0x06, 0x00, 0x00, 0x07];
        assert_eq!(decode_elements(&raw).unwrap_err(), Error::InvalidData);
    }

    #[test]
    fn truncated_element_is_rejected() {
        let raw = [0x05, 0x09, b'a', b'b'];
        assert_eq!(decode_elements(&raw).unwrap_err(), Error::InvalidData);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let raw = [0u8; ADV_DATA_MAX + 1];
        assert_eq!(decode_elements(&raw).unwrap_err(), Error::InvalidData);
    }

    #[test]
    fn typed_structures_encode_like_raw_elements() {
        let mut typed = [0u8; ADV_DATA_MAX];
        let len = AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE),
                AdStructure::ServiceData16 { uuid: 0xFED4, data: &[0x01, 0x02] },
            ],
            &mut typed,
        )
        .unwrap();
        let decoded = decode_elements(&typed[..len]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].ty, 0x16);
        assert_eq!(decoded[1].data, &[0xD4, 0xFE, 0x01, 0x02]);
    }
}
