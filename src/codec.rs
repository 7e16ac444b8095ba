//! Wire encoding helpers for attribute values and advertising data.

/// A type that can report its encoded size.
pub trait Type {
    /// Size of this type in its encoded representation.
    fn size(&self) -> usize;
}

/// A type that can be encoded into a byte buffer.
pub trait Encode: Type {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error>;
}

/// A type that can be decoded from a byte buffer.
pub trait Decode<'d>: Type
where
    Self: Sized,
{
    fn decode(src: &'d [u8]) -> Result<Self, Error>;
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    InsufficientSpace,
    InvalidValue,
}

impl Type for u8 {
    fn size(&self) -> usize {
        1
    }
}

impl Encode for u8 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        if dest.is_empty() {
            return Err(Error::InsufficientSpace);
        }
        dest[0] = *self;
        Ok(())
    }
}

impl<'d> Decode<'d> for u8 {
    fn decode(src: &'d [u8]) -> Result<Self, Error> {
        if src.is_empty() {
            return Err(Error::InvalidValue);
        }
        Ok(src[0])
    }
}

impl Type for u16 {
    fn size(&self) -> usize {
        2
    }
}

impl Encode for u16 {
    fn encode(&self, dest: &mut [u8]) -> Result<(), Error> {
        if dest.len() < 2 {
            return Err(Error::InsufficientSpace);
        }
        dest[..2].copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl<'d> Decode<'d> for u16 {
    fn decode(src: &'d [u8]) -> Result<Self, Error> {
        if src.len() < 2 {
            return Err(Error::InvalidValue);
        }
        Ok(u16::from_le_bytes([src[0], src[1]]))
    }
}
