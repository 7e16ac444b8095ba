//! Cursors over byte slices for assembling and parsing packets.

use crate::codec::{Decode, Encode, Error};

/// A cursor for writing data into a borrowed byte slice.
pub struct WriteCursor<'d> {
    pos: usize,
    data: &'d mut [u8],
}

impl<'d> WriteCursor<'d> {
    pub fn new(data: &'d mut [u8]) -> Self {
        Self { pos: 0, data }
    }

    /// Encode a value at the current position, advancing the cursor.
    pub fn write<E: Encode>(&mut self, data: E) -> Result<(), Error> {
        if self.available() < data.size() {
            return Err(Error::InsufficientSpace);
        }
        data.encode(&mut self.data[self.pos..self.pos + data.size()])?;
        self.pos += data.size();
        Ok(())
    }

    /// Copy a raw byte slice at the current position, advancing the cursor.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.available() < data.len() {
            return Err(Error::InsufficientSpace);
        }
        self.data[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn len(&self) -> usize {
        self.pos
    }
}

/// A cursor for reading data from a borrowed byte slice.
pub struct ReadCursor<'d> {
    pos: usize,
    data: &'d [u8],
}

impl<'d> ReadCursor<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { pos: 0, data }
    }

    /// Decode a value at the current position, advancing the cursor by the
    /// decoded value's encoded size.
    pub fn read<T: Decode<'d>>(&mut self) -> Result<T, Error> {
        let val = T::decode(&self.data[self.pos..])?;
        self.pos += val.size();
        Ok(val)
    }

    /// Borrow the next `len` bytes, advancing the cursor.
    pub fn slice(&mut self, len: usize) -> Result<&'d [u8], Error> {
        if self.available() < len {
            return Err(Error::InvalidValue);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }
}
