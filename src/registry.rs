//! Registry of 128-bit UUID bases.
//!
//! Controllers index vendor UUIDs by base rather than carrying the full
//! 16 bytes per attribute. Every 128-bit UUID is split into a base, with
//! bytes 12 and 13 zeroed, and a 16-bit short part. Bases are pooled and
//! deduplicated so that all characteristics of a vendor service share one
//! entry. Slot 0 always holds the Bluetooth base UUID, so SIG-assigned
//! short UUIDs resolve without consuming pool space.

use heapless::Vec;

use crate::types::uuid::{Uuid, BLUETOOTH_BASE_UUID};
use crate::Error;

/// A resolved UUID: an index into the base pool plus the 16-bit short part.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUuid {
    pub base: u8,
    pub short: u16,
}

/// Fixed-capacity pool of 128-bit UUID bases.
pub struct UuidRegistry<const BASES: usize> {
    bases: Vec<[u8; 16], BASES>,
}

impl<const BASES: usize> Default for UuidRegistry<BASES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const BASES: usize> UuidRegistry<BASES> {
    pub fn new() -> Self {
        let mut bases = Vec::new();
        // Slot 0 is the Bluetooth base; a capacity of at least one is assumed.
        let _ = bases.push(BLUETOOTH_BASE_UUID);
        Self { bases }
    }

    /// Split a UUID into a pooled base and short part, adding the base to
    /// the pool if it is not already present.
    ///
    /// Fails with [`Error::OutOfResources`] when the pool is full, leaving
    /// the pool unchanged.
    pub fn resolve(&mut self, uuid: &Uuid) -> Result<ResolvedUuid, Error> {
        let mut long = uuid.as_long();
        let short = u16::from_le_bytes([long[12], long[13]]);
        long[12] = 0;
        long[13] = 0;

        if let Some(idx) = self.bases.iter().position(|base| *base == long) {
            return Ok(ResolvedUuid { base: idx as u8, short });
        }
        let idx = self.bases.len();
        self.bases.push(long).map_err(|_| Error::OutOfResources)?;
        Ok(ResolvedUuid { base: idx as u8, short })
    }

    /// Look up a base by pool index.
    pub fn base(&self, index: u8) -> Option<&[u8; 16]> {
        self.bases.get(index as usize)
    }

    /// Number of bases currently pooled.
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Drop all vendor bases, keeping the Bluetooth base in slot 0.
    pub fn reset(&mut self) {
        self.bases.truncate(1);
    }
}
