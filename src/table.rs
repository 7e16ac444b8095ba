//! Attribute table builder.
//!
//! The table is assembled once at startup: services are staged attribute by
//! attribute and handed to the link layer in batches, one batch per service.
//! The link layer assigns handles contiguously, so a single offset translates
//! between handles and table indices at runtime. After
//! [`AttributeTable::finish_all_services`] the table is immutable.

use heapless::Vec;

use crate::attribute::{
    Attribute, AttributeInfo, AttributeKind, CharacteristicProp, CharacteristicProps, Permissions, ValueLocation,
    CHARACTERISTIC_CCCD_UUID16,
};
use crate::link::LinkLayer;
use crate::registry::UuidRegistry;
use crate::types::uuid::Uuid;
use crate::{AttributeHandle, Error, MAX_SERVICES};

/// A token for an attribute whose handle is not known until its service has
/// been published. Redeem it with [`AttributeTable::resolve`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingHandle(u16);

/// Tokens returned when a characteristic is added.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct CharacteristicHandles {
    /// The characteristic value attribute.
    pub value: PendingHandle,
    /// The Client Characteristic Configuration descriptor, present when the
    /// characteristic supports notifications or indications.
    pub ccc: Option<PendingHandle>,
}

struct ServiceRecord {
    /// Index of the service declaration attribute.
    start: u16,
    /// One past the last attribute of the service.
    end: u16,
}

/// Attribute table with fixed capacities for attributes, characteristics,
/// client configuration slots and UUID bases.
pub struct AttributeTable<'d, const ATTS: usize, const CHARS: usize, const CCCS: usize, const BASES: usize> {
    attributes: Vec<Attribute<'d>, ATTS>,
    services: Vec<ServiceRecord, MAX_SERVICES>,
    /// Index of the value attribute of each characteristic.
    characteristics: Vec<u16, CHARS>,
    registry: UuidRegistry<BASES>,
    /// Start index of the service currently being staged.
    staged_from: Option<u16>,
    /// Attributes below this index have handles assigned.
    published: u16,
    /// handle = index + offset, fixed by the first published batch.
    handle_offset: Option<u16>,
    ccc_slots: u16,
    finished: bool,
}

impl<'d, const ATTS: usize, const CHARS: usize, const CCCS: usize, const BASES: usize> Default
    for AttributeTable<'d, ATTS, CHARS, CCCS, BASES>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, const ATTS: usize, const CHARS: usize, const CCCS: usize, const BASES: usize>
    AttributeTable<'d, ATTS, CHARS, CCCS, BASES>
{
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
            services: Vec::new(),
            characteristics: Vec::new(),
            registry: UuidRegistry::new(),
            staged_from: None,
            published: 0,
            handle_offset: None,
            ccc_slots: 0,
            finished: false,
        }
    }

    /// Stage a new service. A service already being staged is published first.
    pub fn add_service<L: LinkLayer>(&mut self, link: &L, uuid: Uuid, primary: bool) -> Result<(), Error> {
        if self.finished {
            return Err(Error::InvalidState);
        }
        if self.staged_from.is_some() {
            self.publish(link)?;
        }
        if self.attributes.is_full() || self.services.is_full() {
            return Err(Error::OutOfResources);
        }
        let resolved = self.registry.resolve(&uuid)?;
        let start = self.attributes.len() as u16;
        let record = ServiceRecord { start, end: start + 1 };
        let attribute = Attribute {
            kind: AttributeKind::ServiceDeclaration { primary },
            uuid,
            resolved,
            permissions: Permissions::READ,
            props: CharacteristicProps::default(),
            value: ValueLocation::Delegated,
            handle: 0,
            value_handle: 0,
            ccc_slot: None,
        };
        // Capacities were checked above.
        let _ = self.services.push(record);
        let _ = self.attributes.push(attribute);
        self.staged_from = Some(start);
        Ok(())
    }

    /// Add a characteristic to the staged service.
    ///
    /// Appends a declaration and a value attribute, plus a Client
    /// Characteristic Configuration descriptor when the properties include
    /// notify or indicate. A constant value is served from `const_value`
    /// without involving the delegate.
    pub fn add_characteristic(
        &mut self,
        uuid: Uuid,
        props: CharacteristicProps,
        const_value: Option<&'d [u8]>,
    ) -> Result<CharacteristicHandles, Error> {
        if self.finished || self.staged_from.is_none() {
            return Err(Error::InvalidState);
        }
        let subscribable = props.any(&[CharacteristicProp::Notify, CharacteristicProp::Indicate]);
        let needed = if subscribable { 3 } else { 2 };
        if self.attributes.len() + needed > ATTS || self.characteristics.is_full() {
            return Err(Error::OutOfResources);
        }
        if subscribable && self.ccc_slots as usize >= CCCS {
            return Err(Error::OutOfResources);
        }
        let resolved = self.registry.resolve(&uuid)?;
        let ccc_resolved = self.registry.resolve(&CHARACTERISTIC_CCCD_UUID16)?;

        let mut permissions = Permissions::NONE;
        if props.any(&[CharacteristicProp::Read]) {
            permissions = permissions.union(Permissions::READ);
        }
        if props.any(&[CharacteristicProp::Write, CharacteristicProp::WriteWithoutResponse]) {
            permissions = permissions.union(Permissions::WRITE);
        }

        let decl_index = self.attributes.len() as u16;
        let _ = self.attributes.push(Attribute {
            kind: AttributeKind::CharacteristicDeclaration,
            uuid: uuid.clone(),
            resolved,
            permissions: Permissions::READ,
            props,
            value: ValueLocation::Delegated,
            handle: 0,
            value_handle: 0,
            ccc_slot: None,
        });
        let value_index = decl_index + 1;
        let _ = self.attributes.push(Attribute {
            kind: AttributeKind::CharacteristicValue,
            uuid,
            resolved,
            permissions,
            props,
            value: match const_value {
                Some(value) => ValueLocation::External(value),
                None => ValueLocation::Delegated,
            },
            handle: 0,
            value_handle: 0,
            ccc_slot: None,
        });
        let ccc_index = if subscribable {
            let slot = self.ccc_slots;
            self.ccc_slots += 1;
            let index = self.attributes.len() as u16;
            let _ = self.attributes.push(Attribute {
                kind: AttributeKind::CccDescriptor,
                uuid: CHARACTERISTIC_CCCD_UUID16,
                resolved: ccc_resolved,
                permissions: Permissions::READ_WRITE,
                props: CharacteristicProps::default(),
                value: ValueLocation::Delegated,
                handle: 0,
                value_handle: 0,
                ccc_slot: Some(slot),
            });
            Some(index)
        } else {
            None
        };

        let _ = self.characteristics.push(value_index);
        if let Some(service) = self.services.last_mut() {
            service.end = self.attributes.len() as u16;
        }
        Ok(CharacteristicHandles {
            value: PendingHandle(value_index),
            ccc: ccc_index.map(PendingHandle),
        })
    }

    /// Add a descriptor to the most recently added characteristic.
    pub fn add_descriptor(
        &mut self,
        uuid: Uuid,
        permissions: Permissions,
        const_value: Option<&'d [u8]>,
    ) -> Result<PendingHandle, Error> {
        if self.finished || self.staged_from.is_none() || self.characteristics.is_empty() {
            return Err(Error::InvalidState);
        }
        // The descriptor must belong to a characteristic of the staged service.
        let staged = match self.services.last() {
            Some(service) => service.start,
            None => return Err(Error::InvalidState),
        };
        if let Some(last) = self.characteristics.last() {
            if *last < staged {
                return Err(Error::InvalidState);
            }
        }
        if self.attributes.is_full() {
            return Err(Error::OutOfResources);
        }
        let resolved = self.registry.resolve(&uuid)?;
        let index = self.attributes.len() as u16;
        let _ = self.attributes.push(Attribute {
            kind: AttributeKind::Descriptor,
            uuid,
            resolved,
            permissions,
            props: CharacteristicProps::default(),
            value: match const_value {
                Some(value) => ValueLocation::External(value),
                None => ValueLocation::Delegated,
            },
            handle: 0,
            value_handle: 0,
            ccc_slot: None,
        });
        if let Some(service) = self.services.last_mut() {
            service.end = self.attributes.len() as u16;
        }
        Ok(PendingHandle(index))
    }

    /// Register the staged service with the link layer and assign handles.
    pub fn publish<L: LinkLayer>(&mut self, link: &L) -> Result<(), Error> {
        let start = match self.staged_from.take() {
            Some(start) => start,
            None => return Err(Error::InvalidState),
        };
        // The staged service is always the last record; everything added
        // since add_service belongs to it.
        let end = match self.services.last() {
            Some(service) => service.end,
            None => return Err(Error::InvalidState),
        };

        let mut infos: Vec<AttributeInfo<'_>, ATTS> = Vec::new();
        for attribute in &self.attributes[start as usize..end as usize] {
            let _ = infos.push(AttributeInfo {
                kind: attribute.kind,
                uuid: &attribute.uuid,
                resolved: attribute.resolved,
                permissions: attribute.permissions,
                properties: attribute.props,
            });
        }
        let first_handle = match link.register_service(&infos) {
            Ok(first_handle) => first_handle,
            Err(e) => {
                // Leave the batch staged so the caller may retry.
                self.staged_from = Some(start);
                return Err(e);
            }
        };
        drop(infos);

        // All batches must share one handle-to-index offset.
        let offset = match first_handle.checked_sub(start) {
            Some(offset) if offset > 0 => offset,
            _ => return Err(Error::InvalidData),
        };
        match self.handle_offset {
            None => self.handle_offset = Some(offset),
            Some(existing) if existing == offset => {}
            Some(_) => {
                error!("attribute table: non-contiguous handle assignment at handle {}", first_handle);
                return Err(Error::InvalidData);
            }
        }

        for i in start..end {
            self.attributes[i as usize].handle = i + offset;
        }
        // Fill the value handles deferred while staging.
        for i in start..end {
            if self.attributes[i as usize].kind == AttributeKind::CharacteristicDeclaration {
                self.attributes[i as usize].value_handle = i + 1 + offset;
            }
        }
        self.published = end;
        debug!("attribute table: service published, handles {}..{}", first_handle, end + offset);
        Ok(())
    }

    /// Publish any staged service and freeze the table.
    pub fn finish_all_services<L: LinkLayer>(&mut self, link: &L) -> Result<(), Error> {
        if self.finished {
            return Err(Error::InvalidState);
        }
        if self.staged_from.is_some() {
            self.publish(link)?;
        }
        self.finished = true;
        Ok(())
    }

    /// Redeem a pending handle. Valid only once the attribute's service has
    /// been published.
    pub fn resolve(&self, pending: PendingHandle) -> Result<AttributeHandle, Error> {
        if pending.0 >= self.published {
            return Err(Error::InvalidState);
        }
        Ok(self.attributes[pending.0 as usize].handle)
    }

    /// Look up an attribute by its assigned handle.
    pub(crate) fn attribute_at(&self, handle: AttributeHandle) -> Option<&Attribute<'d>> {
        let offset = self.handle_offset?;
        let index = handle.checked_sub(offset)? as usize;
        if index >= self.published as usize {
            return None;
        }
        Some(&self.attributes[index])
    }

    /// Whether `handle` refers to a published characteristic value attribute.
    pub(crate) fn is_characteristic_value(&self, handle: AttributeHandle) -> bool {
        matches!(
            self.attribute_at(handle).map(|a| a.kind),
            Some(AttributeKind::CharacteristicValue)
        )
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of characteristics in the table, published or staged.
    pub fn characteristic_count(&self) -> usize {
        self.characteristics.len()
    }

    /// Number of services in the table, published or staged.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Discard everything, returning the table to its initial state.
    ///
    /// The caller must have unregistered the published services with the link
    /// layer first.
    pub(crate) fn clear(&mut self) {
        self.attributes.clear();
        self.services.clear();
        self.characteristics.clear();
        self.registry.reset();
        self.staged_from = None;
        self.published = 0;
        self.handle_offset = None;
        self.ccc_slots = 0;
        self.finished = false;
    }
}
