//! Device inventory
//!
//! The engine reads devices and groups through the [`Inventory`] trait.
//! [`StaticInventory`] is the in-memory implementation built from the
//! `[[devices]]` and `[[groups]]` tables of the fleet file.

pub mod file;

pub use file::{DeviceEntry, GroupEntry};

use cmdfleet_shared::{DeviceDescriptor, DeviceGroup, DeviceId};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use thiserror::Error;

/// Inventory loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Duplicate device name: {0}")]
    DuplicateName(String),

    #[error("Duplicate device id: {0}")]
    DuplicateId(DeviceId),

    #[error("Devices {first} and {second} share the management address {address}")]
    DuplicateAddress {
        address: SocketAddr,
        first: String,
        second: String,
    },

    #[error("Invalid address '{address}' for device {device}")]
    InvalidAddress { device: String, address: String },

    #[error("Duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("Group {group} references unknown device {member}")]
    UnknownMember { group: String, member: String },
}

/// Read access to managed devices
pub trait Inventory: Send + Sync {
    /// Active devices, in inventory order
    fn active_devices(&self) -> Vec<DeviceDescriptor>;

    /// All members of a group, in group order. `None` if the group does not exist.
    fn group_members(&self, group: &str) -> Option<Vec<DeviceDescriptor>>;

    /// Look a device up by name or numeric id, active or not
    fn device(&self, ident: &str) -> Option<DeviceDescriptor>;
}

/// Inventory held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    devices: Vec<DeviceDescriptor>,
    groups: Vec<DeviceGroup>,
}

impl StaticInventory {
    /// Build an inventory, rejecting duplicate names, ids and addresses
    pub fn new(
        devices: Vec<DeviceDescriptor>,
        groups: Vec<DeviceGroup>,
    ) -> Result<Self, InventoryError> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        let mut addresses: HashMap<SocketAddr, &str> = HashMap::new();

        for device in &devices {
            if !names.insert(device.name.as_str()) {
                return Err(InventoryError::DuplicateName(device.name.clone()));
            }
            if !ids.insert(device.id) {
                return Err(InventoryError::DuplicateId(device.id));
            }
            if let Some(first) = addresses.insert(device.socket_addr(), &device.name) {
                return Err(InventoryError::DuplicateAddress {
                    address: device.socket_addr(),
                    first: first.to_string(),
                    second: device.name.clone(),
                });
            }
        }

        let mut group_names = HashSet::new();
        for group in &groups {
            if !group_names.insert(group.name.as_str()) {
                return Err(InventoryError::DuplicateGroup(group.name.clone()));
            }
            if let Some(missing) = group.members.iter().find(|id| !ids.contains(*id)) {
                return Err(InventoryError::UnknownMember {
                    group: group.name.clone(),
                    member: missing.to_string(),
                });
            }
        }

        Ok(Self { devices, groups })
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn groups(&self) -> &[DeviceGroup] {
        &self.groups
    }

    fn by_id(&self, id: DeviceId) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|d| d.id == id)
    }
}

impl Inventory for StaticInventory {
    fn active_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.iter().filter(|d| d.active).cloned().collect()
    }

    fn group_members(&self, group: &str) -> Option<Vec<DeviceDescriptor>> {
        let group = self.groups.iter().find(|g| g.name == group)?;
        Some(
            group
                .members
                .iter()
                .filter_map(|id| self.by_id(*id))
                .cloned()
                .collect(),
        )
    }

    fn device(&self, ident: &str) -> Option<DeviceDescriptor> {
        self.devices
            .iter()
            .find(|d| d.name == ident)
            .or_else(|| {
                let id = ident.parse::<u64>().ok()?;
                self.by_id(DeviceId(id))
            })
            .cloned()
    }
}
