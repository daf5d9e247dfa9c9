//! `[[devices]]` and `[[groups]]` tables of the fleet file

use cmdfleet_shared::{defaults, Credentials, DeviceDescriptor, DeviceGroup, DeviceId, Platform};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;

use super::{InventoryError, StaticInventory};

/// One `[[devices]]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    /// Defaults to the entry's position, starting at 1
    pub id: Option<u64>,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub platform: Platform,
    pub username: String,
    pub password: String,
    /// Enable secret
    pub secret: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: String,
}

fn default_port() -> u16 {
    defaults::MANAGEMENT_PORT
}

fn default_active() -> bool {
    true
}

/// One `[[groups]]` table; members are device names
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
}

impl DeviceEntry {
    fn into_descriptor(self, position: usize) -> Result<DeviceDescriptor, InventoryError> {
        let address: IpAddr =
            self.address
                .trim()
                .parse()
                .map_err(|_| InventoryError::InvalidAddress {
                    device: self.name.clone(),
                    address: self.address.clone(),
                })?;

        Ok(DeviceDescriptor {
            id: DeviceId(self.id.unwrap_or(position as u64 + 1)),
            name: self.name,
            address,
            platform: self.platform,
            credentials: Credentials {
                username: self.username,
                password: self.password,
                secret: self.secret.filter(|s| !s.is_empty()),
            },
            port: self.port,
            active: self.active,
            description: self.description,
        })
    }
}

impl StaticInventory {
    /// Build an inventory from parsed fleet file tables
    pub fn from_entries(
        devices: Vec<DeviceEntry>,
        groups: Vec<GroupEntry>,
    ) -> Result<Self, InventoryError> {
        let devices = devices
            .into_iter()
            .enumerate()
            .map(|(position, entry)| entry.into_descriptor(position))
            .collect::<Result<Vec<_>, _>>()?;

        let ids_by_name: HashMap<&str, DeviceId> =
            devices.iter().map(|d| (d.name.as_str(), d.id)).collect();

        let groups = groups
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                let members = entry
                    .members
                    .iter()
                    .map(|member| {
                        ids_by_name.get(member.as_str()).copied().ok_or_else(|| {
                            InventoryError::UnknownMember {
                                group: entry.name.clone(),
                                member: member.clone(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(DeviceGroup {
                    id: position as u64 + 1,
                    name: entry.name,
                    description: entry.description,
                    members,
                })
            })
            .collect::<Result<Vec<_>, InventoryError>>()?;

        Self::new(devices, groups)
    }
}
