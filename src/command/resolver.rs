//! Device selection to concrete dispatch targets

use cmdfleet_shared::{DeviceDescriptor, InputError};
use std::collections::HashSet;
use tracing::debug;

use crate::inventory::Inventory;

/// Resolve explicit device identifiers and group names to an ordered,
/// deduplicated list of active devices.
///
/// Explicit devices come first in request order, followed by group members
/// in group order. Inactive group members are skipped.
pub fn resolve(
    inventory: &dyn Inventory,
    devices: &[String],
    groups: &[String],
) -> Result<Vec<DeviceDescriptor>, InputError> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for ident in devices.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
        let device = inventory
            .device(ident)
            .filter(|d| d.active)
            .ok_or_else(|| InputError::UnknownDevice(ident.to_string()))?;
        if seen.insert(device.id) {
            resolved.push(device);
        }
    }

    for name in groups.iter().map(|g| g.trim()).filter(|g| !g.is_empty()) {
        let members = inventory
            .group_members(name)
            .ok_or_else(|| InputError::UnknownGroup(name.to_string()))?;

        for device in members {
            if !device.active {
                debug!("[DISPATCH] Skipping inactive {} from group {}", device.name, name);
                continue;
            }
            if seen.insert(device.id) {
                resolved.push(device);
            }
        }
    }

    if resolved.is_empty() {
        return Err(InputError::NoTargets);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StaticInventory;
    use crate::testing::descriptor;
    use cmdfleet_shared::{DeviceGroup, DeviceId};

    fn inventory() -> StaticInventory {
        let mut dormant = descriptor(4, "D");
        dormant.active = false;

        let group = |id: u64, name: &str, members: &[u64]| DeviceGroup {
            id,
            name: name.into(),
            description: String::new(),
            members: members.iter().map(|m| DeviceId(*m)).collect(),
        };

        StaticInventory::new(
            vec![
                descriptor(1, "A"),
                descriptor(2, "B"),
                descriptor(3, "C"),
                dormant,
            ],
            vec![
                group(1, "G", &[1, 3]),
                group(2, "empty", &[]),
                group(3, "dormant", &[4]),
            ],
        )
        .unwrap()
    }

    fn names(devices: &[DeviceDescriptor]) -> Vec<&str> {
        devices.iter().map(|d| d.name.as_str()).collect()
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_union_without_duplicates() {
        let inventory = inventory();
        let resolved = resolve(&inventory, &strings(&["A", "B"]), &strings(&["G"])).unwrap();
        assert_eq!(names(&resolved), vec!["A", "B", "C"]);

        // Explicit devices keep request order
        let resolved = resolve(&inventory, &strings(&["B", "A"]), &strings(&["G"])).unwrap();
        assert_eq!(names(&resolved), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_empty_selection_has_no_targets() {
        let inventory = inventory();
        assert_eq!(resolve(&inventory, &[], &[]), Err(InputError::NoTargets));
        assert_eq!(
            resolve(&inventory, &[], &strings(&["empty"])),
            Err(InputError::NoTargets)
        );
        assert_eq!(
            resolve(&inventory, &strings(&[" "]), &strings(&["dormant"])),
            Err(InputError::NoTargets)
        );
    }

    #[test]
    fn test_unknown_and_inactive_devices() {
        let inventory = inventory();
        assert_eq!(
            resolve(&inventory, &strings(&["Z"]), &[]),
            Err(InputError::UnknownDevice("Z".into()))
        );
        assert_eq!(
            resolve(&inventory, &strings(&["D"]), &[]),
            Err(InputError::UnknownDevice("D".into()))
        );
        assert_eq!(
            resolve(&inventory, &[], &strings(&["nope"])),
            Err(InputError::UnknownGroup("nope".into()))
        );
    }

    #[test]
    fn test_numeric_ids_resolve() {
        let inventory = inventory();
        let resolved = resolve(&inventory, &strings(&["3", "C"]), &[]).unwrap();
        assert_eq!(names(&resolved), vec!["C"]);
    }
}
