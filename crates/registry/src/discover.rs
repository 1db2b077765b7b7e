//! Best-effort enumeration of Linux block devices into candidate
//! registration facts, so operators can import real records instead of
//! typing them in. Read-only: nothing here touches a device.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use wipeforge_core::{DeviceFacts, DeviceType, WipeError};

pub fn linux_block_devices() -> Result<Vec<DeviceFacts>, WipeError> {
    discover_from(Path::new("/sys/block"), &root_filesystem_disks())
}

fn discover_from(sys_block: &Path, skip: &HashSet<String>) -> Result<Vec<DeviceFacts>, WipeError> {
    let mut facts = Vec::new();
    let entries = match fs::read_dir(sys_block) {
        Ok(entries) => entries,
        // not a Linux host; nothing to import
        Err(_) => return Ok(facts),
    };

    for entry in entries {
        let entry =
            entry.map_err(|err| WipeError::StoreUnavailable(format!("read sysfs: {}", err)))?;
        let disk_name = entry.file_name().to_string_lossy().to_string();
        if is_virtual_disk(&disk_name, &entry.path()) {
            continue;
        }
        // never offer the disk the running system lives on
        if skip.iter().any(|mounted| mounted.starts_with(&disk_name)) {
            continue;
        }

        let size_bytes = read_u64(entry.path().join("size"))
            .map(|sectors| sectors.saturating_mul(512))
            .unwrap_or(0);
        let removable = read_u64(entry.path().join("removable")).unwrap_or(0) == 1;
        let rotational = read_u64(entry.path().join("queue/rotational")).unwrap_or(0) == 1;
        let model =
            read_string(entry.path().join("device/model")).unwrap_or_else(|| disk_name.clone());
        let serial =
            read_string(entry.path().join("device/serial")).unwrap_or_else(|| disk_name.clone());

        facts.push(DeviceFacts {
            path: format!("/dev/{}", disk_name),
            device_type: classify(&disk_name, removable, rotational),
            model,
            serial,
            size_bytes,
        });
    }

    facts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(facts)
}

fn classify(name: &str, removable: bool, rotational: bool) -> DeviceType {
    if name.starts_with("nvme") {
        DeviceType::NvmeSsd
    } else if removable {
        DeviceType::Usb
    } else if rotational {
        DeviceType::Hdd
    } else {
        DeviceType::SataSsd
    }
}

fn is_virtual_disk(name: &str, path: &Path) -> bool {
    if name.starts_with("loop")
        || name.starts_with("ram")
        || name.starts_with("zram")
        || name.starts_with("dm-")
    {
        return true;
    }
    if let Ok(target) = fs::canonicalize(path.join("device")) {
        if target.to_string_lossy().contains("/virtual/") {
            return true;
        }
    }
    false
}

fn root_filesystem_disks() -> HashSet<String> {
    let mut names = HashSet::new();
    let data = fs::read_to_string("/proc/self/mounts").unwrap_or_default();
    for line in data.lines() {
        let mut parts = line.split_whitespace();
        let Some(device) = parts.next() else {
            continue;
        };
        let Some(mount_point) = parts.next() else {
            continue;
        };
        if !device.starts_with("/dev/") || (mount_point != "/" && mount_point != "/boot") {
            continue;
        }
        if let Some(name) = Path::new(device).file_name().and_then(|value| value.to_str()) {
            names.insert(name.to_string());
        }
    }
    names
}

fn read_string(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_u64(path: impl AsRef<Path>) -> Option<u64> {
    read_string(path).and_then(|value| value.parse::<u64>().ok())
}
