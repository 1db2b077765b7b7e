use std::sync::Arc;

use tracing::info;

use wipeforge_core::{
    now_utc_rfc3339, AuditEvent, Device, DeviceFacts, DeviceStatus, WipeError,
};
use wipeforge_store::{AuditStore, DeviceStore};

pub mod discover;

/// Registry of known erasable targets. Owns all administrative status
/// mutations; the orchestrator only ever reads device records.
pub struct Registry<S> {
    store: Arc<S>,
}

impl<S> Registry<S>
where
    S: DeviceStore + AuditStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn register(&self, facts: DeviceFacts, actor: &str) -> Result<Device, WipeError> {
        let device = self.store.insert_device(facts)?;
        info!(device = %device.path, serial = %device.serial, "device registered");
        self.audit(actor, "device.registered", &device)?;
        Ok(device)
    }

    pub fn mark_protected(&self, device_id: &str, actor: &str) -> Result<Device, WipeError> {
        let device = self.store.update_device(device_id, |device| {
            device.status = DeviceStatus::Protected;
            Ok(())
        })?;
        self.audit(actor, "device.protected", &device)?;
        Ok(device)
    }

    /// Deliberately elevated: clearing protection re-exposes a device as a
    /// wipe target, so the action lands in the audit trail like a mutation.
    pub fn clear_protected(&self, device_id: &str, actor: &str) -> Result<Device, WipeError> {
        let device = self.store.update_device(device_id, |device| {
            device.status = DeviceStatus::Unmounted;
            Ok(())
        })?;
        self.audit(actor, "device.protection_cleared", &device)?;
        Ok(device)
    }

    pub fn mark_mounted(&self, device_id: &str, actor: &str) -> Result<Device, WipeError> {
        let device = self.store.update_device(device_id, |device| {
            if device.status == DeviceStatus::Protected {
                return Err(WipeError::ProtectedDevice {
                    device_id: device.id.clone(),
                });
            }
            device.status = DeviceStatus::Mounted;
            Ok(())
        })?;
        self.audit(actor, "device.mounted", &device)?;
        Ok(device)
    }

    pub fn mark_unmounted(&self, device_id: &str, actor: &str) -> Result<Device, WipeError> {
        let device = self.store.update_device(device_id, |device| {
            if device.status == DeviceStatus::Protected {
                return Err(WipeError::ProtectedDevice {
                    device_id: device.id.clone(),
                });
            }
            device.status = DeviceStatus::Unmounted;
            Ok(())
        })?;
        self.audit(actor, "device.unmounted", &device)?;
        Ok(device)
    }

    pub fn device(&self, device_id: &str) -> Result<Device, WipeError> {
        self.store.device(device_id)
    }

    pub fn devices(&self) -> Result<Vec<Device>, WipeError> {
        self.store.devices()
    }

    fn audit(&self, actor: &str, action: &str, device: &Device) -> Result<(), WipeError> {
        self.store.record(AuditEvent {
            at: now_utc_rfc3339(),
            actor: actor.to_string(),
            action: action.to_string(),
            job_id: None,
            detail: Some(format!("{} ({})", device.path, device.serial)),
        })
    }
}
