use wipeforge_core::{Device, DeviceStatus};

#[derive(Debug, Clone)]
pub struct SafetyContext {
    pub confirmation: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

impl SafetyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SafetyDecision::Allow)
    }
}

/// The phrase an operator must type to confirm a destructive wipe.
pub fn confirmation_phrase(device: &Device) -> String {
    format!("WIPE {}", device.path)
}

/// Protected devices (system disks) can never be selected as wipe targets.
pub fn ensure_wipeable(device: &Device) -> SafetyDecision {
    if device.status == DeviceStatus::Protected {
        return SafetyDecision::Deny(format!(
            "Denied: device {} is protected and cannot be wiped",
            device.path
        ));
    }
    SafetyDecision::Allow
}

pub fn confirm_wipe(ctx: &SafetyContext, device: &Device) -> SafetyDecision {
    if let SafetyDecision::Deny(reason) = ensure_wipeable(device) {
        return SafetyDecision::Deny(reason);
    }

    let Some(confirmation) = &ctx.confirmation else {
        return SafetyDecision::Deny("Denied: confirmation phrase missing".to_string());
    };
    if confirmation != &confirmation_phrase(device) {
        return SafetyDecision::Deny(format!(
            "Denied: confirmation must be exactly \"{}\"",
            confirmation_phrase(device)
        ));
    }

    SafetyDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use wipeforge_core::DeviceType;

    fn device(status: DeviceStatus) -> Device {
        Device {
            id: "dev-1".to_string(),
            path: "/dev/sdb".to_string(),
            device_type: DeviceType::SataSsd,
            model: "Crucial MX500".to_string(),
            serial: "2039E2C8A002".to_string(),
            size_bytes: 500_000_000_000,
            status,
            registered_at: "2023-10-26T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn denies_protected_device() {
        let ctx = SafetyContext {
            confirmation: Some("WIPE /dev/sdb".to_string()),
        };
        assert!(matches!(
            confirm_wipe(&ctx, &device(DeviceStatus::Protected)),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn denies_without_confirmation() {
        let ctx = SafetyContext { confirmation: None };
        assert!(matches!(
            confirm_wipe(&ctx, &device(DeviceStatus::Unmounted)),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn denies_wrong_phrase() {
        let ctx = SafetyContext {
            confirmation: Some("WIPE /dev/sda".to_string()),
        };
        assert!(matches!(
            confirm_wipe(&ctx, &device(DeviceStatus::Unmounted)),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn allows_exact_phrase() {
        let ctx = SafetyContext {
            confirmation: Some("WIPE /dev/sdb".to_string()),
        };
        assert!(matches!(
            confirm_wipe(&ctx, &device(DeviceStatus::Unmounted)),
            SafetyDecision::Allow
        ));
    }

    #[test]
    fn ensure_wipeable_ignores_confirmation() {
        assert!(ensure_wipeable(&device(DeviceStatus::Mounted)).is_allowed());
        assert!(!ensure_wipeable(&device(DeviceStatus::Protected)).is_allowed());
    }
}
