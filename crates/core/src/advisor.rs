//! Stateless wipe-policy advisor. Purely advisory: consumed by operator
//! surfaces, never by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::{DeviceType, PolicyName};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PolicySuggestion {
    pub wipe_method: PolicyName,
    pub passes: Option<u32>,
    pub notes: String,
}

/// Heuristic rendition of the policy-suggestion flow: flash media prefer the
/// drive's native erase commands (multi-pass overwrite burns write cycles and
/// misses overprovisioned cells), spinning disks prefer overwrite passes.
pub fn suggest(device_type: DeviceType, security_requirement: &str) -> PolicySuggestion {
    let high_assurance = is_high_assurance(security_requirement);
    match device_type {
        DeviceType::NvmeSsd | DeviceType::SataSsd => {
            if high_assurance {
                PolicySuggestion {
                    wipe_method: PolicyName::Sanitize,
                    passes: None,
                    notes: "Drive-native sanitize reaches overprovisioned and remapped cells; \
                            overwrite passes cannot."
                        .to_string(),
                }
            } else {
                PolicySuggestion {
                    wipe_method: PolicyName::SecureErase,
                    passes: None,
                    notes: "Built-in secure erase is fast and avoids unnecessary flash wear."
                        .to_string(),
                }
            }
        }
        DeviceType::Hdd => {
            if high_assurance {
                PolicySuggestion {
                    wipe_method: PolicyName::Dod522022M,
                    passes: Some(7),
                    notes: "7-pass overwrite for magnetic media holding sensitive or regulated \
                            data."
                        .to_string(),
                }
            } else {
                PolicySuggestion {
                    wipe_method: PolicyName::Standard,
                    passes: Some(3),
                    notes: "3-pass overwrite balances throughput and assurance for magnetic media."
                        .to_string(),
                }
            }
        }
        DeviceType::Usb => {
            if high_assurance {
                PolicySuggestion {
                    wipe_method: PolicyName::Standard,
                    passes: Some(3),
                    notes: "Removable flash rarely supports native erase commands; use a 3-pass \
                            overwrite."
                        .to_string(),
                }
            } else {
                PolicySuggestion {
                    wipe_method: PolicyName::QuickWipe,
                    passes: Some(1),
                    notes: "Single zero pass is sufficient for low-sensitivity removable media."
                        .to_string(),
                }
            }
        }
    }
}

fn is_high_assurance(requirement: &str) -> bool {
    let requirement = requirement.to_ascii_lowercase();
    ["high", "classified", "compliance", "regulated", "nist", "dod", "hipaa", "pci"]
        .iter()
        .any(|keyword| requirement.contains(keyword))
}
