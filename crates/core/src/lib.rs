use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use uuid::Uuid;

pub mod advisor;
pub mod error;

pub use error::WipeError;

pub const STORE_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    #[serde(rename = "HDD")]
    Hdd,
    #[serde(rename = "SATA SSD")]
    SataSsd,
    #[serde(rename = "NVMe SSD")]
    NvmeSsd,
    #[serde(rename = "USB")]
    Usb,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Hdd => "HDD",
            DeviceType::SataSsd => "SATA SSD",
            DeviceType::NvmeSsd => "NVMe SSD",
            DeviceType::Usb => "USB",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceType {
    type Err = WipeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hdd" => Ok(DeviceType::Hdd),
            "sata ssd" | "sata-ssd" | "ssd" => Ok(DeviceType::SataSsd),
            "nvme ssd" | "nvme-ssd" | "nvme" => Ok(DeviceType::NvmeSsd),
            "usb" => Ok(DeviceType::Usb),
            other => Err(WipeError::NotFound(format!("device type {}", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Mounted,
    Unmounted,
    Protected,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceStatus::Mounted => "Mounted",
            DeviceStatus::Unmounted => "Unmounted",
            DeviceStatus::Protected => "Protected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Device {
    pub id: String,
    pub path: String,
    pub device_type: DeviceType,
    pub model: String,
    pub serial: String,
    pub size_bytes: u64,
    pub status: DeviceStatus,
    pub registered_at: String,
}

/// Registration input: everything a Device carries except what the store assigns.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeviceFacts {
    pub path: String,
    pub device_type: DeviceType,
    pub model: String,
    pub serial: String,
    pub size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyName {
    #[serde(rename = "Quick Wipe (1-pass)")]
    QuickWipe,
    #[serde(rename = "Standard (3-pass)")]
    Standard,
    #[serde(rename = "DoD 5220.22-M (7-pass)")]
    Dod522022M,
    #[serde(rename = "Secure Erase")]
    SecureErase,
    #[serde(rename = "Sanitize")]
    Sanitize,
}

impl PolicyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyName::QuickWipe => "Quick Wipe (1-pass)",
            PolicyName::Standard => "Standard (3-pass)",
            PolicyName::Dod522022M => "DoD 5220.22-M (7-pass)",
            PolicyName::SecureErase => "Secure Erase",
            PolicyName::Sanitize => "Sanitize",
        }
    }
}

impl std::fmt::Display for PolicyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyName {
    type Err = WipeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quick" | "quick wipe (1-pass)" => Ok(PolicyName::QuickWipe),
            "standard" | "standard (3-pass)" => Ok(PolicyName::Standard),
            "dod" | "dod 5220.22-m (7-pass)" => Ok(PolicyName::Dod522022M),
            "secure-erase" | "secure erase" => Ok(PolicyName::SecureErase),
            "sanitize" => Ok(PolicyName::Sanitize),
            other => Err(WipeError::NotFound(format!("wipe policy {}", other))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WipePolicy {
    pub name: PolicyName,
    pub passes: Option<u32>,
    pub description: String,
}

impl WipePolicy {
    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            name: self.name,
            passes: self.passes,
        }
    }
}

/// The immutable policy catalog. Jobs copy a snapshot by value, so later
/// catalog changes never alter historical jobs.
pub fn policy_catalog() -> Vec<WipePolicy> {
    vec![
        WipePolicy {
            name: PolicyName::QuickWipe,
            passes: Some(1),
            description: "Fastest option. Overwrites data with zeros once.".to_string(),
        },
        WipePolicy {
            name: PolicyName::Standard,
            passes: Some(3),
            description: "A good balance of security and speed (DoD 5220.22-M ECE).".to_string(),
        },
        WipePolicy {
            name: PolicyName::Dod522022M,
            passes: Some(7),
            description: "Highly secure 7-pass overwrite. Slower.".to_string(),
        },
        WipePolicy {
            name: PolicyName::SecureErase,
            passes: None,
            description: "Uses the drive's built-in, fast, and secure erase command.".to_string(),
        },
        WipePolicy {
            name: PolicyName::Sanitize,
            passes: None,
            description: "Drive-native sanitize covering all addressable and spare areas.".to_string(),
        },
    ]
}

pub fn policy_by_name(name: PolicyName) -> WipePolicy {
    policy_catalog()
        .into_iter()
        .find(|policy| policy.name == name)
        .unwrap_or(WipePolicy {
            name,
            passes: None,
            description: String::new(),
        })
}

/// Policy fields copied into a job at creation time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PolicySnapshot {
    pub name: PolicyName,
    pub passes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Verifying => "Verifying",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// Two job kinds share one state machine: a registered device, or an uploaded
/// file batch entry. Device snapshots are copied at creation time so registry
/// edits never rewrite job history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTarget {
    Device {
        device_id: String,
        path: String,
        model: String,
        serial: String,
        size_bytes: u64,
        device_type: DeviceType,
    },
    File {
        file_name: String,
        file_size: u64,
        file_type: String,
    },
}

impl JobTarget {
    pub fn device_id(&self) -> Option<&str> {
        match self {
            JobTarget::Device { device_id, .. } => Some(device_id),
            JobTarget::File { .. } => None,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            JobTarget::Device { size_bytes, .. } => *size_bytes,
            JobTarget::File { file_size, .. } => *file_size,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            JobTarget::Device { path, model, .. } => format!("{} ({})", path, model),
            JobTarget::File {
                file_name,
                file_size,
                ..
            } => format!("{} ({} bytes)", file_name, file_size),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WipeJob {
    pub id: String,
    pub job_id: String,
    pub target: JobTarget,
    pub policy: PolicySnapshot,
    pub status: JobStatus,
    pub progress: f64,
    pub speed_mbps: Option<f64>,
    pub eta_seconds: Option<u64>,
    pub logs: Vec<String>,
    pub notification_emails: Vec<String>,
    pub created_by: String,
    pub created_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub error_message: Option<String>,
    pub attempt: u32,
}

impl WipeJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    #[serde(rename = "PASS")]
    Pass,
    #[serde(rename = "FAIL")]
    Fail,
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationResult::Pass => f.write_str("PASS"),
            VerificationResult::Fail => f.write_str("FAIL"),
        }
    }
}

/// Immutable erasure attestation. `certificate_id` is the public lookup key;
/// `id` is the internal store key. Never mutated or deleted once written.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Certificate {
    pub id: String,
    pub certificate_id: String,
    pub job_id: String,
    pub target: JobTarget,
    pub wipe_method: PolicyName,
    pub wipe_passes: Option<u32>,
    pub verification_result: VerificationResult,
    pub started_at: String,
    pub ended_at: String,
    pub log_hash: String,
    pub created_at: String,
    pub issued_by: String,
}

/// Issuance input: everything a Certificate carries except what the store assigns.
#[derive(Debug, Clone)]
pub struct CertificateDraft {
    pub job_id: String,
    pub target: JobTarget,
    pub wipe_method: PolicyName,
    pub wipe_passes: Option<u32>,
    pub verification_result: VerificationResult,
    pub started_at: String,
    pub ended_at: String,
    pub log_hash: String,
    pub issued_by: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub at: String,
    pub actor: String,
    pub action: String,
    pub job_id: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Auditor,
    None,
}

impl Role {
    pub fn can_mutate(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Role::None)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Auditor => "auditor",
            Role::None => "none",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for Role {
    type Err = WipeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operator" => Ok(Role::Operator),
            "auditor" => Ok(Role::Auditor),
            "none" => Ok(Role::None),
            other => Err(WipeError::NotFound(format!("role {}", other))),
        }
    }
}

pub fn now_utc_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// `JOB-20231026-001` / `CERT-20231026-001` style public identifiers.
pub fn human_id(prefix: &str, sequence: u64) -> String {
    let date = time::OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]"))
        .unwrap_or_else(|_| "19700101".to_string());
    format!("{}-{}-{:03}", prefix, date, sequence)
}

/// Job log lines carry a wall-clock prefix, e.g. `[10:45:00] Pass 1/3 complete.`
pub fn log_line(message: impl AsRef<str>) -> String {
    let stamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "00:00:00".to_string());
    format!("[{}] {}", stamp, message.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_catalog_is_complete_and_stable() {
        let catalog = policy_catalog();
        assert_eq!(catalog.len(), 5);
        let standard = policy_by_name(PolicyName::Standard);
        assert_eq!(standard.passes, Some(3));
        let secure = policy_by_name(PolicyName::SecureErase);
        assert_eq!(secure.passes, None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Verifying.is_terminal());
    }

    #[test]
    fn human_ids_carry_prefix_and_sequence() {
        let id = human_id("JOB", 7);
        assert!(id.starts_with("JOB-"));
        assert!(id.ends_with("-007"));
    }

    #[test]
    fn job_target_serde_is_tagged() {
        let target = JobTarget::File {
            file_name: "report.pdf".to_string(),
            file_size: 1024,
            file_type: "application/pdf".to_string(),
        };
        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("\"kind\":\"file\""));
        let back: JobTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn device_type_round_trips_display_names() {
        let json = serde_json::to_string(&DeviceType::NvmeSsd).unwrap();
        assert_eq!(json, "\"NVMe SSD\"");
        assert_eq!("nvme".parse::<DeviceType>().unwrap(), DeviceType::NvmeSsd);
    }
}
