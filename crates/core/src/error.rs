//! Error taxonomy shared by every wipeforge crate.

use thiserror::Error;

use crate::{JobStatus, Role};

#[derive(Debug, Error)]
pub enum WipeError {
    /// Attempted state change not allowed from the job's current state.
    /// Always surfaced to the caller, never silently dropped.
    #[error("invalid transition: job {job_id} is {status}, cannot {action}")]
    InvalidTransition {
        job_id: String,
        status: JobStatus,
        action: &'static str,
    },

    /// The target device already has a non-terminal job.
    #[error("device busy: {device_id} already has active job {job_id}")]
    DeviceBusy { device_id: String, job_id: String },

    /// Protected devices can never be selected as wipe targets.
    #[error("protected device: {device_id} cannot be wiped")]
    ProtectedDevice { device_id: String },

    /// A device with this serial is already registered.
    #[error("duplicate serial: {serial}")]
    DuplicateSerial { serial: String },

    /// Certificate issuance precondition failure.
    #[error("job not eligible for certificate: {reason}")]
    JobNotEligible { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: role {role} cannot {action}")]
    PermissionDenied { role: Role, action: &'static str },

    /// Transient store I/O. Retry with backoff; never a terminal job failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl WipeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn not_eligible(reason: impl Into<String>) -> Self {
        Self::JobNotEligible {
            reason: reason.into(),
        }
    }
}
