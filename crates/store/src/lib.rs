use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use wipeforge_core::{
    human_id, new_record_id, now_utc_rfc3339, AuditEvent, Certificate, CertificateDraft, Device,
    DeviceFacts, DeviceStatus, JobStatus, JobTarget, PolicySnapshot, WipeError, WipeJob,
    STORE_SCHEMA_VERSION,
};

pub mod stats;

/// Creation input: everything a WipeJob carries except what the store assigns
/// (ids, creation stamp, initial status).
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub target: JobTarget,
    pub policy: PolicySnapshot,
    pub created_by: String,
    pub notification_emails: Vec<String>,
    pub initial_log: String,
}

pub trait JobStore: Send + Sync {
    /// Insert a Queued job. The device-exclusivity check and the insert are
    /// one atomic step: two racing creates against the same device cannot
    /// both succeed.
    fn insert_job(&self, draft: JobDraft) -> Result<WipeJob, WipeError>;

    /// Fetch by internal store id or by the human-readable `job_id`.
    fn job(&self, id: &str) -> Result<WipeJob, WipeError>;

    /// Atomic conditional update. The closure mutates a scratch copy; if it
    /// errors the stored record is left untouched.
    fn update_job<F>(&self, id: &str, apply: F) -> Result<WipeJob, WipeError>
    where
        F: FnOnce(&mut WipeJob) -> Result<(), WipeError>;

    /// Atomic append preserving per-job program order.
    fn append_log(&self, id: &str, line: String) -> Result<(), WipeError>;

    /// All jobs, newest first.
    fn jobs(&self) -> Result<Vec<WipeJob>, WipeError>;

    fn active_job_for_device(&self, device_id: &str) -> Result<Option<WipeJob>, WipeError>;
}

pub trait DeviceStore: Send + Sync {
    /// Insert with status Unmounted; rejects an already-registered serial.
    fn insert_device(&self, facts: DeviceFacts) -> Result<Device, WipeError>;

    fn device(&self, id: &str) -> Result<Device, WipeError>;

    fn update_device<F>(&self, id: &str, apply: F) -> Result<Device, WipeError>
    where
        F: FnOnce(&mut Device) -> Result<(), WipeError>;

    fn devices(&self) -> Result<Vec<Device>, WipeError>;
}

pub trait CertificateStore: Send + Sync {
    /// Atomic check-or-insert keyed on `job_id`: if a certificate already
    /// exists for the job the original is returned unchanged.
    fn insert_certificate_for_job(&self, draft: CertificateDraft)
        -> Result<Certificate, WipeError>;

    /// Exact match on the public `certificate_id` field, not the store id.
    fn certificate_by_public_id(&self, certificate_id: &str)
        -> Result<Option<Certificate>, WipeError>;

    fn certificate_for_job(&self, job_id: &str) -> Result<Option<Certificate>, WipeError>;

    /// All certificates, newest first.
    fn certificates(&self) -> Result<Vec<Certificate>, WipeError>;
}

pub trait AuditStore: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), WipeError>;
    fn events(&self) -> Result<Vec<AuditEvent>, WipeError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Inner {
    jobs: HashMap<String, WipeJob>,
    devices: HashMap<String, Device>,
    certificates: HashMap<String, Certificate>,
    audit: Vec<AuditEvent>,
    job_seq: u64,
    cert_seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    schema_version: String,
    saved_at: String,
    #[serde(flatten)]
    inner: Inner,
}

/// In-memory store behind one RwLock: conditional updates run under the write
/// lock (one logical lock per record from the caller's perspective), reads
/// proceed in parallel under the read lock. Optionally snapshots to a pretty
/// JSON file after every mutation.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a JSON snapshot file, loading existing state if
    /// the file is present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WipeError> {
        let path = path.as_ref().to_path_buf();
        let inner = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .map_err(|err| WipeError::StoreUnavailable(format!("read snapshot: {}", err)))?;
            let snapshot: Snapshot = serde_json::from_str(&data)
                .map_err(|err| WipeError::StoreUnavailable(format!("parse snapshot: {}", err)))?;
            snapshot.inner
        } else {
            Inner::default()
        };
        Ok(Self {
            inner: RwLock::new(inner),
            snapshot_path: Some(path),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, WipeError> {
        self.inner
            .read()
            .map_err(|_| WipeError::StoreUnavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, WipeError> {
        self.inner
            .write()
            .map_err(|_| WipeError::StoreUnavailable("store lock poisoned".to_string()))
    }

    /// Snapshot write failures are logged and retried on the next mutation;
    /// they never fail the operation that triggered them.
    fn persist(&self, inner: &Inner) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snapshot = Snapshot {
            schema_version: STORE_SCHEMA_VERSION.to_string(),
            saved_at: now_utc_rfc3339(),
            inner: inner.clone(),
        };
        let result = serde_json::to_string_pretty(&snapshot)
            .map_err(|err| err.to_string())
            .and_then(|data| std::fs::write(path, data).map_err(|err| err.to_string()));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "store snapshot write failed");
        }
    }

    fn resolve_job_key(inner: &Inner, id: &str) -> Option<String> {
        if inner.jobs.contains_key(id) {
            return Some(id.to_string());
        }
        inner
            .jobs
            .values()
            .find(|job| job.job_id == id)
            .map(|job| job.id.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for MemoryStore {
    fn insert_job(&self, draft: JobDraft) -> Result<WipeJob, WipeError> {
        let mut inner = self.write()?;
        if let Some(device_id) = draft.target.device_id() {
            let active = inner
                .jobs
                .values()
                .find(|job| !job.is_terminal() && job.target.device_id() == Some(device_id));
            if let Some(existing) = active {
                return Err(WipeError::DeviceBusy {
                    device_id: device_id.to_string(),
                    job_id: existing.job_id.clone(),
                });
            }
        }

        inner.job_seq += 1;
        let job = WipeJob {
            id: new_record_id(),
            job_id: human_id("JOB", inner.job_seq),
            target: draft.target,
            policy: draft.policy,
            status: JobStatus::Queued,
            progress: 0.0,
            speed_mbps: None,
            eta_seconds: None,
            logs: vec![draft.initial_log],
            notification_emails: draft.notification_emails,
            created_by: draft.created_by,
            created_at: now_utc_rfc3339(),
            started_at: None,
            ended_at: None,
            error_message: None,
            attempt: 1,
        };
        inner.jobs.insert(job.id.clone(), job.clone());
        self.persist(&inner);
        Ok(job)
    }

    fn job(&self, id: &str) -> Result<WipeJob, WipeError> {
        let inner = self.read()?;
        let key = Self::resolve_job_key(&inner, id)
            .ok_or_else(|| WipeError::not_found(format!("job {}", id)))?;
        Ok(inner.jobs[&key].clone())
    }

    fn update_job<F>(&self, id: &str, apply: F) -> Result<WipeJob, WipeError>
    where
        F: FnOnce(&mut WipeJob) -> Result<(), WipeError>,
    {
        let mut inner = self.write()?;
        let key = Self::resolve_job_key(&inner, id)
            .ok_or_else(|| WipeError::not_found(format!("job {}", id)))?;
        let mut scratch = inner.jobs[&key].clone();
        apply(&mut scratch)?;
        inner.jobs.insert(key, scratch.clone());
        self.persist(&inner);
        Ok(scratch)
    }

    fn append_log(&self, id: &str, line: String) -> Result<(), WipeError> {
        let mut inner = self.write()?;
        let key = Self::resolve_job_key(&inner, id)
            .ok_or_else(|| WipeError::not_found(format!("job {}", id)))?;
        if let Some(job) = inner.jobs.get_mut(&key) {
            job.logs.push(line);
        }
        self.persist(&inner);
        Ok(())
    }

    fn jobs(&self) -> Result<Vec<WipeJob>, WipeError> {
        let inner = self.read()?;
        let mut jobs: Vec<WipeJob> = inner.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.job_id.cmp(&a.job_id)));
        Ok(jobs)
    }

    fn active_job_for_device(&self, device_id: &str) -> Result<Option<WipeJob>, WipeError> {
        let inner = self.read()?;
        Ok(inner
            .jobs
            .values()
            .find(|job| !job.is_terminal() && job.target.device_id() == Some(device_id))
            .cloned())
    }
}

impl DeviceStore for MemoryStore {
    fn insert_device(&self, facts: DeviceFacts) -> Result<Device, WipeError> {
        let mut inner = self.write()?;
        if inner
            .devices
            .values()
            .any(|device| device.serial == facts.serial)
        {
            return Err(WipeError::DuplicateSerial {
                serial: facts.serial,
            });
        }
        let device = Device {
            id: new_record_id(),
            path: facts.path,
            device_type: facts.device_type,
            model: facts.model,
            serial: facts.serial,
            size_bytes: facts.size_bytes,
            status: DeviceStatus::Unmounted,
            registered_at: now_utc_rfc3339(),
        };
        inner.devices.insert(device.id.clone(), device.clone());
        self.persist(&inner);
        Ok(device)
    }

    fn device(&self, id: &str) -> Result<Device, WipeError> {
        let inner = self.read()?;
        inner
            .devices
            .get(id)
            .cloned()
            .or_else(|| {
                inner
                    .devices
                    .values()
                    .find(|device| device.serial == id)
                    .cloned()
            })
            .ok_or_else(|| WipeError::not_found(format!("device {}", id)))
    }

    fn update_device<F>(&self, id: &str, apply: F) -> Result<Device, WipeError>
    where
        F: FnOnce(&mut Device) -> Result<(), WipeError>,
    {
        let mut inner = self.write()?;
        let key = if inner.devices.contains_key(id) {
            id.to_string()
        } else {
            inner
                .devices
                .values()
                .find(|device| device.serial == id)
                .map(|device| device.id.clone())
                .ok_or_else(|| WipeError::not_found(format!("device {}", id)))?
        };
        let mut scratch = inner.devices[&key].clone();
        apply(&mut scratch)?;
        inner.devices.insert(key, scratch.clone());
        self.persist(&inner);
        Ok(scratch)
    }

    fn devices(&self) -> Result<Vec<Device>, WipeError> {
        let inner = self.read()?;
        let mut devices: Vec<Device> = inner.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(devices)
    }
}

impl CertificateStore for MemoryStore {
    fn insert_certificate_for_job(
        &self,
        draft: CertificateDraft,
    ) -> Result<Certificate, WipeError> {
        let mut inner = self.write()?;
        if let Some(existing) = inner
            .certificates
            .values()
            .find(|certificate| certificate.job_id == draft.job_id)
        {
            return Ok(existing.clone());
        }
        inner.cert_seq += 1;
        let certificate = Certificate {
            id: new_record_id(),
            certificate_id: human_id("CERT", inner.cert_seq),
            job_id: draft.job_id,
            target: draft.target,
            wipe_method: draft.wipe_method,
            wipe_passes: draft.wipe_passes,
            verification_result: draft.verification_result,
            started_at: draft.started_at,
            ended_at: draft.ended_at,
            log_hash: draft.log_hash,
            created_at: now_utc_rfc3339(),
            issued_by: draft.issued_by,
        };
        inner
            .certificates
            .insert(certificate.id.clone(), certificate.clone());
        self.persist(&inner);
        Ok(certificate)
    }

    fn certificate_by_public_id(
        &self,
        certificate_id: &str,
    ) -> Result<Option<Certificate>, WipeError> {
        let inner = self.read()?;
        Ok(inner
            .certificates
            .values()
            .find(|certificate| certificate.certificate_id == certificate_id)
            .cloned())
    }

    fn certificate_for_job(&self, job_id: &str) -> Result<Option<Certificate>, WipeError> {
        let inner = self.read()?;
        Ok(inner
            .certificates
            .values()
            .find(|certificate| certificate.job_id == job_id)
            .cloned())
    }

    fn certificates(&self) -> Result<Vec<Certificate>, WipeError> {
        let inner = self.read()?;
        let mut certificates: Vec<Certificate> = inner.certificates.values().cloned().collect();
        certificates.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.certificate_id.cmp(&a.certificate_id))
        });
        Ok(certificates)
    }
}

impl AuditStore for MemoryStore {
    fn record(&self, event: AuditEvent) -> Result<(), WipeError> {
        let mut inner = self.write()?;
        inner.audit.push(event);
        self.persist(&inner);
        Ok(())
    }

    fn events(&self) -> Result<Vec<AuditEvent>, WipeError> {
        let inner = self.read()?;
        Ok(inner.audit.clone())
    }
}
