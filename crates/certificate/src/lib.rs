use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::info;

use wipeforge_core::{
    now_utc_rfc3339, AuditEvent, Certificate, CertificateDraft, JobStatus, VerificationResult,
    WipeError, WipeJob,
};
use wipeforge_store::{AuditStore, CertificateStore, JobStore};

/// Digest binding a job's full log sequence. Any append, edit, removal or
/// reorder after issuance changes the hash.
pub fn log_hash(logs: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(logs.join("\n").as_bytes());
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Writes Certificate records, and nothing else: the issuer never mutates a
/// job. One certificate per completed job, enforced by the store's atomic
/// check-or-insert.
pub struct CertificateIssuer<S> {
    store: Arc<S>,
    issued_by: String,
}

impl<S> CertificateIssuer<S>
where
    S: JobStore + CertificateStore + AuditStore,
{
    pub fn new(store: Arc<S>, issued_by: impl Into<String>) -> Self {
        Self {
            store,
            issued_by: issued_by.into(),
        }
    }

    pub fn issue(&self, job_id: &str) -> Result<Certificate, WipeError> {
        let job = self.store.job(job_id)?;
        let (started_at, ended_at) = eligibility(&job)?;

        let certificate = self.store.insert_certificate_for_job(CertificateDraft {
            job_id: job.job_id.clone(),
            target: job.target.clone(),
            wipe_method: job.policy.name,
            wipe_passes: job.policy.passes,
            verification_result: VerificationResult::Pass,
            started_at,
            ended_at,
            log_hash: log_hash(&job.logs),
            issued_by: self.issued_by.clone(),
        })?;

        info!(
            certificate_id = %certificate.certificate_id,
            job_id = %job.job_id,
            "certificate issued"
        );
        self.store.record(AuditEvent {
            at: now_utc_rfc3339(),
            actor: self.issued_by.clone(),
            action: "certificate.issued".to_string(),
            job_id: Some(job.job_id),
            detail: Some(certificate.certificate_id.clone()),
        })?;
        Ok(certificate)
    }
}

fn eligibility(job: &WipeJob) -> Result<(String, String), WipeError> {
    if job.status != JobStatus::Completed {
        return Err(WipeError::not_eligible(format!(
            "job {} is {}, certificates attest completed jobs only",
            job.job_id, job.status
        )));
    }
    let started_at = job
        .started_at
        .clone()
        .ok_or_else(|| WipeError::not_eligible(format!("job {} has no start time", job.job_id)))?;
    let ended_at = job
        .ended_at
        .clone()
        .ok_or_else(|| WipeError::not_eligible(format!("job {} has no end time", job.job_id)))?;
    Ok((started_at, ended_at))
}

/// Public verification outcome. The Invalid arm carries nothing but the id
/// that was asked about: this endpoint is reachable without authentication,
/// so a miss must not reveal whether any job or device exists.
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    Verified(Certificate),
    Invalid { certificate_id: String },
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationOutcome::Verified(_))
    }
}

/// Read-only lookup by the public `certificate_id` field.
pub struct VerificationService<S> {
    store: Arc<S>,
}

impl<S> VerificationService<S>
where
    S: CertificateStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn lookup(&self, certificate_id: &str) -> VerificationOutcome {
        match self.store.certificate_by_public_id(certificate_id) {
            Ok(Some(certificate)) => VerificationOutcome::Verified(certificate),
            // store-internal errors must not leak to third parties
            Ok(None) | Err(_) => VerificationOutcome::Invalid {
                certificate_id: certificate_id.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wipeforge_core::{
        log_line, DeviceType, JobTarget, PolicyName, PolicySnapshot,
    };
    use wipeforge_store::{JobDraft, MemoryStore};

    fn completed_job(store: &MemoryStore) -> WipeJob {
        let job = store
            .insert_job(JobDraft {
                target: JobTarget::Device {
                    device_id: "dev-1".to_string(),
                    path: "/dev/sdc".to_string(),
                    model: "Seagate Barracuda".to_string(),
                    serial: "WDE123456789".to_string(),
                    size_bytes: 2_000_000_000_000,
                    device_type: DeviceType::Hdd,
                },
                policy: PolicySnapshot {
                    name: PolicyName::Standard,
                    passes: Some(3),
                },
                created_by: "op@example.com".to_string(),
                notification_emails: vec!["op@example.com".to_string()],
                initial_log: log_line("Job created and queued."),
            })
            .unwrap();
        store
            .update_job(&job.id, |job| {
                job.status = JobStatus::Completed;
                job.started_at = Some("2023-10-26T10:00:00Z".to_string());
                job.ended_at = Some("2023-10-26T11:30:00Z".to_string());
                job.progress = 100.0;
                Ok(())
            })
            .unwrap()
    }

    #[test]
    fn log_hash_is_deterministic_and_order_sensitive() {
        let logs = vec!["a".to_string(), "b".to_string()];
        assert_eq!(log_hash(&logs), log_hash(&logs.clone()));
        let reordered = vec!["b".to_string(), "a".to_string()];
        assert_ne!(log_hash(&logs), log_hash(&reordered));
        let appended = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_ne!(log_hash(&logs), log_hash(&appended));
    }

    #[test]
    fn issues_once_and_returns_original_on_reissue() {
        let store = Arc::new(MemoryStore::new());
        let job = completed_job(&store);
        let issuer = CertificateIssuer::new(store.clone(), "wipeforge");

        let first = issuer.issue(&job.job_id).unwrap();
        let second = issuer.issue(&job.job_id).unwrap();
        assert_eq!(first.certificate_id, second.certificate_id);
        assert_eq!(store.certificates().unwrap().len(), 1);
        assert_eq!(first.verification_result, VerificationResult::Pass);
        assert_eq!(first.log_hash, log_hash(&store.job(&job.id).unwrap().logs));
    }

    #[test]
    fn refuses_jobs_that_are_not_completed() {
        let store = Arc::new(MemoryStore::new());
        let job = store
            .insert_job(JobDraft {
                target: JobTarget::File {
                    file_name: "report.pdf".to_string(),
                    file_size: 1024,
                    file_type: "application/pdf".to_string(),
                },
                policy: PolicySnapshot {
                    name: PolicyName::QuickWipe,
                    passes: Some(1),
                },
                created_by: "op@example.com".to_string(),
                notification_emails: vec![],
                initial_log: log_line("Job created and queued."),
            })
            .unwrap();
        let issuer = CertificateIssuer::new(store, "wipeforge");
        let err = issuer.issue(&job.job_id).unwrap_err();
        assert!(matches!(err, WipeError::JobNotEligible { .. }));
    }

    #[test]
    fn lookup_misses_reveal_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = VerificationService::new(store);
        match service.lookup("CERT-19990101-999") {
            VerificationOutcome::Invalid { certificate_id } => {
                assert_eq!(certificate_id, "CERT-19990101-999");
            }
            VerificationOutcome::Verified(_) => panic!("unknown id must be invalid"),
        }
    }

    #[test]
    fn lookup_matches_public_id_not_store_id() {
        let store = Arc::new(MemoryStore::new());
        let job = completed_job(&store);
        let issuer = CertificateIssuer::new(store.clone(), "wipeforge");
        let certificate = issuer.issue(&job.job_id).unwrap();

        let service = VerificationService::new(store);
        assert!(service.lookup(&certificate.certificate_id).is_verified());
        // the internal store id is not a public handle
        assert!(!service.lookup(&certificate.id).is_verified());
    }
}
