use std::sync::Arc;

use tracing::{info, warn};

use wipeforge_certificate::CertificateIssuer;
use wipeforge_core::{
    log_line, now_utc_rfc3339, policy_by_name, AuditEvent, JobOutcome, JobStatus, JobTarget,
    PolicyName, WipeError, WipeJob,
};
use wipeforge_notify::{notify_best_effort, Notifier};
use wipeforge_safety::{ensure_wipeable, SafetyDecision};
use wipeforge_store::{AuditStore, CertificateStore, DeviceStore, JobDraft, JobStore};

pub mod auth;
pub mod driver;

pub use auth::{RoleOracle, StaticRoleOracle};

/// What a caller asks to wipe. Device requests are resolved against the
/// registry record and snapshotted into the job at creation time.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Device { device_id: String },
    File {
        file_name: String,
        file_size: u64,
        file_type: String,
    },
}

/// Hook for presentation layers: fired after every committed transition.
/// The core has no notion of a live UI.
pub trait JobEventSink: Send + Sync {
    fn job_changed(&self, job: &WipeJob);
}

#[derive(Debug, Clone, Copy)]
pub struct Telemetry {
    pub speed_mbps: f64,
    pub eta_seconds: u64,
}

/// The state-machine engine. All job mutation in the system flows through
/// these transition functions; nothing else writes `status`, `progress` or
/// `logs`.
pub struct Orchestrator<S> {
    pub(crate) store: Arc<S>,
    oracle: Arc<dyn RoleOracle>,
    notifier: Arc<dyn Notifier>,
    issuer: CertificateIssuer<S>,
    sinks: Vec<Arc<dyn JobEventSink>>,
}

impl<S> Orchestrator<S>
where
    S: JobStore + DeviceStore + CertificateStore + AuditStore,
{
    pub fn new(store: Arc<S>, oracle: Arc<dyn RoleOracle>, notifier: Arc<dyn Notifier>) -> Self {
        let issuer = CertificateIssuer::new(store.clone(), "wipeforge");
        Self {
            store,
            oracle,
            notifier,
            issuer,
            sinks: Vec::new(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn JobEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn create_job(
        &self,
        request: JobRequest,
        policy_name: PolicyName,
        requester: &str,
        notify_list: &[String],
    ) -> Result<WipeJob, WipeError> {
        self.require_mutate(requester, "create job")?;

        let target = match request {
            JobRequest::Device { device_id } => {
                let device = self.store.device(&device_id)?;
                if let SafetyDecision::Deny(_) = ensure_wipeable(&device) {
                    return Err(WipeError::ProtectedDevice {
                        device_id: device.id,
                    });
                }
                JobTarget::Device {
                    device_id: device.id,
                    path: device.path,
                    model: device.model,
                    serial: device.serial,
                    size_bytes: device.size_bytes,
                    device_type: device.device_type,
                }
            }
            JobRequest::File {
                file_name,
                file_size,
                file_type,
            } => JobTarget::File {
                file_name,
                file_size,
                file_type,
            },
        };

        let policy = policy_by_name(policy_name);
        let mut emails = vec![requester.to_string()];
        for email in notify_list {
            if !emails.iter().any(|existing| existing == email) {
                emails.push(email.clone());
            }
        }

        let job = self.store.insert_job(JobDraft {
            target,
            policy: policy.snapshot(),
            created_by: requester.to_string(),
            notification_emails: emails,
            initial_log: log_line(format!("Job created and queued ({}).", policy.name)),
        })?;

        info!(job_id = %job.job_id, target = %job.target.describe(), "wipe job created");
        self.audit(requester, "job.created", &job.job_id, None)?;
        self.emit(&job);
        Ok(job)
    }

    pub fn start(&self, job_id: &str, requester: &str) -> Result<WipeJob, WipeError> {
        self.require_mutate(requester, "start job")?;
        self.start_unchecked(job_id, requester)
    }

    pub(crate) fn start_unchecked(&self, job_id: &str, actor: &str) -> Result<WipeJob, WipeError> {
        let job = self.store.update_job(job_id, |job| {
            if job.status != JobStatus::Queued {
                return Err(WipeError::InvalidTransition {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    action: "start",
                });
            }
            job.status = JobStatus::Running;
            job.started_at = Some(now_utc_rfc3339());
            job.logs.push(log_line("Job started."));
            let passes = match job.policy.passes {
                Some(1) => " (1 pass)".to_string(),
                Some(n) => format!(" ({} passes)", n),
                None => String::new(),
            };
            job.logs.push(log_line(format!(
                "Wiping {} with {}{}.",
                job.target.describe(),
                job.policy.name,
                passes
            )));
            Ok(())
        })?;

        info!(job_id = %job.job_id, "wipe started");
        self.audit(actor, "job.started", &job.job_id, None)?;
        self.emit(&job);
        Ok(job)
    }

    /// Progress is clamped to `[previous, 100]` and a job that has already
    /// reached 100 moves to Verifying instead: completion is never declared
    /// without the verification pass.
    pub fn advance_progress(&self, job_id: &str, delta: f64) -> Result<WipeJob, WipeError> {
        self.advance_with(job_id, delta, None)
    }

    pub fn advance_with(
        &self,
        job_id: &str,
        delta: f64,
        telemetry: Option<Telemetry>,
    ) -> Result<WipeJob, WipeError> {
        let mut entered_verifying = false;
        let job = self.store.update_job(job_id, |job| {
            if job.status != JobStatus::Running {
                return Err(WipeError::InvalidTransition {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    action: "advance progress",
                });
            }

            if job.progress >= 100.0 {
                job.status = JobStatus::Verifying;
                job.speed_mbps = None;
                job.eta_seconds = None;
                job.logs.push(log_line("Starting verification."));
                entered_verifying = true;
                return Ok(());
            }

            let previous = job.progress;
            job.progress = (previous + delta.max(0.0)).min(100.0);
            if let Some(telemetry) = telemetry {
                job.speed_mbps = Some(telemetry.speed_mbps);
                job.eta_seconds = Some(telemetry.eta_seconds);
            }
            if let Some(passes) = job.policy.passes.filter(|passes| *passes > 0) {
                let span = 100.0 / passes as f64;
                let before = (previous / span).floor() as u32;
                let after = (job.progress / span).floor() as u32;
                for pass in before..after.min(passes) {
                    job.logs
                        .push(log_line(format!("Pass {}/{} complete.", pass + 1, passes)));
                }
            }
            Ok(())
        })?;

        if entered_verifying {
            self.audit("progress-driver", "job.verifying", &job.job_id, None)?;
        }
        self.emit(&job);
        Ok(job)
    }

    pub fn verify(&self, job_id: &str, outcome: VerifyOutcome) -> Result<WipeJob, WipeError> {
        let job = self.store.update_job(job_id, |job| {
            if job.status != JobStatus::Verifying {
                return Err(WipeError::InvalidTransition {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    action: "verify",
                });
            }
            match &outcome {
                VerifyOutcome::Passed => {
                    job.logs.push(log_line("Verification successful."));
                    job.logs.push(log_line("Job completed."));
                    job.status = JobStatus::Completed;
                }
                VerifyOutcome::Failed(reason) => {
                    job.logs.push(log_line(format!("Error: {}", reason)));
                    job.logs.push(log_line("Job failed."));
                    job.error_message = Some(reason.clone());
                    job.status = JobStatus::Failed;
                }
            }
            job.ended_at = Some(now_utc_rfc3339());
            Ok(())
        })?;

        match job.status {
            JobStatus::Completed => {
                // issuance is downstream of the committed transition; a store
                // hiccup here is logged and the job stays Completed
                if let Err(err) = self.issuer.issue(&job.job_id) {
                    warn!(job_id = %job.job_id, error = %err, "certificate issuance failed");
                }
                self.audit("verifier", "job.completed", &job.job_id, None)?;
                notify_best_effort(
                    self.notifier.as_ref(),
                    &job.notification_emails,
                    &job.job_id,
                    JobOutcome::Completed,
                );
            }
            JobStatus::Failed => {
                self.audit(
                    "verifier",
                    "job.failed",
                    &job.job_id,
                    job.error_message.clone(),
                )?;
                notify_best_effort(
                    self.notifier.as_ref(),
                    &job.notification_emails,
                    &job.job_id,
                    JobOutcome::Failed,
                );
            }
            _ => {}
        }
        self.emit(&job);
        Ok(job)
    }

    /// Cancellation is cooperative: this records the operator's intent and
    /// the terminal state; any in-flight erasure must observe it itself.
    pub fn cancel(&self, job_id: &str, requester: &str) -> Result<WipeJob, WipeError> {
        self.require_mutate(requester, "cancel job")?;
        let job = self.store.update_job(job_id, |job| {
            if job.status.is_terminal() {
                return Err(WipeError::InvalidTransition {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    action: "cancel",
                });
            }
            job.status = JobStatus::Cancelled;
            job.ended_at = Some(now_utc_rfc3339());
            job.logs.push(log_line("Job cancelled by operator."));
            Ok(())
        })?;

        info!(job_id = %job.job_id, "wipe cancelled");
        self.audit(requester, "job.cancelled", &job.job_id, None)?;
        notify_best_effort(
            self.notifier.as_ref(),
            &job.notification_emails,
            &job.job_id,
            JobOutcome::Cancelled,
        );
        self.emit(&job);
        Ok(job)
    }

    /// Returns a Failed job to Queued for a fresh attempt. The live record's
    /// logs reset; the cleared lines are archived in the audit trail first.
    pub fn retry(&self, job_id: &str, requester: &str) -> Result<WipeJob, WipeError> {
        self.require_mutate(requester, "retry job")?;
        let mut archived = Vec::new();
        let job = self.store.update_job(job_id, |job| {
            if job.status != JobStatus::Failed {
                return Err(WipeError::InvalidTransition {
                    job_id: job.job_id.clone(),
                    status: job.status,
                    action: "retry",
                });
            }
            archived = std::mem::take(&mut job.logs);
            job.status = JobStatus::Queued;
            job.progress = 0.0;
            job.error_message = None;
            job.started_at = None;
            job.ended_at = None;
            job.speed_mbps = None;
            job.eta_seconds = None;
            job.attempt += 1;
            Ok(())
        })?;

        info!(job_id = %job.job_id, attempt = job.attempt, "wipe requeued for retry");
        self.audit(
            requester,
            "job.retried",
            &job.job_id,
            Some(format!("archived logs:\n{}", archived.join("\n"))),
        )?;
        self.emit(&job);
        Ok(job)
    }

    pub fn job(&self, job_id: &str, requester: &str) -> Result<WipeJob, WipeError> {
        self.require_read(requester, "read job")?;
        self.store.job(job_id)
    }

    pub fn jobs(&self, requester: &str) -> Result<Vec<WipeJob>, WipeError> {
        self.require_read(requester, "list jobs")?;
        self.store.jobs()
    }

    fn require_mutate(&self, requester: &str, action: &'static str) -> Result<(), WipeError> {
        let role = self.oracle.role_of(requester);
        if !role.can_mutate() {
            return Err(WipeError::PermissionDenied { role, action });
        }
        Ok(())
    }

    fn require_read(&self, requester: &str, action: &'static str) -> Result<(), WipeError> {
        let role = self.oracle.role_of(requester);
        if !role.is_authenticated() {
            return Err(WipeError::PermissionDenied { role, action });
        }
        Ok(())
    }

    fn audit(
        &self,
        actor: &str,
        action: &str,
        job_id: &str,
        detail: Option<String>,
    ) -> Result<(), WipeError> {
        self.store.record(AuditEvent {
            at: now_utc_rfc3339(),
            actor: actor.to_string(),
            action: action.to_string(),
            job_id: Some(job_id.to_string()),
            detail,
        })
    }

    fn emit(&self, job: &WipeJob) {
        for sink in &self.sinks {
            sink.job_changed(job);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Passed,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wipeforge_core::{DeviceFacts, DeviceStatus, DeviceType, Role};
    use wipeforge_notify::TracingNotifier;
    use wipeforge_store::MemoryStore;

    fn oracle() -> Arc<StaticRoleOracle> {
        Arc::new(
            StaticRoleOracle::new(Role::None)
                .with_role("op@example.com", Role::Operator)
                .with_role("admin@example.com", Role::Admin)
                .with_role("auditor@example.com", Role::Auditor),
        )
    }

    fn setup() -> (Arc<MemoryStore>, Orchestrator<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(store.clone(), oracle(), Arc::new(TracingNotifier));
        (store, orchestrator)
    }

    fn register(store: &MemoryStore, serial: &str) -> wipeforge_core::Device {
        store
            .insert_device(DeviceFacts {
                path: "/dev/sdc".to_string(),
                device_type: DeviceType::Hdd,
                model: "Seagate Barracuda".to_string(),
                serial: serial.to_string(),
                size_bytes: 2_000_000_000_000,
            })
            .unwrap()
    }

    fn device_request(device: &wipeforge_core::Device) -> JobRequest {
        JobRequest::Device {
            device_id: device.id.clone(),
        }
    }

    #[test]
    fn scenario_a_full_success_path_issues_certificate() {
        let (store, orchestrator) = setup();
        let device = register(&store, "WDE123456789");

        let job = orchestrator
            .create_job(device_request(&device), PolicyName::Standard, "op@example.com", &[])
            .unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        for _ in 0..4 {
            orchestrator.advance_progress(&job.job_id, 40.0).unwrap();
        }
        // three advances saturate at 100, the fourth enters Verifying
        let verifying = store.job(&job.id).unwrap();
        assert_eq!(verifying.status, JobStatus::Verifying);

        let done = orchestrator
            .verify(&job.job_id, VerifyOutcome::Passed)
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.ended_at.is_some());

        let certificates = store.certificates().unwrap();
        assert_eq!(certificates.len(), 1);
        match &certificates[0].target {
            JobTarget::Device { serial, .. } => assert_eq!(serial, "WDE123456789"),
            other => panic!("expected device target, got {other:?}"),
        }
    }

    #[test]
    fn scenario_b_busy_device_rejects_second_job() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");

        let first = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap();
        orchestrator.start(&first.job_id, "op@example.com").unwrap();

        let err = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap_err();
        assert!(matches!(err, WipeError::DeviceBusy { .. }));
    }

    #[test]
    fn scenario_c_protected_device_is_never_a_target() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        store
            .update_device(&device.id, |device| {
                device.status = DeviceStatus::Protected;
                Ok(())
            })
            .unwrap();

        let err = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap_err();
        assert!(matches!(err, WipeError::ProtectedDevice { .. }));
    }

    #[test]
    fn scenario_d_retry_resets_for_a_fresh_attempt() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        let job = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap();
        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        orchestrator.advance_progress(&job.job_id, 100.0).unwrap();
        orchestrator.advance_progress(&job.job_id, 0.0).unwrap();
        orchestrator
            .verify(
                &job.job_id,
                VerifyOutcome::Failed("Device disconnected during wipe.".to_string()),
            )
            .unwrap();

        let retried = orchestrator.retry(&job.job_id, "op@example.com").unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.progress, 0.0);
        assert!(retried.logs.is_empty());
        assert!(retried.error_message.is_none());
        assert!(retried.started_at.is_none());
        assert!(retried.ended_at.is_none());
        assert_eq!(retried.attempt, 2);

        // the cleared logs survive in the audit trail
        let events = store.events().unwrap();
        let archived = events
            .iter()
            .find(|event| event.action == "job.retried")
            .and_then(|event| event.detail.as_deref())
            .unwrap();
        assert!(archived.contains("Job failed."));
    }

    #[test]
    fn transitions_off_the_map_are_rejected() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        let job = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap();

        // Queued: cannot advance, verify or retry
        assert!(matches!(
            orchestrator.advance_progress(&job.job_id, 10.0).unwrap_err(),
            WipeError::InvalidTransition { .. }
        ));
        assert!(matches!(
            orchestrator
                .verify(&job.job_id, VerifyOutcome::Passed)
                .unwrap_err(),
            WipeError::InvalidTransition { .. }
        ));
        assert!(matches!(
            orchestrator.retry(&job.job_id, "op@example.com").unwrap_err(),
            WipeError::InvalidTransition { .. }
        ));

        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        // Running: cannot start again
        assert!(matches!(
            orchestrator.start(&job.job_id, "op@example.com").unwrap_err(),
            WipeError::InvalidTransition { .. }
        ));

        orchestrator.cancel(&job.job_id, "op@example.com").unwrap();
        // Cancelled is terminal: cancelling again is an error, not a no-op
        assert!(matches!(
            orchestrator.cancel(&job.job_id, "op@example.com").unwrap_err(),
            WipeError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn progress_is_monotonic_and_clamped() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        let job = orchestrator
            .create_job(device_request(&device), PolicyName::Standard, "op@example.com", &[])
            .unwrap();
        orchestrator.start(&job.job_id, "op@example.com").unwrap();

        orchestrator.advance_progress(&job.job_id, 30.0).unwrap();
        let after_negative = orchestrator.advance_progress(&job.job_id, -50.0).unwrap();
        assert_eq!(after_negative.progress, 30.0);

        let saturated = orchestrator.advance_progress(&job.job_id, 500.0).unwrap();
        assert_eq!(saturated.progress, 100.0);
        assert_eq!(saturated.status, JobStatus::Running);

        // completion is only reachable through Verifying
        let verifying = orchestrator.advance_progress(&job.job_id, 1.0).unwrap();
        assert_eq!(verifying.status, JobStatus::Verifying);
    }

    #[test]
    fn pass_milestones_land_in_the_log() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        let job = orchestrator
            .create_job(device_request(&device), PolicyName::Standard, "op@example.com", &[])
            .unwrap();
        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        orchestrator.advance_progress(&job.job_id, 70.0).unwrap();

        let logs = store.job(&job.id).unwrap().logs;
        assert!(logs.iter().any(|line| line.contains("Pass 1/3 complete.")));
        assert!(logs.iter().any(|line| line.contains("Pass 2/3 complete.")));
        assert!(!logs.iter().any(|line| line.contains("Pass 3/3 complete.")));
    }

    #[test]
    fn auditors_read_but_never_mutate() {
        let (store, orchestrator) = setup();
        let device = register(&store, "S1");
        let err = orchestrator
            .create_job(
                device_request(&device),
                PolicyName::QuickWipe,
                "auditor@example.com",
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, WipeError::PermissionDenied { .. }));

        orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap();
        assert_eq!(orchestrator.jobs("auditor@example.com").unwrap().len(), 1);

        // unauthenticated callers get nothing
        assert!(matches!(
            orchestrator.jobs("stranger@example.com").unwrap_err(),
            WipeError::PermissionDenied { .. }
        ));
    }

    #[test]
    fn creator_is_always_notified() {
        let (_, orchestrator) = setup();
        let job = orchestrator
            .create_job(
                JobRequest::File {
                    file_name: "ledger.xlsx".to_string(),
                    file_size: 4096,
                    file_type: "application/vnd.ms-excel".to_string(),
                },
                PolicyName::QuickWipe,
                "op@example.com",
                &["archive@example.com".to_string(), "op@example.com".to_string()],
            )
            .unwrap();
        assert_eq!(
            job.notification_emails,
            vec!["op@example.com".to_string(), "archive@example.com".to_string()]
        );
    }

    #[test]
    fn file_jobs_traverse_the_same_machine() {
        let (_, orchestrator) = setup();
        let job = orchestrator
            .create_job(
                JobRequest::File {
                    file_name: "report.pdf".to_string(),
                    file_size: 1_048_576,
                    file_type: "application/pdf".to_string(),
                },
                PolicyName::QuickWipe,
                "op@example.com",
                &[],
            )
            .unwrap();
        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        orchestrator.advance_progress(&job.job_id, 100.0).unwrap();
        orchestrator.advance_progress(&job.job_id, 0.0).unwrap();
        let done = orchestrator
            .verify(&job.job_id, VerifyOutcome::Passed)
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[test]
    fn event_sink_sees_every_transition() {
        struct Recorder(Mutex<Vec<JobStatus>>);
        impl JobEventSink for Recorder {
            fn job_changed(&self, job: &WipeJob) {
                self.0.lock().unwrap().push(job.status);
            }
        }

        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let orchestrator = Orchestrator::new(store.clone(), oracle(), Arc::new(TracingNotifier))
            .with_event_sink(recorder.clone());

        let device = register(&store, "S1");
        let job = orchestrator
            .create_job(device_request(&device), PolicyName::QuickWipe, "op@example.com", &[])
            .unwrap();
        orchestrator.start(&job.job_id, "op@example.com").unwrap();
        orchestrator.cancel(&job.job_id, "op@example.com").unwrap();

        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![JobStatus::Queued, JobStatus::Running, JobStatus::Cancelled]
        );
    }
}
