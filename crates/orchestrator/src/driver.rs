//! Background progress loop, logically separate from the state machine: the
//! same transitions stay reachable through manual operator action. One tick
//! advances every Running job and resolves every Verifying job; a slow or
//! failing job never stalls the others.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use wipeforge_core::{JobStatus, WipeError, WipeJob};
use wipeforge_store::{AuditStore, CertificateStore, DeviceStore, JobStore};

use crate::{Orchestrator, Telemetry, VerifyOutcome};

/// Post-wipe integrity check. Production implementations read the device
/// back; these in-tree probes exist for tests and demos.
pub trait VerificationProbe: Send + Sync {
    fn outcome(&self, job: &WipeJob) -> VerifyOutcome;
}

/// Deterministic probe: always the configured outcome.
pub struct FixedProbe {
    outcome: VerifyOutcome,
}

impl FixedProbe {
    pub fn passing() -> Self {
        Self {
            outcome: VerifyOutcome::Passed,
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: VerifyOutcome::Failed(reason.into()),
        }
    }
}

impl VerificationProbe for FixedProbe {
    fn outcome(&self, _job: &WipeJob) -> VerifyOutcome {
        self.outcome.clone()
    }
}

/// Seeded pseudo-random probe for demo runs: reproducible, never used where
/// tests assert a specific outcome.
pub struct SeededProbe {
    rng: Mutex<StdRng>,
    pass_rate: f64,
}

impl SeededProbe {
    pub fn new(seed: u64, pass_rate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            pass_rate,
        }
    }
}

impl VerificationProbe for SeededProbe {
    fn outcome(&self, _job: &WipeJob) -> VerifyOutcome {
        let passed = self
            .rng
            .lock()
            .map(|mut rng| rng.gen::<f64>() < self.pass_rate)
            .unwrap_or(true);
        if passed {
            VerifyOutcome::Passed
        } else {
            VerifyOutcome::Failed("Verification read-back mismatch.".to_string())
        }
    }
}

/// How much progress one tick is worth.
#[derive(Debug, Clone, Copy)]
pub enum ProgressPolicy {
    /// Flat percentage per tick, target size ignored.
    FixedPercent(f64),
    /// Derived from configured throughput against the target size, so a 2 TB
    /// disk takes proportionally longer than a 64 GB stick.
    Throughput { mbps: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    pub tick: Duration,
    pub policy: ProgressPolicy,
    /// Start Queued jobs automatically each tick instead of waiting for an
    /// operator.
    pub auto_start: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(2),
            policy: ProgressPolicy::FixedPercent(10.0),
            auto_start: false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub started: usize,
    pub advanced: usize,
    pub verified: usize,
    pub skipped: usize,
}

pub struct ProgressDriver<S> {
    orchestrator: Arc<Orchestrator<S>>,
    config: DriverConfig,
    probe: Box<dyn VerificationProbe>,
}

impl<S> ProgressDriver<S>
where
    S: JobStore + DeviceStore + CertificateStore + AuditStore,
{
    pub fn new(
        orchestrator: Arc<Orchestrator<S>>,
        config: DriverConfig,
        probe: Box<dyn VerificationProbe>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            probe,
        }
    }

    /// One iteration over every driveable job. Transient store errors are
    /// retried on the next tick, never converted into a job failure.
    pub fn tick(&self) -> Result<TickReport, WipeError> {
        let mut report = TickReport::default();
        for job in self.orchestrator.store.jobs()? {
            let result = match job.status {
                JobStatus::Queued if self.config.auto_start => self
                    .orchestrator
                    .start_unchecked(&job.id, "progress-driver")
                    .map(|_| report.started += 1),
                JobStatus::Running => {
                    let (delta, telemetry) = self.step(&job);
                    self.orchestrator
                        .advance_with(&job.id, delta, telemetry)
                        .map(|_| report.advanced += 1)
                }
                JobStatus::Verifying => {
                    let outcome = self.probe.outcome(&job);
                    self.orchestrator
                        .verify(&job.id, outcome)
                        .map(|_| report.verified += 1)
                }
                _ => {
                    report.skipped += 1;
                    Ok(())
                }
            };
            match result {
                Ok(()) => {}
                Err(WipeError::StoreUnavailable(reason)) => {
                    warn!(job_id = %job.job_id, %reason, "tick deferred, store unavailable");
                }
                Err(err) => {
                    // lost a race with an operator action; the next tick
                    // observes the new state
                    debug!(job_id = %job.job_id, error = %err, "tick skipped job");
                }
            }
        }
        Ok(report)
    }

    /// Tick until no non-terminal jobs remain, sleeping the configured
    /// cadence in between. Returns the number of ticks executed.
    pub fn run_until_idle(&self, max_ticks: Option<u64>) -> Result<u64, WipeError> {
        let mut ticks = 0u64;
        loop {
            let pending = self
                .orchestrator
                .store
                .jobs()?
                .iter()
                .any(|job| match job.status {
                    JobStatus::Queued => self.config.auto_start,
                    JobStatus::Running | JobStatus::Verifying => true,
                    _ => false,
                });
            if !pending {
                return Ok(ticks);
            }
            if let Some(max) = max_ticks {
                if ticks >= max {
                    return Ok(ticks);
                }
            }
            self.tick()?;
            ticks += 1;
            if !self.config.tick.is_zero() {
                std::thread::sleep(self.config.tick);
            }
        }
    }

    fn step(&self, job: &WipeJob) -> (f64, Option<Telemetry>) {
        let tick_secs = self.config.tick.as_secs_f64().max(0.001);
        let size_mb = job.target.size_bytes() as f64 / (1024.0 * 1024.0);
        match self.config.policy {
            ProgressPolicy::FixedPercent(percent) => {
                let percent = percent.max(0.0);
                let speed_mbps = size_mb * (percent / 100.0) / tick_secs;
                let remaining = (100.0 - job.progress).max(0.0);
                let eta_seconds = if percent > 0.0 {
                    ((remaining / percent).ceil() * tick_secs) as u64
                } else {
                    0
                };
                (
                    percent,
                    Some(Telemetry {
                        speed_mbps,
                        eta_seconds,
                    }),
                )
            }
            ProgressPolicy::Throughput { mbps } => {
                let mbps = mbps.max(0.001);
                let total_secs = (size_mb / mbps).max(tick_secs);
                let delta = tick_secs / total_secs * 100.0;
                let remaining = (100.0 - job.progress).max(0.0);
                let eta_seconds = (remaining / 100.0 * total_secs) as u64;
                (
                    delta,
                    Some(Telemetry {
                        speed_mbps: mbps,
                        eta_seconds,
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JobRequest, StaticRoleOracle};
    use wipeforge_core::{PolicyName, Role};
    use wipeforge_notify::TracingNotifier;
    use wipeforge_store::{CertificateStore, MemoryStore};

    fn orchestrator() -> (Arc<MemoryStore>, Arc<Orchestrator<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(StaticRoleOracle::new(Role::Operator));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            oracle,
            Arc::new(TracingNotifier),
        ));
        (store, orchestrator)
    }

    fn file_job(orchestrator: &Orchestrator<MemoryStore>, size: u64) -> wipeforge_core::WipeJob {
        orchestrator
            .create_job(
                JobRequest::File {
                    file_name: "dump.bin".to_string(),
                    file_size: size,
                    file_type: "application/octet-stream".to_string(),
                },
                PolicyName::QuickWipe,
                "op@example.com",
                &[],
            )
            .unwrap()
    }

    fn config(percent: f64) -> DriverConfig {
        DriverConfig {
            tick: Duration::ZERO,
            policy: ProgressPolicy::FixedPercent(percent),
            auto_start: true,
        }
    }

    #[test]
    fn drives_a_job_from_queued_to_completed() {
        let (store, orchestrator) = orchestrator();
        let job = file_job(&orchestrator, 1_048_576);
        let driver = ProgressDriver::new(
            orchestrator.clone(),
            config(50.0),
            Box::new(FixedProbe::passing()),
        );

        let ticks = driver.run_until_idle(Some(100)).unwrap();
        // start, 50, 100, enter verifying, verify
        assert_eq!(ticks, 5);

        let done = store.job(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(store.certificates().unwrap().len(), 1);
    }

    #[test]
    fn failing_probe_lands_the_job_in_failed() {
        let (store, orchestrator) = orchestrator();
        let job = file_job(&orchestrator, 1_048_576);
        let driver = ProgressDriver::new(
            orchestrator.clone(),
            config(100.0),
            Box::new(FixedProbe::failing("Verification read-back mismatch.")),
        );

        driver.run_until_idle(Some(100)).unwrap();
        let failed = store.job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Verification read-back mismatch.")
        );
        assert!(store.certificates().unwrap().is_empty());
    }

    #[test]
    fn throughput_policy_scales_with_target_size() {
        let (_, orchestrator) = orchestrator();
        let small = file_job(&orchestrator, 10 * 1024 * 1024);
        let driver = ProgressDriver::new(
            orchestrator.clone(),
            DriverConfig {
                tick: Duration::from_secs(1),
                policy: ProgressPolicy::Throughput { mbps: 5.0 },
                auto_start: false,
            },
            Box::new(FixedProbe::passing()),
        );

        // 10 MB at 5 MB/s is 2 seconds total: one 1s tick is 50%
        let (delta, telemetry) = driver.step(&small);
        assert!((delta - 50.0).abs() < 0.01);
        let telemetry = telemetry.unwrap();
        assert!((telemetry.speed_mbps - 5.0).abs() < 0.001);
        assert_eq!(telemetry.eta_seconds, 2);
    }

    #[test]
    fn telemetry_is_recorded_while_running() {
        let (store, orchestrator) = orchestrator();
        let job = file_job(&orchestrator, 1_048_576);
        let driver = ProgressDriver::new(
            orchestrator.clone(),
            config(25.0),
            Box::new(FixedProbe::passing()),
        );
        driver.tick().unwrap(); // start
        driver.tick().unwrap(); // first advance

        let running = store.job(&job.id).unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.speed_mbps.is_some());
        assert!(running.eta_seconds.is_some());
    }

    #[test]
    fn seeded_probe_is_reproducible() {
        let probe_a = SeededProbe::new(42, 0.5);
        let probe_b = SeededProbe::new(42, 0.5);
        let (_, orchestrator) = orchestrator();
        let job = file_job(&orchestrator, 1024);
        for _ in 0..8 {
            assert_eq!(probe_a.outcome(&job) == VerifyOutcome::Passed,
                       probe_b.outcome(&job) == VerifyOutcome::Passed);
        }
    }
}
