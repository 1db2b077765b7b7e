//! Fleet-level aggregation over stored jobs, the numbers behind an
//! operations dashboard: counts by status and policy, bytes erased, average
//! wipe duration.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use wipeforge_core::{JobStatus, WipeJob};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WipeStats {
    pub total_jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub in_flight: usize,
    pub bytes_wiped: u64,
    pub avg_wipe_minutes: Option<f64>,
    pub by_policy: Vec<(String, usize)>,
    pub by_status: Vec<(String, usize)>,
}

impl WipeStats {
    pub fn from_jobs(jobs: &[WipeJob]) -> Self {
        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut cancelled = 0usize;
        let mut in_flight = 0usize;
        let mut bytes_wiped = 0u64;
        let mut duration_minutes = Vec::new();
        let mut by_policy: Vec<(String, usize)> = Vec::new();
        let mut by_status: Vec<(String, usize)> = Vec::new();

        for job in jobs {
            match job.status {
                JobStatus::Completed => {
                    completed += 1;
                    bytes_wiped = bytes_wiped.saturating_add(job.target.size_bytes());
                }
                JobStatus::Failed => failed += 1,
                JobStatus::Cancelled => cancelled += 1,
                _ => in_flight += 1,
            }

            if job.status == JobStatus::Completed {
                if let Some(minutes) = wipe_minutes(job) {
                    duration_minutes.push(minutes);
                }
            }

            bump(&mut by_policy, job.policy.name.as_str());
            bump(&mut by_status, &job.status.to_string());
        }

        let avg_wipe_minutes = if duration_minutes.is_empty() {
            None
        } else {
            Some(duration_minutes.iter().sum::<f64>() / duration_minutes.len() as f64)
        };

        Self {
            total_jobs: jobs.len(),
            completed,
            failed,
            cancelled,
            in_flight,
            bytes_wiped,
            avg_wipe_minutes,
            by_policy,
            by_status,
        }
    }
}

fn bump(buckets: &mut Vec<(String, usize)>, key: &str) {
    if let Some(entry) = buckets.iter_mut().find(|(name, _)| name == key) {
        entry.1 += 1;
    } else {
        buckets.push((key.to_string(), 1));
    }
}

fn wipe_minutes(job: &WipeJob) -> Option<f64> {
    let started = job.started_at.as_deref()?;
    let ended = job.ended_at.as_deref()?;
    let started = OffsetDateTime::parse(started, &Rfc3339).ok()?;
    let ended = OffsetDateTime::parse(ended, &Rfc3339).ok()?;
    let seconds = (ended - started).whole_seconds();
    if seconds < 0 {
        return None;
    }
    Some(seconds as f64 / 60.0)
}
