use tracing::{info, warn};

use wipeforge_core::{JobOutcome, WipeError};

/// Outbound notification collaborator. Fire-and-forget from the
/// orchestrator's perspective: a failing notifier is logged, never surfaced.
pub trait Notifier: Send + Sync {
    fn notify(&self, emails: &[String], job_id: &str, outcome: JobOutcome)
        -> Result<(), WipeError>;
}

/// Default notifier: records deliveries in the structured log. Real mail or
/// webhook transports implement the same trait.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(
        &self,
        emails: &[String],
        job_id: &str,
        outcome: JobOutcome,
    ) -> Result<(), WipeError> {
        info!(job_id, %outcome, recipients = emails.len(), "job outcome notification");
        Ok(())
    }
}

/// Swallows notifier failures so they never block or fail a transition.
pub fn notify_best_effort(
    notifier: &dyn Notifier,
    emails: &[String],
    job_id: &str,
    outcome: JobOutcome,
) {
    if let Err(err) = notifier.notify(emails, job_id, outcome) {
        warn!(job_id, error = %err, "notification delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _: &[String], _: &str, _: JobOutcome) -> Result<(), WipeError> {
            Err(WipeError::StoreUnavailable("smtp down".to_string()))
        }
    }

    #[test]
    fn failures_never_propagate() {
        notify_best_effort(
            &FailingNotifier,
            &["op@example.com".to_string()],
            "JOB-20231026-001",
            JobOutcome::Failed,
        );
    }
}
