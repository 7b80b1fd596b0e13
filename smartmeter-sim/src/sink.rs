use smartmeter_client::{
    db::{Repository, RepositoryError},
    domain::UsageReading,
};

use crate::validate::validate_reading;

/// Writes readings one at a time through a [`Repository`], after validation.
///
/// Each insert is committed on its own; a storage error aborts the caller.
/// Readings that fail validation are logged, counted and skipped.
pub struct RepositorySink<'a> {
    repo: &'a dyn Repository,
    inserted: u64,
    rejected: u64,
}

impl<'a> RepositorySink<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self {
            repo,
            inserted: 0,
            rejected: 0,
        }
    }

    pub fn repository(&self) -> &'a dyn Repository {
        self.repo
    }

    /// Returns `false` when the reading was rejected and not stored.
    pub async fn write(&mut self, reading: &UsageReading) -> Result<bool, RepositoryError> {
        if let Err(e) = validate_reading(reading) {
            tracing::warn!(error = %e, device_id = reading.device_id, "dropping invalid reading");
            metrics::counter!("readings_rejected_total").increment(1);
            self.rejected += 1;
            return Ok(false);
        }

        if let Err(e) = self.repo.insert_reading(reading).await {
            tracing::error!(error = %e, device_id = reading.device_id, "reading insert failed");
            metrics::counter!("repository_errors_total").increment(1);
            return Err(e);
        }

        metrics::counter!("readings_inserted_total").increment(1);
        self.inserted += 1;
        Ok(true)
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
