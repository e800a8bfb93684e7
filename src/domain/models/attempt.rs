//! Phase attempt records and the per-run attempt ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::errors::{DomainResult, EngineError};

/// How a single invocation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalTimeout,
    FatalError,
    Interrupted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RetryableFailure => "retryable_failure",
            Self::FatalTimeout => "fatal_timeout",
            Self::FatalError => "fatal_error",
            Self::Interrupted => "interrupted",
        }
    }
}

/// Audit record of one agent invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAttemptRecord {
    pub phase_name: String,
    /// Invocation attempt within the current verification round (1-based).
    pub attempt_number: u32,
    /// Verification round (1-based).
    pub verification_attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<AttemptOutcome>,
    pub model: String,
    pub log_ref: Option<PathBuf>,
}

impl PhaseAttemptRecord {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Ordered attempt history for one run.
///
/// At most one record is open at any time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptLedger {
    records: Vec<PhaseAttemptRecord>,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record for a new attempt.
    pub fn open(
        &mut self,
        phase_name: &str,
        attempt_number: u32,
        verification_attempt_number: u32,
        model: &str,
        log_ref: Option<PathBuf>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(open) = self.current() {
            return Err(EngineError::AttemptAlreadyOpen {
                phase: open.phase_name.clone(),
                attempt: open.attempt_number,
            });
        }

        self.records.push(PhaseAttemptRecord {
            phase_name: phase_name.to_string(),
            attempt_number,
            verification_attempt_number,
            started_at: now,
            ended_at: None,
            outcome: None,
            model: model.to_string(),
            log_ref,
        });
        Ok(())
    }

    /// Close the open record with its outcome.
    pub fn close(&mut self, outcome: AttemptOutcome, now: DateTime<Utc>) -> DomainResult<()> {
        let record = self
            .records
            .last_mut()
            .filter(|r| r.is_open())
            .ok_or(EngineError::NoOpenAttempt)?;
        record.ended_at = Some(now);
        record.outcome = Some(outcome);
        Ok(())
    }

    /// The currently open record, if any.
    pub fn current(&self) -> Option<&PhaseAttemptRecord> {
        self.records.last().filter(|r| r.is_open())
    }

    pub fn records(&self) -> &[PhaseAttemptRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PhaseAttemptRecord> {
        self.records
    }

    /// Distinct verification rounds recorded for a phase.
    pub fn verification_rounds(&self, phase_name: &str) -> u32 {
        self.records
            .iter()
            .filter(|r| r.phase_name == phase_name)
            .map(|r| r.verification_attempt_number)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_cycle() {
        let mut ledger = AttemptLedger::new();
        let now = Utc::now();
        ledger.open("implement", 1, 1, "sonnet", None, now).unwrap();
        assert!(ledger.current().is_some());

        ledger.close(AttemptOutcome::Success, now).unwrap();
        assert!(ledger.current().is_none());
        assert_eq!(ledger.records()[0].outcome, Some(AttemptOutcome::Success));
        assert_eq!(ledger.records()[0].ended_at, Some(now));
    }

    #[test]
    fn test_second_open_is_rejected() {
        let mut ledger = AttemptLedger::new();
        let now = Utc::now();
        ledger.open("implement", 1, 1, "sonnet", None, now).unwrap();
        let err = ledger.open("test", 1, 1, "sonnet", None, now).unwrap_err();
        assert!(matches!(err, EngineError::AttemptAlreadyOpen { ref phase, .. } if phase == "implement"));
    }

    #[test]
    fn test_close_without_open() {
        let mut ledger = AttemptLedger::new();
        assert!(matches!(
            ledger.close(AttemptOutcome::Success, Utc::now()),
            Err(EngineError::NoOpenAttempt)
        ));
    }

    #[test]
    fn test_verification_rounds() {
        let mut ledger = AttemptLedger::new();
        let now = Utc::now();
        for round in 1..=3 {
            ledger.open("test", 1, round, "sonnet", None, now).unwrap();
            ledger.close(AttemptOutcome::Success, now).unwrap();
        }
        assert_eq!(ledger.verification_rounds("test"), 3);
        assert_eq!(ledger.verification_rounds("implement"), 0);
    }
}
