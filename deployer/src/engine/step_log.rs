//! Per-run step log

use std::sync::Mutex;

use deploy_records::{StepRecord, StepStatus};

use crate::progress::{ProgressEvent, ProgressSink};

/// Ordered step records for one run, mirrored to a progress sink.
///
/// Holds at most one record per step key. Log lines are only ever
/// appended. The lock is never held across an await.
pub struct StepLog<'a> {
    records: Mutex<Vec<StepRecord>>,
    sink: &'a dyn ProgressSink,
}

impl<'a> StepLog<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Update a step's status, creating its record on first use
    pub fn report(&self, step: &str, status: StepStatus, details: &str) {
        self.with_record(step, |record| {
            record.status = status;
            record.details = details.to_string();
        });

        self.sink.on_progress(&ProgressEvent {
            step,
            status,
            details,
            log_line: None,
        });
    }

    /// Append a raw output line to a step
    pub fn log_line(&self, step: &str, line: &str) {
        let (status, details) = self.with_record(step, |record| {
            record.logs.push(line.to_string());
            (record.status, record.details.clone())
        });

        self.sink.on_progress(&ProgressEvent {
            step,
            status,
            details: &details,
            log_line: Some(line),
        });
    }

    /// Copy of the records in pipeline order
    pub fn snapshot(&self) -> Vec<StepRecord> {
        let records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        records.to_vec()
    }

    fn with_record<T>(&self, step: &str, f: impl FnOnce(&mut StepRecord) -> T) -> T {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let index = match records.iter().position(|r| r.step == step) {
            Some(index) => index,
            None => {
                records.push(StepRecord::new(step, StepStatus::Running, ""));
                records.len() - 1
            }
        };
        f(&mut records[index])
    }
}
