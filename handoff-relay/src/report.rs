use std::fmt;

use handoff::result::StageResult;
use tracing::{info, warn};

use crate::files::FileRecord;

/// Summary of a relay run, computed from the verifier's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub expected: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
}

impl VerificationReport {
    pub fn new(result: &StageResult<FileRecord>) -> Self {
        Self {
            expected: result.expected(),
            processed: result.processed(),
            success: result.succeeded(),
            failed: result.failed(),
        }
    }

    /// Files dispatched but never verified.
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.processed)
    }

    pub fn is_complete(&self) -> bool {
        self.missing() == 0 && self.failed == 0
    }

    /// Logs every verified file followed by the report itself.
    pub fn log(&self, result: &StageResult<FileRecord>) {
        for file in result.items() {
            info!(file = %file.name, status = %file.status, "file verified");
        }

        info!(
            expected = self.expected,
            processed = self.processed,
            success = self.success,
            failed = self.failed,
            "verification report"
        );

        if self.missing() > 0 {
            warn!(missing = self.missing(), "some files were never verified");
        }
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected: {}, processed: {}, success: {}, failed: {}",
            self.expected, self.processed, self.success, self.failed
        )?;

        if self.missing() > 0 {
            write!(f, ", missing: {}", self.missing())?;
        }

        Ok(())
    }
}
