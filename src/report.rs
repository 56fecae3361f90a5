use serde_json::{json, Value};
use tracing::{error, info};

use crate::params::{ReportBy, Week};

pub const JOB_NAME: &str = "TDS API Attendance import";

/// Failure code logged when no modules are monitored for the requested week.
pub const NO_MODULES_CODE: u32 = 99;

/// Outcome of a completed import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows inserted by this run, across all modules.
    pub created: u64,
    /// Rows now stored for the requested week and academic year.
    pub total: u64,
}

/// Structured start, failure and completion records for one job.
#[derive(Clone, Copy, Debug)]
pub struct Reporter {
    job: &'static str,
}

impl Default for Reporter {
    fn default() -> Self {
        Self { job: JOB_NAME }
    }
}

impl Reporter {
    pub fn startup(&self, resource_type: ReportBy, base_url: &str, del_existing: &str, week: Week) {
        info!(
            job = self.job,
            %resource_type,
            base_url,
            del_existing,
            week = week.get(),
            "starting import"
        );
    }

    pub fn failure(&self, code: u32, details: &Value) {
        error!(job = self.job, code, %details, "import failed");
    }

    pub fn no_modules(&self) {
        self.failure(
            NO_MODULES_CODE,
            &json!({ "CmdErr_ReportBy": "No modules found for monitoring" }),
        );
    }

    pub fn completion(&self, summary: &ImportSummary) {
        info!(
            job = self.job,
            created = summary.created,
            total = summary.total,
            "import complete"
        );
    }
}
