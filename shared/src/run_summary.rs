/// Aggregation of per-target download reports into one run summary.
use std::path::Path;

use serde::Serialize;

use crate::errors::CourierResult;
use crate::models::DownloadReport;

/// Outcome of a whole fan-out run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub failed_urls: Vec<String>,
    pub reports: Vec<DownloadReport>,
}

impl RunSummary {
    /// Build a summary, keeping reports in the order given.
    pub fn from_reports(reports: Vec<DownloadReport>) -> Self {
        let succeeded = reports.iter().filter(|r| r.is_done()).count();
        let failed_urls = reports
            .iter()
            .filter(|r| !r.is_done())
            .map(|r| r.target.url.to_string())
            .collect::<Vec<_>>();

        Self {
            total: reports.len(),
            succeeded,
            failed: failed_urls.len(),
            total_bytes: reports.iter().map(|r| r.bytes_written).sum(),
            failed_urls,
            reports,
        }
    }

    /// True when every download reached `Done`.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Serialize to a single JSON line (for logs).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Write the summary as pretty JSON to `path`.
    pub fn write_to(&self, path: &Path) -> CourierResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
