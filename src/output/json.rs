use crate::error::Result;
use crate::report::ProofReport;

use serde::Serialize;

#[derive(Serialize)]
struct JsonReport<'a> {
    proofs: &'a [ProofReport],
    verified: usize,
    total: usize,
}

/// Render check results as a JSON document.
pub fn render(reports: &[ProofReport]) -> Result<String> {
    let report = JsonReport {
        proofs: reports,
        verified: reports.iter().filter(|r| r.verified).count(),
        total: reports.len(),
    };
    let json = serde_json::to_string_pretty(&report)?;
    Ok(json)
}
