use crate::report::ProofReport;

/// Render check results as plain console output, failures first.
pub fn render(reports: &[ProofReport]) -> String {
    let mut output = String::new();

    if reports.is_empty() {
        output.push_str("\n  No proofs checked.\n\n");
        return output;
    }

    let mut sorted: Vec<&ProofReport> = reports.iter().collect();
    sorted.sort_by(|a, b| a.verified.cmp(&b.verified).then_with(|| a.url.cmp(&b.url)));

    output.push_str(&format!("\n  {} proof(s) checked:\n\n", reports.len()));

    for report in &sorted {
        let tag = if report.verified { "[VERIFIED]" } else { "[FAILED]  " };
        output.push_str(&format!("  {} {} ({})\n", tag, report.url, report.kind));

        let checked = report
            .last_checked
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".into());
        output.push_str(&format!("             checked: {}\n", checked));
        if let Some(digest) = &report.content_sha256 {
            output.push_str(&format!(
                "             content: {} bytes, sha256 {}\n",
                report.content_len, digest
            ));
        }
        if let Some(error) = &report.error {
            output.push_str(&format!("             error: {}\n", error));
        }
        output.push('\n');
    }

    let verified = reports.iter().filter(|r| r.verified).count();
    let status = if verified == reports.len() { "PASS" } else { "FAIL" };
    output.push_str(&format!(
        "  Result: {} ({} of {} verified)\n\n",
        status,
        verified,
        reports.len()
    ));

    output
}
