//! Markdown rendering of a run summary

use crate::types::{CheckResult, RepairResult, RunSummary, Severity};

fn status_marker(status: Severity) -> &'static str {
    match status {
        Severity::Healthy => "[OK]",
        Severity::Degraded => "[WARN]",
        Severity::Critical => "[FAIL]",
    }
}

fn check_line(result: &CheckResult) -> String {
    let detail = result
        .error()
        .or(result.details())
        .unwrap_or("no details");
    let timing = result
        .metric("execution_time_ms")
        .and_then(serde_json::Value::as_u64)
        .map(|ms| format!(" ({ms} ms)"))
        .unwrap_or_default();
    format!(
        "- {} **{}** {}: {detail}{timing}",
        status_marker(result.status()),
        result.tool_name(),
        result.status().as_str(),
    )
}

fn repair_lines(result: &RepairResult) -> Vec<String> {
    let outcome = if result.dry_run() {
        "DRY RUN"
    } else if result.repaired() {
        "REPAIRED"
    } else {
        "NOT REPAIRED"
    };
    let mut lines = vec![format!("- **{}**: {outcome}", result.tool_name())];
    lines.extend(result.actions().iter().map(|a| format!("  - {a}")));
    lines
}

fn repair_tally(summary: &RunSummary) -> String {
    let total = summary.repair_results().len();
    let planned = summary.repair_dry_run_count();
    if planned == total {
        return format!("{total} repairs planned (dry run, nothing changed)\n");
    }
    let mut line = format!(
        "{total} repairs: {} succeeded, {} failed",
        summary.repair_success_count(),
        summary.repair_failure_count(),
    );
    if planned > 0 {
        line.push_str(&format!(", {planned} dry run"));
    }
    line.push('\n');
    line
}

/// Render `summary` as a markdown report.
///
/// Sections: header, Health Checks (always, one line per check), Auto-Repairs
/// (only when at least one repair ran).
pub fn render(title: &str, summary: &RunSummary) -> String {
    let mut sections = Vec::new();

    sections.push(format!(
        "# {title}\n\n\
         Run `{}` at {}\n\n\
         Overall: **{}** in {} ms",
        summary.run_id(),
        summary.timestamp().format("%Y-%m-%d %H:%M:%S UTC"),
        summary.overall().as_str(),
        summary.total_time_ms(),
    ));

    let mut checks = vec![
        "## Health Checks\n".to_string(),
        format!(
            "{} checks: {} healthy, {} degraded, {} critical\n",
            summary.check_results().len(),
            summary.healthy_count(),
            summary.degraded_count(),
            summary.critical_count(),
        ),
    ];
    checks.extend(summary.check_results().iter().map(check_line));
    sections.push(checks.join("\n"));

    if !summary.repair_results().is_empty() {
        let mut repairs = vec!["## Auto-Repairs\n".to_string(), repair_tally(summary)];
        repairs.extend(summary.repair_results().iter().flat_map(repair_lines));
        sections.push(repairs.join("\n"));
    }

    sections.join("\n\n") + "\n"
}
