//! Result rendering: console lines and the machine-readable CSV report.

use std::path::Path;

use anyhow::Context;
use cascan_lib::TestResult;
use serde::Serialize;

/// One console line per result, stable field order:
/// `name, p_value, passed, <metric=value>*`.
pub fn console_line(result: &TestResult) -> String {
    let mut line = format!(
        "{}, {:.6}, {}",
        result.test_name(),
        result.p_value(),
        if result.passed() { "pass" } else { "fail" }
    );
    for (key, value) in result.metrics() {
        line.push_str(&format!(", {key}={value}"));
    }
    line
}

/// One CSV record per result: name, p-value, verdict, and the diagnostic
/// metrics as a `key=value` map joined with ';'.
#[derive(Serialize)]
struct CsvRecord<'a> {
    #[serde(rename = "name")]
    name: &'a str,
    #[serde(rename = "p_value")]
    p_value: f64,
    #[serde(rename = "passed")]
    passed: bool,
    #[serde(rename = "metrics")]
    metrics: String,
}

/// Write all results to `path` as CSV, one record per line.
pub fn write_csv(path: &Path, results: &[TestResult]) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to create the report file \"{}\"", path.display()))?;

    for result in results {
        let metrics = result
            .metrics()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";");

        writer
            .serialize(CsvRecord {
                name: result.test_name(),
                p_value: result.p_value(),
                passed: result.passed(),
                metrics,
            })
            .context("failed to write a report record")?;
    }

    writer.flush().context("failed to flush the report")?;
    Ok(())
}
