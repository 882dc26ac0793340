//! Reduces a stream of scored messages into one summary row per bundle, and
//! writes that summary as NDJSON/CSV.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::PipelineError;

/// One row of the derived scorecard summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub source_file: Option<String>,
    pub source_index: Option<i64>,
    pub hl7_msg_type: Option<String>,
    pub profile_name: Option<String>,
    #[serde(rename = "piqiIndex")]
    pub piqi_index: f64,
    #[serde(rename = "piqiWeightedIndex")]
    pub piqi_weighted_index: f64,
    pub numerator: i64,
    pub denominator: i64,
    #[serde(rename = "criticalFailureCount")]
    pub critical_failure_count: i64,
    pub detail_pass: i64,
    pub detail_fail: i64,
    pub detail_skip: i64,
    pub detail_critical_fail: i64,
}

fn safe_f64(v: Option<&Value>) -> f64 {
    v.and_then(Value::as_f64).unwrap_or(0.0)
}

fn safe_i64(v: Option<&Value>) -> i64 {
    v.and_then(Value::as_i64).unwrap_or(0)
}

/// Tallies pass/fail/skip/critical-fail counts from a scored message's
/// `details` array.
fn count_details(details: Option<&Value>) -> (i64, i64, i64, i64) {
    let mut pass = 0;
    let mut fail = 0;
    let mut skip = 0;
    let mut critical_fail = 0;

    let Some(Value::Array(items)) = details else {
        return (pass, fail, skip, critical_fail);
    };

    for item in items {
        let status = item.get("status").and_then(Value::as_str).unwrap_or("").to_uppercase();
        let severity = item.get("severity").and_then(Value::as_str).unwrap_or("").to_lowercase();
        match status.as_str() {
            "PASS" => pass += 1,
            "FAIL" => {
                fail += 1;
                if severity == "critical" {
                    critical_fail += 1;
                }
            }
            "SKIP" => skip += 1,
            _ => {}
        }
    }
    (pass, fail, skip, critical_fail)
}

/// Reduces each scored message (a full evaluation result plus the tag fields
/// the orchestrator stamps on it: `_source_file`, `_source_index`,
/// `_hl7_msg_type`, `_profile_name`) into one summary row.
pub fn summarize(scores: &[Value]) -> Vec<SummaryRow> {
    scores
        .iter()
        .map(|s| {
            let (detail_pass, detail_fail, detail_skip, detail_critical_fail) = count_details(s.get("details"));
            SummaryRow {
                source_file: s.get("_source_file").and_then(Value::as_str).map(str::to_string),
                source_index: s.get("_source_index").and_then(Value::as_i64),
                hl7_msg_type: s.get("_hl7_msg_type").and_then(Value::as_str).map(str::to_string),
                profile_name: s.get("_profile_name").and_then(Value::as_str).map(str::to_string),
                piqi_index: safe_f64(s.get("piqiIndex")),
                piqi_weighted_index: safe_f64(s.get("piqiWeightedIndex")),
                numerator: safe_i64(s.get("numerator")),
                denominator: safe_i64(s.get("denominator")),
                critical_failure_count: safe_i64(s.get("criticalFailureCount")),
                detail_pass,
                detail_fail,
                detail_skip,
                detail_critical_fail,
            }
        })
        .collect()
}

/// Writes each row as one JSON object per line.
pub fn write_ndjson(rows: &[SummaryRow], path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    for row in rows {
        let line = serde_json::to_string(row).map_err(|e| anyhow::anyhow!(e))?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Writes the summary as a CSV with a header row, empty if `rows` is empty.
pub fn write_csv(rows: &[SummaryRow], path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if rows.is_empty() {
        std::fs::write(path, "")?;
        return Ok(());
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| anyhow::anyhow!(e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| anyhow::anyhow!(e))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarizes_details_into_counts() {
        let scores = vec![json!({
            "_source_file": "a.hl7",
            "_source_index": 0,
            "_hl7_msg_type": "ORU^R01",
            "_profile_name": "basic",
            "piqiIndex": 66.67,
            "piqiWeightedIndex": 70.0,
            "numerator": 2,
            "denominator": 3,
            "criticalFailureCount": 1,
            "details": [
                { "status": "PASS", "severity": "standard" },
                { "status": "FAIL", "severity": "critical" },
                { "status": "SKIP", "severity": "standard" },
            ],
        })];
        let rows = summarize(&scores);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.detail_pass, 1);
        assert_eq!(row.detail_fail, 1);
        assert_eq!(row.detail_skip, 1);
        assert_eq!(row.detail_critical_fail, 1);
        assert_eq!(row.piqi_index, 66.67);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let rows = summarize(&[json!({})]);
        assert_eq!(rows[0].numerator, 0);
        assert_eq!(rows[0].piqi_index, 0.0);
        assert!(rows[0].source_file.is_none());
    }
}
