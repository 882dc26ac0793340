//! Loads the plausible-range configuration consulted by
//! `LabResult_ValueIsPlausible` and `Observation_ValueWithinRange`.

use std::path::Path;

use serde_json::{json, Value};

use crate::error::ConfigError;

/// Parses a `{by_loinc, by_class}` shaped YAML document into a JSON value.
/// A missing file yields both maps empty rather than an error — plausibility
/// checking is best-effort, not a hard prerequisite.
pub fn load_plausibility_yaml(path: &Path) -> Result<Value, ConfigError> {
    if !path.exists() {
        return Ok(json!({ "by_loinc": {}, "by_class": {} }));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    let data: Value = serde_yaml::from_str(&text)
        .map_err(|source| ConfigError::Yaml { path: path.display().to_string(), source })?;
    let by_loinc = data.get("by_loinc").cloned().unwrap_or_else(|| json!({}));
    let by_class = data.get("by_class").cloned().unwrap_or_else(|| json!({}));
    Ok(json!({ "by_loinc": by_loinc, "by_class": by_class }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_maps() {
        let cfg = load_plausibility_yaml(Path::new("/nonexistent/plausibility.yaml")).unwrap();
        assert_eq!(cfg["by_loinc"], json!({}));
        assert_eq!(cfg["by_class"], json!({}));
    }

    #[test]
    fn parses_by_loinc_ranges() {
        let mut path = std::env::temp_dir();
        path.push(format!("piqi-plausibility-{}.yaml", std::process::id()));
        std::fs::write(&path, "by_loinc:\n  '8480-6':\n    min: 40\n    max: 300\nby_class: {}\n").unwrap();
        let cfg = load_plausibility_yaml(&path).unwrap();
        assert_eq!(cfg["by_loinc"]["8480-6"]["min"], 40);
        std::fs::remove_file(&path).ok();
    }
}
