//! Loads reference code lists (LOINC, CPT) used by the `Concept_IsValidMember`
//! SAM, from CSV files with a best-effort header sniff.

use std::collections::HashSet;
use std::path::Path;

use crate::error::ConfigError;

fn load_codes(path: &Path, header_candidates: &[&str]) -> Result<HashSet<String>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ConfigError::Csv { path: path.display().to_string(), source })?;

    let headers = reader
        .headers()
        .map_err(|source| ConfigError::Csv { path: path.display().to_string(), source })?
        .clone();

    let col = headers
        .iter()
        .position(|h| header_candidates.contains(&h.to_lowercase().as_str()))
        .unwrap_or(0);

    let mut codes = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(|source| ConfigError::Csv { path: path.display().to_string(), source })?;
        if let Some(raw) = record.get(col) {
            let code = raw.trim().to_uppercase();
            if !code.is_empty() {
                codes.insert(code);
            }
        }
    }
    Ok(codes)
}

/// Loads a LOINC code list from a CSV/TSV file, accepting `loinc_num`,
/// `loinc`, or `code` as the code column header (falling back to the first
/// column). Returns an empty set if the file does not exist.
pub fn load_loinc_codes_from_csv(path: &Path) -> Result<HashSet<String>, ConfigError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    load_codes(path, &["loinc_num", "loinc", "code"])
}

/// Loads a CPT code list, accepting `code`, `cpt`, `cpt code`, or `cpt_code`
/// as the code column header. Returns an empty set if the file does not
/// exist.
pub fn load_cpt_codes_from_csv(path: &Path) -> Result<HashSet<String>, ConfigError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    load_codes(path, &["code", "cpt", "cpt code", "cpt_code"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_empty_set() {
        let codes = load_loinc_codes_from_csv(Path::new("/nonexistent/loinc.csv")).unwrap();
        assert!(codes.is_empty());
    }

    #[test]
    fn loads_loinc_column_by_header_name() {
        let mut f = tempfile_csv("loinc_num,component\n8480-6,Systolic BP\n8462-4,Diastolic BP\n");
        let codes = load_loinc_codes_from_csv(f.path()).unwrap();
        assert!(codes.contains("8480-6"));
        assert!(codes.contains("8462-4"));
        f.flush().ok();
    }

    #[test]
    fn loads_cpt_falls_back_to_first_column() {
        let f = tempfile_csv("id,desc\n99213,Office visit\n");
        let codes = load_cpt_codes_from_csv(f.path()).unwrap();
        assert!(codes.contains("99213"));
    }

    fn tempfile_csv(contents: &str) -> tempfile_shim::NamedTempFile {
        tempfile_shim::NamedTempFile::new(contents)
    }

    mod tempfile_shim {
        use std::fs::File;
        use std::io::Write;
        use std::path::{Path, PathBuf};

        pub struct NamedTempFile {
            path: PathBuf,
        }

        impl NamedTempFile {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("piqi-test-{}.csv", std::process::id()));
                let mut f = File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                NamedTempFile { path }
            }

            pub fn path(&self) -> &Path {
                &self.path
            }

            pub fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl Drop for NamedTempFile {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
