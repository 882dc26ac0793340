//! Small shared mappings used by several builders: gender codes and the
//! Coded Element (`code^text^system`) to FHIR CodeableConcept mapping.

use serde_json::{json, Value};

use crate::hl7::accessor::comp;

/// PID-8 administrative sex -> FHIR `AdministrativeGender`.
pub fn to_gender(raw: &str) -> &'static str {
    match raw.trim().to_uppercase().as_str() {
        "M" => "male",
        "F" => "female",
        "O" => "other",
        "U" => "unknown",
        _ => "unknown",
    }
}

/// Maps a `code^text^system` CE field to a FHIR CodeableConcept. `LN`/`LOINC`
/// resolve to `http://loinc.org`; any other non-empty system becomes
/// `urn:hl7v2:<system>`; an empty system falls back to the bare `urn:hl7v2`.
/// An empty code yields `{}`, or `{"text": ...}` when text alone is present.
pub fn codeable_concept_from_ce(ce_field: &str) -> Value {
    let code = comp(ce_field, 1);
    let text = comp(ce_field, 2);
    let system = comp(ce_field, 3);

    if code.is_empty() {
        return if text.is_empty() {
            json!({})
        } else {
            json!({ "text": text })
        };
    }

    let system_uri = if !system.is_empty() && matches!(system.to_uppercase().as_str(), "LN" | "LOINC") {
        "http://loinc.org".to_string()
    } else if !system.is_empty() {
        format!("urn:hl7v2:{system}")
    } else {
        "urn:hl7v2".to_string()
    };

    let mut coding = json!({
        "system": system_uri,
        "code": code,
    });
    if !text.is_empty() {
        coding["display"] = json!(text);
    }

    json!({ "coding": [coding] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("M", "male")]
    #[case("f", "female")]
    #[case("O", "other")]
    #[case("U", "unknown")]
    #[case("X", "unknown")]
    #[case("", "unknown")]
    fn gender_maps_known_codes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(to_gender(raw), expected);
    }

    #[test]
    fn loinc_system_maps_to_loinc_org() {
        let cc = codeable_concept_from_ce("8480-6^Systolic BP^LN");
        assert_eq!(cc["coding"][0]["system"], "http://loinc.org");
        assert_eq!(cc["coding"][0]["code"], "8480-6");
        assert_eq!(cc["coding"][0]["display"], "Systolic BP");
    }

    #[test]
    fn other_system_maps_to_urn_hl7v2() {
        let cc = codeable_concept_from_ce("71045^Chest X-ray^CPT");
        assert_eq!(cc["coding"][0]["system"], "urn:hl7v2:CPT");
    }

    #[test]
    fn empty_system_maps_to_bare_urn() {
        let cc = codeable_concept_from_ce("X123^Something^");
        assert_eq!(cc["coding"][0]["system"], "urn:hl7v2");
    }

    #[test]
    fn empty_code_with_text_yields_text_only() {
        let cc = codeable_concept_from_ce("^Observation only^");
        assert_eq!(cc, json!({"text": "Observation only"}));
    }

    #[test]
    fn fully_empty_yields_empty_object() {
        assert_eq!(codeable_concept_from_ce(""), json!({}));
    }
}
