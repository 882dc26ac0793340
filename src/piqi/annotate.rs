//! Turns an evaluation result back into a FHIR Observation that can be
//! appended to the scored bundle, plus the human-readable value preview
//! used in evaluation details.

use serde_json::{json, Map, Value};

use crate::fhir::ids::new_id;

use super::evaluator::EvalResult;

fn trunc(s: &str, max_len: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let keep = max_len.saturating_sub(3);
        let truncated: String = s.chars().take(keep).collect();
        format!("{truncated}...")
    }
}

/// Produces a concise human-readable preview of a SAM's evaluated value:
/// primitives print as-is, Quantity/Coding/CodeableConcept/Range shapes get
/// their own rendering, lists preview their first few items.
pub fn value_preview(value: &Value, max_len: usize) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(trunc(&n.to_string(), max_len)),
        Value::String(s) => Some(trunc(s, max_len)),
        Value::Bool(b) => Some(trunc(&b.to_string(), max_len)),
        Value::Object(map) => object_preview(map, max_len),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .take(3)
                .filter_map(|item| value_preview(item, max_len / 3))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(trunc(&parts.join("; "), max_len))
            }
        }
    }
}

fn object_preview(map: &Map<String, Value>, max_len: usize) -> Option<String> {
    if map.contains_key("value") && (map.contains_key("unit") || map.contains_key("code") || map.contains_key("system"))
    {
        let v = map.get("value").cloned().unwrap_or(Value::Null);
        let v_str = match &v {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let unit = map
            .get("unit")
            .and_then(Value::as_str)
            .or_else(|| map.get("code").and_then(Value::as_str))
            .unwrap_or("");
        return Some(trunc(format!("{v_str} {unit}").trim(), max_len));
    }

    if map.contains_key("code") || map.contains_key("system") {
        let code = map.get("code").and_then(Value::as_str).unwrap_or("").trim();
        let system = map.get("system").and_then(Value::as_str).unwrap_or("").trim();
        let display = map.get("display").and_then(Value::as_str).unwrap_or("").trim();
        let base = if !code.is_empty() || !system.is_empty() {
            format!("{code}|{system}")
        } else {
            display.to_string()
        };
        let text = if !display.is_empty() && base != display {
            format!("{base} ({display})")
        } else {
            base
        };
        return Some(trunc(&text, max_len));
    }

    if let Some(Value::Array(codings)) = map.get("coding") {
        if let Some(Value::Object(first)) = codings.first() {
            return object_preview(first, max_len);
        }
        return map.get("text").and_then(Value::as_str).map(|t| trunc(t, max_len));
    }

    let low = map.get("low").or_else(|| map.get("lowValue"));
    let high = map.get("high").or_else(|| map.get("highValue"));
    if low.is_some() || high.is_some() {
        let qv = |q: Option<&Value>| -> String {
            match q {
                Some(Value::Object(qm)) if qm.contains_key("value") => {
                    let v = qm.get("value").cloned().unwrap_or(Value::Null);
                    let unit = qm.get("unit").and_then(Value::as_str).unwrap_or("");
                    format!("{v} {unit}").trim().to_string()
                }
                Some(other) => other.to_string(),
                None => "None".to_string(),
            }
        };
        return Some(trunc(&format!("{} - {}", qv(low), qv(high)), max_len));
    }

    for key in ["valueString", "valueDateTime"] {
        if let Some(v) = map.get(key) {
            return Some(trunc(&v.to_string(), max_len));
        }
    }
    if let Some(v) = map.get("valueQuantity") {
        return value_preview(v, max_len);
    }
    if let Some(v) = map.get("valueCodeableConcept") {
        return value_preview(v, max_len);
    }

    serde_json::to_string(map).ok().map(|s| trunc(&s, max_len))
}

/// Builds a FHIR Observation carrying the PIQI scorecard for one message
/// bundle: index as `valueQuantity`, per-step counters as `component`s.
pub fn build_piqi_observation(result: &EvalResult, bundle: &Value, profile_name: Option<&str>) -> Value {
    let entries = bundle.get("entry").and_then(Value::as_array).cloned().unwrap_or_default();

    let mut patient_id: Option<String> = None;
    let mut msg_header_id: Option<String> = None;
    let mut msg_timestamp: Option<String> = None;

    for entry in &entries {
        let Some(resource) = entry.get("resource") else { continue };
        let rtype = resource.get("resourceType").and_then(Value::as_str);
        if rtype == Some("Patient") && patient_id.is_none() {
            patient_id = resource.get("id").and_then(Value::as_str).map(str::to_string);
        }
        if rtype == Some("MessageHeader") && msg_header_id.is_none() {
            msg_header_id = resource.get("id").and_then(Value::as_str).map(str::to_string);
            // MessageHeader carries no `timestamp` field in this crate's bundles (spec.md
            // §4.C); `meta.lastUpdated` is FHIR's real analogue, kept for forward
            // compatibility with an upstream annotator that populates one.
            msg_timestamp =
                resource.get("meta").and_then(|m| m.get("lastUpdated")).and_then(Value::as_str).map(str::to_string);
        }
    }

    let effective = msg_timestamp.unwrap_or_else(|| {
        let now = chrono::Utc::now();
        now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    });

    let mut obs = json!({
        "resourceType": "Observation",
        "id": new_id("piqi"),
        "status": "final",
        "category": [{
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/observation-category",
                "code": "quality",
                "display": "Data Quality",
            }],
        }],
        "code": {
            "coding": [{
                "system": "http://example.org/piqi/code-system",
                "code": "PIQI-INDEX",
                "display": "PIQI data quality index",
            }],
            "text": "PIQI data quality index",
        },
        "effectiveDateTime": effective,
        "valueQuantity": {
            "value": result.piqi_index,
            "unit": "%",
            "system": "http://unitsofmeasure.org",
            "code": "%",
        },
        "component": [],
    });

    let obj = obs.as_object_mut().expect("object literal");

    if let Some(pid) = &patient_id {
        obj.insert("subject".to_string(), json!({ "reference": format!("Patient/{pid}") }));
    }
    if let Some(hid) = &msg_header_id {
        obj.entry("extension".to_string()).or_insert_with(|| json!([])).as_array_mut().unwrap().push(json!({
            "url": "http://example.org/piqi/StructureDefinition/sourceMessage",
            "valueReference": { "reference": format!("MessageHeader/{hid}") },
        }));
    }
    if let Some(msg_id) = &result.message_id {
        obj.entry("identifier".to_string()).or_insert_with(|| json!([])).as_array_mut().unwrap().push(json!({
            "system": "http://example.org/piqi/message-id",
            "value": msg_id,
        }));
    }
    if let Some(name) = profile_name {
        obj.entry("extension".to_string()).or_insert_with(|| json!([])).as_array_mut().unwrap().push(json!({
            "url": "http://example.org/piqi/StructureDefinition/profile-name",
            "valueString": name,
        }));
    }

    let components = obj.get_mut("component").unwrap().as_array_mut().unwrap();
    components.push(component("PIQI-NUM", "PIQI numerator", json!(result.numerator), false));
    components.push(component("PIQI-DEN", "PIQI denominator", json!(result.denominator), false));
    components.push(component("PIQI-WNUM", "Weighted numerator", json!(result.weighted_numerator as i64), false));
    components.push(component("PIQI-WDEN", "Weighted denominator", json!(result.weighted_denominator as i64), false));
    if let Some(w) = result.piqi_weighted_index {
        components.push(component("PIQI-WINDEX", "PIQI weighted index", json!(w), true));
    }
    components.push(component(
        "PIQI-CRIT-FAIL",
        "Critical failure count",
        json!(result.critical_failure_count),
        false,
    ));

    obs
}

fn component(code: &str, display: &str, value: Value, as_quantity: bool) -> Value {
    let mut comp = json!({
        "code": {
            "coding": [{
                "system": "http://example.org/piqi/code-system",
                "code": code,
                "display": display,
            }],
        },
    });
    let obj = comp.as_object_mut().unwrap();
    if as_quantity {
        obj.insert(
            "valueQuantity".to_string(),
            json!({ "value": value, "unit": "%", "system": "http://unitsofmeasure.org", "code": "%" }),
        );
    } else {
        obj.insert("valueInteger".to_string(), value);
    }
    comp
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preview_quantity() {
        let v = json!({ "value": 5, "unit": "mg" });
        assert_eq!(value_preview(&v, 120), Some("5 mg".to_string()));
    }

    #[test]
    fn preview_coding_with_display() {
        let v = json!({ "code": "8480-6", "system": "http://loinc.org", "display": "Systolic BP" });
        assert_eq!(value_preview(&v, 120), Some("8480-6|http://loinc.org (Systolic BP)".to_string()));
    }

    #[test]
    fn preview_codeable_concept_uses_first_coding() {
        let v = json!({ "coding": [{ "code": "X", "system": "sys" }], "text": "ignored" });
        assert_eq!(value_preview(&v, 120), Some("X|sys".to_string()));
    }

    #[test]
    fn preview_truncates_long_strings() {
        let v = json!("a".repeat(200));
        let out = value_preview(&v, 120).unwrap();
        assert_eq!(out.chars().count(), 120);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn preview_list_joins_first_three() {
        let v = json!(["a", "b", "c", "d"]);
        assert_eq!(value_preview(&v, 30), Some("a; b; c".to_string()));
    }

    #[test]
    fn build_piqi_observation_has_index_and_components() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "pat-1" } },
                { "resource": { "resourceType": "MessageHeader", "id": "msg-1", "meta": { "lastUpdated": "2024-01-01T00:00:00Z" } } },
            ],
        });
        let result = EvalResult {
            message_id: Some("msg-1".to_string()),
            sending_facility: None,
            piqi_index: Some(75.0),
            piqi_weighted_index: Some(80.0),
            numerator: 3,
            denominator: 4,
            weighted_numerator: 8.0,
            weighted_denominator: 10.0,
            critical_failure_count: 1,
            details: vec![],
        };
        let obs = build_piqi_observation(&result, &bundle, Some("basic"));
        assert_eq!(obs["resourceType"], "Observation");
        assert_eq!(obs["valueQuantity"]["value"], 75.0);
        assert_eq!(obs["subject"]["reference"], "Patient/pat-1");
        assert_eq!(obs["effectiveDateTime"], "2024-01-01T00:00:00Z");
        assert_eq!(obs["component"].as_array().unwrap().len(), 5);
    }
}
