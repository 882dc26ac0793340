//! Limited JSON path walker used to pull values out of a FHIR resource for
//! SAM evaluation.

use serde_json::Value;

/// Dot-separated path segments, each optionally marked to fan out across a
/// list rather than returning it as a single value.
fn deep_get(obj: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut current = vec![obj.clone()];
    for part in path.split('.') {
        let star = part.ends_with('*');
        let key = if star { &part[..part.len() - 1] } else { part };
        let mut next = Vec::new();
        for node in &current {
            match node {
                Value::Object(map) => {
                    if let Some(val) = map.get(key) {
                        push_value(&mut next, val, star);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Value::Object(map) = item {
                            if let Some(val) = map.get(key) {
                                push_value(&mut next, val, star);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn push_value(out: &mut Vec<Value>, val: &Value, star: bool) {
    if star {
        if let Value::Array(items) = val {
            out.extend(items.iter().cloned());
            return;
        }
    }
    out.push(val.clone());
}

/// Extracts values for `path` on `resource`. Special-cases Observations'
/// literal `value[x]` path: returns whichever of `valueQuantity`,
/// `valueString`, `valueCodeableConcept`, `valueDateTime` are present, in
/// that priority order.
pub fn extract_value(resource: &Value, path: &str) -> Vec<Value> {
    if resource.get("resourceType").and_then(|t| t.as_str()) == Some("Observation") && path == "value[x]" {
        let mut out = Vec::new();
        for key in ["valueQuantity", "valueString", "valueCodeableConcept", "valueDateTime"] {
            if let Some(v) = resource.get(key) {
                out.push(v.clone());
            }
        }
        if out.is_empty() {
            out.push(Value::Null);
        }
        return out;
    }
    deep_get(resource, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_dot_path() {
        let res = json!({ "birthDate": "1980-01-01" });
        assert_eq!(deep_get(&res, "birthDate"), vec![json!("1980-01-01")]);
    }

    #[test]
    fn star_fans_out_list() {
        let res = json!({ "code": { "coding": [{"system": "a"}, {"system": "b"}] } });
        let out = deep_get(&res, "code.coding*.system");
        assert_eq!(out, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn non_star_list_returns_list_itself() {
        let res = json!({ "code": { "coding": [{"system": "a"}] } });
        let out = deep_get(&res, "code.coding");
        assert_eq!(out, vec![json!([{"system": "a"}])]);
    }

    #[test]
    fn missing_key_yields_empty() {
        let res = json!({ "x": 1 });
        assert_eq!(deep_get(&res, "y.z"), Vec::<Value>::new());
    }

    #[test]
    fn value_x_special_case_prefers_quantity() {
        let res = json!({
            "resourceType": "Observation",
            "valueString": "ignored",
            "valueQuantity": { "value": 5, "unit": "mg" },
        });
        let out = extract_value(&res, "value[x]");
        assert_eq!(out, vec![json!({ "value": 5, "unit": "mg" })]);
    }

    #[test]
    fn value_x_absent_yields_single_null() {
        let res = json!({ "resourceType": "Observation" });
        assert_eq!(extract_value(&res, "value[x]"), vec![Value::Null]);
    }
}
