//! The ten SAM primitives and the registry that dispatches a mnemonic to
//! its function. SAMs that need the whole Observation (rather than the
//! extracted value) are flagged at registration time; the evaluator
//! consults that flag instead of sniffing the mnemonic name.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Verdict returned by every SAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
        }
    }
}

pub type Params = Map<String, Value>;
type SamFn = Arc<dyn Fn(&Value, &Params) -> Status + Send + Sync>;

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

fn safe_float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loinc_like(system: &str) -> bool {
    matches!(
        system.trim().to_lowercase().as_str(),
        "loinc" | "http://loinc.org" | "urn:oid:2.16.840.1.113883.6.1" | "ln"
    )
}

fn obs_first_loinc(obs: &Value) -> Option<String> {
    obs.get("code")?
        .get("coding")?
        .as_array()?
        .iter()
        .find_map(|c| {
            let sys = c.get("system").and_then(Value::as_str).unwrap_or("").to_lowercase();
            if sys.contains("loinc") || sys.contains("2.16.840.1.113883.6.1") {
                c.get("code").and_then(Value::as_str).map(str::to_string)
            } else {
                None
            }
        })
}

/// A coarse LOINC-class hint for the `by_class` plausibility fallback:
/// the code of the Observation's first `category` coding, if any.
fn obs_loinc_class_hint(obs: &Value) -> Option<String> {
    obs.get("category")?
        .as_array()?
        .iter()
        .find_map(|cat| cat.get("coding")?.as_array()?.iter().find_map(|c| c.get("code").and_then(Value::as_str).map(str::to_string)))
}

pub fn attr_is_populated(value: &Value, _params: &Params) -> Status {
    match value {
        Value::Null => Status::Fail,
        Value::String(s) if s.trim().is_empty() => Status::Fail,
        Value::Array(a) if a.is_empty() => Status::Fail,
        _ => Status::Pass,
    }
}

pub fn attr_is_numeric(value: &Value, _params: &Params) -> Status {
    let blank = matches!(value, Value::Null) || matches!(value, Value::String(s) if s.trim().is_empty());
    if blank {
        return Status::Skip;
    }
    if safe_float(value).is_some() {
        Status::Pass
    } else {
        Status::Fail
    }
}

pub fn attr_is_date(value: &Value, _params: &Params) -> Status {
    let blank = matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty());
    if blank {
        return Status::Skip;
    }
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if ISO_DATE_RE.is_match(&text) {
        Status::Pass
    } else {
        Status::Fail
    }
}

pub fn concept_has_code(value: &Value, _params: &Params) -> Status {
    match value {
        Value::Null => Status::Fail,
        Value::Object(map) if map.contains_key("coding") => {
            let ok = map
                .get("coding")
                .and_then(Value::as_array)
                .map(|codings| {
                    codings.iter().any(|c| {
                        c.get("code")
                            .and_then(Value::as_str)
                            .map(|s| !s.trim().is_empty())
                            .unwrap_or(false)
                    })
                })
                .unwrap_or(false);
            if ok { Status::Pass } else { Status::Fail }
        }
        Value::Object(map) => {
            let has = map
                .get("code")
                .and_then(Value::as_str)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if has { Status::Pass } else { Status::Fail }
        }
        _ => Status::Skip,
    }
}

fn coding_is_valid_member(coding: &Map<String, Value>, system_param: &str, allowed: &HashSet<String>) -> bool {
    let code = coding.get("code").and_then(Value::as_str).unwrap_or("").trim().to_uppercase();
    let system = coding.get("system").and_then(Value::as_str).unwrap_or("").trim().to_string();
    if system_param == "LOINC" && !loinc_like(&system) {
        return false;
    }
    if code.is_empty() {
        return false;
    }
    allowed.contains(&code)
}

fn concept_is_valid_member(value: &Value, params: &Params, value_sets: &HashMap<String, HashSet<String>>) -> Status {
    let system_param = params.get("system").and_then(Value::as_str).unwrap_or("").to_uppercase();
    let empty = HashSet::new();
    let allowed = value_sets.get(&system_param).unwrap_or(&empty);

    match value {
        Value::Object(map) if map.contains_key("coding") => {
            let any = map
                .get("coding")
                .and_then(Value::as_array)
                .map(|codings| {
                    codings
                        .iter()
                        .filter_map(Value::as_object)
                        .any(|c| coding_is_valid_member(c, &system_param, allowed))
                })
                .unwrap_or(false);
            if any { Status::Pass } else { Status::Fail }
        }
        Value::Object(map) => {
            if coding_is_valid_member(map, &system_param, allowed) {
                Status::Pass
            } else {
                Status::Fail
            }
        }
        _ => Status::Skip,
    }
}

pub fn observation_value_is_numeric(value: &Value, _params: &Params) -> Status {
    match value {
        Value::Null => Status::Skip,
        Value::Object(map) if map.contains_key("value") => {
            if safe_float(map.get("value").unwrap()).is_some() {
                Status::Pass
            } else {
                Status::Fail
            }
        }
        other => {
            if safe_float(other).is_some() {
                Status::Pass
            } else {
                Status::Fail
            }
        }
    }
}

pub fn range_value_is_complete(value: &Value, _params: &Params) -> Status {
    match value {
        Value::Object(map) => {
            let low = map.get("low").or_else(|| map.get("lowValue"));
            let high = map.get("high").or_else(|| map.get("highValue"));
            let present = |v: Option<&Value>| v.map(|v| !v.is_null()).unwrap_or(false);
            if present(low) && present(high) {
                Status::Pass
            } else {
                Status::Fail
            }
        }
        _ => Status::Skip,
    }
}

pub fn lab_result_value_is_plausible(obs: &Value, _params: &Params) -> Status {
    let loinc = obs
        .get("code")
        .and_then(|c| c.get("coding"))
        .and_then(Value::as_array)
        .map(|codings| {
            codings
                .iter()
                .any(|c| loinc_like(c.get("system").and_then(Value::as_str).unwrap_or("")))
        })
        .unwrap_or(false);
    if !loinc {
        return Status::Skip;
    }
    match obs.get("valueQuantity") {
        None | Some(Value::Null) => Status::Skip,
        Some(vq) => {
            if safe_float(vq.get("value").unwrap_or(&Value::Null)).is_some() {
                Status::Pass
            } else {
                Status::Fail
            }
        }
    }
}

fn observation_unit_allowed(obs: &Value, plausibility_cfg: &Value) -> Status {
    let vq = match obs.get("valueQuantity") {
        Some(Value::Object(m)) => m,
        _ => return Status::Skip,
    };
    let unit = vq.get("unit").and_then(Value::as_str).unwrap_or("").trim();
    if unit.is_empty() {
        return Status::Fail;
    }
    let allowed_units = |rec: &Value| -> HashSet<String> {
        rec.get("units")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    if let Some(code) = obs_first_loinc(obs) {
        if let Some(rec) = plausibility_cfg.get("by_loinc").and_then(|m| m.get(&code)) {
            return if allowed_units(rec).contains(unit) { Status::Pass } else { Status::Fail };
        }
    }
    if let Some(class) = obs_loinc_class_hint(obs) {
        if let Some(rec) = plausibility_cfg.get("by_class").and_then(|m| m.get(&class)) {
            return if allowed_units(rec).contains(unit) { Status::Pass } else { Status::Fail };
        }
    }
    Status::Skip
}

fn in_range(rec: &Value, val: f64) -> bool {
    let min = rec.get("min").and_then(Value::as_f64);
    let max = rec.get("max").and_then(Value::as_f64);
    if let Some(mn) = min {
        if val < mn {
            return false;
        }
    }
    if let Some(mx) = max {
        if val > mx {
            return false;
        }
    }
    true
}

fn observation_value_within_range(obs: &Value, plausibility_cfg: &Value) -> Status {
    let vq = match obs.get("valueQuantity") {
        Some(Value::Object(m)) if m.contains_key("value") => m,
        _ => return Status::Skip,
    };
    let val = match safe_float(vq.get("value").unwrap()) {
        Some(v) => v,
        None => return Status::Fail,
    };
    if let Some(code) = obs_first_loinc(obs) {
        if let Some(rec) = plausibility_cfg.get("by_loinc").and_then(|m| m.get(&code)) {
            return if in_range(rec, val) { Status::Pass } else { Status::Fail };
        }
    }
    if let Some(class) = obs_loinc_class_hint(obs) {
        if let Some(rec) = plausibility_cfg.get("by_class").and_then(|m| m.get(&class)) {
            return if in_range(rec, val) { Status::Pass } else { Status::Fail };
        }
    }
    Status::Skip
}

/// Registers the ten SAMs, binding value-set membership and the
/// plausibility config into the relevant closures at construction time
/// rather than threading them through every call's parameter map.
pub struct SamRegistry {
    funcs: HashMap<&'static str, SamFn>,
    whole_observation: HashSet<&'static str>,
}

impl SamRegistry {
    pub fn new(value_sets: HashMap<String, HashSet<String>>, plausibility_cfg: Value) -> Self {
        let value_sets = Arc::new(value_sets);
        let plausibility_cfg = Arc::new(plausibility_cfg);

        let mut funcs: HashMap<&'static str, SamFn> = HashMap::new();
        funcs.insert("Attr_IsPopulated", Arc::new(attr_is_populated));
        funcs.insert("Attr_IsNumeric", Arc::new(attr_is_numeric));
        funcs.insert("Attr_IsDate", Arc::new(attr_is_date));
        funcs.insert("Concept_HasCode", Arc::new(concept_has_code));
        funcs.insert(
            "Concept_IsValidMember",
            Arc::new({
                let value_sets = value_sets.clone();
                move |value: &Value, params: &Params| concept_is_valid_member(value, params, &value_sets)
            }),
        );
        funcs.insert("ObservationValue_IsNumeric", Arc::new(observation_value_is_numeric));
        funcs.insert("RangeValue_IsComplete", Arc::new(range_value_is_complete));
        funcs.insert("LabResult_ValueIsPlausible", Arc::new(lab_result_value_is_plausible));
        funcs.insert(
            "Observation_UnitAllowed",
            Arc::new({
                let cfg = plausibility_cfg.clone();
                move |obs: &Value, _params: &Params| observation_unit_allowed(obs, &cfg)
            }),
        );
        funcs.insert(
            "Observation_ValueWithinRange",
            Arc::new({
                let cfg = plausibility_cfg.clone();
                move |obs: &Value, _params: &Params| observation_value_within_range(obs, &cfg)
            }),
        );

        let whole_observation = HashSet::from([
            "LabResult_ValueIsPlausible",
            "Observation_UnitAllowed",
            "Observation_ValueWithinRange",
        ]);

        SamRegistry { funcs, whole_observation }
    }

    /// Dispatches `mnemonic` against `value` (or `resource`, for
    /// Observation-scoped SAMs). Unknown mnemonics resolve to SKIP.
    pub fn call(&self, mnemonic: &str, value: &Value, resource: &Value, params: &Params) -> Status {
        match self.funcs.get(mnemonic) {
            None => Status::Skip,
            Some(f) => {
                let input = if self.whole_observation.contains(mnemonic) { resource } else { value };
                f(input, params)
            }
        }
    }
}
