//! Executes an evaluation profile against a bundle and produces the scored
//! result with per-step drill-down details.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use super::annotate::value_preview;
use super::extractor::extract_value;
use super::profile::{sam_spec_or_unknown, Condition, SamSpec, StepSpec};
use super::registry::{Params, SamRegistry, Status};

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// One step's verdict against one (resource, fanned-out value) pair.
#[derive(Debug, Clone, Serialize)]
pub struct Detail {
    #[serde(rename = "stepId")]
    pub step_id: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "resourceId")]
    pub resource_id: Option<String>,
    pub path: String,
    pub sam: String,
    pub status: &'static str,
    pub dimension: String,
    pub mnemonic: String,
    pub entity_type: String,
    pub prerequisite: Option<String>,
    pub severity: &'static str,
    pub values: Value,
    #[serde(rename = "valuePreview")]
    pub value_preview: Option<String>,
}

/// Scored outcome of evaluating one bundle against one profile.
#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
    #[serde(rename = "sendingFacility")]
    pub sending_facility: Option<String>,
    #[serde(rename = "piqiIndex")]
    pub piqi_index: Option<f64>,
    #[serde(rename = "piqiWeightedIndex")]
    pub piqi_weighted_index: Option<f64>,
    pub numerator: i64,
    pub denominator: i64,
    #[serde(rename = "weightedNumerator")]
    pub weighted_numerator: f64,
    #[serde(rename = "weightedDenominator")]
    pub weighted_denominator: f64,
    #[serde(rename = "criticalFailureCount")]
    pub critical_failure_count: i64,
    pub details: Vec<Detail>,
}

pub struct PIQIEvaluator {
    sam_defs: HashMap<String, SamSpec>,
    profiles: HashMap<String, Vec<StepSpec>>,
    registry: SamRegistry,
}

impl PIQIEvaluator {
    pub fn new(
        sam_defs: HashMap<String, SamSpec>,
        profiles: HashMap<String, Vec<StepSpec>>,
        loinc_codes: HashSet<String>,
        cpt_codes: HashSet<String>,
        plausibility_cfg: Value,
    ) -> Self {
        let mut value_sets = HashMap::new();
        value_sets.insert("LOINC".to_string(), loinc_codes);
        value_sets.insert("CPT".to_string(), cpt_codes);

        PIQIEvaluator {
            sam_defs,
            profiles,
            registry: SamRegistry::new(value_sets, plausibility_cfg),
        }
    }

    fn run_sam(&self, mnemonic: &str, value: &Value, resource: &Value, params: &Params) -> Status {
        self.registry.call(mnemonic, value, resource, params)
    }

    fn mk_detail(&self, step: &StepSpec, resource: &Value, value: &Value, sam: &str, status: Status) -> Detail {
        let sam_def = sam_spec_or_unknown(&self.sam_defs, sam);
        Detail {
            step_id: step.id.clone(),
            resource_type: resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            resource_id: resource.get("id").and_then(Value::as_str).map(str::to_string),
            path: step.path.clone(),
            sam: sam.to_string(),
            status: status.as_str(),
            dimension: sam_def.dimension,
            mnemonic: sam_def.mnemonic,
            entity_type: sam_def.entity_type,
            prerequisite: sam_def.prereq,
            severity: if step.critical { "critical" } else { "standard" },
            values: value.clone(),
            value_preview: value_preview(value, 120),
        }
    }

    fn eval_condition(&self, cond: &Condition, resource: &Value, path: &str) -> Status {
        let value = extract_value(resource, path).into_iter().next().unwrap_or(Value::Null);
        self.run_sam(&cond.sam, &value, resource, &cond.params)
    }

    /// Evaluates `bundle` against the named profile, returning the full
    /// scored result. An unregistered profile name evaluates as zero steps.
    pub fn evaluate_bundle(&self, bundle: &Value, profile_name: &str) -> EvalResult {
        let steps = self.profiles.get(profile_name).cloned().unwrap_or_default();

        let mut by_type: HashMap<String, Vec<Value>> = HashMap::new();
        for entry in bundle.get("entry").and_then(Value::as_array).into_iter().flatten() {
            if let Some(resource) = entry.get("resource") {
                let rtype = resource.get("resourceType").and_then(Value::as_str).unwrap_or("Unknown");
                by_type.entry(rtype.to_string()).or_default().push(resource.clone());
            }
        }

        let message_header = by_type.get("MessageHeader").and_then(|v| v.first());
        let message_id = message_header.and_then(|mh| mh.get("id")).and_then(Value::as_str).map(str::to_string);
        let sending_facility = message_header
            .and_then(|mh| mh.get("source"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut numerator = 0i64;
        let mut denominator = 0i64;
        let mut weighted_numerator = 0.0f64;
        let mut weighted_denominator = 0.0f64;
        let mut critical_failure_count = 0i64;
        let mut details = Vec::new();

        for step in &steps {
            let resources = match by_type.get(&step.resource) {
                Some(r) if !r.is_empty() => r,
                _ => continue,
            };

            for resource in resources {
                if let Some(cond) = &step.condition {
                    if self.eval_condition(cond, resource, &step.path) != Status::Pass {
                        continue;
                    }
                }

                let mut values = extract_value(resource, &step.path);
                if values.is_empty() {
                    values.push(Value::Null);
                }

                for value in &values {
                    if let Some(prereq) = self.sam_defs.get(&step.sam).and_then(|s| s.prereq.clone()) {
                        let prereq_status = self.run_sam(&prereq, value, resource, &step.params);
                        match prereq_status {
                            Status::Skip => continue,
                            Status::Fail => {
                                denominator += 1;
                                weighted_denominator += step.weight;
                                if step.is_scoring() {
                                    details.push(self.mk_detail(step, resource, value, &prereq, Status::Fail));
                                    if step.critical {
                                        critical_failure_count += 1;
                                    }
                                }
                                continue;
                            }
                            Status::Pass => {}
                        }
                    }

                    let status = self.run_sam(&step.sam, value, resource, &step.params);
                    if status == Status::Skip {
                        if step.is_scoring() {
                            details.push(self.mk_detail(step, resource, value, &step.sam, Status::Skip));
                        }
                        continue;
                    }

                    denominator += 1;
                    weighted_denominator += step.weight;
                    if status == Status::Pass {
                        numerator += 1;
                        weighted_numerator += step.weight;
                    }
                    if step.is_scoring() {
                        details.push(self.mk_detail(step, resource, value, &step.sam, status));
                        if step.critical && status == Status::Fail {
                            critical_failure_count += 1;
                        }
                    }
                }
            }
        }

        let piqi_index = if denominator > 0 {
            Some(round2(100.0 * numerator as f64 / denominator as f64))
        } else {
            None
        };
        let piqi_weighted_index = if weighted_denominator > 0.0 {
            Some(round2(100.0 * weighted_numerator / weighted_denominator))
        } else {
            None
        };

        EvalResult {
            message_id,
            sending_facility,
            piqi_index,
            piqi_weighted_index,
            numerator,
            denominator,
            weighted_numerator,
            weighted_denominator,
            critical_failure_count,
            details,
        }
    }
}
