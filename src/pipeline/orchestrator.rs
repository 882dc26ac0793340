//! Drives the end-to-end pipeline: file -> messages -> bundles -> scores ->
//! annotated bundles, with optional upload of each message bundle as a
//! transaction.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::fhir::bundle::convert_message_to_bundle;
use crate::hl7::lexer::split_messages;
use crate::hl7::Message;
use crate::piqi::{annotate, PIQIEvaluator};

use super::client::{Auth, FhirClient};

/// One message's worth of pipeline output, tagged for downstream
/// correlation the same way the orchestrator's NDJSON streams are tagged.
pub struct MessageOutcome {
    pub bundle: Value,
    pub score: Value,
    pub annotated_bundle: Value,
}

pub struct Orchestrator {
    evaluator: PIQIEvaluator,
    profile_name: String,
    src_endpoint: String,
    dst_endpoint: String,
    client: Option<FhirClient>,
}

impl Orchestrator {
    pub fn new(config: &AppConfig, evaluator: PIQIEvaluator, profile_name: String) -> Self {
        let client = config.fhir_base.clone().map(|base| {
            let auth = match (&config.fhir_bearer, &config.fhir_user, &config.fhir_pass) {
                (Some(token), _, _) => Auth::Bearer { token: token.clone() },
                (None, Some(user), Some(pass)) => Auth::Basic { user: user.clone(), pass: pass.clone() },
                _ => Auth::None,
            };
            FhirClient::new(base, auth)
        });

        Orchestrator {
            evaluator,
            profile_name,
            src_endpoint: config.src_endpoint.clone(),
            dst_endpoint: config.dst_endpoint.clone(),
            client,
        }
    }

    /// Processes every HL7 message in one input file, tagging bundle
    /// `meta.tag` and the score record the way a correlated NDJSON export
    /// requires.
    pub fn process_file(&self, path: &Path) -> Result<Vec<MessageOutcome>, PipelineError> {
        let raw = std::fs::read_to_string(path).or_else(|_| {
            let bytes = std::fs::read(path)?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&bytes).into_owned())
        })?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
        let mut outcomes = Vec::new();

        for (idx, raw_message) in split_messages(&raw).into_iter().enumerate() {
            let index = idx + 1;
            let message = match Message::parse(&raw_message) {
                Ok(m) => m,
                Err(e) => {
                    warn!("skipping unparseable message {index} in {file_name}: {e}");
                    continue;
                }
            };

            let (mut bundle, msg_type) = convert_message_to_bundle(&message, &self.src_endpoint, &self.dst_endpoint);
            debug!("built bundle for message {index} of {file_name} (type {msg_type})");

            tag_bundle(&mut bundle, &file_name, index, &msg_type);

            let result = self.evaluator.evaluate_bundle(&bundle, &self.profile_name);
            let mut score = serde_json::to_value(&result).map_err(|e| anyhow::anyhow!(e))?;
            stamp_score(&mut score, &file_name, index, &msg_type, &self.profile_name);
            info!(
                "scored message {index} of {file_name}: piqiIndex={:?}",
                score.get("piqiIndex")
            );

            let annotated_bundle = {
                let mut clone = bundle.clone();
                let obs = annotate::build_piqi_observation(&result, &clone, Some(self.profile_name.as_str()));
                clone
                    .as_object_mut()
                    .unwrap()
                    .entry("entry")
                    .or_insert_with(|| json!([]))
                    .as_array_mut()
                    .unwrap()
                    .push(json!({ "resource": obs }));
                clone
            };

            outcomes.push(MessageOutcome { bundle, score, annotated_bundle });
        }

        Ok(outcomes)
    }

    /// Uploads every bundle in `outcomes` as a transaction, if a FHIR base
    /// was configured. Each upload is independent; a failed upload is
    /// logged and does not stop the remaining uploads.
    pub async fn upload_all(&self, outcomes: &[MessageOutcome]) {
        let Some(client) = &self.client else { return };
        for outcome in outcomes {
            match client.upload(&outcome.bundle).await {
                Ok(resp) => info!("uploaded bundle, status={}", resp.status),
                Err(e) => warn!("upload failed: {e}"),
            }
        }
    }
}

fn tag_bundle(bundle: &mut Value, file_name: &str, index: usize, msg_type: &str) {
    let obj = bundle.as_object_mut().expect("bundle is an object");
    let meta = obj.entry("meta".to_string()).or_insert_with(|| json!({}));
    let tags = meta.as_object_mut().unwrap().entry("tag".to_string()).or_insert_with(|| json!([]));
    let tags = tags.as_array_mut().unwrap();
    tags.push(json!({ "system": "http://example.org/piqitt", "code": "source-hl7-file", "display": file_name }));
    tags.push(json!({ "system": "http://example.org/piqitt", "code": "source-hl7-index", "display": index.to_string() }));
    tags.push(json!({ "system": "http://example.org/piqitt", "code": "hl7-msg-type", "display": msg_type }));
}

fn stamp_score(score: &mut Value, file_name: &str, index: usize, msg_type: &str, profile_name: &str) {
    let obj = score.as_object_mut().expect("score is an object");
    obj.insert("_source_file".to_string(), json!(file_name));
    obj.insert("_source_index".to_string(), json!(index));
    obj.insert("_hl7_msg_type".to_string(), json!(msg_type));
    obj.insert("_profile_name".to_string(), json!(profile_name));
}

/// Appends each JSON value to `path` as one line, creating parent
/// directories as needed.
pub fn write_ndjson_values(values: &[Value], path: &PathBuf) -> Result<(), PipelineError> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    for v in values {
        writeln!(file, "{}", serde_json::to_string(v).map_err(|e| anyhow::anyhow!(e))?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piqi::profile::{load_profile, load_sam_library};
    use std::collections::{HashMap, HashSet};
    use std::io::Write as _;

    fn evaluator() -> (PIQIEvaluator, String) {
        let sams = r#"
sams:
  - mnemonic: Attr_IsPopulated
    dimension: Availability.Unpopulated
    entity_type: SimpleAttribute
"#;
        let profile = r#"
profile:
  name: basic
  steps:
    - id: s1
      resource: Patient
      path: id
      sam: Attr_IsPopulated
"#;
        let sam_defs = load_sam_library(sams, "sams.yaml").unwrap();
        let (name, steps) = load_profile(profile, "profile.yaml").unwrap();
        let mut profiles = HashMap::new();
        profiles.insert(name.clone(), steps);
        (PIQIEvaluator::new(sam_defs, profiles, HashSet::new(), HashSet::new(), json!({})), name)
    }

    #[test]
    fn process_file_scores_each_message_and_tags_bundle() {
        let (eval, profile_name) = evaluator();
        let config = AppConfig::default();
        let orchestrator = Orchestrator::new(&config, eval, profile_name);

        let hl7 = "MSH|^~\\&|SEND|FAC|RECV|FAC|20230101000000||ADT^A01|1|P|2.3\rPID|1||12345^^^HOSP||DOE^JOHN||19800101|M\r";
        let mut path = std::env::temp_dir();
        path.push(format!("orchestrator-test-{}.hl7", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(hl7.as_bytes()).unwrap();

        let outcomes = orchestrator.process_file(&path).unwrap();
        assert_eq!(outcomes.len(), 1);
        let tags = outcomes[0].bundle["meta"]["tag"].as_array().unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(outcomes[0].score["_hl7_msg_type"], "ADT^A01");
        assert!(outcomes[0].annotated_bundle["entry"].as_array().unwrap().len()
            > outcomes[0].bundle["entry"].as_array().unwrap().len());

        std::fs::remove_file(&path).ok();
    }
}
