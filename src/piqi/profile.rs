//! Declarative configuration: SAM library definitions and evaluation
//! profiles, both parsed from YAML documents.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::piqi::registry::Params;

fn default_exec_type() -> String {
    "Primitive_Logic".to_string()
}

/// One entry in a SAM library: the declared contract of a mnemonic.
#[derive(Debug, Clone, Deserialize)]
pub struct SamSpec {
    pub mnemonic: String,
    #[serde(default)]
    pub dimension: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, rename = "prerequisite")]
    pub prereq: Option<String>,
    #[serde(default = "default_exec_type")]
    pub exec_type: String,
    #[serde(default)]
    pub params_schema: Option<Value>,
}

impl SamSpec {
    fn unknown(mnemonic: &str) -> Self {
        SamSpec {
            mnemonic: mnemonic.to_string(),
            dimension: String::new(),
            entity_type: String::new(),
            prereq: None,
            exec_type: default_exec_type(),
            params_schema: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SamLibraryDoc {
    #[serde(default)]
    sams: Vec<SamSpec>,
}

/// Parses a SAM library document. Duplicate mnemonics: last one wins (a
/// `HashMap` insert during construction naturally does this).
pub fn load_sam_library(text: &str, path: &str) -> Result<HashMap<String, SamSpec>, ConfigError> {
    let doc: SamLibraryDoc =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml { path: path.to_string(), source })?;
    let mut out = HashMap::new();
    for sam in doc.sams {
        out.insert(sam.mnemonic.clone(), sam);
    }
    Ok(out)
}

pub fn sam_spec_or_unknown(defs: &HashMap<String, SamSpec>, mnemonic: &str) -> SamSpec {
    defs.get(mnemonic).cloned().unwrap_or_else(|| SamSpec::unknown(mnemonic))
}

/// An optional guard evaluated before a step's primary SAM runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub sam: String,
    #[serde(default)]
    pub params: Params,
}

fn default_effect() -> String {
    "Scoring".to_string()
}

fn default_weight() -> f64 {
    1.0
}

/// One ordered step of an evaluation profile.
#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub id: String,
    pub resource: String,
    pub path: String,
    pub sam: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default = "default_effect")]
    pub effect: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl StepSpec {
    pub fn is_scoring(&self) -> bool {
        self.effect == "Scoring"
    }
}

#[derive(Debug, Deserialize)]
struct ProfileInner {
    name: String,
    steps: Vec<StepSpec>,
}

#[derive(Debug, Deserialize)]
struct ProfileDoc {
    profile: ProfileInner,
}

/// Parses a single profile document, returning its declared name and steps.
pub fn load_profile(text: &str, path: &str) -> Result<(String, Vec<StepSpec>), ConfigError> {
    let doc: ProfileDoc =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml { path: path.to_string(), source })?;
    Ok((doc.profile.name, doc.profile.steps))
}
