use crate::error::ConfigError;
use serde::Deserialize;

/// Layered application configuration: built-in defaults, optionally overridden
/// by `config/settings.toml`, then by `PIQI_*` environment variables.
///
/// Field names intentionally match the environment variable suffixes from
/// the configuration surface (`PIQI_SRC_ENDPOINT` -> `src_endpoint`, etc.) so
/// a flat `Environment::with_prefix("PIQI")` source maps onto them directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// MessageHeader.source.endpoint for built bundles.
    #[serde(default = "default_src_endpoint")]
    pub src_endpoint: String,

    /// MessageHeader.destination[0].endpoint for built bundles.
    #[serde(default = "default_dst_endpoint")]
    pub dst_endpoint: String,

    /// Base URL of the remote FHIR server the orchestrator may upload to.
    pub fhir_base: Option<String>,
    pub fhir_user: Option<String>,
    pub fhir_pass: Option<String>,
    pub fhir_bearer: Option<String>,

    /// Directory containing `loinc.csv`, `cpt.csv`, `plausibility.yaml`.
    #[serde(default = "default_ref_dir")]
    pub ref_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_src_endpoint() -> String {
    "urn:piqitt:local".to_string()
}

fn default_dst_endpoint() -> String {
    "http://localhost:30000/csp/healthshare/datademo/fhir/r4".to_string()
}

fn default_ref_dir() -> String {
    "ref".to_string()
}

impl AppConfig {
    /// Build configuration from built-in defaults, an optional file at
    /// `config/settings.toml`, then `PIQI_*` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .set_default("log_level", default_log_level())?
            .set_default("src_endpoint", default_src_endpoint())?
            .set_default("dst_endpoint", default_dst_endpoint())?
            .set_default("ref_dir", default_ref_dir())?
            .add_source(config::File::with_name("config/settings").required(false))
            .add_source(config::Environment::with_prefix("PIQI").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: default_log_level(),
            src_endpoint: default_src_endpoint(),
            dst_endpoint: default_dst_endpoint(),
            fhir_base: None,
            fhir_user: None,
            fhir_pass: None,
            fhir_bearer: None,
            ref_dir: default_ref_dir(),
        }
    }
}
