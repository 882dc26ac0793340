use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use piqi_pipeline::config::AppConfig;
use piqi_pipeline::pipeline::orchestrator::write_ndjson_values;
use piqi_pipeline::pipeline::Orchestrator;
use piqi_pipeline::piqi::profile::{load_profile, load_sam_library};
use piqi_pipeline::piqi::{plausibility, summary, terminology, PIQIEvaluator};

fn env_path(name: &str, default: &str) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn input_files() -> Vec<PathBuf> {
    std::env::var("PIQI_INPUT_FILES")
        .map(|v| v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::new().unwrap_or_default();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.clone())).init();

    let files = input_files();
    if files.is_empty() {
        error!("no input files given; set PIQI_INPUT_FILES to a colon-separated list of HL7 files");
        return Ok(());
    }

    let ref_dir = Path::new(&config.ref_dir);
    let loinc_codes = terminology::load_loinc_codes_from_csv(&ref_dir.join("loinc.csv"))?;
    let cpt_codes = terminology::load_cpt_codes_from_csv(&ref_dir.join("cpt.csv"))?;
    let plausibility_cfg = plausibility::load_plausibility_yaml(&ref_dir.join("plausibility.yaml"))?;

    let sam_path = env_path("PIQI_SAM_LIBRARY", "config/piqi_sam_library.yaml");
    let profile_path = env_path("PIQI_PROFILE", "config/profile_clinical_minimal.yaml");
    let sam_text = std::fs::read_to_string(&sam_path)?;
    let profile_text = std::fs::read_to_string(&profile_path)?;
    let sam_defs = load_sam_library(&sam_text, &sam_path.display().to_string())?;
    let (profile_name, steps) = load_profile(&profile_text, &profile_path.display().to_string())?;

    let mut profiles = HashMap::new();
    profiles.insert(profile_name.clone(), steps);

    let evaluator = PIQIEvaluator::new(sam_defs, profiles, loinc_codes, cpt_codes, plausibility_cfg);
    let orchestrator = Orchestrator::new(&config, evaluator, profile_name);

    let mut bundles = Vec::new();
    let mut scores = Vec::new();
    let mut annotated = Vec::new();

    for path in &files {
        info!("processing {}", path.display());
        match orchestrator.process_file(path) {
            Ok(outcomes) => {
                orchestrator.upload_all(&outcomes).await;
                for outcome in outcomes {
                    bundles.push(outcome.bundle);
                    scores.push(outcome.score);
                    annotated.push(outcome.annotated_bundle);
                }
            }
            Err(e) => warn!("failed to process {}: {e}", path.display()),
        }
    }

    let bundles_out = env_path("PIQI_BUNDLES_OUT", "out/fhir_bundles.ndjson");
    let scores_out = env_path("PIQI_SCORES_OUT", "out/piqi_scores.ndjson");
    let annotated_out = env_path("PIQI_ANNOTATED_OUT", "out/fhir_bundles_annotated.ndjson");
    let summary_csv_out = env_path("PIQI_SUMMARY_CSV_OUT", "out/piqi_summary.csv");
    let summary_ndjson_out = env_path("PIQI_SUMMARY_NDJSON_OUT", "out/piqi_summary.ndjson");

    write_ndjson_values(&bundles, &bundles_out)?;
    write_ndjson_values(&scores, &scores_out)?;
    write_ndjson_values(&annotated, &annotated_out)?;

    let rows = summary::summarize(&scores);
    summary::write_csv(&rows, &summary_csv_out)?;
    summary::write_ndjson(&rows, &summary_ndjson_out)?;

    info!(
        "[OK] files={} bundles={} scores={} annotated={} bundles_out={} scores_out={} annotated_out={} summary_csv_out={} summary_ndjson_out={}",
        files.len(),
        bundles.len(),
        scores.len(),
        annotated.len(),
        bundles_out.display(),
        scores_out.display(),
        annotated_out.display(),
        summary_csv_out.display(),
        summary_ndjson_out.display()
    );

    Ok(())
}
