//! Dispatches a parsed HL7 message to the message-type-specific bundle
//! builders and produces the `Bundle` envelope with correctly ordered
//! entries.

use serde_json::{json, Value};

use super::builders::{
    build_claim, build_diagnostic_report, build_diagnostic_report_synthesized, build_encounter,
    build_message_header, build_observation, build_patient,
};
use super::ids::new_id;
use crate::hl7::accessor::{comp, field};
use crate::hl7::lexer::Message;

/// Event type string `"CODE^TRIGGER"` (uppercased), e.g. `"ORU^R01"`.
pub fn detect_message_type(message: &Message) -> String {
    match message.segment("MSH") {
        Some(msh) => {
            let ev = field(msh, 9);
            format!("{}^{}", comp(&ev, 1), comp(&ev, 2)).to_uppercase()
        }
        None => "UNKNOWN".to_string(),
    }
}

fn entries(resources: Vec<Value>) -> Vec<Value> {
    resources.into_iter().map(|r| json!({ "resource": r })).collect()
}

fn wrap_bundle(entries: Vec<Value>) -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "message",
        "id": new_id("bundle"),
        "entry": entries,
    })
}

fn patient_and_encounter(message: &Message) -> (Option<Value>, Option<String>, Option<Value>, Option<String>) {
    let patient = message.segment("PID").map(build_patient);
    let patient_ref = patient.as_ref().map(|p| format!("Patient/{}", p["id"].as_str().unwrap()));

    let encounter = match (message.segment("PV1"), &patient_ref) {
        (Some(pv1), Some(pref)) => Some(build_encounter(pv1, pref)),
        _ => None,
    };
    let encounter_ref = encounter.as_ref().map(|e| format!("Encounter/{}", e["id"].as_str().unwrap()));

    (patient, patient_ref, encounter, encounter_ref)
}

fn build_observations(message: &Message, patient_ref: Option<&str>, encounter_ref: Option<&str>) -> Vec<Value> {
    message
        .segments_named("OBX")
        .into_iter()
        .map(|obx| build_observation(obx, patient_ref, encounter_ref))
        .collect()
}

fn observation_refs(observations: &[Value]) -> Vec<String> {
    observations
        .iter()
        .map(|o| format!("Observation/{}", o["id"].as_str().unwrap()))
        .collect()
}

fn convert_oru(message: &Message, src_endpoint: &str, dst_endpoint: &str) -> Value {
    let msh = message.segment("MSH").expect("checked by caller");
    let msg_header = build_message_header(msh, src_endpoint, dst_endpoint);
    let (patient, patient_ref, encounter, encounter_ref) = patient_and_encounter(message);

    let observations = build_observations(message, patient_ref.as_deref(), encounter_ref.as_deref());
    let obs_refs = observation_refs(&observations);

    let dr = match message.segment("OBR") {
        Some(obr) => build_diagnostic_report(obr, patient_ref.as_deref(), encounter_ref.as_deref(), &obs_refs),
        None => build_diagnostic_report_synthesized(patient_ref.as_deref(), encounter_ref.as_deref(), &obs_refs),
    };

    let mut resources = vec![msg_header];
    resources.extend(patient);
    resources.extend(encounter);
    resources.push(dr);
    resources.extend(observations);

    wrap_bundle(entries(resources))
}

fn convert_adt(message: &Message, src_endpoint: &str, dst_endpoint: &str) -> Value {
    let msh = message.segment("MSH").expect("checked by caller");
    let msg_header = build_message_header(msh, src_endpoint, dst_endpoint);
    let (patient, patient_ref, encounter, encounter_ref) = patient_and_encounter(message);

    let observations = build_observations(message, patient_ref.as_deref(), encounter_ref.as_deref());
    let obs_refs = observation_refs(&observations);

    let dr = message
        .segment("OBR")
        .map(|obr| build_diagnostic_report(obr, patient_ref.as_deref(), encounter_ref.as_deref(), &obs_refs));

    let mut resources = vec![msg_header];
    resources.extend(patient);
    resources.extend(encounter);
    resources.extend(dr);
    resources.extend(observations);

    wrap_bundle(entries(resources))
}

fn convert_dft(message: &Message, src_endpoint: &str, dst_endpoint: &str) -> Value {
    let msh = message.segment("MSH").expect("checked by caller");
    let msg_header = build_message_header(msh, src_endpoint, dst_endpoint);
    let (patient, patient_ref, encounter, encounter_ref) = patient_and_encounter(message);

    let claims: Vec<Value> = message
        .segments_named("FT1")
        .into_iter()
        .map(|ft1| build_claim(ft1, patient_ref.as_deref(), encounter_ref.as_deref()))
        .collect();

    let mut resources = vec![msg_header];
    resources.extend(patient);
    resources.extend(encounter);
    resources.extend(claims);

    wrap_bundle(entries(resources))
}

fn convert_unknown(message: &Message, src_endpoint: &str, dst_endpoint: &str) -> Value {
    let msh = message.segment("MSH").expect("checked by caller");
    let msg_header = build_message_header(msh, src_endpoint, dst_endpoint);
    let patient = message.segment("PID").map(build_patient);

    let mut resources = vec![msg_header];
    resources.extend(patient);

    wrap_bundle(entries(resources))
}

/// Parses and converts a single message's text into `(bundle, msg_type)`.
pub fn convert_message_to_bundle(
    message: &Message,
    src_endpoint: &str,
    dst_endpoint: &str,
) -> (Value, String) {
    let msg_type = detect_message_type(message);

    let bundle = if msg_type.starts_with("ORU^") {
        convert_oru(message, src_endpoint, dst_endpoint)
    } else if msg_type.starts_with("ADT^") {
        convert_adt(message, src_endpoint, dst_endpoint)
    } else if msg_type.starts_with("DFT^") {
        convert_dft(message, src_endpoint, dst_endpoint)
    } else {
        convert_unknown(message, src_endpoint, dst_endpoint)
    };

    (bundle, msg_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORU: &str = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230102030405||ORU^R01|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rOBR|1|P|F|71045^Chest X-ray^CPT|R|||20230102030405\rOBX|1|NM|8480-6^Systolic BP^LN||120|mmHg|||||F";

    #[test]
    fn oru_round_trip_entry_order_and_shape() {
        let msg = Message::parse(ORU).unwrap();
        let (bundle, msg_type) = convert_message_to_bundle(&msg, "urn:piqitt:local", "http://dst");
        assert_eq!(msg_type, "ORU^R01");

        let entries = bundle["entry"].as_array().unwrap();
        let types: Vec<&str> = entries
            .iter()
            .map(|e| e["resource"]["resourceType"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["MessageHeader", "Patient", "DiagnosticReport", "Observation"]);

        let patient = &entries[1]["resource"];
        assert_eq!(patient["gender"], "male");
        assert_eq!(patient["birthDate"], "1980-01-01");

        let obs = &entries[3]["resource"];
        assert_eq!(obs["valueQuantity"]["value"], 120.0);
        assert_eq!(obs["valueQuantity"]["unit"], "mmHg");
        assert_eq!(obs["code"]["coding"][0]["system"], "http://loinc.org");

        let dr = &entries[2]["resource"];
        let obs_id = obs["id"].as_str().unwrap();
        assert_eq!(dr["result"][0]["reference"], format!("Observation/{obs_id}"));
    }

    #[test]
    fn missing_obr_synthesizes_diagnostic_report() {
        let no_obr = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230102030405||ORU^R01|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rOBX|1|NM|8480-6^Systolic BP^LN||120|mmHg|||||F";
        let msg = Message::parse(no_obr).unwrap();
        let (bundle, _) = convert_message_to_bundle(&msg, "urn:piqitt:local", "http://dst");
        let entries = bundle["entry"].as_array().unwrap();
        let dr = entries
            .iter()
            .find(|e| e["resource"]["resourceType"] == "DiagnosticReport")
            .unwrap();
        assert_eq!(dr["resource"]["code"]["text"], "Diagnostic Report");
        assert_eq!(dr["resource"]["result"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn dft_message_produces_claim() {
        let dft = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230101||DFT^P03|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rFT1|1|||20230101||CODE1|DESC1|||12.50";
        let msg = Message::parse(dft).unwrap();
        let (bundle, msg_type) = convert_message_to_bundle(&msg, "urn:piqitt:local", "http://dst");
        assert_eq!(msg_type, "DFT^P03");
        let entries = bundle["entry"].as_array().unwrap();
        let claim = entries
            .iter()
            .find(|e| e["resource"]["resourceType"] == "Claim")
            .unwrap();
        assert_eq!(claim["resource"]["billablePeriod"]["start"], "2023-01-01");
        assert_eq!(claim["resource"]["item"][0]["unitPrice"]["value"], 12.5);
    }

    #[test]
    fn unknown_message_type_emits_minimal_bundle() {
        let unk = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230101||ZZZ^Z01|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rOBX|1|NM|1^x^LN||1|u";
        let msg = Message::parse(unk).unwrap();
        let (bundle, msg_type) = convert_message_to_bundle(&msg, "urn:piqitt:local", "http://dst");
        assert_eq!(msg_type, "ZZZ^Z01");
        let entries = bundle["entry"].as_array().unwrap();
        let types: Vec<&str> = entries
            .iter()
            .map(|e| e["resource"]["resourceType"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["MessageHeader", "Patient"]);
    }

    #[test]
    fn encounter_requires_both_pv1_and_patient() {
        let no_pid = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230101||ADT^A01|1|P|2.5\rPV1|1|I|WARD^101^A";
        let msg = Message::parse(no_pid).unwrap();
        let (bundle, _) = convert_message_to_bundle(&msg, "urn:piqitt:local", "http://dst");
        let entries = bundle["entry"].as_array().unwrap();
        assert!(!entries.iter().any(|e| e["resource"]["resourceType"] == "Encounter"));
    }
}
