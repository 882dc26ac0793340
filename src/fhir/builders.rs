//! Pure builders: HL7 segment -> FHIR resource. Every builder generates a
//! fresh id and returns a `serde_json::Value` (see the data model note in
//! the crate's design docs for why resources aren't a closed enum).

use serde_json::{json, Value};

use super::coding::{codeable_concept_from_ce, to_gender};
use super::ids::new_id;
use crate::hl7::accessor::{comp, field, reps, to_fhir_datetime, to_iso_date};
use crate::hl7::lexer::Segment;

/// MessageHeader from MSH. `src_endpoint`/`dst_endpoint` come from
/// configuration, not the message itself — FHIR R4's MessageHeader has no
/// `timestamp` element, so none is emitted.
pub fn build_message_header(msh: &Segment, src_endpoint: &str, dst_endpoint: &str) -> Value {
    let ev = field(msh, 9);
    let ev_code = comp(&ev, 1);
    let ev_trigger = comp(&ev, 2);

    let sending_app = field(msh, 3);
    let sending_fac = field(msh, 4);
    let receiving_app = field(msh, 5);
    let receiving_fac = field(msh, 6);

    let source_name = join_trimmed(&sending_app, &sending_fac);
    let dest_name = join_trimmed(&receiving_app, &receiving_fac);

    let event_code = if ev_trigger.is_empty() {
        ev_code
    } else {
        format!("{ev_code}^{ev_trigger}")
    };

    json!({
        "resourceType": "MessageHeader",
        "id": new_id("msg"),
        "eventCoding": {
            "system": "http://terminology.hl7.org/CodeSystem/v2-0003",
            "code": event_code,
        },
        "source": {
            "name": source_name,
            "endpoint": src_endpoint,
        },
        "destination": [{
            "name": dest_name,
            "endpoint": dst_endpoint,
        }],
    })
}

fn join_trimmed(a: &str, b: &str) -> String {
    let joined = format!("{a}|{b}");
    let trimmed = joined.trim_matches('|');
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Patient from PID.
pub fn build_patient(pid: &Segment) -> Value {
    let pid3 = field(pid, 3);
    let mut identifiers = Vec::new();
    for rep in reps_nonempty(&pid3) {
        let id_val = comp(&rep, 1);
        let id_assigner = comp(&rep, 4);
        if !id_val.is_empty() {
            let system = if id_assigner.is_empty() {
                "urn:mrn".to_string()
            } else {
                format!("urn:oid:{id_assigner}")
            };
            identifiers.push(json!({ "system": system, "value": id_val }));
        }
    }

    let name = field(pid, 5);
    let family = comp(&name, 1);
    let given = comp(&name, 2);

    let birth_date = to_iso_date(&field(pid, 7));
    let gender = to_gender(&field(pid, 8));

    let addr = field(pid, 11);
    let street = comp(&addr, 1);
    let city = comp(&addr, 3);
    let state = comp(&addr, 4);
    let postal = comp(&addr, 5);

    let mut patient = json!({
        "resourceType": "Patient",
        "id": new_id("pat"),
        "name": [{
            "family": family,
            "given": if given.is_empty() { json!([]) } else { json!([given]) },
        }],
        "gender": gender,
        "birthDate": birth_date,
    });

    if !identifiers.is_empty() {
        patient["identifier"] = json!(identifiers);
    }
    if !street.is_empty() || !city.is_empty() || !state.is_empty() || !postal.is_empty() {
        patient["address"] = json!([{
            "line": if street.is_empty() { json!([]) } else { json!([street]) },
            "city": opt(&city),
            "state": opt(&state),
            "postalCode": opt(&postal),
        }]);
    }

    patient
}

fn opt(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        json!(s)
    }
}

fn reps_nonempty(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        Vec::new()
    } else {
        raw.split('~').map(|s| s.to_string()).collect()
    }
}

/// Encounter from PV1. Only called when a Patient reference already exists.
pub fn build_encounter(pv1: &Segment, patient_ref: &str) -> Value {
    let cls = field(pv1, 2);
    let loc = field(pv1, 3);
    let pof = comp(&loc, 1).trim().to_string();
    let room = comp(&loc, 2).trim().to_string();
    let bed = comp(&loc, 3).trim().to_string();
    let facility = comp(&loc, 4).trim().to_string();

    let mut encounter = json!({
        "resourceType": "Encounter",
        "id": new_id("enc"),
        "status": "finished",
        "class": { "code": if cls.is_empty() { "UNK".to_string() } else { cls } },
        "subject": { "reference": patient_ref },
    });

    let mut subext = Vec::new();
    if !pof.is_empty() {
        subext.push(json!({ "url": "pointOfCare", "valueString": pof }));
    }
    if !room.is_empty() {
        subext.push(json!({ "url": "room", "valueString": room }));
    }
    if !bed.is_empty() {
        subext.push(json!({ "url": "bed", "valueString": bed }));
    }
    if !facility.is_empty() {
        subext.push(json!({ "url": "facility", "valueString": facility }));
    }
    if !subext.is_empty() {
        encounter["extension"] = json!([{
            "url": "http://example.org/fhir/StructureDefinition/hl7v2-location",
            "extension": subext,
        }]);
    }

    encounter
}

/// Observation from OBX.
pub fn build_observation(obx: &Segment, patient_ref: Option<&str>, encounter_ref: Option<&str>) -> Value {
    let vtype = field(obx, 2).to_uppercase();
    let id_ce = field(obx, 3);
    let val = field(obx, 5);
    let units = field(obx, 6);
    let dt_obs = field(obx, 14);

    let code = codeable_concept_from_ce(&id_ce);
    let code = if code == json!({}) { json!({ "text": "Observation" }) } else { code };

    let mut obs = json!({
        "resourceType": "Observation",
        "id": new_id("obs"),
        "status": "final",
        "code": code,
    });

    if let Some(p) = patient_ref {
        obs["subject"] = json!({ "reference": p });
    }
    if let Some(e) = encounter_ref {
        obs["encounter"] = json!({ "reference": e });
    }

    if let Some(iso) = to_fhir_datetime(&dt_obs) {
        obs["effectiveDateTime"] = json!(iso);
    }

    match vtype.as_str() {
        "TX" | "ST" => {
            obs["valueString"] = json!(val);
        }
        "NM" => match val.trim().parse::<f64>() {
            Ok(num) => {
                let mut quantity = json!({ "value": num });
                if !units.is_empty() {
                    let unit = if units.contains('^') {
                        let c2 = comp(&units, 2);
                        if c2.is_empty() { comp(&units, 1) } else { c2 }
                    } else {
                        units.clone()
                    };
                    quantity["unit"] = json!(unit);
                }
                obs["valueQuantity"] = quantity;
            }
            Err(_) => {
                obs["valueString"] = json!(val);
            }
        },
        "CE" => {
            obs["valueCodeableConcept"] = codeable_concept_from_ce(&val);
        }
        "DT" | "TS" => match to_fhir_datetime(&val) {
            Some(iso) => obs["valueDateTime"] = json!(iso),
            None => obs["valueString"] = json!(val),
        },
        _ => {
            obs["valueString"] = json!(val);
        }
    }

    obs
}

/// DiagnosticReport from OBR.
pub fn build_diagnostic_report(
    obr: &Segment,
    patient_ref: Option<&str>,
    encounter_ref: Option<&str>,
    observation_refs: &[String],
) -> Value {
    let svc = field(obr, 4);
    let code = codeable_concept_from_ce(&svc);
    let code = if code == json!({}) { json!({ "text": "Diagnostic Report" }) } else { code };

    let mut dr = json!({
        "resourceType": "DiagnosticReport",
        "id": new_id("dr"),
        "status": "final",
        "code": code,
        "result": observation_refs.iter().map(|r| json!({ "reference": r })).collect::<Vec<_>>(),
    });
    if let Some(p) = patient_ref {
        dr["subject"] = json!({ "reference": p });
    }
    if let Some(e) = encounter_ref {
        dr["encounter"] = json!({ "reference": e });
    }
    dr
}

/// Synthesized DiagnosticReport for an OBX-only message with no OBR.
pub fn build_diagnostic_report_synthesized(
    patient_ref: Option<&str>,
    encounter_ref: Option<&str>,
    observation_refs: &[String],
) -> Value {
    let mut dr = json!({
        "resourceType": "DiagnosticReport",
        "id": new_id("dr"),
        "status": "final",
        "code": { "text": "Diagnostic Report" },
        "result": observation_refs.iter().map(|r| json!({ "reference": r })).collect::<Vec<_>>(),
    });
    if let Some(p) = patient_ref {
        dr["subject"] = json!({ "reference": p });
    }
    if let Some(e) = encounter_ref {
        dr["encounter"] = json!({ "reference": e });
    }
    dr
}

/// Claim from FT1 (DFT flow).
pub fn build_claim(ft1: &Segment, patient_ref: Option<&str>, encounter_ref: Option<&str>) -> Value {
    let dt = field(ft1, 4);
    let code = field(ft1, 6);
    let desc = field(ft1, 7);
    let amt = field(ft1, 10);

    let mut claim = json!({
        "resourceType": "Claim",
        "id": new_id("claim"),
        "status": "active",
        "type": { "text": "professional" },
        "item": [],
    });
    if let Some(p) = patient_ref {
        claim["patient"] = json!({ "reference": p });
    }
    if let Some(e) = encounter_ref {
        claim["encounter"] = json!([{ "reference": e }]);
    }
    if dt.len() >= 8 {
        if let Some(d) = to_iso_date(&dt[0..8]) {
            claim["billablePeriod"] = json!({ "start": d, "end": d });
        }
    }
    if !code.is_empty() || !desc.is_empty() || !amt.is_empty() {
        let mut entry = json!({
            "sequence": 1,
            "productOrService": { "text": format!("{code} {desc}").trim() },
        });
        if let Ok(num) = amt.trim().parse::<f64>() {
            entry["unitPrice"] = json!({ "value": num });
        }
        claim["item"] = json!([entry]);
    }

    claim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hl7::lexer::Message;

    fn seg(text: &str, name: &str) -> Segment {
        Message::parse(text).unwrap().segment(name).unwrap().clone()
    }

    const ORU: &str = "MSH|^~\\&|APP|FAC|RCV|RCFAC|20230102030405||ORU^R01|1|P|2.5\rPID|1||RAD0000001||DOE^JOHN||19800101|M\rOBR|1|P|F|71045^Chest X-ray^CPT|R|||20230102030405\rOBX|1|NM|8480-6^Systolic BP^LN||120|mmHg|||||F";

    #[test]
    fn message_header_builds_event_coding_with_trigger() {
        let msh = seg(ORU, "MSH");
        let mh = build_message_header(&msh, "urn:piqitt:local", "http://dst");
        assert_eq!(mh["eventCoding"]["code"], "ORU^R01");
        assert_eq!(mh["source"]["name"], "APP|FAC");
        assert_eq!(mh["destination"][0]["name"], "RCV|RCFAC");
        assert!(mh.get("timestamp").is_none());
    }

    #[test]
    fn patient_maps_gender_and_birthdate() {
        let pid = seg(ORU, "PID");
        let p = build_patient(&pid);
        assert_eq!(p["gender"], "male");
        assert_eq!(p["birthDate"], "1980-01-01");
        assert_eq!(p["name"][0]["family"], "DOE");
        assert_eq!(p["name"][0]["given"][0], "JOHN");
    }

    #[test]
    fn observation_nm_builds_quantity_with_unit() {
        let obx = seg(ORU, "OBX");
        let obs = build_observation(&obx, Some("Patient/pat-1"), None);
        assert_eq!(obs["valueQuantity"]["value"], 120.0);
        assert_eq!(obs["valueQuantity"]["unit"], "mmHg");
        assert_eq!(obs["code"]["coding"][0]["system"], "http://loinc.org");
    }

    #[test]
    fn observation_nm_non_numeric_falls_back_to_string() {
        let text = "MSH|^~\\&|A|B|C|D|20230101||ORU^R01|1|P|2.5\rOBX|1|NM|1^x^LN||not-a-number|mmHg";
        let obx = seg(text, "OBX");
        let obs = build_observation(&obx, None, None);
        assert_eq!(obs["valueString"], "not-a-number");
        assert!(obs.get("valueQuantity").is_none());
    }

    #[test]
    fn observation_with_no_code_falls_back_to_text() {
        let text = "MSH|^~\\&|A|B|C|D|20230101||ORU^R01|1|P|2.5\rOBX|1|ST|||some value";
        let obx = seg(text, "OBX");
        let obs = build_observation(&obx, None, None);
        assert_eq!(obs["code"], json!({ "text": "Observation" }));
    }

    #[test]
    fn encounter_treats_whitespace_location_components_as_absent() {
        let text = "MSH|^~\\&|A|B|C|D|20230101||ADT^A01|1|P|2.5\rPV1|1|I|   ^ room ^  ^facility";
        let pv1 = seg(text, "PV1");
        let enc = build_encounter(&pv1, "Patient/pat-1");
        let exts = enc["extension"][0]["extension"].as_array().cloned().unwrap_or_default();
        assert_eq!(exts.len(), 2);
        assert_eq!(exts[0]["url"], "room");
        assert_eq!(exts[0]["valueString"], "room");
        assert_eq!(exts[1]["url"], "facility");
        assert_eq!(exts[1]["valueString"], "facility");
    }

    #[test]
    fn diagnostic_report_from_obr_maps_code() {
        let obr = seg(ORU, "OBR");
        let dr = build_diagnostic_report(&obr, Some("Patient/pat-1"), None, &["Observation/obs-1".to_string()]);
        assert_eq!(dr["code"]["coding"][0]["system"], "urn:hl7v2:CPT");
        assert_eq!(dr["result"][0]["reference"], "Observation/obs-1");
    }

    #[test]
    fn claim_from_ft1_maps_billable_period_and_price() {
        let text = "MSH|^~\\&|A|B|C|D|20230101||DFT^P03|1|P|2.5\rFT1|1|||20230101||CODE1|DESC1|||12.50";
        let ft1 = seg(text, "FT1");
        let claim = build_claim(&ft1, Some("Patient/pat-1"), None);
        assert_eq!(claim["billablePeriod"]["start"], "2023-01-01");
        assert_eq!(claim["billablePeriod"]["end"], "2023-01-01");
        assert_eq!(claim["item"][0]["unitPrice"]["value"], 12.5);
        assert_eq!(claim["item"][0]["productOrService"]["text"], "CODE1 DESC1");
    }
}
