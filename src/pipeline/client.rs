//! Wraps a converted message bundle as a FHIR transaction and POSTs it to
//! the configured server.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};

use crate::error::TransportError;

fn strip_meta(resource: &Value) -> Value {
    let mut resource = resource.clone();
    if let Some(obj) = resource.as_object_mut() {
        obj.remove("meta");
        obj.remove("text");
    }
    resource
}

/// Rewrites a `message`-type bundle into a `transaction`-type bundle:
/// every entry whose resource has both a `resourceType` and an `id` becomes
/// a `PUT <Type>/<id>` transaction entry; server-managed fields are
/// stripped first so the client-assigned id is preserved.
pub fn bundle_to_transaction(bundle: &Value) -> Value {
    let mut entries = Vec::new();
    for entry in bundle.get("entry").and_then(Value::as_array).into_iter().flatten() {
        let Some(resource) = entry.get("resource") else { continue };
        let resource = strip_meta(resource);
        let rtype = resource.get("resourceType").and_then(Value::as_str);
        let rid = resource.get("id").and_then(Value::as_str);
        let (Some(rtype), Some(rid)) = (rtype, rid) else { continue };
        entries.push(json!({
            "resource": resource,
            "request": { "method": "PUT", "url": format!("{rtype}/{rid}") },
        }));
    }
    json!({ "resourceType": "Bundle", "type": "transaction", "entry": entries })
}

pub enum Auth {
    None,
    Basic { user: String, pass: String },
    Bearer { token: String },
}

pub struct FhirClient {
    http: Client,
    base_url: String,
    auth: Auth,
}

/// Outcome of a transaction POST: the status code and, when the body
/// parsed as JSON, the parsed response body.
pub struct UploadResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl FhirClient {
    pub fn new(base_url: String, auth: Auth) -> Self {
        let http = Client::builder().timeout(Duration::from_secs(30)).build().expect("client builder");
        FhirClient { http, base_url, auth }
    }

    /// Converts `bundle` to a transaction and POSTs it. No retries — a
    /// transport failure or non-2xx status surfaces directly to the caller.
    pub async fn upload(&self, bundle: &Value) -> Result<UploadResponse, TransportError> {
        let txn = bundle_to_transaction(bundle);

        let mut req = self.http.post(&self.base_url).header("Content-Type", "application/fhir+json").json(&txn);
        req = match &self.auth {
            Auth::None => req,
            Auth::Basic { user, pass } => req.basic_auth(user, Some(pass)),
            Auth::Bearer { token } => req.bearer_auth(token),
        };

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let body = serde_json::from_str::<Value>(&text).ok();

        if !(200..300).contains(&status) {
            return Err(TransportError::Status { status, body: text });
        }

        Ok(UploadResponse { status, body })
    }
}
