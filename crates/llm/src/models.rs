//! Model discovery against the endpoint's `/v1/models` listing.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

/// Fetches the sorted list of model ids the endpoint advertises.
///
/// Failures are logged and yield an empty list so callers can fall back to
/// the configured default model.
pub async fn list_models(base_url: &str, api_key: &str, timeout: Duration) -> Vec<String> {
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "failed to build HTTP client for model discovery");
            return Vec::new();
        }
    };

    let mut request = client.get(&url);
    if !api_key.trim().is_empty() {
        request = request.bearer_auth(api_key);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, url, "failed to reach the models endpoint");
            return Vec::new();
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            %status,
            body = %body.chars().take(300).collect::<String>(),
            "models endpoint returned an error"
        );
        return Vec::new();
    }

    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "models endpoint returned non-JSON body");
            return Vec::new();
        }
    };

    let mut ids = body
        .get("data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    ids.sort();
    ids.dedup();
    info!(count = ids.len(), url, "fetched model catalog");
    ids
}
