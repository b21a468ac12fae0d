use std::time::Duration;

use serde::Deserialize;
use tracing::instrument;

use rx_domain::RtError;
use rx_ports::Transport;

const NAMESPACE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct NamespaceResponse {
    status: String,
    data: Option<NamespaceData>,
}

#[derive(Debug, Deserialize)]
struct NamespaceData {
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct QueueNamespaceData {
    namespace: String,
    hash: String,
}

/// Resolves a tenant namespace from an API key via `accounts.user.get_namespace`.
#[instrument(skip(transport, api_key))]
pub async fn resolve_namespace(transport: &dyn Transport, api_key: &str) -> Result<String, RtError> {
    let payload = serde_json::to_vec(&serde_json::json!({ "api_key": api_key }))
        .map_err(|e| RtError::config(format!("encoding namespace request: {e}")))?;

    let raw = transport
        .request("accounts.user.get_namespace", payload, NAMESPACE_TIMEOUT)
        .await
        .map_err(|e| RtError::Namespace { reason: e.to_string() })?;

    let resp: NamespaceResponse = serde_json::from_slice(&raw)
        .map_err(|e| RtError::Namespace { reason: format!("malformed response: {e}") })?;

    match (resp.status.as_str(), resp.data) {
        ("NAMESPACE_RETRIEVE_SUCCESS", Some(data)) => Ok(data.namespace),
        (status, _) => Err(RtError::Namespace { reason: status.to_string() }),
    }
}

/// Resolves a queue namespace and topic hash from an API key + queue id via
/// `accounts.user.get_queue_namespace`.
#[instrument(skip(transport, api_key))]
pub async fn resolve_queue_namespace(
    transport: &dyn Transport,
    api_key: &str,
    queue_id: &str,
) -> Result<(String, String), RtError> {
    let payload = serde_json::to_vec(&serde_json::json!({ "api_key": api_key, "queue_id": queue_id }))
        .map_err(|e| RtError::config(format!("encoding queue namespace request: {e}")))?;

    let raw = transport
        .request("accounts.user.get_queue_namespace", payload, NAMESPACE_TIMEOUT)
        .await
        .map_err(|e| RtError::Namespace { reason: e.to_string() })?;

    #[derive(Debug, Deserialize)]
    struct Response {
        status: String,
        data: Option<QueueNamespaceData>,
    }

    let resp: Response = serde_json::from_slice(&raw)
        .map_err(|e| RtError::Namespace { reason: format!("malformed response: {e}") })?;

    match resp.status.as_str() {
        "NAMESPACE_RETRIEVE_SUCCESS" => {
            let data = resp.data.ok_or_else(|| RtError::Namespace {
                reason: "success status without data".to_string(),
            })?;
            Ok((data.namespace, data.hash))
        }
        "QUEUE_NOT_FOUND" => Err(RtError::QueueNotFound { queue_id: queue_id.to_string() }),
        status => Err(RtError::Namespace { reason: status.to_string() }),
    }
}
