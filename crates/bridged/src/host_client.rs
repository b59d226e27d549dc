//! HTTP client for the ComfyUI host API.
//!
//! Every call carries its own timeout. `/object_info` is large and slow to
//! build on the host, so it is cached for a few minutes.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Liveness probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Stats, queue and interrupt
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);
/// Prompt submission and workflow fetch
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
/// Full node catalog
const OBJECT_INFO_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a fetched node catalog is reused
pub const OBJECT_INFO_TTL: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum HostError {
    #[error("ComfyUI unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("ComfyUI returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

struct CachedObjectInfo {
    fetched_at: Instant,
    info: Arc<Value>,
}

pub struct HostClient {
    base_url: String,
    client: reqwest::Client,
    client_id: String,
    object_info: Mutex<Option<CachedObjectInfo>>,
}

impl HostClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(OBJECT_INFO_TIMEOUT)
                .build()
                .unwrap_or_default(),
            client_id: uuid::Uuid::new_v4().to_string(),
            object_info: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client id sent with queued prompts
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// True when `/system_stats` answers with a success status
    pub async fn is_running(&self) -> bool {
        let url = self.endpoint("/system_stats");
        match self.client.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Host probe failed: {}", e);
                false
            }
        }
    }

    pub async fn system_stats(&self) -> Result<Value, HostError> {
        self.get_json("/system_stats", STATUS_TIMEOUT).await
    }

    pub async fn queue(&self) -> Result<Value, HostError> {
        self.get_json("/queue", STATUS_TIMEOUT).await
    }

    /// Workflow currently open in the host UI, as published by the host
    /// extension
    pub async fn current_workflow(&self) -> Result<Value, HostError> {
        self.get_json("/mcp/workflow", SUBMIT_TIMEOUT).await
    }

    /// Completed prompts keyed by prompt id
    pub async fn history(&self) -> Result<Value, HostError> {
        self.get_json("/history", SUBMIT_TIMEOUT).await
    }

    /// The live workflow when the host extension has published one,
    /// otherwise the most recently executed prompt from `/history`.
    ///
    /// `Ok(None)` when the host answers but has neither.
    pub async fn find_workflow(&self) -> Result<Option<Value>, HostError> {
        match self.current_workflow().await {
            Ok(live) if live.get("workflow").is_some() => return Ok(Some(live)),
            Ok(_) => debug!("No live workflow published, trying history"),
            Err(e) => debug!("Live workflow unavailable ({}), trying history", e),
        }

        let history = self.history().await?;
        Ok(workflow_from_history(&history))
    }

    /// Submit a workflow. See `prompt_payload` for the accepted shapes.
    pub async fn queue_prompt(&self, workflow: Value) -> Result<Value, HostError> {
        let payload = prompt_payload(workflow, &self.client_id);
        self.post_json("/prompt", &payload, SUBMIT_TIMEOUT).await
    }

    pub async fn interrupt(&self) -> Result<(), HostError> {
        let url = self.endpoint("/interrupt");
        let resp = self
            .client
            .post(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;

        if !resp.status().is_success() {
            return Err(HostError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }
        info!("Interrupted host execution");
        Ok(())
    }

    /// Node catalog, served from cache while younger than the TTL. Failed
    /// fetches are not cached.
    pub async fn object_info(&self) -> Result<Arc<Value>, HostError> {
        let mut cache = self.object_info.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < OBJECT_INFO_TTL {
                return Ok(Arc::clone(&cached.info));
            }
        }

        let info = Arc::new(self.get_json("/object_info", OBJECT_INFO_TIMEOUT).await?);
        debug!(
            "Fetched object_info with {} node types",
            info.as_object().map(|m| m.len()).unwrap_or(0)
        );
        *cache = Some(CachedObjectInfo {
            fetched_at: Instant::now(),
            info: Arc::clone(&info),
        });
        Ok(info)
    }

    async fn get_json(&self, path: &str, timeout: Duration) -> Result<Value, HostError> {
        let url = self.endpoint(path);
        let resp = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;
        decode(url, resp).await
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, HostError> {
        let url = self.endpoint(path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| unreachable(&url, e))?;
        decode(url, resp).await
    }
}

fn unreachable(url: &str, err: reqwest::Error) -> HostError {
    HostError::Unreachable {
        url: url.to_string(),
        reason: err.to_string(),
    }
}

/// Decode a JSON body. The host reports validation failures on `/prompt`
/// as HTTP 400 with a JSON body, so error statuses with a JSON body are
/// returned as values.
async fn decode(url: String, resp: reqwest::Response) -> Result<Value, HostError> {
    let status = resp.status();
    match resp.json::<Value>().await {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Err(HostError::Status {
            url,
            status: status.as_u16(),
        }),
        Err(e) => Err(HostError::Decode {
            url,
            reason: e.to_string(),
        }),
    }
}

/// Build the `/prompt` request body.
///
/// Accepts an API-format prompt, an object already wrapped as
/// `{"prompt": ...}`, or `{"workflow": ...}` as returned by the host
/// extension.
pub fn prompt_payload(workflow: Value, client_id: &str) -> Value {
    let mut payload = match workflow {
        Value::Object(mut map) if map.contains_key("prompt") => {
            map.remove("workflow");
            Value::Object(map)
        }
        Value::Object(mut map) if map.contains_key("workflow") => {
            let inner = map.remove("workflow").unwrap_or(Value::Null);
            json!({ "prompt": inner })
        }
        other => json!({ "prompt": other }),
    };

    if let Some(map) = payload.as_object_mut() {
        map.entry("client_id")
            .or_insert_with(|| Value::String(client_id.to_string()));
    }
    payload
}

/// Pick the newest entry of a `/history` response.
///
/// Entries are ordered by the queue number the host stores as the first
/// element of each entry's `prompt` array; that array also carries the
/// API-format graph as its third element. Returns
/// `{"source": "history", "prompt_id", "workflow", "outputs"}`.
pub fn workflow_from_history(history: &Value) -> Option<Value> {
    let entries = history.as_object()?;
    let queue_number = |entry: &Value| entry.pointer("/prompt/0").and_then(Value::as_u64);

    let (prompt_id, entry) = entries
        .iter()
        .enumerate()
        .max_by_key(|(pos, (_, entry))| (queue_number(*entry), *pos))
        .map(|(_, kv)| kv)?;

    let prompt = entry.get("prompt").cloned().unwrap_or(Value::Null);
    let workflow = match prompt {
        Value::Array(mut parts) if parts.len() > 2 => parts.swap_remove(2),
        other => other,
    };

    Some(json!({
        "source": "history",
        "prompt_id": prompt_id,
        "workflow": workflow,
        "outputs": entry.get("outputs").cloned().unwrap_or_else(|| json!({})),
    }))
}
