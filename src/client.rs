use futures::future::join_all;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Fetch, QueryError};
use crate::models::{AuthFile, AuthFilesResponse, CredentialPayload, CredentialType, QuotaFetch};

/// Timeout for the gateway's own management endpoints.
pub const MANAGEMENT_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for proxied upstream calls, which include the upstream round trip.
pub const API_CALL_TIMEOUT: Duration = Duration::from_secs(60);

const USAGE_PATH: &str = "/v0/management/usage";
const AUTH_FILES_PATH: &str = "/v0/management/auth-files";
const API_CALL_PATH: &str = "/v0/management/api-call";

// Tried in order; the first host that returns models wins.
const ANTIGRAVITY_QUOTA_URLS: [&str; 3] = [
    "https://daily-cloudcode-pa.googleapis.com/v1internal:fetchAvailableModels",
    "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:fetchAvailableModels",
    "https://cloudcode-pa.googleapis.com/v1internal:fetchAvailableModels",
];
const GEMINI_CLI_QUOTA_URL: &str =
    "https://cloudcode-pa.googleapis.com/v1internal:retrieveUserQuota";
const ANTIGRAVITY_USER_AGENT: &str = "antigravity/1.11.5 windows/amd64";

/// Reply envelope of the gateway's api-call proxy.
#[derive(Debug, Deserialize)]
struct ApiCallResponse {
    status_code: u16,
    #[serde(default)]
    body: Value,
}

impl ApiCallResponse {
    /// The proxy may hand the upstream body back as an encoded JSON string.
    fn decoded_body(self) -> Value {
        match self.body {
            Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            other => other,
        }
    }
}

fn upstream_error(status: u16, body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// Project id from a GeminiCLI credential file name, `gemini-<email>-<project>.json`.
pub fn extract_project(file_name: &str) -> Option<&str> {
    let name = file_name.strip_suffix(".json").unwrap_or(file_name);
    let (_, after_at) = name.rsplit_once('@')?;
    let (_, project) = after_at.split_once('-')?;
    (!project.is_empty()).then_some(project)
}

pub struct QuotaClient {
    http: reqwest::Client,
    base_url: String,
    admin_secret: String,
    management_timeout: Duration,
    api_call_timeout: Duration,
}

impl QuotaClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("cpa-monitor/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_secret: config.admin_secret.clone(),
            management_timeout: MANAGEMENT_TIMEOUT,
            api_call_timeout: API_CALL_TIMEOUT,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Aggregate, per-API, per-model and per-request usage counters.
    pub async fn fetch_usage_stats(&self) -> Result<Value, QueryError> {
        let request = self
            .http
            .get(self.url(USAGE_PATH))
            .timeout(self.management_timeout);
        self.send(request, Fetch::Usage).await
    }

    pub async fn fetch_auth_files(&self) -> Result<Vec<AuthFile>, QueryError> {
        let request = self
            .http
            .get(self.url(AUTH_FILES_PATH))
            .timeout(self.management_timeout);
        let body = self.send(request, Fetch::Credentials).await?;
        let response: AuthFilesResponse = serde_json::from_value(body)
            .map_err(|e| QueryError::format(Fetch::Credentials, e.to_string()))?;
        Ok(response.files)
    }

    /// Lists quota-capable credentials and fetches each one's quota concurrently.
    pub async fn fetch_credentials_quota(&self) -> Result<Vec<CredentialPayload>, QueryError> {
        let files = self.fetch_auth_files().await?;
        let total = files.len();

        let pending: Vec<_> = files
            .into_iter()
            .filter_map(|file| file.credential_type().map(|kind| (kind, file)))
            .map(|(kind, file)| self.fetch_quota_for(kind, file))
            .collect();
        info!(
            "Fetching quota for {} of {} credentials",
            pending.len(),
            total
        );

        join_all(pending).await.into_iter().collect()
    }

    async fn fetch_quota_for(
        &self,
        kind: CredentialType,
        file: AuthFile,
    ) -> Result<CredentialPayload, QueryError> {
        let label = file.label();
        let enabled = file.is_enabled();
        let id = file.auth_index.clone().unwrap_or_default();

        let quota = if id.is_empty() {
            QuotaFetch::Skipped("quota unavailable (missing auth_index)".to_string())
        } else if !enabled {
            QuotaFetch::Skipped("credential disabled or unavailable".to_string())
        } else {
            debug!("Fetching quota: provider={}, label={}, auth_index={}", file.provider(), label, id);
            match kind {
                CredentialType::Antigravity => self.fetch_antigravity_quota(&id).await?,
                CredentialType::GeminiCli => match file.file_name().and_then(extract_project) {
                    Some(project) => self.fetch_gemini_cli_quota(&id, project).await?,
                    None => QuotaFetch::Skipped(
                        "quota unavailable (no project in credential name)".to_string(),
                    ),
                },
            }
        };

        Ok(CredentialPayload {
            id,
            kind,
            label,
            enabled,
            quota,
        })
    }

    async fn fetch_antigravity_quota(&self, auth_index: &str) -> Result<QuotaFetch, QueryError> {
        let header = json!({
            "Authorization": "Bearer $TOKEN$",
            "Content-Type": "application/json",
            "User-Agent": ANTIGRAVITY_USER_AGENT,
        });

        let mut last_error = None;
        for url in ANTIGRAVITY_QUOTA_URLS {
            let response = self
                .api_call(auth_index, "POST", url, &header, "{}".to_string())
                .await?;
            let status = response.status_code;
            let body = response.decoded_body();

            match status {
                200 if body.get("models").is_some_and(Value::is_object) => {
                    return Ok(QuotaFetch::Body(body));
                }
                200 => debug!("{} returned no models for auth_index={}", url, auth_index),
                403 => return Ok(QuotaFetch::Failed("quota query not permitted".to_string())),
                _ => {
                    warn!("Antigravity quota via {} failed: HTTP {}", url, status);
                    last_error = Some(upstream_error(status, &body));
                }
            }
        }

        Ok(QuotaFetch::Failed(
            last_error.unwrap_or_else(|| "quota unavailable".to_string()),
        ))
    }

    async fn fetch_gemini_cli_quota(
        &self,
        auth_index: &str,
        project: &str,
    ) -> Result<QuotaFetch, QueryError> {
        let header = json!({
            "Authorization": "Bearer $TOKEN$",
            "Content-Type": "application/json",
        });
        let data = json!({ "project": project }).to_string();

        let response = self
            .api_call(auth_index, "POST", GEMINI_CLI_QUOTA_URL, &header, data)
            .await?;
        let status = response.status_code;
        let body = response.decoded_body();

        Ok(match status {
            200 => QuotaFetch::Body(body),
            403 => QuotaFetch::Failed("quota query not permitted".to_string()),
            _ => {
                warn!("GeminiCLI quota for auth_index={} failed: HTTP {}", auth_index, status);
                QuotaFetch::Failed(upstream_error(status, &body))
            }
        })
    }

    /// Has the gateway perform `method url` with the credential's token substituted.
    async fn api_call(
        &self,
        auth_index: &str,
        method: &str,
        url: &str,
        header: &Value,
        data: String,
    ) -> Result<ApiCallResponse, QueryError> {
        let payload = json!({
            "auth_index": auth_index,
            "method": method,
            "url": url,
            "header": header,
            "data": data,
        });
        let request = self
            .http
            .post(self.url(API_CALL_PATH))
            .json(&payload)
            .timeout(self.api_call_timeout);

        let body = self.send(request, Fetch::Quota).await?;
        serde_json::from_value(body).map_err(|e| QueryError::format(Fetch::Quota, e.to_string()))
    }

    async fn send(&self, request: RequestBuilder, fetch: Fetch) -> Result<Value, QueryError> {
        let response = request
            .bearer_auth(&self.admin_secret)
            .send()
            .await
            .map_err(|source| QueryError::Transport { fetch, source })?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(QueryError::Auth {
                fetch,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("{} request failed: {} - {}", fetch, status, text);
            return Err(QueryError::Status {
                fetch,
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|source| QueryError::Transport { fetch, source })?;
        serde_json::from_str(&text).map_err(|e| QueryError::format(fetch, format!("invalid JSON: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    pub(crate) type Handler = Arc<dyn Fn(&str, &str, &str) -> (u16, String) + Send + Sync>;

    /// Reads one HTTP/1.1 request: (request line, authorization header, body).
    async fn read_request(stream: &mut TcpStream) -> (String, String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next().unwrap_or_default().to_string();
        let mut auth = String::new();
        let mut content_length = 0usize;
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                match name.trim().to_ascii_lowercase().as_str() {
                    "authorization" => auth = value.trim().to_string(),
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    _ => {}
                }
            }
        }

        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
        (request_line, auth, body)
    }

    /// Serves every connection with `handler(request_line, authorization, body)`.
    pub(crate) async fn serve(handler: Handler) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    let (line, auth, body) = read_request(&mut stream).await;
                    let (status, reply) = handler(&line, &auth, &body);
                    let response = format!(
                        "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        reply.len(),
                        reply
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    /// Answers every request with the same status and body.
    pub(crate) async fn serve_fixed(status: u16, body: &'static str) -> String {
        serve(Arc::new(move |_: &str, _: &str, _: &str| (status, body.to_string()))).await
    }
}
