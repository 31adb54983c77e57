//! GitHub contents/actions API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::ContentConfig;
use crate::credentials::AuthScheme;
use crate::error::RemoteError;

use super::codec::{from_transport, to_transport};
use super::store::ContentStore;
use super::types::{Fingerprint, PipelineRun, StoredContent, WriteReceipt};

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Content store backed by a GitHub repository
#[derive(Clone)]
pub struct GitHubContentClient {
    client: Client,
    api_base: String,
    owner: String,
    repo: String,
    auth_scheme: AuthScheme,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct PutContentsBody<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Deserialize)]
struct PutContentsResponse {
    content: ShaRef,
    #[serde(default)]
    commit: Option<ShaRef>,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Serialize)]
struct DeleteContentsBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

#[derive(Deserialize)]
struct WorkflowRunsResponse {
    #[serde(default)]
    workflow_runs: Vec<PipelineRun>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GitHubContentClient {
    /// Create a client from configuration
    pub fn new(config: &ContentConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .user_agent(concat!("site-publisher/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| RemoteError::Transient(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            owner = %config.owner,
            repo = %config.repo,
            api_base = %config.api_base,
            "GitHub content client ready"
        );

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            auth_scheme: config.auth_scheme,
        })
    }

    fn repo_url(&self) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_base,
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo)
        )
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/contents/{}", self.repo_url(), encoded.join("/"))
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header(AUTHORIZATION, self.auth_scheme.header_value(token))
            .header(ACCEPT, ACCEPT_GITHUB_JSON)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Transient(format!("request timed out: {}", e))
    } else {
        RemoteError::Transient(e.to_string())
    }
}

fn rate_limited(headers: &HeaderMap) -> bool {
    headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

/// Classify a non-success response
async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let limited = rate_limited(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status.to_string());

    tracing::debug!(status = %status, message = %message, "Content API error");

    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
        StatusCode::FORBIDDEN if limited => RemoteError::Transient(format!("rate limited: {}", message)),
        StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Transient(format!("rate limited: {}", message)),
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => RemoteError::Validation(message),
        s if s.is_server_error() => RemoteError::Transient(message),
        _ => RemoteError::Transient(format!("unexpected status {}: {}", status, message)),
    }
}

#[async_trait]
impl ContentStore for GitHubContentClient {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch(
        &self,
        token: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<StoredContent>, RemoteError> {
        let request = self
            .client
            .get(self.contents_url(path))
            .query(&[("ref", git_ref)]);

        let response = match self.send(self.authorized(request, token)).await {
            Ok(response) => response,
            Err(RemoteError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("unexpected contents response: {}", e)))?;

        let fingerprint = Fingerprint::new(body.sha);
        let bytes = match from_transport(&body.content) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Err(RemoteError::Corrupt {
                    fingerprint,
                    reason: e.to_string(),
                })
            }
        };

        Ok(Some(StoredContent { fingerprint, bytes }))
    }

    async fn write(
        &self,
        token: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected: Option<&Fingerprint>,
        branch: &str,
    ) -> Result<WriteReceipt, RemoteError> {
        let body = PutContentsBody {
            message,
            content: to_transport(bytes),
            sha: expected.map(Fingerprint::as_str),
            branch,
        };
        let request = self.client.put(self.contents_url(path)).json(&body);
        let response = self.send(self.authorized(request, token)).await?;

        let committed: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("unexpected write response: {}", e)))?;

        let commit = committed.commit.map(|c| c.sha);
        tracing::info!(
            path = %path,
            sha = %committed.content.sha,
            commit = ?commit,
            "Wrote file to GitHub"
        );
        Ok(WriteReceipt {
            fingerprint: Fingerprint::new(committed.content.sha),
            commit,
        })
    }

    async fn delete(
        &self,
        token: &str,
        path: &str,
        expected: &Fingerprint,
        message: &str,
        branch: &str,
    ) -> Result<(), RemoteError> {
        let body = DeleteContentsBody {
            message,
            sha: expected.as_str(),
            branch,
        };
        let request = self.client.delete(self.contents_url(path)).json(&body);
        self.send(self.authorized(request, token)).await?;

        tracing::info!(path = %path, "Deleted file from GitHub");
        Ok(())
    }

    async fn list_pipeline_runs(
        &self,
        token: &str,
        limit: u32,
    ) -> Result<Vec<PipelineRun>, RemoteError> {
        let url = format!("{}/actions/runs", self.repo_url());
        let request = self.client.get(url).query(&[("per_page", limit.max(1))]);
        let response = self.send(self.authorized(request, token)).await?;

        let body: WorkflowRunsResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("unexpected runs response: {}", e)))?;

        Ok(body.workflow_runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus},
        response::{IntoResponse, Response as AxumResponse},
        routing::get,
        Json, Router,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    /// In-process stand-in for the GitHub API
    #[derive(Default)]
    struct Fake {
        file: Option<(String, Vec<u8>)>,
        /// Served verbatim in place of the encoded body
        raw_content: Option<String>,
        next_sha: u32,
        seen_auth: Vec<String>,
        seen_refs: Vec<String>,
    }

    type Shared = Arc<Mutex<Fake>>;

    fn reject(headers: &AxumHeaders, fake: &Shared) -> Option<AxumResponse> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        fake.lock().seen_auth.push(auth.clone());

        match auth.as_str() {
            "Bearer bad" => Some(
                (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Bad credentials" }))).into_response(),
            ),
            "Bearer limited" => Some(
                (
                    AxumStatus::FORBIDDEN,
                    [("x-ratelimit-remaining", "0")],
                    Json(json!({ "message": "API rate limit exceeded" })),
                )
                    .into_response(),
            ),
            "Bearer broken" => Some(AxumStatus::BAD_GATEWAY.into_response()),
            _ => None,
        }
    }

    async fn get_contents(
        State(fake): State<Shared>,
        Path((_owner, _repo, _path)): Path<(String, String, String)>,
        Query(query): Query<HashMap<String, String>>,
        headers: AxumHeaders,
    ) -> AxumResponse {
        if let Some(rejection) = reject(&headers, &fake) {
            return rejection;
        }
        let mut fake = fake.lock();
        fake.seen_refs.push(query.get("ref").cloned().unwrap_or_default());
        match &fake.file {
            None => (AxumStatus::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response(),
            Some((sha, _)) if fake.raw_content.is_some() => {
                Json(json!({ "sha": sha, "content": fake.raw_content })).into_response()
            }
            Some((sha, bytes)) => {
                // GitHub wraps the encoded body every 60 characters
                let encoded = to_transport(bytes);
                let wrapped: Vec<String> = encoded
                    .as_bytes()
                    .chunks(60)
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect();
                Json(json!({ "sha": sha, "content": wrapped.join("\n") + "\n" })).into_response()
            }
        }
    }

    async fn put_contents(
        State(fake): State<Shared>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> AxumResponse {
        if let Some(rejection) = reject(&headers, &fake) {
            return rejection;
        }
        let mut fake = fake.lock();
        let sent_sha = body["sha"].as_str().map(str::to_string);
        match (&fake.file, &sent_sha) {
            (Some(_), None) => {
                return (
                    AxumStatus::UNPROCESSABLE_ENTITY,
                    Json(json!({ "message": "Invalid request.\n\n\"sha\" wasn't supplied." })),
                )
                    .into_response()
            }
            (Some((sha, _)), Some(sent)) if sha != sent => {
                return (
                    AxumStatus::CONFLICT,
                    Json(json!({ "message": "config.json does not match sha" })),
                )
                    .into_response()
            }
            _ => {}
        }

        let bytes = from_transport(body["content"].as_str().unwrap_or_default()).unwrap();
        fake.next_sha += 1;
        let sha = format!("sha{}", fake.next_sha);
        fake.file = Some((sha.clone(), bytes));
        let commit = format!("commit{}", fake.next_sha);
        (
            AxumStatus::CREATED,
            Json(json!({ "content": { "sha": sha }, "commit": { "sha": commit } })),
        )
            .into_response()
    }

    async fn delete_contents(
        State(fake): State<Shared>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> AxumResponse {
        if let Some(rejection) = reject(&headers, &fake) {
            return rejection;
        }
        let mut fake = fake.lock();
        let current = fake.file.as_ref().map(|(sha, _)| sha.clone());
        match current {
            Some(sha) if body["sha"] == json!(sha) => {
                fake.file = None;
                Json(json!({ "commit": {} })).into_response()
            }
            Some(_) => (AxumStatus::CONFLICT, Json(json!({ "message": "sha mismatch" }))).into_response(),
            None => (AxumStatus::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response(),
        }
    }

    async fn list_runs(State(fake): State<Shared>, headers: AxumHeaders) -> AxumResponse {
        if let Some(rejection) = reject(&headers, &fake) {
            return rejection;
        }
        Json(json!({
            "total_count": 2,
            "workflow_runs": [{
                "id": 7,
                "status": "completed",
                "conclusion": "success",
                "head_sha": "commit1",
                "created_at": "2024-05-01T12:00:00Z"
            }]
        }))
        .into_response()
    }

    async fn start_fake(fake: Shared) -> SocketAddr {
        let app = Router::new()
            .route(
                "/repos/:owner/:repo/contents/*path",
                get(get_contents).put(put_contents).delete(delete_contents),
            )
            .route("/repos/:owner/:repo/actions/runs", get(list_runs))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr) -> GitHubContentClient {
        GitHubContentClient::new(&ContentConfig {
            api_base: format!("http://{}", addr),
            owner: "acme".to_string(),
            repo: "site".to_string(),
            request_timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let client = client_for("127.0.0.1:1".parse().unwrap());
        assert_eq!(
            client.contents_url("/pages/my page/index.html"),
            "http://127.0.0.1:1/repos/acme/site/contents/pages/my%20page/index.html"
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let fake = Shared::default();
        let client = client_for(start_fake(fake.clone()).await);

        let fetched = client.fetch("good", "data/config.json", "main").await.unwrap();
        assert!(fetched.is_none());
        assert_eq!(fake.lock().seen_auth, ["Bearer good"]);
        assert_eq!(fake.lock().seen_refs, ["main"]);
    }

    #[tokio::test]
    async fn test_write_then_fetch_round_trips_unicode() {
        let fake = Shared::default();
        let client = client_for(start_fake(fake.clone()).await);
        let body = "{\n  \"title\": \"Résumé ⚽ 直播\",\n  \"padding\": \"".to_string()
            + &"x".repeat(200)
            + "\"\n}";

        let receipt = client
            .write("good", "data/config.json", body.as_bytes(), "CMS Update", None, "main")
            .await
            .unwrap();
        assert_eq!(receipt.fingerprint.as_str(), "sha1");
        assert_eq!(receipt.commit.as_deref(), Some("commit1"));

        let fetched = client.fetch("good", "data/config.json", "main").await.unwrap().unwrap();
        assert_eq!(fetched.fingerprint, receipt.fingerprint);
        assert_eq!(fetched.bytes, body.as_bytes());
    }

    #[tokio::test]
    async fn test_stale_fingerprint_is_conflict() {
        let fake = Shared::default();
        fake.lock().file = Some(("sha9".to_string(), b"{}".to_vec()));
        let client = client_for(start_fake(fake.clone()).await);

        let err = client
            .write("good", "data/config.json", b"{}", "CMS Update", Some(&Fingerprint::new("sha1")), "main")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(_)));

        let err = client
            .write("good", "data/config.json", b"{}", "CMS Update", None, "main")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Validation(ref m) if m.contains("sha")));

        assert_eq!(fake.lock().file.as_ref().unwrap().0, "sha9");
    }

    #[tokio::test]
    async fn test_auth_and_rate_limit_mapping() {
        let fake = Shared::default();
        let client = client_for(start_fake(fake).await);

        let err = client.fetch("bad", "data/config.json", "main").await.unwrap_err();
        assert_eq!(err, RemoteError::Unauthorized);

        let err = client.fetch("limited", "data/config.json", "main").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transient(_)));

        let err = client.list_pipeline_runs("broken", 1).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transient(_)));
    }

    #[tokio::test]
    async fn test_delete_and_list_runs() {
        let fake = Shared::default();
        fake.lock().file = Some(("sha3".to_string(), b"<html></html>".to_vec()));
        let client = client_for(start_fake(fake.clone()).await);

        client
            .delete("good", "dmca/index.html", &Fingerprint::new("sha3"), "Remove page", "main")
            .await
            .unwrap();
        assert!(fake.lock().file.is_none());

        let err = client
            .delete("good", "dmca/index.html", &Fingerprint::new("sha3"), "Remove page", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)));

        let runs = client.list_pipeline_runs("good", 1).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].outcome(), Some(crate::remote::RunConclusion::Success));
        assert_eq!(runs[0].head_sha.as_deref(), Some("commit1"));
        assert!(runs[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_undecodable_body_keeps_fingerprint() {
        let fake = Shared::default();
        {
            let mut fake = fake.lock();
            fake.file = Some(("sha5".to_string(), Vec::new()));
            fake.raw_content = Some("@@@ not base64".to_string());
        }
        let client = client_for(start_fake(fake).await);

        let err = client.fetch("good", "data/config.json", "main").await.unwrap_err();
        match err {
            RemoteError::Corrupt { fingerprint, .. } => assert_eq!(fingerprint.as_str(), "sha5"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(addr).fetch("good", "data/config.json", "main").await.unwrap_err();
        assert!(matches!(err, RemoteError::Transient(_)));
    }
}
