//! Firestore REST API client.
//!
//! - OAuth tokens cached with a refresh margin, re-fetched once on an expired-token 401
//! - pooled HTTP client with connect and request timeouts
//! - retry with exponential backoff and jitter on transient failures
//! - a tracing span and request metrics per call

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenCache;
use crate::types::{
    BatchWriteRequest, BatchWriteResponse, Document, RunQueryRequest, RunQueryResponse,
    StructuredQuery, Value, Write,
};

/// Firestore caps a batch write at 500 operations.
pub const MAX_BATCH_WRITES: usize = 500;

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator; skips OAuth when set
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                StoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(StoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
        })
    }

    fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => {
                let host = host.trim_end_matches('/');
                let host = if host.starts_with("http") {
                    host.to_string()
                } else {
                    format!("http://{}", host)
                };
                format!(
                    "{}/v1/projects/{}/databases/{}/documents",
                    host, self.project_id, self.database_id
                )
            }
            None => format!(
                "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
                self.project_id, self.database_id
            ),
        }
    }
}

#[derive(Clone)]
enum Auth {
    ServiceAccount(Arc<TokenCache>),
    /// Emulators accept any bearer token.
    Emulator,
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Auth,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> StoreResult<Self> {
        let auth = match config.emulator_host {
            Some(_) => Auth::Emulator,
            None => Auth::ServiceAccount(Arc::new(TokenCache::new(Self::create_auth_provider()?))),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("trender-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            config,
            auth,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn create_auth_provider() -> StoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env()
            .map_err(|e| StoreError::auth_error(format!("Failed to load service account: {}", e)))?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(StoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    async fn get_token(&self) -> StoreResult<String> {
        match &self.auth {
            Auth::ServiceAccount(cache) => cache.get_token().await,
            Auth::Emulator => Ok("owner".to_string()),
        }
    }

    async fn invalidate_token(&self) {
        if let Auth::ServiceAccount(cache) = &self.auth {
            cache.invalidate().await;
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Full resource name used in batch writes.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    /// Send a request with a bearer token, refreshing the token once if
    /// Firestore reports it expired.
    async fn send_authorized<F>(&self, build: F) -> StoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.get_token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(StoreError::from_http_status(
                401,
                format!("{} failed: {}", url, body),
            ));
        }

        self.invalidate_token().await;
        let token = self.get_token().await?;
        Ok(build(&token).send().await?)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Get a document, `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> StoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("get_document", collection, Some(doc_id), move || async move {
            let response = self
                .send_authorized(|token| self.http.get(url).bearer_auth(token))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Create a document. Fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        self.execute_request("create_document", collection, Some(doc_id), move || async move {
            let response = self
                .send_authorized(|token| self.http.post(url).bearer_auth(token).json(body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json::<Document>().await?),
                StatusCode::CONFLICT => Err(StoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Create or replace a whole document.
    pub async fn set_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let url = self.document_path(collection, doc_id);
        self.patch(
            "set_document",
            collection,
            doc_id,
            url,
            Document::new(fields),
        )
        .await
    }

    /// Update the masked fields of an existing document.
    ///
    /// Fails with `NotFound` rather than creating the document.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let mut mask: Vec<&String> = fields.keys().collect();
        mask.sort();
        let mut params: Vec<String> = mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.push("currentDocument.exists=true".to_string());
        let url = format!(
            "{}?{}",
            self.document_path(collection, doc_id),
            params.join("&")
        );

        self.patch(
            "update_document",
            collection,
            doc_id,
            url,
            Document::new(fields),
        )
        .await
    }

    async fn patch(
        &self,
        operation: &str,
        collection: &str,
        doc_id: &str,
        url: String,
        body: Document,
    ) -> StoreResult<Document> {
        let url = url.as_str();
        let body = &body;

        self.execute_request(operation, collection, Some(doc_id), move || async move {
            let response = self
                .send_authorized(|token| self.http.patch(url).bearer_auth(token).json(body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json::<Document>().await?),
                // A failed `exists` precondition comes back as 404 or 400 FAILED_PRECONDITION.
                StatusCode::NOT_FOUND => {
                    Err(StoreError::not_found(format!("{}/{}", collection, doc_id)))
                }
                StatusCode::BAD_REQUEST => {
                    let text = response.text().await.unwrap_or_default();
                    if text.contains("FAILED_PRECONDITION") || text.contains("NOT_FOUND") {
                        Err(StoreError::not_found(format!("{}/{}", collection, doc_id)))
                    } else {
                        Err(StoreError::from_http_status(400, format!("{} failed: {}", url, text)))
                    }
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let url = self.document_path(collection, doc_id);
        let url = url.as_str();

        self.execute_request("delete_document", collection, Some(doc_id), move || async move {
            let response = self
                .send_authorized(|token| self.http.delete(url).bearer_auth(token))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted", collection, doc_id);
                    Ok(())
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Queries and batches
    // =========================================================================

    /// Run a structured query over a top-level collection.
    pub async fn run_query(&self, query: StructuredQuery) -> StoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let url = url.as_str();
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };
        let request = &request;

        self.execute_request("run_query", &collection, None, move || async move {
            let response = self
                .send_authorized(|token| self.http.post(url).bearer_auth(token).json(request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    // runQuery streams a JSON array; results without a document carry only readTime.
                    let responses: Vec<RunQueryResponse> =
                        serde_json::from_str(&body).map_err(|e| {
                            StoreError::invalid_response(format!(
                                "Failed to parse runQuery response: {} (body prefix: {})",
                                e,
                                body.chars().take(200).collect::<String>()
                            ))
                        })?;
                    Ok(responses.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    /// Delete many documents, chunked by the batch write limit.
    pub async fn batch_delete(&self, collection: &str, doc_ids: &[String]) -> StoreResult<()> {
        for chunk in doc_ids.chunks(MAX_BATCH_WRITES) {
            let writes = chunk
                .iter()
                .map(|id| Write {
                    delete: Some(self.full_document_name(collection, id)),
                })
                .collect();
            self.batch_write(collection, writes).await?;
        }
        Ok(())
    }

    async fn batch_write(&self, collection: &str, writes: Vec<Write>) -> StoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let url = format!("{}:batchWrite", self.base_url);
        let url = url.as_str();
        let request = BatchWriteRequest { writes };
        let request = &request;

        self.execute_request("batch_write", collection, None, move || async move {
            let response = self
                .send_authorized(|token| self.http.post(url).bearer_auth(token).json(request))
                .await?;
            match response.status() {
                StatusCode::OK => response.json::<BatchWriteResponse>().await?.check_for_errors(),
                status => Err(Self::handle_error_response(status, url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Run a request with retry, a tracing span and request metrics.
    async fn execute_request<T, F, Fut>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        op: F,
    ) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id),
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, op)
            .instrument(span)
            .await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> StoreError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if let Some(secs) = retry_after {
                return StoreError::RateLimited(secs.saturating_mul(1000));
            }
        }
        let body = response.text().await.unwrap_or_default();
        StoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
