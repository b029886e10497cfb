//! # Remote API Client
//!
//! The REST calls a queued mutation is replayed with.
//!
//! ## Route Dispatch
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ReplayRoute              RemoteApi method        HTTP                 │
//! │  ───────────────────────  ──────────────────────  ──────────────────── │
//! │  CreateProduct            create_product          POST   products      │
//! │  UpdateProduct            update_product          PUT    products/{id} │
//! │  DeleteProduct            delete_product          DELETE products/{id} │
//! │  CreateCategory           create_category         POST   categories    │
//! │  UpdateCategory           update_category         PUT    categories/{id}│
//! │  DeleteCategory           delete_category         DELETE categories/{id}│
//! │  AddStockMovement         add_stock_movement      POST   inventory/    │
//! │                                                          movements     │
//! │  CreateSale               create_sale             POST   sales         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`dispatch`] matches every [`ReplayRoute`] exhaustively, so a new route
//! without a handler does not compile.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use tindahan_core::{CoreError, ReplayRoute, ValidationError, ID_FIELD};

// =============================================================================
// Remote API Trait
// =============================================================================

/// One async call per replay route.
///
/// Each call returns the server-canonical record on success. Update
/// payloads carry the target `_id`; deletes take the id alone.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_product(&self, payload: &Value) -> SyncResult<Value>;
    async fn update_product(&self, payload: &Value) -> SyncResult<Value>;
    async fn delete_product(&self, id: &str) -> SyncResult<Value>;

    async fn create_category(&self, payload: &Value) -> SyncResult<Value>;
    async fn update_category(&self, payload: &Value) -> SyncResult<Value>;
    async fn delete_category(&self, id: &str) -> SyncResult<Value>;

    async fn add_stock_movement(&self, payload: &Value) -> SyncResult<Value>;

    async fn create_sale(&self, payload: &Value) -> SyncResult<Value>;
}

fn target_id(payload: &Value) -> SyncResult<&str> {
    payload
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::from(ValidationError::required(ID_FIELD)).into())
}

/// Invokes the remote call for `route` with a stored payload.
pub async fn dispatch(
    api: &dyn RemoteApi,
    route: ReplayRoute,
    payload: &Value,
) -> SyncResult<Value> {
    match route {
        ReplayRoute::CreateProduct => api.create_product(payload).await,
        ReplayRoute::UpdateProduct => api.update_product(payload).await,
        ReplayRoute::DeleteProduct => api.delete_product(target_id(payload)?).await,
        ReplayRoute::CreateCategory => api.create_category(payload).await,
        ReplayRoute::UpdateCategory => api.update_category(payload).await,
        ReplayRoute::DeleteCategory => api.delete_category(target_id(payload)?).await,
        ReplayRoute::AddStockMovement => api.add_stock_movement(payload).await,
        ReplayRoute::CreateSale => api.create_sale(payload).await,
    }
}

// =============================================================================
// HTTP Client
// =============================================================================

/// Shared HTTP plumbing for the REST API: base URL, bearer token, timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> SyncResult<Self> {
        // Url::join replaces the last segment unless the base ends in '/'.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(ApiClient {
            client,
            base_url,
            token,
            timeout,
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(
            &config.api.base_url,
            config.api.token.clone(),
            config.request_timeout(),
        )
    }

    /// Resolves a route relative to the base URL.
    pub fn url(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            err.into()
        }
    }

    /// Sends a request and decodes the JSON answer.
    ///
    /// Non-2xx answers become [`SyncError::RemoteRejected`] carrying the
    /// response body. An empty body decodes to `null`.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let url = self.url(path)?;
        debug!(%method, %url, "Sending API request");

        let mut request = self.client.request(method, url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(SyncError::RemoteRejected {
                status: status.as_u16(),
                message: rejection_message(status, &text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the status of a bare GET, for reachability checks.
    pub async fn get_status(&self, path: &str) -> SyncResult<StatusCode> {
        let url = self.url(path)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        Ok(response.status())
    }
}

/// Picks `{"message": ...}` out of an error body when present.
fn rejection_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                body.trim().to_string()
            }
        })
}

/// Body of an update request: the payload without its `_id`.
fn update_body(payload: &Value) -> Value {
    match payload.as_object() {
        Some(fields) => {
            let mut fields = fields.clone();
            fields.remove(ID_FIELD);
            Value::Object(fields)
        }
        None => payload.clone(),
    }
}

// =============================================================================
// HTTP Remote API
// =============================================================================

/// [`RemoteApi`] over the store REST API.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    client: ApiClient,
}

impl HttpRemoteApi {
    pub fn new(client: ApiClient) -> Self {
        HttpRemoteApi { client }
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self::new(ApiClient::from_config(config)?))
    }

    async fn create(&self, collection: &str, payload: &Value) -> SyncResult<Value> {
        self.client
            .request_json(Method::POST, collection, Some(payload))
            .await
    }

    async fn update(&self, collection: &str, payload: &Value) -> SyncResult<Value> {
        let id = target_id(payload)?;
        let body = update_body(payload);
        self.client
            .request_json(Method::PUT, &format!("{collection}/{id}"), Some(&body))
            .await
    }

    async fn delete(&self, collection: &str, id: &str) -> SyncResult<Value> {
        self.client
            .request_json(Method::DELETE, &format!("{collection}/{id}"), None)
            .await
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn create_product(&self, payload: &Value) -> SyncResult<Value> {
        self.create("products", payload).await
    }

    async fn update_product(&self, payload: &Value) -> SyncResult<Value> {
        self.update("products", payload).await
    }

    async fn delete_product(&self, id: &str) -> SyncResult<Value> {
        self.delete("products", id).await
    }

    async fn create_category(&self, payload: &Value) -> SyncResult<Value> {
        self.create("categories", payload).await
    }

    async fn update_category(&self, payload: &Value) -> SyncResult<Value> {
        self.update("categories", payload).await
    }

    async fn delete_category(&self, id: &str) -> SyncResult<Value> {
        self.delete("categories", id).await
    }

    async fn add_stock_movement(&self, payload: &Value) -> SyncResult<Value> {
        self.create("inventory/movements", payload).await
    }

    async fn create_sale(&self, payload: &Value) -> SyncResult<Value> {
        self.create("sales", payload).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl Recording {
        fn record(&self, name: &str, value: Value) -> SyncResult<Value> {
            self.calls.lock().unwrap().push((name.to_string(), value.clone()));
            Ok(value)
        }
    }

    #[async_trait]
    impl RemoteApi for Recording {
        async fn create_product(&self, p: &Value) -> SyncResult<Value> {
            self.record("create_product", p.clone())
        }
        async fn update_product(&self, p: &Value) -> SyncResult<Value> {
            self.record("update_product", p.clone())
        }
        async fn delete_product(&self, id: &str) -> SyncResult<Value> {
            self.record("delete_product", json!(id))
        }
        async fn create_category(&self, p: &Value) -> SyncResult<Value> {
            self.record("create_category", p.clone())
        }
        async fn update_category(&self, p: &Value) -> SyncResult<Value> {
            self.record("update_category", p.clone())
        }
        async fn delete_category(&self, id: &str) -> SyncResult<Value> {
            self.record("delete_category", json!(id))
        }
        async fn add_stock_movement(&self, p: &Value) -> SyncResult<Value> {
            self.record("add_stock_movement", p.clone())
        }
        async fn create_sale(&self, p: &Value) -> SyncResult<Value> {
            self.record("create_sale", p.clone())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_matching_call() {
        let api = Recording::default();
        let movement = json!({"product": "p1", "type": "in", "quantity": 5, "reason": "restock"});

        dispatch(&api, ReplayRoute::AddStockMovement, &movement).await.unwrap();
        dispatch(&api, ReplayRoute::DeleteCategory, &json!({"_id": "c1"})).await.unwrap();

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0], ("add_stock_movement".to_string(), movement));
        assert_eq!(calls[1], ("delete_category".to_string(), json!("c1")));
    }

    #[tokio::test]
    async fn test_dispatch_delete_without_id_fails() {
        let api = Recording::default();
        let err = dispatch(&api, ReplayRoute::DeleteProduct, &json!({})).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidMutation(_)));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_url_join_keeps_base_path() {
        let client =
            ApiClient::new("http://localhost:5000/api", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("inventory/movements").unwrap().as_str(),
            "http://localhost:5000/api/inventory/movements"
        );
        assert_eq!(client.url("/test").unwrap().as_str(), "http://localhost:5000/api/test");

        let trailing =
            ApiClient::new("http://localhost:5000/api/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(trailing.url("sales").unwrap().as_str(), "http://localhost:5000/api/sales");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ApiClient::new("::nope::", None, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_update_body_strips_id() {
        let body = update_body(&json!({"_id": "p1", "price": 12}));
        assert_eq!(body, json!({"price": 12}));
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(StatusCode::BAD_REQUEST, r#"{"message":"Name required"}"#),
            "Name required"
        );
        assert_eq!(rejection_message(StatusCode::NOT_FOUND, ""), "Not Found");
        assert_eq!(rejection_message(StatusCode::BAD_GATEWAY, "upstream"), "upstream");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        // Port 9 (discard) on localhost is not served in test environments.
        let client =
            ApiClient::new("http://127.0.0.1:9/api", None, Duration::from_secs(2)).unwrap();
        let api = HttpRemoteApi::new(client);
        let err = api.create_sale(&json!({})).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }
}
