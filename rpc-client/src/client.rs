//! RpcClient - the main interface for odoo-rpc.
//!
//! This module provides [`RpcClient`], which composes the envelope builder,
//! the preflight negotiator, a [`Transport`] and the error classifier into a
//! single call primitive. Every higher-level operation (login, search,
//! generic method call, polling) is a thin parameter-shaping wrapper over
//! [`RpcClient::call`].
//!
//! # Architecture
//!
//! The classifier (from rpc-core) is pure and returns the actions a failure
//! implies. The client interprets them: it clears the session store,
//! broadcasts [`SessionEvent`]s and notifies error interceptors before the
//! error reaches the caller.
//!
//! ```text
//! Application → RpcClient → Negotiator (once) → EnvelopeBuilder → Transport
//!                   ↓
//!              rpc-core (classify, merge_context)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use odoo_rpc_client::{ClientConfig, MockTransport, RpcClient};
//!
//! let client = RpcClient::new(ClientConfig::new("https://erp.example.com"), transport);
//! client.login("acme", "bob", "secret").await?;
//! let partners = client
//!     .search_read(SearchRead::new("res.partner").with_fields(json!(["name"])))
//!     .await?;
//! ```

use async_trait::async_trait;
use futures_util::future::{try_join_all, FutureExt};
use parking_lot::RwLock;
use rpc_core::{
    classify, merge_context, Action, Classification, ClassifiedError, ErrorKind, SessionEvent,
    SessionMode,
};
use rpc_types::{
    LoginResult, ProxyAction, ProxyResult, RpcResponse, SessionInfo, SessionToken, SyncPage,
    SyncPageRequest, TypesError, VersionInfo,
};
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::envelope::EnvelopeBuilder;
use crate::preflight::Negotiator;
use crate::session::{MemorySessionStore, SessionStore};
use crate::sync::{DeltaSource, SyncConfig, SyncHandle, SYNC_METHOD};
use crate::transport::{HttpRequest, Transport};

/// Version probe endpoint.
pub const VERSION_INFO_PATH: &str = "/web/webclient/version_info";
/// Username/password authentication.
pub const AUTHENTICATE_PATH: &str = "/web/session/authenticate";
/// PIN authentication.
pub const AUTHENTICATE_PIN_PATH: &str = "/web/session/authenticate_pin";
/// Current session description.
pub const SESSION_INFO_PATH: &str = "/web/session/get_session_info";
/// Database listing.
pub const DB_LIST_PATH: &str = "/web/database/get_list";
/// Domain search returning field values.
pub const SEARCH_READ_PATH: &str = "/web/dataset/search_read";
/// Generic model method call.
pub const CALL_KW_PATH: &str = "/web/dataset/call_kw";
/// Button (workflow action) call.
pub const CALL_BUTTON_PATH: &str = "/web/dataset/call_button";
/// Long-polling bus.
pub const POLL_PATH: &str = "/longpolling/poll";

const EVENT_CAPACITY: usize = 16;

/// Observer notified of every classified error, in registration order.
pub type ErrorInterceptor = Arc<dyn Fn(&ClassifiedError) + Send + Sync>;

/// Parameters of a `search_read` request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRead {
    /// Model to search.
    pub model: String,
    /// Search domain (default: match everything).
    pub domain: Value,
    /// Fields to return (default: all).
    pub fields: Value,
    /// Caller context, merged over the session context.
    pub context: Option<Value>,
    /// Maximum number of records.
    pub limit: Option<u32>,
    /// Sort specification, e.g. `"name asc"`.
    pub sort: Option<String>,
}

impl SearchRead {
    /// Search every record of `model`.
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            domain: json!([]),
            fields: json!([]),
            context: None,
            limit: None,
            sort: None,
        }
    }

    /// Set the domain.
    pub fn with_domain(mut self, domain: Value) -> Self {
        self.domain = domain;
        self
    }

    /// Set the returned fields.
    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }

    /// Set the caller context.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the record limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the sort order.
    pub fn with_sort(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_string());
        self
    }
}

/// Session-aware JSON-RPC client.
///
/// Cloning is cheap; clones share the session, negotiated mode, context,
/// interceptors and event channel.
pub struct RpcClient<T: Transport> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T: Transport> {
    config: ClientConfig,
    transport: T,
    store: Arc<dyn SessionStore>,
    builder: EnvelopeBuilder,
    negotiator: Negotiator,
    context: RwLock<Map<String, Value>>,
    interceptors: RwLock<Vec<ErrorInterceptor>>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> Clone for RpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for RpcClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("base_url", &self.inner.config.server.base_url)
            .field("mode", &self.inner.negotiator.mode())
            .field("logged_in", &self.inner.store.get().is_some())
            .finish()
    }
}

fn unclassified(error: ClassifiedError) -> Classification {
    Classification {
        error,
        actions: vec![],
    }
}

impl<T: Transport + 'static> RpcClient<T> {
    /// Create a client with an in-memory session store.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_session_store(config, transport, Arc::new(MemorySessionStore::new()))
    }

    /// Create a client backed by an application-provided session store.
    pub fn with_session_store(
        config: ClientConfig,
        transport: T,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let builder = EnvelopeBuilder::new(
            &config.server.base_url,
            config.server.authorization.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ClientInner {
                context: RwLock::new(config.context.clone()),
                config,
                transport,
                store,
                builder,
                negotiator: Negotiator::new(),
                interceptors: RwLock::new(Vec::new()),
                events,
            }),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Negotiated session mode ([`SessionMode::Unknown`] before the first call).
    pub fn session_mode(&self) -> SessionMode {
        self.inner.negotiator.mode()
    }

    /// Current session token.
    pub fn session_token(&self) -> Option<SessionToken> {
        self.inner.store.get()
    }

    /// Default request context applied to generic calls.
    pub fn context(&self) -> Map<String, Value> {
        self.inner.context.read().clone()
    }

    /// Register an error interceptor.
    ///
    /// Interceptors run in registration order for every classified error.
    /// A panicking interceptor is logged and skipped.
    pub fn add_error_interceptor<F>(&self, interceptor: F)
    where
        F: Fn(&ClassifiedError) + Send + Sync + 'static,
    {
        self.inner.interceptors.write().push(Arc::new(interceptor));
    }

    /// Subscribe to process-wide session events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Negotiate the session mode if no probe has succeeded yet.
    pub async fn ensure_negotiated(&self) -> SessionMode {
        let client = self.clone();
        self.inner
            .negotiator
            .ensure_negotiated(move || async move { client.probe_version().await }.boxed())
            .await
    }

    async fn probe_version(&self) -> Result<String, ClassifiedError> {
        let result = self
            .exchange_raw(VERSION_INFO_PATH, json!({}), None)
            .await
            .map_err(|classification| classification.error)?;
        let info = VersionInfo::from_value(result)
            .map_err(|e| ClassifiedError::transport(format!("malformed version info: {}", e)))?;
        Ok(info.server_serie.unwrap_or_default())
    }

    // =========================================================================
    // Core call
    // =========================================================================

    /// Perform one logical RPC call.
    ///
    /// Proxied multi-action results are expanded into concurrent sub-calls and
    /// resolve to the list of their bodies.
    ///
    /// # Errors
    ///
    /// Returns the [`ClassifiedError`] for transport failures and server error
    /// payloads, after its side effects have run and interceptors have seen it.
    pub async fn call(&self, path: &str, params: Value) -> Result<Value, ClassifiedError> {
        self.call_inner(path, params, None).await
    }

    /// Like [`call`](Self::call), tagging the request with a correlation id.
    pub async fn call_correlated(
        &self,
        path: &str,
        params: Value,
        correlation_id: &str,
    ) -> Result<Value, ClassifiedError> {
        self.call_inner(path, params, Some(correlation_id)).await
    }

    async fn call_inner(
        &self,
        path: &str,
        params: Value,
        correlation_id: Option<&str>,
    ) -> Result<Value, ClassifiedError> {
        self.ensure_negotiated().await;
        let result = self
            .exchange_raw(path, params, correlation_id)
            .await
            .map_err(|classification| self.reject(classification))?;

        match ProxyResult::detect(&result) {
            None => Ok(result),
            Some(Ok(proxy)) => self.fan_out(proxy).await,
            Some(Err(e)) => Err(self.malformed("proxy result", e, result)),
        }
    }

    async fn exchange_raw(
        &self,
        path: &str,
        params: Value,
        correlation_id: Option<&str>,
    ) -> Result<Value, Classification> {
        let token = self.inner.store.get();
        let envelope = self.inner.builder.build(
            path,
            params,
            self.inner.negotiator.mode(),
            token.as_ref(),
            correlation_id,
        );
        tracing::debug!("Sending {} to {}", envelope.request_id, path);

        let request = envelope
            .into_http()
            .map_err(|e| unclassified(ClassifiedError::transport(e.to_string())))?;
        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(|e| unclassified(ClassifiedError::transport(e.to_string())))?;

        let parsed = RpcResponse::from_bytes(&response.body).map_err(|e| {
            unclassified(ClassifiedError::new(
                ErrorKind::Transport,
                format!("HTTP {}: {}", response.status, e),
                Value::String(String::from_utf8_lossy(&response.body).into_owned()),
            ))
        })?;

        if let Some(error) = parsed.error {
            return Err(classify(&error));
        }
        match parsed.result {
            Some(result) => Ok(result),
            None if response.is_success() => Ok(Value::Null),
            None => Err(unclassified(ClassifiedError::transport(format!(
                "HTTP {} without result",
                response.status
            )))),
        }
    }

    async fn fan_out(&self, proxy: ProxyResult) -> Result<Value, ClassifiedError> {
        tracing::debug!(
            "Expanding proxied result into {} sub-calls",
            proxy.action_list.len()
        );
        let calls = proxy
            .action_list
            .into_iter()
            .map(|action| self.sub_call(action));
        try_join_all(calls)
            .await
            .map(Value::Array)
            .map_err(|error| self.reject(unclassified(error)))
    }

    /// One sub-action: a plain POST whose body is passed through unclassified.
    async fn sub_call(&self, action: ProxyAction) -> Result<Value, ClassifiedError> {
        let url = self.inner.builder.resolve_url(&action.url);
        let body = serde_json::to_vec(&action.params)
            .map_err(|e| ClassifiedError::transport(e.to_string()))?;
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        let response = self
            .inner
            .transport
            .send(HttpRequest::post(url.clone(), headers, body))
            .await
            .map_err(|e| {
                ClassifiedError::new(
                    ErrorKind::Transport,
                    format!("sub-call to {} failed: {}", url, e),
                    json!({ "url": url }),
                )
            })?;

        let text = || Value::String(String::from_utf8_lossy(&response.body).into_owned());
        if !response.is_success() {
            return Err(ClassifiedError::new(
                ErrorKind::Transport,
                format!("sub-call to {} returned HTTP {}", url, response.status),
                text(),
            ));
        }
        Ok(serde_json::from_slice(&response.body).unwrap_or_else(|_| text()))
    }

    /// Run the classifier's side effects, notify interceptors, hand back the error.
    fn reject(&self, classification: Classification) -> ClassifiedError {
        let Classification { error, actions } = classification;
        for action in actions {
            match action {
                Action::ClearSession => {
                    self.inner.store.delete();
                    tracing::info!("Session cleared: {}", error.kind);
                }
                Action::Broadcast(event) => {
                    if self.inner.events.send(event).is_err() {
                        tracing::debug!("No subscribers for {:?}", event);
                    }
                }
            }
        }

        tracing::warn!("RPC call failed: {}", error);
        self.notify_interceptors(&error);
        error
    }

    fn notify_interceptors(&self, error: &ClassifiedError) {
        let interceptors = self.inner.interceptors.read().clone();
        for (index, interceptor) in interceptors.iter().enumerate() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| interceptor(error))).is_err() {
                tracing::warn!("Error interceptor #{} panicked, skipping", index);
            }
        }
    }

    fn malformed(&self, what: &str, error: TypesError, cause: Value) -> ClassifiedError {
        self.reject(unclassified(ClassifiedError::new(
            ErrorKind::Transport,
            format!("malformed {}: {}", what, error),
            cause,
        )))
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Authenticate with a login and password.
    ///
    /// On success the returned session id is stored and the returned user
    /// context becomes the default context of later generic calls.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::WrongCredentials`] when the server answers without a user
    /// id, which also empties the session store. Any other classified call
    /// error is returned as is and leaves the store alone unless the error
    /// itself invalidated the session.
    pub async fn login(
        &self,
        db: &str,
        login: &str,
        password: &str,
    ) -> Result<LoginResult, ClassifiedError> {
        let params = json!({ "db": db, "login": login, "password": password });
        self.process_login(AUTHENTICATE_PATH, params).await
    }

    /// Authenticate with a PIN.
    pub async fn simple_login_with_pin(
        &self,
        db: &str,
        pin: &str,
    ) -> Result<LoginResult, ClassifiedError> {
        let params = json!({ "db": db, "pin": pin });
        self.process_login(AUTHENTICATE_PIN_PATH, params).await
    }

    async fn process_login(&self, path: &str, params: Value) -> Result<LoginResult, ClassifiedError> {
        let result = self.call(path, params).await?;

        let info = match SessionInfo::from_value(result.clone()) {
            Ok(info) if info.user_id().is_some() => info,
            _ => {
                self.inner.store.delete();
                return Err(self.reject(unclassified(ClassifiedError::wrong_credentials(result))));
            }
        };

        if let Some(token) = info.session_id.clone().filter(|t| !t.is_empty()) {
            self.inner.store.set(token);
        }
        let mut context = self.inner.config.context.clone();
        context.extend(info.user_context.clone());
        *self.inner.context.write() = context;

        tracing::info!("Logged in as uid {} on {:?}", info.uid, info.db);
        Ok(info)
    }

    /// Whether a session is active.
    ///
    /// Without `force` this only checks the session store. With `force` the
    /// server is asked, and the session id it reports is stored.
    pub async fn is_logged_in(&self, force: bool) -> Result<bool, ClassifiedError> {
        if !force {
            return Ok(self.inner.store.get().is_some_and(|t| !t.is_empty()));
        }
        let info = self.get_session_info().await?;
        if let Some(token) = info.session_id.clone().filter(|t| !t.is_empty()) {
            self.inner.store.set(token);
        }
        Ok(info.user_id().is_some())
    }

    /// Forget the session.
    ///
    /// With `force`, the current database is looked up and, when the session
    /// is bound to one, a login with empty credentials is attempted against it to invalidate server-side state.
    /// The outcome of that login is discarded.
    pub async fn logout(&self, force: bool) -> Result<(), ClassifiedError> {
        self.inner.store.delete();
        *self.inner.context.write() = self.inner.config.context.clone();
        tracing::info!("Logged out (force: {})", force);
        if !force {
            return Ok(());
        }

        let info = self.get_session_info().await?;
        match info.db.filter(|db| !db.is_empty()) {
            Some(db) => {
                if let Err(e) = self.login(&db, "", "").await {
                    tracing::debug!("Forced logout login discarded: {}", e);
                }
            }
            None => tracing::debug!("No database bound to the session, skipping forced login"),
        }
        Ok(())
    }

    /// Describe the current session.
    pub async fn get_session_info(&self) -> Result<SessionInfo, ClassifiedError> {
        let result = self.call(SESSION_INFO_PATH, json!({})).await?;
        SessionInfo::from_value(result.clone()).map_err(|e| self.malformed("session info", e, result))
    }

    /// Fetch the server version description.
    pub async fn get_server_info(&self) -> Result<VersionInfo, ClassifiedError> {
        let result = self.call(VERSION_INFO_PATH, json!({})).await?;
        VersionInfo::from_value(result.clone()).map_err(|e| self.malformed("version info", e, result))
    }

    /// List the databases the server exposes.
    pub async fn get_db_list(&self) -> Result<Vec<String>, ClassifiedError> {
        let result = self.call(DB_LIST_PATH, json!({})).await?;
        serde_json::from_value(result.clone())
            .map_err(|e| self.malformed("database list", TypesError::Deserialization(e), result))
    }

    // =========================================================================
    // Model operations
    // =========================================================================

    /// Search a model and read field values.
    pub async fn search_read(&self, query: SearchRead) -> Result<Value, ClassifiedError> {
        let context = merge_context(&self.context(), query.context.as_ref());
        let mut params = json!({
            "model": query.model,
            "domain": query.domain,
            "fields": query.fields,
            "context": context,
        });
        if let Some(limit) = query.limit {
            params["limit"] = json!(limit);
        }
        if let Some(sort) = query.sort {
            params["sort"] = json!(sort);
        }
        self.call(SEARCH_READ_PATH, params).await
    }

    /// Call a model method.
    ///
    /// `kwargs.context` is merged over the session context; caller keys win.
    pub async fn generic_call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Map<String, Value>,
    ) -> Result<Value, ClassifiedError> {
        self.generic_call_inner(model, method, args, kwargs, None).await
    }

    /// Like [`generic_call`](Self::generic_call), tagging the request with a
    /// correlation id.
    pub async fn generic_call_correlated(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Map<String, Value>,
        correlation_id: &str,
    ) -> Result<Value, ClassifiedError> {
        self.generic_call_inner(model, method, args, kwargs, Some(correlation_id))
            .await
    }

    async fn generic_call_inner(
        &self,
        model: &str,
        method: &str,
        args: Value,
        mut kwargs: Map<String, Value>,
        correlation_id: Option<&str>,
    ) -> Result<Value, ClassifiedError> {
        let caller_context = kwargs.remove("context");
        let context = merge_context(&self.context(), caller_context.as_ref());
        kwargs.insert("context".to_string(), Value::Object(context));

        let params = json!({
            "model": model,
            "method": method,
            "args": args,
            "kwargs": kwargs,
        });
        self.call_inner(CALL_KW_PATH, params, correlation_id).await
    }

    /// Trigger a button action on records.
    pub async fn call_button(
        &self,
        model: &str,
        method: &str,
        args: Value,
        context_id: Option<i64>,
        domain_id: Option<i64>,
    ) -> Result<Value, ClassifiedError> {
        let params = json!({
            "model": model,
            "method": method,
            "args": args,
            "context_id": context_id,
            "domain_id": domain_id,
        });
        self.call(CALL_BUTTON_PATH, params).await
    }

    /// Long-poll the bus on the configured channels.
    pub async fn poll(&self, last: u64) -> Result<Value, ClassifiedError> {
        let params = json!({
            "channels": self.inner.config.polling.channels,
            "last": last,
        });
        self.call(POLL_PATH, params).await
    }

    /// Start an incremental sync session driven by this client.
    pub fn start_sync(&self, config: SyncConfig) -> SyncHandle {
        SyncHandle::start(Arc::new(self.clone()), config)
    }
}

#[async_trait]
impl<T: Transport + 'static> DeltaSource for RpcClient<T> {
    async fn pull_page(&self, request: &SyncPageRequest) -> Result<SyncPage, ClassifiedError> {
        let result = self
            .generic_call(&request.model, SYNC_METHOD, request.to_call_args(), Map::new())
            .await?;
        SyncPage::from_value(result.clone()).map_err(|e| self.malformed("sync page", e, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReply, MockTransport};
    use std::sync::Mutex;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn client_for(series: &str) -> (RpcClient<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        transport.stub_result(VERSION_INFO_PATH, json!({ "server_serie": series }));
        let client = RpcClient::new(ClientConfig::new("http://erp"), transport.clone());
        (client, transport)
    }

    fn client() -> (RpcClient<MockTransport>, MockTransport) {
        client_for("12.0")
    }

    fn resumed_client(series: &str, token: &str) -> (RpcClient<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        transport.stub_result(VERSION_INFO_PATH, json!({ "server_serie": series }));
        let store = Arc::new(MemorySessionStore::with_token(SessionToken::new(token)));
        let client =
            RpcClient::with_session_store(ClientConfig::new("http://erp"), transport.clone(), store);
        (client, transport)
    }

    fn last_params(transport: &MockTransport, path: &str) -> Value {
        let requests = transport.requests_to(path);
        let request = requests.last().expect("request sent");
        request.json_body().expect("json body")["params"].clone()
    }

    fn session_expired_error() -> Value {
        json!({
            "code": 100,
            "message": "Odoo Session Expired",
            "data": { "name": "odoo.http.SessionExpiredException", "debug": "" }
        })
    }

    // ===========================================
    // Login Tests
    // ===========================================

    #[tokio::test]
    async fn login_without_uid_is_wrong_credentials() {
        let (client, transport) = client();
        transport.queue_result(AUTHENTICATE_PATH, json!({ "uid": null }));

        let err = client.login("acme", "bob", "x").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::WrongCredentials);
        assert!(client.session_token().is_none());
        assert_eq!(
            last_params(&transport, AUTHENTICATE_PATH),
            json!({ "db": "acme", "login": "bob", "password": "x" })
        );
    }

    #[tokio::test]
    async fn login_stores_token_and_adopts_context() {
        let (client, transport) = client();
        transport.queue_result(
            AUTHENTICATE_PATH,
            json!({ "uid": 7, "session_id": "S1", "user_context": { "lang": "en_US" } }),
        );
        transport.stub_result(CALL_KW_PATH, json!(true));

        let info = client.login("acme", "bob", "x").await.unwrap();
        assert_eq!(info.user_id(), Some(7));
        assert_eq!(client.session_token(), Some(SessionToken::new("S1")));

        client
            .generic_call("res.partner", "read", json!([[1]]), Map::new())
            .await
            .unwrap();
        let params = last_params(&transport, CALL_KW_PATH);
        assert_eq!(params["kwargs"]["context"]["lang"], "en_US");
        assert_eq!(params["method"], "read");

        let mut kwargs = Map::new();
        kwargs.insert("context".into(), json!({ "lang": "fr_FR", "tz": "UTC" }));
        client
            .generic_call("res.partner", "read", json!([[1]]), kwargs)
            .await
            .unwrap();
        let params = last_params(&transport, CALL_KW_PATH);
        assert_eq!(params["kwargs"]["context"], json!({ "lang": "fr_FR", "tz": "UTC" }));
    }

    #[tokio::test]
    async fn pin_login_uses_pin_endpoint() {
        let (client, transport) = client();
        transport.queue_result(AUTHENTICATE_PIN_PATH, json!({ "uid": 3, "session_id": "P1" }));

        client.simple_login_with_pin("acme", "1234").await.unwrap();

        assert_eq!(client.session_token().unwrap().as_str(), "P1");
        assert_eq!(
            last_params(&transport, AUTHENTICATE_PIN_PATH),
            json!({ "db": "acme", "pin": "1234" })
        );
    }

    #[tokio::test]
    async fn is_logged_in_checks_store_or_server() {
        let (client, transport) = resumed_client("12.0", "S1");
        assert!(client.is_logged_in(false).await.unwrap());
        assert!(transport.sent_requests().is_empty());

        transport.queue_result(SESSION_INFO_PATH, json!({ "uid": 3, "session_id": "S9" }));
        assert!(client.is_logged_in(true).await.unwrap());
        assert_eq!(client.session_token().unwrap().as_str(), "S9");

        transport.queue_result(SESSION_INFO_PATH, json!({ "uid": false, "session_id": "S10" }));
        assert!(!client.is_logged_in(true).await.unwrap());
    }

    #[tokio::test]
    async fn forced_logout_reauthenticates_with_empty_credentials() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_result(SESSION_INFO_PATH, json!({ "uid": false, "db": "acme" }));
        transport.queue_result(AUTHENTICATE_PATH, json!({ "uid": null }));

        client.logout(true).await.unwrap();

        assert!(client.session_token().is_none());
        let paths: Vec<String> = transport
            .sent_requests()
            .into_iter()
            .map(|r| r.url)
            .filter(|url| !url.ends_with(VERSION_INFO_PATH))
            .collect();
        assert_eq!(
            paths,
            vec![
                format!("http://erp{}", SESSION_INFO_PATH),
                format!("http://erp{}", AUTHENTICATE_PATH),
            ]
        );
        assert_eq!(
            last_params(&transport, AUTHENTICATE_PATH),
            json!({ "db": "acme", "login": "", "password": "" })
        );
    }

    #[tokio::test]
    async fn plain_logout_only_clears_store() {
        let (client, transport) = resumed_client("12.0", "S1");
        client.logout(false).await.unwrap();
        assert!(client.session_token().is_none());
        assert!(transport.sent_requests().is_empty());
    }

    #[tokio::test]
    async fn forced_logout_without_database_skips_login() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_result(SESSION_INFO_PATH, json!({ "uid": false }));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.add_error_interceptor(move |e: &ClassifiedError| {
            sink.lock().unwrap().push(e.kind.clone());
        });

        client.logout(true).await.unwrap();

        assert!(client.session_token().is_none());
        assert_eq!(transport.requests_to(SESSION_INFO_PATH).len(), 1);
        assert!(transport.requests_to(AUTHENTICATE_PATH).is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_transport_failure_keeps_stored_session() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_reply(AUTHENTICATE_PATH, MockReply::Fail("connection reset".into()));

        let err = client.login("acme", "bob", "x").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(client.session_token(), Some(SessionToken::new("S1")));
    }

    #[tokio::test]
    async fn login_wrong_credentials_clears_stored_session() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_result(AUTHENTICATE_PATH, json!({ "uid": false }));

        let err = client.login("acme", "bob", "x").await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::WrongCredentials);
        assert!(client.session_token().is_none());
    }

    // ===========================================
    // Negotiation and Envelope Tests
    // ===========================================

    #[tokio::test]
    async fn concurrent_first_calls_probe_once() {
        let (client, transport) = client();
        transport.set_latency(Duration::from_millis(20));
        transport.stub_result(CALL_KW_PATH, json!(true));

        let (a, b, c) = tokio::join!(
            client.generic_call("m", "a", json!([]), Map::new()),
            client.generic_call("m", "b", json!([]), Map::new()),
            client.generic_call("m", "c", json!([]), Map::new()),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(transport.requests_to(VERSION_INFO_PATH).len(), 1);
        assert_eq!(client.session_mode(), SessionMode::CookieOnly);
    }

    #[tokio::test]
    async fn session_id_in_body_for_series_9() {
        let (client, transport) = resumed_client("9.0", "S1");
        transport.stub_result(CALL_KW_PATH, json!(true));

        client.generic_call("m", "x", json!([]), Map::new()).await.unwrap();

        assert_eq!(client.session_mode(), SessionMode::BodyAndCookie);
        assert_eq!(last_params(&transport, CALL_KW_PATH)["session_id"], "S1");
        let request = transport.last_sent().unwrap();
        assert_eq!(request.header("X-Openerp-Session-Id"), Some("S1"));
    }

    #[tokio::test]
    async fn no_body_session_for_series_12() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.stub_result(CALL_KW_PATH, json!(true));

        client.generic_call("m", "x", json!([]), Map::new()).await.unwrap();

        assert!(last_params(&transport, CALL_KW_PATH).get("session_id").is_none());
        assert_eq!(
            transport.last_sent().unwrap().header("X-Openerp-Session-Id"),
            Some("S1")
        );
    }

    #[tokio::test]
    async fn failed_probe_is_retried_by_next_call() {
        let transport = MockTransport::new();
        transport.queue_reply(VERSION_INFO_PATH, MockReply::Fail("down".into()));
        transport.queue_result(VERSION_INFO_PATH, json!({ "server_serie": "8.0" }));
        transport.stub_result(CALL_KW_PATH, json!(1));
        let client = RpcClient::new(ClientConfig::new("http://erp"), transport.clone());

        client.generic_call("m", "x", json!([]), Map::new()).await.unwrap();
        assert_eq!(client.session_mode(), SessionMode::Unknown);

        client.generic_call("m", "x", json!([]), Map::new()).await.unwrap();
        assert_eq!(client.session_mode(), SessionMode::CookieOnly);
        assert_eq!(transport.requests_to(VERSION_INFO_PATH).len(), 2);
    }

    #[tokio::test]
    async fn generic_call_forwards_correlation_id() {
        let (client, transport) = client();
        transport.stub_result(CALL_KW_PATH, json!(true));

        client
            .generic_call_correlated("res.partner", "read", json!([[1]]), Map::new(), "job-7")
            .await
            .unwrap();
        let request = transport.last_sent().unwrap();
        assert_eq!(request.header("X-Request-Id"), Some("job-7"));
        assert_eq!(request.json_body().unwrap()["params"]["method"], "read");

        client
            .generic_call("res.partner", "read", json!([[1]]), Map::new())
            .await
            .unwrap();
        assert_eq!(transport.last_sent().unwrap().header("X-Request-Id"), None);
    }

    #[tokio::test]
    async fn correlation_and_authorization_headers() {
        let transport = MockTransport::new();
        transport.stub_result(VERSION_INFO_PATH, json!({ "server_serie": "12.0" }));
        transport.stub_result(DB_LIST_PATH, json!(["acme", "demo"]));
        let config = ClientConfig::new("http://erp").with_authorization("tok");
        let client = RpcClient::new(config, transport.clone());

        client
            .call_correlated(DB_LIST_PATH, json!({}), "job-1")
            .await
            .unwrap();
        let request = transport.last_sent().unwrap();
        assert_eq!(request.header("Authorization"), Some("Bearer tok"));
        assert_eq!(request.header("X-Request-Id"), Some("job-1"));

        assert_eq!(client.get_db_list().await.unwrap(), vec!["acme", "demo"]);
    }

    // ===========================================
    // Error Classification Side Effects
    // ===========================================

    #[tokio::test]
    async fn session_expiry_clears_store_broadcasts_and_notifies() {
        init_tracing();
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_error(CALL_KW_PATH, session_expired_error());
        let mut events = client.subscribe_events();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            client.add_error_interceptor(move |e: &ClassifiedError| {
                seen.lock().unwrap().push((tag, e.kind.clone()));
            });
        }

        let err = client
            .generic_call("m", "x", json!([]), Map::new())
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        assert!(client.session_token().is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SessionExpired);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("first", ErrorKind::SessionExpired),
                ("second", ErrorKind::SessionExpired)
            ]
        );
    }

    #[tokio::test]
    async fn not_found_broadcasts_possibly_stale_and_keeps_session() {
        let (client, transport) = resumed_client("12.0", "S1");
        transport.queue_error(
            CALL_KW_PATH,
            json!({
                "code": 200,
                "message": "Odoo Server Error",
                "data": { "name": "werkzeug.exceptions.NotFound", "debug": "" }
            }),
        );
        let mut events = client.subscribe_events();

        let err = client
            .generic_call("m", "x", json!([]), Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::ResourceNotFound);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::SessionPossiblyStale);
        assert!(client.session_token().is_some());
    }

    #[tokio::test]
    async fn panicking_interceptor_is_isolated() {
        init_tracing();
        let (client, transport) = client();
        transport.queue_error(CALL_KW_PATH, session_expired_error());

        let reached = Arc::new(Mutex::new(false));
        client.add_error_interceptor(|_| panic!("bad observer"));
        let flag = Arc::clone(&reached);
        client.add_error_interceptor(move |_| *flag.lock().unwrap() = true);

        let err = client
            .generic_call("m", "x", json!([]), Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::SessionExpired);
        assert!(*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn transport_failure_is_transport_kind() {
        let (client, transport) = client();
        transport.queue_reply(CALL_KW_PATH, MockReply::Fail("connection refused".into()));
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        client.add_error_interceptor(move |_| *counter.lock().unwrap() += 1);

        let err = client
            .generic_call("m", "x", json!([]), Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn unparseable_body_is_transport_with_raw_cause() {
        let (client, transport) = client();
        transport.queue_reply(CALL_KW_PATH, MockReply::Status(502, b"bad gateway".to_vec()));

        let err = client
            .generic_call("m", "x", json!([]), Map::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(err.cause, json!("bad gateway"));
    }

    #[tokio::test]
    async fn missing_result_is_null_on_success() {
        let (client, transport) = client();
        transport.queue_reply(CALL_KW_PATH, MockReply::Json(json!({ "jsonrpc": "2.0" })));

        let result = client.generic_call("m", "x", json!([]), Map::new()).await;
        assert_eq!(result.unwrap(), Value::Null);
    }

    // ===========================================
    // Proxied Multi-Action Tests
    // ===========================================

    fn proxy_result() -> Value {
        json!({
            "type": "ir.actions.act_proxy",
            "action_list": [
                { "url": "/report/a", "params": { "x": 1 } },
                { "url": "http://printer/b", "params": {} }
            ]
        })
    }

    #[tokio::test]
    async fn proxy_result_fans_out_and_aggregates() {
        let (client, transport) = client();
        transport.queue_result(CALL_BUTTON_PATH, proxy_result());
        transport.queue_reply("/report/a", MockReply::Json(json!({ "ok": 1 })));
        transport.queue_reply("/b", MockReply::Status(200, b"printed".to_vec()));

        let result = client
            .call_button("sale.order", "action_print", json!([[4]]), None, None)
            .await
            .unwrap();

        assert_eq!(result, json!([{ "ok": 1 }, "printed"]));
        let sub = transport.requests_to("/report/a");
        assert_eq!(sub[0].url, "http://erp/report/a");
        assert_eq!(sub[0].json_body().unwrap(), json!({ "x": 1 }));
        assert_eq!(transport.requests_to("/b")[0].url, "http://printer/b");
    }

    #[tokio::test]
    async fn proxy_fails_whole_when_a_sub_call_fails() {
        let (client, transport) = client();
        transport.queue_result(CALL_BUTTON_PATH, proxy_result());
        transport.queue_reply("/report/a", MockReply::Json(json!({ "ok": 1 })));
        transport.queue_reply("/b", MockReply::Status(500, b"jammed".to_vec()));

        let err = client
            .call_button("sale.order", "action_print", json!([[4]]), Some(1), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transport);
        assert_eq!(err.cause, json!("jammed"));
    }

    // ===========================================
    // Wrapper Parameter Tests
    // ===========================================

    #[tokio::test]
    async fn search_read_shapes_params() {
        let (client, transport) = client();
        transport.queue_result(SEARCH_READ_PATH, json!({ "records": [] }));

        client
            .search_read(
                SearchRead::new("res.partner")
                    .with_domain(json!([["active", "=", true]]))
                    .with_fields(json!(["name"]))
                    .with_limit(10)
                    .with_sort("name asc"),
            )
            .await
            .unwrap();

        let params = last_params(&transport, SEARCH_READ_PATH);
        assert_eq!(params["model"], "res.partner");
        assert_eq!(params["fields"], json!(["name"]));
        assert_eq!(params["limit"], 10);
        assert_eq!(params["sort"], "name asc");
        assert_eq!(params["context"], json!({}));
    }

    #[tokio::test]
    async fn poll_uses_configured_channels() {
        let (client, transport) = client();
        transport.queue_result(POLL_PATH, json!([]));

        client.poll(42).await.unwrap();

        let params = last_params(&transport, POLL_PATH);
        assert_eq!(params["channels"], json!(["notify_warning_1", "notify_info_1"]));
        assert_eq!(params["last"], 42);
    }

    #[tokio::test]
    async fn pull_page_calls_sync_method() {
        let (client, transport) = client();
        transport.queue_result(
            CALL_KW_PATH,
            json!({ "timekey": "t2", "remove_ids": [3], "data": { "5": { "name": "a" } } }),
        );
        let request = SyncPageRequest {
            model: "res.partner".into(),
            function_key: "partners".into(),
            base_domain: json!([]),
            filter_domain: json!([]),
            limit: 50,
            watermark: Some("t1".into()),
        };

        let page = client.pull_page(&request).await.unwrap();

        assert_eq!(page.remove_ids, vec![json!(3)]);
        let params = last_params(&transport, CALL_KW_PATH);
        assert_eq!(params["method"], SYNC_METHOD);
        assert_eq!(params["args"], json!(["partners", "t1", [], [], 50]));
    }
}
