//! Remote sync client for the Track4Health HTTP API.
//!
//! Local storage is the source of truth; the remote API is best-effort.
//! Every call is a single request/response pair: no retries, no backoff.
//! Calls fail fast with [`Error::Offline`] when the environment reports
//! no connectivity.

use crate::storage::KeyValueStore;
use crate::store::RecordStore;
use crate::{AwarenessSession, ChildScreening, Error, Location, NewUser, Result, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

const INVALID_RESPONSE: &str = "Invalid response from server";

/// HTTP method of an API call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
    Head,
}

/// A request against an endpoint relative to the API base URL
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: &'static str,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, endpoint: &'static str) -> Self {
        Self {
            method,
            endpoint,
            query: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response: status code and body text
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Sends requests to the remote collaborator
pub trait Transport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Reports whether the environment currently has network access
pub trait Connectivity {
    fn is_online(&self) -> bool;
}

/// Connectivity fixed at construction (config flag or `--offline`)
#[derive(Clone, Copy, Debug)]
pub struct StaticConnectivity {
    online: bool,
}

impl StaticConnectivity {
    pub fn online() -> Self {
        Self { online: true }
    }

    pub fn offline() -> Self {
        Self { online: false }
    }
}

impl Connectivity for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online
    }
}

/// Blocking reqwest transport
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}/{}", self.base_url, request.endpoint);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
            Method::Head => self.client.head(&url),
        };

        let mut builder = builder.query(&request.query);
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();

        tracing::debug!(
            "{:?} {} -> {} ({} bytes)",
            request.method,
            request.endpoint,
            status,
            body.len()
        );
        Ok(ApiResponse { status, body })
    }
}

/// `{success, message, data | user | id}` response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    user: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

impl Envelope {
    fn parse(response: &ApiResponse) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(&response.body).map_err(|e| {
            tracing::warn!("Unparseable API response (HTTP {}): {}", response.status, e);
            Error::Api(INVALID_RESPONSE.into())
        })?;
        Ok(envelope)
    }

    /// Turn a failure envelope into an error carrying the server's message
    fn into_success(self, status: u16) -> Result<Self> {
        if self.success == Some(true) {
            return Ok(self);
        }
        Err(Error::Api(self.message.unwrap_or_else(|| {
            format!("Request failed (HTTP {})", status)
        })))
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<T> {
    let value = value.ok_or_else(|| Error::Api(INVALID_RESPONSE.into()))?;
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!("Unexpected API payload: {}", e);
        Error::Api(INVALID_RESPONSE.into())
    })
}

fn id_to_string(value: Option<Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::Api(INVALID_RESPONSE.into())),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncPayload<'a> {
    user_id: Option<&'a str>,
    awareness_sessions: &'a [AwarenessSession],
    child_screenings: &'a [ChildScreening],
}

/// Client for the remote API
pub struct ApiClient<T: Transport, C: Connectivity> {
    transport: T,
    connectivity: C,
}

impl<T: Transport, C: Connectivity> ApiClient<T, C> {
    pub fn new(transport: T, connectivity: C) -> Self {
        Self {
            transport,
            connectivity,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Send one request and parse the envelope, whatever its `success` flag
    fn exchange(&self, request: &ApiRequest) -> Result<(u16, Envelope)> {
        if !self.connectivity.is_online() {
            tracing::debug!("Skipping {} while offline", request.endpoint);
            return Err(Error::Offline);
        }

        let response = self.transport.send(request).map_err(|e| {
            tracing::error!("{} request failed: {}", request.endpoint, e);
            e
        })?;
        Ok((response.status, Envelope::parse(&response)?))
    }

    fn call(&self, request: ApiRequest) -> Result<Envelope> {
        let (status, envelope) = self.exchange(&request)?;
        envelope.into_success(status).map_err(|e| {
            tracing::warn!("{} returned failure: {}", request.endpoint, e);
            e
        })
    }

    /// Authenticate; `Ok(None)` means the server rejected the credentials
    ///
    /// Only an explicit `success: false` on a 2xx or 401 response counts as
    /// a rejection. Server faults and malformed envelopes are errors.
    pub fn login(&self, username: &str, password: &str) -> Result<Option<User>> {
        let request = ApiRequest::new(Method::Post, "login.php")
            .body(json!({ "username": username, "password": password }));

        let (status, envelope) = self.exchange(&request)?;
        let rejection = (200..300).contains(&status) || status == 401;
        match envelope.success {
            Some(false) if rejection => {
                tracing::info!(
                    "Login rejected for {}: {}",
                    username,
                    envelope.message.as_deref().unwrap_or("no message")
                );
                Ok(None)
            }
            _ => {
                let envelope = envelope.into_success(status).map_err(|e| {
                    tracing::warn!("login.php returned failure: {}", e);
                    e
                })?;
                let user: User = decode(envelope.user.or(envelope.data))?;
                tracing::info!("Logged in as {} ({})", user.username, user.role);
                Ok(Some(user))
            }
        }
    }

    pub fn get_users(&self) -> Result<Vec<User>> {
        let envelope = self.call(ApiRequest::new(Method::Get, "users.php"))?;
        decode(envelope.data)
    }

    /// Create a user; returns the id assigned by the server
    pub fn add_user(&self, user: &NewUser) -> Result<String> {
        let envelope = self
            .call(ApiRequest::new(Method::Post, "users.php").body(serde_json::to_value(user)?))?;
        id_to_string(envelope.id)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        self.call(ApiRequest::new(Method::Delete, "users.php").query("id", user_id))?;
        Ok(())
    }

    pub fn update_location(&self, user_id: &str, location: Location) -> Result<()> {
        let request = ApiRequest::new(Method::Post, "update_location.php").body(json!({
            "userId": user_id,
            "latitude": location.latitude,
            "longitude": location.longitude,
        }));
        self.call(request)?;
        Ok(())
    }

    pub fn fetch_awareness_sessions(&self) -> Result<Vec<AwarenessSession>> {
        let envelope = self.call(ApiRequest::new(Method::Get, "awareness_sessions.php"))?;
        decode(envelope.data)
    }

    pub fn upload_awareness_session(&self, session: &AwarenessSession) -> Result<String> {
        let request = ApiRequest::new(Method::Post, "awareness_sessions.php")
            .body(serde_json::to_value(session)?);
        let envelope = self.call(request)?;
        id_to_string(envelope.id).or_else(|_| Ok(session.id.to_string()))
    }

    pub fn delete_awareness_session(&self, id: Uuid) -> Result<()> {
        self.call(
            ApiRequest::new(Method::Delete, "awareness_sessions.php").query("id", id.to_string()),
        )?;
        Ok(())
    }

    pub fn fetch_screenings(&self) -> Result<Vec<ChildScreening>> {
        let envelope = self.call(ApiRequest::new(Method::Get, "screenings.php"))?;
        decode(envelope.data)
    }

    pub fn upload_screening(&self, screening: &ChildScreening) -> Result<String> {
        let request =
            ApiRequest::new(Method::Post, "screenings.php").body(serde_json::to_value(screening)?);
        let envelope = self.call(request)?;
        id_to_string(envelope.id).or_else(|_| Ok(screening.id.to_string()))
    }

    pub fn delete_screening(&self, id: Uuid) -> Result<()> {
        self.call(ApiRequest::new(Method::Delete, "screenings.php").query("id", id.to_string()))?;
        Ok(())
    }

    /// Upload both collections in one bulk request
    pub fn sync_all(
        &self,
        user_id: Option<&str>,
        awareness_sessions: &[AwarenessSession],
        child_screenings: &[ChildScreening],
    ) -> Result<()> {
        let payload = SyncPayload {
            user_id,
            awareness_sessions,
            child_screenings,
        };
        self.call(
            ApiRequest::new(Method::Post, "sync_data.php").body(serde_json::to_value(&payload)?),
        )?;
        tracing::info!(
            "Synced {} awareness sessions and {} screenings",
            awareness_sessions.len(),
            child_screenings.len()
        );
        Ok(())
    }

    /// Lightweight reachability check; failures only mean "show offline"
    pub fn probe(&self) -> bool {
        if !self.connectivity.is_online() {
            return false;
        }
        match self
            .transport
            .send(&ApiRequest::new(Method::Head, "db_config.php"))
        {
            Ok(response) => (200..400).contains(&response.status),
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Push every local record to the server
pub fn push_all<T, C, S>(
    api: &ApiClient<T, C>,
    store: &RecordStore<S>,
    user_id: Option<&str>,
) -> Result<()>
where
    T: Transport,
    C: Connectivity,
    S: KeyValueStore,
{
    api.sync_all(user_id, store.awareness_sessions(), store.child_screenings())
}

/// Merge the server's copies into the local collections
///
/// Server sessions replace local ones with the same id; sessions that only
/// exist locally are kept. Both fetches complete before anything local is
/// written.
pub fn pull_all<T, C, S>(api: &ApiClient<T, C>, store: &mut RecordStore<S>) -> Result<(usize, usize)>
where
    T: Transport,
    C: Connectivity,
    S: KeyValueStore,
{
    let awareness = api.fetch_awareness_sessions()?;
    let screenings = api.fetch_screenings()?;
    let counts = (awareness.len(), screenings.len());

    store.merge_awareness_sessions(awareness)?;
    store.merge_child_screenings(screenings)?;
    tracing::info!(
        "Pulled {} awareness sessions and {} screenings",
        counts.0,
        counts.1
    );
    Ok(counts)
}

/// Transport that replays canned responses and records requests
#[cfg(test)]
pub(crate) struct ScriptedTransport {
    responses: std::cell::RefCell<std::collections::VecDeque<Result<ApiResponse>>>,
    pub(crate) requests: std::cell::RefCell<Vec<ApiRequest>>,
}

#[cfg(test)]
impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            responses: Default::default(),
            requests: Default::default(),
        }
    }

    pub(crate) fn reply(self, status: u16, body: &str) -> Self {
        self.responses.borrow_mut().push_back(Ok(ApiResponse {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub(crate) fn fail(self, error: Error) -> Self {
        self.responses.borrow_mut().push_back(Err(error));
        self
    }
}

#[cfg(test)]
impl Transport for ScriptedTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Other("no scripted response".into())))
    }
}
