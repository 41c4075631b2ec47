pub mod auth;
pub mod types;

pub use crate::auth::Auth;
use crate::types::LoginRequest;
pub use crate::types::{Statistics, User};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::Instrument;

pub const DEFAULT_BASE_URL: &str = "https://account.flitsmeister.app/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_TOKEN_HEADER: &str = "x-parse-session-token";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not authenticated; log in and attach the returned Auth first")]
    NotAuthenticated,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unreadable access token: {0}")]
    AccessToken(#[from] jsonwebtoken::errors::Error),
    #[error("access token expiry out of range: {0}")]
    AccessTokenExpiry(#[from] time::error::ComponentRange),
    #[error("invalid session token header: {0}")]
    SessionTokenHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Body of a response, decoded as JSON only when the server says it is JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    /// Returns the JSON value, treating a text body as a malformed response.
    ///
    /// # Errors
    /// Returns [`Error::MalformedResponse`] for a non-JSON body.
    pub fn into_json(self) -> Result<Value, Error> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Text(text) => Err(Error::MalformedResponse(format!(
                "expected a JSON body, got {} bytes of text",
                text.len()
            ))),
        }
    }
}

/// HTTP client handle plus whether this client created it.
#[derive(Debug)]
struct Session {
    http: Client,
    owned: bool,
}

/// Client for the Flitsmeister account API.
///
/// The HTTP session is either supplied with [`FlitsmeisterClient::with_session`]
/// (and then left alone by [`FlitsmeisterClient::close`]) or created on first
/// use, in which case this client owns it and releases it on `close` or drop.
///
/// A client is meant for one flow of control; wrap it in a lock before sharing
/// it between tasks.
#[derive(Debug)]
pub struct FlitsmeisterClient {
    session: Option<Session>,
    base_url: String,
    request_timeout: Duration,
    auth: Option<Auth>,
    span: tracing::Span,
}

impl Default for FlitsmeisterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FlitsmeisterClient {
    /// Creates a client against the production endpoint with a 10 second
    /// request timeout and no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auth: None,
            span: client_span(DEFAULT_BASE_URL),
        }
    }

    /// Uses a caller-owned HTTP client. It is shared, never closed by this client.
    #[must_use]
    pub fn with_session(mut self, http: Client) -> Self {
        self.session = Some(Session { http, owned: false });
        self
    }

    /// Sets the timeout applied to each whole round trip.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Attaches credentials from an earlier [`FlitsmeisterClient::login`].
    #[must_use]
    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Points the client at another origin. A trailing slash is added if missing.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.span = client_span(&base_url);
        self.base_url = base_url;
        self
    }

    pub fn set_auth(&mut self, auth: Option<Auth>) {
        self.auth = auth;
    }

    #[must_use]
    pub const fn auth(&self) -> Option<&Auth> {
        self.auth.as_ref()
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether an HTTP session is currently held, supplied or created.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the held HTTP session was created by this client.
    #[must_use]
    pub fn owns_session(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.owned)
    }

    /// Logs in with username and password and returns the resulting credentials.
    ///
    /// The credentials are not attached to this client; pass them to
    /// [`FlitsmeisterClient::with_auth`] or [`FlitsmeisterClient::set_auth`].
    ///
    /// # Errors
    /// Returns an error if the request fails, times out, or the response cannot
    /// be decoded into an [`Auth`].
    pub async fn login(&mut self, username: &str, password: &str) -> Result<Auth, Error> {
        let body = LoginRequest::new(username, password);
        let response = self
            .request(Method::POST, "parse/login", Some(serde_json::to_value(body)?))
            .await?
            .into_json()?;
        Auth::from_login_response(&response)
    }

    /// Retrieves the profile of the logged-in user.
    ///
    /// # Errors
    /// Returns [`Error::NotAuthenticated`] without touching the network if no
    /// credentials are attached or their object id is unknown, and request or
    /// decode errors otherwise.
    pub async fn user(&mut self) -> Result<User, Error> {
        let auth = self.auth.as_ref().ok_or(Error::NotAuthenticated)?;
        let object_id = auth.object_id().ok_or(Error::NotAuthenticated)?;
        let endpoint = format!("parse/classes/_User/{object_id}");
        let response = self.request(Method::GET, &endpoint, None).await?;
        User::from_response(response.into_json()?)
    }

    /// Retrieves aggregate usage statistics of the logged-in user.
    ///
    /// # Errors
    /// Returns [`Error::NotAuthenticated`] without touching the network if no
    /// credentials are attached, [`Error::MalformedResponse`] if the response
    /// lacks its `result` envelope, and request errors otherwise.
    pub async fn statistics(&mut self) -> Result<Statistics, Error> {
        if self.auth.is_none() {
            return Err(Error::NotAuthenticated);
        }
        let response = self
            .request(
                Method::POST,
                "parse/functions/fetchStatistics",
                Some(Value::Object(serde_json::Map::new())),
            )
            .await?;
        Statistics::from_response(response.into_json()?)
    }

    /// Sends one request to `path` under the base URL.
    ///
    /// Creates (and takes ownership of) an HTTP session if none is held. The
    /// session token header is attached whenever credentials are held.
    ///
    /// # Errors
    /// Returns [`Error::Timeout`] if the round trip exceeds the request timeout,
    /// and [`Error::Transport`] for connection failures and error statuses.
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ResponseBody, Error> {
        let timeout = self.request_timeout;
        let headers = self.headers()?;
        let url = format!("{}{}", self.base_url, path);
        let http = self.session().clone();

        send(&http, method, &url, headers, body.as_ref(), timeout)
            .instrument(self.span.clone())
            .await
    }

    /// Releases the HTTP session if this client created it. Safe to call more
    /// than once; a caller-supplied session is never touched.
    pub fn close(&mut self) {
        if self.owns_session() {
            let _entered = self.span.enter();
            tracing::debug!("closing owned HTTP session");
            self.session = None;
        }
    }

    fn session(&mut self) -> &Client {
        &self
            .session
            .get_or_insert_with(|| Session {
                http: Client::new(),
                owned: true,
            })
            .http
    }

    fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = &self.auth {
            headers.insert(
                SESSION_TOKEN_HEADER,
                HeaderValue::from_str(auth.session_token())?,
            );
        }
        Ok(headers)
    }
}

impl Drop for FlitsmeisterClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn client_span(base_url: &str) -> tracing::Span {
    tracing::debug_span!("flitsmeister", base_url = %base_url)
}

async fn send(
    http: &Client,
    method: Method,
    url: &str,
    headers: HeaderMap,
    body: Option<&Value>,
    timeout: Duration,
) -> Result<ResponseBody, Error> {
    tracing::debug!(%method, %url, "sending request");
    let mut request = http.request(method, url).headers(headers).timeout(timeout);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| transport_error(e, timeout))?;

    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));

    let text = response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout))?;
    tracing::debug!(%status, is_json, len = text.len(), "received response");
    tracing::trace!(body = %text);

    if is_json {
        Ok(ResponseBody::Json(serde_json::from_str(&text)?))
    } else {
        Ok(ResponseBody::Text(text))
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> Error {
    if error.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Transport(error)
    }
}
