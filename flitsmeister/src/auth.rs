use crate::Error;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;

/// Credentials obtained from a successful login.
///
/// The session token and access token are kept verbatim. The user id and the
/// access token expiry are read from the access token payload without checking
/// its signature: the signing key never reaches the client, so the only trust
/// boundary is the TLS connection to the account server.
///
/// An `Auth` is never refreshed in place. Once the access token has expired a
/// new one has to be obtained with [`crate::FlitsmeisterClient::login`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredAuth", into = "StoredAuth")]
pub struct Auth {
    object_id: Option<String>,
    session_token: String,
    access_token: String,
    access_token_expires: Option<OffsetDateTime>,
}

/// Persisted form of [`Auth`]; the derived claims are recomputed on load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAuth {
    session_token: String,
    access_token: String,
}

#[derive(Deserialize)]
struct AccessTokenClaims {
    sub: Option<String>,
    exp: Option<i64>,
}

impl Auth {
    /// Builds credentials from a session token and access token, e.g. a pair
    /// persisted from an earlier login.
    ///
    /// # Errors
    /// Returns [`Error::AccessToken`] if the access token cannot be read as a
    /// JWT, or [`Error::AccessTokenExpiry`] if its `exp` claim is out of range.
    /// An access token that has already expired is not an error: the returned
    /// `Auth` simply has no object id and no expiry.
    pub fn new(
        session_token: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::decode_at(
            session_token.into(),
            access_token.into(),
            OffsetDateTime::now_utc(),
        )
    }

    /// Decodes the body of a `parse/login` response. Keys other than
    /// `sessionToken` and `accessToken` are ignored.
    ///
    /// # Errors
    /// Returns [`Error::MalformedResponse`] if either token is missing, and the
    /// errors of [`Auth::new`] otherwise.
    pub fn from_login_response(body: &Value) -> Result<Self, Error> {
        let token = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| {
                    Error::MalformedResponse(format!("login response has no `{key}` string"))
                })
        };
        Self::new(token("sessionToken")?, token("accessToken")?)
    }

    fn decode_at(
        session_token: String,
        access_token: String,
        now: OffsetDateTime,
    ) -> Result<Self, Error> {
        let claims = read_claims(&access_token)?;
        let expires = claims
            .exp
            .map(OffsetDateTime::from_unix_timestamp)
            .transpose()?;

        let mut auth = Self {
            object_id: None,
            session_token,
            access_token,
            access_token_expires: None,
        };
        match expires {
            Some(expires) if expires < now => {
                tracing::debug!(%expires, "access token already expired, leaving claims unset");
            }
            _ => {
                auth.object_id = claims.sub;
                auth.access_token_expires = expires;
            }
        }
        Ok(auth)
    }

    /// Server-assigned user id, taken from the access token `sub` claim.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Value sent in the `x-parse-session-token` header.
    #[must_use]
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Expiry taken from the access token `exp` claim.
    #[must_use]
    pub const fn access_token_expires(&self) -> Option<OffsetDateTime> {
        self.access_token_expires
    }

    /// Whether the access token has expired as of now. An `Auth` whose expiry
    /// could not be derived always counts as expired.
    #[must_use]
    pub fn is_access_token_expired(&self) -> bool {
        self.is_access_token_expired_at(OffsetDateTime::now_utc())
    }

    /// Same as [`Auth::is_access_token_expired`], evaluated at `now`.
    #[must_use]
    pub fn is_access_token_expired_at(&self, now: OffsetDateTime) -> bool {
        self.access_token_expires
            .map_or(true, |expires| now > expires)
    }
}

fn read_claims(token: &str) -> Result<AccessTokenClaims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("object_id", &self.object_id)
            .field("session_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("access_token_expires", &self.access_token_expires)
            .finish()
    }
}

impl TryFrom<StoredAuth> for Auth {
    type Error = Error;

    fn try_from(stored: StoredAuth) -> Result<Self, Self::Error> {
        Self::new(stored.session_token, stored.access_token)
    }
}

impl From<Auth> for StoredAuth {
    fn from(auth: Auth) -> Self {
        Self {
            session_token: auth.session_token,
            access_token: auth.access_token,
        }
    }
}
