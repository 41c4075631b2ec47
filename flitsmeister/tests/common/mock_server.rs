use flitsmeister::{Auth, FlitsmeisterClient};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use time::{Duration, OffsetDateTime};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OBJECT_ID: &str = "1EqBUC03nK";
pub const SESSION_TOKEN: &str = "r:b866a1f0c2";

pub struct FlitsmeisterMock {
    pub server: MockServer,
}

impl FlitsmeisterMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    pub fn fixture(name: &str) -> Value {
        let full_path = Self::fixtures_dir().join(name);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e))
    }

    /// Mounts a JSON response for `http_method` on `endpoint`, expected `times` times.
    pub async fn mount_json(&self, http_method: &str, endpoint: &str, body: &Value, times: u64) {
        Mock::given(method(http_method))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    pub fn base_url(&self) -> String {
        format!("{}/", self.server.uri())
    }

    /// Client without credentials.
    pub fn client(&self) -> FlitsmeisterClient {
        FlitsmeisterClient::new().with_base_url(self.base_url())
    }

    /// Client holding a valid, unexpired `Auth`.
    pub fn authenticated_client(&self) -> FlitsmeisterClient {
        self.client().with_auth(valid_auth())
    }
}

pub fn access_token(exp: OffsetDateTime) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": OBJECT_ID, "exp": exp.unix_timestamp() }),
        &EncodingKey::from_secret(b"known-only-to-the-server"),
    )
    .unwrap()
}

pub fn valid_access_token() -> String {
    access_token(OffsetDateTime::now_utc() + Duration::hours(1))
}

pub fn valid_auth() -> Auth {
    Auth::new(SESSION_TOKEN, valid_access_token()).unwrap()
}

pub fn login_response(access_token: &str) -> Value {
    json!({
        "objectId": OBJECT_ID,
        "sessionToken": SESSION_TOKEN,
        "accessToken": access_token,
        "username": "flits@example.com",
        "vehicleType": 1
    })
}
