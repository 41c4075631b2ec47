use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

// =============================================================================
// RESPONSE TYPES - Lenient snapshots, absent keys decode to None
// =============================================================================

/// Account profile as returned by `parse/classes/_User/{objectId}`.
///
/// The four values the server nests under `statistics` are flattened into the
/// `statistics_*` fields. Serializing writes the server's shape back, minus the
/// echoed session and access tokens.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "UserPayload", into = "UserPayload")]
pub struct User {
    // Identification
    /// Server-assigned user id
    pub object_id: Option<String>,
    /// Login name, usually the e-mail address
    pub username: Option<String>,
    /// First name as entered in the app
    pub first_name: Option<String>,
    /// Session token echoed back by the server
    pub session_token: Option<String>,
    /// Access token echoed back by the server
    pub access_token: Option<String>,

    // Profile
    pub gender: Option<i64>,
    pub vehicle_type: Option<i64>,
    /// Two-letter country code, e.g. "NL"
    pub country_code: Option<String>,
    /// Locale, e.g. "nl-NL"
    pub locale: Option<String>,
    /// Whether the e-mail address has been validated
    pub validated: Option<bool>,

    // Parking and 4411 integration
    pub ev_4411_enabled: Option<bool>,
    pub parking_4411_enabled: Option<bool>,
    pub payment_method_4411_set: Option<bool>,
    pub has_4411_account: Option<bool>,
    pub parking_enabled: Option<bool>,

    // Flattened from `statistics`
    /// Highest recorded speed
    pub statistics_top_speed: Option<i64>,
    pub statistics_top_sprint: Option<i64>,
    pub statistics_travel_distance: Option<i64>,
    pub statistics_travel_time: Option<i64>,

    // Timestamps
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,

    /// Catch-all for any additional fields from the API
    pub extra: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    object_id: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    #[serde(skip_serializing)]
    session_token: Option<String>,
    #[serde(skip_serializing)]
    access_token: Option<String>,
    gender: Option<i64>,
    vehicle_type: Option<i64>,
    #[serde(rename = "country_code")]
    country_code: Option<String>,
    locale: Option<String>,
    validated: Option<bool>,
    #[serde(rename = "4411EvEnabled")]
    ev_4411_enabled: Option<bool>,
    #[serde(rename = "4411ParkingEnabled")]
    parking_4411_enabled: Option<bool>,
    #[serde(rename = "4411PaymentMethodSet")]
    payment_method_4411_set: Option<bool>,
    #[serde(rename = "has4411Account")]
    has_4411_account: Option<bool>,
    parking_enabled: Option<bool>,
    statistics: Option<UserStatistics>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    extra: HashMap<String, Value>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStatistics {
    top_speed: Option<i64>,
    top_sprint: Option<i64>,
    travel_distance: Option<i64>,
    travel_time: Option<i64>,
}

impl From<UserPayload> for User {
    fn from(payload: UserPayload) -> Self {
        let statistics = payload.statistics.unwrap_or_default();
        Self {
            object_id: payload.object_id,
            username: payload.username,
            first_name: payload.first_name,
            session_token: payload.session_token,
            access_token: payload.access_token,
            gender: payload.gender,
            vehicle_type: payload.vehicle_type,
            country_code: payload.country_code,
            locale: payload.locale,
            validated: payload.validated,
            ev_4411_enabled: payload.ev_4411_enabled,
            parking_4411_enabled: payload.parking_4411_enabled,
            payment_method_4411_set: payload.payment_method_4411_set,
            has_4411_account: payload.has_4411_account,
            parking_enabled: payload.parking_enabled,
            statistics_top_speed: statistics.top_speed,
            statistics_top_sprint: statistics.top_sprint,
            statistics_travel_distance: statistics.travel_distance,
            statistics_travel_time: statistics.travel_time,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            extra: payload.extra,
        }
    }
}

impl From<User> for UserPayload {
    fn from(user: User) -> Self {
        Self {
            object_id: user.object_id,
            username: user.username,
            first_name: user.first_name,
            session_token: user.session_token,
            access_token: user.access_token,
            gender: user.gender,
            vehicle_type: user.vehicle_type,
            country_code: user.country_code,
            locale: user.locale,
            validated: user.validated,
            ev_4411_enabled: user.ev_4411_enabled,
            parking_4411_enabled: user.parking_4411_enabled,
            payment_method_4411_set: user.payment_method_4411_set,
            has_4411_account: user.has_4411_account,
            parking_enabled: user.parking_enabled,
            statistics: Some(UserStatistics {
                top_speed: user.statistics_top_speed,
                top_sprint: user.statistics_top_sprint,
                travel_distance: user.statistics_travel_distance,
                travel_time: user.statistics_travel_time,
            }),
            created_at: user.created_at,
            updated_at: user.updated_at,
            extra: user.extra,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |token: &Option<String>| token.as_ref().map(|_| "<redacted>");
        f.debug_struct("User")
            .field("object_id", &self.object_id)
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("session_token", &redacted(&self.session_token))
            .field("access_token", &redacted(&self.access_token))
            .field("gender", &self.gender)
            .field("vehicle_type", &self.vehicle_type)
            .field("country_code", &self.country_code)
            .field("locale", &self.locale)
            .field("validated", &self.validated)
            .field("ev_4411_enabled", &self.ev_4411_enabled)
            .field("parking_4411_enabled", &self.parking_4411_enabled)
            .field("payment_method_4411_set", &self.payment_method_4411_set)
            .field("has_4411_account", &self.has_4411_account)
            .field("parking_enabled", &self.parking_enabled)
            .field("statistics_top_speed", &self.statistics_top_speed)
            .field("statistics_top_sprint", &self.statistics_top_sprint)
            .field("statistics_travel_distance", &self.statistics_travel_distance)
            .field("statistics_travel_time", &self.statistics_travel_time)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("extra", &self.extra)
            .finish()
    }
}

impl User {
    /// Decodes a user profile response.
    ///
    /// # Errors
    /// Returns [`Error::Json`] if a known field has an unexpected type.
    pub fn from_response(body: Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(body)?)
    }
}

/// Aggregate usage metrics from `parse/functions/fetchStatistics`.
///
/// List fields keep the order the server returned them in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub ambassador: Option<bool>,
    /// Country codes, e.g. `["NL", "DE", "BE"]`
    pub countries_visited: Option<Vec<String>>,
    pub fines_avoided: Option<i64>,
    pub km_driven: Option<i64>,
    pub navigation_finished: Option<i64>,
    pub parked_once: Option<bool>,
    /// ISO 3166-2 subdivision codes, e.g. `["NL-ZH", "BE-VAN"]`
    pub provinces_visited: Option<Vec<String>>,
    pub recruiter: Option<i64>,
    pub sec_driven: Option<i64>,
    pub times_in_traffic: Option<i64>,
    pub top_100_sprint_ms: Option<i64>,
    pub top_consecutive_days: Option<i64>,
    pub top_speed: Option<i64>,
    pub total_ratings: Option<i64>,
    pub ufo_km_driven: Option<i64>,
}

/// Cloud function responses nest their payload under `result`.
#[derive(Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

impl Statistics {
    /// Unwraps the `result` envelope and decodes the statistics inside it.
    ///
    /// # Errors
    /// Returns [`Error::MalformedResponse`] if the envelope is absent or null,
    /// and [`Error::Json`] if a known field has an unexpected type.
    pub fn from_response(body: Value) -> Result<Self, Error> {
        let envelope: Envelope<Self> = serde_json::from_value(body)?;
        envelope.result.ok_or_else(|| {
            Error::MalformedResponse("statistics response has no `result` envelope".into())
        })
    }
}

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Body of `parse/login`. The server expects a POST carrying a `_method`
/// override of `GET`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "_method")]
    pub method: &'static str,
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> LoginRequest<'a> {
    #[must_use]
    pub const fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            method: "GET",
            username,
            password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LoginRequest, Statistics, User};
    use crate::Error;
    use serde_json::json;

    #[test]
    fn user_flattens_nested_statistics() {
        let body = json!({
            "4411EvEnabled": false,
            "4411ParkingEnabled": true,
            "4411PaymentMethodSet": true,
            "firstName": "Dana",
            "gender": 1,
            "has4411Account": true,
            "objectId": "1EqBUC03nK",
            "parkingEnabled": true,
            "country_code": "NL",
            "createdAt": "2019-11-13T11:55:46.431Z",
            "statistics": {
                "topSpeed": 413,
                "topSprint": 1,
                "travelDistance": 59,
                "travelTime": 158_824_560_000_i64
            },
            "username": "flits@example.com",
            "vehicleType": 1,
            "authProviders": ["email", "apple"]
        });

        let user = User::from_response(body).unwrap();
        assert_eq!(user.first_name.as_deref(), Some("Dana"));
        assert_eq!(user.statistics_top_speed, Some(413));
        assert_eq!(user.statistics_travel_time, Some(158_824_560_000));
        assert_eq!(user.ev_4411_enabled, Some(false));
        assert_eq!(user.parking_4411_enabled, Some(true));
        assert_eq!(user.has_4411_account, Some(true));
        assert_eq!(user.country_code.as_deref(), Some("NL"));
        assert_eq!(user.created_at.map(|t| t.year()), Some(2019));
        assert!(user.extra.contains_key("authProviders"));
        assert!(!user.extra.contains_key("statistics"));
    }

    #[test]
    fn user_missing_fields_decode_to_none() {
        let user = User::from_response(json!({ "objectId": "abc" })).unwrap();
        assert_eq!(user.object_id.as_deref(), Some("abc"));
        assert_eq!(user.first_name, None);
        assert_eq!(user.statistics_top_speed, None);
        assert_eq!(user.statistics_travel_time, None);
    }

    #[test]
    fn user_json_reads_back_into_the_same_user() {
        let user = User::from_response(json!({
            "4411EvEnabled": false,
            "firstName": "Dana",
            "objectId": "1EqBUC03nK",
            "country_code": "NL",
            "createdAt": "2019-11-13T11:55:46.431Z",
            "statistics": { "topSpeed": 413, "travelTime": 158_824_560_000_i64 },
            "authProviders": ["email", "apple"]
        }))
        .unwrap();

        let written = serde_json::to_value(&user).unwrap();
        assert_eq!(written["firstName"], json!("Dana"));
        assert_eq!(written["statistics"]["topSpeed"], json!(413));
        assert_eq!(written["authProviders"], json!(["email", "apple"]));

        let back: User = serde_json::from_value(written).unwrap();
        assert_eq!(back, user);
        assert!(back.extra.keys().all(|key| key == "authProviders"));
    }

    #[test]
    fn user_echoed_tokens_are_not_printed() {
        let user = User::from_response(json!({
            "firstName": "Dana",
            "sessionToken": "r:echoed-session",
            "accessToken": "echoed-access-token"
        }))
        .unwrap();
        assert_eq!(user.session_token.as_deref(), Some("r:echoed-session"));

        let printed = format!("{user:?}");
        assert!(!printed.contains("echoed-session"));
        assert!(!printed.contains("echoed-access-token"));

        let written = serde_json::to_value(&user).unwrap();
        assert!(written.get("sessionToken").is_none());
        assert!(written.get("accessToken").is_none());
        assert_eq!(written["firstName"], json!("Dana"));
    }

    #[test]
    fn user_with_wrong_field_type_is_rejected() {
        let err = User::from_response(json!({ "gender": "one" })).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn statistics_unwraps_result_envelope() {
        let body = json!({
            "result": {
                "ambassador": true,
                "countries_visited": ["NL", "DE", "BE"],
                "fines_avoided": 210,
                "km_driven": 63550,
                "provinces_visited": ["NL-ZH", "NL-UT", "BE-VAN"],
                "top_100_sprint_ms": 4000,
                "ufo_km_driven": 30205
            }
        });

        let stats = Statistics::from_response(body).unwrap();
        assert_eq!(stats.fines_avoided, Some(210));
        assert_eq!(stats.km_driven, Some(63550));
        assert_eq!(
            stats.countries_visited,
            Some(vec!["NL".to_string(), "DE".to_string(), "BE".to_string()])
        );
        assert_eq!(stats.top_100_sprint_ms, Some(4000));
        assert_eq!(stats.ufo_km_driven, Some(30205));
        assert_eq!(stats.recruiter, None);
    }

    #[test]
    fn statistics_without_envelope_is_malformed() {
        let err = Statistics::from_response(json!({ "fines_avoided": 210 })).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));

        let err = Statistics::from_response(json!({ "result": null })).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn login_request_carries_method_override() {
        let body = serde_json::to_value(LoginRequest::new("flits@example.com", "hunter2")).unwrap();
        assert_eq!(
            body,
            json!({ "_method": "GET", "username": "flits@example.com", "password": "hunter2" })
        );
    }
}
