//! Request and response types for the update API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::zone::ZoneError;

//----------- ACME DNS ---------------------------------------------------------

/// The acme-dns style update body for `/acme/update`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AcmeUpdateRequest {
    pub subdomain: String,
    pub txt: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AcmeUpdateResponse {
    pub txt: String,
}

//----------- LEGO HTTP-req ----------------------------------------------------

/// The LEGO HTTP-req "default" body, shared by `/present` and `/cleanup`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LegoRequest {
    pub fqdn: String,
    #[serde(default)]
    pub value: String,
}

/// LEGO itself never reads the response, but acme.sh's acmeproxy mode expects
/// a copy of the original message.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LegoResponse {
    pub fqdn: String,
    pub value: String,
}

//----------- Generic record update --------------------------------------------

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ZmUpdateRequest {
    pub fqdn: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub values: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ZmUpdateResponse {
    pub fqdn: String,
    pub changed: bool,
}

//----------- ApiError ---------------------------------------------------------

/// A problem-details style error, serialized as the response body.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ApiError {
    pub title: String,
    pub detail: String,
    pub status: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, title: &str, detail: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            detail: detail.into(),
            status: status.as_u16(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad request", detail)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized access",
            "wrong username or password",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<ZoneError> for ApiError {
    fn from(err: ZoneError) -> Self {
        let (status, title) = match &err {
            ZoneError::ZoneNotFound { .. } => (StatusCode::NOT_FOUND, "zone not found"),
            ZoneError::RecordNotFound { .. } => (StatusCode::NOT_FOUND, "record not found"),
            ZoneError::UnknownRecordType { .. } | ZoneError::Parse(_) => {
                (StatusCode::BAD_REQUEST, "bad request")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "zone update failed"),
        };
        Self::new(status, title, err.to_string())
    }
}
