//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API, and the mapping
//! from engine errors to HTTP status codes.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use regraft_core::{Identifier, RegraftError, Service, StoreError, SubstitutionOutcome};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub calculation_count: u64,
    pub persistent: bool,
}

// =============================================================================
// CALCULATION RESPONSES
// =============================================================================

/// Identifier assigned to a posted calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: Identifier,
}

/// Service that issued an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub id: Identifier,
    pub service: Service,
}

// =============================================================================
// SUBSTITUTE REQUEST/RESPONSE
// =============================================================================

/// Replace `old` with `new` in the graph under `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteRequest {
    pub root: Identifier,
    pub old: Identifier,
    pub new: Identifier,
}

/// Substitution result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteResponse {
    pub result: Identifier,
    pub fetched: usize,
    pub posted: usize,
}

impl From<SubstitutionOutcome> for SubstituteResponse {
    fn from(outcome: SubstitutionOutcome) -> Self {
        Self {
            result: outcome.result,
            fetched: outcome.fetched,
            posted: outcome.posted,
        }
    }
}

// =============================================================================
// SEARCH REQUEST/RESPONSE
// =============================================================================

/// Find function applications named like `needle` under `root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub root: Identifier,
    pub needle: String,
}

/// Matching calculation identifiers, in identifier order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub matches: Vec<Identifier>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error ready to be sent as a response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), "{}", self.message);
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Transport(_) | StoreError::Malformed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<RegraftError> for ApiError {
    fn from(e: RegraftError) -> Self {
        let status = if e.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            match e {
                RegraftError::UnsupportedOperation(_) | RegraftError::MissingVariable(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other unreadable body is 400
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, rejection.body_text())
    }
}
