//! Error type for the HTTP layer

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::admission::AdmissionError;
use crate::api::response::ApiResponse;
use crate::identifier::IdentifierError;
use crate::models::AdmissionDecision;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(
        "Insufficient memory: need {} Mi, {} Mi available",
        .0.required_mi,
        .0.available_mi
    )]
    InsufficientMemory(Box<AdmissionDecision>),

    #[error("Kubernetes cluster unavailable: {0}")]
    ClusterUnavailable(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    /// A cluster read failed mid-request
    pub fn cluster(err: anyhow::Error) -> Self {
        AppError::ClusterUnavailable(format!("{:#}", err))
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InsufficientMemory(_) => "INSUFFICIENT_MEMORY",
            AppError::ClusterUnavailable(_) => "CLUSTER_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Identifier(_) | AppError::Admission(_) => "VALIDATION_ERROR",
            AppError::Serialization(_) => "JSON_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_) | AppError::Serialization(_)) {
            tracing::error!(error = %self, "Request failed");
        }

        let code = self.code();
        let message = self.to_string();
        match self {
            AppError::InsufficientMemory(decision) => match serde_json::to_value(&*decision) {
                Ok(details) => ApiResponse::error_with_details(code, message, details),
                Err(_) => ApiResponse::error(code, message),
            },
            _ => ApiResponse::error(code, message),
        }
        .into_response()
    }
}
