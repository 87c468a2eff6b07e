use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::models::ModelError;
use crate::utils::chart::ChartError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Stock name not provided")]
    MissingSymbol,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Provider(String),

    #[error("No data found for {0}")]
    NoData(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("Background task failed: {0}")]
    Blocking(String),
}

impl From<BlockingError> for AppError {
    fn from(err: BlockingError) -> Self {
        AppError::Blocking(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingSymbol => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn missing_symbol_is_a_client_error() {
        let response = AppError::MissingSymbol.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"Stock name not provided"}"#);
    }

    #[actix_web::test]
    async fn upstream_failures_forward_the_message() {
        let response = AppError::Provider("No data found, symbol may be delisted".into()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "No data found, symbol may be delisted");
    }
}
