//! HTTP API handlers
//!
//! Handlers validate input, call the data layer, announce the change on the
//! event bus and hand notifications to the [`crate::services::Notifier`].
//! Path and query values are parsed here so malformed input gets the same
//! JSON error body as every other failure.

pub mod digests;
pub mod events;
pub mod health;
pub mod members;
pub mod proposals;
pub mod studio;
pub mod treasury;
pub mod votes;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Request,
    },
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// `axum::Json` with rejections rendered as [`ApiError`]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        axum::Json::<T>::from_request(req, state)
            .await
            .map(|axum::Json(value)| ApiJson(value))
            .map_err(|e: JsonRejection| ApiError::BadRequest(e.body_text()))
    }
}

/// `axum::extract::Query` with rejections rendered as [`ApiError`]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        axum::extract::Query::<T>::from_request_parts(parts, state)
            .await
            .map(|axum::extract::Query(value)| ApiQuery(value))
            .map_err(|e: QueryRejection| ApiError::BadRequest(e.body_text()))
    }
}

pub(crate) fn parse_id(value: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid id: {}", value)))
}

/// Parse an optional query parameter
pub(crate) fn parse_param<T>(name: &str, value: Option<&str>) -> ApiResult<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {}: {}", name, e))),
    }
}

/// Parse a required query parameter
pub(crate) fn require_param<T>(name: &str, value: Option<&str>) -> ApiResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    parse_param(name, value)?.ok_or_else(|| ApiError::BadRequest(format!("Missing {}", name)))
}

/// CSV download response
pub(crate) fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}
