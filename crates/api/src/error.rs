//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use query::QueryError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Command side error.
    Domain(DomainError),
    /// Query side error.
    Query(QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Query(err) => query_error_to_response(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::DuplicateKey { .. } => StatusCode::CONFLICT,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::BusinessRuleViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DomainError::Store(_) | DomainError::Envelope(_) | DomainError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn query_error_to_response(err: QueryError) -> (StatusCode, String) {
    let status = match &err {
        QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
        QueryError::ReadStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateKind;

    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        let dup = DomainError::DuplicateKey {
            key: "email".into(),
            value: "a@test.com".into(),
        };
        assert_eq!(status_of(dup.into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(DomainError::not_found(AggregateKind::Book, "b1").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::BusinessRuleViolation("active loan".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DomainError::InvalidInput("name is required".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn query_not_found_is_404() {
        let err = QueryError::NotFound {
            aggregate: AggregateKind::Loan,
            id: "l1".into(),
        };
        assert_eq!(status_of(err.into()), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unparseable_command_id_is_404() {
        let err = crate::routes::resources::command_id::<domain::Member>("not-a-uuid")
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }
}
