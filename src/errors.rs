use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::JsonResponse;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    NotAuthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("Internal Server Error")]
    ServerError,
    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

#[derive(serde::Serialize)]
pub struct RequestErrorJsonWrapper {
    errors: RequestErrorJson,
}

#[derive(serde::Serialize)]
pub struct RequestErrorJson {
    body: Vec<String>,
}

impl RequestErrorJsonWrapper {
    pub fn new(error: &str) -> RequestErrorJsonWrapper {
        RequestErrorJsonWrapper {
            errors: RequestErrorJson {
                body: vec![error.to_string()],
            },
        }
    }
}

impl From<validator::ValidationErrors> for RequestError {
    fn from(value: validator::ValidationErrors) -> Self {
        Self::Validation(value.to_string())
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        let mut response = self.to_json_response().into_response();
        if matches!(self, RequestError::NotAuthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::Conflict(_) => StatusCode::CONFLICT,
            RequestError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            RequestError::Forbidden(_) => StatusCode::FORBIDDEN,
            RequestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RequestError::ServerError | RequestError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_json_response(&self) -> JsonResponse<RequestErrorJsonWrapper> {
        let json = match self {
            RequestError::DatabaseError(e) => {
                tracing::error!(error = %e, "database error");
                RequestErrorJsonWrapper::new("Internal Server Error")
            }
            RequestError::ServerError => {
                tracing::error!("internal server error");
                RequestErrorJsonWrapper::new("Internal Server Error")
            }
            other => RequestErrorJsonWrapper::new(&other.to_string()),
        };
        (self.status_code(), Json(json))
    }

    /// True when the error is SQLite rejecting a UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RequestError::DatabaseError(sqlx::Error::Database(e)) => {
                e.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}
