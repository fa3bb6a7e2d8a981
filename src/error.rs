use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Erreurs remontées par les services jusqu'aux routes.
/// Le corps JSON garde le format historique de l'API : {"error": "..."}
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    /// Message volontairement générique : ne dit pas si le code existe
    #[error("Invalid activation code or this code has already been used")]
    InvalidActivationCode,

    #[error("You are already enrolled in this course")]
    AlreadyEnrolled { enrollment_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidActivationCode => StatusCode::BAD_REQUEST,
            AppError::AlreadyEnrolled { .. } => StatusCode::SEE_OTHER,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::AlreadyEnrolled { enrollment_id } => {
                let location = format!("/api/courses/enrollment/{}", enrollment_id);
                HttpResponse::SeeOther()
                    .insert_header((header::LOCATION, location.clone()))
                    .json(serde_json::json!({
                        "error": self.to_string(),
                        "enrollment_id": enrollment_id,
                        "location": location
                    }))
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "An internal server error occurred"
                }))
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "An internal server error occurred"
                }))
            }
            _ => HttpResponse::build(self.status_code()).json(serde_json::json!({
                "error": self.to_string()
            })),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_already_enrolled_redirects_to_status_page() {
        let id = Uuid::new_v4();
        let response = AppError::AlreadyEnrolled { enrollment_id: id }.error_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert_eq!(
            location.to_str().unwrap(),
            format!("/api/courses/enrollment/{}", id)
        );
    }

    #[actix_web::test]
    async fn test_database_details_are_not_leaked() {
        let response = AppError::Database(DbErr::Custom("relation users missing".into()))
            .error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("relation users missing"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidActivationCode.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    }
}
