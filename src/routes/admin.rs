// Actions back-office (staff uniquement) : paiements, activation, maintenance

use actix_web::{post, web, HttpResponse};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{FlagOverdueQuery, MarkPaidRequest};
use crate::services::auth_service::AuthService;
use crate::services::email_service::EmailService;
use crate::services::enrollment_service::EnrollmentService;
use crate::services::payment_service::PaymentService;

/// POST /admin/installments/{id}/mark-paid - Corps optionnel : référence + notes
#[post("/installments/{id}/mark-paid")]
pub async fn mark_installment_paid(
    auth_user: AuthUser,
    path: web::Path<i32>,
    body: Option<web::Json<MarkPaidRequest>>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let body = body.map(|b| b.into_inner()).unwrap_or_default();

    let installment = PaymentService::mark_installment_paid(
        db.get_ref(),
        path.into_inner(),
        body.payment_reference,
        body.payment_notes,
    )
    .await?;

    Ok(HttpResponse::Ok().json(installment))
}

#[post("/installments/{id}/mark-verified")]
pub async fn mark_installment_verified(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let enrollment =
        PaymentService::mark_installment_verified(db.get_ref(), emails.get_ref(), path.into_inner())
            .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "enrollment_id": enrollment.id,
        "amount_paid": enrollment.amount_paid,
        "payment_status": enrollment.payment_status
    })))
}

#[post("/installments/{id}/send-reminder")]
pub async fn send_payment_reminder(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    PaymentService::send_reminder(db.get_ref(), emails.get_ref(), path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Payment reminder sent"
    })))
}

/// POST /admin/installments/flag-overdue?today=YYYY-MM-DD
#[post("/installments/flag-overdue")]
pub async fn flag_overdue(
    auth_user: AuthUser,
    query: web::Query<FlagOverdueQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let flagged = PaymentService::flag_overdue(db.get_ref(), today).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "flagged": flagged,
        "as_of": today
    })))
}

/// POST /admin/enrollments/{id}/mark-complete - Toutes les échéances vérifiées
#[post("/enrollments/{id}/mark-complete")]
pub async fn mark_enrollment_complete(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let enrollment =
        PaymentService::mark_enrollment_paid(db.get_ref(), emails.get_ref(), path.into_inner())
            .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "enrollment_id": enrollment.id,
        "amount_paid": enrollment.amount_paid,
        "payment_status": enrollment.payment_status
    })))
}

#[post("/enrollments/{id}/verify-payment")]
pub async fn verify_enrollment_payment(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let enrollment =
        PaymentService::verify_enrollment_payment(db.get_ref(), path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "enrollment_id": enrollment.id,
        "payment_status": enrollment.payment_status
    })))
}

#[post("/enrollments/{id}/activate")]
pub async fn activate_enrollment(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let enrollment =
        EnrollmentService::admin_activate(db.get_ref(), emails.get_ref(), path.into_inner())
            .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "enrollment_id": enrollment.id,
        "is_activated": enrollment.is_activated,
        "activated_at": enrollment.activated_at
    })))
}

#[post("/enrollments/{id}/send-activation")]
pub async fn send_activation_code(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    EnrollmentService::send_activation_code(db.get_ref(), emails.get_ref(), path.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Activation code sent"
    })))
}

/// POST /admin/maintenance/purge-tokens - Supprime les tokens expirés
#[post("/maintenance/purge-tokens")]
pub async fn purge_tokens(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    auth_user.require_staff()?;
    let (verification, reset) = AuthService::purge_expired_tokens(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "verification_tokens_deleted": verification,
        "password_reset_tokens_deleted": reset
    })))
}

// flag-overdue passe avant /installments/{id}/...
pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(flag_overdue)
            .service(mark_installment_paid)
            .service(mark_installment_verified)
            .service(send_payment_reminder)
            .service(mark_enrollment_complete)
            .service(verify_enrollment_payment)
            .service(activate_enrollment)
            .service(send_activation_code)
            .service(purge_tokens)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::header, http::StatusCode, test, App};
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::utils::jwt;

    #[actix_web::test]
    async fn test_non_staff_is_forbidden() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = test::init_service(
            App::new().app_data(web::Data::new(db)).configure(admin_routes),
        )
        .await;

        let token = jwt::generate_token(3, "learner", false).unwrap();
        let req = test::TestRequest::post()
            .uri("/admin/maintenance/purge-tokens")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_staff_flags_overdue_installments() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();
        let app = test::init_service(
            App::new().app_data(web::Data::new(db)).configure(admin_routes),
        )
        .await;

        let token = jwt::generate_token(1, "admin", true).unwrap();
        let req = test::TestRequest::post()
            .uri("/admin/installments/flag-overdue?today=2026-03-01")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["flagged"], 2);
        assert_eq!(body["as_of"], "2026-03-01");
    }
}
