use actix_web::{get, post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    RegisteredResponse, ResendVerificationRequest, ResetPasswordRequest, VerifyEmailQuery,
};
use crate::services::auth_service::{
    AuthService, RESET_REQUESTED_MESSAGE, VERIFICATION_RESENT_MESSAGE,
};
use crate::services::email_service::EmailService;

/// POST /auth/register - Créer un compte (PUBLIC), inactif jusqu'à vérification
#[post("/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    let user = AuthService::register(db.get_ref(), emails.get_ref(), &body).await?;

    Ok(HttpResponse::Created().json(RegisteredResponse {
        user_id: user.id,
        username: user.username,
        email: user.email,
        message: "Account created. Please check your email to verify your account.".to_string(),
    }))
}

/// POST /auth/login - Se connecter (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let response = AuthService::login(db.get_ref(), &body).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /auth/me - Vérifier le token (PROTÉGÉE)
#[get("/me")]
pub async fn me(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let response = AuthService::me(db.get_ref(), &auth_user).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /auth/change-password - Changer son mot de passe (PROTÉGÉE)
#[post("/change-password")]
pub async fn change_password(
    auth_user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    AuthService::change_password(db.get_ref(), auth_user.user_id, &body).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Password changed successfully"
    })))
}

/// GET /auth/verify-email?token=... - Lien envoyé par email
#[get("/verify-email")]
pub async fn verify_email(
    query: web::Query<VerifyEmailQuery>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    let user = AuthService::verify_email(db.get_ref(), emails.get_ref(), query.token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "username": user.username,
        "message": "Your email has been verified. You can now log in."
    })))
}

#[post("/resend-verification")]
pub async fn resend_verification(
    body: web::Json<ResendVerificationRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    AuthService::resend_verification(db.get_ref(), emails.get_ref(), &body.email).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": VERIFICATION_RESENT_MESSAGE
    })))
}

#[post("/forgot-password")]
pub async fn forgot_password(
    body: web::Json<ForgotPasswordRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;
    AuthService::forgot_password(db.get_ref(), emails.get_ref(), &body.email).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": RESET_REQUESTED_MESSAGE
    })))
}

#[post("/reset-password")]
pub async fn reset_password(
    body: web::Json<ResetPasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    AuthService::reset_password(db.get_ref(), &body).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Your password has been reset. You can now log in."
    })))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(register)
            .service(login)
            .service(me)
            .service(change_password)
            .service(verify_email)
            .service(resend_verification)
            .service(forgot_password)
            .service(reset_password)
    );
}
