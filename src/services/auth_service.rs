// ============================================================================
// SERVICE : COMPTES
// ============================================================================
//
// Description:
//   Inscription, vérification email, connexion, mots de passe.
//
// Workflow inscription:
//   1. register       : user INACTIF + profil (hook explicite) + token 24h
//   2. email "verification" avec le lien /api/auth/verify-email?token=...
//   3. verify_email   : active le user, profil vérifié, email "welcome"
//   4. login          : 403 tant que le compte n'est pas activé
//
// Points d'attention:
//   - forgot_password / resend_verification répondent toujours la même
//     chose : on ne révèle pas si un email a un compte
//   - Un token expiré est supprimé à la première tentative d'utilisation
//   - Inscription "guest" (depuis la page d'un cours) : compte activé tout
//     de suite, JWT renvoyé pour enchaîner sur l'inscription au cours
//
// ============================================================================

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    AuthResponse, ChangePasswordRequest, LoginRequest, MeResponse, RegisterRequest,
    ResetPasswordRequest,
};
use crate::models::user_profiles::{self, Role};
use crate::models::{email_verification_tokens, password_reset_tokens, users};
use crate::services::course_service::CourseService;
use crate::services::email_service::EmailService;
use crate::utils::{jwt, password};

pub const MAX_USERNAME_LENGTH: usize = 25;

/// Message unique de forgot-password, que l'email existe ou non
pub const RESET_REQUESTED_MESSAGE: &str =
    "If an account with this email exists, password reset instructions have been sent.";
pub const VERIFICATION_RESENT_MESSAGE: &str =
    "If an unverified account with this email exists, a new verification link has been sent.";

pub struct AuthService;

impl AuthService {
    /// Lettres, chiffres et underscore, 25 caractères max
    pub fn validate_username(username: &str) -> Result<(), AppError> {
        if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(AppError::Validation(format!(
                "Username must be 1 to {} characters",
                MAX_USERNAME_LENGTH
            )));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Validation(
                "Username can only contain letters, numbers, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// POST /auth/register : compte inactif jusqu'à vérification de l'email
    pub async fn register(
        db: &DatabaseConnection,
        emails: &EmailService,
        req: &RegisterRequest,
    ) -> Result<users::Model, AppError> {
        let user = Self::create_account(db, req, false).await?;

        let token = Self::issue_verification_token(db, &user).await?;
        emails.send_verification(&user, &verification_url(emails, token));

        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Inscription depuis la page d'un cours : compte actif immédiatement
    pub async fn register_guest(
        db: &DatabaseConnection,
        slug: &str,
        req: &RegisterRequest,
    ) -> Result<AuthResponse, AppError> {
        CourseService::find_active_by_slug(db, slug).await?;

        let user = Self::create_account(db, req, true).await?;
        tracing::info!(user_id = user.id, course = %slug, "guest account created");

        auth_response(&user)
    }

    /// User + profil dans une transaction.
    /// Le profil est créé ici, par le cas d'usage, pas par un hook global.
    async fn create_account(
        db: &DatabaseConnection,
        req: &RegisterRequest,
        activate_immediately: bool,
    ) -> Result<users::Model, AppError> {
        req.validate()?;
        let username = req.username.trim();
        Self::validate_username(username)?;
        password::validate_new_password(&req.password, &req.password_confirm)
            .map_err(AppError::Validation)?;
        let email = Self::normalize_email(&req.email);

        // Unicité (la BD garde les contraintes UNIQUE en dernier recours)
        let username_taken = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .count(db)
            .await?
            > 0;
        if username_taken {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        let email_taken = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .count(db)
            .await?
            > 0;
        if email_taken {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = password::hash_password(&req.password).map_err(AppError::Internal)?;

        let txn = db.begin().await?;

        let user = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email),
            first_name: Set(req.first_name.trim().to_string()),
            last_name: Set(req.last_name.trim().to_string()),
            password_hash: Set(password_hash),
            is_active: Set(activate_immediately),
            is_staff: Set(false),
            date_joined: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        create_profile(&txn, &user, req, activate_immediately).await?;
        txn.commit().await?;

        Ok(user)
    }

    /// Nouveau token 24h ; les anciens tokens non utilisés sont supprimés
    pub async fn issue_verification_token<C: ConnectionTrait>(
        db: &C,
        user: &users::Model,
    ) -> Result<Uuid, AppError> {
        email_verification_tokens::Entity::delete_many()
            .filter(email_verification_tokens::Column::UserId.eq(user.id))
            .filter(email_verification_tokens::Column::Used.eq(false))
            .exec(db)
            .await?;

        let token = Uuid::new_v4();
        email_verification_tokens::ActiveModel {
            user_id: Set(user.id),
            token: Set(token),
            email: Set(user.email.clone()),
            expires_at: Set(email_verification_tokens::expiry_from_now()),
            used: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        user_profiles::Entity::update_many()
            .col_expr(
                user_profiles::Column::EmailVerificationSentAt,
                sea_orm::sea_query::Expr::value(Some(Utc::now())),
            )
            .filter(user_profiles::Column::UserId.eq(user.id))
            .exec(db)
            .await?;

        Ok(token)
    }

    /// GET /auth/verify-email?token=...
    pub async fn verify_email(
        db: &DatabaseConnection,
        emails: &EmailService,
        token: Uuid,
    ) -> Result<users::Model, AppError> {
        let record = email_verification_tokens::Entity::find()
            .filter(email_verification_tokens::Column::Token.eq(token))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid verification link".to_string()))?;

        if record.used {
            return Err(AppError::Conflict(
                "This verification link has already been used".to_string(),
            ));
        }
        if record.is_expired() {
            email_verification_tokens::Entity::delete_by_id(record.id)
                .exec(db)
                .await?;
            return Err(AppError::Validation(
                "This verification link has expired. Please request a new one.".to_string(),
            ));
        }

        let user = users::Entity::find_by_id(record.user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let txn = db.begin().await?;

        let mut active_user: users::ActiveModel = user.into();
        active_user.is_active = Set(true);
        let user = active_user.update(&txn).await?;

        user_profiles::Entity::update_many()
            .col_expr(user_profiles::Column::IsEmailVerified, sea_orm::sea_query::Expr::value(true))
            .filter(user_profiles::Column::UserId.eq(user.id))
            .exec(&txn)
            .await?;

        let mut active_token: email_verification_tokens::ActiveModel = record.into();
        active_token.used = Set(true);
        active_token.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(user_id = user.id, "email verified");
        emails.send_welcome(&user);
        Ok(user)
    }

    /// POST /auth/resend-verification : même réponse dans tous les cas
    pub async fn resend_verification(
        db: &DatabaseConnection,
        emails: &EmailService,
        email: &str,
    ) -> Result<(), AppError> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(Self::normalize_email(email)))
            .filter(users::Column::IsActive.eq(false))
            .one(db)
            .await?;

        if let Some(user) = user {
            let token = Self::issue_verification_token(db, &user).await?;
            emails.send_verification(&user, &verification_url(emails, token));
            tracing::info!(user_id = user.id, "verification email resent");
        }
        Ok(())
    }

    /// POST /auth/login
    pub async fn login(db: &DatabaseConnection, req: &LoginRequest) -> Result<AuthResponse, AppError> {
        let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

        let user = users::Entity::find()
            .filter(users::Column::Username.eq(req.username.trim()))
            .one(db)
            .await?
            .ok_or_else(invalid)?;

        let is_valid = password::verify_password(&req.password, &user.password_hash)
            .map_err(AppError::Internal)?;
        if !is_valid {
            return Err(invalid());
        }

        if !user.is_active {
            return Err(AppError::Forbidden(
                "Your account is not activated yet. Please verify your email address.".to_string(),
            ));
        }

        auth_response(&user)
    }

    /// GET /auth/me
    pub async fn me(db: &DatabaseConnection, auth: &AuthUser) -> Result<MeResponse, AppError> {
        let user = users::Entity::find_by_id(auth.user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let profile = user_profiles::Entity::find()
            .filter(user_profiles::Column::UserId.eq(user.id))
            .one(db)
            .await?;

        Ok(MeResponse {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name(),
            is_staff: user.is_staff,
            is_instructor: profile.as_ref().is_some_and(|p| p.is_instructor()),
            is_email_verified: profile.as_ref().is_some_and(|p| p.is_email_verified),
        })
    }

    /// POST /auth/change-password
    pub async fn change_password(
        db: &DatabaseConnection,
        user_id: i32,
        req: &ChangePasswordRequest,
    ) -> Result<(), AppError> {
        let user = users::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let is_valid = password::verify_password(&req.current_password, &user.password_hash)
            .map_err(AppError::Internal)?;
        if !is_valid {
            return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
        }

        password::validate_new_password(&req.new_password, &req.new_password_confirm)
            .map_err(AppError::Validation)?;
        let new_hash = password::hash_password(&req.new_password).map_err(AppError::Internal)?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.update(db).await?;

        tracing::info!(user_id, "password changed");
        Ok(())
    }

    /// POST /auth/forgot-password : token 1h si l'email existe
    pub async fn forgot_password(
        db: &DatabaseConnection,
        emails: &EmailService,
        email: &str,
    ) -> Result<(), AppError> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(Self::normalize_email(email)))
            .one(db)
            .await?;

        let Some(user) = user else {
            return Ok(());
        };

        password_reset_tokens::Entity::delete_many()
            .filter(password_reset_tokens::Column::UserId.eq(user.id))
            .filter(password_reset_tokens::Column::Used.eq(false))
            .exec(db)
            .await?;

        let token = Uuid::new_v4();
        password_reset_tokens::ActiveModel {
            user_id: Set(user.id),
            token: Set(token),
            expires_at: Set(password_reset_tokens::expiry_from_now()),
            used: Set(false),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        let reset_url = format!("{}/api/auth/reset-password?token={}", emails.site_url(), token);
        emails.send_password_reset(&user, &reset_url);
        tracing::info!(user_id = user.id, "password reset requested");
        Ok(())
    }

    /// POST /auth/reset-password
    pub async fn reset_password(db: &DatabaseConnection, req: &ResetPasswordRequest) -> Result<(), AppError> {
        let record = password_reset_tokens::Entity::find()
            .filter(password_reset_tokens::Column::Token.eq(req.token))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Invalid password reset link".to_string()))?;

        if record.used {
            return Err(AppError::Conflict(
                "This password reset link has already been used".to_string(),
            ));
        }
        if record.is_expired() {
            password_reset_tokens::Entity::delete_by_id(record.id).exec(db).await?;
            return Err(AppError::Validation("This password reset link has expired".to_string()));
        }

        password::validate_new_password(&req.new_password, &req.new_password_confirm)
            .map_err(AppError::Validation)?;
        let new_hash = password::hash_password(&req.new_password).map_err(AppError::Internal)?;

        let user = users::Entity::find_by_id(record.user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let txn = db.begin().await?;

        let mut active_user: users::ActiveModel = user.into();
        active_user.password_hash = Set(new_hash);
        let user = active_user.update(&txn).await?;

        let mut active_token: password_reset_tokens::ActiveModel = record.into();
        active_token.used = Set(true);
        active_token.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(user_id = user.id, "password reset");
        Ok(())
    }

    /// Supprime les tokens expirés ; renvoie (vérification, reset)
    pub async fn purge_expired_tokens(db: &DatabaseConnection) -> Result<(u64, u64), AppError> {
        let now = Utc::now();

        let verification = email_verification_tokens::Entity::delete_many()
            .filter(email_verification_tokens::Column::ExpiresAt.lt(now))
            .exec(db)
            .await?
            .rows_affected;

        let reset = password_reset_tokens::Entity::delete_many()
            .filter(password_reset_tokens::Column::ExpiresAt.lt(now))
            .exec(db)
            .await?
            .rows_affected;

        tracing::info!(verification, reset, "expired tokens purged");
        Ok((verification, reset))
    }
}

/// Profil créé avec le user (rôle learner par défaut)
async fn create_profile<C: ConnectionTrait>(
    db: &C,
    user: &users::Model,
    req: &RegisterRequest,
    email_verified: bool,
) -> Result<user_profiles::Model, DbErr> {
    user_profiles::ActiveModel {
        user_id: Set(user.id),
        role: Set(Role::Learner),
        phone_number: Set(req.phone_number.trim().to_string()),
        bio: Set(String::new()),
        location: Set(String::new()),
        country: Set(req.country.trim().to_string()),
        state_city: Set(req.state_city.trim().to_string()),
        is_email_verified: Set(email_verified),
        email_verification_sent_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

fn verification_url(emails: &EmailService, token: Uuid) -> String {
    format!("{}/api/auth/verify-email?token={}", emails.site_url(), token)
}

fn auth_response(user: &users::Model) -> Result<AuthResponse, AppError> {
    let token = jwt::generate_token(user.id, &user.username, user.is_staff)
        .map_err(AppError::Internal)?;

    Ok(AuthResponse {
        token,
        user_id: user.id,
        username: user.username.clone(),
        is_staff: user.is_staff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::tests::user;
    use crate::services::email_service::tests::{RecordingMailer, test_config};
    use chrono::Duration;
    use std::sync::Arc;

    fn emails() -> (Arc<RecordingMailer>, EmailService) {
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailService::new(mailer.clone(), &test_config());
        (mailer, service)
    }

    fn register_request(username: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: "Amina@Example.com".to_string(),
            first_name: "Amina".to_string(),
            last_name: "Otieno".to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
            phone_number: String::new(),
            country: "Kenya".to_string(),
            state_city: "Nairobi".to_string(),
        }
    }

    fn verification_token(used: bool, expires_in: Duration) -> email_verification_tokens::Model {
        email_verification_tokens::Model {
            id: 1,
            user_id: 1,
            token: Uuid::new_v4(),
            email: "wanjiku@example.com".to_string(),
            expires_at: Utc::now() + expires_in,
            used,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_username_rules() {
        assert!(AuthService::validate_username("amina_o").is_ok());
        assert!(AuthService::validate_username("amina.o").is_err());
        assert!(AuthService::validate_username("").is_err());
        assert!(AuthService::validate_username(&"a".repeat(26)).is_err());
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(AuthService::normalize_email("  Amina@Example.COM "), "amina@example.com");
    }

    #[tokio::test]
    async fn test_register_rejects_password_mismatch_before_db() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let (_, service) = emails();

        let result = AuthService::register(&db, &service, &register_request("amina", "longenough", "different")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_taken_username() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![count_row(1)]])
            .into_connection();
        let (_, service) = emails();

        let result = AuthService::register(&db, &service, &register_request("amina", "longenough", "longenough")).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_verify_with_used_token_is_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![verification_token(true, Duration::hours(1))]])
            .into_connection();
        let (mailer, service) = emails();

        let result = AuthService::verify_email(&db, &service, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_verify_with_expired_token_deletes_it() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![verification_token(false, Duration::hours(-1))]])
            .append_exec_results([MockExecResult { last_insert_id: 0, rows_affected: 1 }])
            .into_connection();
        let (_, service) = emails();

        let result = AuthService::verify_email(&db, &service, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_forgot_password_unknown_email_is_silent() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let (mailer, service) = emails();

        AuthService::forgot_password(&db, &service, "nobody@example.com").await.unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_inactive_account_is_forbidden() {
        let mut inactive = user();
        inactive.password_hash = password::hash_with_iterations("longenough", 1000).unwrap();
        inactive.is_active = false;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![inactive]])
            .into_connection();

        let req = LoginRequest { username: "wanjiku_k".to_string(), password: "longenough".to_string() };
        let result = AuthService::login(&db, &req).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_unauthorized() {
        let mut active = user();
        active.password_hash = password::hash_with_iterations("longenough", 1000).unwrap();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![active]])
            .into_connection();

        let req = LoginRequest { username: "wanjiku_k".to_string(), password: "wrong-pass".to_string() };
        let result = AuthService::login(&db, &req).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    /// Ligne de résultat d'un COUNT(*)
    fn count_row(n: i64) -> std::collections::BTreeMap<&'static str, Value> {
        std::collections::BTreeMap::from([("num_items", Value::BigInt(Some(n)))])
    }
}
