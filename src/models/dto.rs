// Requêtes / réponses de l'API (JSON)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::enrollments::{EnrollmentStatus, PaymentMethod, PaymentStatus};
use crate::models::payment_installments::InstallmentStatus;
use crate::models::project_enrollments::ProjectStatus;
use crate::services::currency::Currency;

// ----------------------------------------------------------------------------
// Comptes
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 25, message = "Username must be 1 to 25 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, max = 150))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150))]
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub phone_number: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state_city: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: Uuid,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i32,
    pub username: String,
    pub is_staff: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_staff: bool,
    pub is_instructor: bool,
    pub is_email_verified: bool,
}

// ----------------------------------------------------------------------------
// Catalogue
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CourseListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub currency: Option<String>,
    pub page: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CurrencyQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
}

impl From<Currency> for CurrencyInfo {
    fn from(currency: Currency) -> Self {
        CurrencyInfo {
            code: currency.code(),
            name: currency.name(),
            symbol: currency.symbol(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub name: String,
    pub display_name: String,
}

/// Prix d'un cours dans une devise
#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    pub currency: Currency,
    pub symbol: &'static str,
    pub price: Decimal,
    pub original_price: Decimal,
    pub has_discount: bool,
    pub savings: Decimal,
    pub discount_percentage: i64,
    pub formatted: String,
}

#[derive(Debug, Serialize)]
pub struct CourseSummary {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub category: Option<String>,
    pub overview: String,
    pub duration: String,
    pub schedule: String,
    pub is_featured: bool,
    pub pricing: PriceQuote,
}

#[derive(Debug, Serialize)]
pub struct CourseListResponse {
    pub courses: Vec<CourseSummary>,
    pub page: u64,
    pub total_pages: u64,
    pub total_courses: u64,
    pub categories: Vec<CategoryInfo>,
    pub currencies: Vec<CurrencyInfo>,
    pub selected_currency: Currency,
}

#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    pub course: CourseSummary,
    pub enrollment: Option<EnrollmentSummary>,
    pub related_courses: Vec<CourseSummary>,
}

// ----------------------------------------------------------------------------
// Inscriptions
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct EnrollRequest {
    /// Obligatoire ; Option pour renvoyer un message clair si absent
    pub payment_method: Option<PaymentMethod>,
    #[serde(default = "default_installments")]
    #[validate(range(min = 1, max = 3, message = "Installments must be between 1 and 3"))]
    pub installments: i32,
    /// Code devise (KES par défaut)
    pub currency: Option<String>,
}

fn default_installments() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    #[serde(default)]
    pub activation_code: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentSummary {
    pub id: Uuid,
    pub course_id: i32,
    pub course_title: String,
    pub course_slug: String,
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    pub installments: i32,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub remaining_amount: Decimal,
    pub payment_progress: i64,
    pub payment_status: PaymentStatus,
    pub enrollment_status: EnrollmentStatus,
    pub is_activated: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InstallmentView {
    pub id: i32,
    pub installment_number: i32,
    pub amount: Decimal,
    pub formatted_amount: String,
    pub due_date: NaiveDate,
    pub status: InstallmentStatus,
    pub is_overdue: bool,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentStatusResponse {
    pub enrollment: EnrollmentSummary,
    pub installments: Vec<InstallmentView>,
    pub next_installment_amount: Decimal,
    pub payment_method: &'static str,
    pub payment_instructions: String,
    /// Présent seulement une fois le paiement soldé
    pub activation_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectWithStatus {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub deliverables: String,
    pub estimated_hours: i32,
    pub order: i32,
    pub status: ProjectStatus,
    pub project_enrollment_id: Option<i32>,
    pub grade: Option<i32>,
    pub instructor_feedback: Option<String>,
    pub has_certificate: bool,
}

#[derive(Debug, Serialize)]
pub struct MaterialsResponse {
    pub course_id: i32,
    pub course_title: String,
    pub course_slug: String,
    pub enrollment_id: Uuid,
    pub projects: Vec<ProjectWithStatus>,
}

// ----------------------------------------------------------------------------
// Projets
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitProjectRequest {
    #[serde(default)]
    pub submission_notes: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub github_repo_url: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub google_colab_url: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub jupyter_notebook_url: String,
    #[serde(default)]
    pub additional_links: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Complete,
    RequestChanges,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    pub grade: Option<i32>,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionQueueItem {
    pub project_enrollment_id: i32,
    pub enrollment_id: Uuid,
    pub project_id: i32,
    pub project_title: String,
    pub course_title: String,
    pub course_slug: String,
    pub student_name: String,
    pub student_email: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub github_repo_url: String,
    pub google_colab_url: String,
    pub jupyter_notebook_url: String,
    pub additional_links: String,
    pub submission_notes: String,
}

// ----------------------------------------------------------------------------
// Admin
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct MarkPaidRequest {
    pub payment_reference: Option<String>,
    pub payment_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlagOverdueQuery {
    /// Date de référence (aujourd'hui par défaut)
    pub today: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_request_defaults_to_single_installment() {
        let req: EnrollRequest = serde_json::from_str(r#"{"payment_method": "mpesa"}"#).unwrap();
        assert_eq!(req.installments, 1);
        assert_eq!(req.payment_method, Some(PaymentMethod::Mpesa));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_enroll_request_rejects_four_installments() {
        let req: EnrollRequest =
            serde_json::from_str(r#"{"payment_method": "paypal", "installments": 4}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_review_action_parsing() {
        let req: ReviewRequest =
            serde_json::from_str(r#"{"action": "request_changes", "feedback": "Add tests"}"#).unwrap();
        assert_eq!(req.action, ReviewAction::RequestChanges);
        assert!(req.grade.is_none());
    }

    #[test]
    fn test_register_request_email_validation() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username": "amina", "email": "not-an-email", "first_name": "Amina",
                "last_name": "Otieno", "password": "longenough", "password_confirm": "longenough"}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }
}
