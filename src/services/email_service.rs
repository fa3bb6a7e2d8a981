// ============================================================================
// SERVICE : EMAILS TRANSACTIONNELS
// ============================================================================
//
// Description:
//   Un email = une struct askama (templates/emails/*.txt) + un sujet.
//   Le rendu produit un OutgoingEmail, envoyé via un Mailer :
//     - LogMailer  : loggue l'email (dev, ou pas de relais configuré)
//     - HttpMailer : POST JSON vers MAIL_RELAY_URL
//
// Points d'attention:
//   - dispatch() lance l'envoi en tâche de fond et ne renvoie jamais d'erreur
//     à l'appelant : un email raté ne fait pas échouer l'inscription,
//     l'activation, etc. L'échec (rendu ou envoi) est seulement loggé.
//   - Pas de retry.
//
// ============================================================================

use askama::Template;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::models::{capstone_projects, courses, enrollments, payment_installments, project_enrollments, users};
use crate::services::currency::format_amount;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    Verification,
    PasswordReset,
    Welcome,
    EnrollmentConfirmation,
    CourseAccess,
    ActivationCode,
    PaymentReminder,
    PaymentConfirmation,
    ProjectCompleted,
    ProjectChangesRequested,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::Verification => "verification",
            EmailTemplate::PasswordReset => "password_reset",
            EmailTemplate::Welcome => "welcome",
            EmailTemplate::EnrollmentConfirmation => "enrollment_confirmation",
            EmailTemplate::CourseAccess => "course_access",
            EmailTemplate::ActivationCode => "activation_code",
            EmailTemplate::PaymentReminder => "payment_reminder",
            EmailTemplate::PaymentConfirmation => "payment_confirmation",
            EmailTemplate::ProjectCompleted => "project_completed",
            EmailTemplate::ProjectChangesRequested => "project_changes_requested",
        }
    }
}

/// Infos du site communes à tous les emails
#[derive(Debug, Clone)]
pub struct SiteContext {
    pub site_name: String,
    pub site_url: String,
}

/// Corps rendu par askama + sujet
pub trait EmailMessage: Template {
    const KIND: EmailTemplate;

    fn subject(&self) -> String;
}

#[derive(Template)]
#[template(path = "emails/verification.txt")]
pub struct VerificationEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub verification_url: &'a str,
}

impl EmailMessage for VerificationEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::Verification;

    fn subject(&self) -> String {
        format!("Verify Your Email - {}", self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/password_reset.txt")]
pub struct PasswordResetEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub reset_url: &'a str,
}

impl EmailMessage for PasswordResetEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::PasswordReset;

    fn subject(&self) -> String {
        format!("Reset Your Password - {}", self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/welcome.txt")]
pub struct WelcomeEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub login_url: String,
}

impl EmailMessage for WelcomeEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::Welcome;

    fn subject(&self) -> String {
        format!("Welcome to {}!", self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/enrollment_confirmation.txt")]
pub struct EnrollmentConfirmationEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub total_amount: String,
    pub installments: i32,
    pub next_installment_amount: String,
    pub payment_method: &'static str,
    pub payment_instructions: &'a str,
    pub enrollment_status_url: String,
}

impl EmailMessage for EnrollmentConfirmationEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::EnrollmentConfirmation;

    fn subject(&self) -> String {
        format!("Course Enrollment Confirmed - {} | {}", self.course_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/course_access.txt")]
pub struct CourseAccessEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub course_materials_url: String,
    pub my_enrollments_url: String,
}

impl EmailMessage for CourseAccessEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::CourseAccess;

    fn subject(&self) -> String {
        format!("Course Access Activated - {} | {}", self.course_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/activation_code.txt")]
pub struct ActivationCodeEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub activation_code: &'a str,
    pub activation_url: String,
}

impl EmailMessage for ActivationCodeEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::ActivationCode;

    fn subject(&self) -> String {
        format!("Your Activation Code - {} | {}", self.course_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/payment_reminder.txt")]
pub struct PaymentReminderEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub installment_number: i32,
    pub installments: i32,
    pub installment_amount: String,
    pub due_date: String,
    pub enrollment_status_url: String,
}

impl EmailMessage for PaymentReminderEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::PaymentReminder;

    fn subject(&self) -> String {
        format!("Payment Reminder - {} | {}", self.course_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/payment_confirmation.txt")]
pub struct PaymentConfirmationEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub amount_paid: String,
    pub payment_progress: i64,
}

impl EmailMessage for PaymentConfirmationEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::PaymentConfirmation;

    fn subject(&self) -> String {
        format!("Payment Confirmed - {} | {}", self.course_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/project_completed.txt")]
pub struct ProjectCompletedEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub project_title: &'a str,
    pub grade: Option<i32>,
    pub feedback: &'a str,
    pub certificate_url: String,
}

impl EmailMessage for ProjectCompletedEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::ProjectCompleted;

    fn subject(&self) -> String {
        format!("Project Completed - {} | {}", self.project_title, self.site.site_name)
    }
}

#[derive(Template)]
#[template(path = "emails/project_changes_requested.txt")]
pub struct ProjectChangesRequestedEmail<'a> {
    pub site: &'a SiteContext,
    pub name: String,
    pub course_title: &'a str,
    pub project_title: &'a str,
    pub feedback: &'a str,
}

impl EmailMessage for ProjectChangesRequestedEmail<'_> {
    const KIND: EmailTemplate = EmailTemplate::ProjectChangesRequested;

    fn subject(&self) -> String {
        format!("Changes Requested - {} | {}", self.project_title, self.site.site_name)
    }
}

/// Email prêt à partir
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub template: EmailTemplate,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail relay rejected the email: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Loggue l'email au lieu de l'envoyer
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            template = email.template.as_str(),
            to = %email.to,
            subject = %email.subject,
            "email (not delivered, no relay configured)"
        );
        tracing::debug!(body = %email.body, "email body");
        Ok(())
    }
}

/// Envoie l'email en JSON vers un relais HTTP
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(relay_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let response = self.client
            .post(&self.relay_url)
            .json(email)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    from: String,
    site: SiteContext,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, config: &AppConfig) -> Self {
        Self {
            mailer,
            from: config.default_from_email.clone(),
            site: SiteContext {
                site_name: config.site_name.clone(),
                site_url: config.site_url.clone(),
            },
        }
    }

    /// Choisit le mailer selon la config (relais HTTP si MAIL_RELAY_URL)
    pub fn from_config(config: &AppConfig) -> Self {
        let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
            Some(url) => Arc::new(HttpMailer::new(url.clone())),
            None => Arc::new(LogMailer),
        };
        Self::new(mailer, config)
    }

    pub fn site_url(&self) -> &str {
        &self.site.site_url
    }

    pub fn compose<M: EmailMessage>(&self, to: &str, message: &M) -> Result<OutgoingEmail, askama::Error> {
        Ok(OutgoingEmail {
            template: M::KIND,
            from: self.from.clone(),
            to: to.to_string(),
            subject: message.subject(),
            body: message.render()?,
        })
    }

    /// Envoi fire-and-forget : l'échec est loggé, jamais propagé.
    /// Le handle renvoie true si l'email est parti (utile en test).
    pub fn dispatch<M: EmailMessage>(&self, to: &str, message: &M) -> JoinHandle<bool> {
        let email = match self.compose(to, message) {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(template = M::KIND.as_str(), to = %to, error = %e, "failed to render email");
                return tokio::spawn(async { false });
            }
        };
        let mailer = Arc::clone(&self.mailer);

        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => {
                    tracing::info!(template = email.template.as_str(), to = %email.to, "email sent");
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        template = email.template.as_str(),
                        to = %email.to,
                        error = %e,
                        "failed to send email"
                    );
                    false
                }
            }
        })
    }

    // ------------------------------------------------------------------
    // Emails métier
    // ------------------------------------------------------------------

    pub fn send_verification(&self, user: &users::Model, verification_url: &str) -> JoinHandle<bool> {
        let message = VerificationEmail {
            site: &self.site,
            name: user.full_name(),
            verification_url,
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_password_reset(&self, user: &users::Model, reset_url: &str) -> JoinHandle<bool> {
        let message = PasswordResetEmail {
            site: &self.site,
            name: user.full_name(),
            reset_url,
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_welcome(&self, user: &users::Model) -> JoinHandle<bool> {
        let message = WelcomeEmail {
            site: &self.site,
            name: user.full_name(),
            login_url: format!("{}/accounts/login/", self.site.site_url),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_enrollment_confirmation(
        &self,
        user: &users::Model,
        course: &courses::Model,
        enrollment: &enrollments::Model,
        next_installment: rust_decimal::Decimal,
        instructions: &str,
    ) -> JoinHandle<bool> {
        let message = EnrollmentConfirmationEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            total_amount: format_amount(enrollment.total_amount, enrollment.currency),
            installments: enrollment.installments,
            next_installment_amount: format_amount(next_installment, enrollment.currency),
            payment_method: enrollment.payment_method.label(),
            payment_instructions: instructions,
            enrollment_status_url: self.enrollment_status_url(enrollment),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_course_access(
        &self,
        user: &users::Model,
        course: &courses::Model,
    ) -> JoinHandle<bool> {
        let message = CourseAccessEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            course_materials_url: format!("{}/courses/materials/{}/", self.site.site_url, course.slug),
            my_enrollments_url: format!("{}/courses/my-enrollments/", self.site.site_url),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_activation_code(
        &self,
        user: &users::Model,
        course: &courses::Model,
        enrollment: &enrollments::Model,
    ) -> JoinHandle<bool> {
        let message = ActivationCodeEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            activation_code: &enrollment.activation_code,
            activation_url: format!("{}/courses/activate/", self.site.site_url),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_payment_reminder(
        &self,
        user: &users::Model,
        course: &courses::Model,
        enrollment: &enrollments::Model,
        installment: &payment_installments::Model,
    ) -> JoinHandle<bool> {
        let message = PaymentReminderEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            installment_number: installment.installment_number,
            installments: enrollment.installments,
            installment_amount: format_amount(installment.amount, enrollment.currency),
            due_date: installment.due_date.format("%B %d, %Y").to_string(),
            enrollment_status_url: self.enrollment_status_url(enrollment),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_payment_confirmation(
        &self,
        user: &users::Model,
        course: &courses::Model,
        enrollment: &enrollments::Model,
    ) -> JoinHandle<bool> {
        let message = PaymentConfirmationEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            amount_paid: format_amount(enrollment.amount_paid, enrollment.currency),
            payment_progress: enrollment.payment_progress_percentage(),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_project_completed(
        &self,
        user: &users::Model,
        course: &courses::Model,
        project: &capstone_projects::Model,
        project_enrollment: &project_enrollments::Model,
    ) -> JoinHandle<bool> {
        let message = ProjectCompletedEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            project_title: &project.title,
            grade: project_enrollment.grade,
            feedback: &project_enrollment.instructor_feedback,
            certificate_url: format!(
                "{}/courses/certificate/download/{}/",
                self.site.site_url, project_enrollment.id
            ),
        };
        self.dispatch(&user.email, &message)
    }

    pub fn send_project_changes_requested(
        &self,
        user: &users::Model,
        course: &courses::Model,
        project: &capstone_projects::Model,
        project_enrollment: &project_enrollments::Model,
    ) -> JoinHandle<bool> {
        let message = ProjectChangesRequestedEmail {
            site: &self.site,
            name: user.full_name(),
            course_title: &course.title,
            project_title: &project.title,
            feedback: &project_enrollment.instructor_feedback,
        };
        self.dispatch(&user.email, &message)
    }

    fn enrollment_status_url(&self, enrollment: &enrollments::Model) -> String {
        format!("{}/courses/enrollment/{}/", self.site.site_url, enrollment.id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::courses::tests::course;
    use crate::models::enrollments::tests::enrollment;
    use crate::models::project_enrollments::ProjectStatus;
    use crate::models::users::tests::user;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Mailer de test : garde les emails envoyés
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    /// Mailer de test : le relais refuse tout
    struct RejectingMailer;

    #[async_trait]
    impl Mailer for RejectingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), MailError> {
            Err(MailError::Rejected("503 Service Unavailable".to_string()))
        }
    }

    pub(crate) fn test_config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/lum_test".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn site() -> SiteContext {
        SiteContext {
            site_name: "LUM Data Academy".to_string(),
            site_url: "https://lumdataacademy.org".to_string(),
        }
    }

    fn project() -> capstone_projects::Model {
        capstone_projects::Model {
            id: 4,
            course_id: 7,
            title: "Churn model".to_string(),
            description: String::new(),
            deliverables: String::new(),
            estimated_hours: 10,
            order: 1,
        }
    }

    fn completed_project(grade: Option<i32>, feedback: &str) -> project_enrollments::Model {
        project_enrollments::Model {
            id: 11,
            enrollment_id: uuid::Uuid::nil(),
            project_id: 4,
            status: ProjectStatus::Completed,
            started_at: None,
            submitted_at: None,
            completed_at: Some(Utc::now()),
            submission_notes: String::new(),
            github_repo_url: String::new(),
            google_colab_url: String::new(),
            jupyter_notebook_url: String::new(),
            additional_links: String::new(),
            instructor_feedback: feedback.to_string(),
            grade,
            certificate: None,
            certificate_id: None,
            certificate_downloads: 0,
        }
    }

    #[test]
    fn test_verification_email_renders_link_and_subject() {
        let service = EmailService::new(Arc::new(LogMailer), &test_config());
        let site = site();
        let message = VerificationEmail {
            site: &site,
            name: "Amina".to_string(),
            verification_url: "https://x/verify/abc",
        };

        let email = service.compose("amina@example.com", &message).unwrap();

        assert_eq!(email.template, EmailTemplate::Verification);
        assert_eq!(email.subject, "Verify Your Email - LUM Data Academy");
        assert!(email.body.starts_with("Hello Amina,"));
        assert!(email.body.contains("https://x/verify/abc"));
        assert_eq!(email.from, "noreply@lumdataacademy.org");
        assert_eq!(email.to, "amina@example.com");
    }

    #[test]
    fn test_text_templates_are_not_html_escaped() {
        let site = site();
        let message = ProjectChangesRequestedEmail {
            site: &site,
            name: "Amina".to_string(),
            course_title: "Data Analysis with Python",
            project_title: "Churn & retention",
            feedback: "Use <groupby> & add tests",
        };

        let body = message.render().unwrap();
        assert!(body.contains("\"Churn & retention\""));
        assert!(body.contains("Use <groupby> & add tests"));
    }

    #[test]
    fn test_project_completed_grade_and_feedback_are_optional() {
        let site = site();
        let graded = completed_project(Some(92), "Great work");
        let message = ProjectCompletedEmail {
            site: &site,
            name: "Amina".to_string(),
            course_title: "Data Analysis with Python",
            project_title: "Churn model",
            grade: graded.grade,
            feedback: &graded.instructor_feedback,
            certificate_url: "https://x/cert/11/".to_string(),
        };
        let body = message.render().unwrap();
        assert!(body.contains("Grade: 92%"));
        assert!(body.contains("Great work"));

        let ungraded = ProjectCompletedEmail {
            grade: None,
            feedback: "",
            ..message
        };
        let body = ungraded.render().unwrap();
        assert!(!body.contains("Grade:"));
        assert!(!body.contains("Feedback:"));
        assert!(body.contains("https://x/cert/11/"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers_through_mailer() {
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailService::new(mailer.clone(), &test_config());

        let delivered = service.send_welcome(&user()).await.unwrap();

        assert!(delivered);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, EmailTemplate::Welcome);
        assert_eq!(sent[0].to, "wanjiku@example.com");
        assert!(sent[0].body.contains("Hello Wanjiku Kamau,"));
        assert!(sent[0].body.contains("https://lumdataacademy.org/accounts/login/"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_swallowed() {
        let service = EmailService::new(Arc::new(RejectingMailer), &test_config());

        let delivered = service
            .send_password_reset(&user(), "https://x/reset/abc")
            .await
            .unwrap();

        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_every_business_email_renders() {
        let mailer = Arc::new(RecordingMailer::default());
        let service = EmailService::new(mailer.clone(), &test_config());
        let (u, c, e) = (user(), course(dec!(100), None), enrollment(dec!(100), dec!(50)));
        let installment = payment_installments::Model {
            id: 1,
            enrollment_id: e.id,
            installment_number: 2,
            amount: dec!(50),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 14).unwrap(),
            status: payment_installments::InstallmentStatus::Pending,
            payment_date: None,
            payment_reference: String::new(),
            payment_notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let pe = completed_project(Some(80), "Solid");

        let handles = vec![
            service.send_verification(&u, "https://x/verify"),
            service.send_password_reset(&u, "https://x/reset"),
            service.send_welcome(&u),
            service.send_enrollment_confirmation(&u, &c, &e, dec!(50), "Pay via M-Pesa"),
            service.send_course_access(&u, &c),
            service.send_activation_code(&u, &c, &e),
            service.send_payment_reminder(&u, &c, &e, &installment),
            service.send_payment_confirmation(&u, &c, &e),
            service.send_project_completed(&u, &c, &project(), &pe),
            service.send_project_changes_requested(&u, &c, &project(), &pe),
        ];
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 10);
        for email in sent.iter() {
            assert!(email.subject.contains("LUM Data Academy"), "{}", email.template.as_str());
            assert!(email.body.starts_with("Hello Wanjiku Kamau,"), "{}", email.template.as_str());
        }

        let reminder = sent
            .iter()
            .find(|m| m.template == EmailTemplate::PaymentReminder)
            .unwrap();
        assert!(reminder.body.contains("Installment 2 of 2"));
        assert!(reminder.body.contains("February 14, 2026"));

        let code = sent
            .iter()
            .find(|m| m.template == EmailTemplate::ActivationCode)
            .unwrap();
        assert!(code.body.contains("AB12-CD34-EF56-GH78"));
    }
}
