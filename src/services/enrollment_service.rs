// ============================================================================
// SERVICE : INSCRIPTIONS
// ============================================================================
//
// Description:
//   Cycle de vie d'une inscription côté étudiant et côté staff :
//     1. enroll      : plan de paiement + échéances + code d'activation
//     2. status      : échéances, reste à payer, instructions de paiement
//     3. activate    : le user saisit son code => accès au contenu
//     4. materials   : projets capstone du cours (inscription activée)
//
// Points d'attention:
//   - Une inscription par (user, course) : une deuxième tentative renvoie
//     AlreadyEnrolled (303 vers le statut de l'inscription existante)
//   - L'inscription et ses échéances sont créées dans une transaction
//   - Les emails partent après le commit, sans bloquer la réponse
//   - Le code d'activation n'est montré qu'une fois le paiement soldé
//
// ============================================================================

use chrono::Utc;
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::dto::{
    EnrollRequest, EnrollmentStatusResponse, EnrollmentSummary, InstallmentView,
    MaterialsResponse, ProjectWithStatus,
};
use crate::models::enrollments::{self, EnrollmentStatus, PaymentStatus};
use crate::models::project_enrollments::{self, ProjectStatus};
use crate::models::{capstone_projects, courses, users};
use crate::services::activation;
use crate::services::course_service::CourseService;
use crate::services::currency::format_amount;
use crate::services::email_service::EmailService;
use crate::services::installment_service::InstallmentService;
use crate::services::payment_service::{PaymentService, find_enrollment, load_user_and_course};

pub struct EnrollmentService;

impl EnrollmentService {
    pub fn summarize(enrollment: &enrollments::Model, course: &courses::Model) -> EnrollmentSummary {
        EnrollmentSummary {
            id: enrollment.id,
            course_id: course.id,
            course_title: course.title.clone(),
            course_slug: course.slug.clone(),
            payment_method: enrollment.payment_method,
            currency: enrollment.currency,
            installments: enrollment.installments,
            total_amount: enrollment.total_amount,
            amount_paid: enrollment.amount_paid,
            remaining_amount: enrollment.remaining_amount(),
            payment_progress: enrollment.payment_progress_percentage(),
            payment_status: enrollment.payment_status,
            enrollment_status: enrollment.enrollment_status,
            is_activated: enrollment.is_activated,
            activated_at: enrollment.activated_at,
            created_at: enrollment.created_at,
        }
    }

    /// POST /courses/enroll/{slug}
    pub async fn enroll(
        db: &DatabaseConnection,
        emails: &EmailService,
        user_id: i32,
        slug: &str,
        req: &EnrollRequest,
    ) -> Result<enrollments::Model, AppError> {
        let course = CourseService::find_active_by_slug(db, slug).await?;

        // 1. Déjà inscrit ?
        if let Some(existing) = find_user_enrollment(db, user_id, course.id).await? {
            return Err(AppError::AlreadyEnrolled { enrollment_id: existing.id });
        }

        // 2. Plan de paiement
        let payment_method = req
            .payment_method
            .ok_or_else(|| AppError::Validation("Please select a payment method.".to_string()))?;
        req.validate()?;
        let currency = CourseService::parse_currency(req.currency.as_deref())?;

        let total_amount = currency.convert(course.effective_price());
        let today = Utc::now().date_naive();
        let planned = InstallmentService::plan(total_amount, req.installments, today)?;

        // 3. Inscription + échéances (transaction)
        let txn = db.begin().await?;

        let activation_code = activation::generate_unique_code(&txn).await?;
        let now = Utc::now();
        let new_enrollment = enrollments::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            course_id: Set(course.id),
            payment_method: Set(payment_method),
            total_amount: Set(total_amount),
            currency: Set(currency),
            installments: Set(req.installments),
            amount_paid: Set(rust_decimal::Decimal::ZERO),
            payment_status: Set(PaymentStatus::Pending),
            enrollment_status: Set(EnrollmentStatus::Inactive),
            activation_code: Set(activation_code),
            is_activated: Set(false),
            activated_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            admin_notes: Set(String::new()),
        };

        let enrollment = match new_enrollment.insert(&txn).await {
            Ok(enrollment) => enrollment,
            Err(e) if is_unique_violation(&e) => {
                // Deux requêtes simultanées : la contrainte UNIQUE a tranché
                txn.rollback().await?;
                return match find_user_enrollment(db, user_id, course.id).await? {
                    Some(existing) => Err(AppError::AlreadyEnrolled { enrollment_id: existing.id }),
                    None => Err(AppError::Database(e)),
                };
            }
            Err(e) => return Err(e.into()),
        };

        let installments = InstallmentService::persist(&txn, enrollment.id, &planned).await?;
        txn.commit().await?;

        tracing::info!(
            enrollment_id = %enrollment.id,
            user_id,
            course = %course.slug,
            total = %enrollment.total_amount,
            currency = %enrollment.currency,
            installments = enrollment.installments,
            "enrollment created"
        );

        // 4. Email de confirmation avec instructions de paiement
        match users::Entity::find_by_id(user_id).one(db).await {
            Ok(Some(user)) => {
                let next = PaymentService::next_installment_amount(&enrollment, &installments);
                let instructions = PaymentService::payment_instructions(&enrollment, next);
                emails.send_enrollment_confirmation(&user, &course, &enrollment, next, &instructions.instructions);
            }
            Ok(None) => tracing::warn!(user_id, "enrollment email skipped: user not found"),
            Err(e) => tracing::warn!(user_id, error = %e, "enrollment email skipped"),
        }

        Ok(enrollment)
    }

    /// GET /courses/enrollment/{id} : réservé au propriétaire
    pub async fn enrollment_status(
        db: &DatabaseConnection,
        user_id: i32,
        enrollment_id: Uuid,
    ) -> Result<EnrollmentStatusResponse, AppError> {
        let enrollment = enrollments::Entity::find_by_id(enrollment_id)
            .filter(enrollments::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))?;

        let course = courses::Entity::find_by_id(enrollment.course_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        let installments = InstallmentService::for_enrollment(db, enrollment.id).await?;
        Ok(Self::status_view(&enrollment, &course, &installments, Utc::now().date_naive()))
    }

    pub fn status_view(
        enrollment: &enrollments::Model,
        course: &courses::Model,
        installments: &[crate::models::payment_installments::Model],
        today: chrono::NaiveDate,
    ) -> EnrollmentStatusResponse {
        let next = PaymentService::next_installment_amount(enrollment, installments);
        let instructions = PaymentService::payment_instructions(enrollment, next);

        EnrollmentStatusResponse {
            enrollment: Self::summarize(enrollment, course),
            installments: installments
                .iter()
                .map(|i| InstallmentView {
                    id: i.id,
                    installment_number: i.installment_number,
                    amount: i.amount,
                    formatted_amount: format_amount(i.amount, enrollment.currency),
                    due_date: i.due_date,
                    status: i.status,
                    is_overdue: i.is_overdue(today),
                    payment_date: i.payment_date,
                })
                .collect(),
            next_installment_amount: next,
            payment_method: instructions.method,
            payment_instructions: instructions.instructions,
            activation_code: enrollment
                .payment_status
                .is_settled()
                .then(|| enrollment.activation_code.clone()),
        }
    }

    /// GET /courses/my-enrollments : plus récentes d'abord
    pub async fn my_enrollments(
        db: &DatabaseConnection,
        user_id: i32,
    ) -> Result<Vec<EnrollmentSummary>, AppError> {
        let rows = enrollments::Entity::find()
            .filter(enrollments::Column::UserId.eq(user_id))
            .order_by_desc(enrollments::Column::CreatedAt)
            .find_also_related(courses::Entity)
            .all(db)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|(enrollment, course)| {
                course.as_ref().map(|course| Self::summarize(enrollment, course))
            })
            .collect())
    }

    /// POST /courses/activate : code saisi par le user.
    /// Tout échec (format, code inconnu, code d'un autre, déjà utilisé)
    /// renvoie la même erreur générique.
    pub async fn activate(
        db: &DatabaseConnection,
        emails: &EmailService,
        user_id: i32,
        raw_code: &str,
    ) -> Result<enrollments::Model, AppError> {
        let code = activation::normalize(raw_code);
        if code.is_empty() {
            return Err(AppError::Validation("Please enter an activation code.".to_string()));
        }
        if !activation::is_well_formed(&code) {
            return Err(AppError::InvalidActivationCode);
        }

        let enrollment = enrollments::Entity::find()
            .filter(enrollments::Column::ActivationCode.eq(code.as_str()))
            .filter(enrollments::Column::UserId.eq(user_id))
            .filter(enrollments::Column::IsActivated.eq(false))
            .one(db)
            .await?
            .ok_or(AppError::InvalidActivationCode)?;

        let enrollment = mark_activated(db, enrollment).await?;
        notify_course_access(db, emails, &enrollment).await;
        Ok(enrollment)
    }

    /// Action staff : active une inscription dont le paiement est soldé
    pub async fn admin_activate(
        db: &DatabaseConnection,
        emails: &EmailService,
        enrollment_id: Uuid,
    ) -> Result<enrollments::Model, AppError> {
        let enrollment = find_enrollment(db, enrollment_id).await?;

        if !enrollment.payment_status.is_settled() {
            return Err(AppError::Conflict(
                "Payment must be completed before activation".to_string(),
            ));
        }
        if enrollment.is_activated {
            return Err(AppError::Conflict("Enrollment is already activated".to_string()));
        }

        let enrollment = mark_activated(db, enrollment).await?;
        notify_course_access(db, emails, &enrollment).await;
        Ok(enrollment)
    }

    /// Action staff : envoie le code d'activation par email
    pub async fn send_activation_code(
        db: &DatabaseConnection,
        emails: &EmailService,
        enrollment_id: Uuid,
    ) -> Result<(), AppError> {
        let enrollment = find_enrollment(db, enrollment_id).await?;

        if !enrollment.payment_status.is_settled() {
            return Err(AppError::Conflict(
                "Activation code is only sent once payment is completed".to_string(),
            ));
        }

        let (user, course) = load_user_and_course(db, &enrollment).await?;
        emails.send_activation_code(&user, &course, &enrollment);
        Ok(())
    }

    /// Inscription activée du user pour ce cours, sinon accès refusé
    pub async fn activated_enrollment<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
        slug: &str,
    ) -> Result<(courses::Model, enrollments::Model), AppError> {
        let course = CourseService::find_active_by_slug(db, slug).await?;

        let enrollment = enrollments::Entity::find()
            .filter(enrollments::Column::UserId.eq(user_id))
            .filter(enrollments::Column::CourseId.eq(course.id))
            .filter(enrollments::Column::IsActivated.eq(true))
            .one(db)
            .await?
            .ok_or_else(|| {
                AppError::Forbidden(
                    "You do not have access to this course. Please ensure your enrollment is activated."
                        .to_string(),
                )
            })?;

        Ok((course, enrollment))
    }

    /// GET /courses/materials/{slug}
    pub async fn materials(
        db: &DatabaseConnection,
        user_id: i32,
        slug: &str,
    ) -> Result<MaterialsResponse, AppError> {
        let (course, enrollment) = Self::activated_enrollment(db, user_id, slug).await?;

        let projects = capstone_projects::Entity::find()
            .filter(capstone_projects::Column::CourseId.eq(course.id))
            .order_by_asc(capstone_projects::Column::Order)
            .all(db)
            .await?;

        let progress: HashMap<i32, project_enrollments::Model> = project_enrollments::Entity::find()
            .filter(project_enrollments::Column::EnrollmentId.eq(enrollment.id))
            .all(db)
            .await?
            .into_iter()
            .map(|pe| (pe.project_id, pe))
            .collect();

        Ok(MaterialsResponse {
            course_id: course.id,
            course_title: course.title,
            course_slug: course.slug,
            enrollment_id: enrollment.id,
            projects: projects
                .into_iter()
                .map(|p| {
                    let pe = progress.get(&p.id).cloned();
                    project_with_status(p, pe)
                })
                .collect(),
        })
    }
}

/// Violation d'une contrainte UNIQUE : code 23505 remonté par le driver,
/// ou message Postgres quand l'erreur n'arrive que sous forme de texte
fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        || err.to_string().contains("duplicate key value violates unique constraint")
}

async fn find_user_enrollment<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    course_id: i32,
) -> Result<Option<enrollments::Model>, DbErr> {
    enrollments::Entity::find()
        .filter(enrollments::Column::UserId.eq(user_id))
        .filter(enrollments::Column::CourseId.eq(course_id))
        .one(db)
        .await
}

async fn mark_activated(
    db: &DatabaseConnection,
    enrollment: enrollments::Model,
) -> Result<enrollments::Model, AppError> {
    let mut active: enrollments::ActiveModel = enrollment.into();
    active.is_activated = Set(true);
    active.activated_at = Set(Some(Utc::now()));
    active.enrollment_status = Set(EnrollmentStatus::Active);
    active.updated_at = Set(Utc::now());
    let enrollment = active.update(db).await?;

    tracing::info!(enrollment_id = %enrollment.id, "enrollment activated");
    Ok(enrollment)
}

async fn notify_course_access(db: &DatabaseConnection, emails: &EmailService, enrollment: &enrollments::Model) {
    match load_user_and_course(db, enrollment).await {
        Ok((user, course)) => {
            emails.send_course_access(&user, &course);
        }
        Err(e) => {
            tracing::warn!(enrollment_id = %enrollment.id, error = %e, "course access email skipped");
        }
    }
}

fn project_with_status(
    project: capstone_projects::Model,
    progress: Option<project_enrollments::Model>,
) -> ProjectWithStatus {
    ProjectWithStatus {
        id: project.id,
        title: project.title,
        description: project.description,
        deliverables: project.deliverables,
        estimated_hours: project.estimated_hours,
        order: project.order,
        status: progress.as_ref().map(|pe| pe.status).unwrap_or(ProjectStatus::NotStarted),
        project_enrollment_id: progress.as_ref().map(|pe| pe.id),
        grade: progress.as_ref().and_then(|pe| pe.grade),
        instructor_feedback: progress
            .as_ref()
            .map(|pe| pe.instructor_feedback.clone())
            .filter(|f| !f.is_empty()),
        has_certificate: progress.as_ref().is_some_and(|pe| pe.certificate.is_some()),
    }
}
