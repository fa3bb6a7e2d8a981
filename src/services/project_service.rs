// ============================================================================
// SERVICE : PROJETS CAPSTONE
// ============================================================================
//
// Cycle de vie d'un ProjectEnrollment :
//
//   not_started --start--> in_progress --submit--> submitted --complete--> completed
//                               ^                      |
//                               +--request changes-----+
//
//   - start           : inscription activée requise ; déjà démarré => no-op
//   - submit          : depuis in_progress ou submitted (re-soumission),
//                       au moins un lien / champ de livrable non vide
//   - complete        : instructeur du cours ou staff, note 0..=100,
//                       génère le certificat
//   - request changes : instructeur du cours ou staff, note laissée vide
//
// ============================================================================

use chrono::Utc;
use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{ReviewAction, ReviewRequest, SubmissionQueueItem, SubmitProjectRequest};
use crate::models::project_enrollments::{self, ProjectStatus};
use crate::models::{capstone_projects, courses, enrollments, users};
use crate::services::certificate::{self, CertificateData};
use crate::services::email_service::EmailService;
use crate::services::enrollment_service::EnrollmentService;

pub const MIN_GRADE: i32 = 0;
pub const MAX_GRADE: i32 = 100;

/// Certificat prêt à être servi
pub struct CertificateFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct ProjectService;

impl ProjectService {
    /// Au moins un des champs de livrable doit être renseigné
    pub fn check_submission(status: ProjectStatus, req: &SubmitProjectRequest) -> Result<(), AppError> {
        if !matches!(status, ProjectStatus::InProgress | ProjectStatus::Submitted) {
            return Err(AppError::Conflict(format!(
                "Project cannot be submitted from status {:?}",
                status
            )));
        }

        let has_deliverable = [
            &req.github_repo_url,
            &req.google_colab_url,
            &req.jupyter_notebook_url,
            &req.additional_links,
        ]
        .iter()
        .any(|field| !field.trim().is_empty());

        if !has_deliverable {
            return Err(AppError::Validation(
                "Please provide at least one submission link (GitHub, Google Colab, Jupyter Notebook or additional links)"
                    .to_string(),
            ));
        }

        req.validate()?;
        Ok(())
    }

    /// Vérifie une revue ; renvoie la note à enregistrer (None pour "request changes")
    pub fn check_review(status: ProjectStatus, req: &ReviewRequest) -> Result<Option<i32>, AppError> {
        if status != ProjectStatus::Submitted {
            return Err(AppError::Conflict(
                "Only submitted projects can be reviewed".to_string(),
            ));
        }

        match req.action {
            ReviewAction::Complete => match req.grade {
                Some(grade) if (MIN_GRADE..=MAX_GRADE).contains(&grade) => Ok(Some(grade)),
                Some(_) => Err(AppError::Validation(format!(
                    "Grade must be between {} and {}",
                    MIN_GRADE, MAX_GRADE
                ))),
                None => Err(AppError::Validation(
                    "A grade is required to complete a project".to_string(),
                )),
            },
            ReviewAction::RequestChanges => Ok(None),
        }
    }

    /// Instructeur du cours ou staff
    pub fn can_review(auth: &AuthUser, course: &courses::Model) -> bool {
        auth.is_staff || course.instructor_id == Some(auth.user_id)
    }

    /// POST /courses/materials/{slug}/project/{id}/start
    /// Renvoie (projet, déjà_démarré)
    pub async fn start_project(
        db: &DatabaseConnection,
        user_id: i32,
        slug: &str,
        project_id: i32,
    ) -> Result<(project_enrollments::Model, bool), AppError> {
        let (course, enrollment) = EnrollmentService::activated_enrollment(db, user_id, slug).await?;
        let project = find_project(db, course.id, project_id).await?;

        if let Some(existing) = find_progress(db, enrollment.id, project.id).await? {
            return Ok((existing, true));
        }

        let started = project_enrollments::ActiveModel {
            enrollment_id: Set(enrollment.id),
            project_id: Set(project.id),
            status: Set(ProjectStatus::InProgress),
            started_at: Set(Some(Utc::now())),
            submitted_at: Set(None),
            completed_at: Set(None),
            submission_notes: Set(String::new()),
            github_repo_url: Set(String::new()),
            google_colab_url: Set(String::new()),
            jupyter_notebook_url: Set(String::new()),
            additional_links: Set(String::new()),
            instructor_feedback: Set(String::new()),
            grade: Set(None),
            certificate: Set(None),
            certificate_id: Set(None),
            certificate_downloads: Set(0),
            ..Default::default()
        }
        .insert(db)
        .await?;

        tracing::info!(enrollment_id = %enrollment.id, project_id, "project started");
        Ok((started, false))
    }

    /// POST /courses/materials/{slug}/project/{id}/submit
    pub async fn submit_project(
        db: &DatabaseConnection,
        user_id: i32,
        slug: &str,
        project_id: i32,
        req: &SubmitProjectRequest,
    ) -> Result<project_enrollments::Model, AppError> {
        let (course, enrollment) = EnrollmentService::activated_enrollment(db, user_id, slug).await?;
        let project = find_project(db, course.id, project_id).await?;

        let progress = find_progress(db, enrollment.id, project.id)
            .await?
            .ok_or_else(|| AppError::Conflict("Start the project before submitting it".to_string()))?;

        Self::check_submission(progress.status, req)?;

        let mut active: project_enrollments::ActiveModel = progress.into();
        active.status = Set(ProjectStatus::Submitted);
        active.submitted_at = Set(Some(Utc::now()));
        active.submission_notes = Set(req.submission_notes.trim().to_string());
        active.github_repo_url = Set(req.github_repo_url.trim().to_string());
        active.google_colab_url = Set(req.google_colab_url.trim().to_string());
        active.jupyter_notebook_url = Set(req.jupyter_notebook_url.trim().to_string());
        active.additional_links = Set(req.additional_links.trim().to_string());
        let submitted = active.update(db).await?;

        tracing::info!(project_enrollment_id = submitted.id, "project submitted");
        Ok(submitted)
    }

    /// GET /courses/instructor/submissions : projets soumis des cours de
    /// l'instructeur (tous les cours pour le staff)
    pub async fn submission_queue(
        db: &DatabaseConnection,
        auth: &AuthUser,
    ) -> Result<Vec<SubmissionQueueItem>, AppError> {
        let mut course_query = courses::Entity::find();
        if !auth.is_staff {
            course_query = course_query.filter(courses::Column::InstructorId.eq(auth.user_id));
        }
        let courses: HashMap<i32, courses::Model> = course_query
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        if courses.is_empty() {
            return Ok(Vec::new());
        }

        let enrollments: HashMap<Uuid, enrollments::Model> = enrollments::Entity::find()
            .filter(enrollments::Column::CourseId.is_in(courses.keys().copied()))
            .all(db)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        if enrollments.is_empty() {
            return Ok(Vec::new());
        }

        let submitted = project_enrollments::Entity::find()
            .filter(project_enrollments::Column::Status.eq(ProjectStatus::Submitted))
            .filter(project_enrollments::Column::EnrollmentId.is_in(enrollments.keys().copied()))
            .order_by_asc(project_enrollments::Column::SubmittedAt)
            .all(db)
            .await?;

        if submitted.is_empty() {
            return Ok(Vec::new());
        }

        let projects: HashMap<i32, capstone_projects::Model> = capstone_projects::Entity::find()
            .filter(capstone_projects::Column::Id.is_in(submitted.iter().map(|pe| pe.project_id)))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let students: HashMap<i32, users::Model> = users::Entity::find()
            .filter(users::Column::Id.is_in(
                submitted
                    .iter()
                    .filter_map(|pe| enrollments.get(&pe.enrollment_id))
                    .map(|e| e.user_id),
            ))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(submitted
            .into_iter()
            .filter_map(|pe| {
                let enrollment = enrollments.get(&pe.enrollment_id)?;
                let course = courses.get(&enrollment.course_id)?;
                let project = projects.get(&pe.project_id)?;
                let student = students.get(&enrollment.user_id)?;
                Some(SubmissionQueueItem {
                    project_enrollment_id: pe.id,
                    enrollment_id: enrollment.id,
                    project_id: project.id,
                    project_title: project.title.clone(),
                    course_title: course.title.clone(),
                    course_slug: course.slug.clone(),
                    student_name: student.full_name(),
                    student_email: student.email.clone(),
                    submitted_at: pe.submitted_at,
                    github_repo_url: pe.github_repo_url,
                    google_colab_url: pe.google_colab_url,
                    jupyter_notebook_url: pe.jupyter_notebook_url,
                    additional_links: pe.additional_links,
                    submission_notes: pe.submission_notes,
                })
            })
            .collect())
    }

    /// POST /courses/instructor/review/{slug}/project/{id}/{enrollment_id}
    pub async fn review_project(
        db: &DatabaseConnection,
        emails: &EmailService,
        config: &AppConfig,
        auth: &AuthUser,
        slug: &str,
        project_id: i32,
        enrollment_id: Uuid,
        req: &ReviewRequest,
    ) -> Result<project_enrollments::Model, AppError> {
        let course = courses::Entity::find()
            .filter(courses::Column::Slug.eq(slug))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        if !Self::can_review(auth, &course) {
            return Err(AppError::Forbidden(
                "Only the course instructor can review this project".to_string(),
            ));
        }

        let project = find_project(db, course.id, project_id).await?;
        let enrollment = enrollments::Entity::find_by_id(enrollment_id)
            .filter(enrollments::Column::CourseId.eq(course.id))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))?;
        let progress = find_progress(db, enrollment.id, project.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Project submission not found".to_string()))?;

        let grade = Self::check_review(progress.status, req)?;

        let student = users::Entity::find_by_id(enrollment.user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let feedback = req.feedback.trim().to_string();
        let mut active: project_enrollments::ActiveModel = progress.into();
        active.instructor_feedback = Set(feedback);

        match req.action {
            ReviewAction::Complete => {
                active.status = Set(ProjectStatus::Completed);
                active.grade = Set(grade);
                active.completed_at = Set(Some(Utc::now()));
                let completed = active.update(db).await?;

                let completed = match Self::issue_certificate(db, config, &course, &project, &student, &completed).await {
                    Ok(with_certificate) => with_certificate,
                    Err(e) => {
                        tracing::error!(
                            project_enrollment_id = completed.id,
                            error = %e,
                            "certificate generation failed"
                        );
                        completed
                    }
                };

                tracing::info!(project_enrollment_id = completed.id, grade = ?completed.grade, "project completed");
                emails.send_project_completed(&student, &course, &project, &completed);
                Ok(completed)
            }
            ReviewAction::RequestChanges => {
                active.status = Set(ProjectStatus::InProgress);
                active.grade = Set(None);
                let reopened = active.update(db).await?;

                tracing::info!(project_enrollment_id = reopened.id, "changes requested");
                emails.send_project_changes_requested(&student, &course, &project, &reopened);
                Ok(reopened)
            }
        }
    }

    /// Rend et enregistre le certificat d'un projet complété
    async fn issue_certificate(
        db: &DatabaseConnection,
        config: &AppConfig,
        course: &courses::Model,
        project: &capstone_projects::Model,
        student: &users::Model,
        completed: &project_enrollments::Model,
    ) -> Result<project_enrollments::Model, AppError> {
        let instructor_name = match course.instructor_id {
            Some(id) => users::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|u| u.full_name())
                .unwrap_or_else(|| config.site_name.clone()),
            None => config.site_name.clone(),
        };

        let issued_on = completed
            .completed_at
            .unwrap_or_else(Utc::now)
            .date_naive();
        let certificate_id = certificate::certificate_id(completed.id, issued_on);

        let data = CertificateData {
            academy_name: config.site_name.clone(),
            student_name: student.full_name(),
            project_title: project.title.clone(),
            course_title: course.title.clone(),
            completion_date: issued_on,
            grade: completed.grade,
            director_name: config.course_director.clone(),
            instructor_name,
            certificate_id: certificate_id.clone(),
        };
        let bytes = certificate::render_certificate(&data)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let mut active: project_enrollments::ActiveModel = completed.clone().into();
        active.certificate = Set(Some(bytes));
        active.certificate_id = Set(Some(certificate_id));
        Ok(active.update(db).await?)
    }

    /// GET /courses/certificate/download/{id} : propriétaire seulement
    pub async fn download_certificate(
        db: &DatabaseConnection,
        user_id: i32,
        project_enrollment_id: i32,
    ) -> Result<CertificateFile, AppError> {
        let not_found = || AppError::NotFound("Certificate not found".to_string());

        let progress = project_enrollments::Entity::find_by_id(project_enrollment_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;

        let enrollment = enrollments::Entity::find_by_id(progress.enrollment_id)
            .filter(enrollments::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or_else(not_found)?;

        let Some(bytes) = progress.certificate.clone() else {
            return Err(not_found());
        };

        let user = users::Entity::find_by_id(enrollment.user_id)
            .one(db)
            .await?
            .ok_or_else(not_found)?;

        let issued_on = progress.completed_at.unwrap_or_else(Utc::now).date_naive();
        let filename = certificate::certificate_filename(&user.username, progress.project_id, issued_on);

        let downloads = progress.certificate_downloads + 1;
        let mut active: project_enrollments::ActiveModel = progress.into();
        active.certificate_downloads = Set(downloads);
        active.update(db).await?;

        Ok(CertificateFile { filename, bytes })
    }
}

async fn find_project<C: ConnectionTrait>(
    db: &C,
    course_id: i32,
    project_id: i32,
) -> Result<capstone_projects::Model, AppError> {
    capstone_projects::Entity::find_by_id(project_id)
        .filter(capstone_projects::Column::CourseId.eq(course_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

async fn find_progress<C: ConnectionTrait>(
    db: &C,
    enrollment_id: Uuid,
    project_id: i32,
) -> Result<Option<project_enrollments::Model>, DbErr> {
    project_enrollments::Entity::find()
        .filter(project_enrollments::Column::EnrollmentId.eq(enrollment_id))
        .filter(project_enrollments::Column::ProjectId.eq(project_id))
        .one(db)
        .await
}
