use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{get, post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{
    ActivateRequest, CourseListQuery, CurrencyQuery, EnrollRequest, RegisterRequest,
    ReviewRequest, SubmitProjectRequest,
};
use crate::services::auth_service::AuthService;
use crate::services::course_service::CourseService;
use crate::services::email_service::EmailService;
use crate::services::enrollment_service::EnrollmentService;
use crate::services::project_service::ProjectService;

/// GET /courses - Catalogue (PUBLIC) : ?category=&search=&currency=&page=
#[get("")]
pub async fn list_courses(
    query: web::Query<CourseListQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let response = CourseService::list_courses(db.get_ref(), &query).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/currencies")]
pub async fn currencies() -> HttpResponse {
    HttpResponse::Ok().json(CourseService::currencies())
}

/// GET /courses/my-enrollments (PROTÉGÉE)
#[get("/my-enrollments")]
pub async fn my_enrollments(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let enrollments = EnrollmentService::my_enrollments(db.get_ref(), auth_user.user_id).await?;
    Ok(HttpResponse::Ok().json(enrollments))
}

/// POST /courses/activate - Activer un cours avec son code (PROTÉGÉE)
#[post("/activate")]
pub async fn activate(
    auth_user: AuthUser,
    body: web::Json<ActivateRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    let enrollment = EnrollmentService::activate(
        db.get_ref(),
        emails.get_ref(),
        auth_user.user_id,
        &body.activation_code,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "enrollment_id": enrollment.id,
        "message": "Course activated successfully. You now have access to the course materials."
    })))
}

/// POST /courses/enroll/{slug} (PROTÉGÉE)
/// Déjà inscrit => 303 vers la page de statut de l'inscription existante
#[post("/enroll/{slug}")]
pub async fn enroll(
    auth_user: AuthUser,
    path: web::Path<String>,
    body: web::Json<EnrollRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
) -> Result<HttpResponse, AppError> {
    let slug = path.into_inner();
    let enrollment =
        EnrollmentService::enroll(db.get_ref(), emails.get_ref(), auth_user.user_id, &slug, &body)
            .await?;

    let status =
        EnrollmentService::enrollment_status(db.get_ref(), auth_user.user_id, enrollment.id)
            .await?;
    Ok(HttpResponse::Created().json(status))
}

/// POST /courses/enroll-guest/{slug} - Créer un compte depuis la page du cours (PUBLIC)
#[post("/enroll-guest/{slug}")]
pub async fn enroll_guest(
    path: web::Path<String>,
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let slug = path.into_inner();
    let response = AuthService::register_guest(db.get_ref(), &slug, &body).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "auth": response,
        "enroll_url": format!("/api/courses/enroll/{}", slug)
    })))
}

/// GET /courses/enrollment/{id} - Statut de paiement (PROTÉGÉE, propriétaire)
#[get("/enrollment/{id}")]
pub async fn enrollment_status(
    auth_user: AuthUser,
    path: web::Path<Uuid>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let status =
        EnrollmentService::enrollment_status(db.get_ref(), auth_user.user_id, path.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(status))
}

/// GET /courses/materials/{slug} - Projets du cours (inscription activée requise)
#[get("/materials/{slug}")]
pub async fn materials(
    auth_user: AuthUser,
    path: web::Path<String>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let response =
        EnrollmentService::materials(db.get_ref(), auth_user.user_id, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[post("/materials/{slug}/project/{id}/start")]
pub async fn start_project(
    auth_user: AuthUser,
    path: web::Path<(String, i32)>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let (slug, project_id) = path.into_inner();
    let (project_enrollment, already_started) =
        ProjectService::start_project(db.get_ref(), auth_user.user_id, &slug, project_id).await?;

    let message = if already_started {
        "You have already started this project"
    } else {
        "Project started successfully"
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "project_enrollment_id": project_enrollment.id,
        "status": project_enrollment.status,
        "already_started": already_started,
        "message": message
    })))
}

#[post("/materials/{slug}/project/{id}/submit")]
pub async fn submit_project(
    auth_user: AuthUser,
    path: web::Path<(String, i32)>,
    body: web::Json<SubmitProjectRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let (slug, project_id) = path.into_inner();
    let project_enrollment =
        ProjectService::submit_project(db.get_ref(), auth_user.user_id, &slug, project_id, &body)
            .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "project_enrollment_id": project_enrollment.id,
        "status": project_enrollment.status,
        "submitted_at": project_enrollment.submitted_at,
        "message": "Project submitted successfully. Your instructor will review it soon."
    })))
}

/// GET /courses/instructor/submissions - File des projets à corriger
#[get("/instructor/submissions")]
pub async fn instructor_submissions(
    auth_user: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let queue = ProjectService::submission_queue(db.get_ref(), &auth_user).await?;
    Ok(HttpResponse::Ok().json(queue))
}

#[post("/instructor/review/{slug}/project/{id}/{enrollment_id}")]
pub async fn review_project(
    auth_user: AuthUser,
    path: web::Path<(String, i32, Uuid)>,
    body: web::Json<ReviewRequest>,
    db: web::Data<DatabaseConnection>,
    emails: web::Data<EmailService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, AppError> {
    let (slug, project_id, enrollment_id) = path.into_inner();
    let project_enrollment = ProjectService::review_project(
        db.get_ref(),
        emails.get_ref(),
        config.get_ref(),
        &auth_user,
        &slug,
        project_id,
        enrollment_id,
        &body,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "project_enrollment_id": project_enrollment.id,
        "status": project_enrollment.status,
        "grade": project_enrollment.grade,
        "certificate_id": project_enrollment.certificate_id,
        "has_certificate": project_enrollment.certificate.is_some()
    })))
}

/// GET /courses/certificate/download/{id} - PDF en pièce jointe (propriétaire)
#[get("/certificate/download/{id}")]
pub async fn download_certificate(
    auth_user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let file =
        ProjectService::download_certificate(db.get_ref(), auth_user.user_id, path.into_inner())
            .await?;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.filename)],
        })
        .body(file.bytes))
}

/// GET /courses/{slug} - Détail d'un cours (PUBLIC, token optionnel)
#[get("/{slug}")]
pub async fn course_detail(
    auth_user: Option<AuthUser>,
    path: web::Path<String>,
    query: web::Query<CurrencyQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let response = CourseService::course_detail(
        db.get_ref(),
        &path.into_inner(),
        query.currency.as_deref(),
        auth_user.map(|u| u.user_id),
    )
    .await?;
    Ok(HttpResponse::Ok().json(response))
}

// Les chemins fixes passent avant /{slug}
pub fn course_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/courses")
            .service(list_courses)
            .service(currencies)
            .service(my_enrollments)
            .service(activate)
            .service(enroll)
            .service(enroll_guest)
            .service(enrollment_status)
            .service(materials)
            .service(start_project)
            .service(submit_project)
            .service(instructor_submissions)
            .service(review_project)
            .service(download_certificate)
            .service(course_detail)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[actix_web::test]
    async fn test_currencies_lists_supported_codes() {
        let app = test::init_service(App::new().configure(course_routes)).await;

        let req = test::TestRequest::get().uri("/courses/currencies").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let codes: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["code"].as_str().unwrap())
            .collect();
        assert_eq!(codes, vec!["KES", "USD", "NGN"]);
    }

    #[actix_web::test]
    async fn test_my_enrollments_requires_token() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = test::init_service(
            App::new().app_data(web::Data::new(db)).configure(course_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/courses/my-enrollments").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_unknown_currency_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let app = test::init_service(
            App::new().app_data(web::Data::new(db)).configure(course_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/courses/data-analysis-with-python?currency=EUR")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
