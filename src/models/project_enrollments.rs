// ============================================================================
// MODÈLE : PROJECT ENROLLMENTS
// ============================================================================
//
// Description:
//   Suivi d'un projet capstone pour une inscription donnée.
//
// Cycle de vie (services::project_service):
//   not_started -> in_progress -> submitted -> completed
//   submitted -> in_progress  ("request changes" par l'instructeur)
//
// Points d'attention:
//   - index UNIQUE (enrollment_id, project_id), créé par db::ensure_schema
//   - grade seulement renseigné à la complétion (0..=100)
//   - certificate : PDF rendu à la complétion, téléchargeable par l'étudiant
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[sea_orm(string_value = "not_started")]
    NotStarted,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_enrollments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub enrollment_id: Uuid,
    pub project_id: i32,
    pub status: ProjectStatus,

    pub started_at: Option<DateTimeUtc>,
    pub submitted_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,

    // Soumission
    #[sea_orm(column_type = "Text")]
    pub submission_notes: String,
    pub github_repo_url: String,
    pub google_colab_url: String,
    pub jupyter_notebook_url: String,
    #[sea_orm(column_type = "Text")]
    pub additional_links: String,

    // Revue
    #[sea_orm(column_type = "Text")]
    pub instructor_feedback: String,
    pub grade: Option<i32>,

    // Certificat
    #[serde(skip)]
    pub certificate: Option<Vec<u8>>,
    pub certificate_id: Option<String>,
    pub certificate_downloads: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::enrollments::Entity",
        from = "Column::EnrollmentId",
        to = "super::enrollments::Column::Id",
        on_delete = "Cascade"
    )]
    Enrollment,

    #[sea_orm(
        belongs_to = "super::capstone_projects::Entity",
        from = "Column::ProjectId",
        to = "super::capstone_projects::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl Related<super::capstone_projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
