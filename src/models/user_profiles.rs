// ============================================================================
// MODÈLE : USER PROFILES
// ============================================================================
//
// Description:
//   Profil 1-1 d'un utilisateur (rôle, coordonnées, statut de vérification
//   de l'email).
//
// Workflow:
//   Le profil est créé explicitement par le cas d'usage d'inscription
//   (services::auth_service::register), juste après l'insertion du user.
//   Aucun hook implicite sur l'insertion d'un user.
//
// Points d'attention:
//   - user_id UNIQUE : un seul profil par utilisateur
//   - ON DELETE CASCADE depuis users
//
// ============================================================================

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[sea_orm(string_value = "learner")]
    Learner,
    #[sea_orm(string_value = "instructor")]
    Instructor,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub user_id: i32,

    pub role: Role,
    pub phone_number: String,
    pub bio: String,
    pub location: String,
    pub country: String,
    pub state_city: String,

    pub is_email_verified: bool,
    pub email_verification_sent_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn is_instructor(&self) -> bool {
        self.role == Role::Instructor
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
