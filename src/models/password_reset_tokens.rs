// ============================================================================
// MODÈLE : PASSWORD RESET TOKENS
// ============================================================================
//
// Colonnes de la table password_reset_tokens:
//   - id (INTEGER, PRIMARY KEY, SERIAL)
//   - user_id (INTEGER, NOT NULL, FK vers users)
//   - token (UUID, UNIQUE, NOT NULL) - UUID v4
//   - expires_at (TIMESTAMPTZ, NOT NULL) - created_at + 1 heure
//   - used (BOOLEAN, DEFAULT FALSE, NOT NULL)
//   - created_at (TIMESTAMPTZ, NOT NULL)
//
// Workflow:
//   1. User demande reset via POST /api/auth/forgot-password
//   2. Backend génère un token UUID v4 (les anciens non utilisés sont supprimés)
//   3. Backend envoie l'email "password_reset" avec le lien
//   4. Frontend envoie POST /api/auth/reset-password avec token + nouveau password
//   5. Backend vérifie: token existe, not expired, not used
//   6. Backend change le password et met used = true
//
// Points d'attention:
//   - La réponse de forgot-password est identique que l'email existe ou non
//   - Token expire après 1 heure
//
// ============================================================================

use chrono::{Duration, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const VALIDITY_HOURS: i64 = 1;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "password_reset_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub token: Uuid,

    pub expires_at: DateTimeUtc,

    pub used: bool,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

pub fn expiry_from_now() -> DateTimeUtc {
    Utc::now() + Duration::hours(VALIDITY_HOURS)
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
