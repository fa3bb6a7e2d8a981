// ============================================================================
// MODÈLE : EMAIL VERIFICATION TOKENS
// ============================================================================
//
// Description:
//   Tokens de vérification d'email émis à l'inscription.
//
// Colonnes de la table email_verification_tokens:
//   - id (INTEGER, PRIMARY KEY, SERIAL)
//   - user_id (INTEGER, NOT NULL, FK vers users)
//   - token (UUID, UNIQUE, NOT NULL) - UUID v4
//   - email (VARCHAR, NOT NULL) - adresse vérifiée au moment de l'émission
//   - expires_at (TIMESTAMPTZ, NOT NULL) - created_at + 24 heures
//   - used (BOOLEAN, DEFAULT FALSE, NOT NULL)
//   - created_at (TIMESTAMPTZ, NOT NULL)
//
// Workflow:
//   1. User s'inscrit via POST /api/auth/register
//   2. Backend crée le user avec is_active = false + son profil
//   3. Backend supprime les anciens tokens non utilisés, en génère un nouveau
//   4. Backend envoie l'email "verification" avec le lien
//   5. Frontend appelle GET /api/auth/verify-email?token=xxx
//   6. Backend vérifie: token existe, not expired, not used
//   7. Backend active le user, marque le profil vérifié, token used = true
//
// Points d'attention:
//   - Un token ne peut être utilisé qu'une fois (used = true)
//   - Token expiré => supprimé lors de la tentative
//   - ON DELETE CASCADE: si user supprimé, tokens supprimés aussi
//
// ============================================================================

use chrono::{Duration, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durée de validité d'un token de vérification
pub const VALIDITY_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_verification_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub token: Uuid,

    pub email: String,

    pub expires_at: DateTimeUtc,

    pub used: bool,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Date d'expiration d'un token créé maintenant
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
