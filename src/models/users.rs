use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Format: pbkdf2:sha256:iterations$salt$hash
    pub is_active: bool,       // false tant que l'email n'est pas vérifié
    pub is_staff: bool,
    pub date_joined: DateTimeUtc,
}

impl Model {
    /// Nom affiché (certificats, emails) : prénom + nom, sinon le username
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::user_profiles::Entity")]
    Profile,

    #[sea_orm(has_many = "super::enrollments::Entity")]
    Enrollments,

    #[sea_orm(has_many = "super::email_verification_tokens::Entity")]
    EmailVerificationTokens,

    #[sea_orm(has_many = "super::password_reset_tokens::Entity")]
    PasswordResetTokens,
}

impl Related<super::user_profiles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
    }
}

impl Related<super::email_verification_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailVerificationTokens.def()
    }
}

impl Related<super::password_reset_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PasswordResetTokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    /// User actif standard pour les tests de services
    pub(crate) fn user() -> Model {
        named("Wanjiku", "Kamau")
    }

    fn named(first: &str, last: &str) -> Model {
        Model {
            id: 1,
            username: "wanjiku_k".to_string(),
            email: "wanjiku@example.com".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            password_hash: String::new(),
            is_active: true,
            is_staff: false,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        assert_eq!(user().full_name(), "Wanjiku Kamau");
        assert_eq!(named("", "").full_name(), "wanjiku_k");
        assert_eq!(named("Wanjiku", "").full_name(), "Wanjiku");
    }
}
