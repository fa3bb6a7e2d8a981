// ============================================================================
// MODÈLE : ENROLLMENTS
// ============================================================================
//
// Description:
//   Inscription d'un user à un cours : plan de paiement (méthode, devise,
//   nombre d'échéances), montant total, montant payé, statut de paiement et
//   code d'activation.
//
// Colonnes principales:
//   - id (UUID, PRIMARY KEY)
//   - user_id, course_id (index UNIQUE composite, db::ensure_schema : une inscription par cours)
//   - installments (1, 2 ou 3)
//   - total_amount / amount_paid (NUMERIC(10,2), dans la devise choisie)
//   - activation_code (VARCHAR(19), UNIQUE) - format XXXX-XXXX-XXXX-XXXX
//
// Workflow:
//   1. POST /api/courses/enroll/{slug} crée l'inscription + les échéances
//   2. Le staff marque les échéances payées puis vérifiées
//   3. amount_paid est RECALCULÉ (somme des échéances vérifiées), jamais
//      incrémenté, puis payment_status est dérivé (services::payment_service)
//   4. Le user active l'inscription avec son code => accès au contenu
//
// Points d'attention:
//   - Les échéances et les projets appartiennent à l'inscription
//     (ON DELETE CASCADE)
//   - L'unicité (user, course) et celle du code sont garanties par la BD
//
// ============================================================================

use rust_decimal::prelude::ToPrimitive;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::services::currency::Currency;

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "mpesa")]
    Mpesa,
    #[sea_orm(string_value = "paypal")]
    Paypal,
    #[sea_orm(string_value = "bank")]
    Bank,
    #[sea_orm(string_value = "other")]
    Other,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "M-Pesa",
            PaymentMethod::Paypal => "PayPal",
            PaymentMethod::Bank => "Bank Transfer",
            PaymentMethod::Other => "Other",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "partial")]
    Partial,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "verified")]
    Verified,
}

impl PaymentStatus {
    /// Paiement soldé (complété ou vérifié par le staff)
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Verified)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: i32,
    pub course_id: i32,

    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
    pub currency: Currency,
    pub installments: i32,
    pub amount_paid: Decimal,

    pub payment_status: PaymentStatus,
    pub enrollment_status: EnrollmentStatus,
    #[sea_orm(unique)]
    #[serde(skip_serializing)] // Exposé seulement une fois le paiement soldé
    pub activation_code: String,
    pub is_activated: bool,
    pub activated_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,

    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub admin_notes: String,
}

impl Model {
    /// Reste à payer, jamais négatif
    pub fn remaining_amount(&self) -> Decimal {
        (self.total_amount - self.amount_paid).max(Decimal::ZERO)
    }

    /// Progression du paiement en %, plafonnée à 100
    pub fn payment_progress_percentage(&self) -> i64 {
        if self.total_amount <= Decimal::ZERO {
            return 0;
        }
        let pct = (self.amount_paid / self.total_amount * Decimal::from(100))
            .trunc()
            .to_i64()
            .unwrap_or(0);
        pct.min(100)
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

    #[sea_orm(
        belongs_to = "super::courses::Entity",
        from = "Column::CourseId",
        to = "super::courses::Column::Id",
        on_delete = "Cascade"
    )]
    Course,

    #[sea_orm(has_many = "super::payment_installments::Entity")]
    PaymentInstallments,

    #[sea_orm(has_many = "super::project_enrollments::Entity")]
    ProjectEnrollments,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::courses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::payment_installments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentInstallments.def()
    }
}

impl Related<super::project_enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectEnrollments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
