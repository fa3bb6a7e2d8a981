use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "overdue")]
    Overdue,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_installments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub enrollment_id: Uuid,
    pub installment_number: i32,   // commence à 1 ; index UNIQUE (enrollment_id, installment_number) posé par db::ensure_schema
    pub amount: Decimal,
    pub due_date: Date,
    pub status: InstallmentStatus,
    pub payment_date: Option<DateTimeUtc>,
    pub payment_reference: String,
    #[sea_orm(column_type = "Text")]
    pub payment_notes: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// En retard : toujours en attente et échéance dépassée
    pub fn is_overdue(&self, today: Date) -> bool {
        self.status == InstallmentStatus::Pending && self.due_date < today
    }
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
}

impl Related<super::enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
