// ============================================================================
// MODÈLE : COURSES
// ============================================================================
//
// Description:
//   Catalogue des cours. Les prix sont stockés en USD ; la conversion vers
//   KES / NGN se fait à l'affichage et à l'inscription (services::currency).
//
// Points d'attention:
//   - slug UNIQUE, dérivé du titre s'il n'est pas fourni (utils::slug)
//   - prix effectif = discount_price si présent, sinon price
//   - is_active = false => le cours disparaît du catalogue (soft-disable)
//
// ============================================================================

use rust_decimal::prelude::ToPrimitive;
use sea_orm::ActiveValue;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "courses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub category_id: i32,
    pub instructor_id: Option<i32>,
    #[sea_orm(column_type = "Text")]
    pub overview: String,
    pub duration: String,       // ex: "8 weeks"
    pub schedule: String,       // ex: "online, evenings"
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub is_featured: bool,
    pub is_active: bool,
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Réduction appliquée ; un discount_price nul ou négatif est ignoré
    pub fn active_discount(&self) -> Option<Decimal> {
        self.discount_price.filter(|d| *d > Decimal::ZERO)
    }

    /// Prix réellement facturé (USD)
    pub fn effective_price(&self) -> Decimal {
        self.active_discount().unwrap_or(self.price)
    }

    pub fn has_discount(&self) -> bool {
        self.active_discount().is_some()
    }

    pub fn savings(&self) -> Decimal {
        match self.active_discount() {
            Some(discount) => self.price - discount,
            None => Decimal::ZERO,
        }
    }

    /// Pourcentage de réduction, tronqué à l'entier
    pub fn discount_percentage(&self) -> i64 {
        match self.active_discount() {
            Some(discount) if self.price > Decimal::ZERO => {
                ((self.price - discount) / self.price * Decimal::from(100))
                    .trunc()
                    .to_i64()
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course_categories::Entity",
        from = "Column::CategoryId",
        to = "super::course_categories::Column::Id"
    )]
    Category,

    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::InstructorId",
        to = "super::users::Column::Id"
    )]
    Instructor,

    #[sea_orm(has_many = "super::capstone_projects::Entity")]
    CapstoneProjects,

    #[sea_orm(has_many = "super::enrollments::Entity")]
    Enrollments,
}

impl Related<super::course_categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::capstone_projects::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CapstoneProjects.def()
    }
}

impl Related<super::enrollments::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    /// Slug dérivé du titre quand il n'est pas fourni
    async fn before_save<C>(mut self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let slug_missing = match &self.slug {
            ActiveValue::Set(slug) | ActiveValue::Unchanged(slug) => slug.trim().is_empty(),
            ActiveValue::NotSet => true,
        };
        if slug_missing {
            if let ActiveValue::Set(title) | ActiveValue::Unchanged(title) = &self.title {
                self.slug = ActiveValue::Set(crate::utils::slug::slugify(title));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    pub(crate) fn course(price: Decimal, discount_price: Option<Decimal>) -> Model {
        Model {
            id: 7,
            title: "Data Analysis with Python".to_string(),
            slug: "data-analysis-with-python".to_string(),
            category_id: 1,
            instructor_id: Some(42),
            overview: "Pandas, NumPy, visualisation".to_string(),
            duration: "8 weeks".to_string(),
            schedule: "online".to_string(),
            price,
            discount_price,
            is_featured: false,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_effective_price_prefers_discount() {
        assert_eq!(course(dec!(100), None).effective_price(), dec!(100));
        assert_eq!(course(dec!(100), Some(dec!(80))).effective_price(), dec!(80));
    }

    #[test]
    fn test_savings_and_discount_percentage() {
        let discounted = course(dec!(120), Some(dec!(90)));
        assert!(discounted.has_discount());
        assert_eq!(discounted.savings(), dec!(30));
        assert_eq!(discounted.discount_percentage(), 25);

        let full = course(dec!(120), None);
        assert_eq!(full.savings(), Decimal::ZERO);
        assert_eq!(full.discount_percentage(), 0);
    }

    #[test]
    fn test_zero_discount_price_means_full_price() {
        let zero = course(dec!(100), Some(dec!(0)));
        assert_eq!(zero.effective_price(), dec!(100));
        assert!(!zero.has_discount());
        assert_eq!(zero.savings(), Decimal::ZERO);
        assert_eq!(zero.discount_percentage(), 0);

        let planned = crate::services::installment_service::InstallmentService::plan(
            zero.effective_price(),
            2,
            chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        )
        .unwrap();
        assert_eq!(planned[0].amount, dec!(50));
    }

    #[tokio::test]
    async fn test_slug_derived_from_title_when_blank() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let active = ActiveModel {
            title: ActiveValue::Set("SQL for Analysts".to_string()),
            slug: ActiveValue::Set(String::new()),
            ..Default::default()
        };

        let saved = active.before_save(&db, true).await.unwrap();
        assert!(matches!(saved.slug, ActiveValue::Set(ref slug) if slug == "sql-for-analysts"));
    }
}
