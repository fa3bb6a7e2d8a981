use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::*;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::payment_installments::{self, InstallmentStatus};

/// Nombre d'échéances autorisé (paiement complet, 2 ou 3 fois)
pub const MIN_INSTALLMENTS: i32 = 1;
pub const MAX_INSTALLMENTS: i32 = 3;
/// Cadence mensuelle
pub const DAYS_BETWEEN_INSTALLMENTS: i64 = 30;

/// Échéance calculée, avant insertion
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedInstallment {
    pub installment_number: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

pub struct InstallmentService;

impl InstallmentService {
    /// Découpe le total en `count` échéances égales, espacées de 30 jours
    /// à partir de `start` (la première est due le jour même).
    ///
    /// Chaque montant est total / count arrondi au centime ; le reste
    /// éventuel n'est PAS redistribué (ex: 100 / 3 => 3 x 33.33).
    pub fn plan(
        total: Decimal,
        count: i32,
        start: NaiveDate,
    ) -> Result<Vec<PlannedInstallment>, AppError> {
        if !(MIN_INSTALLMENTS..=MAX_INSTALLMENTS).contains(&count) {
            return Err(AppError::Validation(format!(
                "Installments must be between {} and {}",
                MIN_INSTALLMENTS, MAX_INSTALLMENTS
            )));
        }
        if total <= Decimal::ZERO {
            return Err(AppError::Validation(
                "Total amount must be greater than 0".to_string(),
            ));
        }

        let amount = (total / Decimal::from(count)).round_dp(2);

        Ok((0..count)
            .map(|i| PlannedInstallment {
                installment_number: i + 1,
                amount,
                due_date: start + Duration::days(DAYS_BETWEEN_INSTALLMENTS * i as i64),
            })
            .collect())
    }

    /// Insère les échéances planifiées pour une inscription
    pub async fn persist<C: ConnectionTrait>(
        db: &C,
        enrollment_id: Uuid,
        planned: &[PlannedInstallment],
    ) -> Result<Vec<payment_installments::Model>, DbErr> {
        let now = Utc::now();
        let mut created = Vec::with_capacity(planned.len());

        for p in planned {
            let row = payment_installments::ActiveModel {
                enrollment_id: Set(enrollment_id),
                installment_number: Set(p.installment_number),
                amount: Set(p.amount),
                due_date: Set(p.due_date),
                status: Set(InstallmentStatus::Pending),
                payment_date: Set(None),
                payment_reference: Set(String::new()),
                payment_notes: Set(String::new()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            created.push(row.insert(db).await?);
        }

        Ok(created)
    }

    /// Échéances d'une inscription, dans l'ordre
    pub async fn for_enrollment<C: ConnectionTrait>(
        db: &C,
        enrollment_id: Uuid,
    ) -> Result<Vec<payment_installments::Model>, DbErr> {
        payment_installments::Entity::find()
            .filter(payment_installments::Column::EnrollmentId.eq(enrollment_id))
            .order_by_asc(payment_installments::Column::InstallmentNumber)
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_two_installments_of_fifty() {
        let start = day(2026, 3, 1);
        let plan = InstallmentService::plan(dec!(100), 2, start).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].installment_number, 1);
        assert_eq!(plan[0].amount, dec!(50));
        assert_eq!(plan[0].due_date, start);
        assert_eq!(plan[1].installment_number, 2);
        assert_eq!(plan[1].amount, dec!(50));
        assert_eq!(plan[1].due_date, day(2026, 3, 31));
    }

    #[test]
    fn test_single_installment_is_full_amount() {
        let plan = InstallmentService::plan(dec!(15000), 1, day(2026, 1, 15)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].amount, dec!(15000));
        assert_eq!(plan[0].due_date, day(2026, 1, 15));
    }

    #[test]
    fn test_uneven_split_keeps_rounding_remainder() {
        let start = day(2026, 1, 1);
        let plan = InstallmentService::plan(dec!(100), 3, start).unwrap();

        let amounts: Vec<Decimal> = plan.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.33)]);

        let sum: Decimal = amounts.iter().sum();
        assert!((dec!(100) - sum).abs() <= dec!(0.01) * Decimal::from(3));

        assert_eq!(plan[2].due_date, start + Duration::days(60));
    }

    #[test]
    fn test_sum_matches_total_within_tolerance() {
        let start = day(2026, 6, 1);
        for total in [dec!(15000), dec!(79600), dec!(99.99), dec!(1234.56)] {
            for count in 1..=3 {
                let plan = InstallmentService::plan(total, count, start).unwrap();
                let sum: Decimal = plan.iter().map(|p| p.amount).sum();
                assert!(
                    (total - sum).abs() <= dec!(0.01) * Decimal::from(count),
                    "total {} count {} sum {}",
                    total,
                    count,
                    sum
                );
            }
        }
    }

    #[test]
    fn test_rejects_bad_count_and_amount() {
        let start = day(2026, 1, 1);
        assert!(InstallmentService::plan(dec!(100), 0, start).is_err());
        assert!(InstallmentService::plan(dec!(100), 4, start).is_err());
        assert!(InstallmentService::plan(dec!(0), 2, start).is_err());
    }
}
