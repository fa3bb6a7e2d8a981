use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::enrollments::{self, PaymentMethod, PaymentStatus};
use crate::models::payment_installments::{self, InstallmentStatus};
use crate::models::{courses, users};
use crate::services::currency::format_amount;
use crate::services::email_service::EmailService;
use crate::services::installment_service::InstallmentService;

/// Numéro M-Pesa et compte PayPal affichés dans les instructions
pub const MPESA_NUMBER: &str = "0768998305";
pub const MPESA_ACCOUNT: &str = "LUM ANALYTICA";
pub const PAYPAL_ACCOUNT: &str = "lum.analytica@gmail.com";

/// Résultat du recalcul d'une inscription
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    pub amount_paid: Decimal,
    pub payment_status: PaymentStatus,
}

/// Instructions de paiement selon la méthode choisie
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PaymentInstructions {
    pub method: &'static str,
    pub instructions: String,
}

pub struct PaymentService;

impl PaymentService {
    /// Recalcule amount_paid (somme des échéances vérifiées) et le statut.
    ///
    /// - completed : payé >= total, ou toutes les échéances vérifiées
    ///   (l'arrondi au centime peut laisser la somme sous le total)
    /// - partial   : quelque chose de payé
    /// - pending   : rien
    ///
    /// Un statut "verified" déjà posé par le staff est conservé tant que
    /// le paiement reste soldé.
    pub fn reconcile(
        total_amount: Decimal,
        current: PaymentStatus,
        installments: &[payment_installments::Model],
    ) -> Reconciliation {
        let amount_paid: Decimal = installments
            .iter()
            .filter(|i| i.status == InstallmentStatus::Verified)
            .map(|i| i.amount)
            .sum();

        let all_verified = !installments.is_empty()
            && installments.iter().all(|i| i.status == InstallmentStatus::Verified);

        let payment_status = if amount_paid >= total_amount || all_verified {
            if current == PaymentStatus::Verified {
                PaymentStatus::Verified
            } else {
                PaymentStatus::Completed
            }
        } else if amount_paid > Decimal::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        };

        Reconciliation { amount_paid, payment_status }
    }

    /// Montant de la prochaine échéance (0 si tout est vérifié)
    pub fn next_installment_amount(
        enrollment: &enrollments::Model,
        installments: &[payment_installments::Model],
    ) -> Decimal {
        if enrollment.installments <= 1 {
            return enrollment.total_amount;
        }

        let verified = installments
            .iter()
            .filter(|i| i.status == InstallmentStatus::Verified)
            .count() as i32;
        if verified >= enrollment.installments {
            return Decimal::ZERO;
        }

        installments
            .iter()
            .find(|i| i.status != InstallmentStatus::Verified)
            .map(|i| i.amount)
            .unwrap_or_else(|| (enrollment.total_amount / Decimal::from(enrollment.installments)).round_dp(2))
    }

    pub fn payment_instructions(enrollment: &enrollments::Model, next_amount: Decimal) -> PaymentInstructions {
        let amount = format_amount(next_amount, enrollment.currency);
        match enrollment.payment_method {
            PaymentMethod::Mpesa => PaymentInstructions {
                method: PaymentMethod::Mpesa.label(),
                instructions: format!(
                    "Send {} to: {}\nAccount: {}\nInclude your enrollment ID: {} in the message",
                    amount, MPESA_NUMBER, MPESA_ACCOUNT, enrollment.id
                ),
            },
            PaymentMethod::Paypal | PaymentMethod::Bank => PaymentInstructions {
                method: enrollment.payment_method.label(),
                instructions: format!(
                    "Send payment to: {}\nAmount: {}\nInclude your enrollment ID: {} in the payment note",
                    PAYPAL_ACCOUNT, amount, enrollment.id
                ),
            },
            PaymentMethod::Other => PaymentInstructions {
                method: PaymentMethod::Other.label(),
                instructions: format!(
                    "Contact our team to arrange payment of {}.\nEnrollment ID: {}",
                    amount, enrollment.id
                ),
            },
        }
    }

    /// Applique le recalcul à une inscription et le persiste
    pub async fn reconcile_enrollment<C: ConnectionTrait>(
        db: &C,
        enrollment: enrollments::Model,
    ) -> Result<enrollments::Model, DbErr> {
        let installments = InstallmentService::for_enrollment(db, enrollment.id).await?;
        let result = Self::reconcile(enrollment.total_amount, enrollment.payment_status, &installments);

        tracing::info!(
            enrollment_id = %enrollment.id,
            amount_paid = %result.amount_paid,
            status = ?result.payment_status,
            "payment reconciled"
        );

        let mut active: enrollments::ActiveModel = enrollment.into();
        active.amount_paid = Set(result.amount_paid);
        active.payment_status = Set(result.payment_status);
        active.updated_at = Set(Utc::now());
        active.update(db).await
    }

    /// pending / overdue -> paid
    pub async fn mark_installment_paid(
        db: &DatabaseConnection,
        installment_id: i32,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<payment_installments::Model, AppError> {
        let installment = find_installment(db, installment_id).await?;

        if !matches!(installment.status, InstallmentStatus::Pending | InstallmentStatus::Overdue) {
            return Err(AppError::Conflict(format!(
                "Installment {} cannot be marked paid from status {:?}",
                installment.id, installment.status
            )));
        }

        let mut active: payment_installments::ActiveModel = installment.into();
        active.status = Set(InstallmentStatus::Paid);
        active.payment_date = Set(Some(Utc::now()));
        if let Some(reference) = reference {
            active.payment_reference = Set(reference);
        }
        if let Some(notes) = notes {
            active.payment_notes = Set(notes);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(db).await?)
    }

    /// paid -> verified, puis recalcul de l'inscription
    pub async fn mark_installment_verified(
        db: &DatabaseConnection,
        emails: &EmailService,
        installment_id: i32,
    ) -> Result<enrollments::Model, AppError> {
        let installment = find_installment(db, installment_id).await?;

        if installment.status != InstallmentStatus::Paid {
            return Err(AppError::Conflict(format!(
                "Installment {} must be paid before it can be verified",
                installment.id
            )));
        }

        let enrollment_id = installment.enrollment_id;
        let txn = db.begin().await?;

        let mut active: payment_installments::ActiveModel = installment.into();
        active.status = Set(InstallmentStatus::Verified);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let enrollment = find_enrollment(&txn, enrollment_id).await?;
        let enrollment = Self::reconcile_enrollment(&txn, enrollment).await?;
        txn.commit().await?;

        notify_payment_confirmation(db, emails, &enrollment).await;
        Ok(enrollment)
    }

    /// Toutes les échéances -> verified, puis recalcul (action staff
    /// "paiement complet"). amount_paid reste la somme des vérifiées.
    pub async fn mark_enrollment_paid(
        db: &DatabaseConnection,
        emails: &EmailService,
        enrollment_id: Uuid,
    ) -> Result<enrollments::Model, AppError> {
        let enrollment = find_enrollment(db, enrollment_id).await?;

        if enrollment.payment_status.is_settled() {
            return Err(AppError::Conflict("Payment is already complete".to_string()));
        }

        let txn = db.begin().await?;

        let now = Utc::now();
        for installment in InstallmentService::for_enrollment(&txn, enrollment.id).await? {
            if installment.status == InstallmentStatus::Verified {
                continue;
            }
            let had_payment_date = installment.payment_date.is_some();
            let mut active: payment_installments::ActiveModel = installment.into();
            active.status = Set(InstallmentStatus::Verified);
            if !had_payment_date {
                active.payment_date = Set(Some(now));
            }
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        let enrollment = Self::reconcile_enrollment(&txn, enrollment).await?;
        txn.commit().await?;

        notify_payment_confirmation(db, emails, &enrollment).await;
        Ok(enrollment)
    }

    /// completed -> verified (contrôle final du staff)
    pub async fn verify_enrollment_payment(
        db: &DatabaseConnection,
        enrollment_id: Uuid,
    ) -> Result<enrollments::Model, AppError> {
        let enrollment = find_enrollment(db, enrollment_id).await?;

        if enrollment.payment_status != PaymentStatus::Completed {
            return Err(AppError::Conflict(
                "Only completed payments can be verified".to_string(),
            ));
        }

        let mut active: enrollments::ActiveModel = enrollment.into();
        active.payment_status = Set(PaymentStatus::Verified);
        active.updated_at = Set(Utc::now());
        Ok(active.update(db).await?)
    }

    /// pending dont l'échéance est dépassée -> overdue. Renvoie le nombre.
    pub async fn flag_overdue(db: &DatabaseConnection, today: NaiveDate) -> Result<u64, AppError> {
        let result = payment_installments::Entity::update_many()
            .col_expr(
                payment_installments::Column::Status,
                Expr::value(InstallmentStatus::Overdue),
            )
            .col_expr(payment_installments::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(payment_installments::Column::Status.eq(InstallmentStatus::Pending))
            .filter(payment_installments::Column::DueDate.lt(today))
            .exec(db)
            .await?;

        tracing::info!(count = result.rows_affected, "installments flagged overdue");
        Ok(result.rows_affected)
    }

    /// Rappel de paiement pour une échéance non réglée
    pub async fn send_reminder(
        db: &DatabaseConnection,
        emails: &EmailService,
        installment_id: i32,
    ) -> Result<(), AppError> {
        let installment = find_installment(db, installment_id).await?;

        if !matches!(installment.status, InstallmentStatus::Pending | InstallmentStatus::Overdue) {
            return Err(AppError::Conflict(
                "Reminders are only sent for unpaid installments".to_string(),
            ));
        }

        let enrollment = find_enrollment(db, installment.enrollment_id).await?;
        let (user, course) = load_user_and_course(db, &enrollment).await?;

        emails.send_payment_reminder(&user, &course, &enrollment, &installment);
        Ok(())
    }
}

async fn find_installment<C: ConnectionTrait>(
    db: &C,
    installment_id: i32,
) -> Result<payment_installments::Model, AppError> {
    payment_installments::Entity::find_by_id(installment_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Installment not found".to_string()))
}

pub(crate) async fn find_enrollment<C: ConnectionTrait>(
    db: &C,
    enrollment_id: Uuid,
) -> Result<enrollments::Model, AppError> {
    enrollments::Entity::find_by_id(enrollment_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))
}

pub(crate) async fn load_user_and_course<C: ConnectionTrait>(
    db: &C,
    enrollment: &enrollments::Model,
) -> Result<(users::Model, courses::Model), AppError> {
    let user = users::Entity::find_by_id(enrollment.user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let course = courses::Entity::find_by_id(enrollment.course_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;
    Ok((user, course))
}

/// Email de confirmation ; une erreur de lecture est loggée, pas propagée
async fn notify_payment_confirmation(
    db: &DatabaseConnection,
    emails: &EmailService,
    enrollment: &enrollments::Model,
) {
    match load_user_and_course(db, enrollment).await {
        Ok((user, course)) => {
            emails.send_payment_confirmation(&user, &course, enrollment);
        }
        Err(e) => {
            tracing::warn!(enrollment_id = %enrollment.id, error = %e, "payment confirmation email skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enrollments::tests::enrollment;
    use rust_decimal_macros::dec;

    fn installment(number: i32, amount: Decimal, status: InstallmentStatus) -> payment_installments::Model {
        let now = Utc::now();
        payment_installments::Model {
            id: number,
            enrollment_id: Uuid::nil(),
            installment_number: number,
            amount,
            due_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            status,
            payment_date: None,
            payment_reference: String::new(),
            payment_notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_nothing_verified_is_pending() {
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Paid),
            installment(2, dec!(50), InstallmentStatus::Pending),
        ];
        let r = PaymentService::reconcile(dec!(100), PaymentStatus::Pending, &installments);
        assert_eq!(r.amount_paid, Decimal::ZERO);
        assert_eq!(r.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn test_one_of_two_verified_is_partial() {
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Pending),
        ];
        let r = PaymentService::reconcile(dec!(100), PaymentStatus::Pending, &installments);
        assert_eq!(r.amount_paid, dec!(50));
        assert_eq!(r.payment_status, PaymentStatus::Partial);
    }

    #[test]
    fn test_all_verified_is_completed() {
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Verified),
        ];
        let r = PaymentService::reconcile(dec!(100), PaymentStatus::Partial, &installments);
        assert_eq!(r.amount_paid, dec!(100));
        assert_eq!(r.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_rounded_thirds_still_complete() {
        let installments = vec![
            installment(1, dec!(33.33), InstallmentStatus::Verified),
            installment(2, dec!(33.33), InstallmentStatus::Verified),
            installment(3, dec!(33.33), InstallmentStatus::Verified),
        ];
        let r = PaymentService::reconcile(dec!(100), PaymentStatus::Partial, &installments);
        assert_eq!(r.amount_paid, dec!(99.99));
        assert_eq!(r.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        // Recalculer deux fois ne double pas le montant payé
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Pending),
        ];
        let first = PaymentService::reconcile(dec!(100), PaymentStatus::Pending, &installments);
        let second = PaymentService::reconcile(dec!(100), first.payment_status, &installments);
        assert_eq!(first, second);
    }

    #[test]
    fn test_verified_status_is_kept() {
        let installments = vec![installment(1, dec!(100), InstallmentStatus::Verified)];
        let r = PaymentService::reconcile(dec!(100), PaymentStatus::Verified, &installments);
        assert_eq!(r.payment_status, PaymentStatus::Verified);
    }

    #[test]
    fn test_next_installment_amount() {
        let e = enrollment(dec!(100), dec!(50));
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Pending),
        ];
        assert_eq!(PaymentService::next_installment_amount(&e, &installments), dec!(50));

        let done = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Verified),
        ];
        assert_eq!(PaymentService::next_installment_amount(&e, &done), Decimal::ZERO);

        let mut single = enrollment(dec!(100), dec!(0));
        single.installments = 1;
        assert_eq!(PaymentService::next_installment_amount(&single, &[]), dec!(100));
    }

    #[test]
    fn test_mpesa_instructions_mention_enrollment_id() {
        let e = enrollment(dec!(15000), dec!(0));
        let instructions = PaymentService::payment_instructions(&e, dec!(7500));
        assert_eq!(instructions.method, "M-Pesa");
        assert!(instructions.instructions.contains(MPESA_NUMBER));
        assert!(instructions.instructions.contains(&e.id.to_string()));
        assert!(instructions.instructions.contains("7500.00"));
    }

    #[tokio::test]
    async fn test_reconcile_enrollment_persists_sum_of_verified() {
        let e = enrollment(dec!(100), dec!(0));
        let installments = vec![
            installment(1, dec!(50), InstallmentStatus::Verified),
            installment(2, dec!(50), InstallmentStatus::Pending),
        ];
        let mut updated = e.clone();
        updated.amount_paid = dec!(50);
        updated.payment_status = PaymentStatus::Partial;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([installments])
            .append_query_results([vec![updated.clone()]])
            .into_connection();

        let result = PaymentService::reconcile_enrollment(&db, e).await.unwrap();
        assert_eq!(result.amount_paid, dec!(50));
        assert_eq!(result.payment_status, PaymentStatus::Partial);
    }
}
