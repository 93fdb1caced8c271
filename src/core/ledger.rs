//! Payment ledger - Applies, reverses and corrects payments against student balances.
//!
//! Every mutation is one read-modify-write transaction: the payment and its student are
//! read, validated, and written back together, with the student write conditional on the
//! version that was read. Losing a race fails the attempt with [`Error::Conflict`] and the
//! whole attempt is rerun by [`with_retry`].
//!
//! Two balance modes exist. A monthly package replaces the student's period figures
//! (`tuition_total`, `tuition_paid`, `payment_expires_on`); every other payment type
//! accumulates into `tuition_paid`. Reversing a monthly payment resets the student to the
//! full debt for the period, since the balance before a partial-period payment is not
//! recorded anywhere.

use crate::{
    config::rates::{DEFAULT_CARD_NETWORK, FeeTable, LedgerConfig},
    core::{
        fees::{compute_fees, fee_rate},
        retry::with_retry,
        session::{Capability, Session},
        student::{TuitionBalance, write_balance},
    },
    entities::{Payment, PaymentMethod, PaymentType, Student, payment, student},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info, warn};

/// A payment as entered at the front desk
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInput {
    /// Paying student
    pub student_id: i64,
    /// Date the money was received
    pub date: NaiveDate,
    /// Amount before fees and tax
    pub amount_gross: f64,
    /// How it was paid
    pub method: PaymentMethod,
    /// Card network for card payments, defaults to Elkart
    pub card_network: Option<String>,
    /// What the payment buys
    pub payment_type: PaymentType,
    /// Package capacity; required for per-lesson packages
    pub lesson_count: Option<i32>,
    /// New period total for monthly packages, defaults to the student's current total
    pub tuition_total: Option<f64>,
    /// End of the period a monthly package covers; required for monthly packages
    pub expires_on: Option<NaiveDate>,
    /// Free-form note
    pub note: Option<String>,
}

impl PaymentInput {
    /// Checks the input before any transaction is started.
    pub fn validate(&self) -> Result<()> {
        validate_amount(self.amount_gross)?;

        if let Some(count) = self.lesson_count {
            validate_lesson_count(count)?;
        }

        match self.payment_type {
            PaymentType::PerLessonPackage if self.lesson_count.is_none() => {
                return Err(Error::validation(
                    "A per-lesson package needs a lesson count",
                ));
            }
            PaymentType::MonthlyPackage if self.expires_on.is_none() => {
                return Err(Error::validation(
                    "A monthly package needs an expiry date",
                ));
            }
            _ => {}
        }

        if let Some(total) = self.tuition_total {
            if !total.is_finite() || total < 0.0 {
                return Err(Error::validation(format!(
                    "Tuition total must be a non-negative amount, got {total}"
                )));
            }
        }

        Ok(())
    }
}

/// Corrections to an existing payment; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentChanges {
    /// New gross amount
    pub amount_gross: Option<f64>,
    /// New payment method
    pub method: Option<PaymentMethod>,
    /// New card network
    pub card_network: Option<String>,
    /// New package capacity, may not drop below the lessons already logged
    pub lesson_count: Option<i32>,
    /// New payment date
    pub date: Option<NaiveDate>,
    /// New period end
    pub expires_on: Option<NaiveDate>,
    /// New note
    pub note: Option<String>,
}

impl PaymentChanges {
    fn validate(&self) -> Result<()> {
        if let Some(amount) = self.amount_gross {
            validate_amount(amount)?;
        }
        if let Some(count) = self.lesson_count {
            validate_lesson_count(count)?;
        }
        Ok(())
    }

    const fn touches_fees(&self) -> bool {
        self.amount_gross.is_some() || self.method.is_some() || self.card_network.is_some()
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::validation(format!(
            "Payment amount must be a positive number, got {amount}"
        )));
    }
    Ok(())
}

fn validate_lesson_count(count: i32) -> Result<()> {
    if count <= 0 {
        return Err(Error::validation(format!(
            "Lesson count must be positive, got {count}"
        )));
    }
    Ok(())
}

fn warn_if_unpriced(method: PaymentMethod, card_network: Option<&str>, fees: &FeeTable) {
    if fee_rate(method, card_network, fees).is_none() {
        warn!(
            "No POS rate configured for card network {}, charging no fee",
            card_network.unwrap_or(DEFAULT_CARD_NETWORK)
        );
    }
}

fn per_lesson_value(amount_gross: f64, lesson_count: Option<i32>) -> Option<f64> {
    lesson_count.map(|count| amount_gross / f64::from(count))
}

/// Records a payment and updates the paying student's balance in one transaction.
///
/// Fails with [`Error::NotFound`] if the student does not exist, in which case nothing is
/// written.
pub async fn apply_payment(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    input: PaymentInput,
) -> Result<payment::Model> {
    session.require(Capability::RecordPayments)?;
    input.validate()?;
    warn_if_unpriced(input.method, input.card_network.as_deref(), &config.fees);

    let payment = with_retry(config.retry, || {
        apply_payment_once(db, session, config, &input)
    })
    .await?;

    info!(
        "Recorded {:?} payment {} of {} for student {} (net {})",
        payment.payment_type,
        payment.id,
        payment.amount_gross,
        payment.student_id,
        payment.amount_net
    );
    Ok(payment)
}

async fn apply_payment_once(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    input: &PaymentInput,
) -> Result<payment::Model> {
    let txn = db.begin().await?;

    let student = Student::find_by_id(input.student_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "student",
            id: input.student_id,
        })?;

    let breakdown = compute_fees(
        input.amount_gross,
        input.method,
        input.card_network.as_deref(),
        &config.fees,
        &config.tax,
    );

    let payment = payment::ActiveModel {
        student_id: Set(student.id),
        location_id: Set(session.location_id().map(ToString::to_string)),
        date: Set(input.date),
        amount_gross: Set(input.amount_gross),
        bank_fee: Set(breakdown.bank_fee),
        tax_amount: Set(breakdown.tax_amount),
        amount_net: Set(breakdown.net),
        method: Set(input.method),
        card_network: Set(input.card_network.clone()),
        payment_type: Set(input.payment_type),
        lesson_count: Set(input.lesson_count),
        lessons_logged: Set(0),
        per_lesson_value: Set(per_lesson_value(input.amount_gross, input.lesson_count)),
        expires_on: Set(input.expires_on),
        recorded_by: Set(session.actor_id().to_string()),
        note: Set(input.note.clone()),
        version: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let balance = balance_after_payment(&student, input);
    write_balance(&txn, &student, balance).await?;

    txn.commit().await?;
    Ok(payment)
}

fn balance_after_payment(student: &student::Model, input: &PaymentInput) -> TuitionBalance {
    let mut balance = TuitionBalance::of(student);
    balance.last_payment_date = Some(input.date);

    if input.payment_type.replaces_period() {
        balance.tuition_total = input.tuition_total.unwrap_or(student.tuition_total);
        balance.tuition_paid = input.amount_gross;
        balance.payment_expires_on = input.expires_on;
    } else {
        balance.tuition_paid = student.tuition_paid + input.amount_gross;
    }
    balance.tuition_owed = TuitionBalance::outstanding(balance.tuition_total, balance.tuition_paid);
    balance
}

/// Deletes a payment and reverses its effect on the student's balance.
///
/// Returns the student as it stands after the reversal. If the payment exists but its
/// student does not, the payment is still deleted and [`Error::NotFound`] is returned for
/// the student, because there is no balance left to reverse.
pub async fn reverse_payment(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    payment_id: i64,
) -> Result<student::Model> {
    session.require(Capability::DeletePayments)?;

    let student = with_retry(config.retry, || reverse_payment_once(db, payment_id)).await?;

    info!(
        "Reversed payment {payment_id}; student {} now owes {}",
        student.id, student.tuition_owed
    );
    Ok(student)
}

async fn reverse_payment_once(db: &DatabaseConnection, payment_id: i64) -> Result<student::Model> {
    let txn = db.begin().await?;

    let payment = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: payment_id,
        })?;
    let student = Student::find_by_id(payment.student_id).one(&txn).await?;

    let deleted = Payment::delete_many()
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::Version.eq(payment.version))
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "payment",
            id: payment_id,
        });
    }

    let Some(student) = student else {
        txn.commit().await?;
        warn!(
            "Deleted payment {payment_id} but its student {} is missing, balance not reversed",
            payment.student_id
        );
        return Err(Error::NotFound {
            entity: "student",
            id: payment.student_id,
        });
    };

    let balance = balance_after_reversal(&student, &payment);
    let student = write_balance(&txn, &student, balance).await?;

    txn.commit().await?;
    Ok(student)
}

fn balance_after_reversal(student: &student::Model, payment: &payment::Model) -> TuitionBalance {
    let mut balance = TuitionBalance::of(student);

    if payment.payment_type.replaces_period() {
        balance.tuition_paid = 0.0;
        balance.tuition_owed = student.tuition_total;
        // Only clear the expiry this payment set; a newer payment may own it now.
        if student.payment_expires_on.is_some() && student.payment_expires_on == payment.expires_on
        {
            balance.payment_expires_on = None;
        }
    } else {
        balance.tuition_paid = (student.tuition_paid - payment.amount_gross).max(0.0);
        balance.tuition_owed =
            TuitionBalance::outstanding(balance.tuition_total, balance.tuition_paid);
    }
    balance
}

/// Corrects a payment record.
///
/// When the amount, method or card network change, fee, tax, net and per-lesson value are
/// recomputed from the merged values; otherwise the changes are a plain field merge. The
/// student's balance is never touched by an edit.
pub async fn edit_payment(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    payment_id: i64,
    changes: PaymentChanges,
) -> Result<payment::Model> {
    session.require(Capability::EditPayments)?;
    changes.validate()?;

    let payment = with_retry(config.retry, || {
        edit_payment_once(db, config, payment_id, &changes)
    })
    .await?;

    info!("Edited payment {payment_id}");
    Ok(payment)
}

async fn edit_payment_once(
    db: &DatabaseConnection,
    config: &LedgerConfig,
    payment_id: i64,
    changes: &PaymentChanges,
) -> Result<payment::Model> {
    let txn = db.begin().await?;

    let current = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: payment_id,
        })?;

    if let Some(count) = changes.lesson_count {
        if count < current.lessons_logged {
            return Err(Error::validation(format!(
                "Payment {payment_id} already has {} lessons logged, cannot shrink it to {count}",
                current.lessons_logged
            )));
        }
    }

    let amount_gross = changes.amount_gross.unwrap_or(current.amount_gross);
    let lesson_count = changes.lesson_count.or(current.lesson_count);

    let mut update = <payment::ActiveModel as Default>::default();
    if changes.touches_fees() {
        let method = changes.method.unwrap_or(current.method);
        let card_network = changes
            .card_network
            .clone()
            .or_else(|| current.card_network.clone());
        warn_if_unpriced(method, card_network.as_deref(), &config.fees);
        let breakdown = compute_fees(
            amount_gross,
            method,
            card_network.as_deref(),
            &config.fees,
            &config.tax,
        );

        update.amount_gross = Set(amount_gross);
        update.method = Set(method);
        update.card_network = Set(card_network);
        update.bank_fee = Set(breakdown.bank_fee);
        update.tax_amount = Set(breakdown.tax_amount);
        update.amount_net = Set(breakdown.net);
    }
    if changes.touches_fees() || changes.lesson_count.is_some() {
        update.lesson_count = Set(lesson_count);
        update.per_lesson_value = Set(per_lesson_value(amount_gross, lesson_count));
    }
    if let Some(date) = changes.date {
        update.date = Set(date);
    }
    if let Some(expires_on) = changes.expires_on {
        update.expires_on = Set(Some(expires_on));
    }
    if let Some(note) = &changes.note {
        update.note = Set(Some(note.clone()));
    }

    let result = Payment::update_many()
        .set(update)
        .col_expr(
            payment::Column::Version,
            Expr::col(payment::Column::Version).add(1),
        )
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::Version.eq(current.version))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "payment",
            id: payment_id,
        });
    }

    let updated = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: payment_id,
        })?;

    txn.commit().await?;
    Ok(updated)
}

/// Finds a payment by id.
pub async fn get_payment<C>(db: &C, payment_id: i64) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find_by_id(payment_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All payments of a student, newest first.
pub async fn payments_for_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<Vec<payment::Model>> {
    debug!("Loading payments for student {student_id}");
    Payment::find()
        .filter(payment::Column::StudentId.eq(student_id))
        .order_by_desc(payment::Column::Date)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
