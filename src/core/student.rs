//! Student business logic - Creation, lookup and the versioned balance write.
//!
//! Balance fields are only ever written through [`write_balance`], which the payment ledger
//! calls inside its transactions. The write is conditional on the version that was read,
//! so a concurrent balance change turns into [`Error::Conflict`] instead of a lost update.

use crate::{
    core::session::{Capability, Session},
    entities::{BillingModel, Student, student},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};

/// The balance-related fields of a student, as written by the ledger
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuitionBalance {
    /// Total tuition for the period
    pub tuition_total: f64,
    /// Paid so far
    pub tuition_paid: f64,
    /// Still owed, never negative
    pub tuition_owed: f64,
    /// Most recent payment date
    pub last_payment_date: Option<Date>,
    /// End of the paid monthly period
    pub payment_expires_on: Option<Date>,
}

impl TuitionBalance {
    /// Current balance of a student record
    #[must_use]
    pub const fn of(student: &student::Model) -> Self {
        Self {
            tuition_total: student.tuition_total,
            tuition_paid: student.tuition_paid,
            tuition_owed: student.tuition_owed,
            last_payment_date: student.last_payment_date,
            payment_expires_on: student.payment_expires_on,
        }
    }

    /// `max(0, total - paid)`
    #[must_use]
    pub fn outstanding(tuition_total: f64, tuition_paid: f64) -> f64 {
        (tuition_total - tuition_paid).max(0.0)
    }
}

/// Creates a student owing their full tuition.
pub async fn create_student(
    db: &DatabaseConnection,
    session: &Session,
    name: String,
    payment_model: BillingModel,
    tuition_total: f64,
) -> Result<student::Model> {
    session.require(Capability::ManageRoster)?;

    if name.trim().is_empty() {
        return Err(Error::validation("Student name cannot be empty"));
    }
    if !tuition_total.is_finite() || tuition_total < 0.0 {
        return Err(Error::validation(format!(
            "Tuition total must be a non-negative amount, got {tuition_total}"
        )));
    }

    let student = student::ActiveModel {
        name: Set(name.trim().to_string()),
        location_id: Set(session.location_id().map(ToString::to_string)),
        payment_model: Set(payment_model),
        tuition_total: Set(tuition_total),
        tuition_paid: Set(0.0),
        tuition_owed: Set(tuition_total),
        last_payment_date: Set(None),
        payment_expires_on: Set(None),
        version: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    Ok(student.insert(db).await?)
}

/// Finds a student by id.
pub async fn get_student<C>(db: &C, student_id: i64) -> Result<Option<student::Model>>
where
    C: ConnectionTrait,
{
    Student::find_by_id(student_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists the students visible to the session, ordered by name.
pub async fn list_students(
    db: &DatabaseConnection,
    session: &Session,
) -> Result<Vec<student::Model>> {
    let mut query = Student::find().order_by_asc(student::Column::Name);
    if let Some(location) = session.location_id() {
        query = query.filter(student::Column::LocationId.eq(location));
    }
    query.all(db).await.map_err(Into::into)
}

/// Writes a new balance for `student`, provided nobody changed the record since it was read.
///
/// Returns the updated record.
pub(crate) async fn write_balance<C>(
    db: &C,
    student: &student::Model,
    balance: TuitionBalance,
) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    let update = student::ActiveModel {
        tuition_total: Set(balance.tuition_total),
        tuition_paid: Set(balance.tuition_paid),
        tuition_owed: Set(balance.tuition_owed),
        last_payment_date: Set(balance.last_payment_date),
        payment_expires_on: Set(balance.payment_expires_on),
        ..Default::default()
    };

    let result = Student::update_many()
        .set(update)
        .col_expr(
            student::Column::Version,
            Expr::col(student::Column::Version).add(1),
        )
        .filter(student::Column::Id.eq(student.id))
        .filter(student::Column::Version.eq(student.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "student",
            id: student.id,
        });
    }

    get_student(db, student.id)
        .await?
        .ok_or(Error::NotFound {
            entity: "student",
            id: student.id,
        })
}
