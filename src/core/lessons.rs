//! Lesson consumption tracker - Consumes and releases lessons of a pre-paid package.
//!
//! `0 <= lessons_logged <= lesson_count` holds for every package. Consuming reads the
//! package, checks there is a lesson left, and increments `lessons_logged` only if the
//! package version is still the one that was read. Two concurrent consumers of the last
//! lesson therefore cannot both succeed: the loser retries, sees a full package and fails
//! with [`Error::CapacityExceeded`].

use crate::{
    config::rates::LedgerConfig,
    core::{
        retry::with_retry,
        session::{Capability, Session},
    },
    entities::{LessonLog, Payment, Teacher, lesson_log, payment},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, warn};

/// A lesson to record against a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonInput {
    /// Package the lesson is taken from
    pub payment_id: i64,
    /// Teacher who taught it
    pub teacher_id: i64,
    /// Student who attended, must own the package
    pub student_id: i64,
    /// Class the lesson belongs to, if any
    pub class_id: Option<i64>,
    /// Date of the lesson
    pub date: NaiveDate,
}

/// Consumes one lesson from a package and records who taught it.
///
/// The lesson log stores the teacher's share at today's split rate:
/// `per_lesson_value * (1 - center_split)`.
///
/// # Errors
/// - [`Error::NotFound`] if the package or teacher does not exist
/// - [`Error::Validation`] if the package belongs to another student
/// - [`Error::CapacityExceeded`] if the package is full or has no capacity set
pub async fn consume_lesson(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    input: LessonInput,
) -> Result<lesson_log::Model> {
    session.require(Capability::LogLessons)?;

    let log = with_retry(config.retry, || {
        consume_lesson_once(db, session, config, &input)
    })
    .await?;

    info!(
        "Logged lesson {} from package {} for teacher {} (share {})",
        log.id, log.payment_id, log.teacher_id, log.teacher_share
    );
    Ok(log)
}

async fn consume_lesson_once(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    input: &LessonInput,
) -> Result<lesson_log::Model> {
    let txn = db.begin().await?;

    let package = Payment::find_by_id(input.payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: input.payment_id,
        })?;
    Teacher::find_by_id(input.teacher_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "teacher",
            id: input.teacher_id,
        })?;

    if package.student_id != input.student_id {
        return Err(Error::validation(format!(
            "Payment {} belongs to student {}, not {}",
            package.id, package.student_id, input.student_id
        )));
    }

    let Some(lesson_count) = package
        .lesson_count
        .filter(|count| package.lessons_logged < *count)
    else {
        return Err(Error::CapacityExceeded {
            payment_id: package.id,
            lesson_count: package.lesson_count,
            lessons_logged: package.lessons_logged,
        });
    };

    let per_lesson_value = package
        .per_lesson_value
        .unwrap_or_else(|| package.amount_gross / f64::from(lesson_count));
    let teacher_share = per_lesson_value * (1.0 - config.teacher_fees.center_split);

    write_lessons_logged(&txn, &package, package.lessons_logged + 1).await?;

    let log = lesson_log::ActiveModel {
        student_id: Set(input.student_id),
        teacher_id: Set(input.teacher_id),
        payment_id: Set(package.id),
        class_id: Set(input.class_id),
        location_id: Set(session.location_id().map(ToString::to_string)),
        date: Set(input.date),
        teacher_share: Set(teacher_share),
        recorded_by: Set(session.actor_id().to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    Ok(log)
}

/// Deletes a lesson log and returns its lesson to the package.
///
/// `lessons_logged` never drops below zero. If the package is gone the log is still
/// deleted; the returned package is `None` in that case.
pub async fn release_lesson(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    lesson_log_id: i64,
) -> Result<Option<payment::Model>> {
    session.require(Capability::LogLessons)?;

    let package = with_retry(config.retry, || release_lesson_once(db, lesson_log_id)).await?;

    info!("Released lesson {lesson_log_id}");
    Ok(package)
}

async fn release_lesson_once(
    db: &DatabaseConnection,
    lesson_log_id: i64,
) -> Result<Option<payment::Model>> {
    let txn = db.begin().await?;

    let log = LessonLog::find_by_id(lesson_log_id)
        .one(&txn)
        .await?
        .ok_or(Error::NotFound {
            entity: "lesson log",
            id: lesson_log_id,
        })?;

    let package = Payment::find_by_id(log.payment_id).one(&txn).await?;
    let package = match package {
        Some(package) => {
            let logged = (package.lessons_logged - 1).max(0);
            Some(write_lessons_logged(&txn, &package, logged).await?)
        }
        None => {
            warn!(
                "Package {} of lesson {lesson_log_id} is missing, lesson count not restored",
                log.payment_id
            );
            None
        }
    };

    let deleted = LessonLog::delete_by_id(lesson_log_id).exec(&txn).await?;
    if deleted.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "lesson log",
            id: lesson_log_id,
        });
    }

    txn.commit().await?;
    Ok(package)
}

async fn write_lessons_logged<C>(
    db: &C,
    package: &payment::Model,
    lessons_logged: i32,
) -> Result<payment::Model>
where
    C: ConnectionTrait,
{
    let result = Payment::update_many()
        .col_expr(payment::Column::LessonsLogged, Expr::value(lessons_logged))
        .col_expr(
            payment::Column::Version,
            Expr::col(payment::Column::Version).add(1),
        )
        .filter(payment::Column::Id.eq(package.id))
        .filter(payment::Column::Version.eq(package.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "payment",
            id: package.id,
        });
    }

    Payment::find_by_id(package.id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: package.id,
        })
}

/// Sets the capacity of legacy packages in bulk.
///
/// This is a plain batch of per-record updates, not one transaction: every package is
/// updated on its own and a failure part way leaves the earlier ones updated. Packages
/// that already logged more lessons than `lesson_count`, or that are missing, are skipped.
/// Returns how many packages were updated.
pub async fn set_package_capacity(
    db: &DatabaseConnection,
    session: &Session,
    payment_ids: &[i64],
    lesson_count: i32,
) -> Result<u64> {
    session.require(Capability::EditPayments)?;

    if lesson_count <= 0 {
        return Err(Error::validation(format!(
            "Lesson count must be positive, got {lesson_count}"
        )));
    }

    let mut updated = 0;
    for &payment_id in payment_ids {
        let Some(package) = Payment::find_by_id(payment_id).one(db).await? else {
            warn!("Skipping capacity update for missing payment {payment_id}");
            continue;
        };
        if package.lessons_logged > lesson_count {
            warn!(
                "Skipping capacity update for payment {payment_id}: {} lessons already logged",
                package.lessons_logged
            );
            continue;
        }

        let result = Payment::update_many()
            .col_expr(payment::Column::LessonCount, Expr::value(lesson_count))
            .col_expr(
                payment::Column::PerLessonValue,
                Expr::value(package.amount_gross / f64::from(lesson_count)),
            )
            .col_expr(
                payment::Column::Version,
                Expr::col(payment::Column::Version).add(1),
            )
            .filter(payment::Column::Id.eq(payment_id))
            .filter(payment::Column::Version.eq(package.version))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            warn!("Payment {payment_id} changed during capacity update, skipped");
            continue;
        }
        updated += 1;
    }

    info!("Set capacity {lesson_count} on {updated} packages");
    Ok(updated)
}

/// Lesson logs of a package, oldest first.
pub async fn lesson_logs_for_payment(
    db: &DatabaseConnection,
    payment_id: i64,
) -> Result<Vec<lesson_log::Model>> {
    LessonLog::find()
        .filter(lesson_log::Column::PaymentId.eq(payment_id))
        .order_by_asc(lesson_log::Column::Date)
        .order_by_asc(lesson_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
