//! Payroll attribution engine.
//!
//! Read-only: computes what each teacher is owed for a closed date range from the payments
//! and lesson logs committed at read time. Nothing is stored.
//!
//! Split teachers earn from two sources:
//! 1. lessons they logged in the range, each worth `per_lesson_value * (1 - center_split)`
//!    of its package;
//! 2. monthly payments, dated in the range, of students enrolled in their classes, each
//!    worth `amount * (1 - center_split)`.
//!
//! Any student with a lesson logged in the range (by any teacher) is left out of the second
//! source, so package revenue is never counted twice. Hourly teachers earn
//! `hourly_rate * total_hours`. The social fund is deducted from teachers that pay into it.

use crate::{
    config::rates::LedgerConfig,
    core::{
        roster::{assigned_student_ids, get_teacher, list_teachers},
        session::{Capability, Session},
    },
    entities::{LessonLog, Payment, PaymentType, SalaryType, lesson_log, payment, teacher},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{EntityTrait, QueryOrder, QuerySelect, Select, prelude::*};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// A lesson that contributed to a teacher's pay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonAttribution {
    /// Lesson log id
    pub lesson_log_id: i64,
    /// Date of the lesson
    pub date: NaiveDate,
    /// Student who attended
    pub student_id: i64,
    /// Package the lesson was taken from
    pub payment_id: i64,
    /// Gross amount of the package
    pub package_amount: f64,
    /// Value of one lesson of the package
    pub per_lesson_value: f64,
    /// Teacher's share of the lesson
    pub share: f64,
}

/// A monthly payment split flat with the teacher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatSplitAttribution {
    /// Payment id
    pub payment_id: i64,
    /// Payment date
    pub date: NaiveDate,
    /// Paying student
    pub student_id: i64,
    /// Gross amount of the payment
    pub amount: f64,
    /// Teacher's share of the payment
    pub share: f64,
}

/// What a teacher earned over a pay period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayPeriodResult {
    /// Teacher id
    pub teacher_id: i64,
    /// Teacher name
    pub teacher_name: String,
    /// Compensation scheme the result was computed with
    pub salary_type: SalaryType,
    /// First day of the period
    pub period_start: NaiveDate,
    /// Last day of the period, inclusive
    pub period_end: NaiveDate,
    /// Revenue the teacher generated
    pub revenue: f64,
    /// Teacher's share before deductions
    pub teacher_share: f64,
    /// Social fund deducted from the share
    pub social_fund_deduction: f64,
    /// Amount to pay out
    pub payroll_due: f64,
    /// Lessons attributed to the teacher
    pub lessons: Vec<LessonAttribution>,
    /// Monthly payments split with the teacher
    pub flat_splits: Vec<FlatSplitAttribution>,
}

/// Computes payroll for one teacher over `[start, end]`.
pub async fn compute_payroll(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    teacher_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PayPeriodResult> {
    session.require(Capability::ViewPayroll)?;
    validate_period(start, end)?;

    let teacher = get_teacher(db, teacher_id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher_id,
    })?;

    let result = payroll_for_teacher(db, session, config, &teacher, start, end).await?;
    info!(
        "Payroll for teacher {} over {start}..={end}: revenue {}, due {}",
        teacher.id, result.revenue, result.payroll_due
    );
    Ok(result)
}

/// Computes payroll for every teacher visible to the session, ordered by teacher id.
pub async fn compute_all_payroll(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PayPeriodResult>> {
    session.require(Capability::ViewPayroll)?;
    validate_period(start, end)?;

    let mut results = Vec::new();
    for teacher in list_teachers(db, session).await? {
        results.push(payroll_for_teacher(db, session, config, &teacher, start, end).await?);
    }
    Ok(results)
}

fn validate_period(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::validation(format!(
            "Pay period starts {start} after it ends {end}"
        )));
    }
    Ok(())
}

/// Restricts a query to the session's location, if it has one.
fn within_location<E, C>(query: Select<E>, column: C, session: &Session) -> Select<E>
where
    E: EntityTrait,
    C: ColumnTrait,
{
    match session.location_id() {
        Some(location) => query.filter(column.eq(location)),
        None => query,
    }
}

async fn payroll_for_teacher(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    teacher: &teacher::Model,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PayPeriodResult> {
    let mut result = PayPeriodResult {
        teacher_id: teacher.id,
        teacher_name: teacher.name.clone(),
        salary_type: teacher.salary_type,
        period_start: start,
        period_end: end,
        revenue: 0.0,
        teacher_share: 0.0,
        social_fund_deduction: 0.0,
        payroll_due: 0.0,
        lessons: Vec::new(),
        flat_splits: Vec::new(),
    };

    match teacher.salary_type {
        SalaryType::Hourly => {
            result.revenue = teacher.hourly_rate * teacher.total_hours;
            result.teacher_share = result.revenue;
        }
        SalaryType::Split5050 => {
            let teacher_rate = 1.0 - config.teacher_fees.center_split;
            attribute_lessons(db, session, teacher.id, teacher_rate, start, end, &mut result)
                .await?;
            attribute_flat_splits(db, session, teacher.id, teacher_rate, start, end, &mut result)
                .await?;
        }
    }

    if teacher.pays_social_fund {
        result.social_fund_deduction = config.teacher_fees.social_fund;
    }
    result.payroll_due = result.teacher_share - result.social_fund_deduction;
    Ok(result)
}

async fn attribute_lessons(
    db: &DatabaseConnection,
    session: &Session,
    teacher_id: i64,
    teacher_rate: f64,
    start: NaiveDate,
    end: NaiveDate,
    result: &mut PayPeriodResult,
) -> Result<()> {
    let logs = within_location(
        LessonLog::find()
            .filter(lesson_log::Column::TeacherId.eq(teacher_id))
            .filter(lesson_log::Column::Date.gte(start))
            .filter(lesson_log::Column::Date.lte(end))
            .order_by_asc(lesson_log::Column::Date)
            .order_by_asc(lesson_log::Column::Id),
        lesson_log::Column::LocationId,
        session,
    )
    .all(db)
    .await?;

    if logs.is_empty() {
        return Ok(());
    }

    let payment_ids: BTreeSet<i64> = logs.iter().map(|log| log.payment_id).collect();
    let packages: HashMap<i64, payment::Model> = Payment::find()
        .filter(payment::Column::Id.is_in(payment_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|package| (package.id, package))
        .collect();

    for log in logs {
        let Some(package) = packages.get(&log.payment_id) else {
            debug!("Lesson {} has no package, not attributed", log.id);
            continue;
        };
        let Some(lesson_count) = package.lesson_count.filter(|count| *count > 0) else {
            debug!("Package {} has no capacity, lesson {} not attributed", package.id, log.id);
            continue;
        };

        let per_lesson_value = package
            .per_lesson_value
            .unwrap_or_else(|| package.amount_gross / f64::from(lesson_count));
        let share = per_lesson_value * teacher_rate;

        result.revenue += per_lesson_value;
        result.teacher_share += share;
        result.lessons.push(LessonAttribution {
            lesson_log_id: log.id,
            date: log.date,
            student_id: log.student_id,
            payment_id: package.id,
            package_amount: package.amount_gross,
            per_lesson_value,
            share,
        });
    }
    Ok(())
}

async fn attribute_flat_splits(
    db: &DatabaseConnection,
    session: &Session,
    teacher_id: i64,
    teacher_rate: f64,
    start: NaiveDate,
    end: NaiveDate,
    result: &mut PayPeriodResult,
) -> Result<()> {
    let touched: Vec<i64> = within_location(
        LessonLog::find()
            .select_only()
            .column(lesson_log::Column::StudentId)
            .distinct()
            .filter(lesson_log::Column::Date.gte(start))
            .filter(lesson_log::Column::Date.lte(end)),
        lesson_log::Column::LocationId,
        session,
    )
    .into_tuple()
    .all(db)
    .await?;

    let mut students = assigned_student_ids(db, teacher_id).await?;
    for student_id in &touched {
        students.remove(student_id);
    }
    if students.is_empty() {
        return Ok(());
    }

    let payments = within_location(
        Payment::find()
            .filter(payment::Column::StudentId.is_in(students))
            .filter(payment::Column::PaymentType.eq(PaymentType::MonthlyPackage))
            .filter(payment::Column::Date.gte(start))
            .filter(payment::Column::Date.lte(end))
            .order_by_asc(payment::Column::Date)
            .order_by_asc(payment::Column::Id),
        payment::Column::LocationId,
        session,
    )
    .all(db)
    .await?;

    for payment in payments {
        let share = payment.amount_gross * teacher_rate;
        result.revenue += payment.amount_gross;
        result.teacher_share += share;
        result.flat_splits.push(FlatSplitAttribution {
            payment_id: payment.id,
            date: payment.date,
            student_id: payment.student_id,
            amount: payment.amount_gross,
            share,
        });
    }
    Ok(())
}
