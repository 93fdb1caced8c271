//! Shared test utilities for the tuition ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test records with sensible defaults.

#![allow(clippy::unwrap_used)]

use crate::{
    config::rates::{FeeTable, LedgerConfig, TaxConfig, TeacherFeeConfig},
    core::{
        ledger::{PaymentInput, apply_payment},
        lessons::{LessonInput, consume_lesson},
        retry::RetryPolicy,
        roster::create_teacher,
        session::{Role, Session},
        student::{create_student, get_student},
    },
    entities::{self, BillingModel, PaymentMethod, PaymentType, SalaryType},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::collections::HashMap;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
///
/// The pool holds a single connection: every new in-memory connection is a fresh,
/// empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a file-backed `SQLite` database inside `dir` with a pool of `connections`.
/// Use this when operations must really run concurrently on separate connections.
///
/// `dir` must outlive the returned connection.
pub async fn setup_file_test_db(
    dir: &tempfile::TempDir,
    connections: u32,
) -> Result<DatabaseConnection> {
    let path = dir.path().join("tuition_ledger.sqlite");
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options.max_connections(connections).sqlx_logging(false);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// An unscoped admin session acting as `"admin"`.
pub fn admin_session() -> Session {
    Session::new("admin", Role::Admin, None)
}

/// Config with round numbers:
/// * QR fee 2%, Elkart POS fee 3%, Visa 2.5%
/// * company tax 10%
/// * center split 50%, social fund 5000
pub fn test_config() -> LedgerConfig {
    LedgerConfig {
        fees: FeeTable {
            qr_base_rate: 0.02,
            pos_rates: HashMap::from([
                ("Elkart".to_string(), 0.03),
                ("Visa".to_string(), 0.025),
            ]),
        },
        tax: TaxConfig {
            company_tax_rate: 0.1,
        },
        teacher_fees: TeacherFeeConfig {
            center_split: 0.5,
            social_fund: 5000.0,
        },
        retry: RetryPolicy::default(),
    }
}

/// Shorthand for a calendar date; panics on an invalid one.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Last day of the month containing `day`.
pub fn month_end(day: NaiveDate) -> NaiveDate {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    date(year, month, 1).pred_opt().unwrap()
}

/// Creates a test student owing `tuition_total`.
///
/// Students with no tuition total pay per lesson, the others monthly.
pub async fn create_test_student(
    db: &DatabaseConnection,
    name: &str,
    tuition_total: f64,
) -> Result<entities::student::Model> {
    let billing = if tuition_total > 0.0 {
        BillingModel::Monthly
    } else {
        BillingModel::PerLesson
    };
    create_student(db, &admin_session(), name.to_string(), billing, tuition_total).await
}

/// Creates a test teacher with sensible defaults.
///
/// # Defaults
/// * `hourly_rate`: 500.0 (ignored for split teachers)
/// * `pays_social_fund`: true
pub async fn create_test_teacher(
    db: &DatabaseConnection,
    name: &str,
    salary_type: SalaryType,
) -> Result<entities::teacher::Model> {
    create_custom_teacher(db, name, salary_type, 500.0, true).await
}

/// Creates a test teacher with custom parameters.
pub async fn create_custom_teacher(
    db: &DatabaseConnection,
    name: &str,
    salary_type: SalaryType,
    hourly_rate: f64,
    pays_social_fund: bool,
) -> Result<entities::teacher::Model> {
    create_teacher(
        db,
        &admin_session(),
        name.to_string(),
        salary_type,
        hourly_rate,
        pays_social_fund,
    )
    .await
}

/// Input for a monthly package covering the month of `day`.
pub fn monthly_payment(
    student_id: i64,
    day: NaiveDate,
    amount: f64,
    tuition_total: f64,
) -> PaymentInput {
    PaymentInput {
        student_id,
        date: day,
        amount_gross: amount,
        method: PaymentMethod::Cash,
        card_network: None,
        payment_type: PaymentType::MonthlyPackage,
        lesson_count: None,
        tuition_total: Some(tuition_total),
        expires_on: Some(month_end(day)),
        note: None,
    }
}

/// Records a monthly payment that pays the month in full.
pub async fn create_monthly_payment(
    db: &DatabaseConnection,
    student_id: i64,
    day: NaiveDate,
    amount: f64,
) -> Result<entities::payment::Model> {
    apply_payment(
        db,
        &admin_session(),
        &test_config(),
        monthly_payment(student_id, day, amount, amount),
    )
    .await
}

/// Records a cash per-lesson package of `lesson_count` lessons, paid on 2024-03-01.
pub async fn create_test_package(
    db: &DatabaseConnection,
    student_id: i64,
    amount: f64,
    lesson_count: i32,
) -> Result<entities::payment::Model> {
    let input = PaymentInput {
        student_id,
        date: date(2024, 3, 1),
        amount_gross: amount,
        method: PaymentMethod::Cash,
        card_network: None,
        payment_type: PaymentType::PerLessonPackage,
        lesson_count: Some(lesson_count),
        tuition_total: None,
        expires_on: None,
        note: None,
    };
    apply_payment(db, &admin_session(), &test_config(), input).await
}

/// Logs one lesson of `package`, taught by `teacher_id` on `day`.
pub async fn log_test_lesson(
    db: &DatabaseConnection,
    package: &entities::payment::Model,
    teacher_id: i64,
    day: NaiveDate,
) -> Result<entities::lesson_log::Model> {
    let input = LessonInput {
        payment_id: package.id,
        teacher_id,
        student_id: package.student_id,
        class_id: None,
        date: day,
    };
    consume_lesson(db, &admin_session(), &test_config(), input).await
}

/// Reads a student back, failing if it no longer exists.
pub async fn reload_student(
    db: &DatabaseConnection,
    student_id: i64,
) -> Result<entities::student::Model> {
    get_student(db, student_id).await?.ok_or(Error::NotFound {
        entity: "student",
        id: student_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(month_end(date(2023, 12, 1)), date(2023, 12, 31));
        assert_eq!(month_end(date(2024, 4, 30)), date(2024, 4, 30));
    }
}
