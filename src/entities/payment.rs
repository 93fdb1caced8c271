//! Payment entity - A single tuition payment, optionally a pre-paid lesson package.
//!
//! Each payment stores its gross amount together with the bank fee and tax derived from it
//! at entry time, so `amount_net == amount_gross - bank_fee - tax_amount` always holds.
//! Packages additionally carry `lesson_count` (capacity), `lessons_logged` (consumed) and
//! `per_lesson_value`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the money was received
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Cash at the front desk, no bank fee
    #[sea_orm(string_value = "cash")]
    Cash,
    /// QR bank transfer
    #[sea_orm(string_value = "qr")]
    Qr,
    /// Card through a POS terminal, rate depends on the card network
    #[sea_orm(string_value = "card")]
    Card,
}

/// What the payment buys
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentType {
    /// Pays for a monthly period and replaces the student's tuition figures
    #[sea_orm(string_value = "monthly-package")]
    MonthlyPackage,
    /// Pre-pays a fixed number of lessons
    #[sea_orm(string_value = "per-lesson-package")]
    PerLessonPackage,
    /// Pays down an outstanding balance
    #[sea_orm(string_value = "balance")]
    Balance,
}

impl PaymentType {
    /// Monthly packages overwrite the student's period figures; every other type
    /// accumulates into `tuition_paid`.
    #[must_use]
    pub const fn replaces_period(self) -> bool {
        matches!(self, Self::MonthlyPackage)
    }
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student who owns this payment
    pub student_id: i64,
    /// Location the payment was taken at
    pub location_id: Option<String>,
    /// Date the payment was made
    pub date: Date,
    /// Amount received before fees and tax
    pub amount_gross: f64,
    /// Bank or POS fee withheld
    pub bank_fee: f64,
    /// Company tax on the gross amount
    pub tax_amount: f64,
    /// `amount_gross - bank_fee - tax_amount`
    pub amount_net: f64,
    /// How the payment was received
    pub method: PaymentMethod,
    /// Card network for card payments (e.g. `"Elkart"`)
    pub card_network: Option<String>,
    /// What the payment buys
    pub payment_type: PaymentType,
    /// Package capacity; `None` for non-package or legacy payments
    pub lesson_count: Option<i32>,
    /// Lessons consumed from the package
    pub lessons_logged: i32,
    /// `amount_gross / lesson_count` when a capacity is set
    pub per_lesson_value: Option<f64>,
    /// End of the period a monthly payment covers
    pub expires_on: Option<Date>,
    /// Opaque actor id of whoever entered the payment
    pub recorded_by: String,
    /// Free-form note
    pub note: Option<String>,
    /// Optimistic concurrency counter
    pub version: i32,
    /// When the payment was entered
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Lessons still available on the package, zero when no capacity is set.
    #[must_use]
    pub fn lessons_remaining(&self) -> i32 {
        self.lesson_count
            .map_or(0, |count| (count - self.lessons_logged).max(0))
    }
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one student
    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
    /// One package has many lesson logs
    #[sea_orm(has_many = "super::lesson_log::Entity")]
    LessonLogs,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl Related<super::lesson_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LessonLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
