//! Student entity - Holds the tuition balance a student owes the school.
//!
//! `tuition_owed` is derived from `tuition_total - tuition_paid` (clamped at zero) and is
//! only ever written by the payment ledger. `version` backs optimistic concurrency.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a student is billed
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
pub enum BillingModel {
    /// Pays a fixed amount for a period, tracked by `payment_expires_on`
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// Buys lesson packages consumed one lesson at a time
    #[sea_orm(string_value = "per-lesson")]
    PerLesson,
}

/// Student database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "students")]
pub struct Model {
    /// Unique identifier for the student
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Location (branch) the student belongs to, if the school has several
    pub location_id: Option<String>,
    /// Billing model
    pub payment_model: BillingModel,
    /// Total tuition agreed for the current period
    pub tuition_total: f64,
    /// Amount paid towards `tuition_total`
    pub tuition_paid: f64,
    /// Outstanding amount, never negative
    pub tuition_owed: f64,
    /// Date of the most recent payment
    pub last_payment_date: Option<Date>,
    /// End of the paid monthly period
    pub payment_expires_on: Option<Date>,
    /// Optimistic concurrency counter, bumped on every balance write
    pub version: i32,
    /// When the student was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Student and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One student has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
    /// One student has many class enrollments
    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollments,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
