//! Teacher entity - Compensation settings for a teacher.
//!
//! There is no stored payroll balance; split teachers are paid from a period computed on
//! demand. Hourly teachers accrue `total_hours` until they are marked paid.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How a teacher is compensated
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
pub enum SalaryType {
    /// `hourly_rate * total_hours`
    #[sea_orm(string_value = "hourly")]
    Hourly,
    /// Share of the revenue of the teacher's students
    #[sea_orm(string_value = "split-50-50")]
    Split5050,
}

/// Teacher database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "teachers")]
pub struct Model {
    /// Unique identifier for the teacher
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Location the teacher works at
    pub location_id: Option<String>,
    /// Compensation scheme
    pub salary_type: SalaryType,
    /// Pay per hour (hourly teachers only)
    pub hourly_rate: f64,
    /// Hours accrued since the last payout (hourly teachers only)
    pub total_hours: f64,
    /// Whether the social fund deduction applies
    pub pays_social_fund: bool,
    /// When the teacher was last marked paid
    pub last_paid_at: Option<DateTimeUtc>,
    /// Optimistic concurrency counter
    pub version: i32,
    /// When the teacher was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Teacher and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One teacher runs many classes
    #[sea_orm(has_many = "super::class::Entity")]
    Classes,
}

impl Related<super::class::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Classes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
