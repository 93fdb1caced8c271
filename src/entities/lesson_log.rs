//! Lesson log entity - One lesson consumed from a package.
//!
//! `teacher_share` is copied at creation time and never recomputed. The teacher is a
//! lookup-only reference, so there is no relation (and no foreign key) to `teachers`.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lesson log database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lesson_logs")]
pub struct Model {
    /// Unique identifier for the lesson log
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Student who attended
    pub student_id: i64,
    /// Teacher who taught the lesson
    pub teacher_id: i64,
    /// Package the lesson was consumed from
    pub payment_id: i64,
    /// Class the lesson belongs to, if any
    pub class_id: Option<i64>,
    /// Location the lesson was logged at
    pub location_id: Option<String>,
    /// Date of the lesson
    pub date: Date,
    /// Teacher's share of the lesson value at the time it was logged
    pub teacher_share: f64,
    /// Opaque actor id of whoever logged the lesson
    pub recorded_by: String,
    /// When the log was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `LessonLog` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each lesson log is owned by one package; deleting the package removes its logs
    #[sea_orm(
        belongs_to = "super::payment::Entity",
        from = "Column::PaymentId",
        to = "super::payment::Column::Id",
        on_delete = "Cascade"
    )]
    Payment,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
