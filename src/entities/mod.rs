//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the persisted records of the ledger and the roster
//! tables the payroll engine reads. Each entity has a Model struct for data and an
//! Entity struct for operations.

pub mod class;
pub mod enrollment;
pub mod lesson_log;
pub mod payment;
pub mod student;
pub mod teacher;

// Re-export specific types to avoid conflicts
pub use class::{Column as ClassColumn, Entity as Class, Model as ClassModel};
pub use enrollment::{Column as EnrollmentColumn, Entity as Enrollment, Model as EnrollmentModel};
pub use lesson_log::{Column as LessonLogColumn, Entity as LessonLog, Model as LessonLogModel};
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentMethod, PaymentType,
};
pub use student::{Column as StudentColumn, Entity as Student, Model as StudentModel, BillingModel};
pub use teacher::{Column as TeacherColumn, Entity as Teacher, Model as TeacherModel, SalaryType};
