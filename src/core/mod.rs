//! Core business logic - framework-agnostic ledger, lesson tracking and payroll operations.

/// Bank fee and tax calculation
pub mod fees;
/// Payment ledger - applies, reverses and edits payments against student balances
pub mod ledger;
/// Lesson consumption tracker - consumes and releases package lessons
pub mod lessons;
/// Payroll attribution engine
pub mod payroll;
/// Optimistic concurrency retry helper
pub mod retry;
/// Teachers, classes and enrollments
pub mod roster;
/// Caller identity, location and capabilities
pub mod session;
/// Student creation and lookup
pub mod student;
