use sea_orm::{DbErr, RuntimeErr, sqlx};
use thiserror::Error;

use crate::core::session::Capability;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(
        "Lesson package {payment_id} is full ({lessons_logged} of {lesson_count:?} lessons logged)"
    )]
    CapacityExceeded {
        payment_id: i64,
        lesson_count: Option<i32>,
        lessons_logged: i32,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Concurrent update detected on {entity} {id}")]
    Conflict { entity: &'static str, id: i64 },

    #[error("Transaction still conflicting after {attempts} attempts")]
    ConflictRetryExhausted { attempts: u32 },

    #[error("Missing capability: {capability:?}")]
    PermissionDenied { capability: Capability },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether rerunning the whole operation may succeed.
    ///
    /// Covers optimistic-concurrency misses and SQLite reporting the file as busy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Database(e) => is_sqlite_busy(e),
            _ => false,
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Whether SQLite refused the statement because another connection holds a lock.
///
/// SQLite reports extended result codes (e.g. `SQLITE_BUSY_SNAPSHOT` = 517); the primary
/// code is the low byte.
fn is_sqlite_busy(err: &DbErr) -> bool {
    let (DbErr::Conn(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
    | DbErr::Exec(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))
    | DbErr::Query(RuntimeErr::SqlxError(sqlx::Error::Database(db_err)))) = err
    else {
        return false;
    };
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
