//! Roster business logic - Teachers, classes and enrollments.
//!
//! The payroll engine needs to know which students a split teacher is responsible for;
//! that is whoever is enrolled in one of the teacher's classes. Hourly teachers also accrue
//! hours here and are reset by [`mark_paid`], the only stateful payroll action.

use crate::{
    config::rates::LedgerConfig,
    core::{
        retry::with_retry,
        session::{Capability, Session},
    },
    entities::{Class, Enrollment, SalaryType, Teacher, class, enrollment, teacher},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Creates a teacher.
///
/// `hourly_rate` is ignored (stored as zero) for split teachers.
pub async fn create_teacher(
    db: &DatabaseConnection,
    session: &Session,
    name: String,
    salary_type: SalaryType,
    hourly_rate: f64,
    pays_social_fund: bool,
) -> Result<teacher::Model> {
    session.require(Capability::ManageRoster)?;

    if name.trim().is_empty() {
        return Err(Error::validation("Teacher name cannot be empty"));
    }
    if !hourly_rate.is_finite() || hourly_rate < 0.0 {
        return Err(Error::validation(format!(
            "Hourly rate must be a non-negative amount, got {hourly_rate}"
        )));
    }

    let hourly_rate = match salary_type {
        SalaryType::Hourly => hourly_rate,
        SalaryType::Split5050 => 0.0,
    };

    let teacher = teacher::ActiveModel {
        name: Set(name.trim().to_string()),
        location_id: Set(session.location_id().map(ToString::to_string)),
        salary_type: Set(salary_type),
        hourly_rate: Set(hourly_rate),
        total_hours: Set(0.0),
        pays_social_fund: Set(pays_social_fund),
        last_paid_at: Set(None),
        version: Set(0),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    Ok(teacher.insert(db).await?)
}

/// Finds a teacher by id.
pub async fn get_teacher<C>(db: &C, teacher_id: i64) -> Result<Option<teacher::Model>>
where
    C: ConnectionTrait,
{
    Teacher::find_by_id(teacher_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists the teachers visible to the session, ordered by id.
pub async fn list_teachers(
    db: &DatabaseConnection,
    session: &Session,
) -> Result<Vec<teacher::Model>> {
    let mut query = Teacher::find().order_by_asc(teacher::Column::Id);
    if let Some(location) = session.location_id() {
        query = query.filter(teacher::Column::LocationId.eq(location));
    }
    query.all(db).await.map_err(Into::into)
}

/// Creates a class run by `teacher_id`.
pub async fn create_class(
    db: &DatabaseConnection,
    session: &Session,
    name: String,
    teacher_id: i64,
) -> Result<class::Model> {
    session.require(Capability::ManageRoster)?;

    if name.trim().is_empty() {
        return Err(Error::validation("Class name cannot be empty"));
    }
    get_teacher(db, teacher_id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher_id,
    })?;

    let class = class::ActiveModel {
        name: Set(name.trim().to_string()),
        teacher_id: Set(teacher_id),
        location_id: Set(session.location_id().map(ToString::to_string)),
        ..Default::default()
    };

    Ok(class.insert(db).await?)
}

/// Enrolls a student in a class. Enrolling twice returns the existing enrollment.
pub async fn enroll_student(
    db: &DatabaseConnection,
    session: &Session,
    class_id: i64,
    student_id: i64,
) -> Result<enrollment::Model> {
    session.require(Capability::ManageRoster)?;

    Class::find_by_id(class_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "class",
            id: class_id,
        })?;
    crate::core::student::get_student(db, student_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "student",
            id: student_id,
        })?;

    let existing = Enrollment::find()
        .filter(enrollment::Column::ClassId.eq(class_id))
        .filter(enrollment::Column::StudentId.eq(student_id))
        .one(db)
        .await?;
    if let Some(existing) = existing {
        debug!("Student {student_id} already enrolled in class {class_id}");
        return Ok(existing);
    }

    let enrollment = enrollment::ActiveModel {
        class_id: Set(class_id),
        student_id: Set(student_id),
        ..Default::default()
    };
    Ok(enrollment.insert(db).await?)
}

/// Ids of every student enrolled in one of the teacher's classes.
pub async fn assigned_student_ids<C>(db: &C, teacher_id: i64) -> Result<BTreeSet<i64>>
where
    C: ConnectionTrait,
{
    let class_ids: Vec<i64> = Class::find()
        .select_only()
        .column(class::Column::Id)
        .filter(class::Column::TeacherId.eq(teacher_id))
        .into_tuple()
        .all(db)
        .await?;

    if class_ids.is_empty() {
        return Ok(BTreeSet::new());
    }

    let student_ids: Vec<i64> = Enrollment::find()
        .select_only()
        .column(enrollment::Column::StudentId)
        .filter(enrollment::Column::ClassId.is_in(class_ids))
        .into_tuple()
        .all(db)
        .await?;

    Ok(student_ids.into_iter().collect())
}

/// Adds worked hours to an hourly teacher.
///
/// Uses a single `UPDATE teachers SET total_hours = total_hours + ?` so concurrent
/// additions are never lost.
pub async fn record_hours(
    db: &DatabaseConnection,
    session: &Session,
    teacher_id: i64,
    hours: f64,
) -> Result<teacher::Model> {
    session.require(Capability::ManagePayroll)?;

    if !hours.is_finite() || hours <= 0.0 {
        return Err(Error::validation(format!(
            "Hours must be a positive number, got {hours}"
        )));
    }

    let teacher = get_teacher(db, teacher_id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher_id,
    })?;
    if teacher.salary_type != SalaryType::Hourly {
        return Err(Error::validation(format!(
            "Teacher {teacher_id} is not paid by the hour"
        )));
    }

    Teacher::update_many()
        .col_expr(
            teacher::Column::TotalHours,
            Expr::col(teacher::Column::TotalHours).add(hours),
        )
        .col_expr(
            teacher::Column::Version,
            Expr::col(teacher::Column::Version).add(1),
        )
        .filter(teacher::Column::Id.eq(teacher_id))
        .exec(db)
        .await?;

    get_teacher(db, teacher_id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher_id,
    })
}

/// Marks a teacher's accrued hours as paid out.
///
/// Resets `total_hours` to zero and stamps `last_paid_at`. A teacher with nothing accrued
/// is returned untouched, so paying twice is a no-op. Hours recorded while the payout is
/// being written make the attempt conflict and rerun, so they are either paid now or kept.
pub async fn mark_paid(
    db: &DatabaseConnection,
    session: &Session,
    config: &LedgerConfig,
    teacher_id: i64,
) -> Result<teacher::Model> {
    session.require(Capability::ManagePayroll)?;

    with_retry(config.retry, || mark_paid_once(db, teacher_id)).await
}

async fn mark_paid_once(db: &DatabaseConnection, teacher_id: i64) -> Result<teacher::Model> {
    let txn = db.begin().await?;

    let teacher = get_teacher(&txn, teacher_id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher_id,
    })?;

    if teacher.total_hours <= 0.0 {
        debug!("Teacher {teacher_id} has no unpaid hours");
        txn.commit().await?;
        return Ok(teacher);
    }

    let paid = reset_hours(&txn, &teacher).await?;
    txn.commit().await?;

    info!(
        "Marked teacher {teacher_id} paid for {} hours",
        teacher.total_hours
    );
    Ok(paid)
}

/// Zeroes the hours of `teacher`, provided nobody changed the record since it was read.
async fn reset_hours<C>(db: &C, teacher: &teacher::Model) -> Result<teacher::Model>
where
    C: ConnectionTrait,
{
    let update = teacher::ActiveModel {
        total_hours: Set(0.0),
        last_paid_at: Set(Some(chrono::Utc::now())),
        version: Set(teacher.version + 1),
        ..Default::default()
    };
    let result = Teacher::update_many()
        .set(update)
        .filter(teacher::Column::Id.eq(teacher.id))
        .filter(teacher::Column::Version.eq(teacher.version))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::Conflict {
            entity: "teacher",
            id: teacher.id,
        });
    }

    get_teacher(db, teacher.id).await?.ok_or(Error::NotFound {
        entity: "teacher",
        id: teacher.id,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::session::Role;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_teacher_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let session = admin_session();

        let result = create_teacher(
            &db,
            &session,
            String::new(),
            SalaryType::Hourly,
            500.0,
            true,
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_teacher(
            &db,
            &session,
            "Dana".to_string(),
            SalaryType::Hourly,
            -5.0,
            true,
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_split_teacher_has_no_hourly_rate() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_teacher(
            &db,
            &admin_session(),
            "Dana".to_string(),
            SalaryType::Split5050,
            500.0,
            true,
        )
        .await?;
        assert_eq!(teacher.hourly_rate, 0.0);
        assert!(teacher.pays_social_fund);
        Ok(())
    }

    #[tokio::test]
    async fn test_assigned_students_come_from_classes() -> Result<()> {
        let db = setup_test_db().await?;
        let session = admin_session();
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Split5050).await?;
        let other = create_test_teacher(&db, "Erlan", SalaryType::Split5050).await?;
        let aida = create_test_student(&db, "Aida", 0.0).await?;
        let bek = create_test_student(&db, "Bek", 0.0).await?;
        let chyngyz = create_test_student(&db, "Chyngyz", 0.0).await?;

        let morning = create_class(&db, &session, "Morning".to_string(), teacher.id).await?;
        let evening = create_class(&db, &session, "Evening".to_string(), teacher.id).await?;
        let others = create_class(&db, &session, "Other".to_string(), other.id).await?;
        enroll_student(&db, &session, morning.id, aida.id).await?;
        enroll_student(&db, &session, evening.id, aida.id).await?;
        enroll_student(&db, &session, evening.id, bek.id).await?;
        enroll_student(&db, &session, others.id, chyngyz.id).await?;

        let assigned = assigned_student_ids(&db, teacher.id).await?;
        assert_eq!(assigned, BTreeSet::from([aida.id, bek.id]));
        assert!(assigned_student_ids(&db, 999).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_enroll_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let session = admin_session();
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Split5050).await?;
        let aida = create_test_student(&db, "Aida", 0.0).await?;
        let class = create_class(&db, &session, "Morning".to_string(), teacher.id).await?;

        let first = enroll_student(&db, &session, class.id, aida.id).await?;
        let second = enroll_student(&db, &session, class.id, aida.id).await?;
        assert_eq!(first, second);

        let missing = enroll_student(&db, &session, class.id, 999).await;
        assert!(matches!(
            missing,
            Err(Error::NotFound {
                entity: "student",
                id: 999
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_record_hours_and_mark_paid() -> Result<()> {
        let db = setup_test_db().await?;
        let session = admin_session();
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Hourly).await?;

        record_hours(&db, &session, teacher.id, 6.0).await?;
        let teacher = record_hours(&db, &session, teacher.id, 4.0).await?;
        assert_eq!(teacher.total_hours, 10.0);

        let paid = mark_paid(&db, &session, &test_config(), teacher.id).await?;
        assert_eq!(paid.total_hours, 0.0);
        assert!(paid.last_paid_at.is_some());

        let paid_again = mark_paid(&db, &session, &test_config(), teacher.id).await?;
        assert_eq!(paid_again, paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_hours_rejects_split_teacher() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Split5050).await?;

        let result = record_hours(&db, &admin_session(), teacher.id, 2.0).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = record_hours(&db, &admin_session(), teacher.id, 0.0).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_manager_cannot_mark_paid() -> Result<()> {
        let db = setup_test_db().await?;
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Hourly).await?;
        let manager = Session::new("desk", Role::Manager, None);

        let result = mark_paid(&db, &manager, &test_config(), teacher.id).await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_payout_is_a_conflict() -> Result<()> {
        let db = setup_test_db().await?;
        let session = admin_session();
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Hourly).await?;
        let stale = record_hours(&db, &session, teacher.id, 5.0).await?;

        // Hours recorded after the payout read its copy of the teacher.
        record_hours(&db, &session, teacher.id, 3.0).await?;
        let result = reset_hours(&db, &stale).await;
        assert!(matches!(
            result,
            Err(Error::Conflict {
                entity: "teacher",
                ..
            })
        ));
        let teacher = get_teacher(&db, teacher.id).await?.unwrap();
        assert_eq!(teacher.total_hours, 8.0);

        let paid = mark_paid(&db, &session, &test_config(), teacher.id).await?;
        assert_eq!(paid.total_hours, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_hours_recorded_during_payout_are_not_lost() -> Result<()> {
        let dir = tempfile::TempDir::new().unwrap();
        let db = setup_file_test_db(&dir, 4).await?;
        let session = admin_session();
        let mut config = test_config();
        config.retry.max_attempts = 20;
        let teacher = create_test_teacher(&db, "Dana", SalaryType::Hourly).await?;
        record_hours(&db, &session, teacher.id, 5.0).await?;

        let (recorded, paid) = tokio::join!(
            record_hours(&db, &session, teacher.id, 3.0),
            mark_paid(&db, &session, &config, teacher.id),
        );
        recorded?;
        paid?;

        // Either the payout saw all 8 hours, or the 3 new hours are still owed.
        let teacher = get_teacher(&db, teacher.id).await?.unwrap();
        assert!(
            teacher.total_hours == 0.0 || teacher.total_hours == 3.0,
            "unexpected hours {}",
            teacher.total_hours
        );
        assert!(teacher.last_paid_at.is_some());
        Ok(())
    }
}
