use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Feedback;
use crate::db::types::{FeedbackStatus, GradingLanguage};

pub(crate) const COLUMNS: &str = "\
    id, exercise_id, sub_id, auto_grade, penalty, grader_id, staff_grade, feedback, \
    status, released, language, created_at, updated_at";

pub(crate) async fn list_for_exercise(
    pool: &PgPool,
    exercise_id: &str,
) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>(&format!(
        "SELECT {COLUMNS} FROM feedbacks WHERE exercise_id = $1 ORDER BY created_at, id"
    ))
    .bind(exercise_id)
    .fetch_all(pool)
    .await
}

/// (feedback_id, student_id, platform_user_id) for every attachment of the
/// exercise's feedback records.
pub(crate) async fn attachments_for_exercise(
    pool: &PgPool,
    exercise_id: &str,
) -> Result<Vec<(String, String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String, i64)>(
        "SELECT fs.feedback_id, s.id, s.platform_user_id
         FROM feedback_students fs
         JOIN feedbacks f ON f.id = fs.feedback_id
         JOIN students s ON s.id = fs.student_id
         WHERE f.exercise_id = $1
         ORDER BY fs.feedback_id, s.id",
    )
    .bind(exercise_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateFeedback<'a> {
    pub(crate) id: &'a str,
    pub(crate) exercise_id: &'a str,
    pub(crate) sub_id: i64,
    pub(crate) auto_grade: i32,
    pub(crate) penalty: f64,
    pub(crate) feedback: &'a str,
    pub(crate) language: GradingLanguage,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateFeedback<'_>,
    now: PrimitiveDateTime,
) -> Result<Feedback, sqlx::Error> {
    sqlx::query_as::<_, Feedback>(&format!(
        "INSERT INTO feedbacks
             (id, exercise_id, sub_id, auto_grade, penalty, feedback, status, language,
              created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exercise_id)
    .bind(params.sub_id)
    .bind(params.auto_grade)
    .bind(params.penalty)
    .bind(params.feedback)
    .bind(FeedbackStatus::Template)
    .bind(params.language)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn attach_student(
    pool: &PgPool,
    feedback_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO feedback_students (feedback_id, student_id)
         VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(feedback_id)
    .bind(student_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn detach_student(
    pool: &PgPool,
    feedback_id: &str,
    student_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM feedback_students WHERE feedback_id = $1 AND student_id = $2")
        .bind(feedback_id)
        .bind(student_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Superseded records are removed only while grading has not started.
pub(crate) async fn delete_if_template(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM feedbacks WHERE id = $1 AND status = $2")
        .bind(id)
        .bind(FeedbackStatus::Template)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn update_auto_grade(
    pool: &PgPool,
    id: &str,
    auto_grade: i32,
    penalty: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE feedbacks SET auto_grade = $1, penalty = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(auto_grade)
    .bind(penalty)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Template text never overwrites a record a grader has touched.
pub(crate) async fn set_template_text(
    pool: &PgPool,
    id: &str,
    text: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE feedbacks SET feedback = $1, updated_at = $2 WHERE id = $3 AND status = $4",
    )
    .bind(text)
    .bind(now)
    .bind(id)
    .bind(FeedbackStatus::Template)
    .execute(pool)
    .await?;
    Ok(())
}

/// Only ever fills an empty grader slot; assigned records are left alone.
pub(crate) async fn assign_grader(
    pool: &PgPool,
    id: &str,
    grader_id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE feedbacks SET grader_id = $1, updated_at = $2
         WHERE id = $3 AND grader_id IS NULL",
    )
    .bind(grader_id)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_ready_unreleased(
    pool: &PgPool,
    exercise_id: &str,
    grader_id: &str,
) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>(&format!(
        "SELECT {COLUMNS} FROM feedbacks
         WHERE exercise_id = $1 AND grader_id = $2 AND status = $3 AND released = FALSE
         ORDER BY created_at, id"
    ))
    .bind(exercise_id)
    .bind(grader_id)
    .bind(FeedbackStatus::Ready)
    .fetch_all(pool)
    .await
}

pub(crate) async fn student_emails(
    pool: &PgPool,
    feedback_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT s.email FROM students s
         JOIN feedback_students fs ON fs.student_id = s.id
         WHERE fs.feedback_id = $1
         ORDER BY s.email",
    )
    .bind(feedback_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn mark_released(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE feedbacks SET released = TRUE, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn unrelease(
    pool: &PgPool,
    ids: &[String],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result =
        sqlx::query("UPDATE feedbacks SET released = FALSE, updated_at = $1 WHERE id = ANY($2)")
            .bind(now)
            .bind(ids)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Administrative shortcut for all-or-nothing exercises: grade every untouched
/// record of the grader with a fixed score in one statement.
pub(crate) async fn batch_assess(
    pool: &PgPool,
    exercise_id: &str,
    grader_id: &str,
    staff_grade: i32,
    feedback_text: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE feedbacks
         SET staff_grade = $1, feedback = $2, status = $3, updated_at = $4
         WHERE exercise_id = $5 AND grader_id = $6 AND status = $7 AND released = FALSE",
    )
    .bind(staff_grade)
    .bind(feedback_text)
    .bind(FeedbackStatus::Ready)
    .bind(now)
    .bind(exercise_id)
    .bind(grader_id)
    .bind(FeedbackStatus::Template)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
