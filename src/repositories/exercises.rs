use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Exercise;

pub(crate) const COLUMNS: &str = "\
    id, course_id, exercise_id, name, module_url, api_url, min_points, max_points, \
    total_max_points, add_penalty, add_auto_grade, work_division, num_of_graders, \
    feedback_base_primary, feedback_base_secondary, in_grading, grading_ready, \
    error_state, latest_release, created_at, updated_at";

/// Exercises the periodic submission refresh should visit.
pub(crate) async fn list_in_grading(pool: &PgPool) -> Result<Vec<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {COLUMNS} FROM exercises
         WHERE in_grading = TRUE AND grading_ready = FALSE AND error_state IS NULL
         ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    course_id: &str,
) -> Result<Vec<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {COLUMNS} FROM exercises WHERE course_id = $1 ORDER BY created_at"
    ))
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_external_id(
    pool: &PgPool,
    exercise_id: i64,
) -> Result<Option<Exercise>, sqlx::Error> {
    sqlx::query_as::<_, Exercise>(&format!(
        "SELECT {COLUMNS} FROM exercises WHERE exercise_id = $1"
    ))
    .bind(exercise_id)
    .fetch_optional(pool)
    .await
}

pub(crate) struct UpsertExercise<'a> {
    pub(crate) id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) exercise_id: i64,
    pub(crate) name: &'a str,
    pub(crate) module_url: &'a str,
    pub(crate) api_url: &'a str,
    pub(crate) total_max_points: i32,
}

/// Creates the exercise on first discovery, otherwise refreshes the fields
/// the platform owns. Local grading settings are never touched here.
pub(crate) async fn upsert_from_platform(
    pool: &PgPool,
    params: UpsertExercise<'_>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exercises
             (id, course_id, exercise_id, name, module_url, api_url, total_max_points,
              created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8)
         ON CONFLICT (exercise_id) DO UPDATE
             SET name = EXCLUDED.name,
                 module_url = EXCLUDED.module_url,
                 api_url = EXCLUDED.api_url,
                 total_max_points = EXCLUDED.total_max_points,
                 updated_at = EXCLUDED.updated_at",
    )
    .bind(params.id)
    .bind(params.course_id)
    .bind(params.exercise_id)
    .bind(params.name)
    .bind(params.module_url)
    .bind(params.api_url)
    .bind(params.total_max_points)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn set_error_state(
    pool: &PgPool,
    id: &str,
    error_state: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exercises SET error_state = $1, updated_at = $2 WHERE id = $3")
        .bind(error_state)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn set_latest_release(
    pool: &PgPool,
    id: &str,
    feedback_ids: &[String],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exercises SET latest_release = $1, updated_at = $2 WHERE id = $3")
        .bind(Json(feedback_ids))
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exercises WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}
