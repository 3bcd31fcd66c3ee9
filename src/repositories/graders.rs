use sqlx::PgPool;

use crate::db::models::Grader;

pub(crate) const COLUMNS: &str = "id, email, full_name, created_at, updated_at";

/// Graders who can take work in either grading language.
pub(crate) async fn general_pool(
    pool: &PgPool,
    exercise_id: &str,
) -> Result<Vec<Grader>, sqlx::Error> {
    sqlx::query_as::<_, Grader>(&format!(
        "SELECT {COLUMNS} FROM graders g
         JOIN exercise_graders eg ON eg.grader_id = g.id
         WHERE eg.exercise_id = $1
         ORDER BY g.id"
    ))
    .bind(exercise_id)
    .fetch_all(pool)
    .await
}

/// Graders restricted to secondary-language submissions.
pub(crate) async fn secondary_pool(
    pool: &PgPool,
    exercise_id: &str,
) -> Result<Vec<Grader>, sqlx::Error> {
    sqlx::query_as::<_, Grader>(&format!(
        "SELECT {COLUMNS} FROM graders g
         JOIN exercise_secondary_graders eg ON eg.grader_id = g.id
         WHERE eg.exercise_id = $1
         ORDER BY g.id"
    ))
    .bind(exercise_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Grader>, sqlx::Error> {
    sqlx::query_as::<_, Grader>(&format!("SELECT {COLUMNS} FROM graders WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await
}
