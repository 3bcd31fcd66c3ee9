use sqlx::PgPool;

use crate::db::models::Course;

pub(crate) const COLUMNS: &str = "\
    id, course_id, name, api_token, api_url, exercise_url, data_url, lms_instance_id, \
    archived, created_at, updated_at";

pub(crate) async fn list_active(pool: &PgPool) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!(
        "SELECT {COLUMNS} FROM courses WHERE archived = FALSE ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(&format!("SELECT {COLUMNS} FROM courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
