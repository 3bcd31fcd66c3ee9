use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Student;

pub(crate) const COLUMNS: &str =
    "id, platform_user_id, lms_instance_id, email, student_number, created_at, updated_at";

pub(crate) async fn find_by_platform_id(
    pool: &PgPool,
    platform_user_id: i64,
    lms_instance_id: &str,
) -> Result<Option<Student>, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "SELECT {COLUMNS} FROM students WHERE platform_user_id = $1 AND lms_instance_id = $2"
    ))
    .bind(platform_user_id)
    .bind(lms_instance_id)
    .fetch_optional(pool)
    .await
}

pub(crate) struct CreateStudent<'a> {
    pub(crate) id: &'a str,
    pub(crate) platform_user_id: i64,
    pub(crate) lms_instance_id: &'a str,
    pub(crate) email: &'a str,
    pub(crate) student_number: Option<&'a str>,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateStudent<'_>,
    now: PrimitiveDateTime,
) -> Result<Student, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "INSERT INTO students
             (id, platform_user_id, lms_instance_id, email, student_number, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$6,$6)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.platform_user_id)
    .bind(params.lms_instance_id)
    .bind(params.email)
    .bind(params.student_number)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Email can change and the institutional student number sometimes arrives
/// late, so both are refreshed on every sync.
pub(crate) async fn update_contact(
    pool: &PgPool,
    id: &str,
    email: &str,
    student_number: Option<&str>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE students SET email = $1, student_number = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(email)
    .bind(student_number)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
