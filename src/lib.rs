pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod services;
pub(crate) mod tasks;

use anyhow::bail;
use sqlx::PgPool;

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::db::models::{Course, Exercise, Grader};
use crate::repositories::{courses, exercises, graders};
use crate::services::platform::PlatformClient;

/// Long-running worker: periodic course refresh and submission sync until
/// the process receives a shutdown signal.
pub async fn run() -> anyhow::Result<()> {
    let (settings, db_pool) = bootstrap().await?;
    let state = AppState::new(settings, db_pool);

    tracing::info!(
        environment = %state.settings().runtime().environment.as_str(),
        "Plussa grading worker started"
    );

    tasks::scheduler::run(state).await
}

/// Syncs one exercise by its platform id and exits. Used for manual runs and
/// external schedulers.
pub async fn sync_exercise_once(exercise_id: i64) -> anyhow::Result<()> {
    let (settings, db_pool) = bootstrap().await?;
    let platform = PlatformClient::from_settings(&settings)?;
    services::sync::sync_one(&db_pool, &platform, &settings, exercise_id).await
}

/// Posts the grader's ready feedbacks of one exercise to the platform.
pub async fn release_feedbacks(exercise_id: i64, grader_email: &str) -> anyhow::Result<()> {
    let (settings, db_pool) = bootstrap().await?;
    let platform = PlatformClient::from_settings(&settings)?;
    let (exercise, course) = lookup_exercise(&db_pool, exercise_id).await?;
    let grader = lookup_grader(&db_pool, grader_email).await?;

    let report = services::release::release_for_grader(
        &db_pool,
        &platform,
        &exercise,
        &course.api_token,
        &grader,
    )
    .await?;

    if let Some(error) = report.error {
        bail!("released {} feedbacks, {} left unreleased: {error}", report.released, report.remaining);
    }

    tracing::info!(released = report.released, "Release finished");
    Ok(())
}

/// Reverts the most recent release batch of one exercise.
pub async fn undo_release(exercise_id: i64) -> anyhow::Result<()> {
    let (_, db_pool) = bootstrap().await?;
    let (exercise, _) = lookup_exercise(&db_pool, exercise_id).await?;

    let undone = services::release::undo_latest_release(&db_pool, &exercise).await?;
    tracing::info!(undone, "Undo finished");
    Ok(())
}

/// Grades every untouched record the grader holds with one fixed score.
pub async fn batch_assess(
    exercise_id: i64,
    grader_email: &str,
    points: i32,
    feedback_text: &str,
) -> anyhow::Result<()> {
    let (_, db_pool) = bootstrap().await?;
    let (exercise, _) = lookup_exercise(&db_pool, exercise_id).await?;
    let grader = lookup_grader(&db_pool, grader_email).await?;

    let assessed = services::release::batch_assess(
        &db_pool,
        &exercise,
        &grader.id,
        points,
        feedback_text,
    )
    .await?;
    tracing::info!(assessed, "Batch assess finished");
    Ok(())
}

async fn bootstrap() -> anyhow::Result<(Settings, PgPool)> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    Ok((settings, db_pool))
}

async fn lookup_exercise(pool: &PgPool, exercise_id: i64) -> anyhow::Result<(Exercise, Course)> {
    let Some(exercise) = exercises::find_by_external_id(pool, exercise_id).await? else {
        bail!("Exercise {exercise_id} is not registered");
    };
    let Some(course) = courses::find_by_id(pool, &exercise.course_id).await? else {
        bail!("Exercise {exercise_id} has no course");
    };
    Ok((exercise, course))
}

async fn lookup_grader(pool: &PgPool, email: &str) -> anyhow::Result<Grader> {
    match graders::find_by_email(pool, email).await? {
        Some(grader) => Ok(grader),
        None => bail!("No grader registered with email {email}"),
    }
}
