use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, OnceLock};

use anyhow::Context;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Course, Exercise, Student};
use crate::db::types::{FeedbackStatus, WorkDivision};
use crate::repositories::{courses, exercises, feedbacks, graders, students};
use crate::services::allocation::{divide_submissions, AllocationInput, WorkItem};
use crate::services::normalize::{sort_submissions, AcceptedStudent, AcceptedSubmission};
use crate::services::platform::PlatformApi;
use crate::services::reconcile::{plan_reconciliation, ExistingFeedback, ReconcilePlan};
use crate::services::templates;

static ACTIVE_SYNCS: OnceLock<Mutex<HashSet<i64>>> = OnceLock::new();

/// Per-process guard keeping two syncs of the same exercise from racing the
/// read-then-act steps of reconciliation and allocation.
pub(crate) struct SyncPermit {
    exercise_id: i64,
}

impl SyncPermit {
    pub(crate) fn try_acquire(exercise_id: i64) -> Option<Self> {
        let active = ACTIVE_SYNCS.get_or_init(|| Mutex::new(HashSet::new()));
        let mut guard = active.lock().unwrap_or_else(|err| err.into_inner());
        if guard.insert(exercise_id) {
            Some(Self { exercise_id })
        } else {
            None
        }
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        let active = ACTIVE_SYNCS.get_or_init(|| Mutex::new(HashSet::new()));
        let mut guard = active.lock().unwrap_or_else(|err| err.into_inner());
        guard.remove(&self.exercise_id);
    }
}

/// Platform exercise names carry pipe-delimited localization markers, e.g.
/// `1.2 |fi:Tehtävä|en:Exercise|`. The replacements are deliberately
/// asymmetric: `fi:` is stripped together with its leading pipe while `en:`
/// is stripped bare, leaving `1.2 Tehtävä|Exercise`. Stored display names and
/// operator lookups rely on this exact form, so keep it stable.
pub(crate) fn clean_display_name(name: &str) -> String {
    name.trim_matches('|').replace("|fi:", "").replace("en:", "")
}

/// Refreshes the exercise catalog of one course from the platform. Exercises
/// that disappeared upstream are deleted unless they hold grading state, in
/// which case they are flagged for an operator to decide.
pub(crate) async fn refresh_course<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
    course: &Course,
) -> anyhow::Result<()> {
    let page = platform
        .exercise_list(&course.exercise_url, &course.api_token)
        .await
        .context("Failed to fetch exercise list")?;

    let now = primitive_now_utc();
    let mut current: HashSet<i64> = HashSet::new();

    for module in &page.results {
        for exercise in &module.exercises {
            current.insert(exercise.id);

            let details = platform
                .exercise_details(&exercise.url, &course.api_token)
                .await
                .context("Failed to fetch exercise details")?;

            if !details.is_submittable {
                continue;
            }

            let name = clean_display_name(&exercise.display_name);
            exercises::upsert_from_platform(
                pool,
                exercises::UpsertExercise {
                    id: &Uuid::new_v4().to_string(),
                    course_id: &course.id,
                    exercise_id: exercise.id,
                    name: &name,
                    module_url: &module.url,
                    api_url: &exercise.url,
                    total_max_points: details.max_points,
                },
                now,
            )
            .await
            .context("Failed to upsert exercise")?;
        }
    }

    for stored in exercises::list_for_course(pool, &course.id).await? {
        if current.contains(&stored.exercise_id) {
            continue;
        }

        if stored.in_grading {
            warn!(
                exercise_id = stored.exercise_id,
                name = %stored.name,
                "Exercise in grading no longer exists upstream"
            );
            exercises::set_error_state(pool, &stored.id, Some("Exercise not found"), now).await?;
        } else {
            exercises::delete(pool, &stored.id).await?;
        }
    }

    info!(course_id = course.course_id, exercises = current.len(), "Refreshed exercise catalog");
    Ok(())
}

/// One full submission sync for one exercise: fetch, normalize, reconcile
/// and, under even division, balance the new records over the graders.
pub(crate) async fn update_submissions<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
    settings: &Settings,
    course: &Course,
    exercise: &Exercise,
) -> anyhow::Result<()> {
    let Some(_permit) = SyncPermit::try_acquire(exercise.exercise_id) else {
        debug!(exercise_id = exercise.exercise_id, "Sync already running, skipping");
        return Ok(());
    };

    let now = primitive_now_utc();

    let raw = match platform
        .submission_data(&course.data_url, &course.api_token, exercise.exercise_id)
        .await
    {
        Ok(raw) => raw,
        Err(err) => {
            exercises::set_error_state(pool, &exercise.id, Some(&err.to_string()), now).await?;
            return Err(err).context("Failed to fetch submission data");
        }
    };

    let module = match platform.module_info(&exercise.module_url, &course.api_token).await {
        Ok(module) => module,
        Err(err) => {
            exercises::set_error_state(pool, &exercise.id, Some(&err.to_string()), now).await?;
            return Err(err).context("Failed to fetch module info");
        }
    };

    if exercise.error_state.is_some() {
        exercises::set_error_state(pool, &exercise.id, None, now).await?;
    }

    let deadline_passed = !module.is_open;
    let accepted =
        sort_submissions(&raw, exercise.min_points, exercise.max_points, deadline_passed);

    let existing = load_existing(pool, &exercise.id).await?;
    let plan = plan_reconciliation(&accepted, &existing.records);

    for locked in &plan.locked {
        warn!(
            exercise_id = exercise.exercise_id,
            user_id = locked.user_id,
            sub_id = locked.incoming_sub_id,
            "Newer submission ignored, grading already started"
        );
    }

    apply_plan(pool, settings, course, exercise, &accepted, &existing, &plan).await?;

    if exercise.work_division == WorkDivision::EvenDivision {
        run_allocation(pool, exercise).await?;
    }

    info!(
        exercise_id = exercise.exercise_id,
        accepted = accepted.len(),
        created = plan.creates.len(),
        deleted = plan.deletions.len(),
        "Submission sync finished"
    );
    Ok(())
}

struct ExistingState {
    records: Vec<ExistingFeedback>,
    /// Feedback record id per submission id.
    by_sub: HashMap<i64, String>,
    /// Student row id per platform user id, from the attachment snapshot.
    student_rows: HashMap<i64, String>,
}

async fn load_existing(pool: &PgPool, exercise_id: &str) -> anyhow::Result<ExistingState> {
    let rows = feedbacks::list_for_exercise(pool, exercise_id)
        .await
        .context("Failed to load feedback records")?;
    let attachments = feedbacks::attachments_for_exercise(pool, exercise_id)
        .await
        .context("Failed to load feedback attachments")?;

    let mut attached: HashMap<String, Vec<i64>> = HashMap::new();
    let mut student_rows = HashMap::new();
    for (feedback_id, student_id, platform_user_id) in attachments {
        attached.entry(feedback_id).or_default().push(platform_user_id);
        student_rows.insert(platform_user_id, student_id);
    }

    let mut records = Vec::with_capacity(rows.len());
    let mut by_sub = HashMap::new();
    for row in rows {
        by_sub.insert(row.sub_id, row.id.clone());
        records.push(ExistingFeedback {
            students: attached.remove(&row.id).unwrap_or_default(),
            id: row.id,
            sub_id: row.sub_id,
            status: row.status,
            grader_id: row.grader_id,
            language: row.language,
        });
    }

    Ok(ExistingState { records, by_sub, student_rows })
}

async fn apply_plan(
    pool: &PgPool,
    settings: &Settings,
    course: &Course,
    exercise: &Exercise,
    accepted: &BTreeMap<i64, AcceptedSubmission>,
    existing: &ExistingState,
    plan: &ReconcilePlan,
) -> anyhow::Result<()> {
    let now = primitive_now_utc();
    let template_dir = &settings.templates().feedback_template_dir;

    // Contact details are refreshed for every accepted student, attached or
    // not, since emails change and student numbers can arrive late.
    let mut student_rows: HashMap<i64, String> = existing.student_rows.clone();
    for submission in accepted.values() {
        for student in &submission.students {
            let row = ensure_student(pool, course, student, now).await?;
            student_rows.insert(student.user_id, row.id);
        }
    }

    let mut by_sub = existing.by_sub.clone();

    for create in &plan.creates {
        let base = templates::feedback_base_text(
            template_dir,
            exercise.feedback_base_primary.as_deref(),
            exercise.feedback_base_secondary.as_deref(),
            create.language,
        )
        .await
        .unwrap_or_default();

        let id = Uuid::new_v4().to_string();
        feedbacks::create(
            pool,
            feedbacks::CreateFeedback {
                id: &id,
                exercise_id: &exercise.id,
                sub_id: create.sub_id,
                auto_grade: create.auto_grade,
                penalty: create.penalty,
                feedback: &base,
                language: create.language,
            },
            now,
        )
        .await
        .context("Failed to create feedback record")?;
        by_sub.insert(create.sub_id, id);
    }

    for attachment in &plan.attachments {
        let feedback_id = by_sub
            .get(&attachment.sub_id)
            .ok_or_else(|| anyhow::anyhow!("No feedback record for sub {}", attachment.sub_id))?;
        let student_id = student_rows
            .get(&attachment.user_id)
            .ok_or_else(|| anyhow::anyhow!("No student row for user {}", attachment.user_id))?;
        feedbacks::attach_student(pool, feedback_id, student_id).await?;
    }

    for migration in &plan.grader_migrations {
        let feedback_id = by_sub
            .get(&migration.sub_id)
            .ok_or_else(|| anyhow::anyhow!("No feedback record for sub {}", migration.sub_id))?;
        feedbacks::assign_grader(pool, feedback_id, &migration.grader_id, now).await?;
    }

    for detachment in &plan.detachments {
        if let Some(student_id) = student_rows.get(&detachment.user_id) {
            feedbacks::detach_student(pool, &detachment.feedback_id, student_id).await?;
        }
    }

    for feedback_id in &plan.deletions {
        feedbacks::delete_if_template(pool, feedback_id).await?;
    }

    for refresh in &plan.grade_refreshes {
        feedbacks::update_auto_grade(
            pool,
            &refresh.feedback_id,
            refresh.auto_grade,
            refresh.penalty,
            now,
        )
        .await?;
    }

    // Untouched records follow template file edits between syncs.
    for record in &existing.records {
        if record.status != FeedbackStatus::Template {
            continue;
        }
        if !accepted.contains_key(&record.sub_id) {
            continue;
        }
        let base = templates::feedback_base_text(
            template_dir,
            exercise.feedback_base_primary.as_deref(),
            exercise.feedback_base_secondary.as_deref(),
            record.language,
        )
        .await;
        if let Some(text) = base {
            feedbacks::set_template_text(pool, &record.id, &text, now).await?;
        }
    }

    Ok(())
}

async fn ensure_student(
    pool: &PgPool,
    course: &Course,
    student: &AcceptedStudent,
    now: time::PrimitiveDateTime,
) -> anyhow::Result<Student> {
    match students::find_by_platform_id(pool, student.user_id, &course.lms_instance_id).await? {
        Some(row) => {
            students::update_contact(
                pool,
                &row.id,
                &student.email,
                student.student_number.as_deref(),
                now,
            )
            .await?;
            Ok(row)
        }
        None => {
            let row = students::create(
                pool,
                students::CreateStudent {
                    id: &Uuid::new_v4().to_string(),
                    platform_user_id: student.user_id,
                    lms_instance_id: &course.lms_instance_id,
                    email: &student.email,
                    student_number: student.student_number.as_deref(),
                },
                now,
            )
            .await
            .context("Failed to create student")?;
            debug!(user_id = student.user_id, "Created new student");
            Ok(row)
        }
    }
}

/// Assigns graders to the exercise's unassigned records under even division.
pub(crate) async fn run_allocation(pool: &PgPool, exercise: &Exercise) -> anyhow::Result<()> {
    let general: Vec<String> =
        graders::general_pool(pool, &exercise.id).await?.into_iter().map(|g| g.id).collect();
    let secondary: Vec<String> =
        graders::secondary_pool(pool, &exercise.id).await?.into_iter().map(|g| g.id).collect();

    let items: Vec<WorkItem> = feedbacks::list_for_exercise(pool, &exercise.id)
        .await?
        .into_iter()
        .map(|f| WorkItem { feedback_id: f.id, language: f.language, grader_id: f.grader_id })
        .collect();

    let input = AllocationInput {
        num_of_graders: exercise.num_of_graders,
        general_pool: general,
        secondary_pool: secondary,
        items,
    };

    let assignments = divide_submissions(&input, &mut rand::thread_rng());
    let assigned = assignments.len();

    let now = primitive_now_utc();
    for assignment in assignments {
        feedbacks::assign_grader(pool, &assignment.feedback_id, &assignment.grader_id, now)
            .await?;
    }

    if assigned > 0 {
        info!(exercise_id = exercise.exercise_id, assigned, "Balanced submissions over graders");
    }
    Ok(())
}

/// Periodic driver: refresh the exercise catalog of every active course.
/// One broken course never blocks the others.
pub(crate) async fn refresh_all_courses<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
) -> anyhow::Result<()> {
    for course in courses::list_active(pool).await.context("Failed to list courses")? {
        if let Err(err) = refresh_course(pool, platform, &course).await {
            error!(course_id = course.course_id, error = %err, "Course refresh failed");
        }
    }
    Ok(())
}

/// Periodic driver: sync submissions for every exercise currently taken into
/// grading, continuing past per-exercise failures.
pub(crate) async fn sync_in_grading<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
    settings: &Settings,
) -> anyhow::Result<()> {
    for exercise in exercises::list_in_grading(pool).await.context("Failed to list exercises")? {
        metrics::counter!("grading_sync_runs_total").increment(1);

        let course = match courses::find_by_id(pool, &exercise.course_id).await? {
            Some(course) => course,
            None => {
                error!(exercise_id = exercise.exercise_id, "Exercise has no course, skipping");
                continue;
            }
        };

        if let Err(err) = update_submissions(pool, platform, settings, &course, &exercise).await {
            metrics::counter!("grading_sync_failures_total").increment(1);
            error!(exercise_id = exercise.exercise_id, error = %err, "Submission sync failed");
        }
    }
    Ok(())
}

/// One-shot sync of a single exercise, addressed by its platform id.
pub(crate) async fn sync_one<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
    settings: &Settings,
    exercise_id: i64,
) -> anyhow::Result<()> {
    let exercise = exercises::find_by_external_id(pool, exercise_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Exercise {exercise_id} is not registered"))?;
    let course = courses::find_by_id(pool, &exercise.course_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Exercise {exercise_id} has no course"))?;

    update_submissions(pool, platform, settings, &course, &exercise).await
}
