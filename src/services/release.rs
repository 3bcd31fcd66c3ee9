use anyhow::Context;
use sqlx::PgPool;
use tracing::{error, info};

use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Exercise, Feedback, Grader};
use crate::repositories::{exercises, feedbacks};
use crate::services::platform::{PlatformApi, PlatformError, ReleasePayload};

/// Points and the grading summary prepended to the feedback text.
///
/// The late penalty is taken from the grader's points only and truncated
/// toward zero, matching how the platform itself rounds penalties.
pub(crate) fn calculate_points(
    staff_grade: i32,
    auto_grade: i32,
    penalty: f64,
    add_penalty: bool,
    add_auto_grade: bool,
    grader_name: &str,
) -> (i64, String) {
    let (penalty_points, penalty_info) = if add_penalty {
        let penalty_points = (f64::from(staff_grade) * penalty) as i64;
        (penalty_points, format!("Late penalty for grader points: -{penalty_points}\n"))
    } else {
        (0, String::new())
    };

    let (points, auto_grade_info, total_info) = if add_auto_grade {
        let points = i64::from(auto_grade) + i64::from(staff_grade) - penalty_points;
        (
            points,
            format!("Automatic evaluation: {auto_grade}\n"),
            format!("Total points: {points}\n"),
        )
    } else {
        (i64::from(staff_grade) - penalty_points, String::new(), String::new())
    };

    let info = format!(
        "Grader: {grader_name}\n\n{auto_grade_info}Grader points: {staff_grade}\n{penalty_info}{total_info}\n"
    );

    (points, info)
}

pub(crate) fn build_payload(
    feedback: &Feedback,
    exercise: &Exercise,
    grader_name: &str,
    student_emails: Vec<String>,
) -> ReleasePayload {
    let (points, info) = calculate_points(
        feedback.staff_grade,
        feedback.auto_grade,
        feedback.penalty,
        exercise.add_penalty,
        exercise.add_auto_grade,
        grader_name,
    );

    ReleasePayload {
        students_by_email: student_emails,
        feedback: format!("<pre>{info}{}</pre>", feedback.feedback),
        points,
    }
}

/// Where new graded submissions are posted for an exercise.
pub(crate) fn submissions_url(api_url: &str) -> String {
    format!("{}/submissions/", api_url.trim_end_matches('/'))
}

#[derive(Debug)]
pub(crate) struct PreparedRelease {
    pub(crate) feedback_id: String,
    pub(crate) payload: ReleasePayload,
}

#[derive(Debug)]
pub(crate) struct ReleaseFailure {
    pub(crate) error: PlatformError,
    pub(crate) remaining: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ReleaseOutcome {
    pub(crate) released: Vec<String>,
    pub(crate) failure: Option<ReleaseFailure>,
}

/// Posts the prepared feedbacks one at a time, stopping at the first failure
/// so an outage cannot scatter half-posted duplicates across retries. Records
/// posted before the failure stay released.
pub(crate) async fn post_feedbacks<P: PlatformApi + ?Sized>(
    platform: &P,
    url: &str,
    token: &str,
    prepared: &[PreparedRelease],
) -> ReleaseOutcome {
    let mut outcome = ReleaseOutcome::default();

    for (index, item) in prepared.iter().enumerate() {
        match platform.post_feedback(url, token, &item.payload).await {
            Ok(()) => outcome.released.push(item.feedback_id.clone()),
            Err(err) => {
                outcome.failure =
                    Some(ReleaseFailure { error: err, remaining: prepared.len() - index });
                break;
            }
        }
    }

    outcome
}

#[derive(Debug)]
pub(crate) struct ReleaseReport {
    pub(crate) released: usize,
    pub(crate) remaining: usize,
    pub(crate) error: Option<String>,
}

/// Releases every ready, unreleased feedback the grader holds for the
/// exercise. Successful posts are persisted as released even when a later
/// post fails, and the batch becomes the exercise's latest release so it can
/// be undone as a unit.
pub(crate) async fn release_for_grader<P: PlatformApi + ?Sized>(
    pool: &PgPool,
    platform: &P,
    exercise: &Exercise,
    api_token: &str,
    grader: &Grader,
) -> anyhow::Result<ReleaseReport> {
    let ready = feedbacks::list_ready_unreleased(pool, &exercise.id, &grader.id)
        .await
        .context("Failed to load ready feedbacks")?;

    if ready.is_empty() {
        return Ok(ReleaseReport { released: 0, remaining: 0, error: None });
    }

    let mut prepared = Vec::with_capacity(ready.len());
    for feedback in &ready {
        let emails = feedbacks::student_emails(pool, &feedback.id)
            .await
            .context("Failed to load feedback students")?;
        prepared.push(PreparedRelease {
            feedback_id: feedback.id.clone(),
            payload: build_payload(feedback, exercise, &grader.full_name, emails),
        });
    }

    let url = submissions_url(&exercise.api_url);
    let outcome = post_feedbacks(platform, &url, api_token, &prepared).await;

    let now = primitive_now_utc();
    for feedback_id in &outcome.released {
        feedbacks::mark_released(pool, feedback_id, now)
            .await
            .context("Failed to mark feedback released")?;
    }

    if !outcome.released.is_empty() {
        exercises::set_latest_release(pool, &exercise.id, &outcome.released, now)
            .await
            .context("Failed to record latest release")?;
        metrics::counter!("grading_feedback_released_total")
            .increment(outcome.released.len() as u64);
    }

    let report = match outcome.failure {
        Some(failure) => {
            error!(
                exercise_id = exercise.exercise_id,
                grader = %grader.email,
                released = outcome.released.len(),
                remaining = failure.remaining,
                error = %failure.error,
                "Feedback release stopped early"
            );
            ReleaseReport {
                released: outcome.released.len(),
                remaining: failure.remaining,
                error: Some(failure.error.to_string()),
            }
        }
        None => {
            info!(
                exercise_id = exercise.exercise_id,
                grader = %grader.email,
                released = outcome.released.len(),
                released_at = %format_primitive(now),
                "Released feedbacks"
            );
            ReleaseReport { released: outcome.released.len(), remaining: 0, error: None }
        }
    };

    Ok(report)
}

/// The feedback ids an undo would flip back, or `None` when the exercise has
/// no recorded batch. Only the recorded ids are touched, earlier releases of
/// the same exercise stay released.
pub(crate) fn undo_batch(latest_release: &[String]) -> Option<&[String]> {
    if latest_release.is_empty() {
        None
    } else {
        Some(latest_release)
    }
}

/// Flips the exercise's most recent release batch back to unreleased and
/// empties the batch list, so a repeated undo is a no-op.
pub(crate) async fn undo_latest_release(
    pool: &PgPool,
    exercise: &Exercise,
) -> anyhow::Result<u64> {
    let Some(batch) = undo_batch(&exercise.latest_release.0) else {
        return Ok(0);
    };

    let now = primitive_now_utc();
    let undone =
        feedbacks::unrelease(pool, batch, now).await.context("Failed to undo release")?;
    exercises::set_latest_release(pool, &exercise.id, &[], now)
        .await
        .context("Failed to clear latest release")?;

    info!(exercise_id = exercise.exercise_id, undone, "Undid latest feedback release");
    Ok(undone)
}

/// Grades every untouched record the grader holds with one fixed score.
pub(crate) async fn batch_assess(
    pool: &PgPool,
    exercise: &Exercise,
    grader_id: &str,
    points: i32,
    feedback_text: &str,
) -> anyhow::Result<u64> {
    let assessed = feedbacks::batch_assess(
        pool,
        &exercise.id,
        grader_id,
        points,
        feedback_text,
        primitive_now_utc(),
    )
    .await
    .context("Failed to batch assess feedbacks")?;

    info!(exercise_id = exercise.exercise_id, assessed, points, "Batch assessed feedbacks");
    Ok(assessed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::services::platform::{
        ExerciseDetails, ExerciseListPage, ModuleInfo, RawSubmission,
    };

    #[test]
    fn plain_points_without_toggles() {
        let (points, info) = calculate_points(7, 3, 0.4, false, false, "Assistant A");
        assert_eq!(points, 7);
        assert_eq!(info, "Grader: Assistant A\n\nGrader points: 7\n\n");
    }

    #[test]
    fn auto_grade_added_when_enabled() {
        let (points, info) = calculate_points(7, 3, 0.0, false, true, "Assistant A");
        assert_eq!(points, 10);
        assert_eq!(
            info,
            "Grader: Assistant A\n\nAutomatic evaluation: 3\nGrader points: 7\nTotal points: 10\n\n"
        );
    }

    #[test]
    fn penalty_truncates_toward_zero() {
        // 7 * 0.4 = 2.8, truncated to 2.
        let (points, info) = calculate_points(7, 0, 0.4, true, false, "Assistant A");
        assert_eq!(points, 5);
        assert!(info.contains("Late penalty for grader points: -2\n"), "{info}");
    }

    #[test]
    fn penalty_applies_to_grader_points_only() {
        let (points, _) = calculate_points(10, 6, 0.5, true, true, "Assistant A");
        // 6 + 10 - int(10 * 0.5)
        assert_eq!(points, 11);
    }

    #[test]
    fn zero_penalty_still_reports_line_when_enabled() {
        let (_, info) = calculate_points(7, 0, 0.0, true, false, "Assistant A");
        assert!(info.contains("Late penalty for grader points: -0\n"), "{info}");
    }

    #[test]
    fn submissions_url_normalizes_trailing_slash() {
        assert_eq!(
            submissions_url("https://plus.example/api/v2/exercises/10/"),
            "https://plus.example/api/v2/exercises/10/submissions/"
        );
        assert_eq!(
            submissions_url("https://plus.example/api/v2/exercises/10"),
            "https://plus.example/api/v2/exercises/10/submissions/"
        );
    }

    /// Platform stub that fails every POST after the first `succeed` calls.
    struct FlakyPlatform {
        succeed: usize,
        posted: Mutex<Vec<ReleasePayload>>,
    }

    #[async_trait]
    impl PlatformApi for FlakyPlatform {
        async fn exercise_list(
            &self,
            _url: &str,
            _token: &str,
        ) -> Result<ExerciseListPage, PlatformError> {
            unimplemented!("not used in release tests")
        }

        async fn exercise_details(
            &self,
            _url: &str,
            _token: &str,
        ) -> Result<ExerciseDetails, PlatformError> {
            unimplemented!("not used in release tests")
        }

        async fn module_info(&self, _url: &str, _token: &str) -> Result<ModuleInfo, PlatformError> {
            unimplemented!("not used in release tests")
        }

        async fn submission_data(
            &self,
            _data_url: &str,
            _token: &str,
            _exercise_id: i64,
        ) -> Result<Vec<RawSubmission>, PlatformError> {
            unimplemented!("not used in release tests")
        }

        async fn post_feedback(
            &self,
            _submissions_url: &str,
            _token: &str,
            payload: &ReleasePayload,
        ) -> Result<(), PlatformError> {
            let mut posted = self.posted.lock().expect("lock");
            if posted.len() >= self.succeed {
                return Err(PlatformError::Http {
                    status: 502,
                    body: String::from("bad gateway"),
                });
            }
            posted.push(payload.clone());
            Ok(())
        }
    }

    fn prepared(id: &str) -> PreparedRelease {
        PreparedRelease {
            feedback_id: id.to_string(),
            payload: ReleasePayload {
                students_by_email: vec![format!("{id}@example.fi")],
                feedback: String::from("<pre>ok</pre>"),
                points: 10,
            },
        }
    }

    #[tokio::test]
    async fn stops_at_first_failed_post() {
        let platform = FlakyPlatform { succeed: 1, posted: Mutex::new(Vec::new()) };
        let batch = vec![prepared("f1"), prepared("f2"), prepared("f3")];

        let outcome = post_feedbacks(&platform, "https://x/submissions/", "t", &batch).await;

        assert_eq!(outcome.released, vec!["f1".to_string()]);
        let failure = outcome.failure.expect("failure");
        assert_eq!(failure.remaining, 2);
        assert_eq!(platform.posted.lock().expect("lock").len(), 1);
    }

    #[test]
    fn undo_flips_only_the_latest_batch_and_clears_it() {
        use std::collections::HashMap;

        // Released state as the feedbacks table would hold it, f3 belongs to
        // an earlier batch.
        let mut released: HashMap<&str, bool> =
            HashMap::from([("f1", true), ("f2", true), ("f3", true)]);
        let mut latest = vec![String::from("f1"), String::from("f2")];

        let batch = undo_batch(&latest).expect("batch to undo").to_vec();
        for id in &batch {
            released.insert(id.as_str(), false);
        }
        latest.clear();

        assert!(!released["f1"]);
        assert!(!released["f2"]);
        assert!(released["f3"], "earlier batches stay released");
        // With the list cleared a second undo touches nothing.
        assert!(undo_batch(&latest).is_none());
    }

    #[tokio::test]
    async fn releases_whole_batch_when_platform_accepts() {
        let platform = FlakyPlatform { succeed: 10, posted: Mutex::new(Vec::new()) };
        let batch = vec![prepared("f1"), prepared("f2")];

        let outcome = post_feedbacks(&platform, "https://x/submissions/", "t", &batch).await;

        assert_eq!(outcome.released.len(), 2);
        assert!(outcome.failure.is_none());
    }
}
