use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum PlatformError {
    #[error("platform request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("platform returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to decode platform response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// One page of the course's exercise listing.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExerciseListPage {
    pub(crate) results: Vec<Module>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Module {
    pub(crate) url: String,
    pub(crate) exercises: Vec<ModuleExercise>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModuleExercise {
    pub(crate) id: i64,
    pub(crate) url: String,
    pub(crate) display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExerciseDetails {
    #[serde(default)]
    pub(crate) is_submittable: bool,
    #[serde(default)]
    pub(crate) max_points: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModuleInfo {
    pub(crate) is_open: bool,
}

/// Raw submission record as serialized by the platform's course data export.
/// `ready_for_review` is a marker field: its presence opts the submission in
/// to manual review before the deadline has closed.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawSubmission {
    #[serde(rename = "SubmissionID")]
    pub(crate) submission_id: i64,
    #[serde(rename = "Grade")]
    pub(crate) grade: i32,
    #[serde(rename = "Penalty")]
    pub(crate) penalty: Option<f64>,
    #[serde(rename = "Email")]
    pub(crate) email: String,
    #[serde(rename = "StudentID")]
    pub(crate) student_number: Option<String>,
    #[serde(rename = "UserID")]
    pub(crate) user_id: i64,
    #[serde(default)]
    pub(crate) feedback_lang: Option<String>,
    #[serde(default, rename = "__grader_lang")]
    pub(crate) grader_lang: Option<String>,
    #[serde(default)]
    pub(crate) ready_for_review: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(crate) struct ReleasePayload {
    pub(crate) students_by_email: Vec<String>,
    pub(crate) feedback: String,
    pub(crate) points: i64,
}

#[async_trait]
pub(crate) trait PlatformApi: Send + Sync {
    async fn exercise_list(&self, url: &str, token: &str)
        -> Result<ExerciseListPage, PlatformError>;

    async fn exercise_details(
        &self,
        url: &str,
        token: &str,
    ) -> Result<ExerciseDetails, PlatformError>;

    async fn module_info(&self, url: &str, token: &str) -> Result<ModuleInfo, PlatformError>;

    async fn submission_data(
        &self,
        data_url: &str,
        token: &str,
        exercise_id: i64,
    ) -> Result<Vec<RawSubmission>, PlatformError>;

    async fn post_feedback(
        &self,
        submissions_url: &str,
        token: &str,
        payload: &ReleasePayload,
    ) -> Result<(), PlatformError>;
}

#[derive(Debug, Clone)]
pub(crate) struct PlatformClient {
    client: Client,
}

impl PlatformClient {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.platform().connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.platform().request_timeout_seconds))
            .build()
            .map_err(|err| anyhow::anyhow!("Failed to build platform HTTP client: {err}"))?;

        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        params: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(PlatformError::Http { status: status.as_u16(), body });
        }

        serde_json::from_str(&body).map_err(PlatformError::Decode)
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn exercise_list(
        &self,
        url: &str,
        token: &str,
    ) -> Result<ExerciseListPage, PlatformError> {
        self.get_json(url, token, &[]).await
    }

    async fn exercise_details(
        &self,
        url: &str,
        token: &str,
    ) -> Result<ExerciseDetails, PlatformError> {
        self.get_json(url, token, &[]).await
    }

    async fn module_info(&self, url: &str, token: &str) -> Result<ModuleInfo, PlatformError> {
        self.get_json(url, token, &[]).await
    }

    async fn submission_data(
        &self,
        data_url: &str,
        token: &str,
        exercise_id: i64,
    ) -> Result<Vec<RawSubmission>, PlatformError> {
        self.get_json(
            data_url,
            token,
            &[("exercise_id", exercise_id.to_string()), ("format", String::from("json"))],
        )
        .await
    }

    async fn post_feedback(
        &self,
        submissions_url: &str,
        token: &str,
        payload: &ReleasePayload,
    ) -> Result<(), PlatformError> {
        let response = self
            .client
            .post(submissions_url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Http { status: status.as_u16(), body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_submission_decodes_platform_field_names() {
        let raw: RawSubmission = serde_json::from_str(
            r#"{
                "SubmissionID": 4021,
                "Grade": 8,
                "Penalty": 0.2,
                "Email": "alice@example.fi",
                "StudentID": "123456",
                "UserID": 17,
                "feedback_lang": "en",
                "ready_for_review": "yes"
            }"#,
        )
        .expect("decode");

        assert_eq!(raw.submission_id, 4021);
        assert_eq!(raw.grade, 8);
        assert_eq!(raw.penalty, Some(0.2));
        assert_eq!(raw.student_number.as_deref(), Some("123456"));
        assert_eq!(raw.user_id, 17);
        assert_eq!(raw.feedback_lang.as_deref(), Some("en"));
        assert!(raw.ready_for_review.is_some());
    }

    #[test]
    fn raw_submission_optional_fields_default() {
        let raw: RawSubmission = serde_json::from_str(
            r#"{
                "SubmissionID": 1,
                "Grade": 5,
                "Penalty": null,
                "Email": "bob@example.fi",
                "StudentID": null,
                "UserID": 3
            }"#,
        )
        .expect("decode");

        assert_eq!(raw.penalty, None);
        assert_eq!(raw.student_number, None);
        assert!(raw.feedback_lang.is_none());
        assert!(raw.grader_lang.is_none());
        assert!(raw.ready_for_review.is_none());
    }

    #[test]
    fn exercise_list_page_decodes_nested_modules() {
        let page: ExerciseListPage = serde_json::from_str(
            r#"{
                "results": [
                    {
                        "url": "https://plus.example/api/v2/modules/1/",
                        "exercises": [
                            {"id": 10, "url": "https://plus.example/api/v2/exercises/10/", "display_name": "|fi:Teht 1|en:Ex 1|"}
                        ]
                    }
                ]
            }"#,
        )
        .expect("decode");

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].exercises[0].id, 10);
    }
}
