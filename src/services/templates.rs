use std::path::Path;

use tokio::fs;
use tracing::warn;

use crate::db::types::GradingLanguage;

/// Resolves and reads the feedback base text configured for an exercise.
///
/// Each language prefers its own template file and falls back to the other
/// one. A configured file that cannot be read still produces text, so the
/// problem surfaces to graders instead of silently leaving records empty.
pub(crate) async fn feedback_base_text(
    template_dir: &str,
    primary: Option<&str>,
    secondary: Option<&str>,
    language: GradingLanguage,
) -> Option<String> {
    let file_name = match language {
        GradingLanguage::Secondary => secondary.or(primary),
        GradingLanguage::Primary => primary.or(secondary),
    }?;

    let path = Path::new(template_dir).join(file_name);
    match fs::read_to_string(&path).await {
        Ok(text) => Some(text),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read feedback template");
            Some(format!("Feedback template cannot be read: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn temp_template_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("feedback-templates-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await.expect("create temp dir");
        dir
    }

    #[tokio::test]
    async fn reads_primary_template() {
        let dir = temp_template_dir().await;
        fs::write(dir.join("base_fi.txt"), "Hyvä suoritus\n").await.expect("write");

        let text = feedback_base_text(
            dir.to_str().expect("utf8 path"),
            Some("base_fi.txt"),
            None,
            GradingLanguage::Primary,
        )
        .await;

        assert_eq!(text.as_deref(), Some("Hyvä suoritus\n"));
    }

    #[tokio::test]
    async fn secondary_falls_back_to_primary_file() {
        let dir = temp_template_dir().await;
        fs::write(dir.join("base_fi.txt"), "fallback").await.expect("write");

        let text = feedback_base_text(
            dir.to_str().expect("utf8 path"),
            Some("base_fi.txt"),
            None,
            GradingLanguage::Secondary,
        )
        .await;

        assert_eq!(text.as_deref(), Some("fallback"));
    }

    #[tokio::test]
    async fn secondary_file_wins_when_present() {
        let dir = temp_template_dir().await;
        fs::write(dir.join("base_fi.txt"), "fi").await.expect("write");
        fs::write(dir.join("base_en.txt"), "en").await.expect("write");

        let text = feedback_base_text(
            dir.to_str().expect("utf8 path"),
            Some("base_fi.txt"),
            Some("base_en.txt"),
            GradingLanguage::Secondary,
        )
        .await;

        assert_eq!(text.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn primary_falls_back_to_secondary_file() {
        let dir = temp_template_dir().await;
        fs::write(dir.join("base_en.txt"), "en only").await.expect("write");

        let text = feedback_base_text(
            dir.to_str().expect("utf8 path"),
            None,
            Some("base_en.txt"),
            GradingLanguage::Primary,
        )
        .await;

        assert_eq!(text.as_deref(), Some("en only"));
    }

    #[tokio::test]
    async fn unconfigured_template_yields_nothing() {
        let text = feedback_base_text("/nonexistent", None, None, GradingLanguage::Primary).await;
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn unreadable_template_reports_in_text() {
        let dir = temp_template_dir().await;

        let text = feedback_base_text(
            dir.to_str().expect("utf8 path"),
            Some("missing.txt"),
            None,
            GradingLanguage::Primary,
        )
        .await
        .expect("error text");

        assert!(text.starts_with("Feedback template cannot be read:"), "{text}");
    }
}
