use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "feedbackstatus", rename_all = "lowercase")]
pub(crate) enum FeedbackStatus {
    Template,
    Draft,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "workdivision", rename_all = "snake_case")]
pub(crate) enum WorkDivision {
    EvenDivision,
    ManualPick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gradinglanguage", rename_all = "lowercase")]
pub(crate) enum GradingLanguage {
    Primary,
    Secondary,
}
