use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{FeedbackStatus, GradingLanguage, WorkDivision};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Course {
    pub(crate) id: String,
    pub(crate) course_id: i64,
    pub(crate) name: String,
    pub(crate) api_token: String,
    pub(crate) api_url: String,
    pub(crate) exercise_url: String,
    pub(crate) data_url: String,
    pub(crate) lms_instance_id: String,
    pub(crate) archived: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Grader {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exercise {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) exercise_id: i64,
    pub(crate) name: String,
    pub(crate) module_url: String,
    pub(crate) api_url: String,
    pub(crate) min_points: i32,
    pub(crate) max_points: Option<i32>,
    pub(crate) total_max_points: i32,
    pub(crate) add_penalty: bool,
    pub(crate) add_auto_grade: bool,
    pub(crate) work_division: WorkDivision,
    pub(crate) num_of_graders: i32,
    pub(crate) feedback_base_primary: Option<String>,
    pub(crate) feedback_base_secondary: Option<String>,
    pub(crate) in_grading: bool,
    pub(crate) grading_ready: bool,
    pub(crate) error_state: Option<String>,
    pub(crate) latest_release: Json<Vec<String>>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Student {
    pub(crate) id: String,
    pub(crate) platform_user_id: i64,
    pub(crate) lms_instance_id: String,
    pub(crate) email: String,
    pub(crate) student_number: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Feedback {
    pub(crate) id: String,
    pub(crate) exercise_id: String,
    pub(crate) sub_id: i64,
    pub(crate) auto_grade: i32,
    pub(crate) penalty: f64,
    pub(crate) grader_id: Option<String>,
    pub(crate) staff_grade: i32,
    pub(crate) feedback: String,
    pub(crate) status: FeedbackStatus,
    pub(crate) released: bool,
    pub(crate) language: GradingLanguage,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
