pub(crate) mod courses;
pub(crate) mod exercises;
pub(crate) mod feedbacks;
pub(crate) mod graders;
pub(crate) mod students;
