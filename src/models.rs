use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseGroup {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>, // free text, e.g. "8h 30m"
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A user's enrollment in one course.
///
/// `is_completed` holds exactly when `progress >= 100`, and `completed_at` is
/// set exactly when `is_completed` is. Once completed, an enrollment stays
/// completed.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: Uuid,
    pub progress: f64,
    pub is_completed: bool,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(user_id: impl Into<String>, course_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            course_id,
            progress: 0.0,
            is_completed: false,
            enrolled_at: now,
            completed_at: None,
        }
    }

    /// Replaces the progress and derives the completion fields from it.
    ///
    /// Returns `true` when this update is the one that completed the course.
    /// A completed enrollment rejects any progress below 100.
    pub fn apply_progress(
        &mut self,
        progress: Progress,
        now: DateTime<Utc>,
    ) -> Result<bool, AlreadyCompleted> {
        if self.is_completed && !progress.is_complete() {
            return Err(AlreadyCompleted);
        }
        let newly_completed = progress.is_complete() && !self.is_completed;
        self.progress = progress.value();
        self.is_completed = progress.is_complete();
        if newly_completed {
            self.completed_at = Some(now);
        }
        Ok(newly_completed)
    }
}

/// Enrollment joined with the course it refers to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: Course,
}

/// A completion percentage within `[0, 100]`, kept to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Progress(f64);

impl Progress {
    pub const MAX: f64 = 100.0;

    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || !(0.0..=Self::MAX).contains(&value) {
            return Err(ValidationError::new(
                "progress must be a number between 0 and 100",
            ));
        }
        Ok(Self((value * 100.0).round() / 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_complete(self) -> bool {
        self.0 >= Self::MAX
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("course already completed; progress cannot drop below 100")]
pub struct AlreadyCompleted;

// --- request payloads ---

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnrollmentReq {
    /// Defaults to the caller; must match it when given.
    #[serde(default)]
    pub user_id: Option<String>,
    pub course_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressReq {
    #[serde(default)]
    pub user_id: Option<String>,
    pub progress: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseGroup {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>,
    pub group_id: Option<Uuid>,
}

const MAX_NAME_LEN: usize = 255;

fn validate_name(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(format!("{field} is required")));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::new(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

impl NewCourseGroup {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("name", &self.name)
    }
}

impl NewCourse {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("title", &self.title)
    }
}
