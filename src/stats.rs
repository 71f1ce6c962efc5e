use serde::{Deserialize, Serialize};

use crate::duration;
use crate::models::EnrollmentWithCourse;

/// Summary figures for one user's enrollments.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStats {
    pub total_enrolled: usize,
    pub total_completed: usize,
    pub total_hours: String,
    pub total_certificates: usize,
}

/// Hours count every enrolled course, finished or not, truncated to whole
/// hours. One certificate is issued per completed course.
pub fn compute_stats(enrollments: &[EnrollmentWithCourse]) -> EnrollmentStats {
    let total_completed = enrollments
        .iter()
        .filter(|e| e.enrollment.is_completed)
        .count();
    let total_minutes = enrollments.iter().fold(0u64, |acc, e| {
        acc.saturating_add(duration::parse_minutes(e.course.duration.as_deref()))
    });

    EnrollmentStats {
        total_enrolled: enrollments.len(),
        total_completed,
        total_hours: (total_minutes / 60).to_string(),
        total_certificates: total_completed,
    }
}
