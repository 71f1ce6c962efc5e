use futures::{stream, StreamExt, TryStreamExt};
use serde::{Serialize, Serializer};

use crate::models::{Course, CourseGroup, Enrollment};
use crate::store::{CatalogStore, EnrollmentStore, StoreError};

/// Courses shown per group on the dashboard.
pub const COURSES_PER_GROUP: usize = 5;

/// Where a user stands with a course. Always derived, never stored.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourseState {
    New,
    InProgress,
    Completed,
}

impl CourseState {
    pub fn of(enrollment: Option<&Enrollment>) -> Self {
        match enrollment {
            None => Self::New,
            Some(e) if e.is_completed => Self::Completed,
            Some(_) => Self::InProgress,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardCourse {
    pub course: Course,
    pub enrollment: Option<Enrollment>,
}

impl DashboardCourse {
    pub fn state(&self) -> CourseState {
        CourseState::of(self.enrollment.as_ref())
    }
}

impl Serialize for DashboardCourse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(flatten)]
            course: &'a Course,
            enrollment: Option<&'a Enrollment>,
            state: CourseState,
        }
        Wire {
            course: &self.course,
            enrollment: self.enrollment.as_ref(),
            state: self.state(),
        }
        .serialize(serializer)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DashboardGroup {
    #[serde(flatten)]
    pub group: CourseGroup,
    pub courses: Vec<DashboardCourse>,
}

/// Joins every catalog group and its first courses with `user_id`'s enrollments.
///
/// Lookups run concurrently, at most `concurrency` at a time, and the result
/// keeps catalog order. Any failed lookup fails the whole dashboard.
pub async fn build_dashboard(
    catalog: &dyn CatalogStore,
    enrollments: &dyn EnrollmentStore,
    user_id: &str,
    concurrency: usize,
) -> Result<Vec<DashboardGroup>, StoreError> {
    let concurrency = concurrency.max(1);
    let groups = catalog.list_groups().await?;

    let shelf_lookups: Vec<_> = groups
        .iter()
        .map(|g| catalog.courses_by_group(g.id, COURSES_PER_GROUP))
        .collect();
    let shelves: Vec<Vec<Course>> = stream::iter(shelf_lookups)
        .buffered(concurrency)
        .try_collect()
        .await?;

    let enrollment_lookups: Vec<_> = shelves
        .iter()
        .flatten()
        .map(|c| enrollments.get_enrollment(user_id, c.id))
        .collect();
    let found: Vec<Option<Enrollment>> = stream::iter(enrollment_lookups)
        .buffered(concurrency)
        .try_collect()
        .await?;

    let mut found = found.into_iter();
    let dashboard = groups
        .into_iter()
        .zip(shelves)
        .map(|(group, courses)| DashboardGroup {
            group,
            courses: courses
                .into_iter()
                .map(|course| DashboardCourse {
                    course,
                    enrollment: found.next().flatten(),
                })
                .collect(),
        })
        .collect();
    Ok(dashboard)
}
