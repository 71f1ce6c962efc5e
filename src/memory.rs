use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    Course, CourseGroup, Enrollment, EnrollmentWithCourse, NewCourse, NewCourseGroup, Progress,
};
use crate::store::{CatalogStore, EnrollmentStore, ProgressUpdate, StoreError};

/// Process-local store for running without Postgres and for tests.
///
/// Everything sits behind one mutex, so each operation is atomic with
/// respect to every other.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    // insertion order is catalog order
    groups: Vec<CourseGroup>,
    courses: Vec<Course>,
    // insertion order breaks ties between equal enrolled_at
    enrollments: Vec<Enrollment>,
}

impl Inner {
    fn enrollment(&self, user_id: &str, course_id: Uuid) -> Option<&Enrollment> {
        self.enrollments
            .iter()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
    }

    fn enrollment_mut(&mut self, user_id: &str, course_id: Uuid) -> Option<&mut Enrollment> {
        self.enrollments
            .iter_mut()
            .find(|e| e.user_id == user_id && e.course_id == course_id)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_groups(&self) -> Result<Vec<CourseGroup>, StoreError> {
        Ok(self.lock()?.groups.clone())
    }

    async fn courses_by_group(
        &self,
        group_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Course>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .courses
            .iter()
            .filter(|c| c.group_id == Some(group_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        Ok(self.lock()?.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn create_group(&self, group: NewCourseGroup) -> Result<CourseGroup, StoreError> {
        let rec = CourseGroup {
            id: Uuid::new_v4(),
            name: group.name,
            description: group.description,
            created_at: Utc::now(),
        };
        self.lock()?.groups.push(rec.clone());
        Ok(rec)
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        let mut guard = self.lock()?;
        if let Some(group_id) = course.group_id {
            if !guard.groups.iter().any(|g| g.id == group_id) {
                return Err(StoreError::NotFound("course group"));
            }
        }
        let rec = Course {
            id: Uuid::new_v4(),
            title: course.title,
            description: course.description,
            thumbnail_url: course.thumbnail_url,
            duration: course.duration,
            group_id: course.group_id,
            created_at: Utc::now(),
        };
        guard.courses.push(rec.clone());
        Ok(rec)
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn get_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.lock()?.enrollment(user_id, course_id).cloned())
    }

    async fn create_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Enrollment, StoreError> {
        let mut guard = self.lock()?;
        if !guard.courses.iter().any(|c| c.id == course_id) {
            return Err(StoreError::NotFound("course"));
        }
        if guard.enrollment(user_id, course_id).is_some() {
            return Err(StoreError::DuplicateEnrollment);
        }
        let rec = Enrollment::new(user_id, course_id, Utc::now());
        guard.enrollments.push(rec.clone());
        Ok(rec)
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_id: Uuid,
        progress: Progress,
    ) -> Result<ProgressUpdate, StoreError> {
        let mut guard = self.lock()?;
        let enrollment = guard
            .enrollment_mut(user_id, course_id)
            .ok_or(StoreError::NotFound("enrollment"))?;
        let newly_completed = enrollment.apply_progress(progress, Utc::now())?;
        Ok(ProgressUpdate {
            enrollment: enrollment.clone(),
            newly_completed,
        })
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentWithCourse>, StoreError> {
        let guard = self.lock()?;
        let mut rows = Vec::new();
        for enrollment in guard.enrollments.iter().rev() {
            if enrollment.user_id != user_id {
                continue;
            }
            let course = guard
                .courses
                .iter()
                .find(|c| c.id == enrollment.course_id)
                .cloned()
                .ok_or(StoreError::NotFound("course"))?;
            rows.push(EnrollmentWithCourse {
                enrollment: enrollment.clone(),
                course,
            });
        }
        // stable: newest insertion stays first among equal timestamps
        rows.sort_by(|a, b| b.enrollment.enrolled_at.cmp(&a.enrollment.enrolled_at));
        Ok(rows)
    }
}
