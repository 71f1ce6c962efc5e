use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AlreadyCompleted, Course, CourseGroup, Enrollment, EnrollmentWithCourse, NewCourse,
    NewCourseGroup, Progress,
};

/// Errors surfaced by storage backends.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("already enrolled in this course")]
    DuplicateEnrollment,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    AlreadyCompleted(#[from] AlreadyCompleted),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result of a progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub enrollment: Enrollment,
    /// True only for the update that moved the enrollment to completed.
    pub newly_completed: bool,
}

/// Read access to the course catalog, plus the inserts used to seed it.
///
/// Listings come back in catalog order.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<CourseGroup>, StoreError>;

    /// At most `limit` courses of the group, in catalog order.
    async fn courses_by_group(
        &self,
        group_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Course>, StoreError>;

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError>;

    async fn create_group(&self, group: NewCourseGroup) -> Result<CourseGroup, StoreError>;

    /// # Errors
    ///
    /// `StoreError::NotFound` if `group_id` names a group that does not exist.
    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError>;
}

/// Owner of enrollment records and their progress state.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn get_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError>;

    /// Creates the one enrollment allowed for `(user_id, course_id)`.
    ///
    /// # Errors
    ///
    /// `StoreError::DuplicateEnrollment` if the pair is already enrolled, decided
    /// atomically by the backend. `StoreError::NotFound` if the course does not
    /// exist.
    async fn create_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Enrollment, StoreError>;

    /// Replaces progress in a single atomic step and derives completion from it.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if there is no such enrollment,
    /// `StoreError::AlreadyCompleted` if a completed enrollment would drop
    /// below 100.
    async fn update_progress(
        &self,
        user_id: &str,
        course_id: Uuid,
        progress: Progress,
    ) -> Result<ProgressUpdate, StoreError>;

    /// The user's enrollments with their courses, most recently enrolled first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentWithCourse>, StoreError>;
}

/// Behaviour every backend must show, run against each store's tests.
///
/// Each case works on its own users, groups and courses, so the same
/// database can be reused across runs.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use futures::future::join_all;

    fn user() -> String {
        format!("user-{}", Uuid::new_v4())
    }

    fn pct(v: f64) -> Progress {
        Progress::new(v).unwrap()
    }

    async fn group<S: CatalogStore>(store: &S) -> CourseGroup {
        store
            .create_group(NewCourseGroup {
                name: "Backend".into(),
                description: None,
            })
            .await
            .unwrap()
    }

    async fn course<S: CatalogStore>(store: &S, group: &CourseGroup, title: &str) -> Course {
        store
            .create_course(NewCourse {
                title: title.into(),
                description: None,
                thumbnail_url: None,
                duration: Some("2h 30m".into()),
                group_id: Some(group.id),
            })
            .await
            .unwrap()
    }

    async fn one_course<S: CatalogStore>(store: &S) -> Course {
        let group = group(store).await;
        course(store, &group, "Rust").await
    }

    pub async fn duplicate_enrollment_is_rejected<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        store.create_enrollment(&u, rust.id).await.unwrap();
        let err = store.create_enrollment(&u, rust.id).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEnrollment));
        assert_eq!(store.list_for_user(&u).await.unwrap().len(), 1);
    }

    pub async fn concurrent_enrollment_creates_one_record<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        let attempts = (0..8).map(|_| store.create_enrollment(&u, rust.id));
        let results = join_all(attempts).await;

        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::DuplicateEnrollment)));
        assert_eq!(store.list_for_user(&u).await.unwrap().len(), 1);
    }

    pub async fn enrolling_in_unknown_course_is_not_found<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let err = store
            .create_enrollment(&user(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("course")));
    }

    pub async fn get_enrollment_is_per_user<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let (u1, u2) = (user(), user());
        let created = store.create_enrollment(&u1, rust.id).await.unwrap();
        assert_eq!(created.progress, 0.0);
        assert!(!created.is_completed);
        assert_eq!(created.completed_at, None);

        let found = store.get_enrollment(&u1, rust.id).await.unwrap();
        assert_eq!(found, Some(created));
        assert!(store.get_enrollment(&u2, rust.id).await.unwrap().is_none());
    }

    pub async fn progress_update_completes_once<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        store.create_enrollment(&u, rust.id).await.unwrap();

        let half = store.update_progress(&u, rust.id, pct(50.0)).await.unwrap();
        assert!(!half.newly_completed);
        assert!(!half.enrollment.is_completed);
        assert_eq!(half.enrollment.completed_at, None);

        let done = store.update_progress(&u, rust.id, pct(100.0)).await.unwrap();
        assert!(done.newly_completed);
        let completed_at = done.enrollment.completed_at.expect("completed_at set");

        let again = store.update_progress(&u, rust.id, pct(100.0)).await.unwrap();
        assert!(!again.newly_completed);
        assert_eq!(again.enrollment.completed_at, Some(completed_at));

        let stored = store.get_enrollment(&u, rust.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 100.0);
        assert!(stored.is_completed);
        assert_eq!(stored.completed_at, Some(completed_at));
    }

    pub async fn fractional_progress_is_kept<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        store.create_enrollment(&u, rust.id).await.unwrap();
        store.update_progress(&u, rust.id, pct(33.333)).await.unwrap();

        let stored = store.get_enrollment(&u, rust.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 33.33);
        assert!(!stored.is_completed);
    }

    pub async fn progress_update_without_enrollment_is_not_found<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let err = store
            .update_progress(&user(), rust.id, pct(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("enrollment")));
    }

    pub async fn completed_enrollment_cannot_regress<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        store.create_enrollment(&u, rust.id).await.unwrap();
        store.update_progress(&u, rust.id, pct(100.0)).await.unwrap();
        let err = store
            .update_progress(&u, rust.id, pct(20.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyCompleted(_)));

        let stored = store.get_enrollment(&u, rust.id).await.unwrap().unwrap();
        assert_eq!(stored.progress, 100.0);
        assert!(stored.completed_at.is_some());
    }

    pub async fn concurrent_progress_keeps_completion_consistent<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let rust = one_course(store).await;
        let u = user();
        store.create_enrollment(&u, rust.id).await.unwrap();

        let values = (0..20u8).map(|i| if i % 4 == 0 { 100.0 } else { f64::from(i) * 4.5 });
        let updates = values.map(|v| store.update_progress(&u, rust.id, pct(v)));
        let results = join_all(updates).await;

        let newly_completed = results
            .iter()
            .filter(|r| matches!(r, Ok(update) if update.newly_completed))
            .count();
        assert_eq!(newly_completed, 1);
        for r in &results {
            match r {
                Ok(update) => {
                    let e = &update.enrollment;
                    assert_eq!(e.is_completed, e.progress >= 100.0);
                    assert_eq!(e.completed_at.is_some(), e.is_completed);
                }
                Err(e) => assert!(matches!(e, StoreError::AlreadyCompleted(_)), "{e}"),
            }
        }

        let stored = store.get_enrollment(&u, rust.id).await.unwrap().unwrap();
        assert!(stored.is_completed);
        assert_eq!(stored.progress, 100.0);
        assert!(stored.completed_at.is_some());
    }

    pub async fn listing_is_most_recent_first<S>(store: &S)
    where
        S: CatalogStore + EnrollmentStore,
    {
        let group = group(store).await;
        let rust = course(store, &group, "Rust").await;
        let sql = course(store, &group, "SQL").await;
        let (u1, u2) = (user(), user());
        store.create_enrollment(&u1, rust.id).await.unwrap();
        store.create_enrollment(&u1, sql.id).await.unwrap();
        store.create_enrollment(&u2, rust.id).await.unwrap();

        let rows = store.list_for_user(&u1).await.unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.course.title.as_str()).collect();
        assert_eq!(titles, ["SQL", "Rust"]);
        assert!(rows.iter().all(|r| r.enrollment.user_id == u1));
        assert_eq!(rows[1].course, rust);

        assert!(store.list_for_user(&user()).await.unwrap().is_empty());
    }

    pub async fn courses_respect_limit_and_order<S: CatalogStore>(store: &S) {
        let group = group(store).await;
        for i in 0..4 {
            course(store, &group, &format!("c{i}")).await;
        }
        let courses = store.courses_by_group(group.id, 3).await.unwrap();
        let titles: Vec<_> = courses.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["c0", "c1", "c2"]);

        let found = store.get_course(courses[0].id).await.unwrap();
        assert_eq!(found.as_ref(), Some(&courses[0]));
        assert!(store.get_course(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.list_groups().await.unwrap().contains(&group));
    }

    pub async fn course_in_unknown_group_is_rejected<S: CatalogStore>(store: &S) {
        let err = store
            .create_course(NewCourse {
                title: "orphan".into(),
                description: None,
                thumbnail_url: None,
                duration: None,
                group_id: Some(Uuid::new_v4()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("course group")));
    }
}
