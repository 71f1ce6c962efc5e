use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{query_as, query_scalar, Pool, Postgres};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{
    AlreadyCompleted, Course, CourseGroup, Enrollment, EnrollmentWithCourse, NewCourse,
    NewCourseGroup, Progress,
};
use crate::store::{CatalogStore, EnrollmentStore, ProgressUpdate, StoreError};

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Db> {
    Ok(PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?)
}

const ENROLLMENT_COLUMNS: &str =
    "id, user_id, course_id, progress, is_completed, enrolled_at, completed_at";

/// Postgres-backed catalog and enrollment store.
///
/// Uniqueness of `(user_id, course_id)` and the completion invariants are
/// enforced by the schema; every mutation is a single statement.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn is_fk_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_groups(&self) -> Result<Vec<CourseGroup>, StoreError> {
        let groups = query_as::<_, CourseGroup>(
            "SELECT id, name, description, created_at FROM course_groups ORDER BY created_at, name",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(groups)
    }

    async fn courses_by_group(
        &self,
        group_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Course>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let courses = query_as::<_, Course>(
            r#"
            SELECT id, title, description, thumbnail_url, duration, group_id, created_at
            FROM courses
            WHERE group_id = $1
            ORDER BY created_at, title
            LIMIT $2
            "#,
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;
        Ok(courses)
    }

    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StoreError> {
        let course = query_as::<_, Course>(
            r#"
            SELECT id, title, description, thumbnail_url, duration, group_id, created_at
            FROM courses WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(course)
    }

    async fn create_group(&self, group: NewCourseGroup) -> Result<CourseGroup, StoreError> {
        let rec = query_as::<_, CourseGroup>(
            r#"
            INSERT INTO course_groups (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(group.name)
        .bind(group.description)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn create_course(&self, course: NewCourse) -> Result<Course, StoreError> {
        query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, title, description, thumbnail_url, duration, group_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, description, thumbnail_url, duration, group_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course.title)
        .bind(course.description)
        .bind(course.thumbnail_url)
        .bind(course.duration)
        .bind(course.group_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                StoreError::NotFound("course group")
            } else {
                e.into()
            }
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    #[sqlx(flatten)]
    enrollment: Enrollment,
    was_completed: bool,
}

#[derive(sqlx::FromRow)]
struct EnrollmentCourseRow {
    #[sqlx(flatten)]
    enrollment: Enrollment,
    c_title: String,
    c_description: Option<String>,
    c_thumbnail_url: Option<String>,
    c_duration: Option<String>,
    c_group_id: Option<Uuid>,
    c_created_at: DateTime<Utc>,
}

impl From<EnrollmentCourseRow> for EnrollmentWithCourse {
    fn from(row: EnrollmentCourseRow) -> Self {
        let course = Course {
            id: row.enrollment.course_id,
            title: row.c_title,
            description: row.c_description,
            thumbnail_url: row.c_thumbnail_url,
            duration: row.c_duration,
            group_id: row.c_group_id,
            created_at: row.c_created_at,
        };
        Self {
            enrollment: row.enrollment,
            course,
        }
    }
}

#[async_trait]
impl EnrollmentStore for PgStore {
    async fn get_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>, StoreError> {
        let sql = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE user_id = $1 AND course_id = $2"
        );
        let rec = query_as::<_, Enrollment>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(rec)
    }

    async fn create_enrollment(
        &self,
        user_id: &str,
        course_id: Uuid,
    ) -> Result<Enrollment, StoreError> {
        // The unique constraint decides duplicates; no prior read.
        let sql = format!(
            r#"
            INSERT INTO enrollments (id, user_id, course_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, course_id) DO NOTHING
            RETURNING {ENROLLMENT_COLUMNS}
            "#
        );
        let rec = query_as::<_, Enrollment>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| {
                if is_fk_violation(&e) {
                    StoreError::NotFound("course")
                } else {
                    StoreError::from(e)
                }
            })?;
        rec.ok_or(StoreError::DuplicateEnrollment)
    }

    async fn update_progress(
        &self,
        user_id: &str,
        course_id: Uuid,
        progress: Progress,
    ) -> Result<ProgressUpdate, StoreError> {
        // completed_at keeps its first value; completed rows only accept 100.
        let row = query_as::<_, ProgressRow>(
            r#"
            WITH prev AS (
                SELECT id, is_completed AS was_completed
                FROM enrollments
                WHERE user_id = $1 AND course_id = $2
                FOR UPDATE
            )
            UPDATE enrollments e
            SET progress = $3,
                is_completed = $3 >= 100,
                completed_at = CASE WHEN $3 >= 100 THEN COALESCE(e.completed_at, now()) END
            FROM prev
            WHERE e.id = prev.id AND (NOT prev.was_completed OR $3 >= 100)
            RETURNING e.id, e.user_id, e.course_id, e.progress, e.is_completed,
                      e.enrolled_at, e.completed_at, prev.was_completed
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(progress.value())
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = row {
            let newly_completed = row.enrollment.is_completed && !row.was_completed;
            return Ok(ProgressUpdate {
                enrollment: row.enrollment,
                newly_completed,
            });
        }

        // Nothing updated: either no such enrollment or a rejected regression.
        let completed: Option<bool> = query_scalar::<_, bool>(
            "SELECT is_completed FROM enrollments WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;
        match completed {
            Some(true) => Err(AlreadyCompleted.into()),
            _ => Err(StoreError::NotFound("enrollment")),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<EnrollmentWithCourse>, StoreError> {
        let rows = query_as::<_, EnrollmentCourseRow>(
            r#"
            SELECT e.id, e.user_id, e.course_id, e.progress, e.is_completed,
                   e.enrolled_at, e.completed_at,
                   c.title AS c_title, c.description AS c_description,
                   c.thumbnail_url AS c_thumbnail_url, c.duration AS c_duration,
                   c.group_id AS c_group_id, c.created_at AS c_created_at
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = $1
            ORDER BY e.enrolled_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(EnrollmentWithCourse::from).collect())
    }
}
