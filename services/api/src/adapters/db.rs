//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::domain::{
    AnswerMap, Attendance, AttendanceRecord, AttemptRecord, Category, Choice, Department,
    Lecture, LectureFilter, LectureUpdate, NewAttempt, NewLecture, NewQuestion, NewUser,
    ProfileUpdate, Question, QuizAttempt, ScoreTotal, StudentNote, User, UserCredentials,
    UserUpdate,
};
use lms_core::policy::DepartmentScope;
use lms_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => unexpected(e),
    }
}

/// Maps constraint violations on writes to user-facing errors.
fn write_error(conflict: &'static str) -> impl Fn(sqlx::Error) -> PortError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(conflict.to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::Invalid("A referenced record does not exist.".to_string())
        }
        _ => unexpected(e),
    }
}

/// Encodes a scope as `(mode, department)` for the shared SQL predicate
/// `(($1 = 0) OR ($1 = 1 AND col = $2) OR ($1 = 2 AND col IS NULL))`.
fn scope_params(scope: &DepartmentScope) -> (i32, Option<Uuid>) {
    match scope {
        DepartmentScope::All => (0, None),
        DepartmentScope::Department(id) => (1, Some(*id)),
        DepartmentScope::Unassigned => (2, None),
        DepartmentScope::Nothing => (3, None),
    }
}

/// `%term%` for ILIKE, with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, is_teacher, \
    is_superuser, is_active, department_id, date_joined";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_teacher: bool,
    is_superuser: bool,
    is_active: bool,
    department_id: Option<Uuid>,
    date_joined: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_teacher: self.is_teacher,
            is_superuser: self.is_superuser,
            is_active: self.is_active,
            department_id: self.department_id,
            date_joined: self.date_joined,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    hashed_password: String,
    is_active: bool,
}

#[derive(FromRow)]
struct DepartmentRecord {
    id: Uuid,
    name: String,
}

#[derive(FromRow)]
struct CategoryRecord {
    id: Uuid,
    name: String,
    slug: String,
}
impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            slug: self.slug,
        }
    }
}

const LECTURE_COLUMNS: &str = "l.id, l.title, l.description, l.category_id, l.department_id, \
    l.document_path, l.sort_order, l.is_unlocked, l.is_quiz_unlocked, l.created_at";

#[derive(FromRow)]
struct LectureRecord {
    id: Uuid,
    title: String,
    description: String,
    category_id: Option<Uuid>,
    department_id: Option<Uuid>,
    document_path: Option<String>,
    sort_order: i32,
    is_unlocked: bool,
    is_quiz_unlocked: bool,
    created_at: DateTime<Utc>,
}
impl LectureRecord {
    fn to_domain(self) -> Lecture {
        Lecture {
            id: self.id,
            title: self.title,
            description: self.description,
            category_id: self.category_id,
            department_id: self.department_id,
            document_path: self.document_path,
            order: self.sort_order,
            is_unlocked: self.is_unlocked,
            is_quiz_unlocked: self.is_quiz_unlocked,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    lecture_id: Uuid,
    text: String,
    explanation: String,
}

#[derive(FromRow)]
struct ChoiceRecord {
    id: Uuid,
    question_id: Uuid,
    text: String,
    is_correct: bool,
}

const ATTEMPT_COLUMNS: &str =
    "a.id, a.student_id, a.lecture_id, a.score, a.total_questions, a.timestamp, a.is_official_attempt";

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    student_id: Uuid,
    lecture_id: Uuid,
    score: i32,
    total_questions: i32,
    timestamp: DateTime<Utc>,
    is_official_attempt: bool,
}
impl AttemptRow {
    fn to_domain(self) -> QuizAttempt {
        QuizAttempt {
            id: Some(self.id),
            student_id: self.student_id,
            lecture_id: self.lecture_id,
            score: self.score,
            total_questions: self.total_questions,
            timestamp: self.timestamp,
            is_official_attempt: self.is_official_attempt,
        }
    }
}

#[derive(FromRow)]
struct AttemptListingRow {
    #[sqlx(flatten)]
    attempt: AttemptRow,
    username: String,
    lecture_title: String,
}
impl AttemptListingRow {
    fn to_domain(self) -> AttemptRecord {
        AttemptRecord {
            attempt: self.attempt.to_domain(),
            username: self.username,
            lecture_title: self.lecture_title,
        }
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    student_id: Uuid,
    lecture_id: Uuid,
    timestamp: DateTime<Utc>,
    acknowledged: bool,
}
impl AttendanceRow {
    fn to_domain(self) -> Attendance {
        Attendance {
            student_id: self.student_id,
            lecture_id: self.lecture_id,
            timestamp: self.timestamp,
            acknowledged: self.acknowledged,
        }
    }
}

#[derive(FromRow)]
struct AttendanceListingRow {
    #[sqlx(flatten)]
    attendance: AttendanceRow,
    username: String,
    lecture_title: String,
}
impl AttendanceListingRow {
    fn to_domain(self) -> AttendanceRecord {
        AttendanceRecord {
            attendance: self.attendance.to_domain(),
            username: self.username,
            lecture_title: self.lecture_title,
        }
    }
}

#[derive(FromRow)]
struct NoteRecord {
    student_id: Uuid,
    lecture_id: Uuid,
    content: String,
}
impl NoteRecord {
    fn to_domain(self) -> StudentNote {
        StudentNote {
            student_id: self.student_id,
            lecture_id: self.lecture_id,
            content: self.content,
        }
    }
}

#[derive(FromRow)]
struct ScoreTotalRow {
    user_id: Uuid,
    username: String,
    total: Option<i64>,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    // --- User Management ---

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, username, email, first_name, last_name, hashed_password, \
             is_teacher, is_superuser, department_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.username.trim())
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.hashed_password)
            .bind(user.is_teacher)
            .bind(user.is_superuser)
            .bind(user.department_id)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error("A user with that username already exists."))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, hashed_password, is_active FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("User {} not found", username)))?;
        Ok(UserCredentials {
            user_id: record.id,
            username: record.username,
            hashed_password: record.hashed_password,
            is_active: record.is_active,
        })
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY date_joined DESC");
        let records = sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET username = $2, email = $3, first_name = $4, last_name = $5, \
             is_teacher = $6, is_active = $7, department_id = $8 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(update.username.trim())
            .bind(&update.email)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(update.is_teacher)
            .bind(update.is_active)
            .bind(update.department_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error("A user with that username already exists."))?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<User> {
        let sql = format!(
            "UPDATE users SET first_name = $2, last_name = $3, email = $4 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.email)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn set_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE users SET hashed_password = $2 WHERE id = $1")
            .bind(user_id)
            .bind(hashed_password)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    // --- Auth Methods ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Session-scoped quiz answers ---

    async fn stash_attempt_answers(
        &self,
        session_id: &str,
        attempt_id: Uuid,
        answers: &AnswerMap,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO session_answers (session_id, attempt_id, answers) VALUES ($1, $2, $3) \
             ON CONFLICT (session_id, attempt_id) DO UPDATE SET answers = EXCLUDED.answers",
        )
        .bind(session_id)
        .bind(attempt_id)
        .bind(Json(answers))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn attempt_answers(
        &self,
        session_id: &str,
        attempt_id: Uuid,
    ) -> PortResult<Option<AnswerMap>> {
        let answers: Option<Json<AnswerMap>> = sqlx::query_scalar(
            "SELECT answers FROM session_answers WHERE session_id = $1 AND attempt_id = $2",
        )
        .bind(session_id)
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(answers.map(|Json(map)| map))
    }

    // --- Departments & Categories ---

    async fn create_department(&self, name: &str) -> PortResult<Department> {
        let record = sqlx::query_as::<_, DepartmentRecord>(
            "INSERT INTO departments (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("A department with that name already exists."))?;
        Ok(Department {
            id: record.id,
            name: record.name,
        })
    }

    async fn list_departments(&self) -> PortResult<Vec<Department>> {
        let records = sqlx::query_as::<_, DepartmentRecord>(
            "SELECT id, name FROM departments ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| Department {
                id: r.id,
                name: r.name,
            })
            .collect())
    }

    async fn create_category(&self, name: &str, slug: &str) -> PortResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("A category with that name already exists."))?;
        Ok(record.to_domain())
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name, slug FROM categories ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_category_by_slug(&self, slug: &str) -> PortResult<Option<Category>> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name, slug FROM categories WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    // --- Lectures ---

    async fn create_lecture(&self, lecture: NewLecture) -> PortResult<Lecture> {
        let sql = format!(
            "INSERT INTO lectures AS l (id, title, description, category_id, department_id, \
             sort_order, is_unlocked, is_quiz_unlocked) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {LECTURE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, LectureRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(lecture.title.trim())
            .bind(&lecture.description)
            .bind(lecture.category_id)
            .bind(lecture.department_id)
            .bind(lecture.order)
            .bind(lecture.is_unlocked)
            .bind(lecture.is_quiz_unlocked)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error("A lecture with those details already exists."))?;
        Ok(record.to_domain())
    }

    async fn get_lecture(&self, lecture_id: Uuid) -> PortResult<Lecture> {
        let sql = format!("SELECT {LECTURE_COLUMNS} FROM lectures l WHERE l.id = $1");
        let record = sqlx::query_as::<_, LectureRecord>(&sql)
            .bind(lecture_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Lecture {} not found", lecture_id)))?;
        Ok(record.to_domain())
    }

    async fn update_lecture(&self, lecture_id: Uuid, update: LectureUpdate) -> PortResult<Lecture> {
        let sql = format!(
            "UPDATE lectures AS l SET title = $2, description = $3, category_id = $4, \
             department_id = $5, sort_order = $6, is_unlocked = $7, is_quiz_unlocked = $8 \
             WHERE l.id = $1 RETURNING {LECTURE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, LectureRecord>(&sql)
            .bind(lecture_id)
            .bind(update.title.trim())
            .bind(&update.description)
            .bind(update.category_id)
            .bind(update.department_id)
            .bind(update.order)
            .bind(update.is_unlocked)
            .bind(update.is_quiz_unlocked)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error("A lecture with those details already exists."))?
            .ok_or_else(|| PortError::NotFound(format!("Lecture {} not found", lecture_id)))?;
        Ok(record.to_domain())
    }

    async fn set_lecture_document(&self, lecture_id: Uuid, document_path: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE lectures SET document_path = $2 WHERE id = $1")
            .bind(lecture_id)
            .bind(document_path)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lecture {} not found", lecture_id)));
        }
        Ok(())
    }

    async fn delete_lecture(&self, lecture_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM lectures WHERE id = $1")
            .bind(lecture_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Lecture {} not found", lecture_id)));
        }
        Ok(())
    }

    async fn list_lectures(
        &self,
        scope: &DepartmentScope,
        filter: &LectureFilter,
    ) -> PortResult<Vec<Lecture>> {
        let (mode, department_id) = scope_params(scope);
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(like_pattern);
        let slug = filter.category_slug.as_deref().filter(|s| !s.is_empty());

        let sql = format!(
            "SELECT {LECTURE_COLUMNS} FROM lectures l \
             LEFT JOIN categories c ON c.id = l.category_id \
             LEFT JOIN departments d ON d.id = l.department_id \
             WHERE (($1 = 0) OR ($1 = 1 AND l.department_id = $2) OR ($1 = 2 AND l.department_id IS NULL)) \
             AND ($3::TEXT IS NULL OR l.title ILIKE $3 OR l.description ILIKE $3) \
             AND ($4::TEXT IS NULL OR c.slug = $4) \
             ORDER BY CASE WHEN $1 = 0 THEN d.name END NULLS FIRST, l.sort_order ASC, l.created_at ASC"
        );
        let records = sqlx::query_as::<_, LectureRecord>(&sql)
            .bind(mode)
            .bind(department_id)
            .bind(query)
            .bind(slug)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // --- Question bank ---

    async fn questions_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, lecture_id, text, explanation FROM questions \
             WHERE lecture_id = $1 ORDER BY position ASC",
        )
        .bind(lecture_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let choices = sqlx::query_as::<_, ChoiceRecord>(
            "SELECT c.id, c.question_id, c.text, c.is_correct FROM choices c \
             JOIN questions q ON q.id = c.question_id \
             WHERE q.lecture_id = $1 ORDER BY c.position ASC",
        )
        .bind(lecture_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut out: Vec<Question> = questions
            .into_iter()
            .map(|q| Question {
                id: q.id,
                lecture_id: q.lecture_id,
                text: q.text,
                explanation: q.explanation,
                choices: Vec::new(),
            })
            .collect();
        for c in choices {
            if let Some(question) = out.iter_mut().find(|q| q.id == c.question_id) {
                question.choices.push(Choice {
                    id: c.id,
                    question_id: c.question_id,
                    text: c.text,
                    is_correct: c.is_correct,
                });
            }
        }
        Ok(out)
    }

    async fn replace_question_bank(
        &self,
        lecture_id: Uuid,
        questions: Vec<NewQuestion>,
    ) -> PortResult<usize> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Lock the lecture row so concurrent replacements serialize.
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM lectures WHERE id = $1 FOR UPDATE")
                .bind(lecture_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
        if exists.is_none() {
            return Err(PortError::NotFound(format!("Lecture {} not found", lecture_id)));
        }

        // Choices go with their questions (ON DELETE CASCADE).
        sqlx::query("DELETE FROM questions WHERE lecture_id = $1")
            .bind(lecture_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let count = questions.len();
        for (position, question) in questions.into_iter().enumerate() {
            let question_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO questions (id, lecture_id, position, text, explanation) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(question_id)
            .bind(lecture_id)
            .bind(position as i32)
            .bind(&question.text)
            .bind(&question.explanation)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

            for (choice_position, choice) in question.choices.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO choices (id, question_id, position, text, is_correct) \
                     VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(Uuid::new_v4())
                .bind(question_id)
                .bind(choice_position as i32)
                .bind(&choice.text)
                .bind(choice.is_correct)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
            }
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(count)
    }

    // --- Attempts ---

    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<QuizAttempt> {
        // Official iff no earlier attempt exists. The partial unique index turns a
        // concurrent second "first" attempt into a conflict, which is then stored
        // as a retry.
        let returning = "RETURNING id, student_id, lecture_id, score, total_questions, \
                         timestamp, is_official_attempt";
        let official_sql = format!(
            "INSERT INTO quiz_attempts \
             (id, student_id, lecture_id, score, total_questions, is_official_attempt) \
             SELECT $1, $2, $3, $4, $5, NOT EXISTS ( \
                 SELECT 1 FROM quiz_attempts WHERE student_id = $2 AND lecture_id = $3) \
             ON CONFLICT (student_id, lecture_id) WHERE is_official_attempt DO NOTHING \
             {returning}"
        );
        let inserted = sqlx::query_as::<_, AttemptRow>(&official_sql)
            .bind(Uuid::new_v4())
            .bind(attempt.student_id)
            .bind(attempt.lecture_id)
            .bind(attempt.score)
            .bind(attempt.total_questions)
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error("Attempt could not be recorded."))?;
        if let Some(row) = inserted {
            return Ok(row.to_domain());
        }

        let retry_sql = format!(
            "INSERT INTO quiz_attempts \
             (id, student_id, lecture_id, score, total_questions, is_official_attempt) \
             VALUES ($1, $2, $3, $4, $5, FALSE) {returning}"
        );
        let row = sqlx::query_as::<_, AttemptRow>(&retry_sql)
            .bind(Uuid::new_v4())
            .bind(attempt.student_id)
            .bind(attempt.lecture_id)
            .bind(attempt.score)
            .bind(attempt.total_questions)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error("Attempt could not be recorded."))?;
        Ok(row.to_domain())
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> PortResult<QuizAttempt> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts a WHERE a.id = $1");
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Attempt {} not found", attempt_id)))?;
        Ok(row.to_domain())
    }

    async fn attempts_for_student(&self, student_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS}, u.username, l.title AS lecture_title \
             FROM quiz_attempts a JOIN users u ON u.id = a.student_id \
             JOIN lectures l ON l.id = a.lecture_id \
             WHERE a.student_id = $1 ORDER BY a.timestamp DESC"
        );
        let rows = sqlx::query_as::<_, AttemptListingRow>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn attempts_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS}, u.username, l.title AS lecture_title \
             FROM quiz_attempts a JOIN users u ON u.id = a.student_id \
             JOIN lectures l ON l.id = a.lecture_id \
             WHERE a.lecture_id = $1 ORDER BY a.score DESC, a.timestamp ASC"
        );
        let rows = sqlx::query_as::<_, AttemptListingRow>(&sql)
            .bind(lecture_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_attempts(
        &self,
        scope: &DepartmentScope,
        query: Option<&str>,
    ) -> PortResult<Vec<AttemptRecord>> {
        let (mode, department_id) = scope_params(scope);
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS}, u.username, l.title AS lecture_title \
             FROM quiz_attempts a JOIN users u ON u.id = a.student_id \
             JOIN lectures l ON l.id = a.lecture_id \
             WHERE (($1 = 0) OR ($1 = 1 AND l.department_id = $2) OR ($1 = 2 AND l.department_id IS NULL)) \
             AND ($3::TEXT IS NULL OR u.username ILIKE $3 OR l.title ILIKE $3) \
             ORDER BY a.timestamp DESC"
        );
        let rows = sqlx::query_as::<_, AttemptListingRow>(&sql)
            .bind(mode)
            .bind(department_id)
            .bind(query.map(like_pattern))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn official_score_totals(&self, scope: &DepartmentScope) -> PortResult<Vec<ScoreTotal>> {
        let (mode, department_id) = scope_params(scope);
        let rows = sqlx::query_as::<_, ScoreTotalRow>(
            "SELECT u.id AS user_id, u.username, SUM(a.score)::BIGINT AS total \
             FROM users u \
             LEFT JOIN quiz_attempts a ON a.student_id = u.id AND a.is_official_attempt \
             WHERE NOT u.is_superuser AND NOT u.is_teacher \
             AND (($1 = 0) OR ($1 = 1 AND u.department_id = $2) OR ($1 = 2 AND u.department_id IS NULL)) \
             GROUP BY u.id, u.username",
        )
        .bind(mode)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows
            .into_iter()
            .map(|r| ScoreTotal {
                user_id: r.user_id,
                username: r.username,
                total: r.total,
            })
            .collect())
    }

    // --- Notes & Attendance ---

    async fn get_note(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Option<StudentNote>> {
        let record = sqlx::query_as::<_, NoteRecord>(
            "SELECT student_id, lecture_id, content FROM student_notes \
             WHERE student_id = $1 AND lecture_id = $2",
        )
        .bind(student_id)
        .bind(lecture_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn upsert_note(
        &self,
        student_id: Uuid,
        lecture_id: Uuid,
        content: &str,
    ) -> PortResult<StudentNote> {
        let record = sqlx::query_as::<_, NoteRecord>(
            "INSERT INTO student_notes (student_id, lecture_id, content) VALUES ($1, $2, $3) \
             ON CONFLICT (student_id, lecture_id) DO UPDATE SET content = EXCLUDED.content \
             RETURNING student_id, lecture_id, content",
        )
        .bind(student_id)
        .bind(lecture_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error("Note could not be saved."))?;
        Ok(record.to_domain())
    }

    async fn mark_attendance(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Attendance> {
        sqlx::query(
            "INSERT INTO attendance (student_id, lecture_id) VALUES ($1, $2) \
             ON CONFLICT (student_id, lecture_id) DO NOTHING",
        )
        .bind(student_id)
        .bind(lecture_id)
        .execute(&self.pool)
        .await
        .map_err(write_error("Attendance could not be recorded."))?;

        let row = sqlx::query_as::<_, AttendanceRow>(
            "SELECT student_id, lecture_id, timestamp, acknowledged FROM attendance \
             WHERE student_id = $1 AND lecture_id = $2",
        )
        .bind(student_id)
        .bind(lecture_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(row.to_domain())
    }

    async fn has_attended(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM attendance WHERE student_id = $1 AND lecture_id = $2)",
        )
        .bind(student_id)
        .bind(lecture_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn attendance_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query_as::<_, AttendanceListingRow>(
            "SELECT t.student_id, t.lecture_id, t.timestamp, t.acknowledged, \
             u.username, l.title AS lecture_title \
             FROM attendance t JOIN users u ON u.id = t.student_id \
             JOIN lectures l ON l.id = t.lecture_id \
             WHERE t.lecture_id = $1 ORDER BY t.timestamp ASC",
        )
        .bind(lecture_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_attendance(&self, scope: &DepartmentScope) -> PortResult<Vec<AttendanceRecord>> {
        let (mode, department_id) = scope_params(scope);
        let rows = sqlx::query_as::<_, AttendanceListingRow>(
            "SELECT t.student_id, t.lecture_id, t.timestamp, t.acknowledged, \
             u.username, l.title AS lecture_title \
             FROM attendance t JOIN users u ON u.id = t.student_id \
             JOIN lectures l ON l.id = t.lecture_id \
             WHERE (($1 = 0) OR ($1 = 1 AND l.department_id = $2) OR ($1 = 2 AND l.department_id IS NULL)) \
             ORDER BY t.timestamp DESC",
        )
        .bind(mode)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(rows.into_iter().map(|r| r.to_domain()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("fire"), "%fire%");
        assert_eq!(like_pattern("100%_sure"), "%100\\%\\_sure%");
    }

    #[test]
    fn scope_params_cover_every_scope() {
        let id = Uuid::new_v4();
        assert_eq!(scope_params(&DepartmentScope::All), (0, None));
        assert_eq!(scope_params(&DepartmentScope::Department(id)), (1, Some(id)));
        assert_eq!(scope_params(&DepartmentScope::Unassigned), (2, None));
        assert_eq!(scope_params(&DepartmentScope::Nothing), (3, None));
    }
}
