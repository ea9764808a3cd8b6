//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Selected with
//! `DATABASE_URL=memory://` for local runs, and used by the integration tests.
//! It mirrors the PostgreSQL adapter's ordering, uniqueness and cascade rules.

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
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    departments: Vec<Department>,
    /// Users with their password hashes.
    users: Vec<(User, String)>,
    auth_sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    session_answers: HashMap<(String, Uuid), AnswerMap>,
    categories: Vec<Category>,
    lectures: Vec<Lecture>,
    /// In bank order.
    questions: Vec<Question>,
    /// In insertion order.
    attempts: Vec<QuizAttempt>,
    notes: HashMap<(Uuid, Uuid), String>,
    attendance: Vec<Attendance>,
}

impl State {
    fn user(&self, user_id: Uuid) -> PortResult<&User> {
        self.users
            .iter()
            .map(|(u, _)| u)
            .find(|u| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut (User, String)> {
        self.users
            .iter_mut()
            .find(|(u, _)| u.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn lecture(&self, lecture_id: Uuid) -> PortResult<&Lecture> {
        self.lectures
            .iter()
            .find(|l| l.id == lecture_id)
            .ok_or_else(|| PortError::NotFound(format!("Lecture {} not found", lecture_id)))
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|(u, _)| u.username == username && Some(u.id) != except)
    }

    fn check_department(&self, department_id: Option<Uuid>) -> PortResult<()> {
        match department_id {
            Some(id) if !self.departments.iter().any(|d| d.id == id) => Err(
                PortError::Invalid("A referenced record does not exist.".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn check_category(&self, category_id: Option<Uuid>) -> PortResult<()> {
        match category_id {
            Some(id) if !self.categories.iter().any(|c| c.id == id) => Err(
                PortError::Invalid("A referenced record does not exist.".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn attempt_record(&self, attempt: &QuizAttempt) -> AttemptRecord {
        AttemptRecord {
            attempt: attempt.clone(),
            username: self
                .user(attempt.student_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            lecture_title: self
                .lecture(attempt.lecture_id)
                .map(|l| l.title.clone())
                .unwrap_or_default(),
        }
    }

    fn attendance_record(&self, attendance: &Attendance) -> AttendanceRecord {
        AttendanceRecord {
            attendance: attendance.clone(),
            username: self
                .user(attendance.student_id)
                .map(|u| u.username.clone())
                .unwrap_or_default(),
            lecture_title: self
                .lecture(attendance.lecture_id)
                .map(|l| l.title.clone())
                .unwrap_or_default(),
        }
    }

    fn department_name(&self, department_id: Option<Uuid>) -> Option<&str> {
        let id = department_id?;
        self.departments
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.as_str())
    }

    /// Drops attempts matching `pred` along with any answers stashed for them.
    fn remove_attempts(&mut self, pred: impl Fn(&QuizAttempt) -> bool) {
        let removed: Vec<Uuid> = self
            .attempts
            .iter()
            .filter(|a| pred(a))
            .filter_map(|a| a.id)
            .collect();
        self.attempts.retain(|a| !pred(a));
        self.session_answers
            .retain(|(_, attempt_id), _| !removed.contains(attempt_id));
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Newest first; among equal timestamps the later insert wins.
fn newest_first<T>(mut items: Vec<T>, timestamp: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.reverse();
    items.sort_by(|a, b| timestamp(b).cmp(&timestamp(a)));
    items
}

/// A `DatabaseService` backed by a single mutex-guarded state.
#[derive(Default)]
pub struct InMemoryDb {
    state: Mutex<State>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> PortResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| PortError::Unexpected("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    // --- User Management ---

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        let mut state = self.state()?;
        let username = user.username.trim().to_string();
        if state.username_taken(&username, None) {
            return Err(PortError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }
        state.check_department(user.department_id)?;
        let created = User {
            id: Uuid::new_v4(),
            username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_teacher: user.is_teacher,
            is_superuser: user.is_superuser,
            is_active: true,
            department_id: user.department_id,
            date_joined: Utc::now(),
        };
        state.users.push((created.clone(), user.hashed_password));
        Ok(created)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.state()?.user(user_id).cloned()
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let state = self.state()?;
        state
            .users
            .iter()
            .find(|(u, _)| u.username == username)
            .map(|(u, hash)| UserCredentials {
                user_id: u.id,
                username: u.username.clone(),
                hashed_password: hash.clone(),
                is_active: u.is_active,
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let state = self.state()?;
        let users = state.users.iter().map(|(u, _)| u.clone()).collect();
        Ok(newest_first(users, |u: &User| u.date_joined))
    }

    async fn update_user(&self, user_id: Uuid, update: UserUpdate) -> PortResult<User> {
        let mut state = self.state()?;
        let username = update.username.trim().to_string();
        state.user(user_id)?;
        if state.username_taken(&username, Some(user_id)) {
            return Err(PortError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }
        state.check_department(update.department_id)?;
        let (user, _) = state.user_mut(user_id)?;
        user.username = username;
        user.email = update.email;
        user.first_name = update.first_name;
        user.last_name = update.last_name;
        user.is_teacher = update.is_teacher;
        user.is_active = update.is_active;
        user.department_id = update.department_id;
        Ok(user.clone())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<User> {
        let mut state = self.state()?;
        let (user, _) = state.user_mut(user_id)?;
        user.first_name = update.first_name;
        user.last_name = update.last_name;
        user.email = update.email;
        Ok(user.clone())
    }

    async fn set_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut state = self.state()?;
        let (_, hash) = state.user_mut(user_id)?;
        *hash = hashed_password.to_string();
        Ok(())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut state = self.state()?;
        state.user(user_id)?;
        state.users.retain(|(u, _)| u.id != user_id);

        let sessions: Vec<String> = state
            .auth_sessions
            .iter()
            .filter(|(_, (owner, _))| *owner == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        for session in &sessions {
            state.auth_sessions.remove(session);
        }
        state
            .session_answers
            .retain(|(session, _), _| !sessions.contains(session));
        state.remove_attempts(|a| a.student_id == user_id);
        state.notes.retain(|(student, _), _| *student != user_id);
        state.attendance.retain(|a| a.student_id != user_id);
        Ok(())
    }

    // --- Auth Methods ---

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut state = self.state()?;
        state.user(user_id)?;
        state
            .auth_sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let state = self.state()?;
        match state.auth_sessions.get(session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut state = self.state()?;
        state.auth_sessions.remove(session_id);
        state
            .session_answers
            .retain(|(session, _), _| session != session_id);
        Ok(())
    }

    // --- Session-scoped quiz answers ---

    async fn stash_attempt_answers(
        &self,
        session_id: &str,
        attempt_id: Uuid,
        answers: &AnswerMap,
    ) -> PortResult<()> {
        let mut state = self.state()?;
        if !state.auth_sessions.contains_key(session_id) {
            return Err(PortError::Unauthorized);
        }
        state
            .session_answers
            .insert((session_id.to_string(), attempt_id), answers.clone());
        Ok(())
    }

    async fn attempt_answers(
        &self,
        session_id: &str,
        attempt_id: Uuid,
    ) -> PortResult<Option<AnswerMap>> {
        let state = self.state()?;
        Ok(state
            .session_answers
            .get(&(session_id.to_string(), attempt_id))
            .cloned())
    }

    // --- Departments & Categories ---

    async fn create_department(&self, name: &str) -> PortResult<Department> {
        let mut state = self.state()?;
        if state.departments.iter().any(|d| d.name == name) {
            return Err(PortError::Conflict(
                "A department with that name already exists.".to_string(),
            ));
        }
        let department = Department {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        state.departments.push(department.clone());
        Ok(department)
    }

    async fn list_departments(&self) -> PortResult<Vec<Department>> {
        let mut departments = self.state()?.departments.clone();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn create_category(&self, name: &str, slug: &str) -> PortResult<Category> {
        let mut state = self.state()?;
        if state
            .categories
            .iter()
            .any(|c| c.name == name || c.slug == slug)
        {
            return Err(PortError::Conflict(
                "A category with that name already exists.".to_string(),
            ));
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        let mut categories = self.state()?.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category_by_slug(&self, slug: &str) -> PortResult<Option<Category>> {
        let state = self.state()?;
        Ok(state.categories.iter().find(|c| c.slug == slug).cloned())
    }

    // --- Lectures ---

    async fn create_lecture(&self, lecture: NewLecture) -> PortResult<Lecture> {
        let mut state = self.state()?;
        state.check_department(lecture.department_id)?;
        state.check_category(lecture.category_id)?;
        let created = Lecture {
            id: Uuid::new_v4(),
            title: lecture.title.trim().to_string(),
            description: lecture.description,
            category_id: lecture.category_id,
            department_id: lecture.department_id,
            document_path: None,
            order: lecture.order,
            is_unlocked: lecture.is_unlocked,
            is_quiz_unlocked: lecture.is_quiz_unlocked,
            created_at: Utc::now(),
        };
        state.lectures.push(created.clone());
        Ok(created)
    }

    async fn get_lecture(&self, lecture_id: Uuid) -> PortResult<Lecture> {
        self.state()?.lecture(lecture_id).cloned()
    }

    async fn update_lecture(&self, lecture_id: Uuid, update: LectureUpdate) -> PortResult<Lecture> {
        let mut state = self.state()?;
        state.lecture(lecture_id)?;
        state.check_department(update.department_id)?;
        state.check_category(update.category_id)?;
        let lecture = state
            .lectures
            .iter_mut()
            .find(|l| l.id == lecture_id)
            .ok_or_else(|| PortError::NotFound(format!("Lecture {} not found", lecture_id)))?;
        lecture.title = update.title.trim().to_string();
        lecture.description = update.description;
        lecture.category_id = update.category_id;
        lecture.department_id = update.department_id;
        lecture.order = update.order;
        lecture.is_unlocked = update.is_unlocked;
        lecture.is_quiz_unlocked = update.is_quiz_unlocked;
        Ok(lecture.clone())
    }

    async fn set_lecture_document(&self, lecture_id: Uuid, document_path: &str) -> PortResult<()> {
        let mut state = self.state()?;
        let lecture = state
            .lectures
            .iter_mut()
            .find(|l| l.id == lecture_id)
            .ok_or_else(|| PortError::NotFound(format!("Lecture {} not found", lecture_id)))?;
        lecture.document_path = Some(document_path.to_string());
        Ok(())
    }

    async fn delete_lecture(&self, lecture_id: Uuid) -> PortResult<()> {
        let mut state = self.state()?;
        state.lecture(lecture_id)?;
        state.lectures.retain(|l| l.id != lecture_id);
        state.questions.retain(|q| q.lecture_id != lecture_id);
        state.remove_attempts(|a| a.lecture_id == lecture_id);
        state.notes.retain(|(_, lecture), _| *lecture != lecture_id);
        state.attendance.retain(|a| a.lecture_id != lecture_id);
        Ok(())
    }

    async fn list_lectures(
        &self,
        scope: &DepartmentScope,
        filter: &LectureFilter,
    ) -> PortResult<Vec<Lecture>> {
        let state = self.state()?;
        let query = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let category = match filter.category_slug.as_deref().filter(|s| !s.is_empty()) {
            Some(slug) => match state.categories.iter().find(|c| c.slug == slug) {
                Some(c) => Some(c.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let mut lectures: Vec<Lecture> = state
            .lectures
            .iter()
            .filter(|l| scope.admits(l.department_id))
            .filter(|l| {
                query.map_or(true, |q| {
                    contains_ignore_case(&l.title, q) || contains_ignore_case(&l.description, q)
                })
            })
            .filter(|l| category.map_or(true, |id| l.category_id == Some(id)))
            .cloned()
            .collect();

        lectures.sort_by(|a, b| {
            let by_department = if *scope == DepartmentScope::All {
                state
                    .department_name(a.department_id)
                    .cmp(&state.department_name(b.department_id))
            } else {
                std::cmp::Ordering::Equal
            };
            by_department
                .then(a.order.cmp(&b.order))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(lectures)
    }

    // --- Question bank ---

    async fn questions_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<Question>> {
        let state = self.state()?;
        Ok(state
            .questions
            .iter()
            .filter(|q| q.lecture_id == lecture_id)
            .cloned()
            .collect())
    }

    async fn replace_question_bank(
        &self,
        lecture_id: Uuid,
        questions: Vec<NewQuestion>,
    ) -> PortResult<usize> {
        let mut state = self.state()?;
        state.lecture(lecture_id)?;
        state.questions.retain(|q| q.lecture_id != lecture_id);
        let count = questions.len();
        for new in questions {
            let question_id = Uuid::new_v4();
            state.questions.push(Question {
                id: question_id,
                lecture_id,
                text: new.text,
                explanation: new.explanation,
                choices: new
                    .choices
                    .into_iter()
                    .map(|c| Choice {
                        id: Uuid::new_v4(),
                        question_id,
                        text: c.text,
                        is_correct: c.is_correct,
                    })
                    .collect(),
            });
        }
        Ok(count)
    }

    // --- Attempts ---

    async fn record_attempt(&self, attempt: NewAttempt) -> PortResult<QuizAttempt> {
        // Check and insert under one guard, so the first attempt stays unique.
        let mut state = self.state()?;
        state.user(attempt.student_id)?;
        state.lecture(attempt.lecture_id)?;
        let is_official_attempt = !state
            .attempts
            .iter()
            .any(|a| a.student_id == attempt.student_id && a.lecture_id == attempt.lecture_id);
        let stored = QuizAttempt {
            id: Some(Uuid::new_v4()),
            student_id: attempt.student_id,
            lecture_id: attempt.lecture_id,
            score: attempt.score,
            total_questions: attempt.total_questions,
            timestamp: Utc::now(),
            is_official_attempt,
        };
        state.attempts.push(stored.clone());
        Ok(stored)
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> PortResult<QuizAttempt> {
        let state = self.state()?;
        state
            .attempts
            .iter()
            .find(|a| a.id == Some(attempt_id))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    async fn attempts_for_student(&self, student_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        let state = self.state()?;
        let records = state
            .attempts
            .iter()
            .filter(|a| a.student_id == student_id)
            .map(|a| state.attempt_record(a))
            .collect();
        Ok(newest_first(records, |r: &AttemptRecord| r.attempt.timestamp))
    }

    async fn attempts_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttemptRecord>> {
        let state = self.state()?;
        let mut records: Vec<AttemptRecord> = state
            .attempts
            .iter()
            .filter(|a| a.lecture_id == lecture_id)
            .map(|a| state.attempt_record(a))
            .collect();
        records.sort_by(|a, b| b.attempt.score.cmp(&a.attempt.score));
        Ok(records)
    }

    async fn list_attempts(
        &self,
        scope: &DepartmentScope,
        query: Option<&str>,
    ) -> PortResult<Vec<AttemptRecord>> {
        let state = self.state()?;
        let records = state
            .attempts
            .iter()
            .filter(|a| {
                state
                    .lecture(a.lecture_id)
                    .map_or(false, |l| scope.admits(l.department_id))
            })
            .map(|a| state.attempt_record(a))
            .filter(|r| {
                query.map_or(true, |q| {
                    contains_ignore_case(&r.username, q) || contains_ignore_case(&r.lecture_title, q)
                })
            })
            .collect();
        Ok(newest_first(records, |r: &AttemptRecord| r.attempt.timestamp))
    }

    async fn official_score_totals(&self, scope: &DepartmentScope) -> PortResult<Vec<ScoreTotal>> {
        let state = self.state()?;
        Ok(state
            .users
            .iter()
            .map(|(u, _)| u)
            .filter(|u| !u.is_teacher && !u.is_superuser && scope.admits(u.department_id))
            .map(|u| {
                let official: Vec<i64> = state
                    .attempts
                    .iter()
                    .filter(|a| a.student_id == u.id && a.is_official_attempt)
                    .map(|a| i64::from(a.score))
                    .collect();
                ScoreTotal {
                    user_id: u.id,
                    username: u.username.clone(),
                    total: if official.is_empty() {
                        None
                    } else {
                        Some(official.iter().sum())
                    },
                }
            })
            .collect())
    }

    // --- Notes & Attendance ---

    async fn get_note(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Option<StudentNote>> {
        let state = self.state()?;
        Ok(state
            .notes
            .get(&(student_id, lecture_id))
            .map(|content| StudentNote {
                student_id,
                lecture_id,
                content: content.clone(),
            }))
    }

    async fn upsert_note(
        &self,
        student_id: Uuid,
        lecture_id: Uuid,
        content: &str,
    ) -> PortResult<StudentNote> {
        let mut state = self.state()?;
        state.user(student_id)?;
        state.lecture(lecture_id)?;
        state
            .notes
            .insert((student_id, lecture_id), content.to_string());
        Ok(StudentNote {
            student_id,
            lecture_id,
            content: content.to_string(),
        })
    }

    async fn mark_attendance(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<Attendance> {
        let mut state = self.state()?;
        state.user(student_id)?;
        state.lecture(lecture_id)?;
        if let Some(existing) = state
            .attendance
            .iter()
            .find(|a| a.student_id == student_id && a.lecture_id == lecture_id)
        {
            return Ok(existing.clone());
        }
        let attendance = Attendance {
            student_id,
            lecture_id,
            timestamp: Utc::now(),
            acknowledged: true,
        };
        state.attendance.push(attendance.clone());
        Ok(attendance)
    }

    async fn has_attended(&self, student_id: Uuid, lecture_id: Uuid) -> PortResult<bool> {
        let state = self.state()?;
        Ok(state
            .attendance
            .iter()
            .any(|a| a.student_id == student_id && a.lecture_id == lecture_id))
    }

    async fn attendance_for_lecture(&self, lecture_id: Uuid) -> PortResult<Vec<AttendanceRecord>> {
        let state = self.state()?;
        let mut records: Vec<AttendanceRecord> = state
            .attendance
            .iter()
            .filter(|a| a.lecture_id == lecture_id)
            .map(|a| state.attendance_record(a))
            .collect();
        records.sort_by(|a, b| a.attendance.timestamp.cmp(&b.attendance.timestamp));
        Ok(records)
    }

    async fn list_attendance(&self, scope: &DepartmentScope) -> PortResult<Vec<AttendanceRecord>> {
        let state = self.state()?;
        let records = state
            .attendance
            .iter()
            .filter(|a| {
                state
                    .lecture(a.lecture_id)
                    .map_or(false, |l| scope.admits(l.department_id))
            })
            .map(|a| state.attendance_record(a))
            .collect();
        Ok(newest_first(records, |r: &AttendanceRecord| {
            r.attendance.timestamp
        }))
    }
}
