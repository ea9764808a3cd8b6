//! crates/lms_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// A submitted answer set: question id -> chosen choice id.
pub type AnswerMap = HashMap<Uuid, Uuid>;

//=========================================================================================
// Organisation
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
}

/// Represents a user - used throughout app. Credentials live in `UserCredentials`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_teacher: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
    pub date_joined: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub hashed_password: String,
    pub is_teacher: bool,
    pub is_superuser: bool,
    pub department_id: Option<Uuid>,
}

/// Admin-side edit of an account. Password changes go through `set_password`.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_teacher: bool,
    pub is_active: bool,
    pub department_id: Option<Uuid>,
}

/// The subset of a user's own fields they may change themselves.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Content
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// A training module: a source document, metadata and an optional quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lecture {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub document_path: Option<String>,
    pub order: i32,
    /// Content gate.
    pub is_unlocked: bool,
    /// Quiz gate.
    pub is_quiz_unlocked: bool,
    pub created_at: DateTime<Utc>,
}

impl Lecture {
    /// A quiz is takeable only when both gates are open.
    pub fn can_take_quiz(&self) -> bool {
        self.is_unlocked && self.is_quiz_unlocked
    }
}

#[derive(Debug, Clone)]
pub struct NewLecture {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub order: i32,
    pub is_unlocked: bool,
    pub is_quiz_unlocked: bool,
}

/// Full replacement of a lecture's editable fields.
pub type LectureUpdate = NewLecture;

/// Listing filters applied on top of the caller's department scope.
#[derive(Debug, Clone, Default)]
pub struct LectureFilter {
    /// Case-insensitive match against title or description.
    pub query: Option<String>,
    pub category_slug: Option<String>,
}

//=========================================================================================
// Quizzes
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub is_correct: bool,
}

/// A question together with its choices, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: Uuid,
    pub lecture_id: Uuid,
    pub text: String,
    pub explanation: String,
    pub choices: Vec<Choice>,
}

/// A question ready to be written as part of a question bank replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub text: String,
    pub explanation: String,
    pub choices: Vec<NewChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChoice {
    pub text: String,
    pub is_correct: bool,
}

/// A scored attempt. `id` is `None` for preview attempts that were never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    pub id: Option<Uuid>,
    pub student_id: Uuid,
    pub lecture_id: Uuid,
    pub score: i32,
    pub total_questions: i32,
    pub timestamp: DateTime<Utc>,
    pub is_official_attempt: bool,
}

/// What the storage layer needs to record an attempt; officialness is decided there.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub student_id: Uuid,
    pub lecture_id: Uuid,
    pub score: i32,
    pub total_questions: i32,
}

/// An attempt joined with the names needed for listings and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: QuizAttempt,
    pub username: String,
    pub lecture_title: String,
}

//=========================================================================================
// Notes & Attendance
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentNote {
    pub student_id: Uuid,
    pub lecture_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendance {
    pub student_id: Uuid,
    pub lecture_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub attendance: Attendance,
    pub username: String,
    pub lecture_title: String,
}

//=========================================================================================
// Leaderboard input
//=========================================================================================

/// A non-privileged user's sum of official scores; `None` when they have none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreTotal {
    pub user_id: Uuid,
    pub username: String,
    pub total: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture(is_unlocked: bool, is_quiz_unlocked: bool) -> Lecture {
        Lecture {
            id: Uuid::new_v4(),
            title: "Fire safety".into(),
            description: String::new(),
            category_id: None,
            department_id: None,
            document_path: None,
            order: 0,
            is_unlocked,
            is_quiz_unlocked,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn quiz_needs_both_gates_open() {
        assert!(lecture(true, true).can_take_quiz());
        assert!(!lecture(true, false).can_take_quiz());
        assert!(!lecture(false, true).can_take_quiz());
        assert!(!lecture(false, false).can_take_quiz());
    }
}
