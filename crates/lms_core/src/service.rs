//! crates/lms_core/src/service.rs
//!
//! The application's use cases. Each workflow resolves access through
//! `policy::authorize`, then drives the ports. Handlers in the web layer are
//! thin wrappers around these functions.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    Attendance, AttendanceRecord, AttemptRecord, Category, Department, Lecture, LectureFilter,
    LectureUpdate, NewAttempt, NewLecture, NewUser, ProfileUpdate, Question, QuizAttempt,
    StudentNote, User, UserUpdate,
};
use crate::import::{plan_import, Cell, ImportReport};
use crate::leaderboard::{best_attempt_per_student, leaderboard, LeaderboardEntry};
use crate::policy::{authorize, Action, Actor, DepartmentScope, Role};
use crate::ports::{DatabaseService, DocumentStore, MailService, PortError, PortResult};
use crate::quiz::{self, QuestionReview};
use crate::report::LectureReport;

fn check(actor: &Actor, action: Action<'_>) -> PortResult<()> {
    authorize(actor, action).map_err(|denied| {
        warn!(user = %actor.username, reason = ?denied, "access denied");
        PortError::from(denied)
    })
}

/// Loads the caller behind an authenticated session. Deactivated accounts are
/// treated as signed out.
pub async fn resolve_actor(db: &dyn DatabaseService, user_id: Uuid) -> PortResult<Actor> {
    let user = db.get_user(user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => PortError::Unauthorized,
        other => other,
    })?;
    if !user.is_active {
        return Err(PortError::Unauthorized);
    }
    Ok(Actor::from_user(&user))
}

//=========================================================================================
// Lectures, notes and attendance
//=========================================================================================

#[derive(Debug, Clone)]
pub struct LectureListing {
    pub lectures: Vec<Lecture>,
    pub categories: Vec<Category>,
    pub current_category: Option<Category>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

pub async fn lecture_list(
    db: &dyn DatabaseService,
    actor: &Actor,
    filter: &LectureFilter,
) -> PortResult<LectureListing> {
    let scope = actor.scope();
    let lectures = match scope {
        DepartmentScope::Nothing => Vec::new(),
        _ => db.list_lectures(&scope, filter).await?,
    };
    let current_category = match filter.category_slug.as_deref() {
        Some(slug) if !slug.is_empty() => db.get_category_by_slug(slug).await?,
        _ => None,
    };
    Ok(LectureListing {
        lectures,
        categories: db.list_categories().await?,
        current_category,
        leaderboard: department_leaderboard(db, actor).await?,
    })
}

/// Top students by official score within the caller's scope.
pub async fn department_leaderboard(
    db: &dyn DatabaseService,
    actor: &Actor,
) -> PortResult<Vec<LeaderboardEntry>> {
    let scope = actor.scope();
    if scope == DepartmentScope::Nothing {
        return Ok(Vec::new());
    }
    Ok(leaderboard(db.official_score_totals(&scope).await?))
}

#[derive(Debug, Clone)]
pub struct LectureView {
    pub lecture: Lecture,
    /// `None` while the attendance gate or the content lock applies.
    pub content: Option<String>,
    pub has_attended: bool,
    pub show_attendance_gate: bool,
    pub content_locked: bool,
}

pub async fn lecture_detail(
    db: &dyn DatabaseService,
    documents: &dyn DocumentStore,
    actor: &Actor,
    lecture_id: Uuid,
) -> PortResult<LectureView> {
    let lecture = db.get_lecture(lecture_id).await?;
    check(actor, Action::ViewLecture(&lecture))?;

    if actor.role.is_privileged() {
        let note = db.get_note(actor.user_id, lecture.id).await?;
        let content = display_content(documents, &lecture, note).await;
        return Ok(LectureView {
            lecture,
            content: Some(content),
            has_attended: true,
            show_attendance_gate: false,
            content_locked: false,
        });
    }

    let has_attended = db.has_attended(actor.user_id, lecture.id).await?;
    let content_locked = !lecture.is_unlocked;
    let content = if has_attended && !content_locked {
        let note = match db.get_note(actor.user_id, lecture.id).await? {
            Some(note) => note,
            None => db.upsert_note(actor.user_id, lecture.id, "").await?,
        };
        Some(display_content(documents, &lecture, Some(note)).await)
    } else {
        None
    };

    Ok(LectureView {
        lecture,
        content,
        has_attended,
        show_attendance_gate: !has_attended,
        content_locked,
    })
}

/// The saved annotated copy wins over the source document.
async fn display_content(
    documents: &dyn DocumentStore,
    lecture: &Lecture,
    note: Option<StudentNote>,
) -> String {
    if let Some(note) = note.filter(|n| !n.content.is_empty()) {
        return note.content;
    }
    let Some(path) = lecture.document_path.as_deref() else {
        return String::new();
    };
    match documents.render_html(path).await {
        Ok(html) => html,
        Err(e) => {
            warn!(lecture = %lecture.id, error = %e, "failed to render lecture document");
            format!("<p class='text-danger'>Error loading document: {e}</p>")
        }
    }
}

pub async fn mark_attendance(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
) -> PortResult<Attendance> {
    let lecture = db.get_lecture(lecture_id).await?;
    check(actor, Action::ViewLecture(&lecture))?;
    let attendance = db.mark_attendance(actor.user_id, lecture.id).await?;
    info!(user = %actor.username, lecture = %lecture.id, "attendance registered");
    Ok(attendance)
}

pub async fn save_note(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
    content: &str,
) -> PortResult<StudentNote> {
    let lecture = db.get_lecture(lecture_id).await?;
    let attended = actor.role.is_privileged() || db.has_attended(actor.user_id, lecture.id).await?;
    check(actor, Action::SaveNote { lecture: &lecture, attended })?;
    db.upsert_note(actor.user_id, lecture.id, content).await
}

//=========================================================================================
// Quizzes
//=========================================================================================

#[derive(Debug, Clone)]
pub struct QuizOutcome {
    pub attempt: QuizAttempt,
    pub review: Vec<QuestionReview>,
    /// True when the attempt was a teacher/admin preview and was not stored.
    pub preview: bool,
}

pub async fn quiz_questions(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
) -> PortResult<(Lecture, Vec<Question>)> {
    let lecture = db.get_lecture(lecture_id).await?;
    check(actor, Action::TakeQuiz(&lecture))?;
    let questions = db.questions_for_lecture(lecture.id).await?;
    Ok((lecture, questions))
}

/// Scores a submission. Student attempts are recorded (the first one per
/// lecture is official) and their answers stashed under the caller's session;
/// teacher and admin attempts are returned as unsaved previews.
pub async fn submit_quiz(
    db: &dyn DatabaseService,
    actor: &Actor,
    session_id: &str,
    lecture_id: Uuid,
    raw_answers: &HashMap<String, String>,
) -> PortResult<QuizOutcome> {
    let (lecture, questions) = quiz_questions(db, actor, lecture_id).await?;
    let answers = quiz::parse_submission(&questions, raw_answers);
    let result = quiz::score(&questions, &answers);
    let review = quiz::review(&questions, &answers);

    if !actor.role.records_attempts() {
        info!(user = %actor.username, lecture = %lecture.id, "quiz preview scored, not recorded");
        return Ok(QuizOutcome {
            attempt: QuizAttempt {
                id: None,
                student_id: actor.user_id,
                lecture_id: lecture.id,
                score: result.score,
                total_questions: result.total,
                timestamp: Utc::now(),
                is_official_attempt: false,
            },
            review,
            preview: true,
        });
    }

    let attempt = db
        .record_attempt(NewAttempt {
            student_id: actor.user_id,
            lecture_id: lecture.id,
            score: result.score,
            total_questions: result.total,
        })
        .await?;
    let attempt_id = attempt
        .id
        .ok_or_else(|| PortError::Unexpected("stored attempt has no id".to_string()))?;
    // Review answers are best-effort once the attempt is stored.
    if let Err(e) = db.stash_attempt_answers(session_id, attempt_id, &answers).await {
        warn!(user = %actor.username, attempt = %attempt_id, error = %e, "quiz answers not kept for review");
    }
    info!(
        user = %actor.username,
        lecture = %lecture.id,
        score = result.score,
        total = result.total,
        official = attempt.is_official_attempt,
        "quiz attempt recorded"
    );

    Ok(QuizOutcome {
        attempt,
        review,
        preview: false,
    })
}

/// Re-renders a stored attempt for its owner. The per-question choices are only
/// known while the session that submitted it is alive.
pub async fn quiz_result(
    db: &dyn DatabaseService,
    actor: &Actor,
    session_id: &str,
    attempt_id: Uuid,
) -> PortResult<QuizOutcome> {
    let attempt = db.get_attempt(attempt_id).await?;
    if attempt.student_id != actor.user_id {
        return Err(PortError::NotFound(format!("Attempt {} not found", attempt_id)));
    }
    let questions = db.questions_for_lecture(attempt.lecture_id).await?;
    let answers = db
        .attempt_answers(session_id, attempt_id)
        .await?
        .unwrap_or_default();
    Ok(QuizOutcome {
        attempt,
        review: quiz::review(&questions, &answers),
        preview: false,
    })
}

pub async fn my_grades(db: &dyn DatabaseService, actor: &Actor) -> PortResult<Vec<AttemptRecord>> {
    db.attempts_for_student(actor.user_id).await
}

//=========================================================================================
// Teacher tooling
//=========================================================================================

/// Lectures a teacher manages: their department's, or the unassigned ones for
/// a teacher without a department. Admins see everything.
pub async fn teacher_dashboard(db: &dyn DatabaseService, actor: &Actor) -> PortResult<Vec<Lecture>> {
    check(actor, Action::ManageContent)?;
    let scope = match (actor.role, actor.department_id) {
        (Role::Admin, _) => DepartmentScope::All,
        (_, Some(id)) => DepartmentScope::Department(id),
        (_, None) => DepartmentScope::Unassigned,
    };
    db.list_lectures(&scope, &LectureFilter::default()).await
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

pub async fn create_category(
    db: &dyn DatabaseService,
    actor: &Actor,
    name: &str,
) -> PortResult<Category> {
    check(actor, Action::ManageContent)?;
    let name = name.trim();
    let slug = slugify(name);
    if name.is_empty() || slug.is_empty() {
        return Err(PortError::Invalid("Category name is required.".to_string()));
    }
    let category = db.create_category(name, &slug).await.map_err(|e| match e {
        PortError::Conflict(_) => {
            PortError::Conflict("Category with this name likely already exists.".to_string())
        }
        other => other,
    })?;
    info!(user = %actor.username, slug = %category.slug, "category created");
    Ok(category)
}

fn validate_lecture(lecture: &NewLecture) -> PortResult<()> {
    if lecture.title.trim().is_empty() {
        return Err(PortError::Invalid("Lecture title is required.".to_string()));
    }
    if lecture.order < 0 {
        return Err(PortError::Invalid("Lecture order cannot be negative.".to_string()));
    }
    Ok(())
}

/// Non-admins always author into their own department.
pub async fn create_lecture(
    db: &dyn DatabaseService,
    actor: &Actor,
    mut lecture: NewLecture,
) -> PortResult<Lecture> {
    check(actor, Action::ManageContent)?;
    validate_lecture(&lecture)?;
    if actor.role != Role::Admin {
        lecture.department_id = actor.department_id;
    }
    let created = db.create_lecture(lecture).await?;
    info!(user = %actor.username, lecture = %created.id, "lecture created");
    Ok(created)
}

pub async fn update_lecture(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
    mut update: LectureUpdate,
) -> PortResult<Lecture> {
    let existing = db.get_lecture(lecture_id).await?;
    check(actor, Action::ManageLecture(&existing))?;
    validate_lecture(&update)?;
    if actor.role != Role::Admin {
        update.department_id = existing.department_id;
    }
    let updated = db.update_lecture(lecture_id, update).await?;
    info!(user = %actor.username, lecture = %lecture_id, "lecture updated");
    Ok(updated)
}

pub async fn delete_lecture(db: &dyn DatabaseService, actor: &Actor, lecture_id: Uuid) -> PortResult<()> {
    let existing = db.get_lecture(lecture_id).await?;
    check(actor, Action::ManageLecture(&existing))?;
    db.delete_lecture(lecture_id).await?;
    info!(user = %actor.username, lecture = %lecture_id, "lecture deleted");
    Ok(())
}

/// Loads a lecture the caller may edit, import into or report on.
pub async fn managed_lecture(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
) -> PortResult<Lecture> {
    let lecture = db.get_lecture(lecture_id).await?;
    check(actor, Action::ManageLecture(&lecture))?;
    Ok(lecture)
}

pub async fn attach_document(
    db: &dyn DatabaseService,
    documents: &dyn DocumentStore,
    actor: &Actor,
    lecture_id: Uuid,
    file_name: &str,
    data: &[u8],
) -> PortResult<Lecture> {
    let lecture = managed_lecture(db, actor, lecture_id).await?;
    if data.is_empty() {
        return Err(PortError::Invalid("The uploaded document is empty.".to_string()));
    }
    let path = documents.store(lecture.id, file_name, data).await?;
    db.set_lecture_document(lecture.id, &path).await?;
    info!(user = %actor.username, lecture = %lecture.id, path = %path, "lecture document stored");
    db.get_lecture(lecture.id).await
}

/// Replaces the lecture's whole question bank with the rows of a decoded sheet.
/// Nothing is written if the sheet cannot be planned.
pub async fn import_question_bank(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
    rows: &[Vec<Cell>],
) -> PortResult<ImportReport> {
    let lecture = managed_lecture(db, actor, lecture_id).await?;

    let plan = plan_import(rows)
        .map_err(|e| PortError::Invalid(format!("Error processing file: {e}")))?;
    for rejected in &plan.rejected {
        warn!(lecture = %lecture.id, row = rejected.row, reason = %rejected.reason, "question row rejected");
    }
    let imported = db.replace_question_bank(lecture.id, plan.questions).await?;
    info!(user = %actor.username, lecture = %lecture.id, imported, "question bank replaced");
    Ok(ImportReport {
        imported,
        rejected: plan.rejected,
    })
}

#[derive(Debug, Clone)]
pub struct QuizResults {
    pub official: Vec<AttemptRecord>,
    pub retries: Vec<AttemptRecord>,
}

pub async fn quiz_results(
    db: &dyn DatabaseService,
    actor: &Actor,
    query: Option<&str>,
) -> PortResult<QuizResults> {
    check(actor, Action::ManageContent)?;
    let scope = actor.scope();
    let attempts = match scope {
        DepartmentScope::Nothing => Vec::new(),
        _ => {
            let query = query.map(str::trim).filter(|q| !q.is_empty());
            db.list_attempts(&scope, query).await?
        }
    };
    let (official, retries): (Vec<_>, Vec<_>) = attempts
        .into_iter()
        .partition(|r| r.attempt.is_official_attempt);
    Ok(QuizResults { official, retries })
}

pub async fn attendance_report(
    db: &dyn DatabaseService,
    actor: &Actor,
) -> PortResult<Vec<AttendanceRecord>> {
    check(actor, Action::ManageContent)?;
    match actor.scope() {
        DepartmentScope::Nothing => Ok(Vec::new()),
        scope => db.list_attendance(&scope).await,
    }
}

pub async fn build_lecture_report(
    db: &dyn DatabaseService,
    actor: &Actor,
    lecture_id: Uuid,
    custom_message: &str,
) -> PortResult<LectureReport> {
    let lecture = managed_lecture(db, actor, lecture_id).await?;
    let attendance = db.attendance_for_lecture(lecture.id).await?;
    let best_scores = best_attempt_per_student(db.attempts_for_lecture(lecture.id).await?);
    Ok(LectureReport {
        lecture_title: lecture.title,
        custom_message: custom_message.to_string(),
        attendance,
        best_scores,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDelivery {
    pub sent: bool,
    pub message: String,
}

/// Builds and mails a lecture report. Delivery failures are reported back,
/// not raised.
pub async fn send_lecture_report(
    db: &dyn DatabaseService,
    mailer: &dyn MailService,
    actor: &Actor,
    lecture_id: Uuid,
    recipient: &str,
    custom_message: &str,
) -> PortResult<ReportDelivery> {
    let report = build_lecture_report(db, actor, lecture_id, custom_message).await?;
    let recipient = recipient.trim();
    mailer
        .check_recipient(recipient)
        .map_err(|_| PortError::Invalid("Enter a valid email address.".to_string()))?;
    match mailer.send(report.into_mail(recipient)).await {
        Ok(()) => {
            info!(user = %actor.username, lecture = %lecture_id, to = %recipient, "report sent");
            Ok(ReportDelivery {
                sent: true,
                message: format!("Report sent to {recipient} successfully!"),
            })
        }
        Err(e) => {
            warn!(lecture = %lecture_id, to = %recipient, error = %e, "report delivery failed");
            Ok(ReportDelivery {
                sent: false,
                message: format!("Failed to send email: {e}"),
            })
        }
    }
}

//=========================================================================================
// Administration
//=========================================================================================

pub async fn list_users(db: &dyn DatabaseService, actor: &Actor) -> PortResult<Vec<User>> {
    check(actor, Action::ManageUsers)?;
    db.list_users().await
}

/// `user.hashed_password` must already be hashed.
pub async fn create_user(db: &dyn DatabaseService, actor: &Actor, user: NewUser) -> PortResult<User> {
    check(actor, Action::ManageUsers)?;
    if user.username.trim().is_empty() {
        return Err(PortError::Invalid("Username is required.".to_string()));
    }
    let created = db.create_user(user).await?;
    info!(admin = %actor.username, user = %created.username, "user created");
    Ok(created)
}

pub async fn update_user(
    db: &dyn DatabaseService,
    actor: &Actor,
    user_id: Uuid,
    update: UserUpdate,
) -> PortResult<User> {
    check(actor, Action::ManageUsers)?;
    if update.username.trim().is_empty() {
        return Err(PortError::Invalid("Username is required.".to_string()));
    }
    let updated = db.update_user(user_id, update).await?;
    info!(admin = %actor.username, user = %updated.username, "user updated");
    Ok(updated)
}

pub async fn delete_user(db: &dyn DatabaseService, actor: &Actor, user_id: Uuid) -> PortResult<()> {
    check(actor, Action::ManageUsers)?;
    if user_id == actor.user_id {
        return Err(PortError::Invalid("You cannot delete your own account.".to_string()));
    }
    db.delete_user(user_id).await?;
    info!(admin = %actor.username, user = %user_id, "user deleted");
    Ok(())
}

pub async fn set_password(
    db: &dyn DatabaseService,
    actor: &Actor,
    user_id: Uuid,
    hashed_password: &str,
) -> PortResult<()> {
    check(actor, Action::ManageUsers)?;
    db.get_user(user_id).await?;
    db.set_password(user_id, hashed_password).await?;
    info!(admin = %actor.username, user = %user_id, "password reset");
    Ok(())
}

pub async fn list_departments(db: &dyn DatabaseService, actor: &Actor) -> PortResult<Vec<Department>> {
    check(actor, Action::ManageUsers)?;
    db.list_departments().await
}

pub async fn create_department(
    db: &dyn DatabaseService,
    actor: &Actor,
    name: &str,
) -> PortResult<Department> {
    check(actor, Action::ManageUsers)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(PortError::Invalid("Department name is required.".to_string()));
    }
    db.create_department(name).await
}

pub async fn update_profile(
    db: &dyn DatabaseService,
    actor: &Actor,
    update: ProfileUpdate,
) -> PortResult<User> {
    db.update_profile(actor.user_id, update).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_matches_url_rules() {
        assert_eq!(slugify("Human Resources"), "human-resources");
        assert_eq!(slugify("  IT  Security -- Basics! "), "it-security-basics");
        assert_eq!(slugify("Health & Safety"), "health-safety");
        assert_eq!(slugify("!!!"), "");
    }
}
