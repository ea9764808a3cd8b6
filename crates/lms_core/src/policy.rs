//! crates/lms_core/src/policy.rs
//!
//! Access control. Every handler resolves the caller to an [`Actor`] and asks
//! [`authorize`] before touching content; nothing else branches on role flags.

use uuid::Uuid;

use crate::domain::{Lecture, User};
use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Superuser wins over the teacher flag.
    pub fn of(user: &User) -> Self {
        if user.is_superuser {
            Role::Admin
        } else if user.is_teacher {
            Role::Teacher
        } else {
            Role::Student
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }

    /// Only student attempts are stored; teachers and admins get previews.
    pub fn records_attempts(self) -> bool {
        self == Role::Student
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub department_id: Option<Uuid>,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: Role::of(user),
            department_id: user.department_id,
        }
    }

    /// The department filter applied to everything this actor lists.
    pub fn scope(&self) -> DepartmentScope {
        match (self.role, self.department_id) {
            (Role::Admin, _) => DepartmentScope::All,
            (_, Some(department_id)) => DepartmentScope::Department(department_id),
            (_, None) => DepartmentScope::Nothing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartmentScope {
    All,
    Department(Uuid),
    /// Only lectures that have no department.
    Unassigned,
    /// A non-admin without a department sees no content.
    Nothing,
}

impl DepartmentScope {
    pub fn admits(&self, department_id: Option<Uuid>) -> bool {
        match self {
            DepartmentScope::All => true,
            DepartmentScope::Department(id) => department_id == Some(*id),
            DepartmentScope::Unassigned => department_id.is_none(),
            DepartmentScope::Nothing => false,
        }
    }
}

/// Something an actor wants to do.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    ViewLecture(&'a Lecture),
    TakeQuiz(&'a Lecture),
    SaveNote { lecture: &'a Lecture, attended: bool },
    /// Teacher tooling that is not tied to one lecture.
    ManageContent,
    /// Editing, importing into or reporting on a specific lecture.
    ManageLecture(&'a Lecture),
    ManageUsers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    OtherDepartment,
    QuizLocked,
    AttendanceRequired,
    NotStaff,
    NotAdmin,
}

impl AccessDenied {
    pub fn message(&self) -> &'static str {
        match self {
            AccessDenied::OtherDepartment => "You do not have access to this module.",
            AccessDenied::QuizLocked => "This quiz is currently locked.",
            AccessDenied::AttendanceRequired => "Attendance required",
            AccessDenied::NotStaff | AccessDenied::NotAdmin => "Access Denied.",
        }
    }
}

impl From<AccessDenied> for PortError {
    fn from(denied: AccessDenied) -> Self {
        PortError::Forbidden(denied.message().to_string())
    }
}

/// The single authorization decision point.
pub fn authorize(actor: &Actor, action: Action<'_>) -> Result<(), AccessDenied> {
    match action {
        Action::ViewLecture(lecture) => can_view(actor, lecture),
        Action::TakeQuiz(lecture) => {
            can_view(actor, lecture)?;
            if lecture.can_take_quiz() {
                Ok(())
            } else {
                Err(AccessDenied::QuizLocked)
            }
        }
        Action::SaveNote { lecture, attended } => {
            can_view(actor, lecture)?;
            if actor.role.is_privileged() || attended {
                Ok(())
            } else {
                Err(AccessDenied::AttendanceRequired)
            }
        }
        Action::ManageContent => is_staff(actor),
        Action::ManageLecture(lecture) => {
            is_staff(actor)?;
            // A teacher without a department manages lectures without one.
            if actor.role == Role::Admin || lecture.department_id == actor.department_id {
                Ok(())
            } else {
                Err(AccessDenied::NotStaff)
            }
        }
        Action::ManageUsers => {
            if actor.role == Role::Admin {
                Ok(())
            } else {
                Err(AccessDenied::NotAdmin)
            }
        }
    }
}

fn can_view(actor: &Actor, lecture: &Lecture) -> Result<(), AccessDenied> {
    if actor.scope().admits(lecture.department_id) {
        Ok(())
    } else {
        Err(AccessDenied::OtherDepartment)
    }
}

fn is_staff(actor: &Actor) -> Result<(), AccessDenied> {
    if actor.role.is_privileged() {
        Ok(())
    } else {
        Err(AccessDenied::NotStaff)
    }
}
