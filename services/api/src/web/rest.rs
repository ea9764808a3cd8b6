//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::web::{account, admin, auth, dto, lectures, quiz, teacher};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        account::me_handler,
        account::update_me_handler,
        account::my_grades_handler,
        lectures::list_lectures_handler,
        lectures::lecture_detail_handler,
        lectures::attendance_handler,
        lectures::save_note_handler,
        quiz::quiz_handler,
        quiz::submit_quiz_handler,
        quiz::quiz_result_handler,
        teacher::dashboard_handler,
        teacher::create_lecture_handler,
        teacher::update_lecture_handler,
        teacher::delete_lecture_handler,
        teacher::upload_document_handler,
        teacher::import_questions_handler,
        teacher::create_category_handler,
        teacher::results_handler,
        teacher::attendance_report_handler,
        teacher::email_report_handler,
        admin::list_users_handler,
        admin::create_user_handler,
        admin::update_user_handler,
        admin::delete_user_handler,
        admin::set_password_handler,
        admin::list_departments_handler,
        admin::create_department_handler,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::AuthResponse,
            account::ProfileRequest,
            dto::UserResponse,
            dto::DepartmentResponse,
            dto::CategoryResponse,
            dto::LectureResponse,
            dto::AttemptSummary,
            dto::AttemptResponse,
            dto::AttendanceResponse,
            dto::LeaderboardEntryResponse,
            lectures::LectureListResponse,
            lectures::LectureDetailResponse,
            lectures::AttendanceAck,
            lectures::NoteRequest,
            lectures::NoteResponse,
            quiz::ChoiceResponse,
            quiz::QuizQuestionResponse,
            quiz::QuizResponse,
            quiz::SubmitQuizRequest,
            quiz::QuestionReviewResponse,
            quiz::QuizOutcomeResponse,
            teacher::LectureRequest,
            teacher::CategoryRequest,
            teacher::RejectedRowResponse,
            teacher::ImportResponse,
            teacher::QuizResultsResponse,
            teacher::EmailReportRequest,
            teacher::ReportDeliveryResponse,
            admin::CreateUserRequest,
            admin::UpdateUserRequest,
            admin::PasswordRequest,
            admin::DepartmentRequest,
        )
    ),
    tags(
        (name = "auth", description = "Cookie session login and logout."),
        (name = "account", description = "The signed-in user's profile and grades."),
        (name = "lectures", description = "Department-scoped lectures, attendance and notes."),
        (name = "quiz", description = "Taking quizzes and reviewing results."),
        (name = "teacher", description = "Authoring, imports, results and reports."),
        (name = "admin", description = "User and department administration.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/login",
            "/lectures/{id}/quiz",
            "/attempts/{id}/result",
            "/teacher/lectures/{id}/questions/import",
            "/admin/users/{id}/password",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
