//! User administration, teacher reports and category management.

mod common;

use axum::http::Method;
use common::{RecordingMailer, TestApp, PASSWORD};
use lms_core::domain::NewAttempt;
use lms_core::ports::DatabaseService;
use serde_json::json;

#[tokio::test]
async fn admins_create_users_who_can_then_sign_in() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    app.user("root", "admin", None).await;
    let admin = app.login("root").await;

    let (status, created) = app
        .post(
            "/admin/users",
            &admin,
            json!({
                "username": "newbie",
                "password": PASSWORD,
                "email": "newbie@example.com",
                "department_id": dept.id,
            }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(created["role"], "student");
    assert_eq!(created["is_active"], true);
    assert!(created.get("hashed_password").is_none());

    let cookie = app.login("newbie").await;
    let (_, me) = app.get("/me", &cookie).await;
    assert_eq!(me["department_id"], json!(dept.id));

    let (status, _) = app
        .post(
            "/admin/users",
            &admin,
            json!({ "username": "newbie", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, 409);

    let (status, _) = app
        .post("/admin/users", &admin, json!({ "username": "blank", "password": "  " }))
        .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn deactivated_users_are_signed_out() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let amy = app.user("amy", "student", Some(dept.id)).await;
    app.user("root", "admin", None).await;
    let admin = app.login("root").await;
    let student = app.login("amy").await;

    let (status, updated) = app
        .put(
            &format!("/admin/users/{}", amy.id),
            &admin,
            json!({ "username": "amy", "is_active": false, "department_id": dept.id }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["is_active"], false);

    let (status, _) = app.get("/lectures", &student).await;
    assert_eq!(status, 401);
    let (status, message) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "amy", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, 401);
    assert_eq!(message, "Invalid username or password");
}

#[tokio::test]
async fn admins_cannot_delete_themselves() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let root = app.user("root", "admin", None).await;
    let amy = app.user("amy", "student", Some(dept.id)).await;
    let admin = app.login("root").await;

    let (status, message) = app
        .request(Method::DELETE, &format!("/admin/users/{}", root.id), Some(&admin), None)
        .await;
    assert_eq!(status, 400);
    assert_eq!(message, "You cannot delete your own account.");

    let (status, _) = app
        .request(Method::DELETE, &format!("/admin/users/{}", amy.id), Some(&admin), None)
        .await;
    assert_eq!(status, 204);
    assert!(app.db.get_user(amy.id).await.is_err());
}

#[tokio::test]
async fn admins_reset_passwords() {
    let app = TestApp::new();
    let amy = app.user("amy", "student", None).await;
    app.user("root", "admin", None).await;
    let admin = app.login("root").await;

    let (status, _) = app
        .post(
            &format!("/admin/users/{}/password", amy.id),
            &admin,
            json!({ "password": "a-new-secret" }),
        )
        .await;
    assert_eq!(status, 204);

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "amy", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, 401);
    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "amy", "password": "a-new-secret" })),
        )
        .await;
    assert_eq!(status, 200);
}

async fn report_fixture(app: &TestApp) -> (uuid::Uuid, String) {
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Fire Safety", Some(dept.id)).await;
    let amy = app.user("amy", "student", Some(dept.id)).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    app.db.mark_attendance(amy.id, lecture.id).await.unwrap();
    for score in [2, 3] {
        app.db
            .record_attempt(NewAttempt {
                student_id: amy.id,
                lecture_id: lecture.id,
                score,
                total_questions: 3,
            })
            .await
            .unwrap();
    }
    (lecture.id, app.login("tom").await)
}

#[tokio::test]
async fn email_reports_are_delivered() {
    let app = TestApp::new();
    let (lecture_id, teacher) = report_fixture(&app).await;

    let (status, delivery) = app
        .post(
            "/teacher/reports/email",
            &teacher,
            json!({ "lecture_id": lecture_id, "recipient": "boss@example.com", "message": "Monthly numbers" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(delivery["sent"], true);
    assert_eq!(delivery["message"], "Report sent to boss@example.com successfully!");

    let sent = app.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "boss@example.com");
    assert_eq!(sent[0].subject, "Training Report: Fire Safety");
    assert!(sent[0].html_body.contains("amy"));
    assert!(sent[0].html_body.contains("Monthly numbers"));
}

#[tokio::test]
async fn email_recipients_are_validated_as_addresses() {
    let app = TestApp::new();
    let (lecture_id, teacher) = report_fixture(&app).await;

    for recipient in ["a@b.c@d.e", "<x>@evil.com", "boss"] {
        let (status, message) = app
            .post(
                "/teacher/reports/email",
                &teacher,
                json!({ "lecture_id": lecture_id, "recipient": recipient }),
            )
            .await;
        assert_eq!(status, 400, "{recipient}");
        assert_eq!(message, "Enter a valid email address.");
    }
    assert!(app.mailer.sent.lock().unwrap().is_empty());

    let (status, delivery) = app
        .post(
            "/teacher/reports/email",
            &teacher,
            json!({ "lecture_id": lecture_id, "recipient": "ops@localhost" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(delivery["sent"], true);
    assert_eq!(app.mailer.sent.lock().unwrap()[0].to, "ops@localhost");

    // Access is checked before the address.
    let student = app.login("amy").await;
    let (status, _) = app
        .post(
            "/teacher/reports/email",
            &student,
            json!({ "lecture_id": lecture_id, "recipient": "a@b.c@d.e" }),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn email_failures_are_reported_not_raised() {
    let app = TestApp::with_mailer(RecordingMailer {
        fail: true,
        ..Default::default()
    });
    let (lecture_id, teacher) = report_fixture(&app).await;

    let (status, delivery) = app
        .post(
            "/teacher/reports/email",
            &teacher,
            json!({ "lecture_id": lecture_id, "recipient": "boss@example.com" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(delivery["sent"], false);
    assert!(delivery["message"]
        .as_str()
        .unwrap()
        .starts_with("Failed to send email:"));

    let (status, message) = app
        .post(
            "/teacher/reports/email",
            &teacher,
            json!({ "lecture_id": lecture_id, "recipient": "not-an-address" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(message, "Enter a valid email address.");
}

#[tokio::test]
async fn results_split_official_attempts_from_retries() {
    let app = TestApp::new();
    let (lecture_id, teacher) = report_fixture(&app).await;
    let other = app.lecture("Pricing", None).await;
    let stray = app.user("stray", "student", None).await;
    app.db
        .record_attempt(NewAttempt {
            student_id: stray.id,
            lecture_id: other.id,
            score: 1,
            total_questions: 1,
        })
        .await
        .unwrap();

    let (status, results) = app.get("/teacher/results", &teacher).await;
    assert_eq!(status, 200);
    let official = results["official"].as_array().unwrap();
    let retries = results["retries"].as_array().unwrap();
    assert_eq!(official.len(), 1, "other departments are out of scope");
    assert_eq!(official[0]["score"], 2);
    assert_eq!(official[0]["lecture_id"], json!(lecture_id));
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0]["score"], 3);

    let (_, results) = app.get("/teacher/results?q=AMY", &teacher).await;
    assert_eq!(results["official"].as_array().unwrap().len(), 1);
    let (_, results) = app.get("/teacher/results?q=nobody", &teacher).await;
    assert!(results["official"].as_array().unwrap().is_empty());
    assert!(results["retries"].as_array().unwrap().is_empty());

    let (_, attendance) = app.get("/teacher/attendance", &teacher).await;
    let attendance = attendance.as_array().unwrap();
    assert_eq!(attendance.len(), 1);
    assert_eq!(attendance[0]["username"], "amy");
}

#[tokio::test]
async fn duplicate_categories_conflict() {
    let app = TestApp::new();
    app.user("tom", "teacher", None).await;
    let teacher = app.login("tom").await;

    let (status, category) = app
        .post("/teacher/categories", &teacher, json!({ "name": "Health & Safety" }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(category["slug"], "health-safety");

    let (status, message) = app
        .post("/teacher/categories", &teacher, json!({ "name": "Health & Safety" }))
        .await;
    assert_eq!(status, 409);
    assert_eq!(message, "Category with this name likely already exists.");
}

#[tokio::test]
async fn teachers_author_into_their_own_department() {
    let app = TestApp::new();
    let ops = app.department("Operations").await;
    let sales = app.department("Sales").await;
    app.user("tom", "teacher", Some(ops.id)).await;
    app.user("root", "admin", None).await;
    let teacher = app.login("tom").await;

    let (status, lecture) = app
        .post(
            "/teacher/lectures",
            &teacher,
            json!({ "title": "Loading Docks", "department_id": sales.id, "order": 2 }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(lecture["department_id"], json!(ops.id));
    assert_eq!(lecture["is_unlocked"], false);

    let admin = app.login("root").await;
    let (status, lecture) = app
        .post(
            "/teacher/lectures",
            &admin,
            json!({ "title": "Quarterly Targets", "department_id": sales.id }),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(lecture["department_id"], json!(sales.id));

    let (_, dashboard) = app.get("/teacher/lectures", &teacher).await;
    let titles: Vec<&str> = dashboard
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Loading Docks"]);

    let (status, _) = app
        .post("/teacher/lectures", &teacher, json!({ "title": "   " }))
        .await;
    assert_eq!(status, 400);
}
