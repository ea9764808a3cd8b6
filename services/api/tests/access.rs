//! Department scoping, the attendance gate, content locks, the leaderboard
//! and authentication over HTTP.

mod common;

use axum::http::Method;
use common::TestApp;
use lms_core::domain::NewAttempt;
use lms_core::ports::DatabaseService;
use serde_json::{json, Value};

fn titles(listing: &Value) -> Vec<String> {
    listing["lectures"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn listings_are_scoped_to_the_callers_department() {
    let app = TestApp::new();
    let ops = app.department("Operations").await;
    let sales = app.department("Sales").await;
    let forklift = app.lecture("Forklift Safety", Some(ops.id)).await;
    app.lecture("Pricing", Some(sales.id)).await;
    app.lecture("Welcome", None).await;
    let amy = app.user("amy", "student", Some(ops.id)).await;
    app.user("drifter", "student", None).await;
    app.user("root", "admin", None).await;
    app.db
        .record_attempt(NewAttempt {
            student_id: amy.id,
            lecture_id: forklift.id,
            score: 3,
            total_questions: 3,
        })
        .await
        .unwrap();

    let amy = app.login("amy").await;
    let (status, listing) = app.get("/lectures", &amy).await;
    assert_eq!(status, 200);
    assert_eq!(titles(&listing), ["Forklift Safety"]);
    assert_eq!(listing["leaderboard"][0]["username"], "amy");

    // No department, no content, no leaderboard.
    let drifter = app.login("drifter").await;
    let (status, listing) = app.get("/lectures", &drifter).await;
    assert_eq!(status, 200);
    assert!(listing["lectures"].as_array().unwrap().is_empty());
    assert!(listing["leaderboard"].as_array().unwrap().is_empty());

    let root = app.login("root").await;
    let (_, listing) = app.get("/lectures", &root).await;
    let mut all = titles(&listing);
    all.sort();
    assert_eq!(all, ["Forklift Safety", "Pricing", "Welcome"]);
}

#[tokio::test]
async fn other_departments_lectures_are_forbidden() {
    let app = TestApp::new();
    let ops = app.department("Operations").await;
    let sales = app.department("Sales").await;
    let pricing = app.lecture("Pricing", Some(sales.id)).await;
    app.user("amy", "student", Some(ops.id)).await;
    let amy = app.login("amy").await;

    let (status, message) = app.get(&format!("/lectures/{}", pricing.id), &amy).await;
    assert_eq!(status, 403);
    assert_eq!(message, "You do not have access to this module.");
    let (status, _) = app.get(&format!("/lectures/{}/quiz", pricing.id), &amy).await;
    assert_eq!(status, 403);
    let (status, _) = app
        .post(&format!("/lectures/{}/attendance", pricing.id), &amy, json!({}))
        .await;
    assert_eq!(status, 403);

    let (status, _) = app
        .get(&format!("/lectures/{}", uuid::Uuid::new_v4()), &amy)
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn notes_require_attendance_first() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    app.user("amy", "student", Some(dept.id)).await;
    let amy = app.login("amy").await;
    let notes_uri = format!("/lectures/{}/notes", lecture.id);
    let note = json!({ "content": "<p>Forks <mark>low</mark></p>" });

    let (status, message) = app.put(&notes_uri, &amy, note.clone()).await;
    assert_eq!(status, 403);
    assert_eq!(message, "Attendance required");

    let (status, ack) = app
        .post(&format!("/lectures/{}/attendance", lecture.id), &amy, json!({}))
        .await;
    assert_eq!(status, 201);
    assert_eq!(ack["acknowledged"], true);

    let (status, saved) = app.put(&notes_uri, &amy, note).await;
    assert_eq!(status, 200);
    assert_eq!(saved["status"], "success");

    let (_, detail) = app.get(&format!("/lectures/{}", lecture.id), &amy).await;
    assert_eq!(detail["has_attended"], true);
    assert_eq!(detail["show_attendance_gate"], false);
    assert_eq!(detail["content"], "<p>Forks <mark>low</mark></p>");
}

#[tokio::test]
async fn locked_content_is_withheld_from_students_only() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    app.user("amy", "student", Some(dept.id)).await;
    let teacher = app.login("tom").await;
    let (status, updated) = app
        .put(
            &format!("/teacher/lectures/{}", lecture.id),
            &teacher,
            json!({ "title": "Forklift Safety", "is_unlocked": false, "is_quiz_unlocked": true }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["is_unlocked"], false);
    assert_eq!(updated["can_take_quiz"], false);

    let amy = app.login("amy").await;
    app.post(&format!("/lectures/{}/attendance", lecture.id), &amy, json!({}))
        .await;
    let (status, detail) = app.get(&format!("/lectures/{}", lecture.id), &amy).await;
    assert_eq!(status, 200);
    assert_eq!(detail["content_locked"], true);
    assert!(detail["content"].is_null());

    let (_, detail) = app.get(&format!("/lectures/{}", lecture.id), &teacher).await;
    assert_eq!(detail["content_locked"], false);
    assert!(detail["content"].is_string());
}

#[tokio::test]
async fn leaderboard_counts_only_official_attempts() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    let amy = app.user("amy", "student", Some(dept.id)).await;
    let bob = app.user("bob", "student", Some(dept.id)).await;
    app.user("zed", "student", Some(dept.id)).await;

    for (student_id, score) in [(amy.id, 10), (amy.id, 5), (bob.id, 4), (bob.id, 10)] {
        app.db
            .record_attempt(NewAttempt {
                student_id,
                lecture_id: lecture.id,
                score,
                total_questions: 10,
            })
            .await
            .unwrap();
    }

    let cookie = app.login("zed").await;
    let (_, listing) = app.get("/lectures", &cookie).await;
    let board = listing["leaderboard"].as_array().unwrap();
    assert_eq!(board.len(), 2, "students without attempts are left off");
    assert_eq!(board[0]["username"], "amy");
    assert_eq!(board[0]["total_score"], 10);
    assert_eq!(board[0]["rank"], 1);
    assert_eq!(board[1]["username"], "bob");
    assert_eq!(board[1]["total_score"], 4);
}

#[tokio::test]
async fn sessions_are_required_and_end_at_logout() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    app.user("amy", "student", Some(dept.id)).await;

    let (status, _) = app.request(Method::GET, "/lectures", None, None).await;
    assert_eq!(status, 401);
    let (status, _) = app
        .request(Method::GET, "/me", Some("session=forged"), None)
        .await;
    assert_eq!(status, 401);

    let (status, _) = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": "amy", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, 401);

    let cookie = app.login("amy").await;
    let (status, me) = app.get("/me", &cookie).await;
    assert_eq!(status, 200);
    assert_eq!(me["username"], "amy");

    let (status, _) = app
        .request(Method::POST, "/auth/logout", Some(&cookie), None)
        .await;
    assert_eq!(status, 200);
    let (status, _) = app.get("/me", &cookie).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn staff_and_admin_routes_check_roles() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    app.user("amy", "student", Some(dept.id)).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    let student = app.login("amy").await;
    let teacher = app.login("tom").await;

    for uri in ["/teacher/lectures", "/teacher/results", "/teacher/attendance"] {
        let (status, message) = app.get(uri, &student).await;
        assert_eq!(status, 403, "{uri}");
        assert_eq!(message, "Access Denied.");
    }
    let (status, _) = app
        .post("/teacher/lectures", &student, json!({ "title": "Sneaky" }))
        .await;
    assert_eq!(status, 403);

    for uri in ["/admin/users", "/admin/departments"] {
        let (status, _) = app.get(uri, &teacher).await;
        assert_eq!(status, 403, "{uri}");
    }
    let (status, _) = app.get("/teacher/lectures", &teacher).await;
    assert_eq!(status, 200);
}
