//! Question bank imports and lecture document uploads.

mod common;

use axum::http::Method;
use common::TestApp;
use lms_core::ports::DatabaseService;

const POSITIONAL: &[u8] = b"Question,Explanation,A,B,C,D,Correct\nQ1,exp,A,B,C,D,2\n";

#[tokio::test]
async fn import_replaces_the_whole_bank() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    app.questions(lecture.id, 5).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    let cookie = app.login("tom").await;
    let uri = format!("/teacher/lectures/{}/questions/import", lecture.id);

    let (status, report) = app
        .upload(Method::POST, &uri, &cookie, "bank.csv", POSITIONAL)
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["imported"], 1);
    assert_eq!(report["message"], "Successfully imported 1 questions.");
    assert!(report["rejected"].as_array().unwrap().is_empty());

    let bank = app.db.questions_for_lecture(lecture.id).await.unwrap();
    assert_eq!(bank.len(), 1);
    assert_eq!(bank[0].text, "Q1");
    assert_eq!(bank[0].explanation, "exp");
    assert_eq!(bank[0].choices.len(), 4);
    let correct: Vec<&str> = bank[0]
        .choices
        .iter()
        .filter(|c| c.is_correct)
        .map(|c| c.text.as_str())
        .collect();
    assert_eq!(correct, ["B"]);

    // Uploading the same sheet again does not duplicate anything.
    let (status, _) = app
        .upload(Method::POST, &uri, &cookie, "bank.csv", POSITIONAL)
        .await;
    assert_eq!(status, 200);
    assert_eq!(app.db.questions_for_lecture(lecture.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn named_columns_import_and_report_bad_rows() {
    let app = TestApp::new();
    let lecture = app.lecture("Unassigned", None).await;
    app.user("root", "admin", None).await;
    let cookie = app.login("root").await;

    let sheet = b"correct_number,option_2,option_1,text,explanation\n\
1,No,Yes,Is the sky blue?,Usually\n\
5,No,Yes,Out of range,\n\
,,,No options,\n\
2,,Yes,Blank correct option,\n\
,,,,\n";
    let (status, report) = app
        .upload(
            Method::POST,
            &format!("/teacher/lectures/{}/questions/import", lecture.id),
            &cookie,
            "bank.csv",
            sheet,
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["imported"], 1);
    let rows: Vec<u64> = report["rejected"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["row"].as_u64().unwrap())
        .collect();
    assert_eq!(rows, [3, 4, 5]);

    let bank = app.db.questions_for_lecture(lecture.id).await.unwrap();
    assert_eq!(bank.len(), 1);
    let correct = bank[0].choices.iter().find(|c| c.is_correct).unwrap();
    assert_eq!(correct.text, "Yes");
    assert_eq!(bank[0].explanation, "Usually");
}

#[tokio::test]
async fn only_staff_of_the_lecture_department_may_import() {
    let app = TestApp::new();
    let ops = app.department("Operations").await;
    let sales = app.department("Sales").await;
    let lecture = app.lecture("Forklift Safety", Some(ops.id)).await;
    app.questions(lecture.id, 2).await;
    app.user("amy", "student", Some(ops.id)).await;
    app.user("sam", "teacher", Some(sales.id)).await;
    let uri = format!("/teacher/lectures/{}/questions/import", lecture.id);

    for username in ["amy", "sam"] {
        let cookie = app.login(username).await;
        let (status, _) = app
            .upload(Method::POST, &uri, &cookie, "bank.csv", POSITIONAL)
            .await;
        assert_eq!(status, 403, "{username} should be refused");

        // Refused before the upload is even decoded.
        let (status, _) = app
            .upload(Method::POST, &uri, &cookie, "bank.xlsx", b"not a workbook")
            .await;
        assert_eq!(status, 403, "{username} should be refused");
    }
    assert_eq!(app.db.questions_for_lecture(lecture.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreadable_files_leave_the_bank_untouched() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    app.questions(lecture.id, 3).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    let cookie = app.login("tom").await;
    let uri = format!("/teacher/lectures/{}/questions/import", lecture.id);

    let (status, _) = app
        .upload(Method::POST, &uri, &cookie, "bank.xlsx", b"not a workbook")
        .await;
    assert_eq!(status, 400);

    let (status, message) = app
        .upload(Method::POST, &uri, &cookie, "bank.csv", b"option_1,option_2\nYes,No\n")
        .await;
    assert_eq!(status, 400);
    assert!(message.as_str().unwrap().starts_with("Error processing file:"));

    let (status, _) = app
        .upload(Method::POST, &uri, &cookie, "bank.pdf", b"%PDF-1.4")
        .await;
    assert_eq!(status, 400);

    assert_eq!(app.db.questions_for_lecture(lecture.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn uploaded_text_documents_render_for_attendees() {
    let app = TestApp::new();
    let dept = app.department("Operations").await;
    let lecture = app.lecture("Forklift Safety", Some(dept.id)).await;
    app.user("tom", "teacher", Some(dept.id)).await;
    app.user("amy", "student", Some(dept.id)).await;
    let teacher = app.login("tom").await;

    let (status, body) = app
        .upload(
            Method::PUT,
            &format!("/teacher/lectures/{}/document", lecture.id),
            &teacher,
            "notes.txt",
            b"Check the forks.\n\nNever carry <passengers>.",
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["has_document"], true);

    let student = app.login("amy").await;
    let detail_uri = format!("/lectures/{}", lecture.id);
    let (_, detail) = app.get(&detail_uri, &student).await;
    assert!(detail["content"].is_null());
    assert_eq!(detail["show_attendance_gate"], true);

    let (status, _) = app
        .post(&format!("/lectures/{}/attendance", lecture.id), &student, serde_json::json!({}))
        .await;
    assert_eq!(status, 201);
    let (_, detail) = app.get(&detail_uri, &student).await;
    let content = detail["content"].as_str().unwrap();
    assert!(content.contains("Check the forks."));
    assert!(content.contains("&lt;passengers&gt;"));
}
