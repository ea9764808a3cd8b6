//! Shared fixtures for the api integration tests: an in-memory app, seeded
//! users, and small HTTP helpers around `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use api_lib::adapters::mailer::parse_address;
use api_lib::adapters::{FsDocumentStore, InMemoryDb};
use api_lib::config::Config;
use api_lib::web::{self, auth::hash_password, state::AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use lms_core::domain::{Department, Lecture, NewChoice, NewLecture, NewQuestion, NewUser, User};
use lms_core::ports::{DatabaseService, MailService, OutboundMail, PortError, PortResult};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "s3cret-pass";

/// Captures outbound mail; fails every send when `fail` is set.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundMail>>,
    pub fail: bool,
}

#[async_trait]
impl MailService for RecordingMailer {
    fn check_recipient(&self, address: &str) -> PortResult<()> {
        parse_address(address).map(drop)
    }

    async fn send(&self, mail: OutboundMail) -> PortResult<()> {
        if self.fail {
            return Err(PortError::Unexpected("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

pub struct TestApp {
    pub db: Arc<InMemoryDb>,
    pub mailer: Arc<RecordingMailer>,
    pub router: Router,
    _media: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mailer(RecordingMailer::default())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        let media = tempfile::tempdir().unwrap();
        let db = Arc::new(InMemoryDb::new());
        let mailer = Arc::new(mailer);
        let state = Arc::new(AppState {
            db: db.clone(),
            documents: Arc::new(FsDocumentStore::new(media.path())),
            mailer: mailer.clone(),
            config: Arc::new(Config::for_memory(media.path().to_path_buf())),
        });
        Self {
            db,
            mailer,
            router: web::router(state),
            _media: media,
        }
    }

    pub async fn department(&self, name: &str) -> Department {
        self.db.create_department(name).await.unwrap()
    }

    pub async fn user(&self, username: &str, role: &str, department_id: Option<Uuid>) -> User {
        self.db
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                first_name: String::new(),
                last_name: String::new(),
                hashed_password: hash_password(PASSWORD).unwrap(),
                is_teacher: role == "teacher",
                is_superuser: role == "admin",
                department_id,
            })
            .await
            .unwrap()
    }

    pub async fn lecture(&self, title: &str, department_id: Option<Uuid>) -> Lecture {
        self.db
            .create_lecture(NewLecture {
                title: title.to_string(),
                description: format!("About {title}"),
                category_id: None,
                department_id,
                order: 0,
                is_unlocked: true,
                is_quiz_unlocked: true,
            })
            .await
            .unwrap()
    }

    /// Gives the lecture `count` questions whose first choice is correct.
    pub async fn questions(&self, lecture_id: Uuid, count: usize) {
        let bank = (0..count)
            .map(|i| NewQuestion {
                text: format!("Question {}", i + 1),
                explanation: String::new(),
                choices: vec![
                    NewChoice {
                        text: "Right".to_string(),
                        is_correct: true,
                    },
                    NewChoice {
                        text: "Wrong".to_string(),
                        is_correct: false,
                    },
                ],
            })
            .collect();
        self.db.replace_question_bank(lecture_id, bank).await.unwrap();
    }

    /// Logs in over HTTP and returns the `session=...` cookie pair.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({ "username": username, "password": PASSWORD })
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "login failed for {username}");
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        cookie.split(';').next().unwrap().to_string()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        read(response).await
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(cookie), Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(cookie), Some(body)).await
    }

    /// Sends a single-file multipart upload.
    pub async fn upload(
        &self,
        method: Method,
        uri: &str,
        cookie: &str,
        file_name: &str,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let boundary = "lms-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        read(response).await
    }
}

/// Status plus the body as JSON; non-JSON bodies come back as a JSON string.
async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}
