pub mod domain;
pub mod html;
pub mod import;
pub mod leaderboard;
pub mod policy;
pub mod ports;
pub mod quiz;
pub mod report;
pub mod service;

pub use domain::{
    AnswerMap, Attendance, AttendanceRecord, AttemptRecord, AuthSession, Category, Choice,
    Department, Lecture, LectureFilter, LectureUpdate, NewAttempt, NewChoice, NewLecture,
    NewQuestion, NewUser, ProfileUpdate, Question, QuizAttempt, ScoreTotal, StudentNote, User,
    UserCredentials, UserUpdate,
};
pub use policy::{Actor, DepartmentScope, Role};
pub use ports::{
    DatabaseService, DocumentStore, MailService, OutboundMail, PortError, PortResult,
};
