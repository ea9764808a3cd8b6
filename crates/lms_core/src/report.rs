//! crates/lms_core/src/report.rs
//!
//! The emailed lecture report: attendance plus each student's best score.
//! Produces an HTML body and a plain-text fallback.

use crate::domain::{AttemptRecord, AttendanceRecord};
use crate::html::escape as html_escape;
use crate::ports::OutboundMail;

#[derive(Debug, Clone)]
pub struct LectureReport {
    pub lecture_title: String,
    pub custom_message: String,
    pub attendance: Vec<AttendanceRecord>,
    /// One attempt per student, best first.
    pub best_scores: Vec<AttemptRecord>,
}

impl LectureReport {
    pub fn subject(&self) -> String {
        format!("Training Report: {}", self.lecture_title)
    }

    pub fn to_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str(&format!("<title>{}</title>\n", html_escape(&self.subject())));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!(
            "<h1>Training Report: {}</h1>\n",
            html_escape(&self.lecture_title)
        ));

        if !self.custom_message.trim().is_empty() {
            html.push_str(&format!(
                "<p class=\"message\">{}</p>\n",
                html_escape(self.custom_message.trim())
            ));
        }

        html.push_str(&format!("<h2>Attendance ({})</h2>\n", self.attendance.len()));
        if self.attendance.is_empty() {
            html.push_str("<p>No attendance recorded.</p>\n");
        } else {
            html.push_str("<table>\n<thead><tr><th>Student</th><th>Acknowledged</th></tr></thead>\n<tbody>\n");
            for record in &self.attendance {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td></tr>\n",
                    html_escape(&record.username),
                    record.attendance.timestamp.format("%Y-%m-%d %H:%M")
                ));
            }
            html.push_str("</tbody></table>\n");
        }

        html.push_str("<h2>Quiz Results (best attempt)</h2>\n");
        if self.best_scores.is_empty() {
            html.push_str("<p>No quiz attempts yet.</p>\n");
        } else {
            html.push_str("<table>\n<thead><tr><th>Student</th><th>Score</th><th>Date</th></tr></thead>\n<tbody>\n");
            for record in &self.best_scores {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{} / {}</td><td>{}</td></tr>\n",
                    html_escape(&record.username),
                    record.attempt.score,
                    record.attempt.total_questions,
                    record.attempt.timestamp.format("%Y-%m-%d %H:%M")
                ));
            }
            html.push_str("</tbody></table>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }

    pub fn to_text(&self) -> String {
        let mut text = format!("Training Report: {}\n\n", self.lecture_title);
        if !self.custom_message.trim().is_empty() {
            text.push_str(self.custom_message.trim());
            text.push_str("\n\n");
        }

        text.push_str(&format!("Attendance ({})\n", self.attendance.len()));
        if self.attendance.is_empty() {
            text.push_str("  No attendance recorded.\n");
        }
        for record in &self.attendance {
            text.push_str(&format!(
                "  - {} ({})\n",
                record.username,
                record.attendance.timestamp.format("%Y-%m-%d %H:%M")
            ));
        }

        text.push_str("\nQuiz Results (best attempt)\n");
        if self.best_scores.is_empty() {
            text.push_str("  No quiz attempts yet.\n");
        }
        for record in &self.best_scores {
            text.push_str(&format!(
                "  - {}: {} / {}\n",
                record.username, record.attempt.score, record.attempt.total_questions
            ));
        }
        text
    }

    pub fn into_mail(self, to: &str) -> OutboundMail {
        OutboundMail {
            to: to.to_string(),
            subject: self.subject(),
            text_body: self.to_text(),
            html_body: self.to_html(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Attendance, QuizAttempt};
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> LectureReport {
        let student = Uuid::new_v4();
        let lecture = Uuid::new_v4();
        LectureReport {
            lecture_title: "Fire <Safety>".into(),
            custom_message: "Please review & sign.".into(),
            attendance: vec![AttendanceRecord {
                attendance: Attendance {
                    student_id: student,
                    lecture_id: lecture,
                    timestamp: Utc::now(),
                    acknowledged: true,
                },
                username: "thandi".into(),
                lecture_title: "Fire <Safety>".into(),
            }],
            best_scores: vec![AttemptRecord {
                attempt: QuizAttempt {
                    id: Some(Uuid::new_v4()),
                    student_id: student,
                    lecture_id: lecture,
                    score: 4,
                    total_questions: 5,
                    timestamp: Utc::now(),
                    is_official_attempt: true,
                },
                username: "thandi".into(),
                lecture_title: "Fire <Safety>".into(),
            }],
        }
    }

    #[test]
    fn subject_names_the_lecture() {
        assert_eq!(report().subject(), "Training Report: Fire <Safety>");
    }

    #[test]
    fn html_escapes_user_text() {
        let html = report().to_html();
        assert!(html.contains("Fire &lt;Safety&gt;"));
        assert!(html.contains("Please review &amp; sign."));
        assert!(!html.contains("<Safety>"));
        assert!(html.contains("<td>4 / 5</td>"));
    }

    #[test]
    fn text_fallback_lists_both_sections() {
        let text = report().to_text();
        assert!(text.starts_with("Training Report: Fire <Safety>"));
        assert!(text.contains("Attendance (1)"));
        assert!(text.contains("  - thandi: 4 / 5"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut empty = report();
        empty.attendance.clear();
        empty.best_scores.clear();
        empty.custom_message.clear();
        let text = empty.to_text();
        assert!(text.contains("No attendance recorded."));
        assert!(text.contains("No quiz attempts yet."));
        assert!(!empty.to_html().contains("class=\"message\""));
    }

    #[test]
    fn mail_carries_both_bodies() {
        let mail = report().into_mail("manager@example.com");
        assert_eq!(mail.to, "manager@example.com");
        assert!(mail.html_body.contains("<table>"));
        assert!(!mail.text_body.contains("<table>"));
    }
}
