//! crates/lms_core/src/quiz.rs
//!
//! Scoring of quiz submissions and the per-question review shown afterwards.
//! Nothing here touches storage; whether an attempt is recorded is decided by
//! the caller's role (see `service::submit_quiz`).

use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{AnswerMap, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub score: i32,
    pub total: i32,
}

impl Score {
    /// Percentage of correct answers; undefined for a quiz with no questions.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(f64::from(self.score) * 100.0 / f64::from(self.total))
        }
    }
}

/// Turns raw form values (question id -> choice id, both as strings) into an
/// answer map.
///
/// Entries for unknown questions, unparseable ids, and choice ids that do not
/// belong to the question are dropped: they count as unanswered.
pub fn parse_submission(questions: &[Question], raw: &HashMap<String, String>) -> AnswerMap {
    let mut answers = AnswerMap::new();
    for question in questions {
        let Some(value) = raw.get(&question.id.to_string()) else {
            continue;
        };
        let Ok(choice_id) = Uuid::parse_str(value.trim()) else {
            continue;
        };
        if question.choices.iter().any(|c| c.id == choice_id) {
            answers.insert(question.id, choice_id);
        }
    }
    answers
}

/// One point per question whose chosen choice is flagged correct.
///
/// `total` is the number of questions passed in, i.e. the live count at the
/// time of scoring.
pub fn score(questions: &[Question], answers: &AnswerMap) -> Score {
    let score = questions
        .iter()
        .filter(|q| {
            answers.get(&q.id).is_some_and(|chosen| {
                q.choices.iter().any(|c| c.id == *chosen && c.is_correct)
            })
        })
        .count();
    Score {
        score: score as i32,
        total: questions.len() as i32,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceReview {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionReview {
    pub question_id: Uuid,
    pub text: String,
    pub explanation: String,
    pub choices: Vec<ChoiceReview>,
    pub user_choice: Option<Uuid>,
    /// The first choice flagged correct; `None` if the bank has none.
    pub correct_choice: Option<Uuid>,
    pub is_correct: bool,
}

pub fn review(questions: &[Question], answers: &AnswerMap) -> Vec<QuestionReview> {
    questions
        .iter()
        .map(|q| {
            let user_choice = answers
                .get(&q.id)
                .copied()
                .filter(|id| q.choices.iter().any(|c| c.id == *id));
            let correct_choice = q.choices.iter().find(|c| c.is_correct).map(|c| c.id);
            let is_correct = matches!(
                (user_choice, correct_choice),
                (Some(user), Some(correct)) if user == correct
            );
            QuestionReview {
                question_id: q.id,
                text: q.text.clone(),
                explanation: q.explanation.clone(),
                choices: q
                    .choices
                    .iter()
                    .map(|c| ChoiceReview {
                        id: c.id,
                        text: c.text.clone(),
                    })
                    .collect(),
                user_choice,
                correct_choice,
                is_correct,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Choice;

    /// Builds a question whose choice at `correct` (0-based) is flagged.
    fn question(options: &[&str], correct: &[usize]) -> Question {
        let id = Uuid::new_v4();
        Question {
            id,
            lecture_id: Uuid::nil(),
            text: "Which one?".into(),
            explanation: String::new(),
            choices: options
                .iter()
                .enumerate()
                .map(|(i, text)| Choice {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: text.to_string(),
                    is_correct: correct.contains(&i),
                })
                .collect(),
        }
    }

    fn correct_answers(questions: &[Question]) -> AnswerMap {
        questions
            .iter()
            .map(|q| (q.id, q.choices.iter().find(|c| c.is_correct).unwrap().id))
            .collect()
    }

    #[test]
    fn all_correct_scores_full_marks() {
        let questions: Vec<_> = (0..3).map(|_| question(&["A", "B", "C", "D"], &[1])).collect();
        let result = score(&questions, &correct_answers(&questions));
        assert_eq!(result, Score { score: 3, total: 3 });
        assert_eq!(result.percent(), Some(100.0));
    }

    #[test]
    fn empty_submission_scores_zero() {
        let questions: Vec<_> = (0..4).map(|_| question(&["A", "B"], &[0])).collect();
        assert_eq!(score(&questions, &AnswerMap::new()), Score { score: 0, total: 4 });
    }

    #[test]
    fn no_questions_is_zero_out_of_zero() {
        let result = score(&[], &AnswerMap::new());
        assert_eq!(result, Score { score: 0, total: 0 });
        assert_eq!(result.percent(), None);
    }

    #[test]
    fn garbage_and_foreign_choice_ids_count_as_unanswered() {
        let q1 = question(&["A", "B"], &[0]);
        let q2 = question(&["A", "B"], &[1]);
        let mut raw = HashMap::new();
        raw.insert(q1.id.to_string(), "not-a-uuid".to_string());
        // A correct choice, but from a different question.
        raw.insert(q2.id.to_string(), q1.choices[0].id.to_string());
        raw.insert(Uuid::new_v4().to_string(), Uuid::new_v4().to_string());

        let questions = vec![q1, q2];
        let answers = parse_submission(&questions, &raw);
        assert!(answers.is_empty());
        assert_eq!(score(&questions, &answers), Score { score: 0, total: 2 });
    }

    #[test]
    fn parse_keeps_valid_answers() {
        let q = question(&["A", "B", "C"], &[2]);
        let mut raw = HashMap::new();
        raw.insert(q.id.to_string(), format!(" {} ", q.choices[2].id));
        let questions = vec![q];
        let answers = parse_submission(&questions, &raw);
        assert_eq!(answers.get(&questions[0].id), Some(&questions[0].choices[2].id));
        assert_eq!(score(&questions, &answers).score, 1);
    }

    #[test]
    fn review_marks_correctness_per_question() {
        let right = question(&["A", "B"], &[1]);
        let wrong = question(&["A", "B"], &[1]);
        let skipped = question(&["A", "B"], &[0]);
        let mut answers = AnswerMap::new();
        answers.insert(right.id, right.choices[1].id);
        answers.insert(wrong.id, wrong.choices[0].id);

        let reviews = review(&[right.clone(), wrong.clone(), skipped.clone()], &answers);
        assert!(reviews[0].is_correct);
        assert!(!reviews[1].is_correct);
        assert_eq!(reviews[1].user_choice, Some(wrong.choices[0].id));
        assert_eq!(reviews[1].correct_choice, Some(wrong.choices[1].id));
        assert!(!reviews[2].is_correct);
        assert_eq!(reviews[2].user_choice, None);
    }

    #[test]
    fn degenerate_banks_are_tolerated() {
        let none_correct = question(&["A", "B"], &[]);
        let two_correct = question(&["A", "B"], &[0, 1]);
        let mut answers = AnswerMap::new();
        answers.insert(none_correct.id, none_correct.choices[0].id);
        answers.insert(two_correct.id, two_correct.choices[1].id);
        let questions = vec![none_correct, two_correct];

        // Scoring counts any flagged choice; review compares against the first.
        assert_eq!(score(&questions, &answers).score, 1);
        let reviews = review(&questions, &answers);
        assert_eq!(reviews[0].correct_choice, None);
        assert!(!reviews[0].is_correct);
        assert_eq!(reviews[1].correct_choice, Some(questions[1].choices[0].id));
        assert!(!reviews[1].is_correct);
    }
}
