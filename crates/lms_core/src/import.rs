//! crates/lms_core/src/import.rs
//!
//! Turns a decoded spreadsheet into a replacement question bank.
//!
//! Two layouts are accepted through one code path: the fixed upload layout
//! (question, explanation, four options, correct option number) and a
//! header-addressed layout (`text`, `explanation`, `option_1`..`option_4`,
//! `correct_number`). Every accepted question has exactly one correct choice;
//! rows that cannot satisfy that are rejected and reported, never written.

use std::fmt;

use crate::domain::{NewChoice, NewQuestion};

pub const OPTION_COUNT: usize = 4;

static EMPTY_CELL: Cell = Cell::Empty;

/// A decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Trimmed text content, `None` when blank.
    pub fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Cell::Number(n) => Some(format_number(*n)),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

//=========================================================================================
// Column mapping
//=========================================================================================

/// Where each field lives in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMapping {
    /// A question, B explanation, C-F options, G correct option number.
    Positional,
    Named(NamedColumns),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedColumns {
    pub question: usize,
    pub explanation: Option<usize>,
    pub options: [Option<usize>; OPTION_COUNT],
    pub correct: Option<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("the header names option columns but no `text` or `question` column")]
    MissingQuestionColumn,
}

impl ColumnMapping {
    /// Header-addressed when the header names an `option_1` column.
    pub fn detect(header: &[Cell]) -> Result<Self, ImportError> {
        let names: Vec<String> = header
            .iter()
            .map(|c| c.text().unwrap_or_default().to_lowercase())
            .collect();
        let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));

        if find(&["option_1"]).is_none() {
            return Ok(ColumnMapping::Positional);
        }
        let question = find(&["text", "question"]).ok_or(ImportError::MissingQuestionColumn)?;
        let mut options = [None; OPTION_COUNT];
        for (i, slot) in options.iter_mut().enumerate() {
            *slot = find(&[format!("option_{}", i + 1).as_str()]);
        }
        Ok(ColumnMapping::Named(NamedColumns {
            question,
            explanation: find(&["explanation"]),
            options,
            correct: find(&["correct_number", "correct"]),
        }))
    }

    fn extract<'a>(&self, row: &'a [Cell]) -> RawRow<'a> {
        let at = |i: Option<usize>| i.and_then(|i| row.get(i)).unwrap_or(&EMPTY_CELL);
        match self {
            ColumnMapping::Positional => RawRow {
                question: at(Some(0)),
                explanation: at(Some(1)),
                options: [at(Some(2)), at(Some(3)), at(Some(4)), at(Some(5))],
                correct: at(Some(6)),
            },
            ColumnMapping::Named(cols) => RawRow {
                question: at(Some(cols.question)),
                explanation: at(cols.explanation),
                options: cols.options.map(at),
                correct: at(cols.correct),
            },
        }
    }
}

struct RawRow<'a> {
    question: &'a Cell,
    explanation: &'a Cell,
    options: [&'a Cell; OPTION_COUNT],
    correct: &'a Cell,
}

//=========================================================================================
// Planning
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoOptions,
    CorrectOutOfRange(i64),
    CorrectOptionBlank(i64),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoOptions => write!(f, "row has no answer options"),
            RejectReason::CorrectOutOfRange(n) => {
                write!(f, "correct option {n} is outside 1-{OPTION_COUNT}")
            }
            RejectReason::CorrectOptionBlank(n) => write!(f, "correct option {n} is blank"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// 1-based row number in the sheet, header included.
    pub row: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub questions: Vec<NewQuestion>,
    pub rejected: Vec<RejectedRow>,
}

/// Outcome reported to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Detects the layout from the header row and plans the import.
pub fn plan_import(rows: &[Vec<Cell>]) -> Result<ImportPlan, ImportError> {
    let mapping = match rows.first() {
        Some(header) => ColumnMapping::detect(header)?,
        None => ColumnMapping::Positional,
    };
    Ok(plan_import_with(rows, &mapping))
}

/// Plans an import with a known layout. The first row is the header and is skipped.
pub fn plan_import_with(rows: &[Vec<Cell>], mapping: &ColumnMapping) -> ImportPlan {
    let mut plan = ImportPlan::default();
    for (index, row) in rows.iter().enumerate().skip(1) {
        let raw = mapping.extract(row);
        // Rows without a question are padding.
        let Some(text) = raw.question.text() else {
            continue;
        };
        match build_question(text, &raw) {
            Ok(question) => plan.questions.push(question),
            Err(reason) => plan.rejected.push(RejectedRow {
                row: index + 1,
                reason,
            }),
        }
    }
    plan
}

fn build_question(text: String, raw: &RawRow<'_>) -> Result<NewQuestion, RejectReason> {
    let options = raw.options.map(Cell::text);
    if options.iter().all(Option::is_none) {
        return Err(RejectReason::NoOptions);
    }

    let correct = parse_correct_index(raw.correct);
    if !(1..=OPTION_COUNT as i64).contains(&correct) {
        return Err(RejectReason::CorrectOutOfRange(correct));
    }
    if options[(correct - 1) as usize].is_none() {
        return Err(RejectReason::CorrectOptionBlank(correct));
    }

    let choices = options
        .into_iter()
        .enumerate()
        .filter_map(|(i, option)| {
            option.map(|text| NewChoice {
                text,
                is_correct: i as i64 + 1 == correct,
            })
        })
        .collect();

    Ok(NewQuestion {
        text,
        explanation: raw.explanation.text().unwrap_or_default(),
        choices,
    })
}

/// 1-based correct option number. Accepts `2`, `"2"` and `"2.0"`; anything
/// blank or unparseable falls back to option 1.
pub fn parse_correct_index(cell: &Cell) -> i64 {
    match cell {
        Cell::Empty => 1,
        Cell::Number(n) if n.is_finite() => n.trunc() as i64,
        Cell::Number(_) => 1,
        Cell::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return 1;
            }
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(1)
        }
    }
}
