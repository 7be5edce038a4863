//! Conversion between the host API's flattened exam-marks shape and
//! [`ExamSheet`].
//!
//! The host stores one question row per sub-question, labelled `"Q1.A"`, and
//! one mark row per (student id, question id). Rules travel as a map keyed by
//! main label, sometimes JSON-encoded as a string.

use crate::sheet::{
    ExamMeta, ExamSheet, ExamType, RollNo, SelectionRule, SheetError, Student, SubQuestion,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Deserialize)]
pub struct ExamIn {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub subject_code: String,
    #[serde(default)]
    pub subject_name: String,
    #[serde(default)]
    pub exam_type: Option<String>,
    #[serde(default)]
    pub semester: Option<i64>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub question_rules: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionIn {
    pub id: i64,
    pub label: String,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentIn {
    pub id: i64,
    pub roll_no: RollNo,
    #[serde(default)]
    pub absent: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkIn {
    pub student_id: i64,
    pub question_id: i64,
    #[serde(default)]
    pub marks: Option<f64>,
}

/// Host "exam marks" document as loaded from storage.
#[derive(Debug, Clone, Deserialize)]
pub struct ExamMarksIn {
    pub exam: ExamIn,
    #[serde(default)]
    pub questions: Vec<QuestionIn>,
    #[serde(default)]
    pub students: Vec<StudentIn>,
    #[serde(default)]
    pub marks: Vec<MarkIn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionOut {
    pub label: String,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentMarksOut {
    pub roll_no: RollNo,
    pub absent: bool,
    pub marks: BTreeMap<String, Option<f64>>,
}

/// Host "save marks" document.
#[derive(Debug, Clone, Serialize)]
pub struct SaveMarksOut {
    pub subject_code: String,
    pub subject_name: String,
    pub exam_type: String,
    pub semester: i64,
    pub academic_year: String,
    pub questions: Vec<QuestionOut>,
    pub students: Vec<StudentMarksOut>,
    pub question_rules: BTreeMap<String, SelectionRule>,
}

/// Splits `"Q1.A"` into `("Q1", 'A')`. A label with no dot is a main
/// question holding a single sub-question `A`.
pub fn split_question_label(label: &str) -> Result<(String, char), SheetError> {
    let Some((main, sub)) = label.split_once('.') else {
        return Ok((label.trim().to_ascii_uppercase(), 'A'));
    };
    let sub = sub.trim();
    let mut chars = sub.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Ok((main.trim().to_ascii_uppercase(), c.to_ascii_uppercase()))
        }
        _ => Err(SheetError::BadParams(format!(
            "sub-question label must be a single letter: {}",
            label
        ))),
    }
}

fn parse_rules(raw: &serde_json::Value) -> Result<Vec<SelectionRule>, SheetError> {
    let decoded;
    let value = match raw {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        serde_json::Value::String(s) => {
            decoded = serde_json::from_str::<serde_json::Value>(s).map_err(|e| {
                SheetError::BadParams(format!("question_rules is not valid JSON: {}", e))
            })?;
            &decoded
        }
        other => other,
    };
    let Some(obj) = value.as_object() else {
        return Err(SheetError::BadParams(
            "question_rules must be an object".into(),
        ));
    };

    let mut rules = Vec::with_capacity(obj.len());
    for (key, entry) in obj {
        let n = entry.get("minToCount").and_then(|v| v.as_f64()).unwrap_or(0.0);
        // A missing or zero count means "no rule".
        if n < 1.0 {
            continue;
        }
        let k = entry.get("outOf").and_then(|v| v.as_f64()).unwrap_or(1.0);
        let label = entry
            .get("mainLabel")
            .and_then(|v| v.as_str())
            .unwrap_or(key)
            .trim()
            .to_ascii_uppercase();
        rules.push(SelectionRule::new(label, n.floor() as i64, k.floor() as i64));
    }
    Ok(rules)
}

/// Builds a sheet from a stored exam document. Marks pointing at unknown
/// students or questions are skipped.
pub fn sheet_from_payload(
    payload: &ExamMarksIn,
    default_academic_year: impl FnOnce() -> String,
) -> Result<ExamSheet, SheetError> {
    let exam = &payload.exam;
    let exam_type = match exam.exam_type.as_deref() {
        None => ExamType::default(),
        Some(s) => ExamType::parse(s)
            .ok_or_else(|| SheetError::BadParams(format!("unknown exam_type: {}", s)))?,
    };
    let mut sheet = ExamSheet::new(ExamMeta {
        exam_id: exam.id,
        subject_code: exam.subject_code.clone(),
        subject_name: exam.subject_name.clone(),
        exam_type,
        semester: exam.semester.unwrap_or(1),
        academic_year: exam
            .academic_year
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(default_academic_year),
    });

    // Group sub-questions under their main label, first-seen order.
    let mut groups: Vec<(String, Vec<SubQuestion>)> = Vec::new();
    let mut label_by_id: HashMap<i64, (String, char)> = HashMap::new();
    for q in &payload.questions {
        let (main, sub) = split_question_label(&q.label)?;
        let pos = match groups.iter().position(|(m, _)| *m == main) {
            Some(pos) => pos,
            None => {
                groups.push((main.clone(), Vec::new()));
                groups.len() - 1
            }
        };
        groups[pos].1.push(SubQuestion {
            label: sub,
            max_marks: q.max_marks,
        });
        label_by_id.insert(q.id, (main, sub));
    }
    for (main, subs) in groups {
        sheet.insert_main_question(&main, subs)?;
    }

    let mut roll_by_id: HashMap<i64, RollNo> = HashMap::new();
    for s in &payload.students {
        sheet.insert_student(Student {
            roll_no: s.roll_no,
            absent: s.absent,
        })?;
        roll_by_id.insert(s.id, s.roll_no);
    }

    for m in &payload.marks {
        let (Some(roll_no), Some((main, sub))) = (
            roll_by_id.get(&m.student_id),
            label_by_id.get(&m.question_id),
        ) else {
            tracing::debug!(
                student_id = m.student_id,
                question_id = m.question_id,
                "skipping mark with unknown reference"
            );
            continue;
        };
        sheet.record_mark(*roll_no, main, *sub, m.marks)?;
    }

    if let Some(raw) = &exam.question_rules {
        for rule in parse_rules(raw)? {
            sheet.insert_rule(rule);
        }
    }

    sheet.set_locked(exam.is_locked);
    Ok(sheet)
}

/// Flattens a sheet back into the host's save shape. Every roster student
/// gets an entry for every column, `null` where unset.
pub fn payload_from_sheet(sheet: &ExamSheet) -> SaveMarksOut {
    let columns: Vec<(String, &str, char)> = sheet
        .questions()
        .iter()
        .flat_map(|mq| {
            mq.sub_questions.iter().map(move |sq| {
                (
                    format!("{}.{}", mq.label, sq.label),
                    mq.label.as_str(),
                    sq.label,
                )
            })
        })
        .collect();

    let questions = sheet
        .questions()
        .iter()
        .flat_map(|mq| {
            mq.sub_questions.iter().map(move |sq| QuestionOut {
                label: format!("{}.{}", mq.label, sq.label),
                max_marks: sq.max_marks,
            })
        })
        .collect();

    let students = sheet
        .students()
        .map(|s| StudentMarksOut {
            roll_no: s.roll_no,
            absent: s.absent,
            marks: columns
                .iter()
                .map(|(key, main, sub)| (key.clone(), sheet.mark(s.roll_no, main, *sub)))
                .collect(),
        })
        .collect();

    SaveMarksOut {
        subject_code: sheet.meta.subject_code.clone(),
        subject_name: sheet.meta.subject_name.clone(),
        exam_type: sheet.meta.exam_type.as_str().to_string(),
        semester: sheet.meta.semester,
        academic_year: sheet.meta.academic_year.clone(),
        questions,
        students,
        question_rules: sheet
            .rules()
            .map(|r| (r.main_label.clone(), r.clone()))
            .collect(),
    }
}
