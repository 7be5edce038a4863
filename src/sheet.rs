use crate::calc::round_off_2_decimals;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type RollNo = i64;

/// Sub-questions created in one go by `add_main_question`.
pub const MAX_SUBS_ON_CREATE: usize = 10;

/// Hard ceiling on `generate_roster`; `force` only skips the soft limit.
pub const MAX_ROSTER_ROWS: i64 = 100_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("{0}")]
    BadParams(String),

    #[error("main question not found: {0}")]
    UnknownMainQuestion(String),

    #[error("sub-question not found: {main}.{sub}")]
    UnknownSubQuestion { main: String, sub: char },

    #[error("student not found: {0}")]
    UnknownStudent(RollNo),

    #[error("main question {0} already exists")]
    DuplicateMainQuestion(String),

    #[error("sub-question {main}.{sub} already exists")]
    DuplicateSubQuestion { main: String, sub: char },

    #[error("roll number {0} already exists")]
    DuplicateStudent(RollNo),

    #[error("cannot add more sub-questions to {0} (limit reached)")]
    SubQuestionLimit(String),

    #[error("sheet is finalized")]
    Locked,

    #[error("starting roll number {from} is greater than ending roll number {to}")]
    BadRange { from: RollNo, to: RollNo },

    #[error("generating {count} rows exceeds the limit of {limit}")]
    RosterTooLarge { count: i64, limit: i64 },
}

impl SheetError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadParams(_) => "bad_params",
            Self::UnknownMainQuestion(_)
            | Self::UnknownSubQuestion { .. }
            | Self::UnknownStudent(_) => "not_found",
            Self::DuplicateMainQuestion(_) | Self::DuplicateSubQuestion { .. } => {
                "duplicate_label"
            }
            Self::DuplicateStudent(_) => "duplicate_student",
            Self::SubQuestionLimit(_) => "sub_question_limit",
            Self::Locked => "sheet_locked",
            Self::BadRange { .. } => "bad_range",
            Self::RosterTooLarge { .. } => "roster_too_large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExamType {
    #[default]
    Internal,
    External,
    Practical,
    #[serde(rename = "ATKT")]
    Atkt,
    Other,
}

impl ExamType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "practical" => Some(Self::Practical),
            "atkt" => Some(Self::Atkt),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "Internal",
            Self::External => "External",
            Self::Practical => "Practical",
            Self::Atkt => "ATKT",
            Self::Other => "Other",
        }
    }
}

/// Descriptive exam header. Never consulted by the totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamMeta {
    pub exam_id: Option<i64>,
    pub subject_code: String,
    pub subject_name: String,
    pub exam_type: ExamType,
    pub semester: i64,
    pub academic_year: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub roll_no: RollNo,
    pub absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuestion {
    pub label: char,
    pub max_marks: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainQuestion {
    pub label: String,
    pub sub_questions: Vec<SubQuestion>,
}

impl MainQuestion {
    pub fn sub(&self, label: char) -> Option<&SubQuestion> {
        self.sub_questions.iter().find(|sq| sq.label == label)
    }

    pub fn sub_maxes(&self) -> impl Iterator<Item = f64> + '_ {
        self.sub_questions.iter().map(|sq| sq.max_marks)
    }

    /// Letter following the highest one in use, `None` past 'Z'.
    fn next_sub_label(&self) -> Option<char> {
        let next = match self.sub_questions.iter().map(|sq| sq.label).max() {
            Some(highest) => (highest as u8).checked_add(1)? as char,
            None => 'A',
        };
        next.is_ascii_uppercase().then_some(next)
    }
}

/// "Count the best `min_to_count`". `out_of` is display metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRule {
    pub main_label: String,
    pub min_to_count: u32,
    pub out_of: u32,
}

impl SelectionRule {
    /// Both counts are clamped to at least 1.
    pub fn new(main_label: impl Into<String>, min_to_count: i64, out_of: i64) -> Self {
        Self {
            main_label: main_label.into(),
            min_to_count: min_to_count.clamp(1, u32::MAX as i64) as u32,
            out_of: out_of.clamp(1, u32::MAX as i64) as u32,
        }
    }
}

/// Entered marks, keyed by roll number, then main label, then sub label.
/// A missing cell is "unset", which is not the same as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarksMatrix {
    cells: BTreeMap<RollNo, BTreeMap<String, BTreeMap<char, f64>>>,
}

impl MarksMatrix {
    pub fn get(&self, roll_no: RollNo, main: &str, sub: char) -> Option<f64> {
        self.cells.get(&roll_no)?.get(main)?.get(&sub).copied()
    }

    fn set(&mut self, roll_no: RollNo, main: &str, sub: char, value: f64) {
        self.cells
            .entry(roll_no)
            .or_default()
            .entry(main.to_string())
            .or_default()
            .insert(sub, value);
    }

    fn clear(&mut self, roll_no: RollNo, main: &str, sub: char) {
        let Some(by_main) = self.cells.get_mut(&roll_no) else {
            return;
        };
        if let Some(by_sub) = by_main.get_mut(main) {
            by_sub.remove(&sub);
            if by_sub.is_empty() {
                by_main.remove(main);
            }
        }
        if by_main.is_empty() {
            self.cells.remove(&roll_no);
        }
    }

    /// Number of set cells for one roll.
    pub fn count_for(&self, roll_no: RollNo) -> usize {
        self.cells
            .get(&roll_no)
            .map(|by_main| by_main.values().map(|by_sub| by_sub.len()).sum())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NotNumeric,
    Absent,
    Locked,
}

/// Outcome of one mark edit. Rejections here are silent by policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkEdit {
    Stored(f64),
    Cleared,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleApplied {
    pub rule: SelectionRule,
    pub replaced: Option<SelectionRule>,
    pub exceeds_sub_count: bool,
}

/// Parses operator input. `None` means "not a number" and the edit is dropped.
/// Textual `inf`/`nan` forms are not numbers here.
pub fn parse_mark_input(raw: &str) -> Option<f64> {
    let n = raw.trim().parse::<f64>().ok()?;
    n.is_finite().then_some(n)
}

/// Clamps into `[0, max_marks]` and rounds to 2 decimals.
pub fn clamp_mark(value: f64, max_marks: f64) -> f64 {
    round_off_2_decimals(value.clamp(0.0, max_marks)).min(max_marks)
}

fn check_max_marks(max_marks: f64) -> Result<f64, SheetError> {
    if !max_marks.is_finite() || max_marks <= 0.0 {
        return Err(SheetError::BadParams(format!(
            "max marks must be a positive number, got {}",
            max_marks
        )));
    }
    Ok(max_marks)
}

/// One exam's roster, question schema, marks and rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSheet {
    pub meta: ExamMeta,
    students: BTreeMap<RollNo, Student>,
    questions: Vec<MainQuestion>,
    marks: MarksMatrix,
    rules: BTreeMap<String, SelectionRule>,
    locked: bool,
    max_total_override: Option<f64>,
}

impl ExamSheet {
    pub fn new(meta: ExamMeta) -> Self {
        Self {
            meta,
            students: BTreeMap::new(),
            questions: Vec::new(),
            marks: MarksMatrix::default(),
            rules: BTreeMap::new(),
            locked: false,
            max_total_override: None,
        }
    }

    pub fn students(&self) -> impl Iterator<Item = &Student> + '_ {
        self.students.values()
    }

    pub fn student(&self, roll_no: RollNo) -> Option<&Student> {
        self.students.get(&roll_no)
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }

    pub fn questions(&self) -> &[MainQuestion] {
        &self.questions
    }

    pub fn main_question(&self, label: &str) -> Option<&MainQuestion> {
        self.questions.iter().find(|mq| mq.label == label)
    }

    pub fn rule(&self, main_label: &str) -> Option<&SelectionRule> {
        self.rules.get(main_label)
    }

    pub fn rules(&self) -> impl Iterator<Item = &SelectionRule> + '_ {
        self.rules.values()
    }

    pub fn mark(&self, roll_no: RollNo, main: &str, sub: char) -> Option<f64> {
        self.marks.get(roll_no, main, sub)
    }

    pub fn marks(&self) -> &MarksMatrix {
        &self.marks
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn max_total_override(&self) -> Option<f64> {
        self.max_total_override
    }

    fn ensure_unlocked(&self) -> Result<(), SheetError> {
        if self.locked {
            return Err(SheetError::Locked);
        }
        Ok(())
    }

    fn sub_question(&self, main: &str, sub: char) -> Result<&SubQuestion, SheetError> {
        let mq = self
            .main_question(main)
            .ok_or_else(|| SheetError::UnknownMainQuestion(main.to_string()))?;
        mq.sub(sub).ok_or_else(|| SheetError::UnknownSubQuestion {
            main: main.to_string(),
            sub,
        })
    }

    /// Operator mark entry. `""` clears the cell; anything else that does not
    /// parse as a number leaves it untouched.
    pub fn set_mark(
        &mut self,
        roll_no: RollNo,
        main: &str,
        sub: char,
        raw: &str,
    ) -> Result<MarkEdit, SheetError> {
        let max_marks = self.sub_question(main, sub)?.max_marks;
        let student = self
            .student(roll_no)
            .ok_or(SheetError::UnknownStudent(roll_no))?;

        if self.locked {
            return Ok(MarkEdit::Ignored(IgnoreReason::Locked));
        }
        if student.absent {
            return Ok(MarkEdit::Ignored(IgnoreReason::Absent));
        }
        if raw.is_empty() {
            self.marks.clear(roll_no, main, sub);
            return Ok(MarkEdit::Cleared);
        }
        let Some(n) = parse_mark_input(raw) else {
            return Ok(MarkEdit::Ignored(IgnoreReason::NotNumeric));
        };
        let value = clamp_mark(n, max_marks);
        self.marks.set(roll_no, main, sub, value);
        Ok(MarkEdit::Stored(value))
    }

    /// Write path for marks coming from storage. Bypasses the lock and
    /// absence gates but still clamps.
    pub fn record_mark(
        &mut self,
        roll_no: RollNo,
        main: &str,
        sub: char,
        value: Option<f64>,
    ) -> Result<(), SheetError> {
        let max_marks = self.sub_question(main, sub)?.max_marks;
        match value {
            Some(v) if v.is_finite() => {
                self.marks.set(roll_no, main, sub, clamp_mark(v, max_marks))
            }
            _ => self.marks.clear(roll_no, main, sub),
        }
        Ok(())
    }

    pub fn add_student(&mut self, roll_no: RollNo) -> Result<(), SheetError> {
        self.ensure_unlocked()?;
        self.insert_student(Student {
            roll_no,
            absent: false,
        })
    }

    pub(crate) fn insert_student(&mut self, student: Student) -> Result<(), SheetError> {
        if self.students.contains_key(&student.roll_no) {
            return Err(SheetError::DuplicateStudent(student.roll_no));
        }
        self.students.insert(student.roll_no, student);
        Ok(())
    }

    /// Replaces the roster with `from..=to`. Stored marks are kept.
    pub fn generate_roster(
        &mut self,
        from: RollNo,
        to: RollNo,
        max_rows: i64,
        force: bool,
    ) -> Result<usize, SheetError> {
        self.ensure_unlocked()?;
        if from > to {
            return Err(SheetError::BadRange { from, to });
        }
        let count = to.saturating_sub(from).saturating_add(1);
        if count > MAX_ROSTER_ROWS {
            return Err(SheetError::RosterTooLarge {
                count,
                limit: MAX_ROSTER_ROWS,
            });
        }
        if count > max_rows && !force {
            return Err(SheetError::RosterTooLarge {
                count,
                limit: max_rows,
            });
        }
        self.students = (from..=to)
            .map(|roll_no| {
                (
                    roll_no,
                    Student {
                        roll_no,
                        absent: false,
                    },
                )
            })
            .collect();
        Ok(self.students.len())
    }

    pub fn set_absent(&mut self, roll_no: RollNo, absent: bool) -> Result<(), SheetError> {
        self.ensure_unlocked()?;
        let student = self
            .students
            .get_mut(&roll_no)
            .ok_or(SheetError::UnknownStudent(roll_no))?;
        student.absent = absent;
        Ok(())
    }

    pub fn toggle_absent(&mut self, roll_no: RollNo) -> Result<bool, SheetError> {
        let absent = !self
            .student(roll_no)
            .ok_or(SheetError::UnknownStudent(roll_no))?
            .absent;
        self.set_absent(roll_no, absent)?;
        Ok(absent)
    }

    /// Adds a main question with `sub_count` sub-questions lettered from A,
    /// each worth `max_marks`.
    pub fn add_main_question(
        &mut self,
        label: &str,
        sub_count: usize,
        max_marks: f64,
    ) -> Result<&MainQuestion, SheetError> {
        self.ensure_unlocked()?;
        let max_marks = check_max_marks(max_marks)?;
        let sub_questions = (b'A'..)
            .take(sub_count.clamp(1, MAX_SUBS_ON_CREATE))
            .map(|c| SubQuestion {
                label: c as char,
                max_marks,
            })
            .collect();
        self.insert_main_question(label, sub_questions)
    }

    pub(crate) fn insert_main_question(
        &mut self,
        label: &str,
        sub_questions: Vec<SubQuestion>,
    ) -> Result<&MainQuestion, SheetError> {
        let label = label.trim().to_ascii_uppercase();
        if label.is_empty() {
            return Err(SheetError::BadParams(
                "main question label must not be empty".into(),
            ));
        }
        if self.main_question(&label).is_some() {
            return Err(SheetError::DuplicateMainQuestion(label));
        }
        let mut mq = MainQuestion {
            label,
            sub_questions: Vec::with_capacity(sub_questions.len()),
        };
        for sq in sub_questions {
            push_sub_question(&mut mq, sq)?;
        }
        self.questions.push(mq);
        Ok(&self.questions[self.questions.len() - 1])
    }

    /// Appends the next lettered sub-question to `main_label`.
    pub fn add_sub_question(
        &mut self,
        main_label: &str,
        default_max: f64,
    ) -> Result<SubQuestion, SheetError> {
        self.ensure_unlocked()?;
        let mq = self
            .questions
            .iter_mut()
            .find(|mq| mq.label == main_label)
            .ok_or_else(|| SheetError::UnknownMainQuestion(main_label.to_string()))?;
        let label = mq
            .next_sub_label()
            .ok_or_else(|| SheetError::SubQuestionLimit(mq.label.clone()))?;

        let proposed = match mq.sub_questions.last() {
            Some(last) if last.max_marks.is_finite() && last.max_marks > 0.0 => last.max_marks,
            _ if default_max.is_finite() && default_max > 0.0 => default_max,
            _ => 1.0,
        };
        let sq = SubQuestion {
            label,
            max_marks: proposed.round().max(1.0),
        };
        push_sub_question(mq, sq)?;
        Ok(sq)
    }

    /// Unruled -> Ruled, or Ruled -> Ruled with the new counts.
    pub fn apply_rule(
        &mut self,
        main_label: &str,
        min_to_count: i64,
        out_of: i64,
    ) -> Result<RuleApplied, SheetError> {
        self.ensure_unlocked()?;
        let sub_count = self
            .main_question(main_label)
            .ok_or_else(|| SheetError::UnknownMainQuestion(main_label.to_string()))?
            .sub_questions
            .len();
        let rule = SelectionRule::new(main_label, min_to_count, out_of);
        let exceeds_sub_count =
            rule.min_to_count as usize > sub_count || rule.out_of as usize > sub_count;
        let replaced = self.rules.insert(main_label.to_string(), rule.clone());
        Ok(RuleApplied {
            rule,
            replaced,
            exceeds_sub_count,
        })
    }

    /// Ruled -> Unruled. Returns the rule that was in force, if any.
    pub fn remove_rule(&mut self, main_label: &str) -> Result<Option<SelectionRule>, SheetError> {
        self.ensure_unlocked()?;
        Ok(self.rules.remove(main_label))
    }

    /// Rules read back from storage may name questions that are not authored
    /// yet; they are kept as-is.
    pub(crate) fn insert_rule(&mut self, rule: SelectionRule) {
        self.rules.insert(rule.main_label.clone(), rule);
    }

    pub fn finalize(&mut self) -> Result<(), SheetError> {
        self.ensure_unlocked()?;
        self.locked = true;
        Ok(())
    }

    /// Returns whether the sheet was locked before.
    pub fn unfinalize(&mut self) -> bool {
        std::mem::replace(&mut self.locked, false)
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Negative caps are stored as 0.
    pub fn set_max_total_override(&mut self, value: Option<f64>) -> Result<(), SheetError> {
        self.max_total_override = match value {
            None => None,
            Some(v) if v.is_finite() => Some(v.max(0.0)),
            Some(v) => {
                return Err(SheetError::BadParams(format!(
                    "max total override must be finite, got {}",
                    v
                )))
            }
        };
        Ok(())
    }
}

fn push_sub_question(mq: &mut MainQuestion, sq: SubQuestion) -> Result<(), SheetError> {
    if !sq.label.is_ascii_uppercase() {
        return Err(SheetError::BadParams(format!(
            "sub-question label must be a letter A-Z, got {:?}",
            sq.label
        )));
    }
    if mq.sub(sq.label).is_some() {
        return Err(SheetError::DuplicateSubQuestion {
            main: mq.label.clone(),
            sub: sq.label,
        });
    }
    check_max_marks(sq.max_marks)?;
    mq.sub_questions.push(sq);
    Ok(())
}
