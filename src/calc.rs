use crate::sheet::{ExamMeta, ExamSheet, MainQuestion, RollNo, SelectionRule, Student};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;

/// Sentinel shown in place of totals for absent students.
pub const ABSENT_MARKER: &str = "AB";

/// Half-up rounding to 2 decimals, applied at mark entry.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

/// Sums `values`, keeping only the highest `min_to_count` when a rule is
/// given. A rule asking for more values than exist sums all of them.
pub fn best_of<I>(values: I, rule: Option<&SelectionRule>) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let Some(rule) = rule else {
        return values.into_iter().sum();
    };
    let mut sorted: Vec<f64> = values.into_iter().collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    sorted.iter().take(rule.min_to_count as usize).sum()
}

/// Total for one main question. Unset cells are skipped, not zeroed.
/// Absence is not consulted here; see `student_totals`.
pub fn main_total(sheet: &ExamSheet, roll_no: RollNo, mq: &MainQuestion) -> f64 {
    let entered = mq
        .sub_questions
        .iter()
        .filter_map(|sq| sheet.mark(roll_no, &mq.label, sq.label));
    best_of(entered, sheet.rule(&mq.label))
}

/// Sum of `main_total` over every main question in sheet order.
pub fn grand_total(sheet: &ExamSheet, roll_no: RollNo) -> f64 {
    sheet
        .questions()
        .iter()
        .map(|mq| main_total(sheet, roll_no, mq))
        .sum()
}

/// Nominal ceiling: every sub-question at full marks, rules ignored.
pub fn max_total(sheet: &ExamSheet) -> f64 {
    sheet
        .questions()
        .iter()
        .map(|mq| mq.sub_maxes().sum::<f64>())
        .sum()
}

fn rule_adjusted_max(sheet: &ExamSheet, mq: &MainQuestion) -> f64 {
    best_of(mq.sub_maxes(), sheet.rule(&mq.label))
}

/// Ceiling after applying each main question's selection rule to its maxima.
pub fn computed_grand_max(sheet: &ExamSheet) -> f64 {
    sheet
        .questions()
        .iter()
        .map(|mq| rule_adjusted_max(sheet, mq))
        .sum()
}

/// An operator cap can only lower the computed ceiling.
pub fn displayed_max(sheet: &ExamSheet, cap: Option<f64>) -> f64 {
    let computed = computed_grand_max(sheet);
    match cap {
        Some(cap) => computed.min(cap),
        None => computed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TotalCell {
    Absent,
    Score(f64),
}

impl Serialize for TotalCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TotalCell::Absent => serializer.serialize_str(ABSENT_MARKER),
            TotalCell::Score(v) => serializer.serialize_f64(*v),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTotals {
    pub roll_no: RollNo,
    pub absent: bool,
    pub main_totals: Vec<TotalCell>,
    pub grand_total: TotalCell,
}

pub fn student_totals(sheet: &ExamSheet, student: &Student) -> StudentTotals {
    if student.absent {
        return StudentTotals {
            roll_no: student.roll_no,
            absent: true,
            main_totals: vec![TotalCell::Absent; sheet.questions().len()],
            grand_total: TotalCell::Absent,
        };
    }
    StudentTotals {
        roll_no: student.roll_no,
        absent: false,
        main_totals: sheet
            .questions()
            .iter()
            .map(|mq| TotalCell::Score(main_total(sheet, student.roll_no, mq)))
            .collect(),
        grand_total: TotalCell::Score(grand_total(sheet, student.roll_no)),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubColumn {
    pub key: String,
    pub label: char,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainQuestionSummary {
    pub label: String,
    pub sub_questions: Vec<SubColumn>,
    pub rule: Option<SelectionRule>,
    pub nominal_max: f64,
    pub rule_adjusted_max: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCounts {
    pub students: usize,
    pub absent: usize,
    pub main_questions: usize,
    pub columns: usize,
    pub entered_marks: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSummary {
    pub meta: ExamMeta,
    pub locked: bool,
    pub questions: Vec<MainQuestionSummary>,
    pub per_student: Vec<StudentTotals>,
    pub max_total: f64,
    pub computed_grand_max: f64,
    pub max_total_override: Option<f64>,
    pub displayed_max: f64,
    pub counts: SheetCounts,
}

pub fn summarize(sheet: &ExamSheet) -> SheetSummary {
    let questions: Vec<MainQuestionSummary> = sheet
        .questions()
        .iter()
        .map(|mq| MainQuestionSummary {
            label: mq.label.clone(),
            sub_questions: mq
                .sub_questions
                .iter()
                .map(|sq| SubColumn {
                    key: format!("{}.{}", mq.label, sq.label),
                    label: sq.label,
                    max_marks: sq.max_marks,
                })
                .collect(),
            rule: sheet.rule(&mq.label).cloned(),
            nominal_max: mq.sub_maxes().sum(),
            rule_adjusted_max: rule_adjusted_max(sheet, mq),
        })
        .collect();

    let per_student: Vec<StudentTotals> = sheet
        .students()
        .map(|s| student_totals(sheet, s))
        .collect();

    let counts = SheetCounts {
        students: sheet.student_count(),
        absent: sheet.students().filter(|s| s.absent).count(),
        main_questions: questions.len(),
        columns: questions.iter().map(|q| q.sub_questions.len()).sum(),
        entered_marks: sheet
            .students()
            .map(|s| sheet.marks().count_for(s.roll_no))
            .sum(),
    };

    SheetSummary {
        meta: sheet.meta.clone(),
        locked: sheet.is_locked(),
        max_total: max_total(sheet),
        computed_grand_max: computed_grand_max(sheet),
        max_total_override: sheet.max_total_override(),
        displayed_max: displayed_max(sheet, sheet.max_total_override()),
        questions,
        per_student,
        counts,
    }
}
