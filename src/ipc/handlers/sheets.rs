use crate::ipc::helpers::{
    opt_f64, opt_i64, opt_str, req_str, respond, sheet, sheet_mut, HandlerErr,
};
use crate::ipc::types::{AppState, OpenSheet, Request};
use crate::payload::{self, ExamMarksIn};
use crate::sheet::{ExamMeta, ExamSheet, ExamType};
use chrono::{Datelike, Local, Utc};
use serde_json::json;
use uuid::Uuid;

/// `"YYYY-(YYYY+1)"` for the current local year.
fn default_academic_year() -> String {
    let year = Local::now().year();
    format!("{}-{}", year, year + 1)
}

fn open(state: &mut AppState, sheet: ExamSheet) -> String {
    let sheet_id = Uuid::new_v4().to_string();
    state.sheets.insert(
        sheet_id.clone(),
        OpenSheet {
            sheet,
            opened_at: Utc::now(),
        },
    );
    sheet_id
}

fn sheet_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let exam_type = match opt_str(req, "examType")? {
        None => ExamType::default(),
        Some(s) => ExamType::parse(s).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "examType must be one of: Internal, External, Practical, ATKT, Other"
                .to_string(),
            details: Some(json!({ "examType": s })),
        })?,
    };
    let semester = opt_i64(req, "semester")?.unwrap_or(1);
    if semester < 1 {
        return Err(HandlerErr::bad_params("semester must be >= 1"));
    }
    let academic_year = opt_str(req, "academicYear")?
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(default_academic_year);

    let meta = ExamMeta {
        exam_id: opt_i64(req, "examId")?,
        subject_code: opt_str(req, "subjectCode")?.unwrap_or("").trim().to_string(),
        subject_name: opt_str(req, "subjectName")?.unwrap_or("").trim().to_string(),
        exam_type,
        semester,
        academic_year: academic_year.clone(),
    };
    let sheet_id = open(state, ExamSheet::new(meta));
    tracing::info!(%sheet_id, %academic_year, "sheet created");
    Ok(json!({ "sheetId": sheet_id, "academicYear": academic_year }))
}

fn sheet_load(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(raw) = req.params.get("payload") else {
        return Err(HandlerErr::bad_params("missing payload"));
    };
    let parsed: ExamMarksIn = serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("invalid payload: {}", e),
        details: None,
    })?;
    let sheet = payload::sheet_from_payload(&parsed, default_academic_year)?;
    let students = sheet.student_count();
    let questions = sheet.questions().len();
    let sheet_id = open(state, sheet);
    tracing::info!(%sheet_id, students, questions, "sheet loaded");
    Ok(json!({
        "sheetId": sheet_id,
        "students": students,
        "mainQuestions": questions
    }))
}

fn sheet_export(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet = sheet(state, req)?;
    Ok(json!(payload::payload_from_sheet(sheet)))
}

fn sheet_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let mut entries: Vec<(&String, &OpenSheet)> = state.sheets.iter().collect();
    entries.sort_by(|a, b| a.1.opened_at.cmp(&b.1.opened_at).then_with(|| a.0.cmp(b.0)));
    let sheets: Vec<serde_json::Value> = entries
        .into_iter()
        .map(|(id, o)| {
            json!({
                "sheetId": id,
                "meta": o.sheet.meta,
                "locked": o.sheet.is_locked(),
                "students": o.sheet.student_count(),
                "mainQuestions": o.sheet.questions().len(),
                "openedAt": o.opened_at.to_rfc3339(),
            })
        })
        .collect();
    Ok(json!({ "sheets": sheets }))
}

fn sheet_close(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet_id = req_str(req, "sheetId")?;
    if state.sheets.remove(sheet_id).is_none() {
        return Err(HandlerErr {
            code: "not_found",
            message: "sheet not found".to_string(),
            details: Some(json!({ "sheetId": sheet_id })),
        });
    }
    tracing::info!(%sheet_id, "sheet closed");
    Ok(json!({ "ok": true }))
}

fn sheet_finalize(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet_id = req_str(req, "sheetId")?;
    sheet_mut(state, req)?.finalize()?;
    tracing::info!(%sheet_id, "sheet finalized");
    Ok(json!({ "locked": true }))
}

fn sheet_unfinalize(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet = sheet_mut(state, req)?;
    let was_locked = sheet.unfinalize();
    Ok(json!({ "locked": false, "wasLocked": was_locked }))
}

fn sheet_set_max_override(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let value = opt_f64(req, "value")?;
    let sheet = sheet_mut(state, req)?;
    sheet.set_max_total_override(value)?;
    Ok(json!({ "maxTotalOverride": sheet.max_total_override() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sheet.create" => sheet_create(state, req),
        "sheet.load" => sheet_load(state, req),
        "sheet.export" => sheet_export(state, req),
        "sheet.list" => sheet_list(state, req),
        "sheet.close" => sheet_close(state, req),
        "sheet.finalize" => sheet_finalize(state, req),
        "sheet.unfinalize" => sheet_unfinalize(state, req),
        "sheet.setMaxOverride" => sheet_set_max_override(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
