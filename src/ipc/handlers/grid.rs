use crate::ipc::helpers::{main_label, req_i64, req_str, respond, sheet_mut, sub_label, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::sheet::{ExamSheet, MarkEdit, RollNo};
use serde_json::json;

fn edit_json(edit: MarkEdit) -> serde_json::Value {
    match edit {
        MarkEdit::Stored(v) => json!({ "outcome": "stored", "value": v }),
        MarkEdit::Cleared => json!({ "outcome": "cleared", "value": null }),
        MarkEdit::Ignored(reason) => json!({ "outcome": "ignored", "reason": reason }),
    }
}

/// Raw input is the string as typed; `null` clears like `""` and a JSON
/// number is rendered back to text.
fn raw_input(v: Option<&serde_json::Value>) -> Option<String> {
    match v {
        None => None,
        Some(serde_json::Value::Null) => Some(String::new()),
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(_) => None,
    }
}

fn apply_edit(
    sheet: &mut ExamSheet,
    roll_no: RollNo,
    main: &str,
    sub: char,
    raw: &str,
) -> Result<MarkEdit, HandlerErr> {
    let edit = sheet.set_mark(roll_no, main, sub, raw)?;
    if let MarkEdit::Ignored(reason) = edit {
        tracing::debug!(roll_no, main, %sub, ?reason, "mark edit ignored");
    }
    Ok(edit)
}

fn marks_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let roll_no = req_i64(req, "rollNo")?;
    let main = main_label(req_str(req, "mainLabel")?);
    let sub = sub_label(req_str(req, "subLabel")?)?;
    let Some(raw) = raw_input(req.params.get("raw")) else {
        return Err(HandlerErr::bad_params("missing raw (string, number or null)"));
    };

    let sheet = sheet_mut(state, req)?;
    let edit = apply_edit(sheet, roll_no, &main, sub, &raw)?;
    Ok(edit_json(edit))
}

fn bulk_error(i: usize, code: &str, message: impl Into<String>) -> serde_json::Value {
    json!({
        "index": i,
        "code": code,
        "message": message.into(),
    })
}

fn marks_bulk_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(edits_arr) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits[]"));
    };
    let limit = state.entry.bulk_edit_limit.max(0) as usize;
    if edits_arr.len() > limit {
        let rejected = edits_arr.len();
        return Ok(json!({
            "updated": 0,
            "ignored": 0,
            "rejected": rejected,
            "limitExceeded": true,
            "errors": [bulk_error(
                0,
                "too_many_edits",
                format!("bulk payload exceeds max edits: {} > {}", rejected, limit),
            )]
        }));
    }

    let sheet = sheet_mut(state, req)?;
    let mut updated: usize = 0;
    let mut ignored: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, edit) in edits_arr.iter().enumerate() {
        let Some(obj) = edit.as_object() else {
            errors.push(bulk_error(i, "bad_params", "edit must be an object"));
            continue;
        };
        let Some(roll_no) = obj.get("rollNo").and_then(|v| v.as_i64()) else {
            errors.push(bulk_error(i, "bad_params", "missing/invalid rollNo"));
            continue;
        };
        let Some(main) = obj.get("mainLabel").and_then(|v| v.as_str()).map(main_label) else {
            errors.push(bulk_error(i, "bad_params", "missing/invalid mainLabel"));
            continue;
        };
        let sub = match obj.get("subLabel").and_then(|v| v.as_str()).map(sub_label) {
            Some(Ok(c)) => c,
            _ => {
                errors.push(bulk_error(i, "bad_params", "missing/invalid subLabel"));
                continue;
            }
        };
        let Some(raw) = raw_input(obj.get("raw")) else {
            errors.push(bulk_error(i, "bad_params", "missing/invalid raw"));
            continue;
        };

        match apply_edit(sheet, roll_no, &main, sub, &raw) {
            Ok(MarkEdit::Ignored(_)) => ignored += 1,
            Ok(_) => updated += 1,
            Err(e) => errors.push(bulk_error(i, e.code, e.message)),
        }
    }

    Ok(json!({
        "updated": updated,
        "ignored": ignored,
        "rejected": errors.len(),
        "errors": errors
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.set" => marks_set(state, req),
        "marks.bulkSet" => marks_bulk_set(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
