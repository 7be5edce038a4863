use crate::ipc::helpers::{opt_bool, req_i64, respond, sheet_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn roster_generate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let from = req_i64(req, "from")?;
    let to = req_i64(req, "to")?;
    let force = opt_bool(req, "force")?.unwrap_or(false);
    let max_rows = state.entry.max_generate_rows;

    let sheet = sheet_mut(state, req)?;
    let count = sheet.generate_roster(from, to, max_rows, force)?;
    tracing::info!(from, to, count, "roster generated");
    Ok(json!({ "count": count }))
}

fn roster_add_student(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let roll_no = req_i64(req, "rollNo")?;
    let sheet = sheet_mut(state, req)?;
    sheet.add_student(roll_no)?;
    Ok(json!({ "rollNo": roll_no, "count": sheet.student_count() }))
}

/// Sets `absent` when given, otherwise toggles it.
fn roster_set_absent(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let roll_no = req_i64(req, "rollNo")?;
    let absent = opt_bool(req, "absent")?;
    let sheet = sheet_mut(state, req)?;
    let absent = match absent {
        Some(v) => {
            sheet.set_absent(roll_no, v)?;
            v
        }
        None => sheet.toggle_absent(roll_no)?,
    };
    Ok(json!({ "rollNo": roll_no, "absent": absent }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "roster.generate" => roster_generate(state, req),
        "roster.addStudent" => roster_add_student(state, req),
        "roster.setAbsent" => roster_set_absent(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
