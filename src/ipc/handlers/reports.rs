use crate::calc;
use crate::ipc::helpers::{req_i64, respond, sheet, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::sheet::SheetError;
use serde_json::json;

fn sheet_summary(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let sheet = sheet(state, req)?;
    Ok(json!(calc::summarize(sheet)))
}

fn sheet_totals(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let roll_no = req_i64(req, "rollNo")?;
    let sheet = sheet(state, req)?;
    let student = sheet
        .student(roll_no)
        .ok_or(SheetError::UnknownStudent(roll_no))?;
    let totals = calc::student_totals(sheet, student);
    Ok(json!({
        "totals": totals,
        "maxTotal": calc::max_total(sheet),
        "computedGrandMax": calc::computed_grand_max(sheet),
        "displayedMax": calc::displayed_max(sheet, sheet.max_total_override()),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sheet.summary" => sheet_summary(state, req),
        "sheet.totals" => sheet_totals(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
