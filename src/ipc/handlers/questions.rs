use crate::ipc::helpers::{main_label, opt_f64, opt_i64, req_str, respond, sheet_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn questions_add_main(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let label = req_str(req, "label")?;
    let sub_count = opt_i64(req, "subCount")?.unwrap_or(state.entry.default_sub_question_count);
    let max_marks = opt_f64(req, "maxMarks")?.unwrap_or(state.entry.default_sub_question_max);

    let sheet = sheet_mut(state, req)?;
    let mq = sheet.add_main_question(label, sub_count.max(1) as usize, max_marks)?;
    tracing::info!(label = %mq.label, subs = mq.sub_questions.len(), "main question added");
    Ok(json!({
        "label": mq.label,
        "subQuestions": mq.sub_questions
    }))
}

fn questions_add_sub(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let main = main_label(req_str(req, "mainLabel")?);
    let default_max = state.entry.default_sub_question_max;

    let sheet = sheet_mut(state, req)?;
    let sq = sheet.add_sub_question(&main, default_max)?;
    Ok(json!({
        "mainLabel": main,
        "label": sq.label,
        "maxMarks": sq.max_marks
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "questions.addMain" => questions_add_main(state, req),
        "questions.addSub" => questions_add_sub(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
