use crate::ipc::helpers::{main_label, req_i64, req_str, respond, sheet, sheet_mut, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn rules_apply(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let main = main_label(req_str(req, "mainLabel")?);
    let min_to_count = req_i64(req, "minToCount")?;
    let out_of = req_i64(req, "outOf")?;

    let applied = sheet_mut(state, req)?.apply_rule(&main, min_to_count, out_of)?;
    if applied.exceeds_sub_count {
        tracing::warn!(
            main_label = %main,
            min_to_count = applied.rule.min_to_count,
            out_of = applied.rule.out_of,
            "rule exceeds current sub-question count"
        );
    }
    Ok(json!({
        "rule": applied.rule,
        "replaced": applied.replaced,
        "exceedsSubCount": applied.exceeds_sub_count
    }))
}

fn rules_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let main = main_label(req_str(req, "mainLabel")?);
    let removed = sheet_mut(state, req)?.remove_rule(&main)?;
    Ok(json!({ "removed": removed.is_some() }))
}

fn rules_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let rules: Vec<_> = sheet(state, req)?.rules().cloned().collect();
    Ok(json!({ "rules": rules }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rules.apply" => rules_apply(state, req),
        "rules.remove" => rules_remove(state, req),
        "rules.list" => rules_list(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
