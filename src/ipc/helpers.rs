use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::sheet::{ExamSheet, SheetError};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SheetError> for HandlerErr {
    fn from(e: SheetError) -> Self {
        let details = match &e {
            SheetError::BadRange { from, to } => Some(json!({ "from": from, "to": to })),
            SheetError::RosterTooLarge { count, limit } => {
                Some(json!({ "count": count, "limit": limit }))
            }
            SheetError::UnknownStudent(roll_no) | SheetError::DuplicateStudent(roll_no) => {
                Some(json!({ "rollNo": roll_no }))
            }
            _ => None,
        };
        Self {
            code: e.code(),
            message: e.to_string(),
            details,
        }
    }
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn req_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_str<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn req_i64(req: &Request, key: &str) -> Result<i64, HandlerErr> {
    match req.params.get(key) {
        None => Err(HandlerErr::bad_params(format!("missing {}", key))),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be integer", key))),
    }
}

pub fn opt_f64(req: &Request, key: &str) -> Result<Option<f64>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn opt_bool(req: &Request, key: &str) -> Result<Option<bool>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

/// Main labels are stored upper-cased.
pub fn main_label(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn sub_label(raw: &str) -> Result<char, HandlerErr> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c.to_ascii_uppercase()),
        _ => Err(HandlerErr {
            code: "bad_params",
            message: "subLabel must be a single letter".to_string(),
            details: Some(json!({ "subLabel": raw })),
        }),
    }
}

fn sheet_not_found(sheet_id: &str) -> HandlerErr {
    HandlerErr {
        code: "not_found",
        message: "sheet not found".to_string(),
        details: Some(json!({ "sheetId": sheet_id })),
    }
}

pub fn sheet<'a>(state: &'a AppState, req: &Request) -> Result<&'a ExamSheet, HandlerErr> {
    let sheet_id = req_str(req, "sheetId")?;
    state
        .sheets
        .get(sheet_id)
        .map(|open| &open.sheet)
        .ok_or_else(|| sheet_not_found(sheet_id))
}

pub fn sheet_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut ExamSheet, HandlerErr> {
    let sheet_id = req_str(req, "sheetId")?;
    state
        .sheets
        .get_mut(sheet_id)
        .map(|open| &mut open.sheet)
        .ok_or_else(|| sheet_not_found(sheet_id))
}
