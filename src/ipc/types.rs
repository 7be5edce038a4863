use crate::config::EntryDefaults;
use crate::sheet::ExamSheet;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct OpenSheet {
    pub sheet: ExamSheet,
    pub opened_at: DateTime<Utc>,
}

pub struct AppState {
    pub sheets: HashMap<String, OpenSheet>,
    pub entry: EntryDefaults,
}

impl AppState {
    pub fn new(entry: EntryDefaults) -> Self {
        Self {
            sheets: HashMap::new(),
            entry,
        }
    }
}
