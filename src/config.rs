use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

pub const CONFIG_ENV: &str = "MARKSHEETD_CONFIG";

/// Operator-tunable defaults used when authoring a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDefaults {
    pub default_sub_question_max: f64,
    pub default_sub_question_count: i64,
    pub max_generate_rows: i64,
    pub bulk_edit_limit: i64,
}

impl Default for EntryDefaults {
    fn default() -> Self {
        Self {
            default_sub_question_max: 2.0,
            default_sub_question_count: 1,
            max_generate_rows: 500,
            bulk_edit_limit: 5000,
        }
    }
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

impl EntryDefaults {
    /// Applies a camelCase patch. Fields are validated one by one and the
    /// first failure leaves `self` untouched.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<(), String> {
        let mut next = self.clone();
        for (k, v) in patch {
            match k.as_str() {
                "defaultSubQuestionMax" => {
                    next.default_sub_question_max = parse_f64_range(v, k, 0.25, 1000.0)?;
                }
                "defaultSubQuestionCount" => {
                    next.default_sub_question_count = parse_i64_range(v, k, 1, 10)?;
                }
                "maxGenerateRows" => {
                    next.max_generate_rows = parse_i64_range(v, k, 1, 100_000)?;
                }
                "bulkEditLimit" => {
                    next.bulk_edit_limit = parse_i64_range(v, k, 1, 100_000)?;
                }
                _ => return Err(format!("unknown entry field: {}", k)),
            }
        }
        *self = next;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&text)?;
        let Some(obj) = raw.as_object() else {
            anyhow::bail!("config root must be a JSON object");
        };
        let mut cfg = Self::default();
        // Accept either a bare patch or `{ "entry": { ... } }`.
        let patch = match obj.get("entry").and_then(|v| v.as_object()) {
            Some(entry) => entry,
            None => obj,
        };
        cfg.apply_patch(patch).map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Reads the file named by `MARKSHEETD_CONFIG`, if any. A bad file is
    /// logged and ignored; it must not keep the sidecar from starting.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV) else {
            return Self::default();
        };
        let path = Path::new(&path);
        match Self::load(path) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "loaded entry defaults");
                cfg
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring config: {e:#}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn patch_updates_known_fields() {
        let mut cfg = EntryDefaults::default();
        cfg.apply_patch(&patch(json!({
            "defaultSubQuestionMax": 5,
            "maxGenerateRows": 120
        })))
        .expect("apply");
        assert_eq!(cfg.default_sub_question_max, 5.0);
        assert_eq!(cfg.max_generate_rows, 120);
        assert_eq!(cfg.bulk_edit_limit, 5000);
    }

    #[test]
    fn bad_patch_is_all_or_nothing() {
        let mut cfg = EntryDefaults::default();
        let res = cfg.apply_patch(&patch(json!({
            "maxGenerateRows": 10,
            "defaultSubQuestionCount": 11
        })));
        assert!(res.is_err());
        assert_eq!(cfg, EntryDefaults::default());

        let res = cfg.apply_patch(&patch(json!({ "colour": "blue" })));
        assert_eq!(res.unwrap_err(), "unknown entry field: colour");
    }

    #[test]
    fn load_accepts_nested_entry_section() {
        let p = std::env::temp_dir().join(format!(
            "marksheetd-config-{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::write(&p, r#"{ "entry": { "defaultSubQuestionCount": 4 } }"#).expect("write");
        let cfg = EntryDefaults::load(&p).expect("load");
        assert_eq!(cfg.default_sub_question_count, 4);
        let _ = std::fs::remove_file(&p);
    }
}
