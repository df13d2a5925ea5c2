use crate::ipc::error::err;
use crate::model::CatalogFilter;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Integer param, accepting numeric strings from loosely-typed callers.
pub fn get_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    let v = params
        .get(key)
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {key}")))?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .ok_or_else(|| {
            HandlerErr::new("bad_params", format!("{key} must be an integer"))
                .with_details(json!({ key: v }))
        })
}

pub fn get_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {key}")))
}

fn opt_text(params: &serde_json::Value, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn catalog_filter(params: &serde_json::Value) -> CatalogFilter {
    CatalogFilter {
        query: opt_text(params, "query"),
        grade_level: opt_text(params, "gradeLevel"),
        strand: opt_text(params, "strand"),
    }
}
