// diagnostics/src/diagnostic.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One compiler-reported issue
///
/// Positions are 1-indexed as reported by the checker. Line `0` is used by
/// checkers for errors that have no precise location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source line (1-indexed, 0 when unknown)
    #[serde(default, deserialize_with = "lenient_position")]
    pub line: u32,
    /// Source column
    #[serde(default, deserialize_with = "lenient_position")]
    pub column: u32,
    /// Human readable message
    #[serde(rename = "msg", alias = "message", default, deserialize_with = "lenient_text")]
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }

    /// Decode a single entry, falling back to a position-less diagnostic
    /// carrying the raw entry when it cannot be read as an object.
    fn from_value_lossy(value: Value) -> Self {
        match serde_json::from_value::<Diagnostic>(value.clone()) {
            Ok(diagnostic) => diagnostic,
            Err(err) => {
                tracing::debug!("Coercing malformed diagnostic entry: {}", err);
                let message = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Self::new(0, 0, message)
            }
        }
    }
}

/// Outcome of checking a contract source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum CheckResult {
    Success,
    Fail {
        #[serde(default, deserialize_with = "lenient_diagnostics")]
        message: Vec<Diagnostic>,
    },
}

impl CheckResult {
    pub fn fail(diagnostics: Vec<Diagnostic>) -> Self {
        CheckResult::Fail {
            message: diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CheckResult::Success)
    }

    /// Diagnostics carried by a failed check (empty on success)
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CheckResult::Success => &[],
            CheckResult::Fail { message } => message,
        }
    }

    /// The value a source file's `error` field takes after this check
    pub fn to_error(&self) -> Option<Vec<Diagnostic>> {
        match self {
            CheckResult::Success => None,
            CheckResult::Fail { message } => Some(message.clone()),
        }
    }
}

/// Decode checker JSON output.
///
/// This is the entry point for checkers running outside the process, which
/// report over JSON. In-process checkers hand back a typed [`CheckResult`]
/// and skip it.
///
/// Individual malformed diagnostics never fail the batch; only a payload
/// without a recognizable `result` tag is an error.
pub fn parse_check_result(json: &str) -> Result<CheckResult, serde_json::Error> {
    serde_json::from_str(json)
}

fn lenient_position<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(position_from_value).unwrap_or(0))
}

fn position_from_value(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<u32>().unwrap_or(0),
        _ => 0,
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

fn lenient_diagnostics<'de, D>(deserializer: D) -> Result<Vec<Diagnostic>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .map(Diagnostic::from_value_lossy)
            .collect(),
        // Some checkers report a bare string instead of a list
        Some(Value::String(s)) => vec![Diagnostic::new(0, 0, s)],
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let result = parse_check_result(r#"{"result":"success"}"#).unwrap();
        assert!(result.is_success());
        assert!(result.diagnostics().is_empty());
        assert_eq!(result.to_error(), None);
    }

    #[test]
    fn test_parse_fail_with_numeric_and_string_positions() {
        let json = r#"{
            "result": "fail",
            "message": [
                {"line": 0, "column": 3, "msg": "x"},
                {"line": "12", "column": "7", "msg": "type mismatch"}
            ]
        }"#;

        let result = parse_check_result(json).unwrap();
        assert_eq!(
            result.diagnostics(),
            &[
                Diagnostic::new(0, 3, "x"),
                Diagnostic::new(12, 7, "type mismatch"),
            ]
        );
    }

    #[test]
    fn test_malformed_entries_do_not_suppress_batch() {
        let json = r#"{
            "result": "fail",
            "message": [
                {"column": 4, "msg": "no line"},
                {"line": "abc", "column": null, "msg": "garbage position"},
                "bare string entry",
                {"line": 5, "column": 1, "msg": "fine"}
            ]
        }"#;

        let result = parse_check_result(json).unwrap();
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 4);
        assert_eq!(diagnostics[0], Diagnostic::new(0, 4, "no line"));
        assert_eq!(diagnostics[1], Diagnostic::new(0, 0, "garbage position"));
        assert_eq!(diagnostics[2], Diagnostic::new(0, 0, "bare string entry"));
        assert_eq!(diagnostics[3], Diagnostic::new(5, 1, "fine"));
    }

    #[test]
    fn test_negative_position_coerced_to_zero() {
        let json = r#"{"result":"fail","message":[{"line":-3,"column":-1,"msg":"m"}]}"#;
        let result = parse_check_result(json).unwrap();
        assert_eq!(result.diagnostics(), &[Diagnostic::new(0, 0, "m")]);
    }

    #[test]
    fn test_unknown_result_tag_is_error() {
        assert!(parse_check_result(r#"{"result":"maybe"}"#).is_err());
    }

    #[test]
    fn test_serialize_uses_checker_field_names() {
        let result = CheckResult::fail(vec![Diagnostic::new(2, 1, "oops")]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["result"], "fail");
        assert_eq!(json["message"][0]["msg"], "oops");
    }
}
