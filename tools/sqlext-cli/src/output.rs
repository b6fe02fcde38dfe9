///
/// Result rendering for the shell: tab-separated text or one JSON array per
/// row.
///

use serde_json::{Number as JsonNumber, Value as JsonValue};
use std::fmt::Write as _;

use sqlext::DatabaseValue;

use crate::errors::CliError;

pub fn format_row(row: &[DatabaseValue], json: bool) -> Result<String, CliError> {
    if json {
        let values: Vec<JsonValue> = row.iter().map(json_value).collect();
        Ok(serde_json::to_string(&values)?)
    } else {
        Ok(row.iter().map(text_value).collect::<Vec<_>>().join("\t"))
    }
}

fn text_value(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::Null => "NULL".to_string(),
        DatabaseValue::Integer(i) => i.to_string(),
        DatabaseValue::Real(f) => f.to_string(),
        DatabaseValue::Text(s) => s.clone(),
        DatabaseValue::Blob(bytes) => format!("x'{}'", hex(bytes)),
    }
}

fn json_value(value: &DatabaseValue) -> JsonValue {
    match value {
        DatabaseValue::Null => JsonValue::Null,
        DatabaseValue::Integer(i) => JsonValue::from(*i),
        // NaN and infinities have no JSON form
        DatabaseValue::Real(f) => JsonNumber::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        DatabaseValue::Text(s) => JsonValue::String(s.clone()),
        DatabaseValue::Blob(bytes) => JsonValue::String(hex(bytes)),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<DatabaseValue> {
        vec![
            DatabaseValue::Null,
            DatabaseValue::Integer(-7),
            DatabaseValue::Real(2.5),
            DatabaseValue::Text("Köln".into()),
            DatabaseValue::Blob(vec![0, 171, 255]),
        ]
    }

    #[test]
    fn test_tab_separated_row() {
        assert_eq!(
            format_row(&sample(), false).unwrap(),
            "NULL\t-7\t2.5\tKöln\tx'00abff'"
        );
        assert_eq!(format_row(&[], false).unwrap(), "");
    }

    #[test]
    fn test_json_row() {
        assert_eq!(
            format_row(&sample(), true).unwrap(),
            r#"[null,-7,2.5,"Köln","00abff"]"#
        );
        assert_eq!(
            format_row(&[DatabaseValue::Real(f64::NAN)], true).unwrap(),
            "[null]"
        );
    }
}
