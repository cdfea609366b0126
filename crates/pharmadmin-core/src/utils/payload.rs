//! Shaping JSON payloads before they are submitted to the backend.

use serde_json::{Map, Value};

/// True for values the backend treats as "not provided".
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Drop top-level fields that are null or the empty string.
/// Non-object values are returned unchanged.
pub fn clean_payload(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !is_blank(v)).collect()),
        other => other,
    }
}

/// Re-key an inventory row for submission: the row's `drug_name` is sent as
/// `name` and its `id` as `drug_id`. Other fields pass through, then blanks
/// are removed.
pub fn prepare_drug_submission(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    let name = map.remove("drug_name").unwrap_or(Value::Null);
    let id = map.remove("id").unwrap_or(Value::Null);
    map.insert("name".to_string(), name);
    map.insert("drug_id".to_string(), id);
    clean_payload(Value::Object(map))
}

/// Build an object from pairs, as typed on a command line (`key=value`).
/// Numbers and booleans are kept as JSON scalars.
pub fn object_from_pairs<'a, I>(pairs: I) -> Result<Map<String, Value>, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut map = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("missing key in '{}'", pair));
        }
        let value = match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => match raw.parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(raw.to_string()),
            },
        };
        map.insert(key.to_string(), value);
    }
    Ok(map)
}
