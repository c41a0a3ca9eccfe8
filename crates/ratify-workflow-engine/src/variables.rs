//! Conversion between plain JSON variables and Camunda's typed variables.
//!
//! Camunda represents each variable as `{"value": .., "type": ..}`. Objects
//! and arrays travel as serialized strings of type `Json`.

use ratify_types::Variables;
use serde_json::{Map, Value, json};

/// Encode plain variables into Camunda's typed form.
pub(crate) fn encode(variables: &Variables) -> Value {
  let typed: Map<String, Value> = variables
    .iter()
    .map(|(name, value)| (name.clone(), encode_value(value)))
    .collect();
  Value::Object(typed)
}

fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "value": null, "type": "Null" }),
    Value::Bool(b) => json!({ "value": b, "type": "Boolean" }),
    Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "value": n, "type": "Long" }),
    Value::Number(n) => json!({ "value": n, "type": "Double" }),
    Value::String(s) => json!({ "value": s, "type": "String" }),
    Value::Array(_) | Value::Object(_) => {
      json!({ "value": value.to_string(), "type": "Json" })
    }
  }
}

/// Decode Camunda's typed variables into plain JSON.
///
/// Entries that are not shaped like typed variables are kept as-is.
pub(crate) fn decode(typed: Map<String, Value>) -> Variables {
  typed
    .into_iter()
    .map(|(name, entry)| (name, decode_value(entry)))
    .collect()
}

fn decode_value(entry: Value) -> Value {
  let Value::Object(mut fields) = entry else {
    return entry;
  };

  let kind = fields
    .get("type")
    .and_then(Value::as_str)
    .map(str::to_string);
  let value = fields.remove("value").unwrap_or(Value::Null);

  match (kind.as_deref(), value) {
    (Some("Json" | "Object"), Value::String(raw)) => {
      serde_json::from_str(&raw).unwrap_or(Value::String(raw))
    }
    (_, value) => value,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_encode_types() {
    let mut vars = Variables::new();
    vars.insert("draftId".to_string(), json!("d1"));
    vars.insert("approved".to_string(), json!(true));
    vars.insert("attempt".to_string(), json!(2));
    vars.insert("meta".to_string(), json!({ "a": 1 }));

    let encoded = encode(&vars);
    assert_eq!(encoded["draftId"], json!({ "value": "d1", "type": "String" }));
    assert_eq!(encoded["approved"], json!({ "value": true, "type": "Boolean" }));
    assert_eq!(encoded["attempt"], json!({ "value": 2, "type": "Long" }));
    assert_eq!(encoded["meta"], json!({ "value": "{\"a\":1}", "type": "Json" }));
  }

  #[test]
  fn test_decode_parses_json_variables() {
    let typed = json!({
      "draftId": { "value": "d1", "type": "String", "valueInfo": {} },
      "meta": { "value": "{\"a\":1}", "type": "Json" },
      "raw": 5,
    });
    let Value::Object(typed) = typed else {
      unreachable!()
    };

    let vars = decode(typed);
    assert_eq!(vars["draftId"], json!("d1"));
    assert_eq!(vars["meta"], json!({ "a": 1 }));
    assert_eq!(vars["raw"], json!(5));
  }
}
