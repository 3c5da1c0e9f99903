//! Object methods and `Object.*` statics

use super::CallArgs;
use crate::context::FORBIDDEN_KEYS;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::RuntimeValue;
use serde_json::{Map, Value};

/// `Object.<function>(...)`
pub fn call_namespace(function: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    match function {
        "keys" | "values" | "entries" => {
            let map = as_map(args.json(0)?);
            Ok(listing(function, &map))
        }
        "assign" => {
            let mut target = args.get_object(0, "target")?;
            for source in args.rest(1)? {
                if let Value::Object(map) = source.into_json() {
                    for (key, value) in map {
                        target.insert(checked_key(key)?, value);
                    }
                }
            }
            Ok(RuntimeValue::Json(Value::Object(target)))
        }
        "fromEntries" => {
            let entries = args.get_array(0, "entries")?;
            let mut out = Map::with_capacity(entries.len());
            for entry in entries {
                let Value::Array(pair) = entry else {
                    return Err(args.invalid("Each entry must be a [key, value] array"));
                };
                let mut pair = pair.into_iter();
                let key = pair.next().map(|k| match k {
                    Value::String(s) => s,
                    other => crate::value_utils::to_js_string(&other),
                });
                let Some(key) = key else {
                    return Err(args.invalid("Each entry must be a [key, value] array"));
                };
                out.insert(checked_key(key)?, pair.next().unwrap_or(Value::Null));
            }
            Ok(RuntimeValue::Json(Value::Object(out)))
        }
        _ => Err(ExpressionError::function_not_found(args.function())),
    }
}

/// Call `method` on an object receiver
pub fn call_method(
    map: Map<String, Value>,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    match method {
        "keys" | "values" | "entries" => Ok(listing(method, &map)),
        "hasOwnProperty" | "hasField" => {
            let key = args.get_string(0)?;
            Ok(RuntimeValue::bool(map.contains_key(&key)))
        }
        "removeField" => {
            let key = args.get_string(0)?;
            let mut map = map;
            map.shift_remove(&key);
            Ok(RuntimeValue::Json(Value::Object(map)))
        }
        "isEmpty" => Ok(RuntimeValue::bool(map.is_empty())),
        "isNotEmpty" => Ok(RuntimeValue::bool(!map.is_empty())),
        "compact" => Ok(RuntimeValue::Json(Value::Object(
            map.into_iter()
                .filter(|(_, value)| !value.is_null() && value.as_str() != Some(""))
                .collect(),
        ))),
        "toJsonString" => Ok(RuntimeValue::string(serde_json::to_string(&Value::Object(
            map,
        ))?)),
        _ => Err(ExpressionError::function_not_found(format!("object.{method}"))),
    }
}

/// Object view of any value; arrays list their indices, primitives are empty
fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Map::new(),
    }
}

fn listing(kind: &str, map: &Map<String, Value>) -> RuntimeValue {
    let items = match kind {
        "keys" => map.keys().cloned().map(Value::String).collect(),
        "values" => map.values().cloned().collect(),
        _ => map
            .iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
            .collect(),
    };
    RuntimeValue::Json(Value::Array(items))
}

fn checked_key(key: String) -> ExpressionResult<String> {
    if FORBIDDEN_KEYS.contains(&key.as_str()) {
        return Err(ExpressionError::security(format!(
            "Object key '{key}' is not allowed"
        )));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Arg;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(name: &str, values: &[Value]) -> CallArgs<'static> {
        CallArgs::new(
            name,
            values
                .iter()
                .map(|v| Arg::Value(RuntimeValue::Json(v.clone())))
                .collect(),
        )
    }

    fn method(map: Value, name: &str, values: &[Value]) -> Value {
        let Value::Object(map) = map else {
            panic!("not an object");
        };
        call_method(map, name, &args(name, values)).unwrap().into_json()
    }

    #[test]
    fn test_listing_preserves_insertion_order() {
        let obj = json!({"b": 1, "a": 2});
        assert_eq!(method(obj.clone(), "keys", &[]), json!(["b", "a"]));
        assert_eq!(method(obj.clone(), "values", &[]), json!([1, 2]));
        assert_eq!(
            call_namespace("entries", &args("Object.entries", &[obj])).unwrap().into_json(),
            json!([["b", 1], ["a", 2]])
        );
    }

    #[test]
    fn test_object_statics() {
        let merged = call_namespace(
            "assign",
            &args("Object.assign", &[json!({"a": 1}), json!({"b": 2}), json!({"a": 3})]),
        )
        .unwrap();
        assert_eq!(merged.into_json(), json!({"a": 3, "b": 2}));

        let built = call_namespace(
            "fromEntries",
            &args("Object.fromEntries", &[json!([["x", 1], [2, true]])]),
        )
        .unwrap();
        assert_eq!(built.into_json(), json!({"x": 1, "2": true}));

        assert_eq!(
            call_namespace("keys", &args("Object.keys", &[json!(["p", "q"])])).unwrap().into_json(),
            json!(["0", "1"])
        );
    }

    #[test]
    fn test_forbidden_keys_are_rejected() {
        let err = call_namespace(
            "fromEntries",
            &args("Object.fromEntries", &[json!([["__proto__", {}]])]),
        )
        .unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn test_object_methods() {
        let obj = json!({"a": 1, "b": null, "c": ""});
        assert_eq!(method(obj.clone(), "hasField", &[json!("b")]), json!(true));
        assert_eq!(method(obj.clone(), "removeField", &[json!("a")]), json!({"b": null, "c": ""}));
        assert_eq!(method(obj.clone(), "compact", &[]), json!({"a": 1}));
        assert_eq!(method(json!({}), "isEmpty", &[]), json!(true));
        assert_eq!(method(json!({"k": [1]}), "toJsonString", &[]), json!(r#"{"k":[1]}"#));
    }
}
