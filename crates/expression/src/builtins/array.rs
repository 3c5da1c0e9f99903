//! Array methods and `Array.*` statics
//!
//! Callbacks receive `(item, index, array)`; the array is only materialized
//! for callbacks that declare a third parameter.

use super::{CallArgs, relative_index};
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::{Callback, Evaluator, RuntimeValue};
use crate::value_utils::{self, strict_equals};
use serde_json::{Map, Value};

/// `Array.<function>(...)`
pub fn call_namespace(
    ev: &mut Evaluator<'_>,
    function: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    match function {
        "isArray" => Ok(RuntimeValue::bool(matches!(
            args.value(0)?,
            RuntimeValue::Json(Value::Array(_))
        ))),
        "from" => {
            let items = match args.value(0)? {
                RuntimeValue::Json(Value::Array(items)) => items,
                RuntimeValue::Json(Value::String(s)) => {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                }
                _ => Vec::new(),
            };
            match args.get_opt_callback(1, "mapFn")? {
                Some(callback) => map_items(ev, &callback, &items),
                None => Ok(RuntimeValue::Json(Value::Array(items))),
            }
        }
        _ => Err(ExpressionError::function_not_found(args.function())),
    }
}

/// Call `method` on an array receiver
pub fn call_method(
    ev: &mut Evaluator<'_>,
    items: Vec<Value>,
    method: &str,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let array = |items: Vec<Value>| -> ExpressionResult<RuntimeValue> {
        Ok(RuntimeValue::Json(Value::Array(items)))
    };

    match method {
        "map" => map_items(ev, &args.get_callback(0, "callback")?, &items),
        "filter" => {
            let callback = args.get_callback(0, "callback")?;
            let mut kept = Vec::new();
            for (index, item) in items.iter().enumerate() {
                if invoke(ev, &callback, &items, index)?.is_truthy() {
                    kept.push(item.clone());
                }
            }
            array(kept)
        }
        "find" => {
            let callback = args.get_callback(0, "callback")?;
            let found = position(ev, &callback, &items)?;
            Ok(found.map_or(RuntimeValue::Undefined, |i| RuntimeValue::Json(items[i].clone())))
        }
        "findIndex" => {
            let callback = args.get_callback(0, "callback")?;
            let found = position(ev, &callback, &items)?;
            Ok(RuntimeValue::Json(found.map_or(Value::from(-1), Value::from)))
        }
        "some" => {
            let callback = args.get_callback(0, "callback")?;
            Ok(RuntimeValue::bool(position(ev, &callback, &items)?.is_some()))
        }
        "every" => {
            let callback = args.get_callback(0, "callback")?;
            for index in 0..items.len() {
                if !invoke(ev, &callback, &items, index)?.is_truthy() {
                    return Ok(RuntimeValue::bool(false));
                }
            }
            Ok(RuntimeValue::bool(true))
        }
        "reduce" => reduce(ev, &items, args),
        "includes" => {
            let needle = args.json(0)?;
            Ok(RuntimeValue::bool(items.iter().any(|item| strict_equals(item, &needle))))
        }
        "indexOf" => {
            let needle = args.json(0)?;
            let found = items.iter().position(|item| strict_equals(item, &needle));
            Ok(RuntimeValue::Json(found.map_or(Value::from(-1), Value::from)))
        }
        "join" => {
            let separator = if args.is_absent(0) {
                ",".to_string()
            } else {
                args.get_string(0)?
            };
            let parts: Vec<String> = items.iter().map(join_text).collect();
            Ok(RuntimeValue::string(parts.join(&separator)))
        }
        "toString" => Ok(RuntimeValue::string(
            items.iter().map(join_text).collect::<Vec<_>>().join(","),
        )),
        "slice" => {
            let len = items.len();
            let start = relative_index(args.get_opt_number(0, "start")?.unwrap_or(0.0), len);
            let end = args
                .get_opt_number(1, "end")?
                .map_or(len, |n| relative_index(n, len));
            array(items[start..end.max(start)].to_vec())
        }
        "concat" => {
            let mut out = items;
            for value in args.rest(0)? {
                match value.into_json() {
                    Value::Array(more) => out.extend(more),
                    other => out.push(other),
                }
            }
            array(out)
        }
        "reverse" => {
            let mut out = items;
            out.reverse();
            array(out)
        }
        "sort" => sort(ev, items, args),
        "flat" => {
            let depth = args.get_opt_int(0, "depth")?.unwrap_or(1).max(0) as usize;
            let mut out = Vec::new();
            flatten_into(items, depth, &mut out);
            array(out)
        }
        "at" => {
            let index = args.get_number(0, "index")?.trunc();
            let resolved = if index < 0.0 {
                items.len() as f64 + index
            } else {
                index
            };
            Ok(element(&items, resolved))
        }
        "first" => Ok(element(&items, 0.0)),
        "last" => Ok(element(&items, items.len() as f64 - 1.0)),
        "isEmpty" => Ok(RuntimeValue::bool(items.is_empty())),
        "isNotEmpty" => Ok(RuntimeValue::bool(!items.is_empty())),
        "sum" => super::number(method, numbers(args, &items)?.iter().sum()),
        "average" => {
            let values = numbers(args, &items)?;
            if values.is_empty() {
                return Err(args.invalid("Cannot average an empty array"));
            }
            super::number(method, values.iter().sum::<f64>() / values.len() as f64)
        }
        "min" | "max" => {
            let values = numbers(args, &items)?;
            let picked = if method == "min" {
                values.iter().copied().reduce(f64::min)
            } else {
                values.iter().copied().reduce(f64::max)
            };
            let n = picked.ok_or_else(|| args.invalid(format!("Cannot take the {method} of an empty array")))?;
            super::number(method, n)
        }
        "unique" => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !out.iter().any(|seen| strict_equals(seen, &item)) {
                    out.push(item);
                }
            }
            array(out)
        }
        "compact" => array(
            items
                .into_iter()
                .filter(|item| !item.is_null() && item.as_str() != Some(""))
                .collect(),
        ),
        "pluck" => pluck(items, args),
        _ => Err(ExpressionError::function_not_found(format!("array.{method}"))),
    }
}

fn invoke(
    ev: &mut Evaluator<'_>,
    callback: &Callback<'_>,
    items: &[Value],
    index: usize,
) -> ExpressionResult<RuntimeValue> {
    let mut args = vec![
        RuntimeValue::Json(items[index].clone()),
        RuntimeValue::Json(Value::from(index)),
    ];
    if callback.params.len() > 2 {
        args.push(RuntimeValue::Json(Value::Array(items.to_vec())));
    }
    ev.call_callback(callback, &args)
}

fn map_items(
    ev: &mut Evaluator<'_>,
    callback: &Callback<'_>,
    items: &[Value],
) -> ExpressionResult<RuntimeValue> {
    let mut out = Vec::with_capacity(items.len());
    for index in 0..items.len() {
        out.push(invoke(ev, callback, items, index)?.into_json());
    }
    Ok(RuntimeValue::Json(Value::Array(out)))
}

fn position(
    ev: &mut Evaluator<'_>,
    callback: &Callback<'_>,
    items: &[Value],
) -> ExpressionResult<Option<usize>> {
    for index in 0..items.len() {
        if invoke(ev, callback, items, index)?.is_truthy() {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn reduce(
    ev: &mut Evaluator<'_>,
    items: &[Value],
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let callback = args.get_callback(0, "callback")?;
    let (mut acc, start) = if args.len() > 1 {
        (args.value(1)?, 0)
    } else {
        match items.first() {
            Some(first) => (RuntimeValue::Json(first.clone()), 1),
            None => {
                return Err(ExpressionError::type_error(
                    "Reduce of empty array with no initial value",
                ));
            }
        }
    };
    for (index, item) in items.iter().enumerate().skip(start) {
        let mut call_args = vec![
            acc,
            RuntimeValue::Json(item.clone()),
            RuntimeValue::Json(Value::from(index)),
        ];
        if callback.params.len() > 3 {
            call_args.push(RuntimeValue::Json(Value::Array(items.to_vec())));
        }
        acc = ev.call_callback(&callback, &call_args)?;
    }
    Ok(acc)
}

/// `sort(compare?)`; stable, default order by string form
fn sort(
    ev: &mut Evaluator<'_>,
    items: Vec<Value>,
    args: &CallArgs<'_>,
) -> ExpressionResult<RuntimeValue> {
    let sorted = match args.get_opt_callback(0, "compare")? {
        None => {
            let mut items = items;
            items.sort_by_cached_key(value_utils::to_js_string);
            items
        }
        Some(callback) => merge_sort(items, &mut |a, b| {
            let order = ev.call_callback(
                &callback,
                &[RuntimeValue::Json(a.clone()), RuntimeValue::Json(b.clone())],
            )?;
            Ok(order.to_number() > 0.0)
        })?,
    };
    Ok(RuntimeValue::Json(Value::Array(sorted)))
}

/// Stable merge sort with a fallible "a goes after b" predicate
///
/// User comparators may be inconsistent, so the standard library sort (which
/// may panic on a non-total order) is not used.
fn merge_sort(
    items: Vec<Value>,
    after: &mut impl FnMut(&Value, &Value) -> ExpressionResult<bool>,
) -> ExpressionResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, after)?;
    let right = merge_sort(right, after)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => after(l, r)?,
            _ => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        out.extend(next);
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

fn flatten_into(items: Vec<Value>, depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other),
        }
    }
}

fn element(items: &[Value], index: f64) -> RuntimeValue {
    if index < 0.0 {
        return RuntimeValue::Undefined;
    }
    items
        .get(index as usize)
        .cloned()
        .map_or(RuntimeValue::Undefined, RuntimeValue::Json)
}

fn join_text(item: &Value) -> String {
    match item {
        Value::Null => String::new(),
        other => value_utils::to_js_string(other),
    }
}

fn numbers(args: &CallArgs<'_>, items: &[Value]) -> ExpressionResult<Vec<f64>> {
    items
        .iter()
        .map(|item| {
            let n = value_utils::to_number(item);
            if n.is_nan() {
                Err(args.invalid(format!(
                    "Array contains a non-numeric {}",
                    value_utils::value_kind_name(item)
                )))
            } else {
                Ok(n)
            }
        })
        .collect()
}

/// `pluck("a")` -> values; `pluck("a", "b")` -> objects with those fields
fn pluck(items: Vec<Value>, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    let fields = (0..args.len())
        .map(|i| args.get_string(i))
        .collect::<ExpressionResult<Vec<_>>>()?;
    let objects = items.into_iter().filter_map(|item| match item {
        Value::Object(map) => Some(map),
        _ => None,
    });

    let out: Vec<Value> = if let [field] = fields.as_slice() {
        objects
            .map(|map| map.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    } else {
        objects
            .map(|map| {
                let picked: Map<String, Value> = fields
                    .iter()
                    .filter_map(|field| map.get(field).map(|v| (field.clone(), v.clone())))
                    .collect();
                Value::Object(picked)
            })
            .collect()
    };
    Ok(RuntimeValue::Json(Value::Array(out)))
}
