//! JMESPath queries: `$jmespath(data, query)` and `search(data, query)`

use super::CallArgs;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::RuntimeValue;
use serde_json::Value;
use tracing::trace;

/// Run the query in argument 1 against the data in argument 0
///
/// An invalid query is a `QUERY_ERROR`; a query that matches nothing is `null`.
pub fn call(name: &str, args: &CallArgs<'_>) -> ExpressionResult<RuntimeValue> {
    let data = args.json(0)?;
    let query = args.get_strict_string(1, "query")?;
    let result = search(&query, data)?;
    trace!(function = name, query = %query, "Ran JMESPath query");
    Ok(RuntimeValue::Json(result))
}

/// Compile and run a JMESPath expression over a JSON value
pub fn search(query: &str, data: Value) -> ExpressionResult<Value> {
    let expr = jmespath::compile(query)
        .map_err(|e| ExpressionError::query(format!("Invalid JMESPath query '{query}': {e}")))?;
    let found = expr
        .search(data)
        .map_err(|e| ExpressionError::query(e.to_string()))?;
    Ok(serde_json::to_value(&*found)?)
}
