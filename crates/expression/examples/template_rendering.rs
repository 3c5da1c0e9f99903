//! Example demonstrating template rendering, validation and completion
//!
//! Renders an email and a JSON payload from workflow data, then shows how
//! validation issues and completion suggestions look for the same context.

use chrono::DateTime;
use serde_json::json;
use weft_expression::error_formatter::format_issues;
use weft_expression::{CompletionRequest, EvaluationContext, ExpressionEngine};

fn main() {
    let engine = ExpressionEngine::new();

    let mut context = EvaluationContext::builder()
        .json(json!({
            "customer": {"name": "alice", "email": "alice@example.com"},
            "items": [
                {"sku": "A-1", "qty": 2, "price": 9.5},
                {"sku": "B-7", "qty": 1, "price": 20}
            ]
        }))
        .build();
    context.set_execution_var("id", json!("exec-42"));
    if let Ok(now) = DateTime::parse_from_rfc3339("2024-03-15T10:30:00+01:00") {
        context.set_now(now);
    }

    // Example 1: Text template
    println!("=== Example 1: Text Template ===");
    let result = engine.evaluate(
        "Hello {{ $json.customer.name.toUpperCase() }}! Run {{ $execution.id }} on {{ $now.toFormat('yyyy-MM-dd') }}.",
        &context,
    );
    println!("{}", result.value.unwrap_or_default());

    // Example 2: Single expression keeps its type
    println!("\n=== Example 2: Typed Value ===");
    let result = engine.evaluate(
        "{{ $json.items.map(i => i.qty * i.price).reduce((a, b) => a + b, 0) }}",
        &context,
    );
    println!("{} ({})", result.value.unwrap_or_default(), result.value_type);

    // Example 3: JSON template
    println!("\n=== Example 3: JSON Template ===");
    let json_template = r#"{
  "to": "{{ $json.customer.email }}",
  "skus": {{ JSON.stringify($json.items.pluck('sku')) }},
  "bulk": {{ $if($json.items.length > 5, true, false) }}
}"#;
    let result = engine.evaluate(json_template, &context);
    println!("{}", result.value.unwrap_or_default());

    // Example 4: Errors are values
    println!("\n=== Example 4: Failed Evaluation ===");
    let result = engine.evaluate("{{ $json.customer.address.city }}", &context);
    if let Some(error) = result.error {
        println!("{} [{}]: {}", error.name, error.code, error.message);
    }

    // Example 5: Validation with source context
    println!("\n=== Example 5: Validation ===");
    let template = "Dear {{ $json.custmer.name }},\ntotal {{ Math.round() }}";
    let report = engine.validate_full(template, Some(&context), None);
    println!("{}", format_issues(template, &report.errors));

    // Example 6: Completion
    println!("=== Example 6: Completion ===");
    let request = CompletionRequest::at_end("{{ $json.customer.").with_context(context.clone());
    for item in engine.complete(&request).iter().take(8) {
        println!("{:<16} {:?} {}", item.label, item.kind, item.detail.as_deref().unwrap_or(""));
    }
}
