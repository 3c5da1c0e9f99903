//! Property tests for template splitting.
//!
//! - Any text splits into one more static part than expressions
//! - Well-formed templates keep their text and expressions verbatim
//! - Rendering interleaves static parts with expression values

use proptest::prelude::*;
use serde_json::json;
use weft_expression::{EvaluationContext, ExpressionEngine, parse_template};

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Fragments that exercise delimiter handling, including broken ones
fn arb_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ,.!\n]{0,8}",
        Just("{{".to_string()),
        Just("}}".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just("{{ $json.a }}".to_string()),
        Just("{{ 'x }}' }}".to_string()),
        Just("{{{ 1 }}}".to_string()),
    ]
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z ,.!]{0,8}"
}

fn arb_expression() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\$json\\.[a-z]{1,5}",
        (0u16..1000).prop_map(|n| n.to_string()),
        "[a-z]{1,4}\\([0-9]\\)",
    ]
}

/// Literal text around `{{ expr }}` spans, with the parts it was built from
fn arb_template() -> impl Strategy<Value = (String, Vec<String>, Vec<String>)> {
    (prop::collection::vec((arb_text(), arb_expression()), 0..5), arb_text()).prop_map(
        |(pairs, tail)| {
            let mut template = String::new();
            let mut texts = Vec::new();
            let mut expressions = Vec::new();
            for (text, expression) in pairs {
                template.push_str(&text);
                template.push_str("{{ ");
                template.push_str(&expression);
                template.push_str(" }}");
                texts.push(text);
                expressions.push(expression);
            }
            template.push_str(&tail);
            texts.push(tail);
            (template, texts, expressions)
        },
    )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn static_parts_outnumber_expressions_by_one(
        fragments in prop::collection::vec(arb_fragment(), 0..12)
    ) {
        let template = fragments.concat();
        let parsed = parse_template(&template);
        prop_assert_eq!(parsed.static_parts.len(), parsed.expressions.len() + 1);
        prop_assert_eq!(parsed.is_template, !parsed.expressions.is_empty());
    }

    #[test]
    fn well_formed_templates_split_verbatim((template, texts, expressions) in arb_template()) {
        let parsed = parse_template(&template);
        prop_assert_eq!(&parsed.static_parts, &texts);

        let cleaned: Vec<&str> = parsed.expressions.iter().map(|e| e.cleaned.as_str()).collect();
        prop_assert_eq!(cleaned, expressions.iter().map(String::as_str).collect::<Vec<_>>());

        for expression in &parsed.expressions {
            let span = &template[expression.position.start..expression.position.end];
            prop_assert!(span.starts_with("{{") && span.ends_with("}}"));
            let content = &template[expression.content_offset..];
            prop_assert!(content.starts_with(&expression.cleaned));
        }
    }

    #[test]
    fn rendering_interleaves_static_parts(
        texts in prop::collection::vec(arb_text(), 2..5),
        numbers in prop::collection::vec(0u16..1000, 4)
    ) {
        let mut template = texts[0].clone();
        let mut expected = texts[0].clone();
        for (text, n) in texts[1..].iter().zip(&numbers) {
            template.push_str(&format!("{{{{ {n} }}}}"));
            template.push_str(text);
            expected.push_str(&n.to_string());
            expected.push_str(text);
        }

        let parsed = parse_template(&template);
        prop_assume!(!parsed.is_single_expression());

        let engine = ExpressionEngine::new();
        let result = engine.evaluate(&template, &EvaluationContext::new());
        prop_assert!(result.success, "{:?}", result.error);
        prop_assert_eq!(result.value, Some(json!(expected)));
    }
}
