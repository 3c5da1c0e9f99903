//! Security layer: pattern-based threat detection

use super::scan::mask_strings;
use super::{ValidationContext, ValidationIssue, ValidationLayer, Validator};
use crate::error::ExpressionResult;
use crate::lexer::is_identifier_part;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// How dangerous a matched pattern is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// Style or hygiene concern
    Low,
    /// Suspicious construct
    Medium,
    /// Access to host facilities
    High,
    /// Code execution or prototype tampering
    Critical,
}

impl ThreatLevel {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }

    /// Whether a match blocks evaluation
    pub fn is_blocking(&self) -> bool {
        *self >= ThreatLevel::High
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pattern is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Code only, string contents blanked
    Code,
    /// Raw text, string contents included
    Text,
}

#[derive(Debug)]
struct Threat {
    pattern: Regex,
    level: ThreatLevel,
    description: &'static str,
    scope: Scope,
    /// Skip matches that are a member or part of a longer name
    global_only: bool,
}

static THREATS: LazyLock<Vec<Threat>> = LazyLock::new(|| {
    use Scope::{Code, Text};
    use ThreatLevel::{Critical, High, Low, Medium};

    let table: &[(&str, ThreatLevel, &str, Scope, bool)] = &[
        (r"\beval\s*\(", Critical, "Dynamic code evaluation with eval()", Code, true),
        (r"\bnew\s+Function\b", Critical, "Function constructor via new", Code, false),
        (r"\bFunction\s*\(", Critical, "Function constructor call", Code, true),
        (r"constructor\s*\.\s*constructor", Critical, "Constructor chain escape", Code, false),
        (r#"\[\s*['"`]constructor['"`]\s*\]"#, Critical, "Computed constructor access", Text, false),
        (r"__proto__", Critical, "Prototype tampering through __proto__", Text, false),
        (r"\bwindow\b", High, "Access to the window object", Code, true),
        (r"\bglobalThis\b", High, "Access to globalThis", Code, true),
        (r"\bglobal\b", High, "Access to the global object", Code, true),
        (r"\bprocess\b", High, "Access to the process object", Code, true),
        (r"\bdocument\b", High, "Access to the document object", Code, true),
        (r"\bimport\s*\(", High, "Dynamic import", Code, true),
        (r"\brequire\s*\(", High, "Module loading with require()", Code, true),
        (r"\bset(?:Timeout|Interval|Immediate)\s*\(", High, "Timer scheduling", Code, true),
        (r"\.\s*(?:call|apply|bind)\s*\(", Medium, "Explicit function rebinding", Code, false),
        (
            r#"(?:\[\s*\]|\{\s*\}|['"`]\s*['"`]|\d)\s*\.\s*constructor\b"#,
            Medium,
            "Constructor reached through a literal",
            Code,
            false,
        ),
        (r"\bwhile\s*\(\s*true\s*\)", Medium, "Unbounded while loop", Code, false),
        (r"\bfor\s*\(\s*;\s*;\s*\)", Medium, "Unbounded for loop", Code, false),
        (r"\bconsole\s*\.", Low, "Console access", Code, true),
        (r"\bdebugger\b", Low, "Debugger statement", Code, true),
        (r"\+\+|--", Low, "Increment or decrement operator", Code, false),
    ];

    table
        .iter()
        .map(|&(pattern, level, description, scope, global_only)| Threat {
            pattern: Regex::new(pattern).expect("valid threat pattern"),
            level,
            description,
            scope,
            global_only,
        })
        .collect()
});

/// Flags dangerous constructs before anything is evaluated
///
/// Critical and high threats are errors (`SECURITY_THREAT`); medium and
/// low ones are warnings (`SECURITY_CONCERN`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DangerousCodeValidator;

impl Validator for DangerousCodeValidator {
    fn name(&self) -> &str {
        "dangerous-code"
    }

    fn layer(&self) -> ValidationLayer {
        ValidationLayer::Security
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> ExpressionResult<Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        for unit in ctx.units() {
            let masked = mask_strings(&unit.source);
            for threat in THREATS.iter() {
                let haystack = match threat.scope {
                    Scope::Code => masked.as_str(),
                    Scope::Text => unit.source.as_str(),
                };
                for found in threat.pattern.find_iter(haystack) {
                    if threat.global_only && is_qualified(haystack, found.start()) {
                        continue;
                    }
                    let position = ctx.position(unit, found.start(), found.end());
                    let message = format!("[{}] {}", threat.level, threat.description);
                    issues.push(if threat.level.is_blocking() {
                        ValidationIssue::error("SECURITY_THREAT", message, position)
                    } else {
                        ValidationIssue::warning("SECURITY_CONCERN", message, position)
                    });
                }
            }
        }

        issues.sort_by_key(|issue| issue.position.start);
        Ok(issues)
    }
}

/// Whether the word at `start` is a member access or the tail of a longer
/// identifier (`$json.process`, `$process`)
fn is_qualified(haystack: &str, start: usize) -> bool {
    let before = &haystack[..start];
    before.chars().next_back().is_some_and(is_identifier_part) || before.trim_end().ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::template::parse_template;
    use crate::validation::{Severity, ValidationConfig};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn run(template: &str) -> Vec<ValidationIssue> {
        let parsed = parse_template(template);
        let registry = Registry::standard();
        let config = ValidationConfig::default();
        let ctx = ValidationContext::new(template, &parsed, None, &registry, &config);
        DangerousCodeValidator.validate(&ctx).unwrap()
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.code.as_str()).collect()
    }

    #[rstest]
    #[case("{{ eval('1') }}", &["SECURITY_THREAT"])]
    #[case("{{ new Function('return 1') }}", &["SECURITY_THREAT", "SECURITY_THREAT"])]
    #[case("{{ $json.constructor.constructor }}", &["SECURITY_THREAT"])]
    #[case("{{ $json['__proto__'] }}", &["SECURITY_THREAT"])]
    #[case("{{ process.env }}", &["SECURITY_THREAT"])]
    #[case("{{ require('fs') }}", &["SECURITY_THREAT"])]
    #[case("{{ setTimeout(x, 1) }}", &["SECURITY_THREAT"])]
    #[case("{{ fn.call(null) }}", &["SECURITY_CONCERN"])]
    #[case("{{ [].constructor }}", &["SECURITY_CONCERN"])]
    #[case("{{ console.log(1) }}", &["SECURITY_CONCERN"])]
    #[case("{{ i++ }}", &["SECURITY_CONCERN"])]
    #[case("{{ $json.process }}", &[])]
    #[case("{{ $json.window.eval }}", &[])]
    #[case("{{ 'eval(window)' }}", &[])]
    #[case("{{ $json.items.map(x => x * 2) }}", &[])]
    fn test_threats(#[case] template: &str, #[case] expected: &[&str]) {
        assert_eq!(codes(&run(template)), expected);
    }

    #[test]
    fn test_levels_map_to_severity() {
        let issues = run("{{ debugger; eval(x) }}");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].message.starts_with("[low]"));
        assert_eq!(issues[1].severity, Severity::Error);
        assert!(issues[1].message.starts_with("[critical]"));
    }

    #[test]
    fn test_threat_position() {
        let template = "Hi {{ $json.a + eval(1) }}";
        let issues = run(template);
        let position = issues[0].position;
        assert!(template[position.start..position.end].starts_with("eval"));
    }
}
