//! Bracket- and quote-aware scanning of expression text
//!
//! Validators that must work on text the parser rejects use these helpers
//! instead of the AST.

use crate::lexer::is_identifier_part;

/// A call found in expression text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee as written, with `?.` folded to `.` (`Math.max`, `$json.items.map`)
    pub callee: String,
    /// Offset of the callee's first character
    pub start: usize,
    /// Offset just past the closing `)`, or the end of input when unclosed
    pub end: usize,
    /// Number of top-level arguments
    pub arg_count: usize,
}

impl CallSite {
    /// Last segment of the callee (`max` for `Math.max`)
    pub fn method_name(&self) -> &str {
        self.callee.rsplit('.').next().unwrap_or(&self.callee)
    }

    /// Whether the callee has a receiver
    pub fn is_member(&self) -> bool {
        self.callee.contains('.')
    }
}

/// An unbalanced bracket or quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imbalance {
    /// Offset of the offending character
    pub offset: usize,
    /// What went wrong
    pub message: String,
}

/// Copy of `source` with string literal contents blanked to spaces
///
/// Offsets are preserved: every byte of a literal's content becomes one
/// space, delimiters are kept.
pub fn mask_strings(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in source.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                    out.push(ch);
                    continue;
                }
                out.extend(std::iter::repeat_n(' ', ch.len_utf8()));
            }
            None => {
                if matches!(ch, '"' | '\'' | '`') {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

/// First unbalanced `(`, `[` or `{` outside string literals
pub fn bracket_imbalance(source: &str) -> Option<Imbalance> {
    let masked = mask_strings(source);
    let mut stack: Vec<(usize, char)> = Vec::new();

    for (i, ch) in masked.char_indices() {
        match ch {
            '(' | '[' | '{' => stack.push((i, ch)),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((_, open)) if open == expected => {}
                    Some((at, open)) => {
                        return Some(Imbalance {
                            offset: i,
                            message: format!("'{ch}' does not close '{open}' opened at offset {at}"),
                        });
                    }
                    None => {
                        return Some(Imbalance {
                            offset: i,
                            message: format!("Unexpected closing '{ch}'"),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    stack.pop().map(|(at, open)| Imbalance {
        offset: at,
        message: format!("'{open}' is never closed"),
    })
}

/// Opening quote of an unterminated string literal
pub fn quote_imbalance(source: &str) -> Option<Imbalance> {
    let mut open: Option<(usize, char)> = None;
    let mut escaped = false;

    for (i, ch) in source.char_indices() {
        match open {
            Some((_, q)) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    open = None;
                }
            }
            None if matches!(ch, '"' | '\'' | '`') => open = Some((i, ch)),
            None => {}
        }
    }

    open.map(|(offset, q)| Imbalance {
        offset,
        message: format!("String starting with {q} is never closed"),
    })
}

/// Deepest bracket nesting outside string literals
pub fn max_nesting(source: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0;
    for ch in mask_strings(source).chars() {
        match ch {
            '(' | '[' | '{' => {
                depth += 1;
                max = max.max(depth);
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Every call in `source`, in order of the opening parenthesis
///
/// A `(` preceded by an identifier chain is a call; grouping parentheses and
/// keyword forms such as `typeof (x)` are skipped.
pub fn call_sites(source: &str) -> Vec<CallSite> {
    let masked = mask_strings(source);
    let bytes = masked.as_bytes();
    let mut sites = Vec::new();

    for (open, ch) in masked.char_indices() {
        if ch != '(' {
            continue;
        }
        let Some((callee, start)) = callee_before(&masked, open) else {
            continue;
        };
        let (end, arg_count) = arguments_after(bytes, open);
        sites.push(CallSite {
            callee,
            start,
            end,
            arg_count,
        });
    }
    sites
}

const NON_CALLABLE_KEYWORDS: [&str; 5] = ["typeof", "return", "in", "of", "void"];

fn callee_before(masked: &str, open: usize) -> Option<(String, usize)> {
    let before = masked[..open].trim_end();
    let start = before
        .char_indices()
        .rev()
        .take_while(|&(_, c)| is_identifier_part(c) || c == '.' || c == '?')
        .last()
        .map(|(i, _)| i)?;

    let run = &before[start..];
    let trimmed = run.trim_start_matches(['?', '.']);
    let start = start + (run.len() - trimmed.len());
    let callee = trimmed.replace("?.", ".");
    if callee.is_empty()
        || callee.ends_with('.')
        || callee.starts_with(|c: char| c.is_ascii_digit())
        || NON_CALLABLE_KEYWORDS.contains(&callee.as_str())
    {
        return None;
    }
    Some((callee, start))
}

/// Offset past the matching `)` and the number of top-level arguments
fn arguments_after(bytes: &[u8], open: usize) -> (usize, usize) {
    let mut depth = 0usize;
    let mut commas = 0;
    let mut has_content = false;

    for (i, &b) in bytes.iter().enumerate().skip(open + 1) {
        match b {
            b'(' | b'[' | b'{' => {
                depth += 1;
                has_content = true;
            }
            b')' | b']' | b'}' if depth == 0 => {
                let count = if has_content { commas + 1 } else { 0 };
                return (i + 1, count);
            }
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => commas += 1,
            b if !b.is_ascii_whitespace() => has_content = true,
            _ => {}
        }
    }

    let count = if has_content { commas + 1 } else { 0 };
    (bytes.len(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_mask_strings_preserves_offsets() {
        let source = r#"a + "b(c" + 'it\'s' + `é`"#;
        let masked = mask_strings(source);
        assert_eq!(masked.len(), source.len());
        assert_eq!(masked, r#"a + "   " + '     ' + `  `"#);
    }

    #[rstest]
    #[case("$if(true)", &[("$if", 1)])]
    #[case("$if(true, 1, 2)", &[("$if", 3)])]
    #[case("Math.max()", &[("Math.max", 0)])]
    #[case("$json.items.map(x => x.id).join(', ')", &[("$json.items.map", 1), ("join", 1)])]
    #[case("$json?.name?.toUpperCase()", &[("$json.name.toUpperCase", 0)])]
    #[case("fn('a, b', [1, 2], {c: (3)})", &[("fn", 3)])]
    #[case("(1 + 2) * typeof (x)", &[])]
    fn test_call_sites(#[case] source: &str, #[case] expected: &[(&str, usize)]) {
        let found: Vec<(String, usize)> = call_sites(source)
            .into_iter()
            .map(|site| (site.callee, site.arg_count))
            .collect();
        let expected: Vec<(String, usize)> = expected
            .iter()
            .map(|(callee, count)| ((*callee).to_string(), *count))
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_call_site_offsets() {
        let site = &call_sites("1 + $if(a, b)")[0];
        assert_eq!((site.start, site.end), (4, 13));
        assert_eq!(site.method_name(), "$if");
        assert!(!site.is_member());
    }

    #[rstest]
    #[case("foo(1", Some(3))]
    #[case("a[1)", Some(3))]
    #[case("a)", Some(1))]
    #[case("f('(')", None)]
    #[case("{a: [1, (2)]}", None)]
    fn test_bracket_imbalance(#[case] source: &str, #[case] offset: Option<usize>) {
        assert_eq!(bracket_imbalance(source).map(|i| i.offset), offset);
    }

    #[test]
    fn test_quote_imbalance_and_nesting() {
        assert_eq!(quote_imbalance("'abc").map(|i| i.offset), Some(0));
        assert_eq!(quote_imbalance(r#""a\"b""#), None);
        assert_eq!(max_nesting("f(g([1]))"), 3);
        assert_eq!(max_nesting("'((('"), 0);
    }
}
