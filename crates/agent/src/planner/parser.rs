//! Directive grammar.
//!
//! ```text
//! FUNCTION_CALL: <tool_name>|<key1>=<value1>|<key2>=<value2>...
//! FINAL_ANSWER: <text>
//! ```
//!
//! The first line of the completion that parses under either form wins.
//! Values are bare tokens, quoted strings (`"a|b"` keeps its pipe), or
//! bracketed lists that may nest (`[[1,2],[3,4]]`).

use cortex_core::directive::{Directive, UNKNOWN_ANSWER};
use cortex_core::tool::{ArgValue, ToolArguments};

pub const FUNCTION_CALL_PREFIX: &str = "FUNCTION_CALL:";
pub const FINAL_ANSWER_PREFIX: &str = "FINAL_ANSWER:";

/// Parse the first well-formed directive line in `text`.
pub fn parse_directive(text: &str) -> Option<Directive> {
    text.lines().find_map(parse_line)
}

fn parse_line(line: &str) -> Option<Directive> {
    let line = line.trim().trim_matches('`').trim();
    if let Some(rest) = line.strip_prefix(FUNCTION_CALL_PREFIX) {
        parse_call(rest.trim())
    } else if let Some(rest) = line.strip_prefix(FINAL_ANSWER_PREFIX) {
        Some(parse_answer(rest.trim()))
    } else {
        None
    }
}

fn parse_call(body: &str) -> Option<Directive> {
    let mut segments = split_top_level(body, '|').into_iter();
    let tool_name = segments.next()?.trim();
    if tool_name.is_empty() || tool_name.contains(char::is_whitespace) {
        return None;
    }

    let mut arguments = ToolArguments::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        arguments.insert(key, parse_value(value.trim()));
    }
    Some(Directive::invoke(tool_name, arguments))
}

fn parse_answer(body: &str) -> Directive {
    let answer = body
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(body)
        .trim();
    if answer.is_empty() {
        Directive::finalize(UNKNOWN_ANSWER)
    } else {
        Directive::finalize(answer)
    }
}

/// Parse one argument value: quoted text, a (nested) list, or a bare token.
pub fn parse_value(raw: &str) -> ArgValue {
    if let Some(inner) = unquote(raw) {
        return ArgValue::quoted(inner);
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        if balanced(inner) {
            let items = if inner.trim().is_empty() {
                Vec::new()
            } else {
                split_top_level(inner, ',')
                    .into_iter()
                    .map(|item| parse_value(item.trim()))
                    .collect()
            };
            return ArgValue::List(items);
        }
    }
    ArgValue::text(raw)
}

fn unquote(raw: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        (raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote)).then(|| &raw[1..raw.len() - 1])
    })
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    let mut quote = None;
    for c in s.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && quote.is_none()
}

/// Split on `sep` outside quotes and brackets.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(text: &str) -> (String, ToolArguments) {
        match parse_directive(text) {
            Some(Directive::Invoke { tool_name, arguments }) => (tool_name, arguments),
            other => panic!("Expected Invoke, got {other:?}"),
        }
    }

    #[test]
    fn simple_call() {
        let (tool, args) = call("FUNCTION_CALL: add|a=5|b=3");
        assert_eq!(tool, "add");
        assert_eq!(args.get("a"), Some(&ArgValue::text("5")));
        assert_eq!(args.get("b"), Some(&ArgValue::text("3")));
    }

    #[test]
    fn call_without_arguments() {
        let (tool, args) = call("FUNCTION_CALL: get_updates");
        assert_eq!(tool, "get_updates");
        assert!(args.is_empty());
    }

    #[test]
    fn dotted_keys_stay_literal() {
        let (_, args) = call("FUNCTION_CALL: strings_to_chars_to_int|input.string=INDIA");
        assert_eq!(args.get("input.string"), Some(&ArgValue::text("INDIA")));
    }

    #[test]
    fn quoted_values_keep_pipes_and_equals() {
        let (_, args) = call(r#"FUNCTION_CALL: send_message|chat_id="123"|text="a|b=c""#);
        assert_eq!(args.get("chat_id"), Some(&ArgValue::quoted("123")));
        assert_eq!(args.get("text"), Some(&ArgValue::quoted("a|b=c")));
    }

    #[test]
    fn lists_and_nested_lists() {
        let (_, args) = call("FUNCTION_CALL: int_list_to_exponential_sum|input.int_list=[73,78,68]");
        assert_eq!(
            args.get("input.int_list"),
            Some(&ArgValue::List(vec![
                ArgValue::text("73"),
                ArgValue::text("78"),
                ArgValue::text("68")
            ]))
        );

        let (_, args) = call(r#"FUNCTION_CALL: update_spreadsheet|range="A1:B2"|value=[[1,2],[4,5]]"#);
        let expected = ArgValue::List(vec![
            ArgValue::List(vec![ArgValue::text("1"), ArgValue::text("2")]),
            ArgValue::List(vec![ArgValue::text("4"), ArgValue::text("5")]),
        ]);
        assert_eq!(args.get("value"), Some(&expected));
    }

    #[test]
    fn list_items_may_be_quoted() {
        let (_, args) = call(r#"FUNCTION_CALL: tag|labels=["a,b", c]|empty=[]"#);
        assert_eq!(
            args.get("labels"),
            Some(&ArgValue::List(vec![ArgValue::quoted("a,b"), ArgValue::text("c")]))
        );
        assert_eq!(args.get("empty"), Some(&ArgValue::List(Vec::new())));
    }

    #[test]
    fn unbalanced_brackets_are_text() {
        let (_, args) = call("FUNCTION_CALL: echo|v=[1,2");
        assert_eq!(args.get("v"), Some(&ArgValue::text("[1,2")));
    }

    #[test]
    fn final_answer_strips_brackets() {
        assert_eq!(parse_directive("FINAL_ANSWER: [8]"), Some(Directive::finalize("8")));
        assert_eq!(
            parse_directive("FINAL_ANSWER: Email sent successfully"),
            Some(Directive::finalize("Email sent successfully"))
        );
        assert_eq!(parse_directive("FINAL_ANSWER: []"), Some(Directive::unknown()));
    }

    #[test]
    fn first_matching_line_wins() {
        let text = "Let me think.\nFUNCTION_CALL: add|a=1|b=2\nFINAL_ANSWER: [3]";
        assert!(!parse_directive(text).unwrap().is_finalize());

        let fenced = "```\nFINAL_ANSWER: [done]\n```";
        assert_eq!(parse_directive(fenced), Some(Directive::finalize("done")));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(parse_directive("The answer is 8."), None);
        assert_eq!(parse_directive("FUNCTION_CALL: "), None);
        assert_eq!(parse_directive("FUNCTION_CALL: add|a5"), None);
        assert_eq!(
            parse_directive("FUNCTION_CALL: add|=5\nFINAL_ANSWER: [x]"),
            Some(Directive::finalize("x"))
        );
    }

    #[test]
    fn rendered_directives_parse_back() {
        let directive = Directive::invoke(
            "send_email",
            ToolArguments::new()
                .with("to", ArgValue::quoted("a@b.c"))
                .with("ids", ArgValue::List(vec![ArgValue::text("1"), ArgValue::text("2")])),
        );
        assert_eq!(parse_directive(&directive.to_string()), Some(directive));
    }
}
