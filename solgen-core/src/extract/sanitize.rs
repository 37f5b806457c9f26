//! Repair pass for almost-JSON emitted by language models.

/// Whether `c` is a control character that must be removed before parsing.
fn is_stripped_control(c: char) -> bool {
    (c as u32) < 0x20 && !matches!(c, '\t' | '\r' | '\n')
}

/// Whether the quote at `chars[i]` ends a string value: the next
/// non-whitespace character is structural or the input ends.
fn closes_string(chars: &[char], i: usize) -> bool {
    chars[i + 1..]
        .iter()
        .find(|c| !c.is_whitespace())
        .map_or(true, |c| matches!(c, ',' | ':' | '}' | ']'))
}

/// Repair common defects in model-emitted JSON.
///
/// - control characters other than tab, CR and LF are removed;
/// - literal tab, CR and LF inside string literals become `\t`, `\r`, `\n`;
/// - `\"` outside a string literal (a payload that was string-escaped as a
///   whole) becomes `"`, and the matching `\"` closes that string;
/// - a bare `"` inside a string literal that is not followed by `,` `:` `}`
///   `]` or end of input is escaped in place.
///
/// Valid JSON passes through unchanged.
pub fn sanitize_json(text: &str) -> String {
    let chars: Vec<char> = text.chars().filter(|c| !is_stripped_control(*c)).collect();
    let mut out = String::with_capacity(text.len() + 16);

    let mut in_string = false;
    // String opened by `\"` and therefore closed by `\"`.
    let mut escaped_delimiters = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if !in_string {
            match (c, next) {
                ('\\', Some('"')) => {
                    out.push('"');
                    in_string = true;
                    escaped_delimiters = true;
                    i += 2;
                }
                ('"', _) => {
                    out.push('"');
                    in_string = true;
                    escaped_delimiters = false;
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
            continue;
        }

        match c {
            '\\' if escaped_delimiters && next == Some('"') => {
                out.push('"');
                in_string = false;
                i += 2;
            }
            '\\' if escaped_delimiters && next == Some('\\') => {
                // `\\` inside an escaped payload is a single escaping backslash.
                match (chars.get(i + 2), chars.get(i + 3)) {
                    (Some('\\'), Some('"')) => {
                        out.push_str("\\\"");
                        i += 4;
                    }
                    (Some('\\'), Some('\\')) => {
                        out.push_str("\\\\");
                        i += 4;
                    }
                    (Some(&escaped), _) if escaped != '"' && escaped != '\\' => {
                        out.push('\\');
                        out.push(escaped);
                        i += 3;
                    }
                    _ => {
                        out.push_str("\\\\");
                        i += 2;
                    }
                }
            }
            '\\' => match next {
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                    i += 2;
                }
                None => {
                    out.push_str("\\\\");
                    i += 1;
                }
            },
            '\n' => {
                out.push_str("\\n");
                i += 1;
            }
            '\r' => {
                out.push_str("\\r");
                i += 1;
            }
            '\t' => {
                out.push_str("\\t");
                i += 1;
            }
            '"' if !escaped_delimiters && closes_string(&chars, i) => {
                out.push('"');
                in_string = false;
                i += 1;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parse(text: &str) -> Value {
        serde_json::from_str(&sanitize_json(text)).unwrap()
    }

    #[test]
    fn test_valid_json_unchanged() {
        let text = r#"{"a": [1, 2, {"b": "c\"d\n"}], "e": null}"#;
        assert_eq!(sanitize_json(text), text);
    }

    #[test]
    fn test_literal_newline_in_string() {
        let text = "{\"description\": \"first line\nsecond\tline\"}";
        assert!(serde_json::from_str::<Value>(text).is_err());
        assert_eq!(
            parse(text),
            json!({"description": "first line\nsecond\tline"})
        );
    }

    #[test]
    fn test_literal_newlines_between_tokens_kept() {
        let text = "{\n  \"a\": 1,\n  \"b\": \"x\"\n}";
        assert_eq!(sanitize_json(text), text);
    }

    #[test]
    fn test_control_characters_stripped() {
        let text = "{\"a\": \"b\u{0007}c\"}\u{0000}";
        assert_eq!(parse(text), json!({"a": "bc"}));
    }

    #[test]
    fn test_double_escaped_payload() {
        let text = r#"{\"name\": \"transfer\", \"inputs\": [\"to\", \"amount\"]}"#;
        assert_eq!(
            parse(text),
            json!({"name": "transfer", "inputs": ["to", "amount"]})
        );
    }

    #[test]
    fn test_double_escaped_inner_escapes() {
        let text = r#"{\"a\": \"say \\\"hi\\\"\\nnow\"}"#;
        assert_eq!(parse(text), json!({"a": "say \"hi\"\nnow"}));
    }

    #[test]
    fn test_inner_quote_escaped() {
        let text = r#"{"description": "Returns the "owner" address", "view": true}"#;
        assert_eq!(
            parse(text),
            json!({"description": "Returns the \"owner\" address", "view": true})
        );
    }

    #[test]
    fn test_quote_followed_by_structure_closes() {
        let text = "[\"a\" , \"b\"\n]";
        assert_eq!(parse(text), json!(["a", "b"]));
    }

    #[test]
    fn test_trailing_backslash_escaped() {
        let sanitized = sanitize_json("\"abc\\");
        assert_eq!(sanitized, "\"abc\\\\");
    }
}
