//! Balanced-span scanning and command extraction.
//!
//! A console line like `db.courses.find({ title: ")" }).limit(5)` has to
//! be split without a general-purpose grammar: the argument text nests
//! object/array literals and may contain delimiter characters inside
//! quoted strings. [`balanced_span`] does a single quote-aware pass with
//! independent depth counters; [`extract`] uses it to pull out the
//! collection, primary method and the chained calls.

use crate::error::{ShellError, ShellResult};

/// Scan `text` starting just after an opening parenthesis (depth 1) and
/// find the matching close.
///
/// Returns `(content_end, resume)`: the byte offset of the closing `)`
/// and the offset just past it. `None` if the span never closes.
///
/// Only parentheses are counted: braces and brackets nest strictly
/// inside the call's argument span, so paren depth alone decides where
/// the span closes. The counter only moves outside string mode; string
/// mode starts at `"`, `'` or a backtick and ends at the same quote
/// character when not preceded by an unescaped backslash.
pub fn balanced_span(text: &str, start: usize) -> Option<(usize, usize)> {
    let mut paren: i32 = 1;
    let mut in_string = false;
    let mut quote = '"';
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        let i = start + i;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                in_string = true;
                quote = c;
            }
            '(' => paren += 1,
            ')' => {
                paren -= 1;
                if paren == 0 {
                    return Some((i, i + c.len_utf8()));
                }
            }
            // Braces and brackets are inert; a string opened inside
            // them still shadows every delimiter, which is why the
            // quote state lives out here.
            _ => {}
        }
    }
    None
}

/// One `.<method>(<args>)` chained call, still as raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall<'a> {
    pub method: &'a str,
    pub args: &'a str,
}

/// The raw shape of a console line: names plus unparsed argument spans.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand<'a> {
    pub collection: &'a str,
    pub method: &'a str,
    pub args: &'a str,
    pub chain: Vec<RawCall<'a>>,
}

/// Split one input line into collection, method, primary argument text
/// and chained calls.
///
/// The line must start with `<alias>.<collection>.<method>(`; the alias
/// is any identifier (`db`, `store`, …). Chained calls are consumed
/// greedily; the first position that is not a well-formed `.name(` call
/// ends the chain, and trailing text after it is ignored rather than
/// rejected.
pub fn extract(line: &str) -> ShellResult<RawCommand<'_>> {
    let line = line.trim();

    let (_alias, rest) = take_identifier(line).ok_or(ShellError::InvalidFormat)?;
    let rest = rest.strip_prefix('.').ok_or(ShellError::InvalidFormat)?;
    let (collection, rest) = take_identifier(rest).ok_or(ShellError::InvalidFormat)?;
    let rest = rest.strip_prefix('.').ok_or(ShellError::InvalidFormat)?;
    let (method, rest) = take_identifier(rest).ok_or(ShellError::InvalidFormat)?;
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return Err(ShellError::InvalidFormat);
    }

    // Offset of the primary argument span within `line`.
    let open = line.len() - rest.len() + 1;
    let (end, mut pos) = balanced_span(line, open).ok_or(ShellError::Unbalanced)?;
    let args = line[open..end].trim();

    let mut chain = Vec::new();
    loop {
        let rest = line[pos..].trim_start();
        let Some(rest) = rest.strip_prefix('.') else {
            break;
        };
        let Some((method, rest)) = take_identifier(rest) else {
            break;
        };
        let rest = rest.trim_start();
        if !rest.starts_with('(') {
            break;
        }
        let open = line.len() - rest.len() + 1;
        // A chained call that never closes ends the chain instead of
        // failing the whole line, mirroring permissive console use.
        let Some((end, resume)) = balanced_span(line, open) else {
            break;
        };
        chain.push(RawCall {
            method,
            args: line[open..end].trim(),
        });
        pos = resume;
    }

    Ok(RawCommand {
        collection,
        method,
        args,
        chain,
    })
}

/// Split a leading identifier (letters, digits, underscore) off `s`.
fn take_identifier(s: &str) -> Option<(&str, &str)> {
    let end = s
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(s.len());
    if end == 0 { None } else { Some(s.split_at(end)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_balanced_simple() {
        let text = "db.c.find({a: 1})";
        let open = text.find('(').unwrap() + 1;
        let (end, resume) = balanced_span(text, open).unwrap();
        assert_eq!(&text[open..end], "{a: 1}");
        assert_eq!(resume, text.len());
    }

    #[test]
    fn test_paren_inside_string_is_inert() {
        let text = r#"({ "title": "a)b" })"#;
        let (end, _) = balanced_span(text, 1).unwrap();
        assert_eq!(&text[1..end], r#"{ "title": "a)b" }"#);
    }

    #[test]
    fn test_escaped_quote_stays_in_string() {
        let text = r#"({ "t": "he said \")\" loudly" })"#;
        let (end, _) = balanced_span(text, 1).unwrap();
        assert_eq!(&text[1..end], r#"{ "t": "he said \")\" loudly" }"#);
    }

    #[test]
    fn test_backtick_strings() {
        let text = "({ note: `a ) b` })";
        let (end, _) = balanced_span(text, 1).unwrap();
        assert_eq!(&text[1..end], "{ note: `a ) b` }");
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert!(balanced_span("({ a: 1 }", 1).is_none());
        assert!(balanced_span("(\"never closed", 1).is_none());
    }

    #[test]
    fn test_extract_basic() {
        let cmd = extract("db.courses.find({ price: 10 })").unwrap();
        assert_eq!(cmd.collection, "courses");
        assert_eq!(cmd.method, "find");
        assert_eq!(cmd.args, "{ price: 10 }");
        assert!(cmd.chain.is_empty());
    }

    #[test]
    fn test_extract_alias_is_free() {
        let cmd = extract("store.courses.find({})").unwrap();
        assert_eq!(cmd.collection, "courses");
    }

    #[test]
    fn test_extract_chain_order() {
        let cmd = extract("db.courses.find({}).sort({rating:-1}).limit(5).skip(2)").unwrap();
        let methods: Vec<&str> = cmd.chain.iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["sort", "limit", "skip"]);
        assert_eq!(cmd.chain[0].args, "{rating:-1}");
        assert_eq!(cmd.chain[1].args, "5");
    }

    #[test]
    fn test_extract_trailing_garbage_ignored() {
        let cmd = extract("db.courses.find({}).limit(5); // comment").unwrap();
        assert_eq!(cmd.chain.len(), 1);

        let cmd = extract("db.courses.find({}).limit(5).toArray").unwrap();
        assert_eq!(cmd.chain.len(), 1);
    }

    #[test]
    fn test_extract_rejects_garbage() {
        assert!(matches!(
            extract("show collections"),
            Err(ShellError::InvalidFormat)
        ));
        assert!(matches!(extract(""), Err(ShellError::InvalidFormat)));
        assert!(matches!(
            extract("db.courses.find"),
            Err(ShellError::InvalidFormat)
        ));
    }

    #[test]
    fn test_extract_unbalanced() {
        assert!(matches!(
            extract("db.courses.find({ price: 10 "),
            Err(ShellError::Unbalanced)
        ));
    }

    #[test]
    fn test_extract_whitespace_before_paren() {
        let cmd = extract("db.courses.find ({})").unwrap();
        assert_eq!(cmd.method, "find");
    }

    #[test]
    fn test_extract_multiline() {
        let cmd = extract("db.courses.insertOne({\n  title: \"X\",\n  price: 1\n})").unwrap();
        assert_eq!(cmd.method, "insertOne");
        assert!(cmd.args.contains("title"));
    }
}
