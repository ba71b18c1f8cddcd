//! Argument parser using nom.
//!
//! Parses the argument text of a console call as a permissive JSON
//! superset: unquoted object keys (including `$`-prefixed operator
//! keys), single/double/backtick-quoted strings with escapes, trailing
//! commas and bare numeric literals. Everything else fails closed with
//! a message naming the offending fragment.
//!
//! [`parse`] assembles the whole pipeline for one console line:
//! extraction (`scan`), pseudo-constructor masking (`sanitize`), the
//! literal grammar below, then marker resolution.

use chrono::{DateTime, Utc};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use crate::ast::{ChainCall, ShellCommand, Value};
use crate::error::{ShellError, ShellResult};
use crate::{sanitize, scan};

/// Parse a complete console line into a [`ShellCommand`].
pub fn parse(line: &str) -> ShellResult<ShellCommand> {
    parse_at(line, Utc::now())
}

/// Parse with an injected clock for `new Date()` resolution.
pub fn parse_at(line: &str, now: DateTime<Utc>) -> ShellResult<ShellCommand> {
    let raw = scan::extract(line)?;
    let args = parse_args_at(raw.args, now)?;
    let mut chain = Vec::with_capacity(raw.chain.len());
    for call in &raw.chain {
        chain.push(ChainCall {
            method: call.method.to_string(),
            args: parse_args_at(call.args, now)?,
        });
    }
    Ok(ShellCommand {
        collection: raw.collection.to_string(),
        method: raw.method.to_string(),
        args,
        chain,
    })
}

/// Parse one argument span into independent value trees.
pub fn parse_args(args: &str) -> ShellResult<Vec<Value>> {
    parse_args_at(args, Utc::now())
}

/// Like [`parse_args`] but with a fixed clock.
pub fn parse_args_at(args: &str, now: DateTime<Utc>) -> ShellResult<Vec<Value>> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }
    let masked = sanitize::mask(args);
    match top_level_args(&masked) {
        Ok(("", values)) => values
            .into_iter()
            .map(|v| sanitize::resolve_at(v, now))
            .collect(),
        Ok((remaining, _)) => Err(ShellError::parse_args(remaining)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ShellError::parse_args(e.input)),
        Err(nom::Err::Incomplete(_)) => {
            Err(ShellError::ParseArgs("incomplete input".to_string()))
        }
    }
}

/// Comma-separated top-level arguments, trailing comma tolerated.
fn top_level_args(input: &str) -> IResult<&str, Vec<Value>> {
    terminated(
        separated_list0(list_separator, parse_value),
        tuple((multispace0, opt(char(',')), multispace0)),
    )(input)
}

fn list_separator(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

/// Parse a single value.
fn parse_value(input: &str) -> IResult<&str, Value> {
    preceded(
        multispace0,
        alt((
            parse_object,
            parse_array,
            map(parse_quoted, Value::String),
            parse_number,
            value(Value::Bool(true), tag("true")),
            value(Value::Bool(false), tag("false")),
            value(Value::Null, tag("null")),
        )),
    )(input)
}

/// Parse an object literal `{ key: value, ... }`.
fn parse_object(input: &str) -> IResult<&str, Value> {
    map(
        delimited(
            char('{'),
            terminated(
                separated_list0(list_separator, parse_entry),
                tuple((multispace0, opt(char(',')))),
            ),
            preceded(multispace0, char('}')),
        ),
        Value::Object,
    )(input)
}

/// Parse one `key: value` entry; keys may be quoted or bare.
fn parse_entry(input: &str) -> IResult<&str, (String, Value)> {
    let (input, _) = multispace0(input)?;
    let (input, key) = alt((parse_quoted, parse_bare_key))(input)?;
    let (input, _) = preceded(multispace0, char(':'))(input)?;
    let (input, val) = parse_value(input)?;
    Ok((input, (key, val)))
}

/// Bare object key: letters, digits, underscore and `$` (operator keys
/// like `$group` or `$sum`).
fn parse_bare_key(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '$'),
        str::to_string,
    )(input)
}

/// Parse an array literal `[ value, ... ]`.
fn parse_array(input: &str) -> IResult<&str, Value> {
    map(
        delimited(
            char('['),
            terminated(
                separated_list0(list_separator, parse_value),
                tuple((multispace0, opt(char(',')))),
            ),
            preceded(multispace0, char(']')),
        ),
        Value::Array,
    )(input)
}

/// Parse a number (integer or float, optional sign and exponent).
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, num_str) = recognize(tuple((
        opt(alt((char('-'), char('+')))),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((
            alt((char('e'), char('E'))),
            opt(alt((char('-'), char('+')))),
            digit1,
        ))),
    )))(input)?;

    match num_str.parse::<f64>() {
        Ok(n) => Ok((rest, Value::Number(n))),
        Err(_) => Err(nom::Err::Error(NomError::new(input, ErrorKind::Float))),
    }
}

/// Parse a quoted string with any of the three quote styles, handling
/// backslash escapes.
fn parse_quoted(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('"' | '\'' | '`'))) => c,
        _ => return Err(nom::Err::Error(NomError::new(input, ErrorKind::Char))),
    };

    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => out.push('\n'),
            Some((_, 't')) => out.push('\t'),
            Some((_, 'r')) => out.push('\r'),
            Some((_, 'b')) => out.push('\u{0008}'),
            Some((_, 'f')) => out.push('\u{000C}'),
            Some((_, '0')) => out.push('\0'),
            Some((j, 'u')) => {
                let hex = input.get(j + 1..j + 5);
                let code = hex.and_then(|h| u32::from_str_radix(h, 16).ok());
                match code.and_then(char::from_u32) {
                    Some(ch) => {
                        out.push(ch);
                        // Skip the four hex digits.
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    None => return Err(nom::Err::Error(NomError::new(input, ErrorKind::Escaped))),
                }
            }
            Some((_, other)) => out.push(other),
            None => break,
        }
    }
    // Unterminated string.
    Err(nom::Err::Error(NomError::new(input, ErrorKind::Char)))
}
