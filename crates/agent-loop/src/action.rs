//! The strict action grammar.
//!
//! Keywords are case-insensitive, payloads case-sensitive. Parsing then
//! re-serializing yields a canonical form equal modulo whitespace.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::LoopError;

/// One executor-issued action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Click an element by snapshot id.
    Click { id: i64 },
    /// Focus an element by id, then type text.
    Type { id: i64, text: String },
    /// Keyboard press (Enter, Escape, Tab, single characters).
    Press { key: String },
    /// Viewport-coordinate click (vision fallback).
    ClickXy { x: f64, y: f64 },
    /// Click a rectangle's center (vision fallback).
    ClickRect { x: f64, y: f64, width: f64, height: f64 },
    /// Terminal success token.
    Finish,
}

impl Action {
    /// Parse one action string. Unrecognized input is an error.
    pub fn parse(input: &str) -> Result<Self, LoopError> {
        let shape = Regex::new(r"(?s)^\s*([A-Za-z_]+)\s*\((.*)\)\s*$")
            .expect("action shape pattern is valid");
        let captures = shape
            .captures(input)
            .ok_or_else(|| LoopError::ActionParse(format!("not an action call: {input:?}")))?;
        let keyword = captures
            .get(1)
            .map(|m| m.as_str().to_ascii_uppercase())
            .unwrap_or_default();
        let args = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

        match keyword.as_str() {
            "CLICK" => Ok(Action::Click {
                id: parse_int(args.trim())?,
            }),
            "TYPE" => {
                let (id_part, text_part) = args
                    .split_once(',')
                    .ok_or_else(|| LoopError::ActionParse(format!("TYPE needs id and text: {args:?}")))?;
                Ok(Action::Type {
                    id: parse_int(id_part.trim())?,
                    text: parse_quoted(text_part.trim())?,
                })
            }
            "PRESS" => Ok(Action::Press {
                key: parse_quoted(args.trim())?,
            }),
            "CLICK_XY" => {
                let numbers = parse_numbers(args, 2)?;
                Ok(Action::ClickXy {
                    x: numbers[0],
                    y: numbers[1],
                })
            }
            "CLICK_RECT" => {
                let numbers = parse_numbers(args, 4)?;
                Ok(Action::ClickRect {
                    x: numbers[0],
                    y: numbers[1],
                    width: numbers[2],
                    height: numbers[3],
                })
            }
            "FINISH" => {
                if args.trim().is_empty() {
                    Ok(Action::Finish)
                } else {
                    Err(LoopError::ActionParse(format!(
                        "FINISH takes no arguments, got {args:?}"
                    )))
                }
            }
            other => Err(LoopError::ActionParse(format!("unknown action: {other}"))),
        }
    }

    /// Canonical serialization; `parse(canonical(a)) == a`.
    pub fn canonical(&self) -> String {
        match self {
            Action::Click { id } => format!("CLICK({id})"),
            Action::Type { id, text } => format!("TYPE({id},\"{}\")", escape(text)),
            Action::Press { key } => format!("PRESS(\"{}\")", escape(key)),
            Action::ClickXy { x, y } => format!("CLICK_XY({},{})", number(*x), number(*y)),
            Action::ClickRect {
                x,
                y,
                width,
                height,
            } => format!(
                "CLICK_RECT({},{},{},{})",
                number(*x),
                number(*y),
                number(*width),
                number(*height)
            ),
            Action::Finish => "FINISH()".to_string(),
        }
    }

    /// Terminal success token.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Finish)
    }

    /// Coordinate-based actions from the vision fallback.
    pub fn is_vision(&self) -> bool {
        matches!(self, Action::ClickXy { .. } | Action::ClickRect { .. })
    }
}

fn parse_int(raw: &str) -> Result<i64, LoopError> {
    raw.parse::<i64>()
        .map_err(|_| LoopError::ActionParse(format!("expected integer id, got {raw:?}")))
}

fn parse_numbers(args: &str, expected: usize) -> Result<Vec<f64>, LoopError> {
    let numbers: Result<Vec<f64>, _> = args
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect();
    let numbers =
        numbers.map_err(|_| LoopError::ActionParse(format!("expected numbers: {args:?}")))?;
    if numbers.len() != expected {
        return Err(LoopError::ActionParse(format!(
            "expected {expected} numbers, got {}",
            numbers.len()
        )));
    }
    Ok(numbers)
}

/// Double-quoted payload with `\"` and `\\` escapes.
fn parse_quoted(raw: &str) -> Result<String, LoopError> {
    let inner = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| LoopError::ActionParse(format!("expected quoted string, got {raw:?}")))?;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => {
                    return Err(LoopError::ActionParse(
                        "dangling escape in quoted string".into(),
                    ))
                }
            }
        } else if ch == '"' {
            return Err(LoopError::ActionParse(
                "unescaped quote inside quoted string".into(),
            ));
        } else {
            result.push(ch);
        }
    }
    Ok(result)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render coordinates without a trailing `.0` for whole numbers.
fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
