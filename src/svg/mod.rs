//! # Path Math
//!
//! Parses the SVG path mini-language (`d` attribute) into commands, converts
//! those commands to absolute move/line/cubic segments, and composes shape
//! transforms into a single affine matrix.
//!
//! Supported: M, L, H, V, C, S, Q, T, A, Z (absolute and relative). Numbers
//! take an optional leading sign and at most one decimal point; exponents are
//! not part of the accepted grammar.

pub mod convert;
pub mod transform;

pub use convert::{ellipse_segments, to_segments, PathSegment};
pub use transform::Matrix;

use crate::error::{QuireError, Result};

/// One parsed path command with its raw parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PathCommand {
    pub op: char,
    pub params: Vec<f64>,
}

impl PathCommand {
    pub fn new(op: char, params: Vec<f64>) -> Self {
        Self { op, params }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Op(char),
    Number(f64),
}

/// A token together with the character offset it started at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathToken {
    pub token: Token,
    pub position: usize,
}

/// Number of parameters one group of `op` consumes.
pub fn arity(op: char) -> Option<usize> {
    match op.to_ascii_uppercase() {
        'M' | 'L' | 'T' => Some(2),
        'H' | 'V' => Some(1),
        'C' => Some(6),
        'S' | 'Q' => Some(4),
        'A' => Some(7),
        'Z' => Some(0),
        _ => None,
    }
}

fn path_error(position: usize, message: impl Into<String>) -> QuireError {
    QuireError::InvalidPath {
        position,
        message: message.into(),
    }
}

/// Split path data into command letters and numbers.
pub fn tokenize_path(d: &str) -> Result<Vec<PathToken>> {
    let chars: Vec<char> = d.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == ',' || ch.is_whitespace() {
            i += 1;
        } else if arity(ch).is_some() {
            tokens.push(PathToken {
                token: Token::Op(ch),
                position: i,
            });
            i += 1;
        } else if ch == '+' || ch == '-' || ch == '.' || ch.is_ascii_digit() {
            let start = i;
            let mut text = String::new();
            if ch == '+' || ch == '-' {
                text.push(ch);
                i += 1;
            }
            let mut seen_dot = false;
            let mut digits = 0;
            while i < chars.len() {
                let c = chars[i];
                if c.is_ascii_digit() {
                    digits += 1;
                } else if c == '.' && !seen_dot {
                    seen_dot = true;
                } else {
                    break;
                }
                text.push(c);
                i += 1;
            }
            if digits == 0 {
                return Err(path_error(start, format!("malformed number '{}'", text)));
            }
            let value: f64 = text
                .parse()
                .map_err(|_| path_error(start, format!("malformed number '{}'", text)))?;
            tokens.push(PathToken {
                token: Token::Number(value),
                position: start,
            });
        } else {
            return Err(path_error(i, format!("unexpected character '{}'", ch)));
        }
    }

    Ok(tokens)
}

/// Parse path data into commands.
///
/// Parameter groups repeated after a command implicitly repeat it, except
/// that extra pairs after `M`/`m` become `L`/`l`.
pub fn parse_svg_path(d: &str) -> Result<Vec<PathCommand>> {
    let tokens = tokenize_path(d)?;
    let mut commands = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let PathToken { token, position } = tokens[i];
        let op = match token {
            Token::Op(op) => op,
            Token::Number(_) => {
                return Err(path_error(position, "expected a command letter"));
            }
        };
        i += 1;

        let count = arity(op).unwrap_or(0);
        if count == 0 {
            commands.push(PathCommand::new(op, Vec::new()));
            continue;
        }

        let mut current = op;
        let mut first = true;
        loop {
            let group_start = match tokens.get(i) {
                Some(PathToken {
                    token: Token::Number(_),
                    position,
                }) => *position,
                _ if first => {
                    let at = tokens.get(i).map(|t| t.position).unwrap_or(d.chars().count());
                    return Err(path_error(
                        at,
                        format!("command '{}' expects {} parameters", op, count),
                    ));
                }
                _ => break,
            };

            let mut params = Vec::with_capacity(count);
            for k in 0..count {
                match tokens.get(i + k) {
                    Some(PathToken {
                        token: Token::Number(v),
                        ..
                    }) => params.push(*v),
                    _ => {
                        return Err(path_error(
                            group_start,
                            format!(
                                "incomplete parameters for '{}': expected {}, found {}",
                                current,
                                count,
                                params.len()
                            ),
                        ));
                    }
                }
            }
            i += count;
            commands.push(PathCommand::new(current, params));

            if first {
                current = match op {
                    'M' => 'L',
                    'm' => 'l',
                    other => other,
                };
                first = false;
            }
        }
    }

    Ok(commands)
}
