//! Locating a JSON payload inside model output.
//!
//! Models wrap structured answers in prose or Markdown fences. Fenced blocks
//! are tried first, then the whole text; within each, every opening bracket is
//! tried in order until a balanced span deserializes into the target type.

use crate::error::ParseError;
use serde::de::DeserializeOwned;

/// Extract the first well-formed JSON array that deserializes into `T`.
pub fn extract_json_array<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    extract(text, b'[', b']', "JSON array")
}

/// Extract the first well-formed JSON object that deserializes into `T`.
pub fn extract_json_object<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    extract(text, b'{', b'}', "JSON object")
}

fn extract<T: DeserializeOwned>(
    text: &str,
    open: u8,
    close: u8,
    expected: &'static str,
) -> Result<T, ParseError> {
    let mut last_error = None;

    for candidate in fenced_blocks(text).into_iter().chain(std::iter::once(text)) {
        let bytes = candidate.as_bytes();
        for start in (0..bytes.len()).filter(|&i| bytes[i] == open) {
            let Some(end) = balanced_end(&bytes[start..], open, close) else {
                continue;
            };
            match serde_json::from_str::<T>(&candidate[start..start + end]) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e.to_string()),
            }
        }
    }

    Err(match last_error {
        Some(message) => ParseError::Malformed { message },
        None => ParseError::NoPayload { expected },
    })
}

/// Contents of every ``` fenced block, in order.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => break,
        }
    }
    blocks
}

/// Byte length of the balanced span starting at `bytes[0] == open`, skipping string contents.
fn balanced_end(bytes: &[u8], open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
