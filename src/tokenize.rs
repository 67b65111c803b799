//! Splitting of the trailing CLI arguments into paths.
//!
//! The arguments are joined with single spaces and re-split here so that a
//! path list can be passed as one quoted shell word as well as many words.
//!
//! - a space outside quotes separates paths; runs of spaces collapse
//! - `"` toggles quoting; a closing quote ends the current path right away,
//!   so `"ab"cd` yields `ab` and `cd`
//! - `\"` is a literal quote, `\x` for any other `x` is kept as `\x`
//! - an unclosed quote is an error

use std::path::PathBuf;

use crate::error::{PatchError, PatchResult};

pub fn split_paths(line: &str) -> PatchResult<Vec<PathBuf>> {
    Ok(split_tokens(line)?.into_iter().map(PathBuf::from).collect())
}

pub fn split_tokens(line: &str) -> PatchResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('"') => current.push('"'),
                Some(escaped) => {
                    current.push('\\');
                    current.push(escaped);
                }
                None => current.push('\\'),
            },
            '"' if quoted => {
                tokens.push(std::mem::take(&mut current));
                quoted = false;
            }
            '"' => quoted = true,
            ' ' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }

    if quoted {
        return Err(PatchError::UnterminatedQuote);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
