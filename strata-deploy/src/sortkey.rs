//! Alphanumeric sort keys for script names and version tokens.
//!
//! Version tokens like `1.2.2` and `1.10.0` must order numerically, not
//! lexicographically. A key is built by splitting the input on maximal digit
//! runs: digit runs become integers, everything between them stays a
//! lowercased string, and keys compare element-wise as sequences. The split
//! always yields text parts (possibly empty) at even indices and digit parts
//! at odd indices, so `"1.2.2"` becomes `["", 1, ".", 2, ".", 2, ""]`.

use std::cmp::Ordering;

/// One element of an alphanumeric sort key.
///
/// `Digits` is declared before `Text`, so the derived ordering places any
/// digit run before any text run. Keys built by [`alphanum_key`] alternate
/// text/digits by position and never actually compare across variants; the
/// variant order pins the behavior for hand-built keys anyway.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    /// A maximal run of ASCII digits, as an integer.
    Digits(u128),
    /// Everything else, lowercased.
    Text(String),
}

/// Build the sort key for a name or version token.
///
/// An empty input yields an empty key, which orders before every non-empty
/// key.
pub fn alphanum_key(input: &str) -> Vec<KeyPart> {
    if input.is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        // Text segment, possibly empty, before the next digit run.
        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                break;
            }
            text.extend(c.to_lowercase());
            chars.next();
        }
        parts.push(KeyPart::Text(text));

        if chars.peek().is_none() {
            break;
        }

        let mut digits = String::new();
        while let Some(&c) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            chars.next();
        }
        parts.push(digit_part(&digits));
    }

    parts
}

/// Compare two version tokens by their alphanumeric keys.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    alphanum_key(a).cmp(&alphanum_key(b))
}

fn digit_part(digits: &str) -> KeyPart {
    // A digit run too long for u128 falls back to its text form.
    match digits.parse::<u128>() {
        Ok(n) => KeyPart::Digits(n),
        Err(_) => KeyPart::Text(digits.to_string()),
    }
}
