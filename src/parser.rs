//! Expression parser: splits a six-field crontab-style spec into
//! second/minute/hour/day-of-month/month/weekday sub-expressions and
//! compiles each into a [`FieldMask`].
//!
//! Grammar (spec.md §6):
//! ```text
//! spec   := token WS token WS token WS token WS token WS token
//! token  := term ("," term)*
//! term   := atom ("/" uint)?
//! atom   := "*" | uint | uint "-" uint
//! ```

use crate::bitset::{self, FieldMask};
use crate::error::{CronError, Result};

/// Parse a single six-field spec into its raw field masks, in
/// second/minute/hour/day/month/weekday order, *before* the per-field
/// valid-range clamp (callers apply that; see [`crate::schedule::TimeSchedule`]).
///
/// # Errors
/// Returns [`CronError::InvalidParameter`] if `spec` doesn't split into
/// exactly six whitespace-separated fields, or if any field fails to parse.
pub fn parse_fields(spec: &str) -> Result<[FieldMask; 6]> {
    let tokens: Vec<&str> = spec.split_whitespace().collect();
    if tokens.len() != 6 {
        return Err(CronError::InvalidParameter(format!(
            "expected 6 fields, got {}",
            tokens.len()
        )));
    }

    let mut masks = [0u64; 6];
    for (slot, token) in masks.iter_mut().zip(tokens.iter()) {
        *slot = parse_token(token)?;
    }
    Ok(masks)
}

/// `term ("," term)*` — union of comma-separated range terms.
fn parse_token(token: &str) -> Result<FieldMask> {
    let mut mask: FieldMask = 0;
    for term in token.split(',') {
        mask |= parse_term(term)?;
    }
    Ok(mask)
}

/// `atom ("/" uint)?` — a single range-or-value term, optionally stepped.
/// Exposed standalone since it's a useful primitive for inspecting how one
/// field compiles, independent of the six-field spec grammar.
///
/// # Errors
/// Returns [`CronError::InvalidParameter`] on a step of zero, more than one
/// `/` or `-`, or a non-integer atom.
pub fn parse_term(term: &str) -> Result<FieldMask> {
    let parts: Vec<&str> = term.split('/').collect();
    let (atom, step) = match parts.as_slice() {
        [atom] => (*atom, 1u64),
        [atom, step] => {
            let step: u64 = step
                .parse()
                .map_err(|_| CronError::InvalidParameter(format!("bad step in {term:?}")))?;
            if step == 0 {
                return Err(CronError::InvalidParameter(format!(
                    "step of zero in {term:?}"
                )));
            }
            (*atom, step)
        }
        _ => {
            return Err(CronError::InvalidParameter(format!(
                "more than one '/' in {term:?}"
            )));
        }
    };

    let (start, end) = parse_atom(atom)?;
    Ok(expand(start, end, step))
}

/// `"*" | uint | uint "-" uint`, returning the raw `(start, end)` pair
/// before the 64-bit saturation clamp.
fn parse_atom(atom: &str) -> Result<(u64, u64)> {
    if atom == "*" {
        return Ok((0, 63));
    }

    let parts: Vec<&str> = atom.split('-').collect();
    match parts.as_slice() {
        [n] => {
            let n: u64 = n
                .parse()
                .map_err(|_| CronError::InvalidParameter(format!("not a number: {n:?}")))?;
            Ok((n, n))
        }
        [a, b] => {
            let a: u64 = a
                .parse()
                .map_err(|_| CronError::InvalidParameter(format!("not a number: {a:?}")))?;
            let b: u64 = b
                .parse()
                .map_err(|_| CronError::InvalidParameter(format!("not a number: {b:?}")))?;
            Ok((a, b))
        }
        _ => Err(CronError::InvalidParameter(format!(
            "more than one '-' in {atom:?}"
        ))),
    }
}

/// Expand `start..=end` stepped by `step` into a bitmask, after clamping
/// `start`/`end` into the 64-bit addressable range (spec.md §4.B: "any
/// `start > 63` is clamped to 64 [forcing an empty expansion]; any
/// `end > 63` is clamped to 63").
fn expand(start: u64, end: u64, step: u64) -> FieldMask {
    let start = if start > 63 { 64 } else { start };
    let end = if end > 63 { 63 } else { end };
    if start > end {
        return 0;
    }
    let mut mask = 0u64;
    let mut i = start;
    while i <= end {
        mask = bitset::set_bit(mask, i as u8);
        i += step;
    }
    mask
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn wrong_token_count_is_invalid_parameter() {
        assert!(matches!(
            parse_fields("* * * 32 3"),
            Err(CronError::InvalidParameter(_))
        ));
    }

    #[test]
    fn range_expansion_matches_spec_example() {
        // spec.md §8 scenario 6
        assert_eq!(parse_term("0-31/4").unwrap(), 0x1111_1111);
    }

    #[test]
    fn star_step_before_range_clamp() {
        // spec.md §8 scenario 6: "*/4 on a 60-range field" before clamping
        assert_eq!(parse_term("*/4").unwrap(), 0x1111_1111_1111_1111);
    }

    #[test]
    fn reversed_range_is_empty() {
        assert_eq!(parse_term("10-5").unwrap(), 0);
    }

    #[test]
    fn step_of_zero_is_rejected() {
        assert!(parse_term("0/0").is_err());
    }

    #[test]
    fn too_many_slashes_is_rejected() {
        assert!(parse_term("1/2/3").is_err());
    }

    #[test]
    fn too_many_hyphens_is_rejected() {
        assert!(parse_term("1-2-3").is_err());
    }

    #[test]
    fn non_integer_is_rejected() {
        assert!(parse_term("abc").is_err());
    }

    #[test]
    fn comma_union() {
        let mask = parse_token("1,3,5").unwrap();
        assert!(bitset::is_set(mask, 1));
        assert!(bitset::is_set(mask, 3));
        assert!(bitset::is_set(mask, 5));
        assert!(!bitset::is_set(mask, 2));
    }

    #[test]
    fn out_of_range_start_clamps_to_empty() {
        assert_eq!(parse_term("64-70").unwrap(), 0);
    }
}
