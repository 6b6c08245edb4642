//! Text normalization for mention/label comparison.
//!
//! Every string that enters the engine (taxonomy labels at index build
//! time, skill mentions at resolution time) passes through [`normalize`]
//! first, so the two sides are always compared in the same canonical form.
//! Changing this function invalidates previously computed match results and
//! requires a full re-resolution.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a string for matching.
///
/// Steps, in order:
/// 1. lowercase,
/// 2. Unicode canonical decomposition (NFD) followed by stripping of
///    combining marks ("á" → "a", "ñ" → "n"),
/// 3. replace every character that is not an ASCII letter, digit, or
///    whitespace with a single space,
/// 4. collapse whitespace runs to one space and trim.
///
/// Pure and deterministic; no locale-dependent behavior.
///
/// # Examples
///
/// ```
/// use assay::normalize::normalize;
///
/// assert_eq!(normalize("  Gestión de   Proyectos! "), "gestion de proyectos");
/// assert_eq!(normalize("C++"), "c");
/// ```
pub fn normalize(s: &str) -> String {
    let decomposed: String = s
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let spaced: String = decomposed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize and split into whitespace-delimited tokens.
pub fn tokenize(s: &str) -> Vec<String> {
    normalize(s)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
