//! Chapter markup cleanup: typographic characters to ASCII and a final pass that
//! replaces anything the XHTML output cannot carry.

/// Placeholder for code points that cannot be written to the output document.
pub const PLACEHOLDER: char = '?';

/// Clean raw chapter markup.
///
/// Replaces no-break spaces with spaces, curly quotes with straight ones, the
/// ellipsis character with `...` and `ö` with `o`. Any code point the UTF-8
/// XHTML output cannot carry becomes [PLACEHOLDER]. Nothing else is touched:
/// whitespace and entities are left as they are.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\u{00a0}' | '\u{202f}' => out.push(' '),
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            'ö' => out.push('o'),
            c if is_unrepresentable(c) => out.push(PLACEHOLDER),
            c => out.push(c),
        }
    }
    out
}

/// Characters XML 1.0 forbids, plus U+FFFD left behind by a lossy decode of the page body.
fn is_unrepresentable(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        '\u{0000}'..='\u{001f}' => true,
        '\u{0080}'..='\u{009f}' => true,
        '\u{fffd}' | '\u{fffe}' | '\u{ffff}' => true,
        _ => false,
    }
}
