// ─────────────────────────────────────────────────────────────────────────────
//  formulary :: parser :: args
//  Splits the text between a call's parentheses into top-level arguments.
// ─────────────────────────────────────────────────────────────────────────────

/// Split `raw` at commas that sit outside parentheses and quotes.
///
/// Each argument is trimmed. An empty argument before a comma is kept
/// (`"a, , b"` → `["a", "", "b"]`); an empty final argument is not.
///
/// ```
/// use formulary_core::parser::split_arguments;
/// assert_eq!(split_arguments(r#""a,b", 2"#), vec![r#""a,b""#, "2"]);
/// ```
pub fn split_arguments(raw: &str) -> Vec<String> {
    split_arguments_with_offsets(raw)
        .into_iter()
        .map(|(_, arg)| arg.to_owned())
        .collect()
}

/// Like [`split_arguments`], but borrows from `raw` and pairs every argument
/// with the byte offset of its first non-blank character.
pub fn split_arguments_with_offsets(raw: &str) -> Vec<(usize, &str)> {
    let mut out   = Vec::new();
    let mut start = 0usize;
    // An unbalanced `)` can take this below zero; splitting then stays off.
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in raw.char_indices() {
        if let Some(q) = quote {
            if c == q { quote = None; }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '('        => depth += 1,
            ')'        => depth -= 1,
            ',' if depth == 0 => {
                out.push(trimmed(raw, start, i));
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = trimmed(raw, start, raw.len());
    if !last.1.is_empty() {
        out.push(last);
    }
    out
}

fn trimmed(raw: &str, start: usize, end: usize) -> (usize, &str) {
    let piece = &raw[start..end];
    let lead  = piece.len() - piece.trim_start().len();
    (start + lead, piece.trim())
}

// ─────────────────────────────────────────────────────────────────────────────
