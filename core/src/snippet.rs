/// Bytes of context kept before the first match.
const BEFORE: usize = 100;
/// Bytes of context kept after the first match.
const AFTER: usize = 200;

/// Excerpt of `text` around the first occurrence of any of `raw_terms`,
/// with matches wrapped in `<em>`.
pub fn snippet(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() { return None; }
    // find first match (case-insensitive) of any raw term
    let mut first_idx: Option<usize> = None;
    for term in raw_terms {
        if term.trim().is_empty() { continue; }
        if let Some(pos) = find_case_insensitive(text, term) { first_idx = Some(pos); break; }
    }
    let excerpt = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(text, idx.saturating_sub(BEFORE));
            let end = floor_char_boundary(text, (idx + AFTER).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(AFTER).collect(),
    };
    Some(highlight_terms(&excerpt, raw_terms))
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) { idx -= 1; }
    idx
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let n = needle.as_bytes();
    if n.is_empty() || n.len() > haystack.len() { return None; }
    haystack
        .as_bytes()
        .windows(n.len())
        .position(|w| w.eq_ignore_ascii_case(n))
        .filter(|&pos| haystack.is_char_boundary(pos))
}

pub fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_around_first_match() {
        let text = "Intro. The DRS tree is built from incoming files.";
        let s = snippet(text, &["drs".to_string()]).unwrap();
        assert_eq!(s, "Intro. The <em>DRS</em> tree is built from incoming files.");
    }

    #[test]
    fn falls_back_to_leading_text() {
        let text = "x".repeat(500);
        let s = snippet(&text, &["nomatch".to_string()]).unwrap();
        assert_eq!(s.len(), AFTER);
    }

    #[test]
    fn window_respects_char_boundaries() {
        let text = format!("{}mapfile{}", "é".repeat(80), "ü".repeat(150));
        let s = snippet(&text, &["mapfile".to_string()]).unwrap();
        assert!(s.contains("<em>mapfile</em>"));
    }

    #[test]
    fn empty_text_has_no_snippet() {
        assert_eq!(snippet("", &["drs".to_string()]), None);
    }
}
