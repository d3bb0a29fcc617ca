use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}_]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","and","are","as","at",
            "be","but","by",
            "for",
            "if","in","into","is","it",
            "near","no","not",
            "of","on","or",
            "such",
            "that","the","their","then","there","these","they","this","to",
            "was","will","with",
        ];
        words.iter().copied().collect()
    };
}

/// Shortest term kept in an index, counted in chars.
pub const MIN_TERM_CHARS: usize = 3;

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Words of `text` after NFKC normalization, case preserved.
pub fn words(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

pub fn stem(word: &str) -> String {
    STEMMER.stem(&word.to_lowercase()).to_string()
}

/// Whether a candidate term is worth indexing: not a stopword, not purely
/// numeric, and not a short Latin word.
fn keep(term: &str) -> bool {
    let mut chars = term.chars();
    let first = match chars.next() { Some(c) => c, None => return false };
    if (first as u32) < 256 && term.chars().count() < MIN_TERM_CHARS { return false; }
    if is_stopword(term) { return false; }
    !term.chars().all(|c| c.is_ascii_digit())
}

/// Index term for a word: its stem if that survives filtering, otherwise the
/// word itself (case preserved), otherwise nothing.
pub fn index_term(word: &str) -> Option<String> {
    let stemmed = stem(word);
    if keep(&stemmed) {
        Some(stemmed)
    } else if keep(word) {
        Some(word.to_string())
    } else {
        None
    }
}

/// Tokenize text into (term, position) pairs ready for indexing.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    let mut tokens = Vec::new();
    for (pos, word) in words(text).iter().enumerate() {
        if let Some(term) = index_term(word) {
            tokens.push((term, pos));
        }
    }
    tokens
}

/// One word of a search query together with the index keys it may be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub raw: String,
    pub keys: Vec<String>,
    /// Lowercased word when the index may hold it in its original case
    /// (short stem), matched against index keys ignoring case.
    pub folded: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub include: Vec<QueryTerm>,
    pub exclude: Vec<QueryTerm>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool { self.include.is_empty() }
}

fn query_term(word: &str) -> Option<QueryTerm> {
    let lower = word.to_lowercase();
    if lower.is_empty() || is_stopword(&lower) || lower.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut key = stem(&lower);
    let mut folded = None;
    // The indexer falls back to the raw word when the stem is too short.
    if key.chars().count() < MIN_TERM_CHARS && word.chars().count() >= MIN_TERM_CHARS {
        key = word.to_string();
        folded = Some(lower.clone());
    }
    let mut keys = vec![key];
    for alt in [word.to_string(), lower] {
        if !keys.contains(&alt) { keys.push(alt); }
    }
    Some(QueryTerm { raw: word.to_string(), keys, folded })
}

/// Split a user query into included and `-`excluded words.
pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    for chunk in query.split_whitespace() {
        let (excluded, body) = match chunk.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, chunk),
        };
        for word in words(body) {
            let Some(term) = query_term(&word) else { continue };
            let bucket = if excluded { &mut parsed.exclude } else { &mut parsed.include };
            if !bucket.iter().any(|t| t.keys[0] == term.keys[0]) {
                bucket.push(term);
            }
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert!(t.iter().any(|(w, _)| w == "run"));
    }

    #[test]
    fn short_stems_fall_back_to_word() {
        assert_eq!(index_term("The").as_deref(), Some("The"));
        assert_eq!(index_term("the"), None);
        assert_eq!(index_term("42"), None);
        assert_eq!(index_term("1st").as_deref(), Some("1st"));
    }

    #[test]
    fn query_keys_cover_case_variants() {
        let q = parse_query("DRS");
        assert_eq!(q.include.len(), 1);
        let keys = &q.include[0].keys;
        assert!(keys.contains(&"DRS".to_string()));
        assert!(keys.contains(&"drs".to_string()));
    }

    #[test]
    fn short_stems_fold_case() {
        let q = parse_query("ids");
        assert_eq!(q.include[0].keys, vec!["ids".to_string()]);
        assert_eq!(q.include[0].folded.as_deref(), Some("ids"));
        assert_eq!(parse_query("datasets").include[0].folded, None);
    }

    #[test]
    fn minus_prefix_excludes() {
        let q = parse_query("mapfile -checksums");
        assert_eq!(q.include.len(), 1);
        assert_eq!(q.exclude.len(), 1);
        assert_eq!(q.exclude[0].raw, "checksums");
    }

    #[test]
    fn stopwords_and_punctuation_only_yield_empty_query() {
        assert!(parse_query("the, of !! 2017").is_empty());
        assert!(parse_query("").is_empty());
    }
}
