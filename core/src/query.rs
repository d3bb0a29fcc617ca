//! Ranked lookup against a loaded [`SearchIndex`].

use crate::index::{DocId, Postings, SearchIndex};
use crate::tokenizer::{parse_query, QueryTerm};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Score for a query word found in a document's titles.
pub const TITLE_SCORE: i32 = 15;
/// Score for a query word found in a document's text.
pub const TERM_SCORE: i32 = 5;
pub const OBJ_NAME_MATCH: i32 = 11;
pub const OBJ_PARTIAL_MATCH: i32 = 6;

fn obj_prio_bonus(prio: i32) -> i32 {
    match prio {
        0 => 15,
        1 => 5,
        2 => -5,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Maximum number of document hits; `None` returns all.
    pub limit: Option<usize>,
    /// Also match API object names.
    pub objects: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: None, objects: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub docname: String,
    pub filename: String,
    pub path: String,
    pub title: String,
    pub plain_title: String,
    pub score: i32,
    pub matched: Vec<String>,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectHit {
    pub name: String,
    pub kind: String,
    pub doc_id: DocId,
    pub path: String,
    pub anchor: String,
    pub score: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub total_hits: usize,
    pub hits: Vec<SearchHit>,
    pub objects: Vec<ObjectHit>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.objects.is_empty()
    }
}

fn lookup<'a>(map: &'a BTreeMap<String, Postings>, term: &QueryTerm) -> impl Iterator<Item = DocId> + 'a {
    let mut docs = BTreeSet::new();
    for key in &term.keys {
        if let Some(p) = map.get(key) {
            docs.extend(p.docs().iter().copied());
        }
    }
    // Raw-word keys keep the case they had in the source text.
    if let Some(folded) = &term.folded {
        for (key, p) in map {
            if key.to_lowercase() == *folded {
                docs.extend(p.docs().iter().copied());
            }
        }
    }
    docs.into_iter()
}

/// Search `index` for `query`. Pure: identical inputs give identical output.
pub fn search(index: &SearchIndex, query: &str, opts: SearchOptions) -> SearchResults {
    let parsed = parse_query(query);
    if parsed.is_empty() {
        return SearchResults::default();
    }

    let mut excluded: HashSet<DocId> = HashSet::new();
    for term in &parsed.exclude {
        excluded.extend(lookup(&index.terms, term));
        excluded.extend(lookup(&index.titleterms, term));
    }

    let mut scores: BTreeMap<DocId, (i32, Vec<String>)> = BTreeMap::new();
    for term in &parsed.include {
        let in_titles: BTreeSet<DocId> = lookup(&index.titleterms, term).collect();
        let in_text: BTreeSet<DocId> = lookup(&index.terms, term).collect();
        for &doc in in_titles.union(&in_text) {
            if excluded.contains(&doc) || index.document(doc).is_none() {
                continue;
            }
            let mut score = 0;
            if in_titles.contains(&doc) { score += TITLE_SCORE; }
            if in_text.contains(&doc) { score += TERM_SCORE; }
            let entry = scores.entry(doc).or_insert_with(|| (0, Vec::new()));
            entry.0 += score;
            entry.1.push(term.raw.clone());
        }
    }

    let mut hits: Vec<SearchHit> = scores
        .into_iter()
        .filter_map(|(doc_id, (score, matched))| {
            let doc = index.document(doc_id)?;
            let anchor = section_anchor(index, doc_id, &matched);
            Some(SearchHit {
                doc_id,
                docname: doc.docname.to_string(),
                filename: doc.filename.to_string(),
                path: doc.path(),
                title: doc.title.to_string(),
                plain_title: doc.plain_title(),
                score,
                matched,
                anchor,
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.plain_title.cmp(&b.plain_title))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    let total_hits = hits.len();
    if let Some(limit) = opts.limit {
        hits.truncate(limit);
    }

    let mut objects = if opts.objects { search_objects(index, &parsed.include) } else { Vec::new() };
    if let Some(limit) = opts.limit {
        objects.truncate(limit);
    }

    tracing::debug!(query, total_hits, objects = objects.len(), "search");
    SearchResults { total_hits, hits, objects }
}

/// First titled section of `doc` mentioning one of the matched words.
fn section_anchor(index: &SearchIndex, doc: DocId, matched: &[String]) -> Option<String> {
    let needles: Vec<String> = matched.iter().map(|m| m.to_lowercase()).collect();
    index
        .sections_of(doc)
        .into_iter()
        .filter_map(|(title, anchor)| Some((title.to_lowercase(), anchor?)))
        .find(|(title, _)| needles.iter().any(|n| title.contains(n.as_str())))
        .map(|(_, anchor)| anchor.to_string())
}

fn search_objects(index: &SearchIndex, include: &[QueryTerm]) -> Vec<ObjectHit> {
    let needles: Vec<String> = include.iter().map(|t| t.raw.to_lowercase()).collect();
    let mut hits = Vec::new();
    for obj in index.objects() {
        let full = obj.full_name();
        let full_lower = full.to_lowercase();
        let last = obj.name.to_lowercase();
        let mut best: Option<i32> = None;
        for needle in &needles {
            let score = if last == *needle {
                OBJ_NAME_MATCH
            } else if full_lower.contains(needle.as_str()) {
                OBJ_PARTIAL_MATCH
            } else {
                continue;
            };
            best = Some(best.map_or(score, |b| b.max(score)));
        }
        let Some(score) = best else { continue };
        let Some(doc) = index.document(obj.entry.doc) else { continue };
        let kind = index
            .objnames
            .get(&obj.entry.objtype)
            .map(|(_, _, label)| label.clone())
            .or_else(|| index.objtypes.get(&obj.entry.objtype).cloned())
            .unwrap_or_default();
        hits.push(ObjectHit {
            name: full,
            kind,
            doc_id: doc.id,
            path: doc.path(),
            anchor: obj.anchor(),
            score: score + obj_prio_bonus(obj.entry.prio),
        });
    }
    hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::source::parse_source;

    fn index() -> SearchIndex {
        let mut b = IndexBuilder::new();
        b.feed(parse_source(
            "drs",
            "drs.rst",
            "Manage local data through the DRS\n=================================\n\nBuild a tree of versions.\n\nUpgrade mode\n------------\n\nMigration of datasets.\n\n.. py:module:: esgprep.drs.handler\n.. py:class:: DRSTree\n",
        ));
        b.feed(parse_source(
            "mapfiles",
            "mapfiles.rst",
            "Generation mapfiles\n===================\n\nMapfiles list datasets and checksums.\n",
        ));
        b.build()
    }

    #[test]
    fn empty_and_unknown_queries_return_nothing() {
        let idx = index();
        assert!(search(&idx, "", SearchOptions::default()).is_empty());
        assert!(search(&idx, "   ", SearchOptions::default()).is_empty());
        assert!(search(&idx, "zebra", SearchOptions::default()).is_empty());
    }

    #[test]
    fn title_matches_outrank_text_matches() {
        let idx = index();
        let res = search(&idx, "datasets mapfiles", SearchOptions::default());
        assert_eq!(res.total_hits, 2);
        assert_eq!(res.hits[0].docname, "mapfiles");
        assert_eq!(res.hits[0].score, TITLE_SCORE + 2 * TERM_SCORE);
        assert_eq!(res.hits[1].docname, "drs");
        assert_eq!(res.hits[1].score, TERM_SCORE);
    }

    #[test]
    fn excluded_words_drop_documents() {
        let idx = index();
        let res = search(&idx, "datasets -checksums", SearchOptions::default());
        let names: Vec<&str> = res.hits.iter().map(|h| h.docname.as_str()).collect();
        assert_eq!(names, vec!["drs"]);
    }

    #[test]
    fn section_anchor_points_at_matching_heading() {
        let idx = index();
        let res = search(&idx, "upgrade", SearchOptions::default());
        assert_eq!(res.hits[0].anchor.as_deref(), Some("upgrade-mode"));
    }

    #[test]
    fn objects_are_found_by_name() {
        let idx = index();
        let res = search(&idx, "drstree", SearchOptions::default());
        assert_eq!(res.objects.len(), 1);
        assert_eq!(res.objects[0].name, "esgprep.drs.handler.DRSTree");
        assert_eq!(res.objects[0].score, OBJ_NAME_MATCH + 5);
        assert_eq!(res.objects[0].kind, "Python class");
        let off = search(&idx, "drstree", SearchOptions { limit: None, objects: false });
        assert!(off.objects.is_empty());
    }

    #[test]
    fn short_stem_words_match_in_any_case() {
        let mut b = IndexBuilder::new();
        b.feed(parse_source("ids", "ids.rst", "Identifiers\n===========\n\nDataset IDs are listed here.\n"));
        let idx = b.build();
        assert!(idx.terms.contains_key("IDs"));
        for query in ["IDs", "ids", "IDS"] {
            let res = search(&idx, query, SearchOptions::default());
            assert_eq!(res.total_hits, 1, "query {query:?}");
            assert_eq!(res.hits[0].docname, "ids");
        }
    }

    #[test]
    fn limit_caps_hits_but_not_total() {
        let idx = index();
        let res = search(&idx, "datasets", SearchOptions { limit: Some(1), objects: false });
        assert_eq!(res.hits.len(), 1);
        assert_eq!(res.total_hits, 2);
    }
}
