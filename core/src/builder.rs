use crate::index::{DocId, ObjTypeId, ObjectEntry, Postings, SearchIndex, EnvVersion, ENV_VERSION};
use crate::source::{ObjKind, SourceDoc};
use crate::tokenizer::tokenize;
use std::collections::{BTreeMap, BTreeSet};

/// Collects source documents and produces a [`SearchIndex`].
///
/// Output depends only on the set of documents fed, not on feeding order:
/// documents are numbered by docname and every map is ordered.
#[derive(Default)]
pub struct IndexBuilder {
    docs: BTreeMap<String, SourceDoc>,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    /// Adds a document, replacing any earlier one with the same docname.
    pub fn feed(&mut self, doc: SourceDoc) {
        if self.docs.insert(doc.docname.clone(), doc).is_some() {
            tracing::warn!("duplicate docname replaced");
        }
    }

    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn build(&self) -> SearchIndex {
        let mut terms: BTreeMap<String, BTreeSet<DocId>> = BTreeMap::new();
        let mut titleterms: BTreeMap<String, BTreeSet<DocId>> = BTreeMap::new();
        let mut alltitles: BTreeMap<String, Vec<(DocId, Option<String>)>> = BTreeMap::new();
        let mut type_ids: BTreeMap<ObjKind, ObjTypeId> = BTreeMap::new();
        let mut index = SearchIndex::new();
        index.envversion = EnvVersion::Single(ENV_VERSION);

        for (doc_id, doc) in self.docs.values().enumerate() {
            let doc_id = doc_id as DocId;
            index.docnames.push(doc.docname.clone());
            index.filenames.push(doc.filename.clone());
            index.titles.push(doc.title.clone());

            for (term, _pos) in tokenize(&doc.text) {
                terms.entry(term).or_default().insert(doc_id);
            }
            for section in &doc.sections {
                for (term, _pos) in tokenize(&section.title) {
                    titleterms.entry(term).or_default().insert(doc_id);
                }
                alltitles.entry(section.title.clone()).or_default().push((doc_id, section.anchor.clone()));
            }
            if doc.sections.is_empty() {
                for (term, _pos) in tokenize(&doc.title) {
                    titleterms.entry(term).or_default().insert(doc_id);
                }
            }
            for obj in &doc.objects {
                let next = type_ids.len() as ObjTypeId;
                type_ids.entry(obj.kind).or_insert(next);
            }
        }

        // Object type ids are numbered in first-use order over docname-ordered documents.
        for (kind, id) in &type_ids {
            index.objtypes.insert(*id, format!("py:{}", kind.role()));
            index.objnames.insert(*id, ("py".to_string(), kind.role().to_string(), kind.label()));
        }
        for (doc_id, doc) in self.docs.values().enumerate() {
            for obj in &doc.objects {
                let (prio, anchor) = match obj.kind {
                    ObjKind::Module => (0, "-"),
                    _ => (1, ""),
                };
                let entry = ObjectEntry {
                    doc: doc_id as DocId,
                    objtype: type_ids[&obj.kind],
                    prio,
                    anchor: anchor.to_string(),
                };
                index.objects.entry(obj.prefix.clone()).or_default().insert(obj.name.clone(), entry);
            }
        }

        let to_postings = |m: BTreeMap<String, BTreeSet<DocId>>| -> BTreeMap<String, Postings> {
            m.into_iter()
                .map(|(term, docs)| (term, Postings::from_docs(docs.into_iter().collect())))
                .collect()
        };
        index.terms = to_postings(terms);
        index.titleterms = to_postings(titleterms);
        index.alltitles = alltitles;

        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.terms.len(),
            num_titleterms = index.titleterms.len(),
            "index built"
        );
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::parse_source;

    fn sources() -> Vec<SourceDoc> {
        vec![
            parse_source("usage", "usage.rst", "Generic usage\n=============\n\nRun esgprep with a project.\n"),
            parse_source(
                "drs",
                "drs.rst",
                "Manage local data through the DRS\n=================================\n\nUpgrade a DRS tree.\n\n.. py:module:: esgprep.drs\n.. py:function:: run(args)\n",
            ),
        ]
    }

    #[test]
    fn documents_are_numbered_by_docname() {
        let mut b = IndexBuilder::new();
        for doc in sources() {
            b.feed(doc);
        }
        let idx = b.build();
        assert_eq!(idx.docnames, vec!["drs", "usage"]);
        assert_eq!(idx.filenames, vec!["drs.rst", "usage.rst"]);
        assert_eq!(idx.validate(), Ok(()));
    }

    #[test]
    fn postings_and_objects() {
        let mut b = IndexBuilder::new();
        for doc in sources() {
            b.feed(doc);
        }
        let idx = b.build();
        assert_eq!(idx.terms["tree"], Postings::One(0));
        assert_eq!(idx.titleterms["usag"], Postings::One(1));
        assert_eq!(idx.objects["esgprep"]["drs"].anchor, "-");
        assert_eq!(idx.objects["esgprep.drs"]["run"].prio, 1);
        assert_eq!(idx.alltitles["Generic usage"], vec![(1, None)]);
    }

    #[test]
    fn objtypes_are_numbered_by_first_use() {
        let mut b = IndexBuilder::new();
        b.feed(parse_source("api", "api.rst", "API\n===\n\n.. py:function:: run(args)\n.. py:module:: esgprep.utils\n"));
        b.feed(parse_source("zz", "zz.rst", "Handlers\n========\n\n.. py:class:: DRSTree\n.. py:module:: esgprep.drs\n"));
        let idx = b.build();
        assert_eq!(idx.objtypes[&0], "py:function");
        assert_eq!(idx.objtypes[&1], "py:module");
        assert_eq!(idx.objtypes[&2], "py:class");
        assert_eq!(idx.objnames[&2].2, "Python class");
        assert_eq!(idx.validate(), Ok(()));
    }

    #[test]
    fn rebuild_is_identical_regardless_of_feed_order() {
        let mut a = IndexBuilder::new();
        for doc in sources() {
            a.feed(doc);
        }
        let mut b = IndexBuilder::new();
        for doc in sources().into_iter().rev() {
            b.feed(doc);
        }
        assert_eq!(a.build(), b.build());
        assert_eq!(a.build(), a.build());
    }
}
