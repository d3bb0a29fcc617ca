use crate::error::IndexError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type DocId = u32;
pub type ObjTypeId = u32;

/// Environment version written by [`crate::builder::IndexBuilder`].
/// Build metadata carrying a different value marks an index directory as stale.
pub const ENV_VERSION: u32 = 50;

/// Documents containing a term. A single document is stored as a bare integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Postings {
    One(DocId),
    Many(Vec<DocId>),
}

impl Postings {
    /// Builds the canonical encoding from any list of ids.
    pub fn from_docs(mut docs: Vec<DocId>) -> Self {
        docs.sort_unstable();
        docs.dedup();
        if docs.len() == 1 {
            Postings::One(docs[0])
        } else {
            Postings::Many(docs)
        }
    }

    pub fn docs(&self) -> &[DocId] {
        match self {
            Postings::One(doc) => std::slice::from_ref(doc),
            Postings::Many(docs) => docs,
        }
    }

    pub fn contains(&self, doc: DocId) -> bool {
        self.docs().contains(&doc)
    }
}

/// `[doc, objtype, prio, anchor]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "(DocId, ObjTypeId, i32, String)",
    into = "(DocId, ObjTypeId, i32, String)"
)]
pub struct ObjectEntry {
    pub doc: DocId,
    pub objtype: ObjTypeId,
    pub prio: i32,
    /// `"-"` stands for `module-<fullname>`, `""` for `<fullname>`.
    pub anchor: String,
}

impl From<(DocId, ObjTypeId, i32, String)> for ObjectEntry {
    fn from((doc, objtype, prio, anchor): (DocId, ObjTypeId, i32, String)) -> Self {
        Self { doc, objtype, prio, anchor }
    }
}

impl From<ObjectEntry> for (DocId, ObjTypeId, i32, String) {
    fn from(e: ObjectEntry) -> Self {
        (e.doc, e.objtype, e.prio, e.anchor)
    }
}

/// `prefix -> name -> entry`
pub type Objects = BTreeMap<String, BTreeMap<String, ObjectEntry>>;

/// Either a single tag or, for newer generators, one tag per domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvVersion {
    Single(u32),
    Domains(BTreeMap<String, u32>),
}

impl EnvVersion {
    /// The generator's own tag, either the single value or the `sphinx` entry.
    pub fn primary(&self) -> Option<u32> {
        match self {
            EnvVersion::Single(v) => Some(*v),
            EnvVersion::Domains(map) => map.get("sphinx").copied(),
        }
    }
}

impl Default for EnvVersion {
    fn default() -> Self {
        EnvVersion::Single(ENV_VERSION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchIndex {
    pub docnames: Vec<String>,
    #[serde(default)]
    pub envversion: EnvVersion,
    pub filenames: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_objects")]
    pub objects: Objects,
    /// objtype id -> `[domain, role, label]`
    #[serde(default)]
    pub objnames: BTreeMap<ObjTypeId, (String, String, String)>,
    /// objtype id -> `"domain:role"`
    #[serde(default)]
    pub objtypes: BTreeMap<ObjTypeId, String>,
    pub terms: BTreeMap<String, Postings>,
    pub titles: Vec<String>,
    pub titleterms: BTreeMap<String, Postings>,
    /// section title -> `[[doc, anchor]]`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alltitles: BTreeMap<String, Vec<(DocId, Option<String>)>>,
}

/// Borrowed view of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    pub id: DocId,
    pub docname: &'a str,
    pub filename: &'a str,
    /// Rendered title; may contain inline HTML.
    pub title: &'a str,
}

impl Document<'_> {
    /// Page the browser opens for this document.
    pub fn path(&self) -> String {
        format!("{}.html", self.docname)
    }

    pub fn plain_title(&self) -> String {
        crate::html::plain_text(self.title)
    }
}

/// Borrowed view of one API object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRef<'a> {
    pub prefix: &'a str,
    pub name: &'a str,
    pub entry: &'a ObjectEntry,
}

impl ObjectRef<'_> {
    pub fn full_name(&self) -> String {
        if self.prefix.is_empty() {
            self.name.to_string()
        } else {
            format!("{}.{}", self.prefix, self.name)
        }
    }

    /// Resolves the `"-"` / `""` shorthands to the real fragment.
    pub fn anchor(&self) -> String {
        match self.entry.anchor.as_str() {
            "" => self.full_name(),
            "-" => format!("module-{}", self.full_name()),
            other => other.to_string(),
        }
    }
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_docs(&self) -> usize {
        self.docnames.len()
    }

    pub fn document(&self, id: DocId) -> Option<Document<'_>> {
        let i = id as usize;
        Some(Document {
            id,
            docname: self.docnames.get(i)?,
            filename: self.filenames.get(i)?,
            title: self.titles.get(i)?,
        })
    }

    pub fn documents(&self) -> impl Iterator<Item = Document<'_>> {
        (0..self.num_docs() as DocId).filter_map(move |id| self.document(id))
    }

    /// Section titles and anchors recorded for a document, in title order.
    pub fn sections_of(&self, doc: DocId) -> Vec<(&str, Option<&str>)> {
        let mut out = Vec::new();
        for (title, locations) in &self.alltitles {
            for (d, anchor) in locations {
                if *d == doc {
                    out.push((title.as_str(), anchor.as_deref()));
                }
            }
        }
        out
    }

    pub fn objects(&self) -> impl Iterator<Item = ObjectRef<'_>> {
        self.objects.iter().flat_map(|(prefix, names)| {
            names.iter().map(move |(name, entry)| ObjectRef {
                prefix: prefix.as_str(),
                name: name.as_str(),
                entry,
            })
        })
    }

    /// Checks that every reference in the index resolves.
    pub fn validate(&self) -> Result<(), IndexError> {
        let num_docs = self.num_docs();
        for (field, len) in [("filenames", self.filenames.len()), ("titles", self.titles.len())] {
            if len != num_docs {
                return Err(IndexError::LengthMismatch { field, docnames: num_docs, len });
            }
        }

        let dangling = |field: &'static str, key: &str, doc: DocId| IndexError::DanglingPosting {
            field,
            key: key.to_string(),
            doc,
            num_docs,
        };

        for (field, map) in [("terms", &self.terms), ("titleterms", &self.titleterms)] {
            for (term, postings) in map {
                if let Some(&doc) = postings.docs().iter().find(|&&d| d as usize >= num_docs) {
                    return Err(dangling(field, term, doc));
                }
            }
        }

        for (title, locations) in &self.alltitles {
            if let Some((doc, _)) = locations.iter().find(|(d, _)| *d as usize >= num_docs) {
                return Err(dangling("alltitles", title, *doc));
            }
        }

        for obj in self.objects() {
            if obj.entry.doc as usize >= num_docs {
                return Err(dangling("objects", &obj.full_name(), obj.entry.doc));
            }
            if !self.objtypes.contains_key(&obj.entry.objtype) {
                return Err(IndexError::UnknownObjType {
                    name: obj.full_name(),
                    objtype: obj.entry.objtype,
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectGroup {
    Named(BTreeMap<String, ObjectEntry>),
    Listed(Vec<(DocId, ObjTypeId, i32, String, String)>),
}

/// Accepts both the keyed layout and the newer `[doc, objtype, prio, anchor, name]` lists.
fn deserialize_objects<'de, D>(deserializer: D) -> Result<Objects, D::Error>
where
    D: Deserializer<'de>,
{
    let groups: BTreeMap<String, ObjectGroup> = BTreeMap::deserialize(deserializer)?;
    Ok(groups
        .into_iter()
        .map(|(prefix, group)| {
            let names = match group {
                ObjectGroup::Named(names) => names,
                ObjectGroup::Listed(rows) => rows
                    .into_iter()
                    .map(|(doc, objtype, prio, anchor, name)| {
                        (name, ObjectEntry { doc, objtype, prio, anchor })
                    })
                    .collect(),
            };
            (prefix, names)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> SearchIndex {
        let mut idx = SearchIndex::new();
        idx.docnames = vec!["drs".into(), "usage".into()];
        idx.filenames = vec!["drs.rst".into(), "usage.rst".into()];
        idx.titles = vec!["Manage local data through the DRS".into(), "Generic usage".into()];
        idx.terms.insert("tree".into(), Postings::One(0));
        idx.titleterms.insert("usag".into(), Postings::Many(vec![1]));
        idx
    }

    #[test]
    fn postings_canonical_form() {
        assert_eq!(Postings::from_docs(vec![4, 4]), Postings::One(4));
        assert_eq!(Postings::from_docs(vec![3, 1, 3]), Postings::Many(vec![1, 3]));
        assert!(Postings::Many(vec![1, 3]).contains(3));
    }

    #[test]
    fn validate_accepts_consistent_index() {
        assert_eq!(tiny().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_dangling_posting() {
        let mut idx = tiny();
        idx.terms.insert("ghost".into(), Postings::Many(vec![0, 7]));
        match idx.validate() {
            Err(IndexError::DanglingPosting { field, key, doc, num_docs }) => {
                assert_eq!(field, "terms");
                assert_eq!(key, "ghost");
                assert_eq!(doc, 7);
                assert_eq!(num_docs, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_unknown_objtype() {
        let mut idx = tiny();
        idx.objtypes.insert(0, "py:module".into());
        idx.objects
            .entry("esgprep.drs".into())
            .or_default()
            .insert("main".into(), ObjectEntry { doc: 0, objtype: 0, prio: 0, anchor: "-".into() });
        assert_eq!(idx.validate(), Ok(()));

        idx.objects
            .entry("esgprep.drs.main".into())
            .or_default()
            .insert("run".into(), ObjectEntry { doc: 0, objtype: 2, prio: 1, anchor: String::new() });
        assert_eq!(
            idx.validate(),
            Err(IndexError::UnknownObjType { name: "esgprep.drs.main.run".into(), objtype: 2 })
        );
    }

    #[test]
    fn validate_rejects_dangling_object_doc() {
        let mut idx = tiny();
        idx.objtypes.insert(1, "py:class".into());
        idx.objects
            .entry("esgprep.drs.handler".into())
            .or_default()
            .insert("DRSTree".into(), ObjectEntry { doc: 5, objtype: 1, prio: 1, anchor: String::new() });
        assert!(matches!(
            idx.validate(),
            Err(IndexError::DanglingPosting { field: "objects", doc: 5, .. })
        ));
    }

    #[test]
    fn validate_rejects_dangling_alltitles() {
        let mut idx = tiny();
        idx.alltitles.insert("Generic usage".into(), vec![(1, None)]);
        assert_eq!(idx.validate(), Ok(()));
        idx.alltitles.insert("Upgrade mode".into(), vec![(0, Some("upgrade-mode".into())), (2, None)]);
        match idx.validate() {
            Err(IndexError::DanglingPosting { field, key, doc, .. }) => {
                assert_eq!((field, key.as_str(), doc), ("alltitles", "Upgrade mode", 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_short_titles() {
        let mut idx = tiny();
        idx.titles.pop();
        assert!(matches!(idx.validate(), Err(IndexError::LengthMismatch { field: "titles", .. })));
    }

    #[test]
    fn object_anchor_shorthands() {
        let module = ObjectEntry { doc: 0, objtype: 0, prio: 0, anchor: "-".into() };
        let func = ObjectEntry { doc: 0, objtype: 2, prio: 1, anchor: "".into() };
        let m = ObjectRef { prefix: "esgprep", name: "drs", entry: &module };
        let f = ObjectRef { prefix: "esgprep.drs.main", name: "run", entry: &func };
        assert_eq!(m.anchor(), "module-esgprep.drs");
        assert_eq!(f.anchor(), "esgprep.drs.main.run");
    }

    #[test]
    fn listed_objects_are_normalized() {
        let json = r#"{"docnames":["a"],"filenames":["a.rst"],"titles":["A"],"terms":{},"titleterms":{},
            "objtypes":{"0":"py:function"},"objects":{"pkg":[[0,0,1,"","run"]]}}"#;
        let idx: SearchIndex = serde_json::from_str(json).unwrap();
        assert_eq!(idx.objects["pkg"]["run"], ObjectEntry { doc: 0, objtype: 0, prio: 1, anchor: String::new() });
        assert_eq!(idx.objtypes[&0], "py:function");
    }
}
