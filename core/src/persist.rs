use crate::error::{Error, Result};
use crate::index::{SearchIndex, ENV_VERSION};
use crate::jsindex::{parse_search_index, to_search_index_js};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};

/// Build metadata stored next to `searchindex.js`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub envversion: u32,
    /// SHA-1 of the `searchindex.js` bytes.
    pub digest: String,
}

/// Layout of an index directory.
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn searchindex(&self) -> PathBuf { self.root.join("searchindex.js") }
    pub fn meta(&self) -> PathBuf { self.root.join("buildinfo.json") }
    pub fn sources_dir(&self) -> PathBuf { self.root.join("_sources") }
    pub fn source_text(&self, filename: &str) -> PathBuf { self.sources_dir().join(format!("{filename}.txt")) }
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Writes `searchindex.js` and returns the digest of what was written.
pub fn save_index(paths: &IndexPaths, index: &SearchIndex) -> Result<String> {
    create_dir_all(&paths.root)?;
    let js = to_search_index_js(index)?;
    fs::write(paths.searchindex(), js.as_bytes())?;
    Ok(sha1_hex(js.as_bytes()))
}

pub fn load_index(paths: &IndexPaths) -> Result<SearchIndex> {
    load_index_file(&paths.searchindex())
}

/// Reads and validates a standalone `searchindex.js`.
pub fn load_index_file(path: &Path) -> Result<SearchIndex> {
    let text = fs::read_to_string(path)?;
    let index = parse_search_index(&text)?;
    tracing::debug!(path = %path.display(), num_docs = index.num_docs(), "loaded search index");
    Ok(index)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(paths.meta(), json)?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = fs::read_to_string(paths.meta())?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_source_text(paths: &IndexPaths, filename: &str, text: &str) -> Result<()> {
    let file = paths.source_text(filename);
    if let Some(dir) = file.parent() {
        create_dir_all(dir)?;
    }
    fs::write(file, text)?;
    Ok(())
}

/// Source text for a document, if the index directory kept one.
pub fn load_source_text(paths: &IndexPaths, filename: &str) -> Option<String> {
    fs::read_to_string(paths.source_text(filename)).ok()
}

/// Metadata for a freshly written index.
pub fn meta_for(index: &SearchIndex, digest: String) -> MetaFile {
    MetaFile {
        num_docs: index.num_docs() as u32,
        num_terms: index.terms.len() as u32,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        envversion: ENV_VERSION,
        digest,
    }
}

/// Stale when the build used another environment version or the index file
/// changed after the metadata was written.
pub fn check_fresh(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let stale = |reason: String| Error::Stale { path: paths.root.display().to_string(), reason };
    if meta.envversion != ENV_VERSION {
        return Err(stale(format!("envversion {} != {}", meta.envversion, ENV_VERSION)));
    }
    let bytes = fs::read(paths.searchindex())?;
    let digest = sha1_hex(&bytes);
    if digest != meta.digest {
        return Err(stale(format!("digest {digest} does not match build metadata")));
    }
    Ok(())
}

/// Load the index of a directory along with its metadata when present.
/// A path to a file is read as a bare `searchindex.js`.
pub fn load_index_dir(path: &Path) -> Result<(SearchIndex, Option<MetaFile>)> {
    if path.is_file() {
        return Ok((load_index_file(path)?, None));
    }
    let paths = IndexPaths::new(path);
    let index = load_index(&paths)?;
    let meta = if paths.meta().exists() { Some(load_meta(&paths)?) } else { None };
    Ok((index, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::IndexBuilder;
    use crate::source::parse_source;
    use tempfile::tempdir;

    fn built() -> SearchIndex {
        let mut b = IndexBuilder::new();
        b.feed(parse_source("index", "index.rst", "Toolbox\n=======\n\nPrepare data for publication.\n"));
        b.build()
    }

    #[test]
    fn save_and_reload_directory() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = built();
        let digest = save_index(&paths, &index).unwrap();
        save_meta(&paths, &meta_for(&index, digest)).unwrap();
        save_source_text(&paths, "index.rst", "Prepare data for publication.").unwrap();

        let (loaded, meta) = load_index_dir(dir.path()).unwrap();
        assert_eq!(loaded, index);
        let meta = meta.unwrap();
        assert_eq!(meta.num_docs, 1);
        check_fresh(&paths, &meta).unwrap();
        assert_eq!(load_source_text(&paths, "index.rst").as_deref(), Some("Prepare data for publication."));
    }

    #[test]
    fn modified_index_is_stale() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = built();
        let digest = save_index(&paths, &index).unwrap();
        let meta = meta_for(&index, digest);
        fs::write(paths.searchindex(), "Search.setIndex({docnames:[],filenames:[],terms:{},titles:[],titleterms:{}})").unwrap();
        assert!(matches!(check_fresh(&paths, &meta), Err(Error::Stale { .. })));

        let old = MetaFile { envversion: ENV_VERSION - 1, ..meta };
        assert!(matches!(check_fresh(&paths, &old), Err(Error::Stale { .. })));
    }
}
