//! Documentation search indexes: the `searchindex.js` model, its reader and
//! writer, an index builder for reStructuredText/Markdown sources, and the
//! ranked lookup a documentation search box runs.

pub mod builder;
pub mod error;
pub mod html;
pub mod index;
pub mod jsindex;
pub mod persist;
pub mod query;
pub mod snippet;
pub mod source;
pub mod tokenizer;

pub use error::{Error, FormatError, IndexError, Result};
pub use index::{DocId, Document, EnvVersion, ObjectEntry, Postings, SearchIndex, ENV_VERSION};
pub use query::{search, ObjectHit, SearchHit, SearchOptions, SearchResults};
