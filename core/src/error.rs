use crate::DocId;

/// Syntax errors while reading a `searchindex.js` payload.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unexpected end of input at byte {offset}")]
    UnexpectedEof { offset: usize },

    #[error("unexpected character {found:?} at byte {offset}, expected {expected}")]
    Unexpected {
        offset: usize,
        found: char,
        expected: &'static str,
    },

    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },

    #[error("invalid number {text:?} at byte {offset}")]
    InvalidNumber { offset: usize, text: String },

    #[error("trailing data after index literal at byte {offset}")]
    TrailingData { offset: usize },

    #[error("nesting deeper than the reader allows at byte {offset}")]
    TooDeep { offset: usize },

    #[error("unterminated Search.setIndex( call")]
    UnterminatedCall,
}

/// Structural problems in an otherwise well-formed index.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("{field}[{key:?}] references unknown document {doc} ({num_docs} documents)")]
    DanglingPosting {
        field: &'static str,
        key: String,
        doc: DocId,
        num_docs: usize,
    },

    #[error("docnames has {docnames} entries but {field} has {len}")]
    LengthMismatch {
        field: &'static str,
        docnames: usize,
        len: usize,
    },

    #[error("object {name:?} uses objtype {objtype} missing from objtypes")]
    UnknownObjType { name: String, objtype: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("index at {path} is stale: {reason}")]
    Stale { path: String, reason: String },
}

pub type Result<T> = core::result::Result<T, Error>;
