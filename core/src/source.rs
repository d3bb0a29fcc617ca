//! Reading documentation sources (reStructuredText or Markdown) into the
//! pieces the index is built from.

use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

lazy_static! {
    static ref ROLE: Regex = Regex::new(r":[A-Za-z][\w:+-]*:`").expect("valid regex");
    static ref DIRECTIVE: Regex = Regex::new(r"^\s*\.\.\s+([\w:-]+)::\s*(.*)$").expect("valid regex");
    static ref MD_HEADING: Regex = Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex");
}

const SOURCE_EXTENSIONS: &[&str] = &["rst", "md", "txt"];
const ADORNMENT_CHARS: &str = "=-~^\"'`#*+:._";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    /// `None` for the page title itself.
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjKind {
    Module,
    Class,
    Function,
    Method,
    Exception,
    StaticMethod,
}

impl ObjKind {
    fn from_directive(name: &str) -> Option<Self> {
        Some(match name {
            "py:module" => ObjKind::Module,
            "py:class" => ObjKind::Class,
            "py:function" => ObjKind::Function,
            "py:method" => ObjKind::Method,
            "py:exception" => ObjKind::Exception,
            "py:staticmethod" => ObjKind::StaticMethod,
            _ => return None,
        })
    }

    pub fn role(self) -> &'static str {
        match self {
            ObjKind::Module => "module",
            ObjKind::Class => "class",
            ObjKind::Function => "function",
            ObjKind::Method => "method",
            ObjKind::Exception => "exception",
            ObjKind::StaticMethod => "staticmethod",
        }
    }

    /// Human label, e.g. `Python static method`.
    pub fn label(self) -> String {
        let words = match self {
            ObjKind::StaticMethod => "static method",
            other => other.role(),
        };
        format!("Python {words}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub prefix: String,
    pub name: String,
    pub kind: ObjKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDoc {
    pub docname: String,
    pub filename: String,
    pub title: String,
    pub sections: Vec<Section>,
    /// Prose with headings and directive markers removed.
    pub text: String,
    pub objects: Vec<SourceObject>,
}

/// Anchor id for a section title: lowercase, runs of other characters
/// collapsed into `-`.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if dash && !out.is_empty() {
                out.push('-');
            }
            dash = false;
            out.push(c);
        } else {
            dash = true;
        }
    }
    out
}

fn is_adornment(line: &str) -> bool {
    let line = line.trim_end();
    let mut chars = line.chars();
    match chars.next() {
        Some(first) if ADORNMENT_CHARS.contains(first) => {
            line.chars().count() >= 3 && chars.all(|c| c == first)
        }
        _ => false,
    }
}

#[derive(Default)]
struct ObjectScope {
    module: String,
    class: Option<String>,
}

impl ObjectScope {
    fn register(&mut self, kind: ObjKind, signature: &str) -> Option<SourceObject> {
        let full = signature.split('(').next().unwrap_or("").trim();
        if full.is_empty() {
            return None;
        }
        if kind == ObjKind::Module {
            self.module = full.to_string();
            self.class = None;
            let (prefix, name) = full.rsplit_once('.').unwrap_or(("", full));
            return Some(SourceObject { prefix: prefix.into(), name: name.into(), kind });
        }
        let (explicit_prefix, name) = match full.rsplit_once('.') {
            Some((p, n)) => (Some(p.to_string()), n.to_string()),
            None => (None, full.to_string()),
        };
        let scope = match kind {
            ObjKind::Method | ObjKind::StaticMethod => match &self.class {
                Some(class) => join_path(&self.module, class),
                None => self.module.clone(),
            },
            _ => self.module.clone(),
        };
        let prefix = match explicit_prefix {
            Some(p) => join_path(&scope, &p),
            None => scope,
        };
        if kind == ObjKind::Class {
            self.class = Some(name.clone());
        } else if !matches!(kind, ObjKind::Method | ObjKind::StaticMethod) {
            self.class = None;
        }
        Some(SourceObject { prefix, name, kind })
    }
}

fn join_path(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else {
        format!("{a}.{b}")
    }
}

fn push_section(doc: &mut SourceDoc, title: &str) {
    let title = ROLE.replace_all(title.trim(), "`").replace(['`', '*'], "");
    if doc.sections.is_empty() {
        doc.title = title.clone();
        doc.sections.push(Section { title, anchor: None });
    } else {
        let anchor = Some(slugify(&title));
        doc.sections.push(Section { title, anchor });
    }
}

fn push_text(doc: &mut SourceDoc, line: &str) {
    let cleaned = ROLE.replace_all(line, "`");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return;
    }
    if !doc.text.is_empty() {
        doc.text.push('\n');
    }
    doc.text.push_str(trimmed);
}

/// Parse one source file. Markdown is recognised by the `.md` extension.
pub fn parse_source(docname: &str, filename: &str, text: &str) -> SourceDoc {
    let mut doc = SourceDoc {
        docname: docname.to_string(),
        filename: filename.to_string(),
        title: String::new(),
        sections: Vec::new(),
        text: String::new(),
        objects: Vec::new(),
    };
    if filename.ends_with(".md") {
        parse_markdown(&mut doc, text);
    } else {
        parse_rst(&mut doc, text);
    }
    if doc.title.is_empty() {
        doc.title = docname.rsplit('/').next().unwrap_or(docname).to_string();
    }
    doc
}

fn parse_rst(doc: &mut SourceDoc, text: &str) {
    let lines: Vec<&str> = text.lines().collect();
    let mut scope = ObjectScope::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if is_adornment(line) {
            i += 1;
            continue;
        }
        let next = lines.get(i + 1).copied().unwrap_or("");
        let title = line.trim();
        if !title.is_empty()
            && !line.starts_with(char::is_whitespace)
            && is_adornment(next)
            && next.trim_end().chars().count() >= title.chars().count()
        {
            push_section(doc, title);
            i += 2;
            continue;
        }
        if let Some(caps) = DIRECTIVE.captures(line) {
            let name = &caps[1];
            let argument = caps[2].to_string();
            if let Some(kind) = ObjKind::from_directive(name) {
                if let Some(obj) = scope.register(kind, &argument) {
                    doc.objects.push(obj);
                }
            } else if name == "py:currentmodule" {
                scope.module = argument.trim().to_string();
                scope.class = None;
            }
            push_text(doc, &argument);
            i += 1;
            continue;
        }
        // Comments and hyperlink targets.
        if line.trim_start().starts_with("..") {
            i += 1;
            continue;
        }
        push_text(doc, line);
        i += 1;
    }
}

fn parse_markdown(doc: &mut SourceDoc, text: &str) {
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            if let Some(caps) = MD_HEADING.captures(line) {
                push_section(doc, &caps[2]);
                continue;
            }
        }
        push_text(doc, line);
    }
}

/// Load every documentation source under `root`, ordered by path.
pub fn load_sources(root: &Path) -> Result<Vec<SourceDoc>> {
    let mut docs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        if !p.is_file() { continue; }
        let Some(ext) = p.extension().and_then(|s| s.to_str()) else { continue };
        if !SOURCE_EXTENSIONS.contains(&ext) { continue; }
        let Ok(rel) = p.strip_prefix(root) else { continue };
        let filename = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let docname = filename
            .strip_suffix(&format!(".{ext}"))
            .unwrap_or(&filename)
            .to_string();
        let text = fs::read_to_string(p)?;
        tracing::debug!(%docname, bytes = text.len(), "read source");
        docs.push(parse_source(&docname, &filename, &text));
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRS_RST: &str = "\
.. _drs:

Manage local data through the DRS
=================================

The ``drs`` subcommand builds a DRS tree from incoming files.

Upgrade mode
------------

Use :ref:`usage` to pick a migration mode.

.. py:module:: esgprep.drs.handler

.. py:class:: DRSTree(root)

   .. py:method:: upgrade(todo_only=False)

.. py:function:: process(collector_input)
";

    #[test]
    fn rst_title_sections_and_text() {
        let doc = parse_source("drs", "drs.rst", DRS_RST);
        assert_eq!(doc.title, "Manage local data through the DRS");
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[1], Section { title: "Upgrade mode".into(), anchor: Some("upgrade-mode".into()) });
        assert!(doc.text.contains("builds a DRS tree"));
        assert!(doc.text.contains("`usage`"));
        assert!(!doc.text.contains("====="));
    }

    #[test]
    fn rst_objects_nest_methods_under_classes() {
        let doc = parse_source("drs", "drs.rst", DRS_RST);
        let names: Vec<(String, String, ObjKind)> = doc
            .objects
            .iter()
            .map(|o| (o.prefix.clone(), o.name.clone(), o.kind))
            .collect();
        assert_eq!(
            names,
            vec![
                ("esgprep.drs".into(), "handler".into(), ObjKind::Module),
                ("esgprep.drs.handler".into(), "DRSTree".into(), ObjKind::Class),
                ("esgprep.drs.handler.DRSTree".into(), "upgrade".into(), ObjKind::Method),
                ("esgprep.drs.handler".into(), "process".into(), ObjKind::Function),
            ]
        );
    }

    #[test]
    fn markdown_headings() {
        let doc = parse_source("faq", "faq.md", "# Frequently asked questions\n\n## How to run?\n\nRun `esgprep`.\n```\n# not a heading\n```\n");
        assert_eq!(doc.title, "Frequently asked questions");
        assert_eq!(doc.sections[1].anchor.as_deref(), Some("how-to-run"));
        assert!(doc.text.contains("# not a heading"));
    }

    #[test]
    fn untitled_source_uses_docname() {
        let doc = parse_source("api/misc", "api/misc.rst", "just text\n");
        assert_eq!(doc.title, "misc");
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Exit status: (0/1)"), "exit-status-0-1");
        assert_eq!(slugify("  DRS  "), "drs");
    }
}
