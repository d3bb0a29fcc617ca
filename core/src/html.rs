use scraper::Html;

/// Text content of an HTML fragment such as a rendered page title,
/// with runs of whitespace collapsed.
pub fn plain_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return fragment.trim().to_string();
    }
    let doc = Html::parse_fragment(fragment);
    let text: String = doc.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_markup() {
        let title = r#"<code class="docutils literal"><span class="pre">esgprep</span></code> toolbox"#;
        assert_eq!(plain_text(title), "esgprep toolbox");
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(plain_text("Q&amp;A"), "Q&A");
    }

    #[test]
    fn plain_titles_pass_through() {
        assert_eq!(plain_text(" Generic usage "), "Generic usage");
    }
}
