use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("parsed document has no content")]
    EmptyDocument,
}

/// Decodes a response body (bad bytes are substituted, never fatal) and
/// builds the document tree. A page whose head and body are both empty is
/// treated as malformed.
pub fn parse_document(bytes: &[u8]) -> Result<Html, ParseError> {
    let text = String::from_utf8_lossy(bytes);
    let doc = Html::parse_document(&text);
    if is_empty(&doc) {
        return Err(ParseError::EmptyDocument);
    }
    Ok(doc)
}

/// Text content of every node matched by `css`, trimmed. `None` when nothing
/// matches, so callers can tell "field absent" from "field present but empty".
pub fn select_texts(doc: &Html, css: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(css).unwrap();
    let values: Vec<String> = doc
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    if values.is_empty() {
        debug!(css, "No elements matched");
        return None;
    }
    Some(values)
}

/// Same contract as [`select_texts`], but pulls the named attribute instead
/// of text content. Matched elements without the attribute are dropped.
pub fn select_attrs(doc: &Html, css: &str, attr: &str) -> Option<Vec<String>> {
    let selector = Selector::parse(css).unwrap();
    let values: Vec<String> = doc
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .collect();

    if values.is_empty() {
        debug!(css, attr, "No elements matched");
        return None;
    }
    Some(values)
}

fn is_empty(doc: &Html) -> bool {
    let head_children = Selector::parse("head > *").unwrap();
    let body_children = Selector::parse("body > *").unwrap();
    let body = Selector::parse("body").unwrap();

    if doc.select(&head_children).next().is_some() || doc.select(&body_children).next().is_some() {
        return false;
    }
    // A body holding bare text still counts as content.
    !doc.select(&body)
        .next()
        .map(|b| b.text().any(|t| !t.trim().is_empty()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_regular_page() {
        let doc = parse_document(b"<html><body><p>hello</p></body></html>").unwrap();
        assert_eq!(select_texts(&doc, "p"), Some(vec!["hello".to_string()]));
    }

    #[test]
    fn invalid_utf8_is_substituted_not_fatal() {
        let bytes = b"<html><body><p>caf\xff</p></body></html>";
        let doc = parse_document(bytes).unwrap();
        let texts = select_texts(&doc, "p").unwrap();
        assert!(texts[0].starts_with("caf"));
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(parse_document(b""), Err(ParseError::EmptyDocument)));
        assert!(matches!(
            parse_document(b"<html></html>"),
            Err(ParseError::EmptyDocument)
        ));
    }

    #[test]
    fn zero_matches_is_none_not_empty_list() {
        let doc = parse_document(b"<html><body><p>x</p></body></html>").unwrap();
        assert_eq!(select_texts(&doc, "h1"), None);
        assert_eq!(select_attrs(&doc, "a", "href"), None);
    }

    #[test]
    fn matched_but_empty_elements_survive_as_empty_strings() {
        let doc = parse_document(b"<html><body><p></p><p> spaced </p></body></html>").unwrap();
        assert_eq!(
            select_texts(&doc, "p"),
            Some(vec!["".to_string(), "spaced".to_string()])
        );
    }

    #[test]
    fn attributes_are_trimmed() {
        let doc =
            parse_document(b"<html><body><a href=\" /en/item \">x</a></body></html>").unwrap();
        assert_eq!(
            select_attrs(&doc, "a", "href"),
            Some(vec!["/en/item".to_string()])
        );
    }
}
