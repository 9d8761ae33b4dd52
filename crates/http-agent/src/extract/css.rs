//! CSS selector lookup over a parsed HTML document.

use super::ExtractError;
use scraper::{ElementRef, Html, Selector};

/// Trimmed text of the first element matching `selector`.
pub fn select(document: &Html, selector: &str) -> Result<Option<String>, ExtractError> {
    let sel = Selector::parse(selector)
        .map_err(|e| ExtractError::InvalidSelector(format!("{e:?}")))?;
    Ok(document.select(&sel).next().map(|el| element_text(&el)))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_selector_returns_trimmed_text() {
        let doc = Html::parse_document(r#"<div class="price">9.99</div>"#);
        assert_eq!(select(&doc, ".price").unwrap(), Some("9.99".to_string()));

        let padded = Html::parse_document("<p id=\"t\">\n   21.5 °C \n</p>");
        assert_eq!(select(&padded, "#t").unwrap(), Some("21.5 °C".to_string()));
    }

    #[test]
    fn test_first_match_wins() {
        let doc = Html::parse_document(
            r#"<ul><li class="v">one</li><li class="v">two</li></ul>"#,
        );
        assert_eq!(select(&doc, "li.v").unwrap(), Some("one".to_string()));
        assert_eq!(select(&doc, "li.v:nth-child(2)").unwrap(), Some("two".to_string()));
    }

    #[test]
    fn test_nested_text_is_concatenated() {
        let doc = Html::parse_document(r#"<span id="s"><b>on</b>line</span>"#);
        assert_eq!(select(&doc, "#s").unwrap(), Some("online".to_string()));
    }

    #[test]
    fn test_no_match_is_none() {
        let doc = Html::parse_document("<div>nothing</div>");
        assert_eq!(select(&doc, ".price").unwrap(), None);
    }

    #[test]
    fn test_invalid_selector_is_error() {
        let doc = Html::parse_document("<div>nothing</div>");
        assert!(matches!(
            select(&doc, "div[["),
            Err(ExtractError::InvalidSelector(_))
        ));
    }
}
