//! XPath evaluation over a parsed XML document.

use super::ExtractError;
use sxd_document::dom::ChildOfRoot;
use sxd_document::Package;
use sxd_xpath::{Context, Factory, Value as XPathValue};

/// Evaluate `selector` with the document's root element as context node.
///
/// Node-set results yield the string value of the first node in document
/// order; scalar results are stringified. An empty node-set is `Ok(None)`.
pub fn select(package: &Package, selector: &str) -> Result<Option<String>, ExtractError> {
    let document = package.as_document();
    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| match child {
            ChildOfRoot::Element(element) => Some(element),
            _ => None,
        })
        .ok_or_else(|| ExtractError::Evaluation("document has no root element".to_string()))?;

    let xpath = Factory::new()
        .build(selector)
        .map_err(|e| ExtractError::InvalidSelector(format!("{e}")))?
        .ok_or_else(|| ExtractError::InvalidSelector("empty XPath expression".to_string()))?;

    let context = Context::new();
    let value = xpath
        .evaluate(&context, root)
        .map_err(|e| ExtractError::Evaluation(format!("{e}")))?;

    Ok(match value {
        XPathValue::Nodeset(nodes) => nodes.document_order_first().map(|n| n.string_value()),
        XPathValue::String(s) => Some(s),
        XPathValue::Number(n) => Some(format_number(n)),
        XPathValue::Boolean(b) => Some(b.to_string()),
    })
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
