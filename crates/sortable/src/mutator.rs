//! Mechanical tree edits. Moves keep the element's [`NodeId`].

use tracing::warn;

use crate::{
    dom::{Document, NodeId},
    error::DomError,
    options::Placeholder,
};

pub const PLACEHOLDER_CLASS: &str = "sortable-placeholder";

pub fn insert_before(doc: &mut Document, target: NodeId, element: NodeId) -> Result<(), DomError> {
    let parent = doc.parent(target).ok_or(DomError::Detached(target))?;
    doc.insert_before(parent, element, Some(target))
}

pub fn insert_after(doc: &mut Document, target: NodeId, element: NodeId) -> Result<(), DomError> {
    if target == element {
        return Ok(());
    }
    let parent = doc.parent(target).ok_or(DomError::Detached(target))?;
    // Detach first so the sibling lookup does not see `element` itself.
    doc.detach(element);
    let next = doc.next_sibling(target);
    doc.insert_before(parent, element, next)
}

pub fn append(doc: &mut Document, parent: NodeId, element: NodeId) -> Result<(), DomError> {
    doc.append_child(parent, element)
}

pub fn detach(doc: &mut Document, element: NodeId) {
    doc.detach(element);
}

/// Build a detached placeholder for `source` and tag it with
/// [`PLACEHOLDER_CLASS`].
pub fn make_placeholder(doc: &mut Document, source: NodeId, kind: &Placeholder) -> NodeId {
    let tag = doc.tag(source).to_string();
    let placeholder = match kind {
        Placeholder::Default => doc.create_element(&tag),
        Placeholder::Markup(markup) => match parse_start_tag(markup) {
            Some((markup_tag, attrs)) => {
                let node = doc.create_element(&markup_tag);
                for (name, value) in attrs {
                    doc.set_attr(node, &name, value);
                }
                node
            }
            None => {
                warn!(%markup, "unparseable placeholder markup; using default placeholder");
                doc.create_element(&tag)
            }
        },
        Placeholder::Factory(factory) => {
            let node = factory(doc, &tag);
            doc.detach(node);
            node
        }
    };
    doc.add_class(placeholder, PLACEHOLDER_CLASS);
    placeholder
}

pub fn is_placeholder(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, PLACEHOLDER_CLASS)
}

/// Parse one HTML start tag (`<li class="a b" data-x=1 hidden>`) into its
/// lowercase tag name and attributes.
pub fn parse_start_tag(markup: &str) -> Option<(String, Vec<(String, String)>)> {
    let inner = markup.trim().strip_prefix('<')?;
    let end = inner.find('>')?;
    let inner = inner[..end].trim_end_matches('/').trim();

    let tag_len = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let tag = &inner[..tag_len];
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }

    let mut attrs = Vec::new();
    let mut rest = inner[tag_len..].trim_start();
    while !rest.is_empty() {
        let name_len = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        rest = rest[name_len..].trim_start();
        let Some(after_eq) = rest.strip_prefix('=') else {
            attrs.push((name, String::new()));
            continue;
        };
        let after_eq = after_eq.trim_start();
        let (value, remainder) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after_eq[1..];
                let close = body.find(quote)?;
                (&body[..close], &body[close + 1..])
            }
            _ => {
                let len = after_eq
                    .find(char::is_whitespace)
                    .unwrap_or(after_eq.len());
                (&after_eq[..len], &after_eq[len..])
            }
        };
        attrs.push((name, value.to_string()));
        rest = remainder.trim_start();
    }

    Some((tag.to_ascii_lowercase(), attrs))
}

#[cfg(test)]
#[path = "tests/mutator_tests.rs"]
mod tests;
