use shared::protocol::OrderEntry;

use crate::{
    dom::{Document, NodeId},
    error::SortableError,
    options::SortableOptions,
    registry::eligible_items,
};

/// Walk `container`'s eligible items in document order and pair each item's
/// id attribute with its zero-based position.
pub fn serialize(
    doc: &Document,
    container: NodeId,
    options: &SortableOptions,
) -> Result<Vec<OrderEntry>, SortableError> {
    eligible_items(doc, container, &options.items)
        .into_iter()
        .enumerate()
        .map(|(position, node)| {
            let raw = doc
                .attr(node, &options.id_attribute)
                .ok_or_else(|| SortableError::MissingItemId {
                    node,
                    attribute: options.id_attribute.clone(),
                })?;
            let id = raw
                .trim()
                .parse::<i64>()
                .map_err(|_| SortableError::InvalidItemId {
                    node,
                    attribute: options.id_attribute.clone(),
                    value: raw.to_string(),
                })?;
            Ok(OrderEntry {
                id,
                position: position as i64,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/order_tests.rs"]
mod tests;
