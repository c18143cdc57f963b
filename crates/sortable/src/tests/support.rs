use crate::{
    dom::{Document, NodeId, Rect},
    ghost::{DataTransfer, TransferError},
    mutator::is_placeholder,
};

pub(crate) const ROW: f64 = 20.0;

/// A `<ul>` under the root with one `<li data-id=..>` per id, stacked in
/// rows of [`ROW`] pixels.
pub(crate) fn list(doc: &mut Document, ids: &[i64]) -> (NodeId, Vec<NodeId>) {
    let ul = doc.create_element("ul");
    doc.append_child(doc.root(), ul).expect("attach list");
    let items = ids
        .iter()
        .enumerate()
        .map(|(row, id)| {
            let li = doc.create_element("li");
            doc.set_attr(li, "data-id", id.to_string());
            doc.set_rect(li, Rect::new(0.0, row as f64 * ROW, 100.0, ROW));
            doc.append_child(ul, li).expect("attach item");
            li
        })
        .collect();
    (ul, items)
}

/// Ids of the non-placeholder children, in document order.
pub(crate) fn ids(doc: &Document, container: NodeId) -> Vec<i64> {
    doc.children(container)
        .iter()
        .filter(|child| !is_placeholder(doc, **child))
        .filter_map(|child| doc.attr(*child, "data-id"))
        .map(|raw| raw.parse().expect("numeric id"))
        .collect()
}

/// Vertical centre of row `row`.
pub(crate) fn row_mid(row: usize) -> f64 {
    row as f64 * ROW + ROW / 2.0
}

/// In-memory transfer that records what the engine asked for.
#[derive(Debug, Clone)]
pub(crate) struct RecordingTransfer {
    pub(crate) effect_allowed: Option<String>,
    pub(crate) data: Vec<(String, String)>,
    pub(crate) drag_image: Option<(NodeId, i64, i64)>,
    pub(crate) supports_drag_image: bool,
}

impl Default for RecordingTransfer {
    fn default() -> Self {
        Self {
            effect_allowed: None,
            data: Vec::new(),
            drag_image: None,
            supports_drag_image: true,
        }
    }
}

impl RecordingTransfer {
    pub(crate) fn without_drag_image() -> Self {
        Self {
            supports_drag_image: false,
            ..Self::default()
        }
    }
}

impl DataTransfer for RecordingTransfer {
    fn set_effect_allowed(&mut self, effect: &str) {
        self.effect_allowed = Some(effect.to_string());
    }

    fn set_data(&mut self, format: &str, data: &str) -> Result<(), TransferError> {
        self.data.push((format.to_string(), data.to_string()));
        Ok(())
    }

    fn set_drag_image(&mut self, image: NodeId, x: i64, y: i64) -> Result<(), TransferError> {
        if !self.supports_drag_image {
            return Err(TransferError::Unsupported);
        }
        self.drag_image = Some((image, x, y));
        Ok(())
    }
}
