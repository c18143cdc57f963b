use shared::protocol::SortResponse;
use sortable::{DataTransfer, Document, DomEvent, NodeId, Sortable, Transition};
use tracing::warn;

use crate::{ClientError, OrderSink};

#[derive(Debug)]
pub struct Handled {
    pub transition: Transition,
    pub saved: Option<SortResponse>,
}

/// Glue between the reordering engine and an [`OrderSink`]: every drop
/// sends the destination container's new order.
pub struct ReorderController<S> {
    sortable: Sortable,
    sink: S,
}

impl<S: OrderSink> ReorderController<S> {
    pub fn new(sortable: Sortable, sink: S) -> Self {
        Self { sortable, sink }
    }

    pub fn sortable(&self) -> &Sortable {
        &self.sortable
    }

    pub fn sortable_mut(&mut self) -> &mut Sortable {
        &mut self.sortable
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Forward `event` to the engine. A drop that moved something is saved;
    /// a rejected save is returned as an error and the document keeps the
    /// order the user dropped.
    pub async fn handle(
        &mut self,
        doc: &mut Document,
        event: DomEvent,
        transfer: Option<&mut dyn DataTransfer>,
    ) -> Result<Handled, ClientError> {
        let transition = self.sortable.dispatch(doc, event, transfer)?;
        let Transition::Dropped(update) = transition else {
            return Ok(Handled {
                transition,
                saved: None,
            });
        };
        if !update.changed() {
            return Ok(Handled {
                transition,
                saved: None,
            });
        };

        match self.save_order(doc, update.destination).await {
            Ok(saved) => Ok(Handled {
                transition,
                saved: Some(saved),
            }),
            Err(error) => {
                warn!(%error, destination = ?update.destination, "order save failed; display and server may disagree until reload");
                Err(error)
            }
        }
    }

    pub async fn save_order(
        &self,
        doc: &Document,
        container: NodeId,
    ) -> Result<SortResponse, ClientError> {
        let entries = self.sortable.serialize_order(doc, container)?;
        self.sink.submit(entries).await
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
