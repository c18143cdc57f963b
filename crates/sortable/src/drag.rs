//! The drag state machine: `idle -> dragging -> (dropped | cancelled) -> idle`.
//!
//! Each host event maps onto one transition function below. All work is
//! synchronous within the call; the only state carried between events is
//! the [`DragSession`].

use tracing::{debug, warn};

use crate::{
    dom::{Document, NodeId},
    error::SortableError,
    events::{SortEvent, SortUpdate},
    ghost::{self, DataTransfer},
    mutator,
    registry::{BindingRole, EventKind},
    Sortable,
};

pub const DRAGGING_CLASS: &str = "sortable-dragging";

/// A host event delivered to the engine, with the pointer position in page
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomEvent {
    pub kind: EventKind,
    pub target: NodeId,
    pub page_x: f64,
    pub page_y: f64,
    /// Ghost offset supplied by the host; derived from the pointer when
    /// absent.
    pub ghost_offset: Option<(f64, f64)>,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: NodeId) -> Self {
        Self {
            kind,
            target,
            page_x: 0.0,
            page_y: 0.0,
            ghost_offset: None,
        }
    }

    pub fn at(mut self, page_x: f64, page_y: f64) -> Self {
        self.page_x = page_x;
        self.page_y = page_y;
        self
    }

    pub fn with_ghost_offset(mut self, x: f64, y: f64) -> Self {
        self.ghost_offset = Some((x, y));
        self
    }
}

/// Ephemeral state of the one drag in progress.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub item: NodeId,
    pub origin: NodeId,
    pub placeholder: NodeId,
    pub old_index: usize,
    pub ghost_offset: (f64, f64),
    pub ghost_attached: bool,
    pub item_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No listener handled the event, or it did not apply in this state.
    Ignored,
    Started { item: NodeId, origin: NodeId },
    /// The placeholder now sits in `container`.
    Moved { container: NodeId },
    /// Hover or drop over a container that does not accept the item.
    Rejected { container: NodeId },
    Dropped(SortUpdate),
    Cancelled { item: NodeId },
}

impl Sortable {
    /// Route one host event. The event bubbles from its target to the root;
    /// the first element with a matching listener handles it.
    pub fn dispatch(
        &mut self,
        doc: &mut Document,
        event: DomEvent,
        transfer: Option<&mut dyn DataTransfer>,
    ) -> Result<Transition, SortableError> {
        if event.kind == EventKind::DragEnd {
            // The session owns drag-end; it must fire even if the origin
            // was reconfigured mid-drag.
            return Ok(self.cancel(doc));
        }

        let handler = doc
            .path_to_root(event.target)
            .into_iter()
            .find(|node| self.registry.listens(*node, event.kind));
        let Some(handler) = handler else {
            return Ok(Transition::Ignored);
        };

        match event.kind {
            EventKind::DragStart => self.start(doc, handler, &event, transfer),
            EventKind::MouseDown => match self.owning_item(doc, handler) {
                Some(item) => self.start(doc, item, &event, transfer),
                None => Ok(Transition::Ignored),
            },
            EventKind::DragOver | EventKind::DragEnter => self.hover(doc, handler, &event),
            EventKind::Drop => self.drop_on(doc, handler),
            EventKind::DragEnd => Ok(self.cancel(doc)),
        }
    }

    /// End the current drag without reordering. The dragged item never left
    /// its slot, so restoring it only means unhiding it.
    pub fn cancel(&mut self, doc: &mut Document) -> Transition {
        let Some(session) = self.session.take() else {
            return Transition::Ignored;
        };
        mutator::detach(doc, session.placeholder);
        unmark_dragged(doc, session.item);
        self.events.push_back(SortEvent::Stop {
            container: session.origin,
            item: session.item,
        });
        debug!(item = ?session.item, origin = ?session.origin, "drag cancelled");
        Transition::Cancelled { item: session.item }
    }

    fn start(
        &mut self,
        doc: &mut Document,
        item: NodeId,
        event: &DomEvent,
        transfer: Option<&mut dyn DataTransfer>,
    ) -> Result<Transition, SortableError> {
        if self.session.is_some() {
            debug!(?item, "drag start while another drag is active; ignored");
            return Ok(Transition::Ignored);
        }
        let Some(origin) = doc.parent(item) else {
            return Ok(Transition::Ignored);
        };
        if !self.registry.is_enabled(origin) {
            return Ok(Transition::Ignored);
        }
        let items = self.registry.items(doc, origin);
        let Some(old_index) = items.iter().position(|candidate| *candidate == item) else {
            return Ok(Transition::Ignored);
        };
        if !initiated_from_draggable(doc, event.target, item) {
            return Ok(Transition::Ignored);
        }
        let Some(entry) = self.registry.entry(origin) else {
            return Ok(Transition::Ignored);
        };
        let placeholder_kind = entry.options.placeholder.clone();
        let force_size = entry.options.force_placeholder_size;

        let rect = doc.rect(item);
        let ghost_offset = event
            .ghost_offset
            .unwrap_or((event.page_x - rect.x, event.page_y - rect.y));
        let ghost_attached = ghost::attach(transfer, item, ghost_offset);

        let placeholder = mutator::make_placeholder(doc, item, &placeholder_kind);
        if force_size {
            size_placeholder(doc, placeholder, rect.height);
        }
        mutator::insert_after(doc, item, placeholder)?;

        doc.add_class(item, DRAGGING_CLASS);
        doc.set_attr(item, "aria-grabbed", "true");
        doc.set_attr(item, "hidden", "");

        self.session = Some(DragSession {
            item,
            origin,
            placeholder,
            old_index,
            ghost_offset,
            ghost_attached,
            item_height: rect.height,
        });
        self.events.push_back(SortEvent::Start {
            container: origin,
            item,
            index: old_index,
        });
        debug!(?item, ?origin, old_index, ghost_attached, "drag started");
        Ok(Transition::Started { item, origin })
    }

    fn hover(
        &mut self,
        doc: &mut Document,
        handler: NodeId,
        event: &DomEvent,
    ) -> Result<Transition, SortableError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(Transition::Ignored);
        };
        let Some((container, over_item)) = self.resolve_target(doc, handler) else {
            return Ok(Transition::Ignored);
        };
        if !self
            .registry
            .accepts_drop(doc, session.origin, container, session.item)
        {
            return Ok(Transition::Rejected { container });
        }

        let placeholder = session.placeholder;
        let dragged = session.item;
        let item_height = session.item_height;
        let force_size = self
            .registry
            .entry(container)
            .is_some_and(|entry| entry.options.force_placeholder_size);

        match over_item {
            Some(item) if item == dragged => return Ok(Transition::Ignored),
            Some(item) => {
                // Exactly on the midpoint counts as the lower half.
                if event.page_y < doc.rect(item).mid_y() {
                    mutator::insert_before(doc, item, placeholder)?;
                } else {
                    mutator::insert_after(doc, item, placeholder)?;
                }
            }
            None => {
                let has_items = self
                    .registry
                    .items(doc, container)
                    .iter()
                    .any(|candidate| *candidate != dragged);
                if has_items || doc.parent(placeholder) == Some(container) {
                    return Ok(Transition::Ignored);
                }
                mutator::append(doc, container, placeholder)?;
            }
        }

        if force_size {
            size_placeholder(doc, placeholder, item_height);
        }
        debug!(?container, index = doc.index_in_parent(placeholder), "placeholder moved");
        Ok(Transition::Moved { container })
    }

    fn drop_on(&mut self, doc: &mut Document, handler: NodeId) -> Result<Transition, SortableError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(Transition::Ignored);
        };
        let Some((container, _)) = self.resolve_target(doc, handler) else {
            return Ok(Transition::Ignored);
        };
        if !self
            .registry
            .accepts_drop(doc, session.origin, container, session.item)
        {
            debug!(?container, "drop rejected by container");
            return Ok(Transition::Rejected { container });
        }
        let Some(destination) = doc.parent(session.placeholder) else {
            warn!("placeholder detached at drop; cancelling drag");
            return Ok(self.cancel(doc));
        };
        // Eligible items ahead of the placeholder, not counting the dragged one.
        let slot = doc.index_in_parent(session.placeholder);
        let new_index = self
            .registry
            .items(doc, destination)
            .into_iter()
            .filter(|candidate| *candidate != session.item && doc.index_in_parent(*candidate) < slot)
            .count();

        let Some(session) = self.session.take() else {
            return Ok(Transition::Ignored);
        };
        doc.insert_before(destination, session.item, Some(session.placeholder))?;
        mutator::detach(doc, session.placeholder);
        unmark_dragged(doc, session.item);
        self.registry
            .adopt(doc, session.item, session.origin, destination);

        let update = SortUpdate {
            item: session.item,
            origin: session.origin,
            destination,
            old_index: session.old_index,
            new_index,
        };
        if update.changed() {
            self.events.push_back(SortEvent::Update(update));
        }
        self.events.push_back(SortEvent::Stop {
            container: session.origin,
            item: session.item,
        });
        debug!(
            item = ?update.item,
            origin = ?update.origin,
            destination = ?update.destination,
            update.old_index,
            update.new_index,
            "drop completed"
        );
        Ok(Transition::Dropped(update))
    }

    /// Map a listening element to `(container, hovered item)`.
    fn resolve_target(&self, doc: &Document, handler: NodeId) -> Option<(NodeId, Option<NodeId>)> {
        match self.registry.binding(handler)?.role {
            BindingRole::Container => Some((handler, None)),
            BindingRole::Item => {
                let container = doc.parent(handler)?;
                self.registry
                    .is_configured(container)
                    .then_some((container, Some(handler)))
            }
            BindingRole::Handle => None,
        }
    }

    /// The configured item a handle belongs to.
    fn owning_item(&self, doc: &Document, handle: NodeId) -> Option<NodeId> {
        doc.path_to_root(handle).into_iter().find(|node| {
            doc.parent(*node)
                .is_some_and(|parent| self.registry.items(doc, parent).contains(node))
        })
    }
}

/// A drag may only begin on an element marked `draggable="true"` between
/// the event target and the item.
fn initiated_from_draggable(doc: &Document, target: NodeId, item: NodeId) -> bool {
    if !doc.contains(item, target) {
        return false;
    }
    doc.path_to_root(target)
        .into_iter()
        .take_while(|node| *node != item)
        .chain(std::iter::once(item))
        .any(|node| doc.attr(node, "draggable") == Some("true"))
}

fn unmark_dragged(doc: &mut Document, item: NodeId) {
    doc.remove_class(item, DRAGGING_CLASS);
    doc.remove_attr(item, "hidden");
    if doc.has_attr(item, "aria-grabbed") {
        doc.set_attr(item, "aria-grabbed", "false");
    }
}

fn size_placeholder(doc: &mut Document, placeholder: NodeId, height: f64) {
    let mut rect = doc.rect(placeholder);
    rect.height = height;
    doc.set_rect(placeholder, rect);
    doc.set_attr(placeholder, "style", format!("height: {height}px"));
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
