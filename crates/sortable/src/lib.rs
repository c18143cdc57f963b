//! Headless drag-and-drop list reordering.
//!
//! A [`Sortable`] owns the registry of configured containers and the single
//! active drag session. The host feeds it [`DomEvent`]s, it mutates the
//! [`Document`] and reports what happened as a [`Transition`], queuing
//! [`SortEvent`] notifications for the host to drain.

pub mod dom;
pub mod drag;
pub mod error;
pub mod events;
pub mod ghost;
pub mod mutator;
pub mod options;
pub mod order;
pub mod registry;
pub mod selector;

use std::collections::VecDeque;

use tracing::debug;

pub use dom::{Document, NodeId, Rect};
pub use drag::{DomEvent, DragSession, Transition};
pub use error::{DomError, SelectorError, SortableError};
pub use events::{SortEvent, SortUpdate};
pub use ghost::{DataTransfer, TransferError};
pub use options::{ItemFilter, Placeholder, SortableOptions};
pub use registry::EventKind;
pub use selector::Selector;

use registry::Registry;

/// What the host environment can do beyond standard drag and drop.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilities {
    /// The host exposes an element-level `dragDrop()` call that must be
    /// triggered from `mousedown` for custom drag images to work.
    pub legacy_drag_drop: bool,
}

/// Containers to configure: explicit elements, or a selector resolved
/// against the whole document.
#[derive(Debug, Clone)]
pub enum Targets {
    Elements(Vec<NodeId>),
    Selector(String),
}

impl From<NodeId> for Targets {
    fn from(node: NodeId) -> Self {
        Targets::Elements(vec![node])
    }
}

impl From<Vec<NodeId>> for Targets {
    fn from(nodes: Vec<NodeId>) -> Self {
        Targets::Elements(nodes)
    }
}

impl From<&[NodeId]> for Targets {
    fn from(nodes: &[NodeId]) -> Self {
        Targets::Elements(nodes.to_vec())
    }
}

impl From<&str> for Targets {
    fn from(selector: &str) -> Self {
        Targets::Selector(selector.to_string())
    }
}

#[derive(Debug, Default)]
pub struct Sortable {
    registry: Registry,
    session: Option<DragSession>,
    events: VecDeque<SortEvent>,
    capabilities: HostCapabilities,
}

impl Sortable {
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Configure every target container with `options`. Returns the
    /// containers that were configured.
    pub fn init(
        &mut self,
        doc: &mut Document,
        targets: impl Into<Targets>,
        options: SortableOptions,
    ) -> Result<Vec<NodeId>, SortableError> {
        let containers = match targets.into() {
            Targets::Elements(nodes) => nodes,
            Targets::Selector(source) => {
                let selector = Selector::parse(&source)?;
                doc.query_all(doc.root(), &selector)
            }
        };
        for container in &containers {
            self.registry.configure(
                doc,
                *container,
                options.clone(),
                self.capabilities.legacy_drag_drop,
            );
        }
        debug!(count = containers.len(), "sortable init");
        Ok(containers)
    }

    pub fn enable(&mut self, doc: &mut Document, container: NodeId) {
        if !self
            .registry
            .enable(doc, container, self.capabilities.legacy_drag_drop)
        {
            debug!(?container, "enable on unconfigured container ignored");
        }
    }

    pub fn disable(&mut self, doc: &mut Document, container: NodeId) {
        if !self.registry.disable(doc, container) {
            debug!(?container, "disable on unconfigured container ignored");
        }
    }

    pub fn reload(&mut self, doc: &mut Document, container: NodeId) {
        if !self
            .registry
            .reload(doc, container, self.capabilities.legacy_drag_drop)
        {
            debug!(?container, "reload on unconfigured container ignored");
        }
    }

    /// Tear down `container`. A drag that started in it, or whose
    /// placeholder currently sits in it, is cancelled first.
    pub fn destroy(&mut self, doc: &mut Document, container: NodeId) {
        let involved = self.session.as_ref().is_some_and(|session| {
            session.origin == container || doc.parent(session.placeholder) == Some(container)
        });
        if involved {
            self.cancel(doc);
        }
        if !self.registry.destroy(doc, container) {
            debug!(?container, "destroy on unconfigured container ignored");
        }
    }

    pub fn is_configured(&self, container: NodeId) -> bool {
        self.registry.is_configured(container)
    }

    pub fn is_enabled(&self, container: NodeId) -> bool {
        self.registry.is_enabled(container)
    }

    pub fn options(&self, container: NodeId) -> Option<&SortableOptions> {
        self.registry.entry(container).map(|entry| &entry.options)
    }

    /// Whether any listener is bound for `kind` on `node`.
    pub fn listens(&self, node: NodeId, kind: EventKind) -> bool {
        self.registry.listens(node, kind)
    }

    pub fn items(&self, doc: &Document, container: NodeId) -> Vec<NodeId> {
        self.registry.items(doc, container)
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.session.is_some()
    }

    pub fn drain_events(&mut self) -> Vec<SortEvent> {
        self.events.drain(..).collect()
    }

    /// Current order of `container` as `(id, position)` pairs. Unconfigured
    /// containers are read with default options.
    pub fn serialize_order(
        &self,
        doc: &Document,
        container: NodeId,
    ) -> Result<Vec<shared::protocol::OrderEntry>, SortableError> {
        match self.registry.entry(container) {
            Some(entry) => order::serialize(doc, container, &entry.options),
            None => order::serialize(doc, container, &SortableOptions::default()),
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
