//! Side-table of configured containers and the listeners bound on their
//! elements. Nothing is stored on the elements themselves apart from the
//! accessibility and `draggable` attributes a browser would need.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::{
    dom::{Document, NodeId},
    mutator::is_placeholder,
    options::{ItemFilter, SortableOptions},
    selector::Selector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    DragStart,
    DragEnter,
    DragOver,
    Drop,
    DragEnd,
    /// Only bound when the legacy drag-drop shim is active.
    MouseDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingRole {
    Container,
    Item,
    Handle,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub owner: NodeId,
    pub role: BindingRole,
    pub listeners: BTreeSet<EventKind>,
}

#[derive(Debug, Clone)]
pub struct ContainerEntry {
    pub options: SortableOptions,
    pub disabled: bool,
}

const CONTAINER_EVENTS: [EventKind; 3] = [EventKind::DragOver, EventKind::DragEnter, EventKind::Drop];
const ITEM_EVENTS: [EventKind; 5] = [
    EventKind::DragStart,
    EventKind::DragEnd,
    EventKind::DragOver,
    EventKind::DragEnter,
    EventKind::Drop,
];

#[derive(Debug, Default)]
pub struct Registry {
    containers: HashMap<NodeId, ContainerEntry>,
    bindings: HashMap<NodeId, Binding>,
}

impl Registry {
    pub fn entry(&self, container: NodeId) -> Option<&ContainerEntry> {
        self.containers.get(&container)
    }

    pub fn is_configured(&self, container: NodeId) -> bool {
        self.containers.contains_key(&container)
    }

    pub fn is_enabled(&self, container: NodeId) -> bool {
        self.entry(container).is_some_and(|entry| !entry.disabled)
    }

    pub fn binding(&self, node: NodeId) -> Option<&Binding> {
        self.bindings.get(&node)
    }

    pub fn listens(&self, node: NodeId, kind: EventKind) -> bool {
        self.bindings
            .get(&node)
            .is_some_and(|binding| binding.listeners.contains(&kind))
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Eligible items of a configured container, in document order.
    pub fn items(&self, doc: &Document, container: NodeId) -> Vec<NodeId> {
        match self.entry(container) {
            Some(entry) => eligible_items(doc, container, &entry.options.items),
            None => Vec::new(),
        }
    }

    /// Two containers accept each other's items when they are the same
    /// element or share a connection key.
    pub fn connected(&self, origin: NodeId, destination: NodeId) -> bool {
        if origin == destination {
            return true;
        }
        match (self.entry(origin), self.entry(destination)) {
            (Some(a), Some(b)) => {
                a.options.connect_with.is_some() && a.options.connect_with == b.options.connect_with
            }
            _ => false,
        }
    }

    /// `destination` takes `item` when it is enabled, connected to `origin`
    /// and its item filter would count `item` as one of its own.
    pub fn accepts_drop(
        &self,
        doc: &Document,
        origin: NodeId,
        destination: NodeId,
        item: NodeId,
    ) -> bool {
        self.is_enabled(destination)
            && self.connected(origin, destination)
            && self
                .entry(destination)
                .is_some_and(|entry| entry.options.items.accepts(doc, item))
    }

    /// Attach behavior to `container`. Reconfiguring replaces the options
    /// and rebinds from scratch.
    pub fn configure(
        &mut self,
        doc: &mut Document,
        container: NodeId,
        options: SortableOptions,
        legacy_shim: bool,
    ) {
        if self.containers.contains_key(&container) {
            self.unbind_owned(container);
        }
        self.containers.insert(
            container,
            ContainerEntry {
                options,
                disabled: false,
            },
        );
        self.bind(container, container, BindingRole::Container, &CONTAINER_EVENTS);
        doc.set_attr(container, "aria-dropeffect", "move");
        self.attach_items(doc, container, legacy_shim);
        debug!(?container, "sortable configured");
    }

    pub fn enable(&mut self, doc: &mut Document, container: NodeId, legacy_shim: bool) -> bool {
        let Some(entry) = self.containers.get_mut(&container) else {
            return false;
        };
        entry.disabled = false;
        let options = entry.options.clone();

        doc.set_attr(container, "aria-dropeffect", "move");
        let items = eligible_items(doc, container, &options.items);
        let handles = handles_of(doc, &items, options.handle.as_ref());
        for handle in &handles {
            doc.set_attr(*handle, "draggable", "true");
        }
        if legacy_shim && !options.disable_legacy_shim {
            for handle in handles {
                self.bind(handle, container, BindingRole::Handle, &[EventKind::MouseDown]);
            }
        }
        true
    }

    pub fn disable(&mut self, doc: &mut Document, container: NodeId) -> bool {
        let Some(entry) = self.containers.get_mut(&container) else {
            return false;
        };
        entry.disabled = true;
        let options = entry.options.clone();

        doc.set_attr(container, "aria-dropeffect", "none");
        let items = eligible_items(doc, container, &options.items);
        for handle in handles_of(doc, &items, options.handle.as_ref()) {
            doc.set_attr(handle, "draggable", "false");
        }
        self.unbind_kind(container, EventKind::MouseDown);
        true
    }

    /// Re-derive the item set and rebind item-level listeners, keeping the
    /// container's options and enabled state.
    pub fn reload(&mut self, doc: &mut Document, container: NodeId, legacy_shim: bool) -> bool {
        if !self.containers.contains_key(&container) {
            return false;
        }
        self.bindings
            .retain(|node, binding| binding.owner != container || *node == container);
        self.attach_items(doc, container, legacy_shim);
        true
    }

    /// Remove every listener and attribute this container added. Safe to
    /// call repeatedly.
    pub fn destroy(&mut self, doc: &mut Document, container: NodeId) -> bool {
        let Some(entry) = self.containers.remove(&container) else {
            return false;
        };
        let items = eligible_items(doc, container, &entry.options.items);
        let mut touched: BTreeSet<NodeId> =
            handles_of(doc, &items, entry.options.handle.as_ref()).into_iter().collect();
        touched.extend(items);
        touched.extend(
            self.bindings
                .iter()
                .filter(|(_, binding)| binding.owner == container)
                .map(|(node, _)| *node),
        );
        self.unbind_owned(container);

        doc.remove_attr(container, "aria-dropeffect");
        touched.remove(&container);
        for node in touched {
            doc.remove_attr(node, "aria-grabbed");
            doc.remove_attr(node, "draggable");
            doc.remove_attr(node, "role");
        }
        debug!(?container, "sortable destroyed");
        true
    }

    /// Hand the bindings of `item` (and anything inside it) that `from`
    /// owns over to `to`, after the item moved between containers.
    pub fn adopt(&mut self, doc: &Document, item: NodeId, from: NodeId, to: NodeId) {
        if from == to {
            return;
        }
        for (node, binding) in self.bindings.iter_mut() {
            if binding.owner == from && doc.contains(item, *node) {
                binding.owner = to;
            }
        }
    }

    fn attach_items(&mut self, doc: &mut Document, container: NodeId, legacy_shim: bool) {
        let Some(entry) = self.containers.get(&container) else {
            return;
        };
        let enabled = !entry.disabled;
        let options = entry.options.clone();

        let items = eligible_items(doc, container, &options.items);
        let handles = handles_of(doc, &items, options.handle.as_ref());
        for item in &items {
            doc.set_attr(*item, "role", "option");
            doc.set_attr(*item, "aria-grabbed", "false");
            self.bind(*item, container, BindingRole::Item, &ITEM_EVENTS);
        }
        let shim = enabled && legacy_shim && !options.disable_legacy_shim;
        for handle in handles {
            doc.set_attr(handle, "draggable", if enabled { "true" } else { "false" });
            if shim {
                self.bind(handle, container, BindingRole::Handle, &[EventKind::MouseDown]);
            }
        }
    }

    fn bind(&mut self, node: NodeId, owner: NodeId, role: BindingRole, kinds: &[EventKind]) {
        let binding = self.bindings.entry(node).or_insert_with(|| Binding {
            owner,
            role,
            listeners: BTreeSet::new(),
        });
        binding.owner = owner;
        if !(binding.role == BindingRole::Item && role == BindingRole::Handle) {
            binding.role = role;
        }
        binding.listeners.extend(kinds.iter().copied());
    }

    fn unbind_kind(&mut self, owner: NodeId, kind: EventKind) {
        self.bindings.retain(|_, binding| {
            if binding.owner == owner {
                binding.listeners.remove(&kind);
            }
            !binding.listeners.is_empty()
        });
    }

    fn unbind_owned(&mut self, owner: NodeId) {
        self.bindings.retain(|_, binding| binding.owner != owner);
    }
}

/// Direct children accepted by `filter`, skipping placeholders.
pub fn eligible_items(doc: &Document, container: NodeId, filter: &ItemFilter) -> Vec<NodeId> {
    doc.children(container)
        .iter()
        .copied()
        .filter(|child| !is_placeholder(doc, *child) && filter.accepts(doc, *child))
        .collect()
}

/// Drag-initiation elements: the items themselves, or the descendants of
/// each item matching `handle`.
pub fn handles_of(doc: &Document, items: &[NodeId], handle: Option<&Selector>) -> Vec<NodeId> {
    match handle {
        None => items.to_vec(),
        Some(selector) => items
            .iter()
            .flat_map(|item| doc.query_all(*item, selector))
            .collect(),
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
