//! Arena-backed element tree the engine mutates.
//!
//! Elements are addressed by [`NodeId`], which stays stable for the life of
//! the [`Document`]. Moving an element never changes its id, so any state
//! keyed on it (listeners, host bindings) follows it around.

use std::collections::BTreeMap;

use crate::{error::DomError, selector::Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Layout box in page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn mid_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Rect,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        }
    }
}

/// An element tree. Ids are only meaningful for the document that issued
/// them.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Element>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Element::new("body")],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element::new(tag));
        NodeId(self.nodes.len() - 1)
    }

    pub fn tag(&self, node: NodeId) -> &str {
        &self.el(node).tag
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.el(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.el(node).children
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.el(node).parent.is_some()
    }

    /// Position among the parent's children, `0` for a detached node.
    pub fn index_in_parent(&self, node: NodeId) -> usize {
        self.parent(node)
            .and_then(|parent| self.children(parent).iter().position(|c| *c == node))
            .unwrap_or(0)
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let idx = siblings.iter().position(|c| *c == node)?;
        siblings.get(idx + 1).copied()
    }

    /// `node` itself followed by each ancestor up to the root.
    pub fn path_to_root(&self, node: NodeId) -> Vec<NodeId> {
        let mut path = vec![node];
        let mut cursor = self.parent(node);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.parent(current);
        }
        path
    }

    /// True when `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.path_to_root(node).contains(&ancestor)
    }

    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, node, None)
    }

    /// Insert `node` under `parent` ahead of `reference` (or last when
    /// `reference` is `None`). A node that already has a parent is moved.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if self.contains(node, parent) {
            return Err(DomError::Hierarchy { parent, node });
        }
        if let Some(reference) = reference {
            if reference == node {
                return Ok(());
            }
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild { parent, reference });
            }
        }

        self.detach(node);
        let slot = match reference {
            Some(reference) => self
                .children(parent)
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(self.children(parent).len()),
            None => self.children(parent).len(),
        };
        self.el_mut(parent).children.insert(slot, node);
        self.el_mut(node).parent = Some(parent);
        Ok(())
    }

    /// Remove `node` from its parent. No-op when already detached.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.el_mut(node).parent.take() else {
            return;
        };
        self.el_mut(parent).children.retain(|c| *c != node);
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.el(node).attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.el(node).attrs.contains_key(name)
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        self.el_mut(node).attrs.insert(name.to_string(), value.into());
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.el_mut(node).attrs.remove(name)
    }

    pub fn attrs(&self, node: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.el(node)
            .attrs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|list| list.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let joined = match self.attr(node, "class") {
            Some(list) if !list.trim().is_empty() => format!("{} {class}", list.trim()),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", joined);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(list) = self.attr(node, "class") else {
            return;
        };
        let remaining: Vec<&str> = list.split_whitespace().filter(|c| *c != class).collect();
        if remaining.is_empty() {
            self.remove_attr(node, "class");
        } else {
            let joined = remaining.join(" ");
            self.set_attr(node, "class", joined);
        }
    }

    pub fn rect(&self, node: NodeId) -> Rect {
        self.el(node).rect
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        self.el_mut(node).rect = rect;
    }

    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        selector.matches(self, node)
    }

    /// Descendants of `root` (excluding `root`) matching `selector`, in
    /// document order.
    pub fn query_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            if selector.matches(self, node) {
                found.push(node);
            }
            stack.extend(self.children(node).iter().rev().copied());
        }
        found
    }

    fn el(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    fn el_mut(&mut self, node: NodeId) -> &mut Element {
        &mut self.nodes[node.0]
    }
}

#[cfg(test)]
#[path = "tests/dom_tests.rs"]
mod tests;
