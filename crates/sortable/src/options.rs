use std::{fmt, sync::Arc};

use crate::{
    dom::{Document, NodeId},
    error::SelectorError,
    selector::Selector,
};

pub const DEFAULT_ID_ATTRIBUTE: &str = "data-id";

/// Which children of a container may be dragged.
#[derive(Debug, Clone, Default)]
pub enum ItemFilter {
    /// Every direct child.
    #[default]
    All,
    Selector(Selector),
    /// Only these elements, when they are direct children.
    Elements(Vec<NodeId>),
}

impl ItemFilter {
    pub fn selector(source: &str) -> Result<Self, SelectorError> {
        Ok(Self::Selector(Selector::parse(source)?))
    }

    pub fn accepts(&self, doc: &Document, node: NodeId) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Selector(selector) => selector.matches(doc, node),
            ItemFilter::Elements(list) => list.contains(&node),
        }
    }
}

pub type PlaceholderFactory = Arc<dyn Fn(&mut Document, &str) -> NodeId + Send + Sync>;

/// How the drop-position marker is built. The factory receives the
/// dragged item's tag name.
#[derive(Clone, Default)]
pub enum Placeholder {
    #[default]
    Default,
    /// A single start tag, e.g. `<li class="slot">`.
    Markup(String),
    Factory(PlaceholderFactory),
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Default => f.write_str("Default"),
            Placeholder::Markup(markup) => f.debug_tuple("Markup").field(markup).finish(),
            Placeholder::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortableOptions {
    pub items: ItemFilter,
    pub handle: Option<Selector>,
    pub connect_with: Option<String>,
    pub disable_legacy_shim: bool,
    pub placeholder: Placeholder,
    pub force_placeholder_size: bool,
    pub id_attribute: String,
}

impl Default for SortableOptions {
    fn default() -> Self {
        Self {
            items: ItemFilter::All,
            handle: None,
            connect_with: None,
            disable_legacy_shim: false,
            placeholder: Placeholder::Default,
            force_placeholder_size: false,
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
        }
    }
}

impl SortableOptions {
    pub fn items(mut self, items: ItemFilter) -> Self {
        self.items = items;
        self
    }

    pub fn handle(mut self, handle: Selector) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn connect_with(mut self, key: impl Into<String>) -> Self {
        self.connect_with = Some(key.into());
        self
    }

    pub fn disable_legacy_shim(mut self, disabled: bool) -> Self {
        self.disable_legacy_shim = disabled;
        self
    }

    pub fn placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn force_placeholder_size(mut self, force: bool) -> Self {
        self.force_placeholder_size = force;
        self
    }

    pub fn id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = attribute.into();
        self
    }
}
