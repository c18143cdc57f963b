use thiserror::Error;

use crate::dom::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("selector is empty")]
    Empty,
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated attribute test starting at offset {offset}")]
    UnterminatedAttribute { offset: usize },
    #[error("combinators are not supported (offset {offset})")]
    Combinator { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("node {0:?} has no parent")]
    Detached(NodeId),
    #[error("node {reference:?} is not a child of {parent:?}")]
    NotAChild { parent: NodeId, reference: NodeId },
    #[error("inserting {node:?} under {parent:?} would create a cycle")]
    Hierarchy { parent: NodeId, node: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortableError {
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error("item {node:?} has no `{attribute}` attribute")]
    MissingItemId { node: NodeId, attribute: String },
    #[error("item {node:?} has non-numeric `{attribute}` value {value:?}")]
    InvalidItemId {
        node: NodeId,
        attribute: String,
        value: String,
    },
}
