use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{BlogId, BlogStatus, CommentId, PortfolioId, SkillId, TechnologyId, TopicId},
};

/// One slot of a persisted ordering: the item id and its zero-based position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub id: i64,
    pub position: i64,
}

/// Body of a reorder submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRequest {
    pub order: OrderPayload,
}

impl SortRequest {
    pub fn new(entries: Vec<OrderEntry>) -> Self {
        Self {
            order: OrderPayload::List(entries),
        }
    }
}

/// A batch either as a plain array, or keyed by index strings the way
/// form-encoded list params arrive (`{"0": {...}, "1": {...}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderPayload {
    List(Vec<OrderEntry>),
    Indexed(BTreeMap<String, OrderEntry>),
}

impl OrderPayload {
    pub fn into_entries(self) -> Vec<OrderEntry> {
        match self {
            OrderPayload::List(entries) => entries,
            OrderPayload::Indexed(map) => map.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortResponse {
    pub applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioItem {
    pub id: PortfolioId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_image: Option<String>,
    pub position: i64,
    #[serde(default)]
    pub technologies: Vec<Technology>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub id: TechnologyId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioForm {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub body: String,
    #[serde(default)]
    pub main_image: Option<String>,
    #[serde(default)]
    pub thumb_image: Option<String>,
    #[serde(default, alias = "technologies_attributes")]
    pub technologies: Vec<TechnologyForm>,
}

/// Nested technology edit. No id adds one, an id renames it, and an id
/// with `_destroy` removes it. Entries with a blank name are skipped
/// unless they remove.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyForm {
    #[serde(default)]
    pub id: Option<TechnologyId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "_destroy")]
    pub destroy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub id: TopicId,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicForm {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: BlogId,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub status: BlogStatus,
    pub topic_id: TopicId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogForm {
    pub title: String,
    pub body: String,
    pub topic_id: TopicId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub blog_id: BlogId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentForm {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSummary {
    pub id: SkillId,
    pub title: String,
    pub percent_utilized: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillForm {
    pub title: String,
    pub percent_utilized: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    PortfolioCreated { item: PortfolioItem },
    PortfolioUpdated { item: PortfolioItem },
    PortfolioDeleted { id: PortfolioId },
    OrderApplied { order: Vec<OrderEntry> },
    BlogStatusChanged { blog_id: BlogId, status: BlogStatus },
}
