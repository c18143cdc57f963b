use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(PortfolioId);
id_newtype!(BlogId);
id_newtype!(TopicId);
id_newtype!(SkillId);
id_newtype!(TechnologyId);
id_newtype!(CommentId);

/// Publication state of a blog post. Stored as an integer column
/// (`draft = 0`, `published = 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlogStatus {
    Draft,
    Published,
}

impl BlogStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            BlogStatus::Draft => 0,
            BlogStatus::Published => 1,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        match raw {
            1 => BlogStatus::Published,
            _ => BlogStatus::Draft,
        }
    }
}

/// Subtitle that marks a portfolio item as part of the Angular showcase.
pub const ANGULAR_SUBTITLE: &str = "Angular";

/// Lowercase, collapse every run of non-alphanumeric characters into a single
/// `-`, and trim dashes from both ends.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
