use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info};

use shared::{
    domain::{
        slugify, BlogId, BlogStatus, CommentId, PortfolioId, SkillId, TechnologyId, TopicId,
        ANGULAR_SUBTITLE,
    },
    protocol::{
        BlogForm, BlogPost, Comment, OrderEntry, PortfolioForm, PortfolioItem, SkillForm,
        SkillSummary, Technology, TechnologyForm, TopicSummary,
    },
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Result of applying a reorder batch. Anything other than `Applied` means
/// the transaction was rolled back and no position changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Applied(usize),
    UnknownIds(Vec<PortfolioId>),
    /// The batch did not cover every portfolio item.
    Incomplete { expected: usize, received: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub topics: usize,
    pub blogs: usize,
    pub skills: usize,
    pub portfolios: usize,
    pub technologies: usize,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn apply_order(&self, entries: &[OrderEntry]) -> Result<OrderOutcome>;
    async fn current_order(&self) -> Result<Vec<OrderEntry>>;
}

const PORTFOLIO_COLUMNS: &str =
    "id, title, subtitle, body, main_image, thumb_image, position, created_at";
const BLOG_COLUMNS: &str = "id, title, slug, body, status, topic_id, created_at";
const COMMENT_COLUMNS: &str = "id, blog_id, content, created_at";

const SEED_BODY: &str = "Sed ut perspiciatis unde omnis iste natus error sit voluptatem \
accusantium doloremque laudantium, totam rem aperiam, eaque ipsa quae ab illo inventore \
veritatis et quasi architecto beatae vitae dicta sunt explicabo.";
const SEED_MAIN_IMAGE: &str = "http://via.placeholder.com/600x400";
const SEED_THUMB_IMAGE: &str = "http://via.placeholder.com/350x200";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_portfolio(&self, form: &PortfolioForm) -> Result<PortfolioItem> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO portfolios (title, subtitle, body, main_image, thumb_image, position)
             VALUES (?, ?, ?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM portfolios))
             RETURNING {PORTFOLIO_COLUMNS}"
        ))
        .bind(&form.title)
        .bind(form.subtitle.as_deref())
        .bind(&form.body)
        .bind(form.main_image.as_deref())
        .bind(form.thumb_image.as_deref())
        .fetch_one(&mut *tx)
        .await?;
        let mut item = portfolio_from_row(&row);
        write_technologies(&mut tx, item.id, &form.technologies).await?;
        item.technologies = technologies_of(&mut tx, item.id).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn get_portfolio(&self, id: PortfolioId) -> Result<Option<PortfolioItem>> {
        let row = sqlx::query(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut item = portfolio_from_row(&row);
        let mut conn = self.pool.acquire().await?;
        item.technologies = technologies_of(&mut conn, id).await?;
        Ok(Some(item))
    }

    pub async fn update_portfolio(
        &self,
        id: PortfolioId,
        form: &PortfolioForm,
    ) -> Result<Option<PortfolioItem>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "UPDATE portfolios
             SET title = ?, subtitle = ?, body = ?, main_image = ?, thumb_image = ?
             WHERE id = ?
             RETURNING {PORTFOLIO_COLUMNS}"
        ))
        .bind(&form.title)
        .bind(form.subtitle.as_deref())
        .bind(&form.body)
        .bind(form.main_image.as_deref())
        .bind(form.thumb_image.as_deref())
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let mut item = portfolio_from_row(&row);
        write_technologies(&mut tx, id, &form.technologies).await?;
        item.technologies = technologies_of(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(item))
    }

    pub async fn delete_portfolio(&self, id: PortfolioId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM technologies WHERE portfolio_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM portfolios WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let remaining: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM portfolios ORDER BY position ASC, id ASC")
                .fetch_all(&mut *tx)
                .await?;
        for (position, remaining_id) in remaining.iter().enumerate() {
            sqlx::query("UPDATE portfolios SET position = ? WHERE id = ?")
                .bind(position as i64)
                .bind(remaining_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(id = id.0, remaining = remaining.len(), "portfolio deleted");
        Ok(true)
    }

    pub async fn list_portfolios_by_position(&self) -> Result<Vec<PortfolioItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios ORDER BY position ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        self.with_technologies(rows.iter().map(portfolio_from_row).collect())
            .await
    }

    pub async fn list_portfolios_by_subtitle(&self, subtitle: &str) -> Result<Vec<PortfolioItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {PORTFOLIO_COLUMNS} FROM portfolios
             WHERE subtitle = ?
             ORDER BY position ASC, id ASC"
        ))
        .bind(subtitle)
        .fetch_all(&self.pool)
        .await?;
        self.with_technologies(rows.iter().map(portfolio_from_row).collect())
            .await
    }

    pub async fn list_angular_portfolios(&self) -> Result<Vec<PortfolioItem>> {
        self.list_portfolios_by_subtitle(ANGULAR_SUBTITLE).await
    }

    async fn with_technologies(&self, mut items: Vec<PortfolioItem>) -> Result<Vec<PortfolioItem>> {
        let rows = sqlx::query("SELECT id, portfolio_id, name FROM technologies ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut by_portfolio: HashMap<i64, Vec<Technology>> = HashMap::new();
        for r in rows {
            by_portfolio
                .entry(r.get::<i64, _>("portfolio_id"))
                .or_default()
                .push(technology_from_row(&r));
        }
        for item in &mut items {
            item.technologies = by_portfolio.remove(&item.id.0).unwrap_or_default();
        }
        Ok(items)
    }

    /// Write every `(id, position)` pair in one transaction. The batch must
    /// name every portfolio item; callers validate that positions form
    /// `0..n` before getting here.
    pub async fn apply_portfolio_order(&self, entries: &[OrderEntry]) -> Result<OrderOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut unknown = Vec::new();
        for entry in entries {
            let affected = sqlx::query("UPDATE portfolios SET position = ? WHERE id = ?")
                .bind(entry.position)
                .bind(entry.id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to reposition portfolio {}", entry.id))?
                .rows_affected();
            if affected == 0 {
                unknown.push(PortfolioId(entry.id));
            }
        }
        if !unknown.is_empty() {
            tx.rollback().await?;
            return Ok(OrderOutcome::UnknownIds(unknown));
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM portfolios")
            .fetch_one(&mut *tx)
            .await?;
        let expected = usize::try_from(total).unwrap_or_default();
        if expected != entries.len() {
            tx.rollback().await?;
            return Ok(OrderOutcome::Incomplete {
                expected,
                received: entries.len(),
            });
        }

        tx.commit().await?;
        info!(count = entries.len(), "portfolio order applied");
        Ok(OrderOutcome::Applied(entries.len()))
    }

    pub async fn create_topic(&self, title: &str) -> Result<TopicSummary> {
        let row = sqlx::query("INSERT INTO topics (title) VALUES (?) RETURNING id, title")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(TopicSummary {
            id: TopicId(row.get::<i64, _>(0)),
            title: row.get::<String, _>(1),
        })
    }

    pub async fn list_topics(&self) -> Result<Vec<TopicSummary>> {
        let rows = sqlx::query("SELECT id, title FROM topics ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| TopicSummary {
                id: TopicId(r.get::<i64, _>(0)),
                title: r.get::<String, _>(1),
            })
            .collect())
    }

    pub async fn topic_exists(&self, id: TopicId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM topics WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Insert a draft post. The slug comes from the title and gets a numeric
    /// suffix when it is already taken.
    pub async fn create_blog(&self, form: &BlogForm) -> Result<BlogPost> {
        let base = match slugify(&form.title) {
            slug if slug.is_empty() => "post".to_string(),
            slug => slug,
        };

        let mut tx = self.pool.begin().await?;
        let taken: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM blogs WHERE slug = ? OR slug LIKE ?")
                .bind(&base)
                .bind(format!("{base}-%"))
                .fetch_all(&mut *tx)
                .await?;
        let slug = unique_slug(&base, &taken);

        let row = sqlx::query(&format!(
            "INSERT INTO blogs (title, slug, body, status, topic_id)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(&form.title)
        .bind(&slug)
        .bind(&form.body)
        .bind(BlogStatus::Draft.as_i64())
        .bind(form.topic_id.0)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert blog '{slug}'"))?;
        tx.commit().await?;
        Ok(blog_from_row(&row))
    }

    pub async fn list_blogs(&self) -> Result<Vec<BlogPost>> {
        let rows = sqlx::query(&format!("SELECT {BLOG_COLUMNS} FROM blogs ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(blog_from_row).collect())
    }

    pub async fn blog_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let row = sqlx::query(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(blog_from_row))
    }

    pub async fn blog_by_id(&self, id: BlogId) -> Result<Option<BlogPost>> {
        let row = sqlx::query(&format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(blog_from_row))
    }

    pub async fn toggle_blog_status(&self, id: BlogId) -> Result<Option<BlogPost>> {
        let row = sqlx::query(&format!(
            "UPDATE blogs SET status = CASE status WHEN 0 THEN 1 ELSE 0 END
             WHERE id = ?
             RETURNING {BLOG_COLUMNS}"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(blog_from_row))
    }

    pub async fn delete_blog(&self, id: BlogId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let comments = sqlx::query("DELETE FROM comments WHERE blog_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM blogs WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        debug!(id = id.0, comments, "blog deleted");
        Ok(true)
    }

    pub async fn create_comment(&self, blog_id: BlogId, content: &str) -> Result<Comment> {
        let row = sqlx::query(&format!(
            "INSERT INTO comments (blog_id, content) VALUES (?, ?) RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(blog_id.0)
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to add comment to blog {}", blog_id.0))?;
        Ok(comment_from_row(&row))
    }

    pub async fn list_comments(&self, blog_id: BlogId) -> Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE blog_id = ? ORDER BY id ASC"
        ))
        .bind(blog_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn delete_comment(&self, id: CommentId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn create_skill(&self, form: &SkillForm) -> Result<SkillSummary> {
        let row = sqlx::query(
            "INSERT INTO skills (title, percent_utilized) VALUES (?, ?)
             RETURNING id, title, percent_utilized",
        )
        .bind(&form.title)
        .bind(form.percent_utilized)
        .fetch_one(&self.pool)
        .await?;
        Ok(skill_from_row(&row))
    }

    pub async fn list_skills(&self) -> Result<Vec<SkillSummary>> {
        let rows = sqlx::query("SELECT id, title, percent_utilized FROM skills ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    pub async fn seed_demo_content(&self) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        let mut last_topic = None;
        for n in 0..3 {
            last_topic = Some(self.create_topic(&format!("Topic {n}")).await?);
            report.topics += 1;
        }
        let topic = last_topic.context("no topic created")?;

        for n in 0..10 {
            self.create_blog(&BlogForm {
                title: format!("My Blog Title {n}"),
                body: SEED_BODY.to_string(),
                topic_id: topic.id,
            })
            .await?;
            report.blogs += 1;
        }

        for n in 0..5 {
            self.create_skill(&SkillForm {
                title: format!("Rails {n}"),
                percent_utilized: 15,
            })
            .await?;
            report.skills += 1;
        }

        let subtitles = std::iter::repeat("Ruby on Rails")
            .take(8)
            .chain(std::iter::once(ANGULAR_SUBTITLE));
        let mut last_portfolio = None;
        for (n, subtitle) in subtitles.enumerate() {
            last_portfolio = Some(
                self.create_portfolio(&PortfolioForm {
                    title: format!("Portfolio title: {n}"),
                    subtitle: Some(subtitle.to_string()),
                    body: SEED_BODY.to_string(),
                    main_image: Some(SEED_MAIN_IMAGE.to_string()),
                    thumb_image: Some(SEED_THUMB_IMAGE.to_string()),
                    technologies: Vec::new(),
                })
                .await?,
            );
            report.portfolios += 1;
        }

        let portfolio = last_portfolio.context("no portfolio created")?;
        let technologies: Vec<TechnologyForm> = (0..3)
            .map(|n| TechnologyForm {
                name: format!("Technology {n}"),
                ..TechnologyForm::default()
            })
            .collect();
        let mut tx = self.pool.begin().await?;
        write_technologies(&mut tx, portfolio.id, &technologies).await?;
        tx.commit().await?;
        report.technologies += technologies.len();

        info!(?report, "demo content seeded");
        Ok(report)
    }
}

#[async_trait]
impl OrderStore for Storage {
    async fn apply_order(&self, entries: &[OrderEntry]) -> Result<OrderOutcome> {
        self.apply_portfolio_order(entries).await
    }

    async fn current_order(&self) -> Result<Vec<OrderEntry>> {
        let rows = sqlx::query("SELECT id, position FROM portfolios ORDER BY position ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| OrderEntry {
                id: r.get::<i64, _>(0),
                position: r.get::<i64, _>(1),
            })
            .collect())
    }
}

fn portfolio_from_row(r: &SqliteRow) -> PortfolioItem {
    PortfolioItem {
        id: PortfolioId(r.get::<i64, _>("id")),
        title: r.get::<String, _>("title"),
        subtitle: r.get::<Option<String>, _>("subtitle"),
        body: r.get::<String, _>("body"),
        main_image: r.get::<Option<String>, _>("main_image"),
        thumb_image: r.get::<Option<String>, _>("thumb_image"),
        position: r.get::<i64, _>("position"),
        technologies: Vec::new(),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

/// Apply nested technology edits for one portfolio item. Ids that belong to
/// another item match no row and are left alone.
async fn write_technologies(
    conn: &mut SqliteConnection,
    portfolio: PortfolioId,
    edits: &[TechnologyForm],
) -> Result<()> {
    for edit in edits {
        let name = edit.name.trim();
        match edit.id {
            Some(id) if edit.destroy => {
                sqlx::query("DELETE FROM technologies WHERE id = ? AND portfolio_id = ?")
                    .bind(id.0)
                    .bind(portfolio.0)
                    .execute(&mut *conn)
                    .await?;
            }
            _ if edit.destroy || name.is_empty() => {}
            Some(id) => {
                sqlx::query("UPDATE technologies SET name = ? WHERE id = ? AND portfolio_id = ?")
                    .bind(name)
                    .bind(id.0)
                    .bind(portfolio.0)
                    .execute(&mut *conn)
                    .await?;
            }
            None => {
                sqlx::query("INSERT INTO technologies (portfolio_id, name) VALUES (?, ?)")
                    .bind(portfolio.0)
                    .bind(name)
                    .execute(&mut *conn)
                    .await?;
            }
        }
    }
    Ok(())
}

async fn technologies_of(
    conn: &mut SqliteConnection,
    portfolio: PortfolioId,
) -> Result<Vec<Technology>> {
    let rows = sqlx::query(
        "SELECT id, portfolio_id, name FROM technologies WHERE portfolio_id = ? ORDER BY id ASC",
    )
    .bind(portfolio.0)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.iter().map(technology_from_row).collect())
}

fn technology_from_row(r: &SqliteRow) -> Technology {
    Technology {
        id: TechnologyId(r.get::<i64, _>("id")),
        name: r.get::<String, _>("name"),
    }
}

fn comment_from_row(r: &SqliteRow) -> Comment {
    Comment {
        id: CommentId(r.get::<i64, _>("id")),
        blog_id: BlogId(r.get::<i64, _>("blog_id")),
        content: r.get::<String, _>("content"),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn blog_from_row(r: &SqliteRow) -> BlogPost {
    BlogPost {
        id: BlogId(r.get::<i64, _>("id")),
        title: r.get::<String, _>("title"),
        slug: r.get::<String, _>("slug"),
        body: r.get::<String, _>("body"),
        status: BlogStatus::from_i64(r.get::<i64, _>("status")),
        topic_id: TopicId(r.get::<i64, _>("topic_id")),
        created_at: r.get::<DateTime<Utc>, _>("created_at"),
    }
}

fn skill_from_row(r: &SqliteRow) -> SkillSummary {
    SkillSummary {
        id: SkillId(r.get::<i64, _>(0)),
        title: r.get::<String, _>(1),
        percent_utilized: r.get::<i64, _>(2),
    }
}

/// `base` if free, otherwise the first `base-N` (N >= 2) not in `taken`.
fn unique_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|slug| slug == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
