use std::collections::HashSet;

use shared::{
    domain::{BlogId, CommentId, PortfolioId},
    error::{ApiError, ErrorCode},
    protocol::{
        BlogForm, BlogPost, Comment, CommentForm, OrderEntry, PortfolioForm, PortfolioItem,
        ServerEvent, SkillForm, SkillSummary, SortRequest, TopicForm, TopicSummary,
    },
};
use storage::{OrderOutcome, OrderStore, Storage};
use thiserror::Error;
use tracing::debug;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// Why a reorder batch was refused before touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderViolation {
    #[error("order batch is empty")]
    Empty,
    #[error("item {0} appears more than once")]
    DuplicateId(i64),
    #[error("positions must be exactly 0..{len}; found {position}")]
    PositionOutOfRange { position: i64, len: usize },
    #[error("position {0} is assigned more than once")]
    DuplicatePosition(i64),
}

impl From<OrderViolation> for ApiError {
    fn from(value: OrderViolation) -> Self {
        ApiError::validation(value.to_string())
    }
}

/// A batch is acceptable when it is non-empty, names each id once and uses
/// every position in `0..len` exactly once.
pub fn validate_order(entries: &[OrderEntry]) -> Result<(), OrderViolation> {
    if entries.is_empty() {
        return Err(OrderViolation::Empty);
    }
    let len = entries.len();
    let mut ids = HashSet::with_capacity(len);
    let mut positions = HashSet::with_capacity(len);
    for entry in entries {
        if !ids.insert(entry.id) {
            return Err(OrderViolation::DuplicateId(entry.id));
        }
        let in_range = usize::try_from(entry.position).is_ok_and(|position| position < len);
        if !in_range {
            return Err(OrderViolation::PositionOutOfRange {
                position: entry.position,
                len,
            });
        }
        if !positions.insert(entry.position) {
            return Err(OrderViolation::DuplicatePosition(entry.position));
        }
    }
    Ok(())
}

/// Validate and persist a whole batch; the returned event carries the
/// committed order sorted by position.
pub async fn apply_order<S>(store: &S, request: SortRequest) -> Result<ServerEvent, ApiError>
where
    S: OrderStore + ?Sized,
{
    let mut entries = request.order.into_entries();
    validate_order(&entries)?;
    entries.sort_by_key(|entry| entry.position);

    match store.apply_order(&entries).await.map_err(internal)? {
        OrderOutcome::Applied(count) => {
            debug!(count, "reorder batch committed");
            Ok(ServerEvent::OrderApplied { order: entries })
        }
        OrderOutcome::UnknownIds(ids) => {
            let ids: Vec<String> = ids.iter().map(|id| id.0.to_string()).collect();
            Err(ApiError::not_found(format!(
                "unknown portfolio ids: {}",
                ids.join(", ")
            )))
        }
        OrderOutcome::Incomplete { expected, received } => Err(ApiError::validation(format!(
            "order batch names {received} of {expected} portfolio items"
        ))),
    }
}

pub async fn sort_portfolios(ctx: &ApiContext, request: SortRequest) -> Result<ServerEvent, ApiError> {
    apply_order(&ctx.storage, request).await
}

pub async fn list_portfolios(ctx: &ApiContext) -> Result<Vec<PortfolioItem>, ApiError> {
    ctx.storage
        .list_portfolios_by_position()
        .await
        .map_err(internal)
}

pub async fn list_angular_portfolios(ctx: &ApiContext) -> Result<Vec<PortfolioItem>, ApiError> {
    ctx.storage.list_angular_portfolios().await.map_err(internal)
}

pub async fn get_portfolio(ctx: &ApiContext, id: PortfolioId) -> Result<PortfolioItem, ApiError> {
    ctx.storage
        .get_portfolio(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("portfolio item not found"))
}

pub async fn create_portfolio(ctx: &ApiContext, form: PortfolioForm) -> Result<ServerEvent, ApiError> {
    validate_portfolio_form(&form)?;
    if form.technologies.iter().any(|edit| edit.id.is_some()) {
        return Err(ApiError::validation(
            "a new portfolio item cannot reference existing technologies",
        ));
    }
    let item = ctx.storage.create_portfolio(&form).await.map_err(internal)?;
    debug!(id = item.id.0, position = item.position, "portfolio created");
    Ok(ServerEvent::PortfolioCreated { item })
}

pub async fn update_portfolio(
    ctx: &ApiContext,
    id: PortfolioId,
    form: PortfolioForm,
) -> Result<ServerEvent, ApiError> {
    validate_portfolio_form(&form)?;
    let current = get_portfolio(ctx, id).await?;
    if let Some(unknown) = form
        .technologies
        .iter()
        .filter_map(|edit| edit.id)
        .find(|tech| !current.technologies.iter().any(|known| known.id == *tech))
    {
        return Err(ApiError::not_found(format!(
            "technology {} not found on portfolio item {}",
            unknown.0, id.0
        )));
    }
    let item = ctx
        .storage
        .update_portfolio(id, &form)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("portfolio item not found"))?;
    Ok(ServerEvent::PortfolioUpdated { item })
}

pub async fn delete_portfolio(ctx: &ApiContext, id: PortfolioId) -> Result<ServerEvent, ApiError> {
    if !ctx.storage.delete_portfolio(id).await.map_err(internal)? {
        return Err(ApiError::not_found("portfolio item not found"));
    }
    Ok(ServerEvent::PortfolioDeleted { id })
}

pub async fn list_topics(ctx: &ApiContext) -> Result<Vec<TopicSummary>, ApiError> {
    ctx.storage.list_topics().await.map_err(internal)
}

pub async fn create_topic(ctx: &ApiContext, form: TopicForm) -> Result<TopicSummary, ApiError> {
    require("title", &form.title)?;
    ctx.storage
        .create_topic(form.title.trim())
        .await
        .map_err(internal)
}

pub async fn list_blogs(ctx: &ApiContext) -> Result<Vec<BlogPost>, ApiError> {
    ctx.storage.list_blogs().await.map_err(internal)
}

/// Look a post up by slug, or by numeric id when no slug matches.
pub async fn get_blog(ctx: &ApiContext, key: &str) -> Result<BlogPost, ApiError> {
    if let Some(blog) = ctx.storage.blog_by_slug(key).await.map_err(internal)? {
        return Ok(blog);
    }
    let Ok(id) = key.parse::<i64>() else {
        return Err(ApiError::not_found("blog not found"));
    };
    ctx.storage
        .blog_by_id(BlogId(id))
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("blog not found"))
}

pub async fn create_blog(ctx: &ApiContext, form: BlogForm) -> Result<BlogPost, ApiError> {
    require("title", &form.title)?;
    require("body", &form.body)?;
    if !ctx
        .storage
        .topic_exists(form.topic_id)
        .await
        .map_err(internal)?
    {
        return Err(ApiError::not_found("topic not found"));
    }
    ctx.storage.create_blog(&form).await.map_err(internal)
}

pub async fn toggle_blog_status(ctx: &ApiContext, id: BlogId) -> Result<ServerEvent, ApiError> {
    let blog = ctx
        .storage
        .toggle_blog_status(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("blog not found"))?;
    Ok(ServerEvent::BlogStatusChanged {
        blog_id: blog.id,
        status: blog.status,
    })
}

pub async fn delete_blog(ctx: &ApiContext, id: BlogId) -> Result<(), ApiError> {
    if !ctx.storage.delete_blog(id).await.map_err(internal)? {
        return Err(ApiError::not_found("blog not found"));
    }
    Ok(())
}

pub async fn list_comments(ctx: &ApiContext, blog_id: BlogId) -> Result<Vec<Comment>, ApiError> {
    require_blog(ctx, blog_id).await?;
    ctx.storage.list_comments(blog_id).await.map_err(internal)
}

pub async fn create_comment(
    ctx: &ApiContext,
    blog_id: BlogId,
    form: CommentForm,
) -> Result<Comment, ApiError> {
    require("content", &form.content)?;
    require_blog(ctx, blog_id).await?;
    ctx.storage
        .create_comment(blog_id, form.content.trim())
        .await
        .map_err(internal)
}

pub async fn delete_comment(ctx: &ApiContext, id: CommentId) -> Result<(), ApiError> {
    if !ctx.storage.delete_comment(id).await.map_err(internal)? {
        return Err(ApiError::not_found("comment not found"));
    }
    Ok(())
}

async fn require_blog(ctx: &ApiContext, id: BlogId) -> Result<(), ApiError> {
    match ctx.storage.blog_by_id(id).await.map_err(internal)? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("blog not found")),
    }
}

pub async fn list_skills(ctx: &ApiContext) -> Result<Vec<SkillSummary>, ApiError> {
    ctx.storage.list_skills().await.map_err(internal)
}

pub async fn create_skill(ctx: &ApiContext, form: SkillForm) -> Result<SkillSummary, ApiError> {
    require("title", &form.title)?;
    if !(0..=100).contains(&form.percent_utilized) {
        return Err(ApiError::validation(
            "percent_utilized must be between 0 and 100",
        ));
    }
    ctx.storage.create_skill(&form).await.map_err(internal)
}

fn validate_portfolio_form(form: &PortfolioForm) -> Result<(), ApiError> {
    require("title", &form.title)?;
    require("body", &form.body)
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} must not be blank"),
        ));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shared::{
        domain::{TechnologyId, TopicId},
        protocol::{OrderPayload, TechnologyForm},
    };
    use std::collections::BTreeMap;

    async fn setup() -> (ApiContext, Vec<PortfolioId>) {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let ctx = ApiContext { storage };
        let mut ids = Vec::new();
        for title in ["a", "b", "c"] {
            let event = create_portfolio(
                &ctx,
                PortfolioForm {
                    title: title.to_string(),
                    body: "body".to_string(),
                    ..PortfolioForm::default()
                },
            )
            .await
            .expect("create");
            let ServerEvent::PortfolioCreated { item } = event else {
                panic!("unexpected event");
            };
            ids.push(item.id);
        }
        (ctx, ids)
    }

    fn entries(pairs: &[(i64, i64)]) -> Vec<OrderEntry> {
        pairs
            .iter()
            .map(|(id, position)| OrderEntry {
                id: *id,
                position: *position,
            })
            .collect()
    }

    /// Store that fails the test if a batch ever reaches it.
    struct UnreachableStore;

    #[async_trait]
    impl OrderStore for UnreachableStore {
        async fn apply_order(&self, _entries: &[OrderEntry]) -> anyhow::Result<OrderOutcome> {
            panic!("invalid batch reached storage");
        }

        async fn current_order(&self) -> anyhow::Result<Vec<OrderEntry>> {
            Ok(Vec::new())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl OrderStore for BrokenStore {
        async fn apply_order(&self, _entries: &[OrderEntry]) -> anyhow::Result<OrderOutcome> {
            Err(anyhow::anyhow!("disk I/O error"))
        }

        async fn current_order(&self) -> anyhow::Result<Vec<OrderEntry>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn validate_order_requires_a_permutation_of_positions() {
        assert_eq!(validate_order(&[]), Err(OrderViolation::Empty));
        assert_eq!(
            validate_order(&entries(&[(1, 0), (1, 1)])),
            Err(OrderViolation::DuplicateId(1))
        );
        assert_eq!(
            validate_order(&entries(&[(1, 0), (2, 2)])),
            Err(OrderViolation::PositionOutOfRange { position: 2, len: 2 })
        );
        assert_eq!(
            validate_order(&entries(&[(1, -1)])),
            Err(OrderViolation::PositionOutOfRange { position: -1, len: 1 })
        );
        assert_eq!(
            validate_order(&entries(&[(1, 1), (2, 1)])),
            Err(OrderViolation::DuplicatePosition(1))
        );
        assert_eq!(validate_order(&entries(&[(9, 1), (4, 0)])), Ok(()));
    }

    #[tokio::test]
    async fn invalid_batches_never_reach_storage() {
        let err = apply_order(&UnreachableStore, SortRequest::new(entries(&[(1, 0), (2, 0)])))
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[tokio::test]
    async fn storage_failure_maps_to_internal() {
        let err = apply_order(&BrokenStore, SortRequest::new(entries(&[(1, 0)])))
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Internal);
        assert!(err.message.contains("disk I/O error"));
    }

    #[tokio::test]
    async fn sort_accepts_index_keyed_batches() {
        let (ctx, ids) = setup().await;
        let mut order = BTreeMap::new();
        for (key, (id, position)) in [(ids[2], 0), (ids[0], 1), (ids[1], 2)].iter().enumerate() {
            order.insert(
                key.to_string(),
                OrderEntry {
                    id: id.0,
                    position: *position,
                },
            );
        }

        let event = sort_portfolios(
            &ctx,
            SortRequest {
                order: OrderPayload::Indexed(order),
            },
        )
        .await
        .expect("sort");

        let ServerEvent::OrderApplied { order } = event else {
            panic!("unexpected event");
        };
        assert_eq!(
            order.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![ids[2].0, ids[0].0, ids[1].0]
        );
        let listed = list_portfolios(&ctx).await.expect("list");
        assert_eq!(
            listed.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![ids[2], ids[0], ids[1]]
        );
    }

    #[tokio::test]
    async fn sort_with_unknown_id_is_not_found_and_writes_nothing() {
        let (ctx, ids) = setup().await;
        let err = sort_portfolios(
            &ctx,
            SortRequest::new(entries(&[(ids[1].0, 0), (ids[0].0, 1), (4242, 2)])),
        )
        .await
        .expect_err("should fail");

        assert_eq!(err.code, ErrorCode::NotFound);
        let listed = list_portfolios(&ctx).await.expect("list");
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn blank_portfolio_title_is_rejected() {
        let (ctx, ids) = setup().await;
        let err = update_portfolio(
            &ctx,
            ids[0],
            PortfolioForm {
                title: "   ".to_string(),
                body: "body".to_string(),
                ..PortfolioForm::default()
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);

        let err = delete_portfolio(&ctx, PortfolioId(999))
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn blogs_resolve_by_slug_or_id_and_toggle() {
        let (ctx, _) = setup().await;
        let topic = create_topic(
            &ctx,
            TopicForm {
                title: "Rust".to_string(),
            },
        )
        .await
        .expect("topic");
        let blog = create_blog(
            &ctx,
            BlogForm {
                title: "First Post".to_string(),
                body: "hello".to_string(),
                topic_id: topic.id,
            },
        )
        .await
        .expect("blog");

        assert_eq!(get_blog(&ctx, "first-post").await.expect("slug").id, blog.id);
        assert_eq!(
            get_blog(&ctx, &blog.id.0.to_string()).await.expect("id").id,
            blog.id
        );
        assert_eq!(
            get_blog(&ctx, "missing").await.expect_err("missing").code,
            ErrorCode::NotFound
        );

        let event = toggle_blog_status(&ctx, blog.id).await.expect("toggle");
        assert!(matches!(
            event,
            ServerEvent::BlogStatusChanged {
                status: shared::domain::BlogStatus::Published,
                ..
            }
        ));

        delete_blog(&ctx, blog.id).await.expect("delete");
        assert_eq!(
            delete_blog(&ctx, blog.id).await.expect_err("gone").code,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn blog_requires_existing_topic() {
        let (ctx, _) = setup().await;
        let err = create_blog(
            &ctx,
            BlogForm {
                title: "Lost".to_string(),
                body: "text".to_string(),
                topic_id: TopicId(77),
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn technology_edits_must_belong_to_the_item() {
        let (ctx, ids) = setup().await;
        let form = |technologies: Vec<TechnologyForm>| PortfolioForm {
            title: "site".to_string(),
            body: "body".to_string(),
            technologies,
            ..PortfolioForm::default()
        };
        let add = |name: &str| TechnologyForm {
            name: name.to_string(),
            ..TechnologyForm::default()
        };

        let err = create_portfolio(
            &ctx,
            form(vec![TechnologyForm {
                id: Some(TechnologyId(1)),
                ..add("Rust")
            }]),
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);

        let event = update_portfolio(&ctx, ids[0], form(vec![add("Rust"), add("Axum")]))
            .await
            .expect("update");
        let ServerEvent::PortfolioUpdated { item } = event else {
            panic!("unexpected event");
        };
        assert_eq!(item.technologies.len(), 2);

        let foreign = TechnologyForm {
            id: Some(item.technologies[0].id),
            destroy: true,
            ..TechnologyForm::default()
        };
        let err = update_portfolio(&ctx, ids[1], form(vec![foreign.clone()]))
            .await
            .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::NotFound);

        let event = update_portfolio(&ctx, ids[0], form(vec![foreign]))
            .await
            .expect("remove");
        let ServerEvent::PortfolioUpdated { item } = event else {
            panic!("unexpected event");
        };
        let names: Vec<&str> = item.technologies.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Axum"]);
    }

    #[tokio::test]
    async fn comments_need_content_and_an_existing_blog() {
        let (ctx, _) = setup().await;
        let topic = create_topic(
            &ctx,
            TopicForm {
                title: "Rust".to_string(),
            },
        )
        .await
        .expect("topic");
        let blog = create_blog(
            &ctx,
            BlogForm {
                title: "Notes".to_string(),
                body: "hello".to_string(),
                topic_id: topic.id,
            },
        )
        .await
        .expect("blog");
        let say = |content: &str| CommentForm {
            content: content.to_string(),
        };

        assert_eq!(
            create_comment(&ctx, blog.id, say("  ")).await.expect_err("blank").code,
            ErrorCode::Validation
        );
        assert_eq!(
            create_comment(&ctx, BlogId(999), say("hi")).await.expect_err("no blog").code,
            ErrorCode::NotFound
        );
        assert_eq!(
            list_comments(&ctx, BlogId(999)).await.expect_err("no blog").code,
            ErrorCode::NotFound
        );

        let comment = create_comment(&ctx, blog.id, say(" nice post "))
            .await
            .expect("comment");
        assert_eq!(comment.content, "nice post");
        assert_eq!(list_comments(&ctx, blog.id).await.expect("list"), vec![comment.clone()]);

        delete_comment(&ctx, comment.id).await.expect("delete");
        assert_eq!(
            delete_comment(&ctx, comment.id).await.expect_err("gone").code,
            ErrorCode::NotFound
        );
        assert!(list_comments(&ctx, blog.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn skill_percent_must_be_a_percentage() {
        let (ctx, _) = setup().await;
        let err = create_skill(
            &ctx,
            SkillForm {
                title: "Rails".to_string(),
                percent_utilized: 101,
            },
        )
        .await
        .expect_err("should fail");
        assert_eq!(err.code, ErrorCode::Validation);

        let skill = create_skill(
            &ctx,
            SkillForm {
                title: "Rails".to_string(),
                percent_utilized: 100,
            },
        )
        .await
        .expect("skill");
        assert_eq!(list_skills(&ctx).await.expect("skills"), vec![skill]);
    }
}
