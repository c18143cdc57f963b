use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::{
    error::ApiException,
    protocol::{OrderEntry, SortRequest, TopicForm},
};
use storage::Storage;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/portfolio.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the demo topics, posts, skills and portfolio items.
    Seed,
    ListPortfolios {
        #[arg(long)]
        angular: bool,
    },
    /// Reorder every portfolio item; ids are given in their new order.
    Sort {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    CreateTopic {
        title: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let report = storage.seed_demo_content().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ListPortfolios { angular } => {
            let items = if angular {
                storage.list_angular_portfolios().await?
            } else {
                storage.list_portfolios_by_position().await?
            };
            for item in items {
                println!(
                    "{:>4} {:>4}  {}  [{}]",
                    item.position,
                    item.id.0,
                    item.title,
                    item.subtitle.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Sort { ids } => {
            let entries = ids
                .iter()
                .enumerate()
                .map(|(position, id)| OrderEntry {
                    id: *id,
                    position: position as i64,
                })
                .collect();
            server_api::apply_order(&storage, SortRequest::new(entries))
                .await
                .map_err(ApiException::from)?;
            println!("applied order for {} items", ids.len());
        }
        Command::CreateTopic { title } => {
            let ctx = server_api::ApiContext { storage };
            let topic = server_api::create_topic(&ctx, TopicForm { title })
                .await
                .map_err(ApiException::from)?;
            println!("created topic_id={}", topic.id.0);
        }
    }

    Ok(())
}
