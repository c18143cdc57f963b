//! Client side of order persistence: an HTTP client for the reorder
//! endpoint, the websocket change feed, and [`ReorderController`], which
//! drives the sortable engine and saves the resulting order.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{OrderEntry, PortfolioItem, ServerEvent, SortRequest, SortResponse},
};
use sortable::SortableError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

mod controller;

pub use controller::{Handled, ReorderController};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server rejected request ({status}): {}", .error.message)]
    Rejected { status: StatusCode, error: ApiError },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid server url '{0}'")]
    InvalidUrl(String),
    #[error("could not read order from document: {0}")]
    Order(#[from] SortableError),
}

impl ClientError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Rejected { error, .. } => Some(error.code),
            _ => None,
        }
    }
}

#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, entries: Vec<OrderEntry>) -> Result<SortResponse, ClientError>;
}

#[derive(Debug, Clone)]
pub struct OrderClient {
    http: Client,
    server_url: String,
}

impl OrderClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub async fn submit(&self, entries: Vec<OrderEntry>) -> Result<SortResponse, ClientError> {
        let count = entries.len();
        let response = self
            .http
            .post(format!("{}/portfolios/sort", self.server_url))
            .json(&SortRequest::new(entries))
            .send()
            .await?;
        let applied: SortResponse = decode(response).await?;
        info!(count, applied = applied.applied, "order saved");
        Ok(applied)
    }

    pub async fn list_portfolios(&self) -> Result<Vec<PortfolioItem>, ClientError> {
        let response = self
            .http
            .get(format!("{}/portfolios", self.server_url))
            .send()
            .await?;
        decode(response).await
    }

    /// Open the server's websocket feed. Events arrive on the returned
    /// channel until the connection closes.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<ServerEvent>, ClientError> {
        let ws_url = websocket_url(&self.server_url)?;
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (_, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(error) => warn!(%error, "dropping undecodable server event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "websocket feed closed with error");
                        break;
                    }
                }
            }
            debug!("websocket feed ended");
        });

        Ok(rx)
    }
}

#[async_trait]
impl OrderSink for OrderClient {
    async fn submit(&self, entries: Vec<OrderEntry>) -> Result<SortResponse, ClientError> {
        OrderClient::submit(self, entries).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let error = response.json::<ApiError>().await.unwrap_or_else(|_| {
        ApiError::new(ErrorCode::Internal, format!("unexpected status {status}"))
    });
    Err(ClientError::Rejected { status, error })
}

fn websocket_url(server_url: &str) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(server_url).map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        _ => return Err(ClientError::InvalidUrl(server_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(server_url.to_string()))?;
    url.set_path("/ws");
    Ok(url)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
