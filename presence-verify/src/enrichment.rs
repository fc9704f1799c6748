//! Best-effort enrichment tasks
//!
//! Non-essential data (reverse-geocoded address, public IP) is fetched by
//! detached tasks that never gate a workflow transition. Each task belongs
//! to one session: closing the session cancels it, and a result that
//! arrives after its receiver is gone is dropped.

use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Value recorded when the public IP cannot be determined
pub const UNKNOWN_IP: &str = "unknown";

const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a value being produced in the background
#[derive(Debug)]
pub struct Enrichment<T> {
    rx: Option<oneshot::Receiver<T>>,
    value: Option<T>,
}

impl<T: Send + 'static> Enrichment<T> {
    /// Run `task` on the runtime; cancelled together with `cancel`
    pub fn spawn<F>(cancel: CancellationToken, task: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Enrichment task cancelled");
                }
                value = task => {
                    // Receiver gone means the session ended; nothing to do
                    let _ = tx.send(value);
                }
            }
        });
        Self {
            rx: Some(rx),
            value: None,
        }
    }

    /// Value if it has arrived, without waiting
    pub fn peek(&mut self) -> Option<&T> {
        if self.value.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match rx.try_recv() {
                    Ok(value) => {
                        self.value = Some(value);
                        self.rx = None;
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    Err(oneshot::error::TryRecvError::Closed) => self.rx = None,
                }
            }
        }
        self.value.as_ref()
    }

    /// Wait at most `grace` for the value, then give up
    pub async fn settle(mut self, grace: Duration) -> Option<T> {
        if self.peek().is_some() {
            return self.value;
        }
        let rx = self.rx.take()?;
        match tokio::time::timeout(grace, rx).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => None,
            Err(_) => {
                debug!(?grace, "Enrichment not ready within grace period");
                None
            }
        }
    }
}

/// Public IP address lookup
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn public_ip(&self) -> Result<String, IpLookupError>;
}

#[derive(Debug, Error)]
pub enum IpLookupError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Lookup service returned an empty address")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct IpResponse {
    ip: String,
}

/// Queries a JSON endpoint returning `{"ip": "..."}`
pub struct HttpIpLookup {
    http_client: reqwest::Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Result<Self, IpLookupError> {
        let http_client = reqwest::Client::builder()
            .timeout(IP_LOOKUP_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn public_ip(&self) -> Result<String, IpLookupError> {
        let response: IpResponse = self
            .http_client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ip = response.ip.trim().to_string();
        if ip.is_empty() {
            return Err(IpLookupError::Empty);
        }
        Ok(ip)
    }
}

/// Lookup that swallows failures into [`UNKNOWN_IP`]
pub(crate) async fn lookup_or_unknown(lookup: &dyn IpLookup) -> String {
    match lookup.public_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            warn!("IP lookup failed, recording as unknown: {}", e);
            UNKNOWN_IP.to_string()
        }
    }
}
