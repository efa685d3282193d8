//! Contracts of the layers the lifecycle talks to without owning them, and the
//! implementations wired in by default.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{error::ServiceError, state::StoreSlot};

/// Work still running for a festival.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveWork {
    /// Number of running matches.
    pub count: usize,
    /// Display names of the running matches.
    pub names: Vec<String>,
}

/// Reports how many matches of a festival are still running.
pub trait ActiveWorkQuery: Send + Sync {
    /// Running matches of the festival.
    fn count_active(&self, festival_id: Uuid) -> BoxFuture<'static, Result<ActiveWork, ServiceError>>;
}

/// Counts active match records through the installed store.
pub struct StoreActiveWork {
    store: StoreSlot,
}

impl StoreActiveWork {
    /// Query through whatever store is installed.
    pub fn new(store: StoreSlot) -> Self {
        Self { store }
    }
}

impl ActiveWorkQuery for StoreActiveWork {
    fn count_active(&self, festival_id: Uuid) -> BoxFuture<'static, Result<ActiveWork, ServiceError>> {
        let slot = self.store.clone();
        async move {
            let store = slot.read().await.clone().ok_or(ServiceError::Degraded)?;
            let matches = store.list_active_matches(festival_id).await?;
            Ok(ActiveWork {
                count: matches.len(),
                names: matches.into_iter().map(|record| record.label).collect(),
            })
        }
        .boxed()
    }
}

/// Failure to deliver a notice. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed")]
    /// The request could not be sent.
    Request(#[source] reqwest::Error),
    #[error("webhook answered with status {0}")]
    /// The endpoint answered with a non-success status.
    Status(reqwest::StatusCode),
}

/// Delivers plain-text notices to a channel reference.
pub trait Notifier: Send + Sync {
    /// Post `message` to `target`.
    fn announce(&self, target: &str, message: String) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Notifier used when no webhook is configured: notices only reach the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn announce(&self, target: &str, message: String) -> BoxFuture<'static, Result<(), NotifyError>> {
        info!(target_channel = target, %message, "festival notice");
        futures::future::ready(Ok(())).boxed()
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    content: &'a str,
}

/// Posts notices as JSON to an HTTP endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Arc<str>,
}

impl WebhookNotifier {
    /// Notifier posting to `url`; each request is abandoned after `request_timeout`.
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(NotifyError::Request)?;
        Ok(Self {
            client,
            url: Arc::from(url),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn announce(&self, target: &str, message: String) -> BoxFuture<'static, Result<(), NotifyError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        let channel = target.to_owned();
        async move {
            let response = client
                .post(url.as_ref())
                .json(&WebhookPayload {
                    channel: &channel,
                    content: &message,
                })
                .send()
                .await
                .map_err(NotifyError::Request)?;

            let status = response.status();
            if !status.is_success() {
                return Err(NotifyError::Status(status));
            }
            Ok(())
        }
        .boxed()
    }
}

/// Switch deciding whether new matches may start for a festival.
pub trait AdmissionGate: Send + Sync {
    /// Allow or stop new matches.
    fn set_admission(&self, festival_id: Uuid, enabled: bool);
    /// `None` when the festival never had its admission set.
    fn is_admitting(&self, festival_id: Uuid) -> Option<bool>;
    /// Forget the festival once it is gone.
    fn release(&self, festival_id: Uuid);
}

/// In-process admission switches read by the matchmaking layer.
#[derive(Debug, Default)]
pub struct AdmissionRegistry {
    switches: DashMap<Uuid, bool>,
}

impl AdmissionGate for AdmissionRegistry {
    fn set_admission(&self, festival_id: Uuid, enabled: bool) {
        self.switches.insert(festival_id, enabled);
    }

    fn is_admitting(&self, festival_id: Uuid) -> Option<bool> {
        self.switches.get(&festival_id).map(|enabled| *enabled)
    }

    fn release(&self, festival_id: Uuid) {
        self.switches.remove(&festival_id);
    }
}
