//! Watched collections and how to fetch them

use crate::error::ClientError;
use async_trait::async_trait;
use deskwire_core::{Fingerprintable, Notice, Ticket, Topic};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;

/// A collection the client keeps in sync
pub trait Resource: Send + Sync + 'static {
    type Item: DeserializeOwned + Fingerprintable + Clone + Send + Sync + 'static;

    const NAME: &'static str;
    /// Label used in toast messages
    const LABEL: &'static str;
    /// Read endpoint, the same one used for the initial page load
    const PATH: &'static str;
    const TOPIC: Topic;
}

pub struct Tickets;

impl Resource for Tickets {
    type Item = Ticket;
    const NAME: &'static str = "tickets";
    const LABEL: &'static str = "Chamados";
    const PATH: &'static str = "/api/tickets";
    const TOPIC: Topic = Topic::Tickets;
}

pub struct Notices;

impl Resource for Notices {
    type Item = Notice;
    const NAME: &'static str = "notices";
    const LABEL: &'static str = "Avisos";
    const PATH: &'static str = "/api/notices";
    const TOPIC: Topic = Topic::Notices;
}

/// Polling cadence per kind of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollProfile {
    /// Kanban board, moved around constantly by IT staff
    Kanban,
    /// Messages inside an open ticket
    TicketChat,
    /// Ticket lists
    List,
    /// Dashboard notice banner
    Notices,
}

impl PollProfile {
    pub fn interval(&self) -> Duration {
        match self {
            PollProfile::Kanban => Duration::from_secs(3),
            PollProfile::TicketChat => Duration::from_secs(5),
            PollProfile::List => Duration::from_secs(8),
            PollProfile::Notices => Duration::from_secs(20),
        }
    }
}

/// Where the poller gets the authoritative collection from
#[async_trait]
pub trait CollectionSource<T>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<T>, ClientError>;
}

/// Fetches a resource's read endpoint over HTTP
pub struct HttpSource<R: Resource> {
    client: reqwest::Client,
    url: String,
    _resource: PhantomData<R>,
}

impl<R: Resource> HttpSource<R> {
    /// `timeout` bounds each fetch so slow requests do not pile up
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), R::PATH),
            _resource: PhantomData,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<R: Resource> CollectionSource<R::Item> for HttpSource<R> {
    async fn fetch(&self) -> Result<Vec<R::Item>, ClientError> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}
