//! Helpdesk records exchanged over the read API and inside events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kanban column a ticket sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Newly submitted, not yet picked up
    #[default]
    Aberto,
    /// Someone from IT is working on it
    EmAndamento,
    /// Waiting on the requester or a third party
    Aguardando,
    /// Fixed, pending requester confirmation
    Resolvido,
    /// Done
    Fechado,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Aberto => "ABERTO",
            TicketStatus::EmAndamento => "EM_ANDAMENTO",
            TicketStatus::Aguardando => "AGUARDANDO",
            TicketStatus::Resolvido => "RESOLVIDO",
            TicketStatus::Fechado => "FECHADO",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Baixa,
    #[default]
    Media,
    Alta,
    Urgente,
}

/// A helpdesk ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Login of the user who opened the ticket
    pub requester: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticeSeverity {
    #[default]
    Info,
    Warning,
    Critical,
}

/// An admin-published notice shown on the dashboard banner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub severity: NoticeSeverity,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
