//! In-memory ticket and notice board
//!
//! Every mutation commits first and only then hands an event to the
//! notifier. The notifier's outcome never changes the mutation's result.

use chrono::{DateTime, Duration, Utc};
use deskwire_core::{Error, Event, Notice, NoticeSeverity, Result, Ticket, TicketPriority, TicketStatus};
use deskwire_hub::Notifier;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicket {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub requester: String,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotice {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub severity: NoticeSeverity,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub severity: Option<NoticeSeverity>,
    pub active: Option<bool>,
}

fn default_active() -> bool {
    true
}

#[derive(Default)]
struct BoardInner {
    tickets: BTreeMap<u64, Ticket>,
    notices: BTreeMap<u64, Notice>,
    next_ticket_id: u64,
    next_notice_id: u64,
}

/// Ticket and notice store acting as the event source for the hub
pub struct TicketBoard {
    inner: RwLock<BoardInner>,
    notifier: Arc<dyn Notifier>,
}

impl TicketBoard {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: RwLock::new(BoardInner::default()),
            notifier,
        }
    }

    pub fn list_tickets(&self, status: Option<TicketStatus>) -> Vec<Ticket> {
        self.inner
            .read()
            .tickets
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect()
    }

    pub fn get_ticket(&self, id: u64) -> Result<Ticket> {
        self.inner
            .read()
            .tickets
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("ticket {} not found", id)))
    }

    pub fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let title = required(&new.title, "title")?;
        let requester = required(&new.requester, "requester")?;

        let ticket = {
            let mut inner = self.inner.write();
            inner.next_ticket_id += 1;
            let now = Utc::now();
            let ticket = Ticket {
                id: inner.next_ticket_id,
                title,
                description: new.description,
                requester,
                assignee: new.assignee.filter(|a| !a.trim().is_empty()),
                status: TicketStatus::Aberto,
                priority: new.priority,
                created_at: now,
                updated_at: now,
            };
            inner.tickets.insert(ticket.id, ticket.clone());
            ticket
        };

        info!(ticket = ticket.id, "Ticket created");
        self.publish(Event::TicketCreated {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    pub fn update_ticket(&self, id: u64, patch: TicketPatch) -> Result<Ticket> {
        let title = patch.title.as_deref().map(|t| required(t, "title")).transpose()?;

        let ticket = {
            let mut inner = self.inner.write();
            let ticket = inner
                .tickets
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("ticket {} not found", id)))?;

            if let Some(title) = title {
                ticket.title = title;
            }
            if let Some(description) = patch.description {
                ticket.description = description;
            }
            if let Some(assignee) = patch.assignee {
                ticket.assignee = Some(assignee).filter(|a| !a.trim().is_empty());
            }
            if let Some(status) = patch.status {
                ticket.status = status;
            }
            if let Some(priority) = patch.priority {
                ticket.priority = priority;
            }
            ticket.updated_at = next_timestamp(ticket.updated_at);
            ticket.clone()
        };

        info!(ticket = id, status = %ticket.status, "Ticket updated");
        self.publish(Event::TicketUpdated {
            ticket: ticket.clone(),
        });
        Ok(ticket)
    }

    /// Kanban drag-and-drop: change only the status column
    pub fn move_ticket(&self, id: u64, status: TicketStatus) -> Result<Ticket> {
        self.update_ticket(
            id,
            TicketPatch {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    pub fn list_notices(&self, active_only: bool) -> Vec<Notice> {
        self.inner
            .read()
            .notices
            .values()
            .filter(|n| !active_only || n.active)
            .cloned()
            .collect()
    }

    pub fn create_notice(&self, new: NewNotice) -> Result<Notice> {
        let title = required(&new.title, "title")?;

        let notice = {
            let mut inner = self.inner.write();
            inner.next_notice_id += 1;
            let now = Utc::now();
            let notice = Notice {
                id: inner.next_notice_id,
                title,
                body: new.body,
                severity: new.severity,
                active: new.active,
                created_at: now,
                updated_at: now,
            };
            inner.notices.insert(notice.id, notice.clone());
            notice
        };

        info!(notice = notice.id, "Notice created");
        self.publish(Event::NoticeCreated {
            notice: notice.clone(),
        });
        Ok(notice)
    }

    pub fn update_notice(&self, id: u64, patch: NoticePatch) -> Result<Notice> {
        let title = patch.title.as_deref().map(|t| required(t, "title")).transpose()?;

        let notice = {
            let mut inner = self.inner.write();
            let notice = inner
                .notices
                .get_mut(&id)
                .ok_or_else(|| Error::not_found(format!("notice {} not found", id)))?;

            if let Some(title) = title {
                notice.title = title;
            }
            if let Some(body) = patch.body {
                notice.body = body;
            }
            if let Some(severity) = patch.severity {
                notice.severity = severity;
            }
            if let Some(active) = patch.active {
                notice.active = active;
            }
            notice.updated_at = next_timestamp(notice.updated_at);
            notice.clone()
        };

        info!(notice = id, "Notice updated");
        self.publish(Event::NoticeUpdated {
            notice: notice.clone(),
        });
        Ok(notice)
    }

    pub fn delete_notice(&self, id: u64) -> Result<()> {
        let removed = self.inner.write().notices.remove(&id);
        if removed.is_none() {
            return Err(Error::not_found(format!("notice {} not found", id)));
        }

        info!(notice = id, "Notice deleted");
        self.publish(Event::NoticeDeleted { id });
        Ok(())
    }

    fn publish(&self, event: Event) {
        let kind = event.kind();
        if !self.notifier.notify(event) {
            warn!(%kind, "No realtime subscribers received the event");
        }
    }
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

/// Strictly later than `previous`, so two edits inside the same millisecond
/// still change the collection fingerprint.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = previous + Duration::milliseconds(1);
    if now < floor {
        floor
    } else {
        now
    }
}
