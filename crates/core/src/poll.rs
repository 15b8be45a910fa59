use std::fmt::Debug;

use tracing::{debug, trace, warn};

use crate::error::ModelError;

/// Token for one in-flight fetch, carrying the subject it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket<S> {
    id: u64,
    subject: Option<S>,
}

impl<S> FetchTicket<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subject(&self) -> Option<&S> {
        self.subject.as_ref()
    }
}

/// Tick gating for one view: at most one fetch in flight, nothing while
/// hidden, and responses applied only if they belong to the current subject.
#[derive(Debug)]
pub struct PollState<S> {
    subject: Option<S>,
    requires_subject: bool,
    visible: bool,
    in_flight: Option<u64>,
    next_ticket: u64,
    failures: u64,
    force_refresh: bool,
}

impl<S: Clone + PartialEq + Debug> PollState<S> {
    /// Poll state for a view that can fetch without a subject.
    pub fn new() -> Self {
        Self {
            subject: None,
            requires_subject: false,
            visible: true,
            in_flight: None,
            next_ticket: 0,
            failures: 0,
            force_refresh: false,
        }
    }

    /// Poll state for a dependent view that only fetches once a subject is
    /// set (e.g. peers of the selected torrent).
    pub fn with_required_subject() -> Self {
        Self {
            requires_subject: true,
            ..Self::new()
        }
    }

    pub fn subject(&self) -> Option<&S> {
        self.subject.as_ref()
    }

    /// Switch subject. Returns true if it actually changed; a fetch already
    /// in flight will then come back stale.
    pub fn set_subject(&mut self, subject: Option<S>) -> bool {
        if self.subject == subject {
            return false;
        }
        debug!(from = ?self.subject, to = ?subject, "poll subject changed");
        self.subject = subject;
        true
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Ask for a full refresh on the next tick (e.g. after a torrent was
    /// added or removed).
    pub fn request_refresh(&mut self) {
        self.force_refresh = true;
    }

    /// Take the pending refresh request.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.force_refresh)
    }

    /// Start a fetch if the view may fetch right now.
    pub fn begin_tick(&mut self) -> Option<FetchTicket<S>> {
        if !self.visible {
            trace!("tick skipped: hidden");
            return None;
        }
        if self.in_flight.is_some() {
            trace!("tick skipped: fetch in flight");
            return None;
        }
        if self.requires_subject && self.subject.is_none() {
            trace!("tick skipped: no subject");
            return None;
        }
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(id);
        Some(FetchTicket {
            id,
            subject: self.subject.clone(),
        })
    }

    /// Settle `ticket`. The fetched value is handed back only if the ticket
    /// is the outstanding one, for the current subject, and the fetch worked.
    pub fn complete<T, E: std::fmt::Display>(
        &mut self,
        ticket: FetchTicket<S>,
        result: Result<T, E>,
    ) -> Result<T, ModelError> {
        let outstanding = self.in_flight == Some(ticket.id);
        if outstanding {
            self.in_flight = None;
        }
        if !outstanding || ticket.subject != self.subject {
            let err = ModelError::StaleResponse {
                fetched: format!("{:?}", ticket.subject),
                current: format!("{:?}", self.subject),
            };
            debug!("{}", err);
            return Err(err);
        }
        result.map_err(|e| {
            self.failures += 1;
            warn!(failures = self.failures, "fetch failed: {}", e);
            ModelError::FetchFailed(e.to_string())
        })
    }
}

impl<S: Clone + PartialEq + Debug> Default for PollState<S> {
    fn default() -> Self {
        Self::new()
    }
}
