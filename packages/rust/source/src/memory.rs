//! In-process message source for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use tourledger_shared::{Message, Result, SubjectId, SubjectRef, TourLedgerError};

use crate::{MessageSource, dedupe_subjects};

/// Subjects and messages held in memory.
///
/// The connection can be cut from outside through [`MemoryMessageSource::link`]
/// or scheduled to drop after a number of message fetches. Queries can also
/// be made to fail while the liveness probe still reports the link up.
#[derive(Debug)]
pub struct MemoryMessageSource {
    subjects: Vec<SubjectRef>,
    messages: HashMap<SubjectId, Vec<Message>>,
    link: Arc<AtomicBool>,
    reconnect_fails: bool,
    outage_after: Option<usize>,
    dropped_selects: AtomicUsize,
    dropped_fetches: AtomicUsize,
    fetches: AtomicUsize,
    reconnects: AtomicUsize,
}

impl Default for MemoryMessageSource {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            messages: HashMap::new(),
            link: Arc::new(AtomicBool::new(true)),
            reconnect_fails: false,
            outage_after: None,
            dropped_selects: AtomicUsize::new(0),
            dropped_fetches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
        }
    }
}

impl MemoryMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subject qualifying at `qualified_at` with its messages.
    pub fn with_subject(
        mut self,
        id: SubjectId,
        qualified_at: DateTime<Utc>,
        messages: Vec<Message>,
    ) -> Self {
        self.subjects.push(SubjectRef {
            id: id.clone(),
            qualified_at,
        });
        self.messages.entry(id).or_default().extend(messages);
        self
    }

    /// Make every reconnect attempt fail.
    pub fn with_failing_reconnect(mut self) -> Self {
        self.reconnect_fails = true;
        self
    }

    /// Cut the connection once, right after the `fetches`-th message fetch.
    pub fn with_outage_after(mut self, fetches: usize) -> Self {
        self.outage_after = Some(fetches);
        self
    }

    /// Fail the next `n` subject queries with a connectivity error.
    pub fn with_dropped_selects(self, n: usize) -> Self {
        self.dropped_selects.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` message fetches with a connectivity error.
    pub fn with_dropped_fetches(self, n: usize) -> Self {
        self.dropped_fetches.store(n, Ordering::SeqCst);
        self
    }

    /// Shared liveness flag. Storing `false` cuts the connection.
    pub fn link(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.link)
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    fn check_link(&self) -> Result<()> {
        if self.link.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TourLedgerError::Connectivity("memory source disconnected".into()))
        }
    }

    fn check_dropped(counter: &AtomicUsize) -> Result<()> {
        let dropped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            Err(TourLedgerError::Connectivity("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

impl MessageSource for MemoryMessageSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn is_live(&self) -> bool {
        self.link.load(Ordering::SeqCst)
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_fails {
            return Err(TourLedgerError::Connectivity("reconnect refused".into()));
        }
        self.link.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subjects_since(&self, cursor: DateTime<Utc>) -> Result<Vec<SubjectRef>> {
        self.check_link()?;
        Self::check_dropped(&self.dropped_selects)?;
        Ok(dedupe_subjects(
            self.subjects
                .iter()
                .filter(|s| s.qualified_at > cursor)
                .cloned(),
        ))
    }

    async fn messages_for(&self, subject: &SubjectId) -> Result<Vec<Message>> {
        self.check_link()?;
        Self::check_dropped(&self.dropped_fetches)?;
        let served = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.outage_after.is_some_and(|limit| served == limit) {
            self.link.store(false, Ordering::SeqCst);
        }
        Ok(self.messages.get(subject).cloned().unwrap_or_default())
    }
}
