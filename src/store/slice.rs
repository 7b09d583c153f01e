//! Loading slice
//!
//! One independently fetched piece of state with its visible loading status
//! and last error. Fetches are numbered; a response older than the last one
//! applied is dropped, so a slow manual refresh can never overwrite newer data
//! from a background refresh.

/// Visible loading status of a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Ticket handed out when a fetch starts.
///
/// The default ticket was never issued: finishing with it changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
    silent: bool,
}

impl Default for FetchTicket {
    fn default() -> Self {
        Self {
            seq: 0,
            silent: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice<T> {
    data: Option<T>,
    status: LoadStatus,
    error: Option<String>,
    issued: u64,
    applied: u64,
    /// Ticket number of the latest non-silent fetch
    visible: u64,
}

impl<T> Default for Slice<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: LoadStatus::Idle,
            error: None,
            issued: 0,
            applied: 0,
            visible: 0,
        }
    }
}

impl<T> Slice<T> {
    /// Last successfully fetched value
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// Register a new fetch. Non-silent fetches move the slice to `Loading`.
    pub fn begin(&mut self, silent: bool) -> FetchTicket {
        self.issued += 1;
        if !silent {
            self.status = LoadStatus::Loading;
            self.visible = self.issued;
        }
        FetchTicket {
            seq: self.issued,
            silent,
        }
    }

    /// Back to `Idle` with no data. Numbering continues, so every fetch
    /// still in flight becomes stale and can neither apply data nor settle
    /// the status.
    pub fn reset(&mut self) {
        self.data = None;
        self.status = LoadStatus::Idle;
        self.error = None;
        self.applied = self.issued;
        self.visible = 0;
    }

    /// Apply the outcome of a fetch. Returns false when the outcome was stale
    /// and discarded.
    ///
    /// Failures keep the previous data. A silent fetch never touches the
    /// visible status; the latest non-silent fetch settles it even when its
    /// own payload was stale.
    pub fn finish(&mut self, ticket: FetchTicket, outcome: Result<T, String>) -> bool {
        let fresh = ticket.seq > self.applied;
        if fresh {
            self.applied = ticket.seq;
            match outcome {
                Ok(value) => {
                    self.data = Some(value);
                    self.error = None;
                }
                Err(message) => self.error = Some(message),
            }
        }

        if !ticket.silent && ticket.seq == self.visible {
            self.status = if self.error.is_some() {
                LoadStatus::Error
            } else {
                LoadStatus::Loaded
            };
        }
        fresh
    }
}
