use std::time::Duration;

/// Quiet period before restyling the editor after a keystroke.
pub const RESTYLE_DELAY: Duration = Duration::from_millis(150);

/// Quiet period before an existing memo is saved in the background.
pub const AUTOSAVE_DELAY: Duration = Duration::from_millis(2000);

/// Quiet period before a search query is sent.
pub const SEARCH_DELAY: Duration = Duration::from_millis(300);

/// Identifies one scheduled run. Only the most recent ticket is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Last-write-wins scheduling. Every `schedule` supersedes the tickets
/// handed out before it, so a stale timer callback can detect that it lost
/// and return without touching anything.
#[derive(Clone, Debug, Default)]
pub struct Debouncer {
    generation: u64,
    pending: bool,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self) -> Ticket {
        self.generation += 1;
        self.pending = true;
        Ticket(self.generation)
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = false;
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.pending && ticket.0 == self.generation
    }

    /// Marks `ticket` as run. Returns `false` when a newer schedule or a
    /// cancel has superseded it; the caller must then do nothing.
    pub fn fire(&mut self, ticket: Ticket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.pending = false;
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchStep {
    /// The query is blank; show the full feed again.
    Clear,
    /// Arm a timer that calls [`SearchTracker::start`] with this ticket.
    Schedule(Ticket),
}

/// Search-as-you-type state. Only the latest query is ever sent, and only
/// the response to the latest sent query is shown.
#[derive(Clone, Debug, Default)]
pub struct SearchTracker {
    debouncer: Debouncer,
    query: String,
    in_flight: Option<Ticket>,
}

impl SearchTracker {
    pub fn query_changed(&mut self, raw: &str) -> SearchStep {
        self.in_flight = None;
        let query = raw.trim();
        if query.is_empty() {
            self.clear();
            return SearchStep::Clear;
        }
        self.query = query.to_string();
        SearchStep::Schedule(self.debouncer.schedule())
    }

    /// Called when the timer for `ticket` fires. Returns the query to send,
    /// or `None` when a newer keystroke superseded it.
    pub fn start(&mut self, ticket: Ticket) -> Option<String> {
        if !self.debouncer.fire(ticket) {
            return None;
        }
        self.in_flight = Some(ticket);
        Some(self.query.clone())
    }

    /// Whether a response for `ticket` may still replace the list.
    pub fn accepts(&self, ticket: Ticket) -> bool {
        self.in_flight == Some(ticket)
    }

    pub fn clear(&mut self) {
        self.debouncer.cancel();
        self.query.clear();
        self.in_flight = None;
    }
}
