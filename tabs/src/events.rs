/// User-facing messages about recovery and tab actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Tabs of a damaged session were salvaged from its raw bytes.
    TabsSalvaged { session: String, count: usize },
    /// A damaged session was replaced by another saved session.
    SessionFallback { damaged: String, loaded: String },
    /// Nothing could be restored and a fresh session was started.
    RecoverySessionCreated(String),
    ReopeningClosedTab,
}

/// Notifications emitted by the tab manager.
///
/// Positions refer to the tab list at the time the event is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    TabCountChanged(usize),
    TabAdded(usize),
    TabRemoved(usize),
    TabChanged(usize),
    /// The tab list is ready, at least one tab exists.
    Initialized,
    /// The last tab was closed.
    CloseBrowser,
    /// A tab opened for another application was closed; focus should go back to it.
    ReturnToCaller,
    /// More tabs than the configured limit are open.
    MaxTabsReached(usize),
    Notice(Notice),
}

/// Receiver of tab manager notifications.
pub trait TabEventSink {
    fn notify(&self, event: TabEvent);
}

impl<F: Fn(TabEvent)> TabEventSink for F {
    fn notify(&self, event: TabEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopSink;

impl TabEventSink for NoopSink {
    fn notify(&self, _event: TabEvent) {}
}
