//! Conflict monitor transition table.
//!
//! Pure state machine: events in, timer/poll/notify actions out. The async
//! driver owns the timer and the network; this module owns the rules.
//!
//!   Idle ──token known & visible──▶ Polling ◀──visible──▶ Suspended
//!                                     │
//!                       head diverged │ or save returned 409
//!                                     ▼
//!                                  Flagged  (sticky until reload)

use crate::types::VersionToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Suspended,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// The session adopted a token after load or save. `None` when the
    /// board came from the static fallback.
    TokenAdopted(Option<VersionToken>),
    VisibilityChanged { visible: bool },
    Tick,
    /// A poll finished. `remote` is `None` when the poll failed. Results
    /// compared against a token that is no longer held are ignored.
    RemoteHead {
        compared_to: VersionToken,
        remote: Option<VersionToken>,
    },
    SaveConflict,
    Reloaded(Option<VersionToken>),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    StartTimer,
    StopTimer,
    /// Fetch the remote head now and feed back a `RemoteHead` event.
    PollNow,
    Notify,
}

#[derive(Debug, Clone)]
pub struct ConflictMonitor {
    state: MonitorState,
    held: Option<VersionToken>,
    visible: bool,
}

impl Default for ConflictMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictMonitor {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Idle,
            held: None,
            visible: true,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn held_token(&self) -> Option<&VersionToken> {
        self.held.as_ref()
    }

    pub fn is_flagged(&self) -> bool {
        self.state == MonitorState::Flagged
    }

    pub fn handle(&mut self, event: MonitorEvent) -> Vec<MonitorAction> {
        use MonitorAction::*;
        use MonitorState::*;

        match event {
            MonitorEvent::TokenAdopted(token) => {
                self.held = token;
                if self.state == Flagged {
                    return Vec::new();
                }
                self.settle()
            }
            MonitorEvent::VisibilityChanged { visible } => {
                self.visible = visible;
                match (self.state, visible) {
                    (Polling, false) => {
                        self.state = Suspended;
                        vec![StopTimer]
                    }
                    (Suspended, true) => {
                        self.state = Polling;
                        vec![PollNow, StartTimer]
                    }
                    _ => Vec::new(),
                }
            }
            MonitorEvent::Tick => match self.state {
                Polling => vec![PollNow],
                _ => Vec::new(),
            },
            MonitorEvent::RemoteHead {
                compared_to,
                remote,
            } => {
                if self.state != Polling || self.held.as_ref() != Some(&compared_to) {
                    return Vec::new();
                }
                match remote {
                    Some(remote) if remote != compared_to => self.flag(),
                    _ => Vec::new(),
                }
            }
            MonitorEvent::SaveConflict => {
                if self.state == Flagged {
                    Vec::new()
                } else {
                    self.flag()
                }
            }
            MonitorEvent::Reloaded(token) => {
                self.held = token;
                let was_running = matches!(self.state, Polling);
                self.state = Idle;
                let mut actions = self.settle();
                if was_running && !actions.contains(&StartTimer) {
                    actions.push(StopTimer);
                }
                actions
            }
            MonitorEvent::Stop => {
                let was_polling = self.state == Polling;
                self.state = Idle;
                self.held = None;
                if was_polling {
                    vec![StopTimer]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn flag(&mut self) -> Vec<MonitorAction> {
        let was_polling = self.state == MonitorState::Polling;
        self.state = MonitorState::Flagged;
        if was_polling {
            vec![MonitorAction::StopTimer, MonitorAction::Notify]
        } else {
            vec![MonitorAction::Notify]
        }
    }

    /// Pick Idle/Polling/Suspended from the held token and visibility.
    fn settle(&mut self) -> Vec<MonitorAction> {
        let next = match (&self.held, self.visible) {
            (None, _) => MonitorState::Idle,
            (Some(_), true) => MonitorState::Polling,
            (Some(_), false) => MonitorState::Suspended,
        };
        let prev = std::mem::replace(&mut self.state, next);
        match (prev == MonitorState::Polling, next == MonitorState::Polling) {
            (false, true) => vec![MonitorAction::StartTimer],
            (true, false) => vec![MonitorAction::StopTimer],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> VersionToken {
        VersionToken::new(s)
    }

    fn polling(held: &str) -> ConflictMonitor {
        let mut monitor = ConflictMonitor::new();
        let actions = monitor.handle(MonitorEvent::TokenAdopted(Some(token(held))));
        assert_eq!(actions, vec![MonitorAction::StartTimer]);
        monitor
    }

    fn head(compared: &str, remote: Option<&str>) -> MonitorEvent {
        MonitorEvent::RemoteHead {
            compared_to: token(compared),
            remote: remote.map(token),
        }
    }

    #[test]
    fn test_idle_without_token() {
        let mut monitor = ConflictMonitor::new();
        assert!(monitor.handle(MonitorEvent::TokenAdopted(None)).is_empty());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(monitor.handle(MonitorEvent::Tick).is_empty());
    }

    #[test]
    fn test_tick_polls_and_equal_head_is_noop() {
        let mut monitor = polling("abc");
        assert_eq!(monitor.handle(MonitorEvent::Tick), vec![MonitorAction::PollNow]);
        assert!(monitor.handle(head("abc", Some("abc"))).is_empty());
        assert_eq!(monitor.state(), MonitorState::Polling);
    }

    #[test]
    fn test_divergence_notifies_exactly_once() {
        let mut monitor = polling("abc");
        let mut notifications = 0;
        for _ in 0..3 {
            monitor.handle(MonitorEvent::Tick);
            let actions = monitor.handle(head("abc", Some("xyz")));
            notifications += actions
                .iter()
                .filter(|a| **a == MonitorAction::Notify)
                .count();
        }
        assert_eq!(notifications, 1);
        assert!(monitor.is_flagged());
    }

    #[test]
    fn test_poll_failure_is_silent() {
        let mut monitor = polling("abc");
        assert!(monitor.handle(head("abc", None)).is_empty());
        assert_eq!(monitor.state(), MonitorState::Polling);
    }

    #[test]
    fn test_stale_poll_result_ignored_after_save() {
        let mut monitor = polling("abc");
        monitor.handle(MonitorEvent::TokenAdopted(Some(token("def"))));
        assert!(monitor.handle(head("abc", Some("abc"))).is_empty());
        assert!(!monitor.is_flagged());
    }

    #[test]
    fn test_visibility_suspends_and_resumes_with_immediate_poll() {
        let mut monitor = polling("abc");
        assert_eq!(
            monitor.handle(MonitorEvent::VisibilityChanged { visible: false }),
            vec![MonitorAction::StopTimer]
        );
        assert_eq!(monitor.state(), MonitorState::Suspended);
        assert!(monitor.handle(MonitorEvent::Tick).is_empty());
        assert_eq!(
            monitor.handle(MonitorEvent::VisibilityChanged { visible: true }),
            vec![MonitorAction::PollNow, MonitorAction::StartTimer]
        );
    }

    #[test]
    fn test_hidden_page_starts_suspended() {
        let mut monitor = ConflictMonitor::new();
        monitor.handle(MonitorEvent::VisibilityChanged { visible: false });
        assert!(monitor
            .handle(MonitorEvent::TokenAdopted(Some(token("abc"))))
            .is_empty());
        assert_eq!(monitor.state(), MonitorState::Suspended);
    }

    #[test]
    fn test_save_conflict_shares_single_notification() {
        let mut monitor = polling("abc");
        assert_eq!(
            monitor.handle(MonitorEvent::SaveConflict),
            vec![MonitorAction::StopTimer, MonitorAction::Notify]
        );
        monitor.handle(MonitorEvent::Tick);
        assert!(monitor.handle(head("abc", Some("xyz"))).is_empty());
        assert!(monitor.handle(MonitorEvent::SaveConflict).is_empty());
    }

    #[test]
    fn test_reload_clears_flag() {
        let mut monitor = polling("abc");
        monitor.handle(head("abc", Some("xyz")));
        assert!(monitor.is_flagged());
        assert!(monitor
            .handle(MonitorEvent::TokenAdopted(Some(token("other"))))
            .is_empty());
        assert!(monitor.is_flagged());
        assert_eq!(
            monitor.handle(MonitorEvent::Reloaded(Some(token("xyz")))),
            vec![MonitorAction::StartTimer]
        );
        assert_eq!(monitor.state(), MonitorState::Polling);
        assert_eq!(monitor.held_token(), Some(&token("xyz")));
    }

    #[test]
    fn test_stop_returns_to_idle() {
        let mut monitor = polling("abc");
        assert_eq!(monitor.handle(MonitorEvent::Stop), vec![MonitorAction::StopTimer]);
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.held_token(), None);
    }
}
