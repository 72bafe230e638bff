//! Async driver for the conflict monitor: owns the poll timer and runs head
//! checks when the transition table asks for one.
use std::time::Duration;

use kanban_core::monitor::{MonitorAction, MonitorEvent, MonitorState};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::BoardSession;

/// Run the monitor loop for `session` until `shutdown` flips.
///
/// `visibility` carries whether the board is in view; hiding it suspends
/// polling and showing it again polls immediately.
pub fn spawn(
    session: BoardSession,
    poll_interval: Duration,
    mut visibility: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut actions = session.subscribe_actions();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a fresh interval fires at once; start a full period out.
        interval.reset();
        let mut running = session.monitor_state() == MonitorState::Polling;

        loop {
            tokio::select! {
                _ = interval.tick(), if running => {
                    session.monitor_event(MonitorEvent::Tick);
                }
                action = actions.recv() => {
                    match action {
                        Ok(MonitorAction::StartTimer) => {
                            running = true;
                            interval.reset();
                        }
                        Ok(MonitorAction::StopTimer) => running = false,
                        Ok(MonitorAction::PollNow) => {
                            if let Some(event) = session.poll_head().await {
                                session.monitor_event(event);
                            }
                        }
                        Ok(MonitorAction::Notify) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            log::warn!(target: "kanban.monitor", "Monitor driver missed {} actions", missed);
                            running = session.monitor_state() == MonitorState::Polling;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                changed = visibility.changed() => {
                    if changed.is_err() {
                        log::debug!(target: "kanban.monitor", "Visibility source dropped");
                        break;
                    }
                    let visible = *visibility.borrow_and_update();
                    session.set_visible(visible);
                }
                _ = shutdown.changed() => {
                    log::info!(target: "kanban.monitor", "Conflict monitor shutting down");
                    break;
                }
            }
        }
    })
}
