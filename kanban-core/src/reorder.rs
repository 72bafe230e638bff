//! Reorder engine: turns a drag gesture into board mutations.
//!
//! Hovering over another column moves the card immediately for live
//! feedback. History is written once, at drop time, and only when the card
//! ends up in a different column than the one it was picked up from.

use crate::document::move_card;
use crate::types::{now_timestamp, Board, CardChange};

/// What the pointer is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// The column container itself: append to the end.
    Column(String),
    /// Another card: insert before it.
    Card(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragEvent {
    Start { card_id: String },
    Over { card_id: String, target: DropTarget },
    End { card_id: String, target: Option<DropTarget> },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum DragState {
    #[default]
    Idle,
    Dragging {
        card_id: String,
        origin_column_id: String,
        /// A hover already spliced the card into its drop position.
        placed_by_hover: bool,
    },
}

#[derive(Debug, Default)]
pub struct ReorderEngine {
    state: DragState,
}

impl ReorderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column the active card was picked up from, while a gesture is live.
    pub fn origin(&self) -> Option<&str> {
        match &self.state {
            DragState::Dragging {
                origin_column_id, ..
            } => Some(origin_column_id),
            DragState::Idle => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.state != DragState::Idle
    }

    /// Apply one gesture event. Returns the new board when the event changed
    /// the document.
    pub fn handle(&mut self, board: &Board, event: DragEvent) -> Option<Board> {
        match event {
            DragEvent::Start { card_id } => {
                let Some(ci) = board.column_index_of_card(&card_id) else {
                    self.state = DragState::Idle;
                    return None;
                };
                self.state = DragState::Dragging {
                    card_id,
                    origin_column_id: board.columns[ci].id.clone(),
                    placed_by_hover: false,
                };
                None
            }
            DragEvent::Over { card_id, target } => {
                let DragState::Dragging {
                    card_id: active,
                    placed_by_hover,
                    ..
                } = &mut self.state
                else {
                    return None;
                };
                if *active != card_id {
                    return None;
                }
                let next = move_across(board, &card_id, &target);
                if next.is_some() {
                    *placed_by_hover = true;
                }
                next
            }
            DragEvent::End { card_id, target } => {
                let state = std::mem::take(&mut self.state);
                let DragState::Dragging {
                    card_id: active,
                    origin_column_id,
                    placed_by_hover,
                } = state
                else {
                    return None;
                };
                if active != card_id {
                    return None;
                }
                // Once a hover has placed the card, the drop keeps that placement.
                let target = if placed_by_hover { None } else { target };
                finish_drop(board, &card_id, target.as_ref(), &origin_column_id)
            }
            DragEvent::Cancel => {
                self.state = DragState::Idle;
                None
            }
        }
    }

}

/// Resolve a drop target to (column index, insertion index).
fn resolve_target(board: &Board, card_id: &str, target: &DropTarget) -> Option<(usize, usize)> {
    match target {
        DropTarget::Column(column_id) => {
            let ci = board.columns.iter().position(|c| &c.id == column_id)?;
            Some((ci, board.columns[ci].cards.len()))
        }
        DropTarget::Card(over_id) => {
            if over_id == card_id {
                return None;
            }
            board.locate_card(over_id)
        }
    }
}

/// Splice the card into another column at the hovered position. No history.
fn move_across(board: &Board, card_id: &str, target: &DropTarget) -> Option<Board> {
    let current = board.column_index_of_card(card_id)?;
    let (to, index) = resolve_target(board, card_id, target)?;
    if to == current {
        return None;
    }
    Some(move_card(
        board,
        card_id,
        &board.columns[current].id,
        &board.columns[to].id,
        index,
    ))
}

fn finish_drop(
    board: &Board,
    card_id: &str,
    target: Option<&DropTarget>,
    origin_column_id: &str,
) -> Option<Board> {
    let mut next: Option<Board> = None;

    if let Some(target) = target {
        let current = board.column_index_of_card(card_id)?;
        if let Some((to, index)) = resolve_target(board, card_id, target) {
            if to != current {
                next = move_across(board, card_id, target);
            } else if let DropTarget::Card(_) = target {
                let column_id = &board.columns[current].id;
                let from = board.columns[current]
                    .cards
                    .iter()
                    .position(|c| c.id == card_id)?;
                if from != index {
                    next = Some(move_card(board, card_id, column_id, column_id, index));
                }
            }
        }
    }

    let working = next.as_ref().unwrap_or(board);
    let (ci, pos) = working.locate_card(card_id)?;
    let final_column = &working.columns[ci];
    if final_column.id == origin_column_id {
        return next;
    }

    let mut updated = working.clone();
    let now = now_timestamp();
    let column_id = final_column.id.clone();
    let column_title = final_column.title.clone();
    let card = &mut updated.columns[ci].cards[pos];
    if card.last_column_change() == Some(column_id.as_str()) {
        log::debug!(
            target: "kanban.reorder",
            "card {} already recorded in column {}, refreshing timestamp only",
            card_id,
            column_id
        );
    } else {
        card.history.push(CardChange::Column {
            column_id,
            column_title,
            timestamp: now.clone(),
        });
    }
    card.updated_at = Some(now);
    Some(updated)
}
