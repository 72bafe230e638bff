//! Board document model.
//!
//! Every transformation takes the current board by reference and returns a
//! new value; the previous board is never modified. Missing ids turn an
//! operation into a no-op instead of an error, since the document is purely
//! local state.

use crate::types::{now_timestamp, Board, Card, CardChange, Column, ColumnPatch};

pub fn add_card(board: &Board, column_id: &str, card: Card) -> Board {
    let mut next = board.clone();
    if next.contains_card(&card.id) {
        log::debug!(target: "kanban.document", "add_card: id {} already on board", card.id);
        return next;
    }
    if let Some(col) = next.columns.iter_mut().find(|c| c.id == column_id) {
        col.cards.push(card);
    }
    next
}

/// Replace a card's editable fields, appending field-level history for the
/// title, description and labels. The stored history is authoritative; any
/// history on `card` is ignored.
pub fn update_card(board: &Board, card: Card) -> Board {
    let mut next = board.clone();
    let Some((ci, pos)) = next.locate_card(&card.id) else {
        return next;
    };
    let now = now_timestamp();
    let existing = &mut next.columns[ci].cards[pos];

    let mut changes = Vec::new();
    if existing.title != card.title {
        changes.push(CardChange::Title {
            from: existing.title.clone(),
            to: card.title.clone(),
            timestamp: now.clone(),
        });
    }
    if existing.description != card.description {
        changes.push(CardChange::Description {
            from: existing.description.clone(),
            to: card.description.clone(),
            timestamp: now.clone(),
        });
    }
    if existing.labels != card.labels {
        changes.push(CardChange::Labels {
            from: existing.labels.clone(),
            to: card.labels.clone(),
            timestamp: now.clone(),
        });
    }

    existing.title = card.title;
    existing.description = card.description;
    existing.labels = card.labels;
    existing.checklist = card.checklist;
    existing.color = card.color;
    existing.history.extend(changes);
    existing.updated_at = Some(now);
    next
}

pub fn remove_card(board: &Board, card_id: &str) -> Board {
    let mut next = board.clone();
    if let Some((ci, pos)) = next.locate_card(card_id) {
        next.columns[ci].cards.remove(pos);
    }
    next
}

pub fn add_column(board: &Board, column: Column) -> Board {
    let mut next = board.clone();
    if next.column(&column.id).is_some() {
        return next;
    }
    next.columns.push(column);
    next
}

pub fn update_column(board: &Board, column_id: &str, patch: ColumnPatch) -> Board {
    let mut next = board.clone();
    if let Some(col) = next.columns.iter_mut().find(|c| c.id == column_id) {
        if let Some(title) = patch.title {
            col.title = title;
        }
        if let Some(description) = patch.description {
            col.description = description;
        }
        if let Some(color) = patch.color {
            col.color = color;
        }
    }
    next
}

/// Remove a column along with its cards. Returns the new board and the ids
/// of the cards that went with it.
pub fn remove_column(board: &Board, column_id: &str) -> (Board, Vec<String>) {
    let mut next = board.clone();
    let Some(index) = next.columns.iter().position(|c| c.id == column_id) else {
        return (next, Vec::new());
    };
    let removed = next.columns.remove(index);
    let ids = removed.cards.into_iter().map(|c| c.id).collect();
    (next, ids)
}

/// Move a card out of `from_column_id` into `to_column_id` at `to_index`
/// (clamped to the target length). Same-column moves are a stable reposition.
pub fn move_card(
    board: &Board,
    card_id: &str,
    from_column_id: &str,
    to_column_id: &str,
    to_index: usize,
) -> Board {
    let mut next = board.clone();
    let Some(from) = next.columns.iter().position(|c| c.id == from_column_id) else {
        return next;
    };
    let Some(to) = next.columns.iter().position(|c| c.id == to_column_id) else {
        return next;
    };
    let Some(pos) = next.columns[from].cards.iter().position(|c| c.id == card_id) else {
        return next;
    };
    let card = next.columns[from].cards.remove(pos);
    let target = &mut next.columns[to].cards;
    let index = to_index.min(target.len());
    target.insert(index, card);
    next
}

/// The editable board together with its dirty flag.
#[derive(Debug, Clone)]
pub struct BoardDocument {
    board: Board,
    dirty: bool,
}

impl BoardDocument {
    pub fn new(board: Board) -> Self {
        Self { board, dirty: false }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Wholesale replacement on load or reload. Clears the dirty flag.
    pub fn replace(&mut self, board: Board) {
        self.board = board;
        self.dirty = false;
    }

    /// Install an edited board and mark the document dirty.
    pub fn commit(&mut self, board: Board) {
        self.board = board;
        self.dirty = true;
    }

    /// Clear dirty after an accepted save and stamp `updatedAt` the way the
    /// store does.
    pub fn mark_saved(&mut self, updated_at: String) {
        self.board.updated_at = updated_at;
        self.dirty = false;
    }

    pub fn discard_changes(&mut self, pristine: Board) {
        self.replace(pristine);
    }

    pub fn add_card(&mut self, column_id: &str, card: Card) {
        let next = add_card(&self.board, column_id, card);
        self.commit(next);
    }

    pub fn update_card(&mut self, card: Card) {
        let next = update_card(&self.board, card);
        self.commit(next);
    }

    /// Returns the removed card id when the card existed.
    pub fn remove_card(&mut self, card_id: &str) -> Option<String> {
        let existed = self.board.contains_card(card_id);
        let next = remove_card(&self.board, card_id);
        self.commit(next);
        existed.then(|| card_id.to_string())
    }

    pub fn add_column(&mut self, column: Column) {
        let next = add_column(&self.board, column);
        self.commit(next);
    }

    pub fn update_column(&mut self, column_id: &str, patch: ColumnPatch) {
        let next = update_column(&self.board, column_id, patch);
        self.commit(next);
    }

    /// Returns the ids of the cards removed with the column.
    pub fn remove_column(&mut self, column_id: &str) -> Vec<String> {
        let (next, removed) = remove_column(&self.board, column_id);
        self.commit(next);
        removed
    }

    pub fn move_card(&mut self, card_id: &str, from: &str, to: &str, to_index: usize) {
        let next = move_card(&self.board, card_id, from, to, to_index);
        self.commit(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_board() -> Board {
        let mut board = Board::new("b1", "Work");
        let mut todo = Column::new("todo", "Todo");
        todo.cards.push(Card::new("c1", "One"));
        todo.cards.push(Card::new("c2", "Two"));
        todo.cards.push(Card::new("c3", "Three"));
        let mut done = Column::new("done", "Done");
        done.cards.push(Card::new("c4", "Four"));
        board.columns.push(todo);
        board.columns.push(done);
        board
    }

    fn ids(board: &Board, column: &str) -> Vec<String> {
        board
            .column(column)
            .unwrap()
            .cards
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    #[test]
    fn test_operations_leave_input_untouched() {
        let board = sample_board();
        let before = board.clone();
        let _ = move_card(&board, "c1", "todo", "done", 0);
        let _ = remove_column(&board, "todo");
        assert_eq!(board, before);
    }

    #[test]
    fn test_move_across_columns() {
        let board = move_card(&sample_board(), "c2", "todo", "done", 0);
        assert_eq!(ids(&board, "todo"), vec!["c1", "c3"]);
        assert_eq!(ids(&board, "done"), vec!["c2", "c4"]);
    }

    #[test]
    fn test_move_within_column_and_clamp() {
        let board = move_card(&sample_board(), "c1", "todo", "todo", 99);
        assert_eq!(ids(&board, "todo"), vec!["c2", "c3", "c1"]);
        let board = move_card(&board, "c1", "todo", "todo", 0);
        assert_eq!(ids(&board, "todo"), vec!["c1", "c2", "c3"]);
    }

    #[test]
    fn test_move_sequence_preserves_every_card_once() {
        let mut board = sample_board();
        let moves = [
            ("c1", "todo", "done", 1),
            ("c4", "done", "todo", 0),
            ("c1", "done", "todo", 2),
            ("c3", "todo", "done", 5),
            ("c9", "todo", "done", 0),
            ("c2", "done", "todo", 0),
            ("c2", "todo", "missing", 0),
        ];
        for (card, from, to, index) in moves {
            board = move_card(&board, card, from, to, index);
        }
        let mut all: Vec<&str> = board.card_ids().collect();
        all.sort_unstable();
        assert_eq!(all, vec!["c1", "c2", "c3", "c4"]);
    }

    #[test]
    fn test_missing_ids_are_noops() {
        let board = sample_board();
        assert_eq!(remove_card(&board, "nope"), board);
        assert_eq!(move_card(&board, "c1", "done", "todo", 0), board);
        assert_eq!(add_card(&board, "missing", Card::new("c9", "x")), board);
        assert_eq!(update_card(&board, Card::new("nope", "x")), board);
        let (same, removed) = remove_column(&board, "missing");
        assert_eq!(same, board);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_add_card_rejects_duplicate_id() {
        let board = add_card(&sample_board(), "done", Card::new("c1", "dup"));
        assert_eq!(ids(&board, "done"), vec!["c4"]);
    }

    #[test]
    fn test_remove_column_reports_cards() {
        let (board, removed) = remove_column(&sample_board(), "todo");
        assert_eq!(removed, vec!["c1", "c2", "c3"]);
        assert_eq!(board.columns.len(), 1);
        assert!(!board.contains_card("c1"));
    }

    #[test]
    fn test_update_card_appends_field_history() {
        let board = sample_board();
        let mut edited = board.card("c1").unwrap().clone();
        edited.title = "One!".to_string();
        edited.labels = vec!["urgent".to_string()];
        edited.history.clear();

        let next = update_card(&board, edited);
        let card = next.card("c1").unwrap();
        assert_eq!(card.title, "One!");
        assert_eq!(card.history.len(), 2);
        assert!(matches!(&card.history[0], CardChange::Title { from, to, .. } if from == "One" && to == "One!"));
        assert!(matches!(&card.history[1], CardChange::Labels { to, .. } if to == &vec!["urgent".to_string()]));
        assert!(card.updated_at.is_some());
    }

    #[test]
    fn test_update_column_patch() {
        let board = update_column(
            &sample_board(),
            "done",
            ColumnPatch {
                title: Some("Shipped".into()),
                color: Some(Some("#0f0".into())),
                ..Default::default()
            },
        );
        let col = board.column("done").unwrap();
        assert_eq!(col.title, "Shipped");
        assert_eq!(col.color.as_deref(), Some("#0f0"));
        assert_eq!(col.description, None);
    }

    #[test]
    fn test_document_dirty_tracking() {
        let mut doc = BoardDocument::new(sample_board());
        assert!(!doc.is_dirty());
        assert_eq!(doc.remove_card("c2"), Some("c2".to_string()));
        assert!(doc.is_dirty());
        doc.mark_saved("2030-01-01T00:00:00.000Z".to_string());
        assert!(!doc.is_dirty());
        assert_eq!(doc.board().updated_at, "2030-01-01T00:00:00.000Z");
        assert_eq!(doc.remove_card("c2"), None);
        doc.replace(sample_board());
        assert!(!doc.is_dirty());
    }
}
