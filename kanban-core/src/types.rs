use serde::{Deserialize, Serialize};

/// Current time as an RFC 3339 UTC timestamp with millisecond precision,
/// the format used for every `createdAt` / `updatedAt` / history stamp.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

/// One entry of a card's append-only history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CardChange {
    Column {
        column_id: String,
        column_title: String,
        timestamp: String,
    },
    Title {
        from: String,
        to: String,
        timestamp: String,
    },
    Description {
        from: Option<String>,
        to: Option<String>,
        timestamp: String,
    },
    Labels {
        from: Vec<String>,
        to: Vec<String>,
        timestamp: String,
    },
}

impl CardChange {
    /// Column id for `column` entries, `None` for field changes.
    pub fn column_id(&self) -> Option<&str> {
        match self {
            CardChange::Column { column_id, .. } => Some(column_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> &str {
        match self {
            CardChange::Column { timestamp, .. }
            | CardChange::Title { timestamp, .. }
            | CardChange::Description { timestamp, .. }
            | CardChange::Labels { timestamp, .. } => timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<CardChange>,
}

impl Card {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            labels: Vec::new(),
            checklist: Vec::new(),
            color: None,
            created_at: now_timestamp(),
            updated_at: None,
            history: Vec::new(),
        }
    }

    /// Column id named by the most recent `column` history entry, if the
    /// newest entry is one.
    pub fn last_column_change(&self) -> Option<&str> {
        self.history.last().and_then(CardChange::column_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl Column {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            color: None,
            cards: Vec::new(),
        }
    }
}

/// Column fields editable from the column editor. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    pub updated_at: String,
}

impl Board {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            columns: Vec::new(),
            updated_at: now_timestamp(),
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Index of the column holding `card_id`.
    pub fn column_index_of_card(&self, card_id: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.cards.iter().any(|c| c.id == card_id))
    }

    /// Locate a card: (column index, card index).
    pub fn locate_card(&self, card_id: &str) -> Option<(usize, usize)> {
        self.columns.iter().enumerate().find_map(|(ci, col)| {
            col.cards
                .iter()
                .position(|c| c.id == card_id)
                .map(|pos| (ci, pos))
        })
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.locate_card(card_id)
            .map(|(ci, pos)| &self.columns[ci].cards[pos])
    }

    pub fn contains_card(&self, card_id: &str) -> bool {
        self.locate_card(card_id).is_some()
    }

    pub fn card_ids(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .flat_map(|col| col.cards.iter())
            .map(|c| c.id.as_str())
    }

    pub fn card_count(&self) -> usize {
        self.columns.iter().map(|c| c.cards.len()).sum()
    }
}

/// Summary info for a board in list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub id: String,
    pub title: String,
    pub card_count: usize,
}

/// Opaque remote version marker (the store's head commit sha).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn new(sha: impl Into<String>) -> Self {
        Self(sha.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
