use serde::{Deserialize, Serialize};

/// Key reserved for the checkpoint row. Never a valid item id.
pub const CHECKPOINT_KEY: u64 = 0;

/// Largest page the timeline endpoint will serve.
pub const MAX_PAGE_SIZE: u32 = 200;

/// A post fetched from the feed, stored verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub payload: serde_json::Value,
}

impl Item {
    pub fn new(id: u64, payload: serde_json::Value) -> Self {
        Self { id, payload }
    }

    /// Build an item from a raw API object, reading its numeric `id`.
    pub fn from_api_object(payload: serde_json::Value) -> Option<Self> {
        let id = payload.get("id").and_then(|v| v.as_u64())?;
        Some(Self { id, payload })
    }
}

/// Where the next timeline request starts
///
/// The timeline endpoint always serves the newest posts in range first, so
/// both modes walk downward by lowering `max_id` below the oldest post seen.
/// Forward mode additionally pins `since_id` to the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Cursor {
    /// Walk history from the newest post downward. `max_id` is inclusive.
    Backward { max_id: Option<u64> },
    /// Walk posts strictly newer than `since_id`, newest first.
    Forward {
        since_id: u64,
        max_id: Option<u64>,
    },
}

/// What follows a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next(Cursor),
    /// The page reached the bottom of the range.
    Done,
    /// The page did not move the cursor.
    Stalled,
}

impl Cursor {
    /// Initial cursor for a run given the stored high-water mark.
    pub fn from_checkpoint(checkpoint: Option<u64>) -> Self {
        match checkpoint {
            Some(since_id) => Cursor::Forward {
                since_id,
                max_id: None,
            },
            None => Cursor::Backward { max_id: None },
        }
    }

    pub fn mode(&self) -> FetchMode {
        match self {
            Cursor::Backward { .. } => FetchMode::Backward,
            Cursor::Forward { .. } => FetchMode::Forward,
        }
    }

    /// Cursor for the page after `page`.
    pub fn advance(&self, page: &[Item]) -> Step {
        let Some(oldest) = page.iter().map(|i| i.id).min() else {
            return Step::Done;
        };
        let (floor, max_id) = match *self {
            Cursor::Backward { max_id } => (0, max_id),
            Cursor::Forward { since_id, max_id } => (since_id, max_id),
        };

        let next = oldest.saturating_sub(1);
        if next <= floor {
            return Step::Done;
        }
        if max_id.is_some_and(|m| next >= m) {
            return Step::Stalled;
        }

        Step::Next(match *self {
            Cursor::Backward { .. } => Cursor::Backward { max_id: Some(next) },
            Cursor::Forward { since_id, .. } => Cursor::Forward {
                since_id,
                max_id: Some(next),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Backward,
    Forward,
}

impl FetchMode {
    pub fn as_str(&self) -> &str {
        match self {
            FetchMode::Backward => "backward",
            FetchMode::Forward => "forward",
        }
    }
}

/// Summary of one sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: FetchMode,
    pub pages_fetched: usize,
    pub items_fetched: usize,
    pub items_stored: usize,
    pub previous_checkpoint: Option<u64>,
    pub new_checkpoint: Option<u64>,
    /// The page limit stopped a forward walk before it reached the checkpoint.
    pub truncated: bool,
}
