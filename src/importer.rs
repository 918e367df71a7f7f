//! Typed subset of the Trello board export schema.
//!
//! A board export (`Menu → More → Print and export → Export as JSON`) is one
//! large JSON object. The only part this tool reads is the action log:
//!
//! ```json
//! {
//!   "name": "My Board",
//!   "actions": [
//!     {
//!       "id": "64a1b2c3d4e5f60708091011",
//!       "type": "commentCard",
//!       "date": "2023-05-01T12:34:56.000Z",
//!       "data": {
//!         "card": { "name": "Reading Habits" },
//!         "text": "Comment body in Markdown."
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Every other action type (card moves, label changes, …) carries the same
//! envelope with different `data` contents; unknown fields are ignored and
//! non-comment actions are skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;

const COMMENT_ACTION: &str = "commentCard";

#[derive(Debug, Deserialize)]
pub struct BoardExport {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub card: Option<CardRef>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CardRef {
    pub name: String,
}

/// One card comment, borrowed from the export it came from.
#[derive(Debug, Clone, Copy)]
pub struct Comment<'a> {
    pub id: &'a str,
    pub card_name: &'a str,
    pub text: &'a str,
    pub date: DateTime<Utc>,
}

impl BoardExport {
    /// All `commentCard` actions, in export order. Comments missing a card
    /// reference or a body (deleted cards leave such stubs) are skipped.
    pub fn comments(&self) -> impl Iterator<Item = Comment<'_>> {
        self.actions.iter().filter_map(|action| {
            if action.action_type != COMMENT_ACTION {
                return None;
            }
            let card = action.data.card.as_ref()?;
            let text = action.data.text.as_deref()?;
            Some(Comment {
                id: &action.id,
                card_name: &card.name,
                text,
                date: action.date,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "name": "Test Board",
        "idOrganization": "abc",
        "actions": [
            {
                "id": "64a1b2c3d4e5f60708091011",
                "type": "commentCard",
                "date": "2023-05-01T12:34:56.000Z",
                "data": {
                    "card": { "name": "Reading Habits", "id": "c1" },
                    "text": "Comment body."
                }
            },
            {
                "id": "64a1b2c3d4e5f60708091012",
                "type": "updateCard",
                "date": "2023-05-02T08:00:00.000Z",
                "data": {
                    "card": { "name": "Reading Habits", "id": "c1" }
                }
            }
        ]
    }"#;

    #[test]
    fn only_comment_actions_are_yielded() {
        let board: BoardExport = serde_json::from_str(EXPORT).unwrap();
        let comments: Vec<_> = board.comments().collect();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].card_name, "Reading Habits");
        assert_eq!(comments[0].text, "Comment body.");
        assert_eq!(comments[0].date.to_rfc3339(), "2023-05-01T12:34:56+00:00");
    }

    #[test]
    fn actions_are_optional() {
        let board: BoardExport = serde_json::from_str(r#"{"name": "Empty"}"#).unwrap();
        assert_eq!(board.comments().count(), 0);
    }
}
