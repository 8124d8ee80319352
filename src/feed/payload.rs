//! Raw item document as served by the feed
//!
//! The feed omits fields instead of sending `null`, so everything except the
//! id is optional and defaults when absent.

use crate::ItemId;
use serde::Deserialize;

/// One item document, before classification
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawItem {
    /// Item id
    pub id: ItemId,
    /// Declared kind (`story`, `comment`, ...)
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Author handle
    #[serde(default)]
    pub by: Option<String>,
    /// Creation time, seconds since the epoch
    #[serde(default)]
    pub time: Option<i64>,
    /// Child ids
    #[serde(default)]
    pub kids: Option<Vec<ItemId>>,
    /// Story/poll/job title
    #[serde(default)]
    pub title: Option<String>,
    /// Story link
    #[serde(default)]
    pub url: Option<String>,
    /// Score
    #[serde(default)]
    pub score: Option<i64>,
    /// Comment count
    #[serde(default)]
    pub descendants: Option<i64>,
    /// Body text
    #[serde(default)]
    pub text: Option<String>,
    /// Dead flag
    #[serde(default)]
    pub dead: Option<bool>,
    /// Deleted flag
    #[serde(default)]
    pub deleted: Option<bool>,
    /// Parent id (comments)
    #[serde(default)]
    pub parent: Option<ItemId>,
    /// Owning poll id (poll options)
    #[serde(default)]
    pub poll: Option<ItemId>,
    /// Poll option ids (polls); accepted and not stored
    #[serde(default)]
    pub parts: Option<Vec<ItemId>>,
}
