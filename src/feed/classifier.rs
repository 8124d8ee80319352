//! Payload classification
//!
//! Maps a raw document onto an [`Entity`] variant by its declared kind.
//! Stories, polls and jobs share one field set and become [`Story`].

use chrono::{DateTime, Utc};

use crate::feed::RawItem;
use crate::{Comment, Entity, ItemHeader, ItemId, ItemKind, PollOption, Story};

/// Payload whose declared kind is not one the pipeline persists
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized item kind '{kind}' for id {id}")]
pub struct UnrecognizedKind {
    /// Item id
    pub id: ItemId,
    /// Declared kind, empty when the payload had none
    pub kind: String,
}

/// Classify a raw payload received at `fetched_at`.
///
/// Absent fields take their defaults: empty text, zero scores, false flags
/// and no children.
pub fn classify(raw: RawItem, fetched_at: DateTime<Utc>) -> Result<Entity, UnrecognizedKind> {
    let declared = raw.kind.clone().unwrap_or_default();
    let kind: ItemKind = declared.parse().map_err(|_| UnrecognizedKind {
        id: raw.id,
        kind: declared,
    })?;

    let header = ItemHeader {
        id: raw.id,
        kind,
        author: raw.by,
        created_at: raw
            .time
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_default(),
        children: raw.kids.unwrap_or_default(),
        fetched_at,
    };

    let text = raw.text.unwrap_or_default();
    let dead = raw.dead.unwrap_or(false);
    let deleted = raw.deleted.unwrap_or(false);

    let entity = match kind {
        ItemKind::Story | ItemKind::Poll | ItemKind::Job => Entity::Story(Story {
            header,
            title: raw.title.unwrap_or_default(),
            url: raw.url,
            score: raw.score.unwrap_or(0),
            descendants: raw.descendants.unwrap_or(0),
            text,
            dead,
            deleted,
        }),
        ItemKind::Comment => Entity::Comment(Comment {
            header,
            parent: raw.parent.unwrap_or(0),
            text,
            dead,
            deleted,
        }),
        ItemKind::PollOpt => Entity::PollOption(PollOption {
            header: ItemHeader {
                children: Vec::new(),
                ..header
            },
            poll: raw.poll.unwrap_or(0),
            score: raw.score.unwrap_or(0),
            text,
            dead,
            deleted,
        }),
    };

    Ok(entity)
}
