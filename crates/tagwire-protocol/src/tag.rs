//! The message tag: dispatch key and reply flag in one byte.

use serde::{Deserialize, Serialize};

use std::fmt;

/// The one-byte type tag carried by every frame.
///
/// This is a "newtype wrapper" around `u8`. The byte does two jobs at once:
///
/// 1. **Dispatch key**: consumers match on it to decide what a message
///    means, and typed streams look it up in the [`Registry`](crate::Registry).
/// 2. **Reply flag**: tags `0..=127` are fire-and-forget, tags `128..=255`
///    require a reply. The split sits exactly at the midpoint of the tag
///    space.
///
/// `#[serde(transparent)]` makes a `Tag(7)` serialize as just `7`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Tag(u8);

impl Tag {
    /// Highest tag that does NOT require a reply.
    pub const REPLY_THRESHOLD: u8 = 127;

    /// Creates a tag from its raw byte.
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw byte as written on the wire.
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Returns `true` if a message with this tag expects a reply.
    pub const fn requires_reply(self) -> bool {
        self.0 > Self::REPLY_THRESHOLD
    }
}

impl From<u8> for Tag {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
