//! Record types: what the registry stores about each player, and the
//! knobs that bound it.

use plaza_protocol::{IdentityKey, PlayerId, Position};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Inclusive rectangle new players are spawned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnArea {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl SpawnArea {
    /// Returns the same area with any inverted bounds swapped.
    pub fn normalized(self) -> Self {
        Self {
            min_x: self.min_x.min(self.max_x),
            max_x: self.min_x.max(self.max_x),
            min_y: self.min_y.min(self.max_y),
            max_y: self.min_y.max(self.max_y),
        }
    }

    /// Returns `true` if `pos` lies inside the area, edges included.
    pub fn contains(&self, pos: Position) -> bool {
        (self.min_x..=self.max_x).contains(&pos.x)
            && (self.min_y..=self.max_y).contains(&pos.y)
    }
}

impl Default for SpawnArea {
    /// A 300×300 square inset 100 units into a 500×500 window.
    fn default() -> Self {
        Self {
            min_x: 100,
            max_x: 400,
            min_y: 100,
            max_y: 400,
        }
    }
}

/// Configuration for the player registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of distinct identities ever admitted.
    pub capacity: usize,

    /// Stored tags are cut to this many bytes (on a char boundary).
    pub max_tag_len: usize,

    /// Stored avatars are cropped to at most this width and height.
    pub max_avatar_dim: u32,

    /// Where new players appear.
    pub spawn_area: SpawnArea,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            max_tag_len: 31,
            max_avatar_dim: 8,
            spawn_area: SpawnArea::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Avatar
// ---------------------------------------------------------------------------

/// An RGBA pixel buffer.
///
/// Invariant: `rgba.len() == width * height * 4`. Only the registry
/// constructs non-empty avatars, through
/// [`normalize_to_rgba`](crate::normalize_to_rgba).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Avatar {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) rgba: Vec<u8>,
}

impl Avatar {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA bytes.
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Returns `true` if no avatar has been submitted yet.
    pub fn is_empty(&self) -> bool {
        self.rgba.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// Everything the server knows about one player.
///
/// Records handed out by the registry are copies. Mutating one changes
/// nothing in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    /// Lookup key, fixed at creation.
    pub identity_key: IdentityKey,

    /// Assigned at creation, never reused.
    pub player_id: PlayerId,

    /// Display label, already truncated to the configured length.
    pub tag: String,

    /// Spawn coordinate, fixed at creation.
    pub position: Position,

    /// Latest avatar, always RGBA.
    pub avatar: Avatar,

    /// `true` while a registered session for this identity is open.
    pub connected: bool,

    /// Set whenever `avatar` is replaced; cleared by the presentation
    /// side once it has picked the new pixels up.
    pub presentation_dirty: bool,
}

impl PlayerRecord {
    pub(crate) fn new(
        identity_key: IdentityKey,
        player_id: PlayerId,
        position: Position,
    ) -> Self {
        Self {
            identity_key,
            player_id,
            tag: String::new(),
            position,
            avatar: Avatar::default(),
            connected: false,
            presentation_dirty: false,
        }
    }
}

/// Cuts `tag` to at most `max_len` bytes without splitting a character.
pub(crate) fn truncate_tag(tag: &str, max_len: usize) -> &str {
    if tag.len() <= max_len {
        return tag;
    }
    let mut end = max_len;
    while !tag.is_char_boundary(end) {
        end -= 1;
    }
    &tag[..end]
}
