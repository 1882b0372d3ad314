//! The player registry: the authoritative table of every player the
//! server has ever admitted.
//!
//! # Concurrency note
//!
//! Unlike a plain map owned by one task, `PlayerRegistry` is internally
//! synchronized: every operation takes the table lock, does a bounded
//! amount of in-memory work, and releases it before returning. No
//! operation awaits or performs I/O while holding the lock, so it is safe
//! to call from the reactor task and from a rendering thread alike.
//! Callers only ever receive copies of records.
//!
//! Avatar conversion and tag truncation happen *before* the lock is taken.
//! A failed allocation therefore never leaves a half-updated record.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use plaza_protocol::{IdentityKey, PixelFormat, PlayerId, Position};
use rand::Rng;

use crate::record::truncate_tag;
use crate::{
    PlayerRecord, RegistryConfig, RegistryError, SpawnArea, normalize_to_rgba,
};

/// Table contents guarded by the registry lock.
///
/// `records` is append-only and ordered by creation, which is also
/// `player_id` order. `index` maps each identity to its slot in
/// `records`; the two are only ever updated together.
struct PlayerTable {
    records: Vec<PlayerRecord>,
    index: HashMap<IdentityKey, usize>,
    next_player_id: u32,
}

/// Concurrent, capacity-bounded table of player records.
///
/// ## Lifecycle
///
/// ```text
/// ensure() ──→ commit_registration() ──→ mark_disconnected()
///    │                  ▲                        │
///    ▼                  └────────────────────────┘
/// [created]       re-registration from the same identity
/// ```
///
/// Records are never removed. A returning identity gets its old
/// `player_id` and `position` back.
pub struct PlayerRegistry {
    table: Mutex<PlayerTable>,
    config: RegistryConfig,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        let spawn_area = config.spawn_area.normalized();
        if spawn_area != config.spawn_area {
            tracing::warn!(?spawn_area, "spawn area bounds were inverted");
        }
        Self {
            table: Mutex::new(PlayerTable {
                records: Vec::new(),
                index: HashMap::new(),
                next_player_id: 1,
            }),
            config: RegistryConfig {
                spawn_area,
                ..config
            },
        }
    }

    /// Acquires the table lock.
    ///
    /// Every mutation completes before the guard is dropped, so a panic
    /// elsewhere can't leave a torn record; poisoning is ignored.
    fn table(&self) -> MutexGuard<'_, PlayerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up the record for `identity`.
    pub fn find(&self, identity: IdentityKey) -> Option<PlayerRecord> {
        let table = self.table();
        table
            .index
            .get(&identity)
            .map(|&slot| table.records[slot].clone())
    }

    /// Returns the record for `identity`, creating it if needed.
    ///
    /// A new record gets the next `player_id`, a random position inside
    /// the spawn area, an empty tag and avatar, and `connected = false`.
    ///
    /// # Errors
    /// [`RegistryError::CapacityExceeded`] if `identity` is new and the
    /// table is full. Nothing is created in that case.
    pub fn ensure(
        &self,
        identity: IdentityKey,
    ) -> Result<PlayerRecord, RegistryError> {
        let mut table = self.table();
        if let Some(&slot) = table.index.get(&identity) {
            return Ok(table.records[slot].clone());
        }

        let capacity = self.config.capacity;
        if table.records.len() >= capacity {
            tracing::warn!(%identity, capacity, "registry full, rejecting");
            return Err(RegistryError::CapacityExceeded { capacity });
        }
        let player_id = PlayerId(table.next_player_id);
        let next = table
            .next_player_id
            .checked_add(1)
            .ok_or(RegistryError::CapacityExceeded { capacity })?;

        // Append at the current length, then advance the counter.
        let slot = table.records.len();
        let position = random_position(&self.config.spawn_area);
        let record = PlayerRecord::new(identity, player_id, position);
        table.records.push(record.clone());
        table.index.insert(identity, slot);
        table.next_player_id = next;

        tracing::info!(%identity, %player_id, %position, "player created");
        Ok(record)
    }

    /// Stores a new tag and avatar for an existing player and marks them
    /// connected.
    ///
    /// The avatar is normalized to RGBA and cropped to the configured
    /// maximum dimension; the tag is cut to the configured maximum length.
    /// `presentation_dirty` is set so the renderer picks up the new
    /// pixels.
    ///
    /// # Errors
    /// - [`RegistryError::AvatarSizeMismatch`]: `pixels` doesn't match
    ///   `width * height * format.channels()`.
    /// - [`RegistryError::ResourceExhaustion`]: the RGBA buffer couldn't
    ///   be allocated.
    /// - [`RegistryError::NotFound`]: [`ensure`](Self::ensure) was never
    ///   called for `identity`.
    ///
    /// In every error case the stored record is left untouched.
    pub fn commit_registration(
        &self,
        identity: IdentityKey,
        tag: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<PlayerRecord, RegistryError> {
        let avatar = normalize_to_rgba(
            pixels,
            width,
            height,
            format,
            self.config.max_avatar_dim,
        )?;
        let tag = truncate_tag(tag, self.config.max_tag_len).to_owned();

        let mut table = self.table();
        let slot = *table
            .index
            .get(&identity)
            .ok_or(RegistryError::NotFound(identity))?;
        let record = &mut table.records[slot];
        record.tag = tag;
        record.avatar = avatar;
        record.connected = true;
        record.presentation_dirty = true;

        tracing::info!(
            %identity,
            player_id = %record.player_id,
            tag = %record.tag,
            "player registered"
        );
        Ok(record.clone())
    }

    /// Marks `identity` as no longer connected.
    ///
    /// Returns `false` (and does nothing) if there is no such record.
    pub fn mark_disconnected(&self, identity: IdentityKey) -> bool {
        let mut table = self.table();
        let Some(&slot) = table.index.get(&identity) else {
            return false;
        };
        let record = &mut table.records[slot];
        if record.connected {
            record.connected = false;
            tracing::info!(
                %identity,
                player_id = %record.player_id,
                "player disconnected"
            );
        }
        true
    }

    /// Clears `presentation_dirty` for `identity`.
    ///
    /// Called by the presentation side once it has consumed the avatar.
    /// Returns the previous value of the flag.
    pub fn clear_presentation_dirty(&self, identity: IdentityKey) -> bool {
        let mut table = self.table();
        let Some(&slot) = table.index.get(&identity) else {
            return false;
        };
        std::mem::replace(&mut table.records[slot].presentation_dirty, false)
    }

    /// Returns a copy of every record whose avatar changed since the last
    /// call, clearing their `presentation_dirty` flags in the same
    /// critical section.
    ///
    /// A commit that lands after this returns sets the flag again, so the
    /// next call reports it. The returned copies still have
    /// `presentation_dirty == true`.
    pub fn take_presentation_updates(&self) -> Vec<PlayerRecord> {
        let mut table = self.table();
        table
            .records
            .iter_mut()
            .filter(|record| record.presentation_dirty)
            .map(|record| {
                let update = record.clone();
                record.presentation_dirty = false;
                update
            })
            .collect()
    }

    /// Point-in-time copy of every record, in creation order.
    pub fn snapshot_all(&self) -> Vec<PlayerRecord> {
        self.table().records.clone()
    }

    /// Number of records in the table.
    pub fn len(&self) -> usize {
        self.table().records.len()
    }

    /// Returns `true` if no player was ever created.
    pub fn is_empty(&self) -> bool {
        self.table().records.is_empty()
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

fn random_position(area: &SpawnArea) -> Position {
    let mut rng = rand::rng();
    Position {
        x: rng.random_range(area.min_x..=area.max_x),
        y: rng.random_range(area.min_y..=area.max_y),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `PlayerRegistry`.
    //!
    //! Naming follows `test_{function}_{scenario}_{expected}`.

    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn registry_with_capacity(capacity: usize) -> PlayerRegistry {
        PlayerRegistry::new(RegistryConfig {
            capacity,
            ..RegistryConfig::default()
        })
    }

    /// Identity for host `10.0.0.n`.
    fn ident(n: u8) -> IdentityKey {
        IdentityKey::from(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
    }

    /// Runs the full ensure + commit sequence with a 1x1 gray avatar.
    fn register(reg: &PlayerRegistry, who: IdentityKey) -> PlayerRecord {
        reg.ensure(who).expect("ensure");
        reg.commit_registration(who, "p", &[0], 1, 1, PixelFormat::Gray)
            .expect("commit")
    }

    // =====================================================================
    // ensure()
    // =====================================================================

    #[test]
    fn test_ensure_new_identity_creates_record() {
        let reg = registry_with_capacity(4);

        let record = reg.ensure(ident(1)).expect("should create");

        assert_eq!(record.player_id, PlayerId(1));
        assert_eq!(record.identity_key, ident(1));
        assert!(record.tag.is_empty());
        assert!(record.avatar.is_empty());
        assert!(!record.connected);
        assert!(!record.presentation_dirty);
        assert!(SpawnArea::default().contains(record.position));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_ensure_existing_identity_returns_same_record() {
        let reg = registry_with_capacity(4);
        let first = reg.ensure(ident(1)).unwrap();

        let second = reg.ensure(ident(1)).unwrap();

        assert_eq!(first, second);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_ensure_ids_strictly_increase() {
        let reg = registry_with_capacity(8);

        let ids: Vec<u32> = (1..=5)
            .map(|n| reg.ensure(ident(n)).unwrap().player_id.0)
            .collect();

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ensure_at_capacity_rejects_and_leaves_table_unchanged() {
        let reg = registry_with_capacity(2);
        register(&reg, ident(1));
        register(&reg, ident(2));
        let before = reg.snapshot_all();

        let result = reg.ensure(ident(3));

        assert!(matches!(
            result,
            Err(RegistryError::CapacityExceeded { capacity: 2 })
        ));
        assert_eq!(reg.snapshot_all(), before);
        assert!(reg.find(ident(3)).is_none());
    }

    #[test]
    fn test_ensure_at_capacity_still_returns_known_identity() {
        let reg = registry_with_capacity(1);
        let original = reg.ensure(ident(1)).unwrap();

        let again = reg.ensure(ident(1)).expect("known identity is fine");

        assert_eq!(again.player_id, original.player_id);
    }

    #[test]
    fn test_ensure_single_point_spawn_area() {
        let reg = PlayerRegistry::new(RegistryConfig {
            spawn_area: SpawnArea {
                min_x: 7,
                max_x: 7,
                min_y: -3,
                max_y: -3,
            },
            ..RegistryConfig::default()
        });

        let record = reg.ensure(ident(1)).unwrap();

        assert_eq!(record.position, Position { x: 7, y: -3 });
    }

    // =====================================================================
    // commit_registration()
    // =====================================================================

    #[test]
    fn test_commit_registration_sets_fields() {
        let reg = registry_with_capacity(4);
        reg.ensure(ident(1)).unwrap();

        let record = reg
            .commit_registration(
                ident(1),
                "alice",
                &[10, 20, 30],
                1,
                1,
                PixelFormat::Rgb,
            )
            .expect("should commit");

        assert_eq!(record.tag, "alice");
        assert_eq!(record.avatar.rgba(), &[10, 20, 30, 255]);
        assert!(record.connected);
        assert!(record.presentation_dirty);
        assert_eq!(reg.find(ident(1)), Some(record));
    }

    #[test]
    fn test_commit_registration_grayscale_pixel() {
        let reg = registry_with_capacity(4);
        reg.ensure(ident(1)).unwrap();

        let record = reg
            .commit_registration(ident(1), "g", &[200], 1, 1, PixelFormat::Gray)
            .unwrap();

        assert_eq!(record.avatar.rgba(), &[200, 200, 200, 255]);
    }

    #[test]
    fn test_commit_registration_truncates_long_tag() {
        let reg = registry_with_capacity(4);
        reg.ensure(ident(1)).unwrap();
        let long = "x".repeat(100);

        let record = reg
            .commit_registration(ident(1), &long, &[0], 1, 1, PixelFormat::Gray)
            .unwrap();

        assert_eq!(record.tag.len(), 31);
    }

    #[test]
    fn test_commit_registration_crops_oversized_avatar() {
        let reg = PlayerRegistry::new(RegistryConfig {
            max_avatar_dim: 2,
            ..RegistryConfig::default()
        });
        reg.ensure(ident(1)).unwrap();

        let record = reg
            .commit_registration(
                ident(1),
                "big",
                &[0; 16],
                4,
                4,
                PixelFormat::Gray,
            )
            .unwrap();

        assert_eq!(record.avatar.width(), 2);
        assert_eq!(record.avatar.height(), 2);
        assert_eq!(record.avatar.rgba().len(), 2 * 2 * 4);
    }

    #[test]
    fn test_commit_registration_unknown_identity_returns_not_found() {
        let reg = registry_with_capacity(4);

        let result = reg.commit_registration(
            ident(9),
            "ghost",
            &[0],
            1,
            1,
            PixelFormat::Gray,
        );

        assert!(matches!(result, Err(RegistryError::NotFound(k)) if k == ident(9)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_commit_registration_bad_buffer_leaves_record_untouched() {
        let reg = registry_with_capacity(4);
        let before = register(&reg, ident(1));

        let result = reg.commit_registration(
            ident(1),
            "new tag",
            &[1, 2],
            1,
            1,
            PixelFormat::Rgba,
        );

        assert!(matches!(
            result,
            Err(RegistryError::AvatarSizeMismatch { .. })
        ));
        assert_eq!(reg.find(ident(1)), Some(before));
    }

    #[test]
    fn test_commit_registration_replaces_avatar_wholesale() {
        let reg = registry_with_capacity(4);
        reg.ensure(ident(1)).unwrap();
        reg.commit_registration(
            ident(1),
            "a",
            &[1; 16],
            2,
            2,
            PixelFormat::Rgba,
        )
        .unwrap();

        let record = reg
            .commit_registration(ident(1), "a", &[5], 1, 1, PixelFormat::Gray)
            .unwrap();

        assert_eq!(record.avatar.rgba(), &[5, 5, 5, 255]);
    }

    // =====================================================================
    // mark_disconnected() / reconnection
    // =====================================================================

    #[test]
    fn test_mark_disconnected_clears_flag_keeps_record() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(1));

        assert!(reg.mark_disconnected(ident(1)));

        let record = reg.find(ident(1)).expect("record survives");
        assert!(!record.connected);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_mark_disconnected_unknown_identity_is_noop() {
        let reg = registry_with_capacity(4);

        assert!(!reg.mark_disconnected(ident(1)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_reconnect_keeps_id_and_position() {
        let reg = registry_with_capacity(4);
        let first = register(&reg, ident(1));
        register(&reg, ident(2));
        reg.mark_disconnected(ident(1));

        let again = register(&reg, ident(1));

        assert_eq!(again.player_id, first.player_id);
        assert_eq!(again.position, first.position);
        assert!(again.connected);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_disconnect() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(1));
        reg.mark_disconnected(ident(1));

        let newcomer = register(&reg, ident(2));

        assert_eq!(newcomer.player_id, PlayerId(2));
    }

    // =====================================================================
    // presentation contract
    // =====================================================================

    #[test]
    fn test_clear_presentation_dirty_returns_previous_value() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(1));

        assert!(reg.clear_presentation_dirty(ident(1)));
        assert!(!reg.clear_presentation_dirty(ident(1)));
        assert!(!reg.find(ident(1)).unwrap().presentation_dirty);
    }

    #[test]
    fn test_take_presentation_updates_returns_only_dirty_records() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(1));
        reg.ensure(ident(2)).unwrap();
        register(&reg, ident(3));

        let updates = reg.take_presentation_updates();

        let ids: Vec<PlayerId> = updates.iter().map(|r| r.player_id).collect();
        assert_eq!(ids, vec![PlayerId(1), PlayerId(3)]);
        assert!(updates.iter().all(|r| r.presentation_dirty));
        assert!(reg.snapshot_all().iter().all(|r| !r.presentation_dirty));
        assert!(reg.take_presentation_updates().is_empty());
    }

    #[test]
    fn test_take_presentation_updates_commit_after_take_is_reported_next() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(1));
        let first = reg.take_presentation_updates();

        reg.commit_registration(ident(1), "p", &[9], 1, 1, PixelFormat::Gray)
            .unwrap();

        let second = reg.take_presentation_updates();
        assert_eq!(first[0].avatar.rgba(), &[0, 0, 0, 255]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].avatar.rgba(), &[9, 9, 9, 255]);
    }

    #[test]
    fn test_take_presentation_updates_never_loses_latest_avatar() {
        // A writer thread keeps replacing the avatar while the reader
        // keeps taking updates. Whatever interleaving happens, the last
        // avatar the reader sees must be the last one committed.
        const LAST: u8 = 200;
        let reg = Arc::new(registry_with_capacity(4));
        reg.ensure(ident(1)).unwrap();

        let writer = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || {
                for value in 1..=LAST {
                    reg.commit_registration(
                        ident(1),
                        "w",
                        &[value],
                        1,
                        1,
                        PixelFormat::Gray,
                    )
                    .unwrap();
                    if value % 16 == 0 {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut seen = None;
        while !writer.is_finished() {
            if let Some(update) = reg.take_presentation_updates().pop() {
                seen = Some(update.avatar.rgba()[0]);
            }
        }
        writer.join().unwrap();
        if let Some(update) = reg.take_presentation_updates().pop() {
            seen = Some(update.avatar.rgba()[0]);
        }

        assert_eq!(seen, Some(LAST));
        assert!(!reg.find(ident(1)).unwrap().presentation_dirty);
    }

    #[test]
    fn test_snapshot_all_is_ordered_and_detached() {
        let reg = registry_with_capacity(4);
        register(&reg, ident(3));
        register(&reg, ident(1));

        let mut snapshot = reg.snapshot_all();
        snapshot[0].tag = "changed".into();

        let ids: Vec<PlayerId> =
            snapshot.iter().map(|r| r.player_id).collect();
        assert_eq!(ids, vec![PlayerId(1), PlayerId(2)]);
        assert_eq!(reg.find(ident(3)).unwrap().tag, "p");
    }

    // =====================================================================
    // Concurrency
    // =====================================================================

    #[test]
    fn test_concurrent_registrations_get_distinct_ids() {
        // Many threads race ensure + commit with random pauses between
        // the two calls. Every identity must end up with exactly one
        // record and the ids must be exactly 1..=N.
        const N: u8 = 32;
        let reg = Arc::new(registry_with_capacity(N as usize));

        let handles: Vec<_> = (1..=N)
            .map(|n| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let pause = rand::rng().random_range(0..500);
                    std::thread::sleep(Duration::from_micros(pause));
                    reg.ensure(ident(n)).unwrap();
                    std::thread::sleep(Duration::from_micros(pause / 2));
                    reg.commit_registration(
                        ident(n),
                        "racer",
                        &[n; 3],
                        1,
                        1,
                        PixelFormat::Rgb,
                    )
                    .unwrap()
                })
            })
            .collect();
        let records: Vec<PlayerRecord> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let ids: HashSet<u32> =
            records.iter().map(|r| r.player_id.0).collect();
        assert_eq!(ids, (1..=N as u32).collect());
        for record in &records {
            let n = match record.identity_key.ip() {
                IpAddr::V4(v4) => v4.octets()[3],
                IpAddr::V6(_) => unreachable!(),
            };
            assert_eq!(record.avatar.rgba(), &[n, n, n, 255]);
        }
        assert_eq!(reg.len(), N as usize);
    }

    #[test]
    fn test_concurrent_ensure_same_identity_creates_one_record() {
        let reg = Arc::new(registry_with_capacity(4));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.ensure(ident(1)).unwrap())
            })
            .collect();
        let ids: HashSet<PlayerId> = handles
            .into_iter()
            .map(|h| h.join().unwrap().player_id)
            .collect();

        assert_eq!(ids.len(), 1);
        assert_eq!(reg.len(), 1);
    }
}
