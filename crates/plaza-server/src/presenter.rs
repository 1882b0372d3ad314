//! Headless stand-in for the renderer.
//!
//! Reads the registry the way a real display would: take every avatar
//! that changed since the last look, clearing the dirty flags in the same
//! step. Instead of drawing, it logs.

use std::sync::Arc;
use std::time::Duration;

use plaza::PlayerRegistry;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

/// Consumes every dirty avatar once. Returns how many were refreshed.
pub fn present(registry: &PlayerRegistry) -> usize {
    let updates = registry.take_presentation_updates();
    for player in &updates {
        tracing::info!(
            player_id = %player.player_id,
            tag = %player.tag,
            position = %player.position,
            width = player.avatar.width(),
            height = player.avatar.height(),
            connected = player.connected,
            "avatar refreshed"
        );
    }
    updates.len()
}

/// Calls [`present`] every `every` until `stop` flips to `true` or its
/// sender goes away.
pub async fn run(
    registry: Arc<PlayerRegistry>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                if present(&registry) > 0 {
                    let players = registry.snapshot_all();
                    let online = players.iter().filter(|p| p.connected).count();
                    tracing::debug!(total = players.len(), online, "plaza state");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use plaza::prelude::*;

    use super::*;

    fn ident(n: u8) -> IdentityKey {
        IdentityKey::from(IpAddr::V4(Ipv4Addr::new(10, 1, 0, n)))
    }

    fn registered(registry: &PlayerRegistry, n: u8) {
        registry.ensure(ident(n)).unwrap();
        registry
            .commit_registration(ident(n), "p", &[n], 1, 1, PixelFormat::Gray)
            .unwrap();
    }

    #[test]
    fn test_present_consumes_each_update_once() {
        let registry = PlayerRegistry::new(RegistryConfig::default());
        registered(&registry, 1);
        registered(&registry, 2);

        assert_eq!(present(&registry), 2);
        assert_eq!(present(&registry), 0);
        assert!(
            registry
                .snapshot_all()
                .iter()
                .all(|p| !p.presentation_dirty)
        );
    }

    #[test]
    fn test_present_picks_up_re_registration() {
        let registry = PlayerRegistry::new(RegistryConfig::default());
        registered(&registry, 1);
        present(&registry);

        registered(&registry, 1);

        assert_eq!(present(&registry), 1);
    }

    #[test]
    fn test_present_reports_commit_made_after_previous_pass() {
        let registry = PlayerRegistry::new(RegistryConfig::default());
        registered(&registry, 1);
        registry
            .commit_registration(ident(1), "p", &[42], 1, 1, PixelFormat::Gray)
            .unwrap();

        assert_eq!(present(&registry), 1);
        registry
            .commit_registration(ident(1), "p", &[43], 1, 1, PixelFormat::Gray)
            .unwrap();

        assert_eq!(present(&registry), 1);
        assert_eq!(
            registry.find(ident(1)).unwrap().avatar.rgba(),
            &[43, 43, 43, 255]
        );
        assert_eq!(present(&registry), 0);
    }

    #[test]
    fn test_present_skips_players_without_avatar() {
        let registry = PlayerRegistry::new(RegistryConfig::default());
        registry.ensure(ident(1)).unwrap();

        assert_eq!(present(&registry), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let registry = Arc::new(PlayerRegistry::new(RegistryConfig::default()));
        registered(&registry, 1);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            Arc::clone(&registry),
            Duration::from_millis(10),
            stop_rx,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send_replace(true);

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("presenter should stop")
            .unwrap();
        assert!(!registry.find(ident(1)).unwrap().presentation_dirty);
    }
}
