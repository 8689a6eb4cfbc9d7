use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};

use crate::audio::queue::MusicQueue;
use crate::audio::track::{TrackId, TrackRef};
use crate::sources::TrackResolver;

type PendingResolution = Shared<BoxFuture<'static, bool>>;

/// Mantiene resueltas las próximas canciones de una sesión.
///
/// Each track has at most one resolution in flight. Later callers attach
/// to the shared future instead of calling the provider again, and the
/// registry entry is removed by whichever caller drives it to completion.
pub struct Prefetcher {
    resolver: Arc<dyn TrackResolver>,
    pending: Arc<Mutex<HashMap<TrackId, PendingResolution>>>,
    window: usize,
}

impl Prefetcher {
    pub const MAX_WINDOW: usize = 25;

    pub fn new(resolver: Arc<dyn TrackResolver>, window: usize) -> Self {
        Self {
            resolver,
            pending: Arc::new(Mutex::new(HashMap::new())),
            window: window.min(Self::MAX_WINDOW),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn TrackResolver> {
        &self.resolver
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// `true` si el track quedó listo para reproducir.
    pub async fn ensure_resolved(&self, track: &TrackRef) -> bool {
        if track.is_prepared() {
            return true;
        }

        let work = {
            let mut registry = self.pending.lock();
            match registry.get(&track.id()) {
                Some(existing) => existing.clone(),
                None => {
                    // Pudo completarse entre la primera comprobación y el lock
                    if track.is_prepared() {
                        return true;
                    }
                    track.begin_resolution();
                    let work = resolve(self.resolver.clone(), self.pending.clone(), track.clone())
                        .boxed()
                        .shared();
                    registry.insert(track.id(), work.clone());
                    work
                }
            }
        };

        work.await
    }

    /// Resuelve la ventana de la cola y quita lo que no se puede reproducir.
    ///
    /// A second pass backfills the window when anything was removed.
    /// Returns how many tracks were dropped.
    pub async fn warm_queue(&self, queue: &Mutex<MusicQueue>) -> usize {
        let mut removed = 0;

        for pass in 1..=2 {
            let upcoming = queue.lock().upcoming(self.window);
            let mut dropped_any = false;

            for track in upcoming {
                if self.ensure_resolved(&track).await {
                    continue;
                }
                if queue.lock().remove_track(track.id()).is_some() {
                    info!("🗑️ Quitado de la cola, no se pudo resolver: {}", track.display_title());
                    removed += 1;
                    dropped_any = true;
                }
            }

            if !dropped_any {
                break;
            }
            debug!("🔄 Pasada {} de precarga eliminó tracks, rellenando ventana", pass);
        }

        removed
    }
}

async fn resolve(
    resolver: Arc<dyn TrackResolver>,
    pending: Arc<Mutex<HashMap<TrackId, PendingResolution>>>,
    track: TrackRef,
) -> bool {
    let resolved = match resolver.resolve(&track).await {
        Ok(resolved) => {
            track.complete(resolved);
            debug!("✅ Resuelto {}: {}", track.id(), track.display_title());
            true
        }
        Err(e) if e.expected => {
            info!("🚫 No reproducible {}: {}", track.locator(), e);
            track.fail();
            false
        }
        Err(e) => {
            warn!("⚠️ Error resolviendo {}: {}", track.locator(), e);
            track.fail();
            false
        }
    };

    pending.lock().remove(&track.id());
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeResolver;
    use crate::audio::track::{Origin, ResolutionState, ResolvedTrack, SiteKind, Track};
    use crate::error::ResolveError;
    use crate::sources::MockTrackResolver;

    fn track(locator: &str) -> TrackRef {
        Track::new(locator, Origin::Direct, SiteKind::Unknown).into_ref()
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_provider_call() {
        let (resolver, gate) = FakeResolver::gated();
        let prefetcher = Prefetcher::new(resolver.clone(), 5);
        let song = track("song");

        let release = async {
            tokio::task::yield_now().await;
            gate.add_permits(1);
        };
        let (first, second, ()) = tokio::join!(
            prefetcher.ensure_resolved(&song),
            prefetcher.ensure_resolved(&song),
            release
        );

        assert!(first && second);
        assert_eq!(resolver.calls("song"), 1);
        assert_eq!(prefetcher.in_flight(), 0);
        assert_eq!(song.resolution(), ResolutionState::Resolved);
    }

    #[tokio::test]
    async fn prepared_track_skips_provider() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(ResolvedTrack::default()));
        let prefetcher = Prefetcher::new(Arc::new(resolver), 5);
        let song = track("song");

        assert!(prefetcher.ensure_resolved(&song).await);
        assert!(prefetcher.ensure_resolved(&song).await);
    }

    #[tokio::test]
    async fn failed_resolution_is_reported() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(ResolveError::expected("Private video")));
        let prefetcher = Prefetcher::new(Arc::new(resolver), 5);
        let song = track("private");

        assert!(!prefetcher.ensure_resolved(&song).await);
        assert_eq!(song.resolution(), ResolutionState::Failed);
        assert_eq!(prefetcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn warm_queue_drops_failures_and_backfills() {
        let resolver = FakeResolver::new();
        resolver.fail("bad");
        let prefetcher = Prefetcher::new(resolver.clone(), 2);

        let queue = Mutex::new(MusicQueue::new(15, None));
        let tracks: Vec<_> = ["bad", "b", "c", "d"].into_iter().map(track).collect();
        for t in &tracks {
            queue.lock().enqueue(t.clone());
        }

        assert_eq!(prefetcher.warm_queue(&queue).await, 1);
        assert_eq!(queue.lock().len(), 3);
        assert!(tracks[1].is_prepared());
        assert!(tracks[2].is_prepared());
        assert!(!tracks[3].is_prepared());
        assert_eq!(resolver.calls("d"), 0);
    }

    #[test]
    fn window_is_capped() {
        let prefetcher = Prefetcher::new(FakeResolver::new(), 100);
        assert_eq!(prefetcher.window(), Prefetcher::MAX_WINDOW);
    }
}
