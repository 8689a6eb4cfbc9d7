//! Fakes compartidos por los tests del núcleo de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use crate::audio::track::{Origin, PlaylistKind, ResolvedTrack, SiteKind, Track, TrackMetadata};
use crate::audio::transport::{TrackEndCallback, Transport, TransportState};
use crate::error::{PlayerError, ResolveError};
use crate::sources::TrackResolver;

pub fn stream_for(locator: &str) -> String {
    format!("https://stream.test/{locator}")
}

/// Resuelve cualquier cosa salvo los localizadores marcados como fallidos.
#[derive(Default)]
pub struct FakeResolver {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    playlist: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cada resolución espera un permiso del semáforo devuelto.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let resolver = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (Arc::new(resolver), gate)
    }

    pub fn fail(&self, locator: &str) {
        self.failing.lock().insert(locator.to_string());
    }

    pub fn set_playlist(&self, locators: &[&str]) {
        *self.playlist.lock() = locators.iter().map(|l| l.to_string()).collect();
    }

    pub fn calls(&self, locator: &str) -> usize {
        self.calls.lock().get(locator).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, track: &Track) -> Result<ResolvedTrack, ResolveError> {
        let locator = track.locator().to_string();
        *self.calls.lock().entry(locator.clone()).or_default() += 1;

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| ResolveError::unexpected("gate closed"))?
                .forget();
        }

        if self.failing.lock().contains(&locator) {
            return Err(ResolveError::expected(format!("{locator} unavailable")));
        }

        Ok(ResolvedTrack {
            metadata: TrackMetadata {
                title: Some(locator.to_uppercase()),
                duration: Some(Duration::from_secs(180)),
                webpage_url: Some(format!("https://video.test/{locator}")),
                ..Default::default()
            },
            stream_url: Some(stream_for(&locator)),
        })
    }

    async fn expand_playlist(
        &self,
        _kind: PlaylistKind,
        _url: &str,
    ) -> Result<Vec<Track>, ResolveError> {
        Ok(self
            .playlist
            .lock()
            .iter()
            .map(|locator| Track::new(locator.clone(), Origin::Playlist, SiteKind::YouTube))
            .collect())
    }
}

/// Transporte en memoria; `finish` simula el fin natural de la canción.
pub struct FakeTransport {
    state: Mutex<TransportState>,
    plays: Mutex<Vec<String>>,
    on_end: Mutex<Option<TrackEndCallback>>,
    listeners: Mutex<Option<usize>>,
    volume: Mutex<f32>,
    disconnects: AtomicUsize,
    unavailable: AtomicBool,
    listener_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TransportState::Idle),
            plays: Mutex::new(Vec::new()),
            on_end: Mutex::new(None),
            listeners: Mutex::new(Some(2)),
            volume: Mutex::new(1.0),
            disconnects: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            listener_gate: Mutex::new(None),
        })
    }

    pub fn played(&self) -> Vec<String> {
        self.plays.lock().clone()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().len()
    }

    pub fn set_listeners(&self, listeners: Option<usize>) {
        *self.listeners.lock() = listeners;
    }

    /// `listener_count` se bloquea hasta que el semáforo reciba permisos.
    pub fn hold_listener_count(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.listener_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Termina la canción actual como si se hubiera acabado sola.
    pub fn finish(&self) {
        *self.state.lock() = TransportState::Idle;
        self.fire_end();
    }

    fn fire_end(&self) {
        let callback = self.on_end.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: TrackEndCallback,
    ) -> Result<(), PlayerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PlayerError::TransportUnavailable);
        }
        self.plays.lock().push(stream_url.to_string());
        *self.volume.lock() = volume;
        *self.on_end.lock() = Some(on_end);
        *self.state.lock() = TransportState::Playing;
        Ok(())
    }

    fn stop(&self) {
        let was_active = {
            let mut state = self.state.lock();
            let active = state.is_active();
            *state = TransportState::Idle;
            active
        };
        if was_active {
            self.fire_end();
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        if *state == TransportState::Playing {
            *state = TransportState::Paused;
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if *state == TransportState::Paused {
            *state = TransportState::Playing;
        }
    }

    fn state(&self) -> TransportState {
        *self.state.lock()
    }

    fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume;
    }

    async fn listener_count(&self) -> Option<usize> {
        let gate = self.listener_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        *self.listeners.lock()
    }

    async fn disconnect(&self) -> Result<(), PlayerError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.stop();
        Ok(())
    }
}

/// Espera (con tiempo real) a que se cumpla la condición.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}

/// Deja correr las tareas pendientes sin avanzar el reloj.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
