use parking_lot::Mutex;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::broadcast;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::audio::prefetch::Prefetcher;
use crate::audio::queue::{LoopMode, MusicQueue, QueueSnapshot};
use crate::audio::timer::IdleTimer;
use crate::audio::track::{Origin, PlaylistKind, SiteKind, Track, TrackRef, TrackView};
use crate::audio::transport::{TrackEndCallback, Transport, TransportState};
use crate::error::PlayerError;
use crate::sources::{links, TrackResolver};

/// Ajustes efectivos de una sesión.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    /// Desconectar por inactividad aunque haya gente en el canal.
    pub auto_timeout: bool,
    pub prefetch_window: usize,
    pub default_volume: u8,
    pub title_log_len: usize,
    pub history_limit: Option<usize>,
    pub stream_ttl: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            auto_timeout: true,
            prefetch_window: 5,
            default_volume: 100,
            title_log_len: 15,
            history_limit: None,
            stream_ttl: Some(Duration::from_secs(5 * 60 * 60)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empezó a sonar inmediatamente
    Playing(TrackView),
    Queued { track: TrackView, position: usize },
    PlaylistQueued { count: usize },
    /// No se pudo resolver (restricción de edad, región, sin resultados...)
    Rejected,
    /// URL de un sitio que no sabemos reproducir
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Paused,
    Resumed,
    NothingToPause,
}

/// Notificaciones para la capa de presentación.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TrackStarted(TrackView),
    Idle,
    Disconnected,
}

enum PlayAttempt {
    Started,
    Unplayable,
    TransportLost,
}

struct Playback {
    pending_override: Option<TrackRef>,
    volume: u8,
    generation: u64,
}

/// Máquina de estados de reproducción de un guild.
///
/// Navigation (`skip`, `prev`, `stop`), the start of playback from idle and
/// the handling of end-of-track signals are serialized by `transitions`.
/// Every `play` bumps a generation counter; an end signal carrying an older
/// generation belongs to a superseded track and is ignored.
///
/// The controller lives as long as its voice connection. `disconnect` tears
/// down the transport, cancels background work and is safe to call twice.
pub struct SessionController {
    guild_id: u64,
    settings: SessionSettings,
    transport: Arc<dyn Transport>,
    queue: Mutex<MusicQueue>,
    playback: Mutex<Playback>,
    transitions: tokio::sync::Mutex<()>,
    prefetcher: Prefetcher,
    idle_timer: IdleTimer,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    closed: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        guild_id: u64,
        settings: SessionSettings,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        let controller = Arc::new(Self {
            guild_id,
            queue: Mutex::new(MusicQueue::new(settings.title_log_len, settings.history_limit)),
            playback: Mutex::new(Playback {
                pending_override: None,
                volume: settings.default_volume.min(100),
                generation: 0,
            }),
            transitions: tokio::sync::Mutex::new(()),
            prefetcher: Prefetcher::new(resolver, settings.prefetch_window),
            idle_timer: IdleTimer::new(),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            events,
            settings,
            transport,
        });

        controller.restart_idle_timer();
        info!("🎛️ Sesión creada para guild {}", guild_id);
        controller
    }

    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ---- Operaciones

    /// Encola una canción, playlist o búsqueda; si no suena nada, empieza.
    pub async fn submit(self: &Arc<Self>, locator: &str, requested_by: Option<u64>) -> SubmitOutcome {
        self.restart_idle_timer();
        let locator = locator.trim();

        let playlist = links::identify_playlist(locator);
        if playlist != PlaylistKind::Unknown {
            return self.submit_playlist(playlist, locator, requested_by).await;
        }

        let site = links::identify_site(locator);
        if site == SiteKind::Unknown && links::find_url(locator).is_some() {
            debug!("🚫 Sitio no soportado: {}", locator);
            return SubmitOutcome::Unsupported;
        }

        let track = Track::new(links::normalize(locator, site), Origin::Direct, site)
            .with_requester(requested_by)
            .into_ref();

        if !self.prefetcher.ensure_resolved(&track).await {
            return SubmitOutcome::Rejected;
        }

        let position = self.queue.lock().enqueue(track.clone());
        info!("➕ Agregado a la cola: {} (posición {})", track.display_title(), position);

        match self.start_if_idle().await {
            Some(started) if started.id() == track.id() => SubmitOutcome::Playing(track.view()),
            _ => {
                self.spawn_warm();
                SubmitOutcome::Queued {
                    track: track.view(),
                    position,
                }
            }
        }
    }

    async fn submit_playlist(
        self: &Arc<Self>,
        kind: PlaylistKind,
        url: &str,
        requested_by: Option<u64>,
    ) -> SubmitOutcome {
        let tracks = match self.prefetcher.resolver().expand_playlist(kind, url).await {
            Ok(tracks) if !tracks.is_empty() => tracks,
            Ok(_) => return SubmitOutcome::Rejected,
            Err(e) => {
                warn!("⚠️ No se pudo expandir la playlist {}: {}", url, e);
                return SubmitOutcome::Rejected;
            }
        };

        let count = tracks.len();
        {
            let mut queue = self.queue.lock();
            for track in tracks {
                queue.enqueue(track.with_requester(requested_by).into_ref());
            }
        }
        info!("➕ Agregadas {} canciones a la cola", count);

        self.spawn_warm();
        self.start_if_idle().await;
        SubmitOutcome::PlaylistQueued { count }
    }

    /// Pausa o reanuda.
    pub fn pause_toggle(self: &Arc<Self>) -> PauseState {
        match self.transport.state() {
            TransportState::Playing => {
                self.transport.pause();
                self.restart_idle_timer();
                info!("⏸️ Pausado en guild {}", self.guild_id);
                PauseState::Paused
            }
            TransportState::Paused => {
                self.transport.resume();
                info!("▶️ Reanudado en guild {}", self.guild_id);
                PauseState::Resumed
            }
            TransportState::Idle => PauseState::NothingToPause,
        }
    }

    /// Salta a la siguiente; devuelve `false` si no había nada que saltar.
    pub async fn skip(self: &Arc<Self>) -> bool {
        self.restart_idle_timer();
        let _transition = self.transitions.lock().await;

        if self.transport.state().is_active() {
            // El avance lo hace la señal de fin
            self.transport.stop();
            return true;
        }
        self.advance().await.is_some()
    }

    /// Vuelve a la canción anterior del historial.
    pub async fn prev(self: &Arc<Self>) -> bool {
        self.restart_idle_timer();
        let _transition = self.transitions.lock().await;

        let Some(previous) = self.queue.lock().pop_prev() else {
            return false;
        };
        info!("⏮️ Volviendo a: {}", previous.display_title());

        {
            let mut queue = self.queue.lock();
            if let Some(interrupted) = queue.take_current() {
                queue.enqueue_front(interrupted);
            }
        }

        if self.transport.state().is_active() {
            self.playback.lock().pending_override = Some(previous);
            self.transport.stop();
        } else {
            self.queue.lock().set_current(Some(previous.clone()));
            self.play_from(Some(previous)).await;
        }
        true
    }

    /// Detiene todo y vacía la cola; devuelve si había algo sonando.
    pub async fn stop(self: &Arc<Self>) -> bool {
        let _transition = self.transitions.lock().await;
        self.playback.lock().pending_override = None;
        {
            let mut queue = self.queue.lock();
            queue.set_loop_mode(LoopMode::Off);
            queue.retire_current();
            queue.clear();
        }

        if !self.transport.state().is_active() {
            return false;
        }
        self.transport.stop();
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        true
    }

    /// Quita la canción en `position` (1-based); sin posición, la última.
    pub fn remove(self: &Arc<Self>, position: Option<usize>) -> Result<TrackView, PlayerError> {
        let removed = {
            let mut queue = self.queue.lock();
            let position = position.unwrap_or(queue.len());
            queue.remove(position)?
        };
        self.spawn_warm();
        Ok(removed.view())
    }

    pub fn move_track(self: &Arc<Self>, from: usize, to: usize) -> Result<(), PlayerError> {
        self.queue.lock().move_track(from, to)?;
        self.spawn_warm();
        Ok(())
    }

    /// `false` si la cola estaba vacía.
    pub fn shuffle(self: &Arc<Self>) -> bool {
        {
            let mut queue = self.queue.lock();
            if queue.is_empty() {
                return false;
            }
            queue.shuffle();
        }
        self.spawn_warm();
        true
    }

    /// Sin modo explícito alterna entre `Off` y `All`.
    pub fn set_loop(&self, mode: Option<LoopMode>) -> LoopMode {
        let mut queue = self.queue.lock();
        let mode = mode.unwrap_or(match queue.loop_mode() {
            LoopMode::Off => LoopMode::All,
            LoopMode::All | LoopMode::Single => LoopMode::Off,
        });
        queue.set_loop_mode(mode);
        mode
    }

    pub fn volume(&self) -> u8 {
        self.playback.lock().volume
    }

    pub fn set_volume(&self, level: i64) -> Result<u8, PlayerError> {
        let level = u8::try_from(level)
            .ok()
            .filter(|level| *level <= 100)
            .ok_or(PlayerError::InvalidVolume(level))?;
        Ok(self.apply_volume(level))
    }

    pub fn volume_up(&self) -> u8 {
        let level = self.volume().saturating_add(10).clamp(10, 100);
        self.apply_volume(level)
    }

    pub fn volume_down(&self) -> u8 {
        let level = self.volume().saturating_sub(10).clamp(10, 100);
        self.apply_volume(level)
    }

    fn apply_volume(&self, level: u8) -> u8 {
        self.playback.lock().volume = level;
        if self.transport.state().is_active() {
            self.transport.set_volume(gain(level));
        }
        debug!("🔊 Volumen de guild {}: {}%", self.guild_id, level);
        level
    }

    // ---- Vistas

    pub fn state(&self) -> SessionState {
        match self.transport.state() {
            TransportState::Playing => SessionState::Playing,
            TransportState::Paused => SessionState::Paused,
            TransportState::Idle => SessionState::Idle,
        }
    }

    pub fn current(&self) -> Option<TrackView> {
        self.queue.lock().current().map(|track| track.view())
    }

    pub fn queue_snapshot(&self, limit: usize) -> QueueSnapshot {
        self.queue.lock().snapshot(limit)
    }

    pub fn title_history(&self) -> Vec<String> {
        self.queue.lock().title_log()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.queue.lock().loop_mode()
    }

    pub fn has_prev(&self) -> bool {
        self.queue.lock().has_prev()
    }

    pub fn has_next(&self) -> bool {
        self.queue.lock().has_next()
    }

    // ---- Ciclo de vida

    /// Cierra la sesión. Solo la primera llamada hace algo.
    pub async fn disconnect(self: &Arc<Self>) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("👋 Cerrando sesión de guild {}", self.guild_id);

        self.idle_timer.cancel();
        self.shutdown.cancel();
        self.playback.lock().pending_override = None;
        {
            let mut queue = self.queue.lock();
            queue.set_loop_mode(LoopMode::Off);
            queue.retire_current();
            queue.clear();
        }

        self.transport.stop();
        if let Err(e) = self.transport.disconnect().await {
            warn!("⚠️ Error al salir del canal de voz en guild {}: {}", self.guild_id, e);
        }

        self.tasks.close();
        let _ = self.events.send(SessionEvent::Disconnected);
        true
    }

    /// Espera a que terminen las tareas de fondo tras `disconnect`.
    pub async fn join(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    // ---- Internos

    async fn start_if_idle(self: &Arc<Self>) -> Option<TrackRef> {
        let _transition = self.transitions.lock().await;
        // Un `prev` en curso espera su señal de fin para reproducir el override
        if self.is_closed()
            || self.queue.lock().current().is_some()
            || self.transport.state().is_active()
            || self.playback.lock().pending_override.is_some()
        {
            return None;
        }

        let next = self.queue.lock().pop_next();
        self.play_from(next).await
    }

    /// Siguiente canción: primero la de `prev`, si la hay. Requiere el lock de transiciones.
    async fn advance(self: &Arc<Self>) -> Option<TrackRef> {
        let pending = self.playback.lock().pending_override.take();
        let next = match pending {
            Some(track) => {
                self.queue.lock().set_current(Some(track.clone()));
                Some(track)
            }
            None => self.queue.lock().pop_next(),
        };
        self.play_from(next).await
    }

    /// Intenta reproducir `next` y sigue con la cola si no se puede.
    async fn play_from(self: &Arc<Self>, mut next: Option<TrackRef>) -> Option<TrackRef> {
        while let Some(track) = next {
            match self.prepare_and_play(&track).await {
                PlayAttempt::Started => return Some(track),
                PlayAttempt::Unplayable => {
                    warn!("⏭️ Saltando track no reproducible: {}", track.display_title());
                    let mut queue = self.queue.lock();
                    queue.discard_current();
                    next = queue.pop_next();
                }
                PlayAttempt::TransportLost => {
                    let mut queue = self.queue.lock();
                    if let Some(current) = queue.take_current() {
                        queue.enqueue_front(current);
                    }
                    break;
                }
            }
        }

        debug!("📭 Guild {} sin nada que reproducir", self.guild_id);
        self.restart_idle_timer();
        let _ = self.events.send(SessionEvent::Idle);
        None
    }

    async fn prepare_and_play(self: &Arc<Self>, track: &TrackRef) -> PlayAttempt {
        if self.loop_mode() != LoopMode::Single {
            self.restart_idle_timer();
        }

        if !self.prefetcher.ensure_resolved(track).await {
            return PlayAttempt::Unplayable;
        }
        if track.stream_url().is_none() || track.stream_expired(self.settings.stream_ttl) {
            debug!("🔄 Stream ausente o caducado, re-resolviendo: {}", track.display_title());
            track.invalidate_stream();
            if !self.prefetcher.ensure_resolved(track).await {
                return PlayAttempt::Unplayable;
            }
        }
        let Some(stream_url) = track.stream_url() else {
            warn!("⚠️ Sin stream tras resolver: {}", track.display_title());
            return PlayAttempt::Unplayable;
        };

        let (volume, generation) = {
            let mut playback = self.playback.lock();
            playback.generation += 1;
            (playback.volume, playback.generation)
        };

        match self
            .transport
            .play(&stream_url, gain(volume), self.end_callback(generation))
            .await
        {
            Ok(()) => {}
            Err(PlayerError::TransportUnavailable) => {
                error!("❌ Transporte de voz perdido en guild {}", self.guild_id);
                return PlayAttempt::TransportLost;
            }
            Err(e) => {
                warn!("⚠️ El transporte rechazó {}: {}", track.display_title(), e);
                return PlayAttempt::Unplayable;
            }
        }

        self.queue.lock().record_played_title(track.display_title());
        info!("▶️ Reproduciendo en guild {}: {}", self.guild_id, track.display_title());
        let _ = self.events.send(SessionEvent::TrackStarted(track.view()));
        self.spawn_warm();
        PlayAttempt::Started
    }

    fn end_callback(self: &Arc<Self>, generation: u64) -> TrackEndCallback {
        let session = Arc::downgrade(self);
        Box::new(move || {
            if let Some(session) = session.upgrade() {
                let handler = session.clone();
                session.spawn_task(async move { handler.on_track_end(generation).await });
            }
        })
    }

    async fn on_track_end(self: &Arc<Self>, generation: u64) {
        let _transition = self.transitions.lock().await;
        if self.is_closed() {
            return;
        }
        if self.playback.lock().generation != generation {
            debug!("🔇 Fin de track obsoleto ignorado (generación {})", generation);
            return;
        }
        self.advance().await;
    }

    fn restart_idle_timer(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let session = Arc::downgrade(self);
        self.idle_timer
            .arm(self.settings.idle_timeout, &self.tasks, move || async move {
                if let Some(session) = session.upgrade() {
                    session.on_idle_timeout().await;
                }
            });
    }

    async fn on_idle_timeout(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let Some(listeners) = self.transport.listener_count().await else {
            debug!("⏰ Guild {} sin conexión de voz al vencer el temporizador", self.guild_id);
            return;
        };

        if listeners <= 1 {
            info!("👋 Solo en el canal de guild {}, desconectando", self.guild_id);
            self.disconnect().await;
            return;
        }

        self.restart_idle_timer();
        if !self.settings.auto_timeout || self.transport.state() == TransportState::Playing {
            return;
        }
        info!("💤 Inactividad en guild {}, desconectando", self.guild_id);
        self.disconnect().await;
    }

    fn spawn_warm(self: &Arc<Self>) {
        let session = self.clone();
        self.spawn_task(async move {
            session.prefetcher.warm_queue(&session.queue).await;
        });
    }

    fn spawn_task<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = work => {}
            }
        });
    }
}

fn gain(volume: u8) -> f32 {
    f32::from(volume) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{settle, stream_for, wait_until, FakeResolver, FakeTransport};
    use pretty_assertions::assert_eq;

    fn quiet_settings() -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    fn session_with(
        settings: SessionSettings,
    ) -> (Arc<SessionController>, Arc<FakeTransport>, Arc<FakeResolver>) {
        let transport = FakeTransport::new();
        let resolver = FakeResolver::new();
        let session = SessionController::new(7, settings, transport.clone(), resolver.clone());
        (session, transport, resolver)
    }

    fn queued_titles(session: &SessionController) -> Vec<String> {
        session
            .queue_snapshot(25)
            .items
            .into_iter()
            .map(|track| track.title)
            .collect()
    }

    #[tokio::test]
    async fn first_submit_plays_immediately() {
        let (session, transport, _) = session_with(quiet_settings());

        let view = match session.submit("song a", Some(42)).await {
            SubmitOutcome::Playing(view) => view,
            other => panic!("esperaba Playing, obtuve {other:?}"),
        };
        assert_eq!(view.title, "SONG A");
        assert_eq!(view.requested_by, Some(42));
        assert_eq!(transport.played(), vec![stream_for("song a")]);
        assert_eq!(session.state(), SessionState::Playing);
        assert_eq!(session.title_history(), vec!["SONG A".to_string()]);
    }

    #[tokio::test]
    async fn later_submits_are_queued() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;

        let outcome = session.submit("b", None).await;
        assert!(matches!(outcome, SubmitOutcome::Queued { position: 1, .. }));
        assert_eq!(transport.play_count(), 1);
        assert_eq!(queued_titles(&session), vec!["B"]);
    }

    #[tokio::test]
    async fn natural_end_advances_to_next() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;

        transport.finish();
        wait_until(|| transport.play_count() == 2).await;
        assert_eq!(transport.played()[1], stream_for("b"));
        assert_eq!(session.current().map(|t| t.title), Some("B".to_string()));
        assert!(session.has_prev());
    }

    #[tokio::test]
    async fn remove_then_prev_replays_previous_track() {
        let (session, transport, _) = session_with(quiet_settings());
        for name in ["a", "b", "c"] {
            session.submit(name, None).await;
        }
        transport.finish();
        wait_until(|| transport.play_count() == 2).await;

        let removed = session.remove(Some(1)).unwrap();
        assert_eq!(removed.title, "C");
        assert!(queued_titles(&session).is_empty());

        assert!(session.prev().await);
        wait_until(|| transport.play_count() == 3).await;
        assert_eq!(transport.played()[2], stream_for("a"));
        // El override se consumió sin llamar a pop_next: B sigue esperando
        assert_eq!(queued_titles(&session), vec!["B"]);

        transport.finish();
        wait_until(|| transport.play_count() == 4).await;
        assert_eq!(transport.played()[3], stream_for("b"));
    }

    #[tokio::test]
    async fn prev_while_idle_plays_directly() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        transport.finish();
        wait_until(|| session.state() == SessionState::Idle && session.current().is_none()).await;

        assert!(session.prev().await);
        assert_eq!(transport.played(), vec![stream_for("a"), stream_for("a")]);
        assert!(!session.prev().await);
    }

    #[tokio::test]
    async fn single_loop_repeats_current() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;
        session.set_loop(Some(LoopMode::Single));

        for expected in 2..=4 {
            transport.finish();
            wait_until(|| transport.play_count() == expected).await;
        }
        assert!(transport.played().iter().all(|url| *url == stream_for("a")));
        assert!(!session.has_prev());
        assert_eq!(queued_titles(&session), vec!["B"]);
    }

    #[tokio::test]
    async fn all_loop_restarts_from_history() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;
        assert_eq!(session.set_loop(None), LoopMode::All);

        transport.finish();
        wait_until(|| transport.play_count() == 2).await;
        transport.finish();
        wait_until(|| transport.play_count() == 3).await;
        assert_eq!(transport.played()[2], stream_for("a"));
        assert_eq!(session.set_loop(None), LoopMode::Off);
    }

    #[tokio::test]
    async fn skip_stops_transport_and_advances() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;

        assert!(session.skip().await);
        wait_until(|| transport.play_count() == 2).await;
        assert_eq!(session.current().map(|t| t.title), Some("B".to_string()));

        assert!(session.skip().await);
        wait_until(|| session.state() == SessionState::Idle).await;
        assert!(!session.skip().await);
    }

    #[tokio::test]
    async fn stop_drains_queue_and_resets_loop() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;
        session.set_loop(Some(LoopMode::All));

        assert!(session.stop().await);
        wait_until(|| session.state() == SessionState::Idle).await;
        settle().await;
        assert_eq!(transport.play_count(), 1);
        assert_eq!(session.loop_mode(), LoopMode::Off);
        assert!(queued_titles(&session).is_empty());
        assert!(session.current().is_none());
        assert!(session.has_prev());
    }

    #[tokio::test]
    async fn unplayable_tracks_are_skipped() {
        let (session, transport, resolver) = session_with(quiet_settings());
        resolver.set_playlist(&["p1", "broken", "p3"]);
        resolver.fail("broken");

        let outcome = session
            .submit("https://www.youtube.com/playlist?list=PL1", Some(1))
            .await;
        assert_eq!(outcome, SubmitOutcome::PlaylistQueued { count: 3 });
        wait_until(|| transport.play_count() == 1).await;

        transport.finish();
        wait_until(|| transport.play_count() == 2).await;
        assert_eq!(transport.played()[1], stream_for("p3"));
    }

    #[tokio::test]
    async fn rejected_and_unsupported_submissions() {
        let (session, transport, resolver) = session_with(quiet_settings());
        resolver.fail("age restricted");

        assert_eq!(session.submit("age restricted", None).await, SubmitOutcome::Rejected);
        assert_eq!(
            session.submit("https://example.com/page", None).await,
            SubmitOutcome::Unsupported
        );
        assert_eq!(transport.play_count(), 0);
    }

    #[tokio::test]
    async fn lost_transport_keeps_track_queued() {
        let (session, transport, _) = session_with(quiet_settings());
        transport.set_unavailable(true);

        assert!(matches!(session.submit("a", None).await, SubmitOutcome::Queued { .. }));
        assert_eq!(queued_titles(&session), vec!["A"]);
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn volume_rules() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;

        assert_eq!(session.set_volume(150), Err(PlayerError::InvalidVolume(150)));
        assert_eq!(session.set_volume(-1), Err(PlayerError::InvalidVolume(-1)));
        assert_eq!(session.set_volume(40), Ok(40));
        assert!((transport.volume() - 0.4).abs() < f32::EPSILON);

        assert_eq!(session.set_volume(100), Ok(100));
        assert_eq!(session.volume_up(), 100);
        assert_eq!(session.set_volume(0), Ok(0));
        assert_eq!(session.volume_up(), 10);
        assert_eq!(session.volume_down(), 10);
    }

    #[tokio::test]
    async fn navigation_errors_do_not_mutate() {
        let (session, _, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;

        assert_eq!(
            session.remove(Some(3)),
            Err(PlayerError::OutOfRange { position: 3, len: 1 })
        );
        assert!(session.move_track(1, 2).is_err());
        assert_eq!(queued_titles(&session), vec!["B"]);
        assert_eq!(session.remove(None).map(|t| t.title), Ok("B".to_string()));
        assert!(session.remove(None).is_err());
        assert!(!session.shuffle());
    }

    #[tokio::test]
    async fn pause_toggle_cycles() {
        let (session, _, _) = session_with(quiet_settings());
        assert_eq!(session.pause_toggle(), PauseState::NothingToPause);
        session.submit("a", None).await;
        assert_eq!(session.pause_toggle(), PauseState::Paused);
        assert_eq!(session.state(), SessionState::Paused);
        assert_eq!(session.pause_toggle(), PauseState::Resumed);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        let mut events = session.subscribe();

        assert!(session.disconnect().await);
        assert!(!session.disconnect().await);
        session.join().await;

        assert_eq!(transport.disconnects(), 1);
        assert!(session.is_closed());
        assert!(matches!(events.recv().await, Ok(SessionEvent::Disconnected)));
    }

    #[tokio::test]
    async fn track_started_is_broadcast() {
        let (session, _, _) = session_with(quiet_settings());
        let mut events = session.subscribe();
        session.submit("a", None).await;

        match events.recv().await {
            Ok(SessionEvent::TrackStarted(view)) => assert_eq!(view.title, "A"),
            other => panic!("evento inesperado: {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_during_prev_leaves_override_to_end_signal() {
        let (session, transport, _) = session_with(quiet_settings());
        session.submit("a", None).await;
        session.submit("b", None).await;
        transport.finish();
        wait_until(|| transport.play_count() == 2).await;

        let (went_back, outcome) = tokio::join!(session.prev(), session.submit("c", None));
        assert!(went_back);
        assert!(matches!(outcome, SubmitOutcome::Queued { .. }));

        wait_until(|| transport.play_count() == 3).await;
        assert_eq!(transport.played()[2], stream_for("a"));
        assert!(session.playback.lock().pending_override.is_none());
        assert_eq!(queued_titles(&session), vec!["B", "C"]);

        transport.finish();
        wait_until(|| transport.play_count() == 4).await;
        assert_eq!(transport.played()[3], stream_for("b"));
    }

    // ---- Temporizador de inactividad (reloj pausado)

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn timed_settings(auto_timeout: bool) -> SessionSettings {
        SessionSettings {
            idle_timeout: TIMEOUT,
            auto_timeout,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn skip_just_before_deadline_rearms_timer() {
        let (session, transport, _) = session_with(timed_settings(true));
        transport.set_listeners(Some(1));
        settle().await;

        tokio::time::advance(TIMEOUT - Duration::from_secs(1)).await;
        settle().await;
        session.skip().await;
        settle().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(!session.is_closed());

        tokio::time::advance(TIMEOUT).await;
        settle().await;
        assert!(session.is_closed());
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_with_listeners_disconnects_only_with_auto_timeout() {
        let (patient, patient_transport, _) = session_with(timed_settings(false));
        let (strict, strict_transport, _) = session_with(timed_settings(true));
        patient_transport.set_listeners(Some(3));
        strict_transport.set_listeners(Some(3));
        settle().await;

        tokio::time::advance(TIMEOUT).await;
        settle().await;
        assert!(!patient.is_closed());
        assert!(strict.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn playing_session_survives_timeout() {
        let (session, transport, _) = session_with(timed_settings(true));
        session.submit("a", None).await;
        settle().await;

        tokio::time::advance(TIMEOUT).await;
        settle().await;
        assert!(!session.is_closed());

        transport.set_listeners(None);
        tokio::time::advance(TIMEOUT).await;
        settle().await;
        assert!(!session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn single_loop_repeats_keep_original_deadline() {
        let (session, transport, _) = session_with(timed_settings(true));
        transport.set_listeners(Some(1));
        session.submit("a", None).await;
        session.set_loop(Some(LoopMode::Single));
        settle().await;

        for expected in 2..=4 {
            tokio::time::advance(TIMEOUT / 4).await;
            transport.finish();
            settle().await;
            assert_eq!(transport.play_count(), expected);
        }

        tokio::time::advance(TIMEOUT / 4 - Duration::from_secs(1)).await;
        settle().await;
        assert!(!session.is_closed());

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(session.is_closed());
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_while_timeout_runs_disconnects_once() {
        let (session, transport, _) = session_with(timed_settings(true));
        transport.set_listeners(Some(1));
        let listener_gate = transport.hold_listener_count();
        settle().await;

        tokio::time::advance(TIMEOUT).await;
        settle().await;
        // El callback sigue esperando el recuento de oyentes
        assert!(!session.is_closed());

        assert!(!session.skip().await);
        session.restart_idle_timer();
        session.idle_timer.cancel();
        session.restart_idle_timer();

        listener_gate.add_permits(10);
        settle().await;
        assert!(session.is_closed());
        assert_eq!(transport.disconnects(), 1);

        tokio::time::advance(TIMEOUT * 2).await;
        settle().await;
        assert_eq!(transport.disconnects(), 1);
    }
}
