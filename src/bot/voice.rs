//! Transporte de voz sobre songbird.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::{
    all::{ChannelId, GuildId},
    cache::Cache,
};
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::transport::{Connector, TrackEndCallback, Transport, TransportState};
use crate::error::PlayerError;

/// Abre conexiones de voz con el gestor de songbird.
pub struct SongbirdConnector {
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(songbird: Arc<Songbird>, cache: Arc<Cache>, http: reqwest::Client) -> Self {
        Self {
            songbird,
            cache,
            http,
        }
    }
}

#[async_trait]
impl Connector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Arc<dyn Transport>, PlayerError> {
        let call = self
            .songbird
            .join(GuildId::new(guild_id), ChannelId::new(channel_id))
            .await
            .map_err(|e| PlayerError::Connect(e.to_string()))?;

        if let Err(e) = call.lock().await.deafen(true).await {
            debug!("No se pudo ensordecer al bot en guild {}: {}", guild_id, e);
        }

        Ok(Arc::new(SongbirdTransport {
            guild_id,
            call,
            songbird: self.songbird.clone(),
            cache: self.cache.clone(),
            http: self.http.clone(),
            slot: Arc::new(Mutex::new(PlaybackSlot::default())),
        }))
    }
}

#[derive(Default)]
struct PlaybackSlot {
    serial: u64,
    state: TransportState,
    handle: Option<TrackHandle>,
    on_end: Option<TrackEndCallback>,
}

impl PlaybackSlot {
    /// Deja el slot libre y devuelve el callback pendiente, si lo había.
    fn finish(&mut self) -> Option<TrackEndCallback> {
        self.state = TransportState::Idle;
        self.handle = None;
        self.on_end.take()
    }
}

/// Una llamada de songbird con un único track activo.
///
/// songbird reports the end of a track from its own event loop. The slot
/// hands the end callback to whichever side gets there first, the event
/// handler or an explicit `stop`, so it runs exactly once per `play`.
pub struct SongbirdTransport {
    guild_id: u64,
    call: Arc<tokio::sync::Mutex<Call>>,
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
    slot: Arc<Mutex<PlaybackSlot>>,
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: TrackEndCallback,
    ) -> Result<(), PlayerError> {
        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(PlayerError::TransportUnavailable);
        }

        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let handle = call.play_only_input(input);
        drop(call);

        if let Err(e) = handle.set_volume(volume) {
            debug!("No se pudo fijar el volumen: {}", e);
        }

        let serial = {
            let mut slot = self.slot.lock();
            slot.serial += 1;
            slot.state = TransportState::Playing;
            slot.handle = Some(handle.clone());
            slot.on_end = Some(on_end);
            slot.serial
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackEndNotifier {
                serial,
                slot: self.slot.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                // El track ya murió; lo damos por terminado
                warn!("⚠️ No se pudo registrar el fin de track: {}", e);
                let callback = {
                    let mut slot = self.slot.lock();
                    if slot.serial == serial {
                        slot.finish()
                    } else {
                        None
                    }
                };
                if let Some(callback) = callback {
                    callback();
                }
                break;
            }
        }

        Ok(())
    }

    fn stop(&self) {
        let (handle, callback) = {
            let mut slot = self.slot.lock();
            if !slot.state.is_active() {
                return;
            }
            let handle = slot.handle.take();
            (handle, slot.finish())
        };

        if let Some(handle) = handle {
            let _ = handle.stop();
        }
        if let Some(callback) = callback {
            callback();
        }
    }

    fn pause(&self) {
        let mut slot = self.slot.lock();
        if slot.state != TransportState::Playing {
            return;
        }
        if let Some(handle) = &slot.handle {
            if handle.pause().is_ok() {
                slot.state = TransportState::Paused;
            }
        }
    }

    fn resume(&self) {
        let mut slot = self.slot.lock();
        if slot.state != TransportState::Paused {
            return;
        }
        if let Some(handle) = &slot.handle {
            if handle.play().is_ok() {
                slot.state = TransportState::Playing;
            }
        }
    }

    fn state(&self) -> TransportState {
        self.slot.lock().state
    }

    fn set_volume(&self, volume: f32) {
        if let Some(handle) = &self.slot.lock().handle {
            let _ = handle.set_volume(volume);
        }
    }

    async fn listener_count(&self) -> Option<usize> {
        let channel = self.call.lock().await.current_channel()?;
        let guild = self.cache.guild(GuildId::new(self.guild_id))?;

        Some(
            guild
                .voice_states
                .values()
                .filter(|state| state.channel_id.map(|id| id.get()) == Some(channel.0.get()))
                .count(),
        )
    }

    async fn disconnect(&self) -> Result<(), PlayerError> {
        self.stop();
        match self.songbird.remove(GuildId::new(self.guild_id)).await {
            Ok(()) | Err(songbird::error::JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            Err(e) => Err(PlayerError::Connect(e.to_string())),
        }
    }
}

/// Avisa a la sesión cuando songbird da el track por terminado.
struct TrackEndNotifier {
    serial: u64,
    slot: Arc<Mutex<PlaybackSlot>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(states) = ctx {
            for (state, _) in states.iter() {
                debug!("🎵 Track terminado: {:?}", state.playing);
            }
        }

        let callback = {
            let mut slot = self.slot.lock();
            if slot.serial != self.serial {
                None
            } else {
                slot.finish()
            }
        };
        if let Some(callback) = callback {
            callback();
        }

        None
    }
}
