use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PlayerError;

/// Se invoca exactamente una vez cuando termina (o falla) lo que se reprodujo.
pub type TrackEndCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl TransportState {
    /// Hay algo cargado, aunque esté en pausa.
    pub fn is_active(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Paused)
    }
}

/// Conexión de voz con un único track activo.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts streaming `stream_url`. `on_end` fires once when the track
    /// finishes, is stopped, or errors out.
    async fn play(
        &self,
        stream_url: &str,
        volume: f32,
        on_end: TrackEndCallback,
    ) -> Result<(), PlayerError>;

    fn stop(&self);

    fn pause(&self);

    fn resume(&self);

    fn state(&self) -> TransportState;

    fn set_volume(&self, volume: f32);

    /// Miembros en el canal, incluido el bot. `None` si no hay conexión.
    async fn listener_count(&self) -> Option<usize>;

    async fn disconnect(&self) -> Result<(), PlayerError>;
}

/// Abre transportes hacia un canal de voz.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<Arc<dyn Transport>, PlayerError>;
}
