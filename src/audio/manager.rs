use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::audio::session::{SessionController, SessionSettings};
use crate::audio::transport::Connector;
use crate::error::PlayerError;
use crate::sources::TrackResolver;

/// Registro de sesiones activas por guild.
pub struct SessionManager {
    sessions: DashMap<u64, Arc<SessionController>>,
    resolver: Arc<dyn TrackResolver>,
    connecting: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(resolver: Arc<dyn TrackResolver>) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Conecta al canal y crea la sesión del guild.
    pub async fn connect(
        &self,
        guild_id: u64,
        channel_id: u64,
        settings: SessionSettings,
        connector: &dyn Connector,
    ) -> Result<Arc<SessionController>, PlayerError> {
        let _connecting = self.connecting.lock().await;
        if self.get(guild_id).is_ok() {
            return Err(PlayerError::AlreadyConnected);
        }

        let transport = connector.connect(guild_id, channel_id).await?;
        let session = SessionController::new(guild_id, settings, transport, self.resolver.clone());
        self.sessions.insert(guild_id, session.clone());
        info!("🔊 Conectado a canal {} en guild {}", channel_id, guild_id);
        Ok(session)
    }

    /// Sesión viva del guild; las cerradas se descartan.
    pub fn get(&self, guild_id: u64) -> Result<Arc<SessionController>, PlayerError> {
        let session = self
            .sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .ok_or(PlayerError::NotConnected)?;

        if session.is_closed() {
            self.sessions
                .remove_if(&guild_id, |_, existing| Arc::ptr_eq(existing, &session));
            return Err(PlayerError::NotConnected);
        }
        Ok(session)
    }

    pub fn is_connected(&self, guild_id: u64) -> bool {
        self.get(guild_id).is_ok()
    }

    pub async fn disconnect(&self, guild_id: u64) -> Result<(), PlayerError> {
        let (_, session) = self
            .sessions
            .remove(&guild_id)
            .ok_or(PlayerError::NotConnected)?;

        let was_open = session.disconnect().await;
        session.join().await;
        if was_open {
            Ok(())
        } else {
            Err(PlayerError::NotConnected)
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().is_closed())
            .count()
    }

    /// Cierra todas las sesiones al apagar el bot.
    pub async fn shutdown(&self) {
        let guilds: Vec<u64> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            let _ = self.disconnect(guild_id).await;
        }
        info!("🔌 Todas las sesiones cerradas");
    }
}
