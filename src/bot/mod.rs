//! # Bot Module
//!
//! Discord front end for Encore.
//!
//! This module adapts the playback core to Discord:
//! - Slash command registration ([`commands`]) and dispatch ([`handlers`])
//! - Voice connections over songbird ([`voice`])
//! - Event handling (ready, interactions, voice state updates)
//! - Song announcements driven by [`SessionEvent`]s
//!
//! ## Architecture
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] trait. It owns no
//! playback state itself; every guild's state lives in a
//! [`SessionController`] held by the shared [`SessionManager`].
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use encore::{audio::SessionManager, bot::MusicBot, config::Config, storage::JsonStorage};
//! # async fn example(sessions: Arc<SessionManager>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let storage = Arc::new(tokio::sync::Mutex::new(JsonStorage::new(config.data_dir.clone()).await?));
//! let songbird = songbird::Songbird::serenity();
//! let bot = MusicBot::new(config, storage, sessions, songbird, reqwest::Client::new());
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, CreateMessage, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    http::Http,
};
use songbird::Songbird;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod voice;

use crate::{
    audio::{SessionController, SessionEvent, SessionManager},
    config::Config,
    error::PlayerError,
    storage::{GuildSettings, JsonStorage},
    ui::embeds,
};
use voice::SongbirdConnector;

/// Main Discord event handler.
///
/// ## Thread Safety
///
/// Serenity dispatches events concurrently. Shared pieces are behind
/// [`Arc`]; the JSON storage is behind a [`tokio::sync::Mutex`] because
/// updates write to disk.
pub struct MusicBot {
    /// Bot configuration loaded from environment variables
    pub config: Arc<Config>,
    /// Per-guild settings persisted as JSON
    pub storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    /// One playback session per connected guild
    pub sessions: Arc<SessionManager>,
    songbird: Arc<Songbird>,
    http: reqwest::Client,
}

impl MusicBot {
    pub fn new(
        config: Config,
        storage: Arc<tokio::sync::Mutex<JsonStorage>>,
        sessions: Arc<SessionManager>,
        songbird: Arc<Songbird>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            sessions,
            songbird,
            http,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands propagate in about a second and are used when
    /// `GUILD_ID` is configured; global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    pub async fn guild_settings(&self, guild_id: GuildId) -> GuildSettings {
        self.storage.lock().await.guild(guild_id.get())
    }

    /// Conecta al canal de voz y arranca la sesión del guild.
    ///
    /// `text_channel` receives song announcements when the guild has them
    /// enabled and no command channel is configured.
    pub async fn connect(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<Arc<SessionController>, PlayerError> {
        let settings = self.guild_settings(guild_id).await;
        let connector = SongbirdConnector::new(self.songbird.clone(), ctx.cache.clone(), self.http.clone());

        let session = self
            .sessions
            .connect(
                guild_id.get(),
                voice_channel.get(),
                settings.session_settings(&self.config),
                &connector,
            )
            .await?;

        if settings.announce_songs {
            let channel = settings
                .command_channel
                .map(ChannelId::new)
                .unwrap_or(text_channel);
            spawn_announcer(ctx.http.clone(), &session, channel);
        }

        Ok(session)
    }
}

/// Publica un embed cada vez que empieza una canción.
fn spawn_announcer(http: Arc<Http>, session: &Arc<SessionController>, channel: ChannelId) {
    let mut events = session.subscribe();
    let guild_id = session.guild_id();
    let session = Arc::downgrade(session);

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::TrackStarted(track)) => {
                    let Some(session) = session.upgrade() else {
                        break;
                    };
                    let embed =
                        embeds::create_now_playing_embed(&track, session.loop_mode(), session.volume());
                    drop(session);
                    if let Err(e) = channel
                        .send_message(&http, CreateMessage::new().embed(embed))
                        .await
                    {
                        warn!("⚠️ No se pudo anunciar la canción en guild {}: {}", guild_id, e);
                    }
                }
                Ok(SessionEvent::Idle) => {}
                Ok(SessionEvent::Disconnected) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Anuncios atrasados en guild {}: {} eventos omitidos", guild_id, skipped);
                }
            }
        }
        debug!("📣 Anunciador de guild {} terminado", guild_id);
    });
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Slash commands and player buttons.
    ///
    /// Errors are logged but never crash the bot; users may see
    /// "This interaction failed" for the affected interaction.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Cierra la sesión si alguien saca al bot del canal de voz.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.sessions.disconnect(guild_id.get()).await {
            Ok(()) => info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id),
            Err(PlayerError::NotConnected) => {
                debug!("Sesión de guild {} ya cerrada", guild_id)
            }
            Err(e) => warn!("⚠️ Error cerrando sesión de guild {}: {}", guild_id, e),
        }
    }
}
