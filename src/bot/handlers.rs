use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{LoopMode, PauseState, SessionController, SubmitOutcome},
    bot::MusicBot,
    error::PlayerError,
    storage::GuildSettings,
    ui::{
        buttons::{button_ids, PlayerControls},
        embeds::{self, QUEUE_LIST_LIMIT},
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let settings = bot.guild_settings(guild_id).await;
    if command.data.name != "settings" && !settings.allows_channel(command.channel_id.get()) {
        let channel = settings.command_channel.unwrap_or_default();
        return reply_error(ctx, &command, PlayerError::WrongTextChannel(channel)).await;
    }

    let request = Request {
        ctx,
        command: &command,
        bot,
        guild_id,
        settings,
    };

    match command.data.name.as_str() {
        "play" => handle_play(request).await,
        "join" => handle_join(request).await,
        "leave" => handle_leave(request).await,
        "settings" => handle_settings(request).await,
        "queue" | "nowplaying" | "history" => handle_view(request).await,
        _ => handle_control(request).await,
    }
}

/// Lo que necesita cada handler de comando.
struct Request<'a> {
    ctx: &'a Context,
    command: &'a CommandInteraction,
    bot: &'a MusicBot,
    guild_id: GuildId,
    settings: GuildSettings,
}

impl Request<'_> {
    fn session(&self) -> Result<Arc<SessionController>, PlayerError> {
        self.bot.sessions.get(self.guild_id.get())
    }

    /// Sesión del guild, exigiendo que el usuario escuche con el bot si así se configuró.
    fn controlled_session(&self) -> Result<Arc<SessionController>, PlayerError> {
        let session = self.session()?;
        if self.settings.user_must_be_in_vc {
            ensure_same_voice(self.ctx, self.guild_id, self.command.user.id)?;
        }
        Ok(session)
    }

    async fn reply(&self, embed: CreateEmbed) -> Result<()> {
        reply(self.ctx, self.command, embed, false).await
    }

    async fn reply_error(&self, error: PlayerError) -> Result<()> {
        reply_error(self.ctx, self.command, error).await
    }
}

// Handlers específicos para cada comando

async fn handle_play(request: Request<'_>) -> Result<()> {
    let (ctx, command, bot, guild_id) = (request.ctx, request.command, request.bot, request.guild_id);
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    let mut deferred = false;
    let session = match request.controlled_session() {
        Ok(session) => session,
        Err(PlayerError::NotConnected) => {
            let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id)
                .or(request.settings.start_voice_channel.map(ChannelId::new))
            else {
                return request.reply_error(PlayerError::NotInVoice).await;
            };
            // Conectar puede tardar más de lo que Discord espera
            defer(ctx, command).await?;
            deferred = true;
            match bot.connect(ctx, guild_id, voice_channel, command.channel_id).await {
                Ok(session) => session,
                // Otro comando conectó mientras tanto
                Err(PlayerError::AlreadyConnected) => match request.session() {
                    Ok(session) => session,
                    Err(e) => return edit_error(ctx, command, e).await,
                },
                Err(e) => return edit_error(ctx, command, e).await,
            }
        }
        Err(e) => return request.reply_error(e).await,
    };

    if !deferred {
        defer(ctx, command).await?;
    }

    let outcome = session.submit(&query, Some(command.user.id.get())).await;
    debug!("Resultado de /play en guild {}: {:?}", guild_id, outcome);

    let response = match outcome {
        SubmitOutcome::Playing(track) => EditInteractionResponse::new()
            .embed(embeds::create_now_playing_embed(
                &track,
                session.loop_mode(),
                session.volume(),
            ))
            .components(PlayerControls::from_session(&session).rows()),
        SubmitOutcome::Queued { track, position } => {
            EditInteractionResponse::new().embed(embeds::create_track_added_embed(&track, position))
        }
        SubmitOutcome::PlaylistQueued { count } => {
            EditInteractionResponse::new().embed(embeds::create_playlist_added_embed(count))
        }
        SubmitOutcome::Rejected => EditInteractionResponse::new().embed(embeds::create_error_embed(
            "No se pudo reproducir",
            "No encontré nada reproducible (vídeo privado, con restricción de edad o región, o sin resultados)",
        )),
        SubmitOutcome::Unsupported => {
            EditInteractionResponse::new().embed(embeds::create_error_embed(
                "Enlace no soportado",
                "Solo se aceptan enlaces de YouTube, Spotify, SoundCloud, Bandcamp, Twitter o archivos de audio directos",
            ))
        }
    };

    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

async fn handle_join(request: Request<'_>) -> Result<()> {
    let Some(voice_channel) = user_voice_channel(request.ctx, request.guild_id, request.command.user.id)
    else {
        return request.reply_error(PlayerError::NotInVoice).await;
    };

    match request
        .bot
        .connect(request.ctx, request.guild_id, voice_channel, request.command.channel_id)
        .await
    {
        Ok(_) => {
            request
                .reply(embeds::create_success_embed(
                    "Conectado",
                    &format!("Me uní a <#{}>", voice_channel),
                ))
                .await
        }
        Err(e) => request.reply_error(e).await,
    }
}

async fn handle_leave(request: Request<'_>) -> Result<()> {
    if request.settings.user_must_be_in_vc {
        if let Err(e) = request.controlled_session() {
            return request.reply_error(e).await;
        }
    }

    match request.bot.sessions.disconnect(request.guild_id.get()).await {
        Ok(()) => {
            request
                .reply(embeds::create_info_embed("Desconectado", "👋 ¡Hasta la próxima!"))
                .await
        }
        Err(e) => request.reply_error(e).await,
    }
}

/// Comandos de solo lectura: no exigen estar en el canal de voz.
async fn handle_view(request: Request<'_>) -> Result<()> {
    let session = match request.session() {
        Ok(session) => session,
        Err(e) => return request.reply_error(e).await,
    };

    let embed = match request.command.data.name.as_str() {
        "queue" => {
            let page = option_i64(request.command, "page").unwrap_or(1).max(1) as usize;
            embeds::create_queue_embed(&session.queue_snapshot(QUEUE_LIST_LIMIT), page)
        }
        "history" => embeds::create_history_embed(&session.title_history()),
        _ => match session.current() {
            Some(track) => {
                let embed =
                    embeds::create_now_playing_embed(&track, session.loop_mode(), session.volume());
                let message = CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(PlayerControls::from_session(&session).rows());
                request
                    .command
                    .create_response(&request.ctx.http, CreateInteractionResponse::Message(message))
                    .await?;
                return Ok(());
            }
            None => embeds::create_info_embed("Nada sonando", "Usa `/play` para empezar"),
        },
    };

    request.reply(embed).await
}

/// Comandos que cambian la reproducción.
async fn handle_control(request: Request<'_>) -> Result<()> {
    let session = match request.controlled_session() {
        Ok(session) => session,
        Err(e) => return request.reply_error(e).await,
    };
    let command = request.command;

    let embed = match command.data.name.as_str() {
        "pause" => match session.pause_toggle() {
            PauseState::Paused => embeds::create_info_embed("Pausado", "⏸️ Reproducción pausada"),
            PauseState::Resumed => embeds::create_info_embed("Reanudado", "▶️ Reproducción reanudada"),
            PauseState::NothingToPause => {
                embeds::create_warning_embed("Nada que pausar", "No hay nada sonando")
            }
        },
        "skip" => {
            if session.skip().await {
                embeds::create_info_embed("Saltado", "⏭️ Pasando a la siguiente")
            } else {
                embeds::create_warning_embed("Nada que saltar", "La cola está vacía")
            }
        }
        "prev" => {
            if session.prev().await {
                embeds::create_info_embed("Anterior", "⏮️ Volviendo a la canción anterior")
            } else {
                embeds::create_warning_embed("Sin historial", "No hay canciones anteriores")
            }
        }
        "stop" => {
            if session.stop().await {
                embeds::create_info_embed("Detenido", "⏹️ Reproducción detenida y cola vaciada")
            } else {
                embeds::create_info_embed("Cola vaciada", "No había nada sonando")
            }
        }
        "shuffle" => {
            if session.shuffle() {
                embeds::create_success_embed("Mezclado", "🔀 Cola mezclada")
            } else {
                embeds::create_warning_embed("Nada que mezclar", "La cola está vacía")
            }
        }
        "loop" => {
            let mode = match option_str(command, "mode").map(str::parse::<LoopMode>) {
                Some(Ok(mode)) => Some(mode),
                Some(Err(e)) => return request.reply_error(e).await,
                None => None,
            };
            let mode = session.set_loop(mode);
            embeds::create_info_embed("Repetición", &format!("{} Modo: **{}**", mode.emoji(), mode))
        }
        "remove" => {
            let position = option_i64(command, "position").map(|p| p.max(0) as usize);
            match session.remove(position) {
                Ok(track) => embeds::create_success_embed(
                    "Quitado",
                    &format!("🗑️ **{}** ya no está en la cola", track.title),
                ),
                Err(e) => return request.reply_error(e).await,
            }
        }
        "move" => {
            let from = option_i64(command, "from").unwrap_or(0).max(0) as usize;
            let to = option_i64(command, "to").unwrap_or(0).max(0) as usize;
            match session.move_track(from, to) {
                Ok(()) => embeds::create_success_embed(
                    "Movido",
                    &format!("↕️ La canción {} ahora está en la posición {}", from, to),
                ),
                Err(e) => return request.reply_error(e).await,
            }
        }
        "volume" => match option_i64(command, "level") {
            Some(level) => match session.set_volume(level) {
                Ok(level) => embeds::create_volume_embed(level),
                Err(e) => return request.reply_error(e).await,
            },
            None => embeds::create_volume_embed(session.volume()),
        },
        other => embeds::create_error_embed(
            "Comando no reconocido",
            &format!("No sé qué hacer con /{}", other),
        ),
    };

    request.reply(embed).await
}

async fn handle_settings(request: Request<'_>) -> Result<()> {
    let command = request.command;
    let volume = option_i64(command, "volume").map(|v| v.clamp(0, 100) as u8);
    let auto_timeout = option_bool(command, "auto_timeout");
    let command_channel = option_channel(command, "command_channel");
    let announce = option_bool(command, "announce");
    let require_vc = option_bool(command, "require_vc");
    let start_channel = option_channel(command, "start_channel");
    let reset_channel = option_bool(command, "reset_channel").unwrap_or(false);

    let settings = if command.data.options.is_empty() {
        request.settings
    } else {
        request
            .bot
            .storage
            .lock()
            .await
            .update_guild(request.guild_id.get(), |settings| {
                if let Some(volume) = volume {
                    settings.default_volume = Some(volume);
                }
                if let Some(auto_timeout) = auto_timeout {
                    settings.vc_timeout = Some(auto_timeout);
                }
                if let Some(channel) = command_channel {
                    settings.command_channel = Some(channel.get());
                }
                if reset_channel {
                    settings.command_channel = None;
                }
                if let Some(announce) = announce {
                    settings.announce_songs = announce;
                }
                if let Some(require_vc) = require_vc {
                    settings.user_must_be_in_vc = require_vc;
                }
                if let Some(channel) = start_channel {
                    settings.start_voice_channel = Some(channel.get());
                }
            })
            .await?
    };

    reply(
        request.ctx,
        command,
        embeds::create_settings_embed(&settings, &request.bot.config),
        true,
    )
    .await
}

/// Maneja los botones del reproductor
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let settings = bot.guild_settings(guild_id).await;
    let session = bot.sessions.get(guild_id.get()).and_then(|session| {
        if settings.user_must_be_in_vc {
            ensure_same_voice(ctx, guild_id, component.user.id)?;
        }
        Ok(session)
    });
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            return respond_component(ctx, &component, error_message(e).ephemeral(true), false).await
        }
    };

    match component.data.custom_id.as_str() {
        button_ids::PREVIOUS => {
            session.prev().await;
        }
        button_ids::PLAY_PAUSE => {
            session.pause_toggle();
        }
        button_ids::SKIP => {
            session.skip().await;
        }
        button_ids::LOOP => {
            session.set_loop(None);
        }
        button_ids::SHUFFLE => {
            session.shuffle();
        }
        button_ids::STOP => {
            session.stop().await;
        }
        button_ids::VOLUME_DOWN => {
            session.volume_down();
        }
        button_ids::VOLUME_UP => {
            session.volume_up();
        }
        button_ids::QUEUE => {
            let embed = embeds::create_queue_embed(&session.queue_snapshot(QUEUE_LIST_LIMIT), 1);
            let message = CreateInteractionResponseMessage::new().embed(embed).ephemeral(true);
            return respond_component(ctx, &component, message, false).await;
        }
        button_ids::NOW_PLAYING => {
            let message = match session.current() {
                Some(track) => CreateInteractionResponseMessage::new().embed(
                    embeds::create_now_playing_embed(&track, session.loop_mode(), session.volume()),
                ),
                None => CreateInteractionResponseMessage::new()
                    .embed(embeds::create_info_embed("Nada sonando", "Usa `/play` para empezar")),
            };
            return respond_component(ctx, &component, message.ephemeral(true), false).await;
        }
        other => {
            debug!("Botón desconocido: {}", other);
            let message = CreateInteractionResponseMessage::new()
                .content("❌ Acción no reconocida")
                .ephemeral(true);
            return respond_component(ctx, &component, message, false).await;
        }
    }

    // Refresca los botones del mensaje original
    let message = CreateInteractionResponseMessage::new()
        .components(PlayerControls::from_session(&session).rows());
    respond_component(ctx, &component, message, true).await
}

// Funciones auxiliares

async fn respond_component(
    ctx: &Context,
    component: &ComponentInteraction,
    message: CreateInteractionResponseMessage,
    update: bool,
) -> Result<()> {
    let response = if update {
        CreateInteractionResponse::UpdateMessage(message)
    } else {
        CreateInteractionResponse::Message(message)
    };
    component.create_response(&ctx.http, response).await?;
    Ok(())
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, error: PlayerError) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(error_message(error).ephemeral(true)))
        .await?;
    Ok(())
}

async fn edit_error(ctx: &Context, command: &CommandInteraction, error: PlayerError) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(error_embed(&error)),
        )
        .await?;
    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

fn error_message(error: PlayerError) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new().embed(error_embed(&error))
}

fn error_embed(error: &PlayerError) -> CreateEmbed {
    let title = match error {
        PlayerError::NotConnected | PlayerError::NotInVoice | PlayerError::NotSameVoice => {
            "Canal de voz"
        }
        PlayerError::WrongTextChannel(_) => "Canal equivocado",
        _ => "Error",
    };
    embeds::create_error_embed(title, &capitalize(&error.to_string()))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

fn option_channel(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_channel_id())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// El usuario debe estar escuchando en el mismo canal que el bot.
fn ensure_same_voice(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<(), PlayerError> {
    let bot_id = ctx.cache.current_user().id;
    let user_channel = user_voice_channel(ctx, guild_id, user_id).ok_or(PlayerError::NotInVoice)?;
    match user_voice_channel(ctx, guild_id, bot_id) {
        Some(bot_channel) if bot_channel != user_channel => Err(PlayerError::NotSameVoice),
        _ => Ok(()),
    }
}
