use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, channel::ChannelType, id::GuildId, Permissions},
    prelude::Context,
};

/// Todos los comandos slash del bot.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        skip_command(),
        stop_command(),
        prev_command(),
        queue_command(),
        nowplaying_command(),
        history_command(),
        shuffle_command(),
        loop_command(),
        remove_command(),
        move_command(),
        volume_command(),
        join_command(),
        leave_command(),
        settings_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción, playlist o búsqueda")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa o reanuda la reproducción")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn prev_command() -> CreateCommand {
    CreateCommand::new("prev").description("Vuelve a la canción anterior")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

fn history_command() -> CreateCommand {
    CreateCommand::new("history").description("Muestra las últimas canciones reproducidas")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Cola", "all")
                .add_string_choice("Canción", "single"),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola (por defecto, la última)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1),
        )
}

fn move_command() -> CreateCommand {
    CreateCommand::new("move")
        .description("Mueve una canción dentro de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "from", "Posición actual")
                .min_int_value(1)
                .required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "to", "Nueva posición")
                .min_int_value(1)
                .required(true),
        )
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Configuración del servidor

fn settings_command() -> CreateCommand {
    CreateCommand::new("settings")
        .description("Muestra o cambia la configuración del servidor")
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "volume", "Volumen por defecto")
                .min_int_value(0)
                .max_int_value(100),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "auto_timeout",
            "Salir por inactividad aunque haya oyentes",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "command_channel",
                "Único canal donde se aceptan comandos",
            )
            .channel_types(vec![ChannelType::Text]),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "announce",
            "Anunciar cada canción que empieza",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "require_vc",
            "Exigir estar en el canal de voz del bot",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Channel,
                "start_channel",
                "Canal de voz por defecto",
            )
            .channel_types(vec![ChannelType::Voice]),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "reset_channel",
            "Quitar la restricción de canal de comandos",
        ))
}
