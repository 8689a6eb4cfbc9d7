use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        queue::{QueuePage, QueueSnapshot},
        LoopMode, TrackView,
    },
    config::Config,
    storage::GuildSettings,
};

/// Canciones por página en `/queue`
pub const QUEUE_PAGE_SIZE: usize = 10;
/// Máximo de canciones que se listan en total
pub const QUEUE_LIST_LIMIT: usize = 25;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Encore";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackView, loop_mode: LoopMode, volume: u8) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field(
            "🎤 Artista",
            track.uploader.as_deref().unwrap_or("Desconocido"),
            true,
        )
        .field("⏱️ Duración", duration_label(track.duration), true);

    if let Some(user) = track.requested_by {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    embed = embed
        .field("🔗 Fuente", track.site.label(), true)
        .field(
            format!("{} Repetición", loop_mode.emoji()),
            loop_mode.to_string(),
            true,
        )
        .field("🔊 Volumen", format!("{}%", volume), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &TrackView, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("🔗 Fuente", track.site.label(), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(&track.url)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
}

/// Crea un embed para mostrar que una playlist fue agregada
pub fn create_playlist_added_embed(track_count: usize) -> CreateEmbed {
    let description = if track_count == 1 {
        "Se agregó **1 canción** de la playlist a la cola".to_string()
    } else {
        format!("Se agregaron **{} canciones** de la playlist a la cola", track_count)
    };

    CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(
            "🎵 Las canciones se preparan en segundo plano • Usa /queue para verlas",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let queue_page = snapshot.get_page(page, QUEUE_PAGE_SIZE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            format!("{} Reproduciendo", snapshot.loop_mode.emoji()),
            format!("**{}**", current.title),
            false,
        );
    }

    if snapshot.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if !queue_page.items.is_empty() {
        embed = embed.field("Próximas canciones", queue_lines(&queue_page), false);
    }

    let mut info = format!("**Total:** {} canciones", snapshot.total_items);
    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(snapshot.total_duration)
        ));
    }
    if snapshot.total_items > snapshot.items.len() {
        info.push_str(&format!(
            " • mostrando las primeras {}",
            snapshot.items.len()
        ));
    }
    embed = embed.field("Información", info, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Encore",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed con las últimas canciones reproducidas
pub fn create_history_embed(titles: &[String]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🕘 Reproducidas Recientemente")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if titles.is_empty() {
        return embed
            .description("Todavía no ha sonado nada")
            .color(colors::NEUTRAL_GRAY);
    }

    let lines: Vec<String> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| format!("**{}**. {}", i + 1, title))
        .collect();
    embed.description(lines.join("\n"))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(level: u8) -> CreateEmbed {
    let status_emoji = match level {
        0 => "🔇",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volumen", status_emoji))
        .description(format!("**Volumen actual: {}%**", level))
        .field("📊 Nivel", volume_bar(level), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa los botones o /volume <nivel> para ajustar"))
}

/// Muestra la configuración efectiva del servidor
pub fn create_settings_embed(settings: &GuildSettings, config: &Config) -> CreateEmbed {
    let channel = |id: Option<u64>| id.map_or("cualquiera".to_string(), |id| format!("<#{}>", id));
    let yes_no = |flag: bool| if flag { "sí" } else { "no" };

    CreateEmbed::default()
        .title("⚙️ Configuración del Servidor")
        .color(colors::INFO_BLUE)
        .field(
            "🔊 Volumen por defecto",
            format!("{}%", settings.default_volume.unwrap_or(config.default_volume)),
            true,
        )
        .field(
            "⏰ Salir por inactividad",
            format!(
                "{} ({})",
                yes_no(settings.vc_timeout.unwrap_or(config.auto_timeout_default)),
                humantime::format_duration(config.idle_timeout)
            ),
            true,
        )
        .field("💬 Canal de comandos", channel(settings.command_channel), true)
        .field("📣 Anunciar canciones", yes_no(settings.announce_songs), true)
        .field("🎧 Exigir canal de voz", yes_no(settings.user_must_be_in_vc), true)
        .field("🔈 Canal de voz inicial", channel(settings.start_voice_channel), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn queue_lines(page: &QueuePage) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let duration = item
                .duration
                .map(|dur| format!(" `[{}]`", format_duration(dur)))
                .unwrap_or_default();
            format!("**{}**. {}{}\n", page.first_position + i, item.title, duration)
        })
        .collect()
}

fn duration_label(duration: Option<Duration>) -> String {
    duration.map_or_else(|| "🔴 En vivo".to_string(), format_duration)
}

/// Crea una barra visual de volumen
fn volume_bar(level: u8) -> String {
    let segments = 20;
    let filled = (usize::from(level.min(100)) * segments) / 100;
    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::{Origin, SiteKind, Track};
    use pretty_assertions::assert_eq;

    #[test]
    fn durations_are_clock_formatted() {
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
        assert_eq!(duration_label(None), "🔴 En vivo");
    }

    #[test]
    fn volume_bar_scales_to_twenty_segments() {
        assert_eq!(volume_bar(0), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(volume_bar(50), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(volume_bar(100), format!("`[{}]`", "█".repeat(20)));
    }

    #[test]
    fn queue_lines_number_from_page_offset() {
        let items: Vec<TrackView> = (0..12)
            .map(|i| Track::new(format!("song{i}"), Origin::Direct, SiteKind::YouTube).view())
            .collect();
        let snapshot = QueueSnapshot {
            current: None,
            total_items: items.len(),
            items,
            loop_mode: LoopMode::Off,
            total_duration: Duration::ZERO,
        };

        let second = snapshot.get_page(2, QUEUE_PAGE_SIZE);
        let lines = queue_lines(&second);
        assert!(lines.starts_with("**11**. song10"));
        assert_eq!(lines.lines().count(), 2);
    }
}
