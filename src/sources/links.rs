//! Clasificación de localizadores: URL de un sitio conocido, playlist o búsqueda.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::audio::track::{PlaylistKind, SiteKind};

/// Extensiones que se reproducen directamente sin pasar por un extractor.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".webm", ".mp4", ".mp3", ".avi", ".wav", ".m4v", ".ogg", ".mov",
];

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*\(\),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+")
        .expect("URL regex is valid")
});

/// Primera URL presente en el texto, si la hay.
pub fn find_url(content: &str) -> Option<&str> {
    URL_REGEX.find(content).map(|m| m.as_str())
}

pub fn identify_site(locator: &str) -> SiteKind {
    if locator.contains("https://www.youtu") || locator.contains("https://youtu.be") {
        return SiteKind::YouTube;
    }
    if locator.contains("https://open.spotify.com/track") {
        return SiteKind::Spotify;
    }
    if locator.contains("https://open.spotify.com/playlist")
        || locator.contains("https://open.spotify.com/album")
    {
        return SiteKind::SpotifyPlaylist;
    }
    if locator.contains("bandcamp.com/track/") {
        return SiteKind::Bandcamp;
    }
    if locator.contains("https://twitter.com/") {
        return SiteKind::Twitter;
    }
    if has_supported_extension(locator) {
        return SiteKind::Custom;
    }
    if locator.contains("soundcloud.com/") {
        return SiteKind::SoundCloud;
    }
    SiteKind::Unknown
}

pub fn identify_playlist(locator: &str) -> PlaylistKind {
    if locator.contains("playlist?list=") {
        return PlaylistKind::YouTube;
    }
    if locator.contains("https://open.spotify.com/playlist")
        || locator.contains("https://open.spotify.com/album")
    {
        return PlaylistKind::Spotify;
    }
    if locator.contains("bandcamp.com/album/") {
        return PlaylistKind::Bandcamp;
    }
    PlaylistKind::Unknown
}

/// Normaliza el localizador antes de crear el track.
pub fn normalize(locator: &str, site: SiteKind) -> String {
    let trimmed = locator.trim();
    match site {
        // Un video dentro de una lista se reproduce solo
        SiteKind::YouTube => trimmed
            .split("&list=")
            .next()
            .unwrap_or(trimmed)
            .to_string(),
        SiteKind::SoundCloud => match trimmed.strip_prefix("https://m.") {
            Some(rest) => format!("https://{rest}"),
            None => trimmed.to_string(),
        },
        _ => trimmed.to_string(),
    }
}

fn has_supported_extension(locator: &str) -> bool {
    let path = Url::parse(locator)
        .map(|url| url.path().to_lowercase())
        .unwrap_or_else(|_| locator.to_lowercase());
    SUPPORTED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identifies_sites() {
        assert_eq!(identify_site("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), SiteKind::YouTube);
        assert_eq!(identify_site("https://youtu.be/dQw4w9WgXcQ"), SiteKind::YouTube);
        assert_eq!(identify_site("https://open.spotify.com/track/4uLU6hMC"), SiteKind::Spotify);
        assert_eq!(identify_site("https://open.spotify.com/album/1A2B"), SiteKind::SpotifyPlaylist);
        assert_eq!(identify_site("https://artist.bandcamp.com/track/song"), SiteKind::Bandcamp);
        assert_eq!(identify_site("https://twitter.com/user/status/1"), SiteKind::Twitter);
        assert_eq!(identify_site("https://files.example.com/a/Song.MP3"), SiteKind::Custom);
        assert_eq!(identify_site("https://files.example.com/a/song.ogg?sig=1"), SiteKind::Custom);
        assert_eq!(identify_site("https://soundcloud.com/artist/track"), SiteKind::SoundCloud);
        assert_eq!(identify_site("never gonna give you up"), SiteKind::Unknown);
        assert_eq!(identify_site("https://example.com/page"), SiteKind::Unknown);
    }

    #[test]
    fn identifies_playlists() {
        assert_eq!(
            identify_playlist("https://www.youtube.com/playlist?list=PL123"),
            PlaylistKind::YouTube
        );
        assert_eq!(
            identify_playlist("https://www.youtube.com/watch?v=abc&list=PL123"),
            PlaylistKind::Unknown
        );
        assert_eq!(
            identify_playlist("https://open.spotify.com/playlist/37i9"),
            PlaylistKind::Spotify
        );
        assert_eq!(
            identify_playlist("https://artist.bandcamp.com/album/record"),
            PlaylistKind::Bandcamp
        );
    }

    #[test]
    fn normalizes_locators() {
        assert_eq!(
            normalize("https://www.youtube.com/watch?v=abc&list=PL1&index=2", SiteKind::YouTube),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(
            normalize("https://m.soundcloud.com/a/b", SiteKind::SoundCloud),
            "https://soundcloud.com/a/b"
        );
        assert_eq!(normalize("  lofi  ", SiteKind::Unknown), "lofi");
    }

    #[test]
    fn finds_urls_inside_text() {
        assert_eq!(
            find_url("mira esto https://example.com/x ahora"),
            Some("https://example.com/x")
        );
        assert_eq!(find_url("solo texto"), None);
    }
}
