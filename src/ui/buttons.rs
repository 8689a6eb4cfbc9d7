use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::{LoopMode, SessionController, SessionState};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PREVIOUS: &str = "music_prev";
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const LOOP: &str = "music_loop";
    pub const NOW_PLAYING: &str = "music_np";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const QUEUE: &str = "music_queue";
    pub const STOP: &str = "music_stop";
    pub const VOLUME_DOWN: &str = "music_volume_down";
    pub const VOLUME_UP: &str = "music_volume_up";
}

/// Lo que necesitan los botones para decidir su aspecto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerControls {
    pub state: SessionState,
    pub loop_mode: LoopMode,
    pub has_prev: bool,
    pub has_next: bool,
    pub volume: u8,
}

impl PlayerControls {
    pub fn from_session(session: &SessionController) -> Self {
        Self {
            state: session.state(),
            loop_mode: session.loop_mode(),
            has_prev: session.has_prev(),
            has_next: session.has_next(),
            volume: session.volume(),
        }
    }

    /// Crea los controles del reproductor
    pub fn rows(&self) -> Vec<CreateActionRow> {
        let active = self.state != SessionState::Idle;
        let play_pause_emoji = if self.state == SessionState::Playing { '⏸' } else { '▶' };
        let loop_style = match self.loop_mode {
            LoopMode::Off => ButtonStyle::Secondary,
            LoopMode::All | LoopMode::Single => ButtonStyle::Success,
        };
        let loop_emoji = if self.loop_mode == LoopMode::Single { '🔂' } else { '🔁' };

        let row1 = CreateActionRow::Buttons(vec![
            CreateButton::new(button_ids::PREVIOUS)
                .emoji('⏮')
                .style(ButtonStyle::Secondary)
                .disabled(!self.has_prev),
            CreateButton::new(button_ids::PLAY_PAUSE)
                .emoji(play_pause_emoji)
                .style(ButtonStyle::Primary)
                .disabled(!active),
            CreateButton::new(button_ids::SKIP)
                .emoji('⏭')
                .style(ButtonStyle::Secondary)
                .disabled(!active && !self.has_next),
            CreateButton::new(button_ids::LOOP)
                .emoji(loop_emoji)
                .style(loop_style),
            CreateButton::new(button_ids::NOW_PLAYING)
                .emoji('🎵')
                .style(ButtonStyle::Secondary)
                .disabled(!active),
        ]);

        let row2 = CreateActionRow::Buttons(vec![
            CreateButton::new(button_ids::SHUFFLE)
                .emoji('🔀')
                .style(ButtonStyle::Secondary)
                .disabled(!self.has_next),
            CreateButton::new(button_ids::QUEUE)
                .label("Cola")
                .emoji('📋')
                .style(ButtonStyle::Secondary),
            CreateButton::new(button_ids::STOP)
                .emoji('⏹')
                .style(ButtonStyle::Danger)
                .disabled(!active && !self.has_next),
            CreateButton::new(button_ids::VOLUME_DOWN)
                .emoji('🔉')
                .style(ButtonStyle::Secondary)
                .disabled(self.volume <= 10),
            CreateButton::new(button_ids::VOLUME_UP)
                .emoji('🔊')
                .style(ButtonStyle::Secondary)
                .disabled(self.volume >= 100),
        ]);

        vec![row1, row2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn disabled(rows: &[CreateActionRow], id: &str) -> bool {
        rows.iter()
            .flat_map(|row| {
                serde_json::to_value(row).unwrap()["components"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
            })
            .find(|button| button["custom_id"] == Value::from(id))
            .map(|button| button["disabled"].as_bool().unwrap_or(false))
            .unwrap()
    }

    fn controls() -> PlayerControls {
        PlayerControls {
            state: SessionState::Playing,
            loop_mode: LoopMode::Off,
            has_prev: true,
            has_next: true,
            volume: 50,
        }
    }

    #[test]
    fn idle_session_disables_transport_buttons() {
        let rows = PlayerControls {
            state: SessionState::Idle,
            has_prev: false,
            has_next: false,
            ..controls()
        }
        .rows();

        assert!(disabled(&rows, button_ids::PREVIOUS));
        assert!(disabled(&rows, button_ids::PLAY_PAUSE));
        assert!(disabled(&rows, button_ids::SKIP));
        assert!(disabled(&rows, button_ids::STOP));
        assert!(!disabled(&rows, button_ids::QUEUE));
    }

    #[test]
    fn volume_buttons_respect_bounds() {
        let rows = PlayerControls { volume: 100, ..controls() }.rows();
        assert!(disabled(&rows, button_ids::VOLUME_UP));
        assert!(!disabled(&rows, button_ids::VOLUME_DOWN));

        let rows = PlayerControls { volume: 10, ..controls() }.rows();
        assert!(disabled(&rows, button_ids::VOLUME_DOWN));
    }

    #[test]
    fn every_button_fits_discord_row_limit() {
        for row in controls().rows() {
            let json = serde_json::to_value(&row).unwrap();
            assert!(json["components"].as_array().unwrap().len() <= 5);
        }
    }
}
