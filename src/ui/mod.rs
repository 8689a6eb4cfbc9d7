//! Embeds y botones de Discord.

pub mod buttons;
pub mod embeds;
