//! Encore: bot de música para Discord.
//!
//! The crate is split so the playback core can be exercised without a
//! Discord connection: [`audio`] and [`sources`] know nothing about
//! serenity, while [`bot`] and [`ui`] adapt them to slash commands.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
