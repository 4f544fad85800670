//! Keyboard shortcuts
//!
//! Maps key names (DOM `KeyboardEvent.key` values) to player commands.
//! Keys without a binding are not consumed so the caller can pass them on.

use crate::error::Result;
use crate::playback::Player;
use serde::Serialize;
use tracing::debug;

const VOLUME_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCommand {
    TogglePlay,
    SkipBack,
    SkipForward,
    VolumeUp,
    VolumeDown,
    ToggleMute,
    PreviousChapter,
    NextChapter,
    /// Pause, then close the session
    Close,
}

impl KeyCommand {
    pub fn parse(key: &str) -> Option<Self> {
        let command = match key {
            " " | "Space" | "Spacebar" => Self::TogglePlay,
            "ArrowLeft" => Self::SkipBack,
            "ArrowRight" => Self::SkipForward,
            "ArrowUp" => Self::VolumeUp,
            "ArrowDown" => Self::VolumeDown,
            "m" | "M" => Self::ToggleMute,
            "[" => Self::PreviousChapter,
            "]" => Self::NextChapter,
            "Escape" | "Esc" => Self::Close,
            _ => return None,
        };
        Some(command)
    }
}

impl Player {
    /// Apply a key press; `Ok(None)` when the key is not bound
    pub async fn handle_key(&self, key: &str) -> Result<Option<KeyCommand>> {
        let Some(command) = KeyCommand::parse(key) else {
            return Ok(None);
        };
        debug!("Key {:?} -> {:?}", key, command);

        let skip = self.config().playback.skip_seconds;
        match command {
            KeyCommand::TogglePlay => {
                self.toggle_play().await?;
            }
            KeyCommand::SkipBack => {
                self.skip(-skip).await?;
            }
            KeyCommand::SkipForward => {
                self.skip(skip).await?;
            }
            KeyCommand::VolumeUp | KeyCommand::VolumeDown => {
                let step = if command == KeyCommand::VolumeUp {
                    VOLUME_STEP
                } else {
                    -VOLUME_STEP
                };
                let volume = self.snapshot().await?.volume;
                self.set_volume(volume + step).await?;
            }
            KeyCommand::ToggleMute => {
                self.toggle_mute().await?;
            }
            KeyCommand::PreviousChapter => {
                self.previous_chapter().await?;
            }
            KeyCommand::NextChapter => {
                self.next_chapter().await?;
            }
            KeyCommand::Close => {
                self.pause().await?;
                self.close().await;
            }
        }
        Ok(Some(command))
    }
}
