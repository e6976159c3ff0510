//! Tagged player command vocabulary and the controller trait.
//!
//! Every verb the agent speaks to the media player is a [`PlayerCommand`]
//! variant, so the wire encoding is testable without a player and the
//! scheduler/watchdog can run against a fake [`PlayerHandle`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

/// How `loadfile` interacts with the player's internal playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

impl LoadMode {
    fn as_str(self) -> &'static str {
        match self {
            LoadMode::Replace => "replace",
            LoadMode::Append => "append",
        }
    }
}

/// One IPC command, in the player's documented verb set.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    LoadFile { path: PathBuf, mode: LoadMode },
    PlaylistNext,
    PlaylistRemove { index: usize },
    SetProperty { name: String, value: Value },
    GetProperty { name: String },
    SeekAbsolute { seconds: f64 },
}

impl PlayerCommand {
    /// Whether the command expects a response frame to be matched.
    pub fn needs_response(&self) -> bool {
        matches!(self, PlayerCommand::GetProperty { .. })
    }

    /// Wire frame: `{"command": [verb, args...]}` plus an optional
    /// `request_id` for commands that are answered.
    pub fn to_frame(&self, request_id: Option<u64>) -> Value {
        let command = match self {
            PlayerCommand::LoadFile { path, mode } => {
                json!(["loadfile", path.display().to_string(), mode.as_str()])
            }
            PlayerCommand::PlaylistNext => json!(["playlist-next", "force"]),
            PlayerCommand::PlaylistRemove { index } => json!(["playlist-remove", index]),
            PlayerCommand::SetProperty { name, value } => {
                json!(["set_property", name, value])
            }
            PlayerCommand::GetProperty { name } => json!(["get_property", name]),
            PlayerCommand::SeekAbsolute { seconds } => {
                json!(["seek", seconds, "absolute+exact"])
            }
        };
        match request_id {
            Some(id) => json!({ "command": command, "request_id": id }),
            None => json!({ "command": command }),
        }
    }
}

/// Controller surface the playback workers depend on.
///
/// All operations are infallible at the type level: a `false`/`None`
/// return means the command did not take effect and the caller decides
/// whether to restart the player.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    /// Start the player if it is not already running.
    async fn ensure_running(&self) -> bool;
    async fn is_running(&self) -> bool;
    /// Stop and start, bumping the generation on success.
    async fn restart(&self) -> bool;
    /// Monotonic spawn counter; a bump means a fresh child process.
    fn generation(&self) -> u64;

    async fn load_file(&self, path: &Path) -> bool;
    async fn append_file(&self, path: &Path) -> bool;
    async fn playlist_next(&self) -> bool;
    async fn playlist_remove(&self, index: usize) -> bool;
    async fn set_property(&self, name: &str, value: Value) -> bool;
    async fn seek_absolute(&self, seconds: f64) -> bool;
    /// One `get_property idle-active` round trip.
    async fn ping(&self) -> bool;
    async fn get_property(&self, name: &str, timeout: Duration) -> Option<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loadfile_frame_has_no_request_id() {
        let cmd = PlayerCommand::LoadFile {
            path: PathBuf::from("/cache/a.mp4"),
            mode: LoadMode::Replace,
        };
        assert!(!cmd.needs_response());
        assert_eq!(
            cmd.to_frame(None),
            json!({"command": ["loadfile", "/cache/a.mp4", "replace"]})
        );
    }

    #[test]
    fn get_property_frame_carries_request_id() {
        let cmd = PlayerCommand::GetProperty {
            name: "time-pos".to_string(),
        };
        assert!(cmd.needs_response());
        assert_eq!(
            cmd.to_frame(Some(7)),
            json!({"command": ["get_property", "time-pos"], "request_id": 7})
        );
    }

    #[test]
    fn seek_frame_is_absolute_exact() {
        let cmd = PlayerCommand::SeekAbsolute { seconds: 12.5 };
        assert_eq!(
            cmd.to_frame(None),
            json!({"command": ["seek", 12.5, "absolute+exact"]})
        );
    }
}
