//! Media player child-process controller.
//!
//! Owns the single external player: spawn, supervise, tear down, and the
//! IPC traffic to it. Two locks split the responsibilities: the process
//! lock guards lifecycle (spawn/stop/restart), the IPC lock serializes
//! send/recv sequences so responses cannot interleave.
//!
//! Lock order is always process → IPC.

pub mod command;
pub mod ipc;

pub use command::{LoadMode, PlayerCommand, PlayerHandle};

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, SharedConfig};
use ipc::IpcChannel;

const IPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const START_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Command line for the player child, derived from config.
///
/// The player idles fullscreen with a forced window so the screen never
/// drops to the desktop between items; images display until replaced.
pub fn build_player_args(cfg: &Config) -> Vec<String> {
    let mut args = vec![
        "--fs".to_string(),
        "--force-window=yes".to_string(),
        "--idle=yes".to_string(),
        "--keep-open=yes".to_string(),
        "--no-terminal".to_string(),
        "--loop-file=inf".to_string(),
        "--image-display-duration=inf".to_string(),
        "--no-osc".to_string(),
        "--osd-level=0".to_string(),
        format!("--input-ipc-server={}", cfg.ipc_path.display()),
        "--no-input-default-bindings".to_string(),
    ];
    if cfg.low_resource_mode {
        args.extend(
            [
                "--profile=low-latency",
                "--video-sync=audio",
                "--vd-lavc-threads=1",
                "--scale=bilinear",
                "--dscale=bilinear",
                "--cscale=bilinear",
                "--interpolation=no",
                "--correct-pts=no",
                "--framedrop=decoder+vo",
                "--hwdec-codecs=h264,mpeg4,mpeg2video",
            ]
            .map(String::from),
        );
    }
    args.push(format!("--video-rotate={}", cfg.rotation_deg));
    if cfg.lock_input {
        args.push("--input-vo-keyboard=no".to_string());
    }
    if cfg.mute {
        args.push("--mute=yes".to_string());
    }
    if !cfg.hwdec.is_empty() {
        args.push(format!("--hwdec={}", cfg.hwdec));
    }
    args
}

/// Supervisor for the external media player.
pub struct PlayerController {
    config: SharedConfig,
    process: Mutex<Option<Child>>,
    channel: Mutex<Option<IpcChannel>>,
    generation: AtomicU64,
}

impl PlayerController {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
            channel: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Spawn the player and open its IPC channel.
    ///
    /// On a failed first attempt the child is torn down, we sleep briefly
    /// and try once more.
    pub async fn start(&self) -> bool {
        let mut process = self.process.lock().await;
        if is_alive(&mut process) && self.channel.lock().await.is_some() {
            return true;
        }
        if self.spawn_and_connect(&mut process).await {
            return true;
        }
        self.stop_locked(&mut process).await;
        tokio::time::sleep(START_RETRY_DELAY).await;
        if self.spawn_and_connect(&mut process).await {
            return true;
        }
        self.stop_locked(&mut process).await;
        false
    }

    /// Stop the child and remove the IPC endpoint.
    pub async fn stop(&self) {
        let mut process = self.process.lock().await;
        self.stop_locked(&mut process).await;
    }

    async fn spawn_and_connect(&self, process: &mut Option<Child>) -> bool {
        let cfg = self.config.snapshot();
        self.channel.lock().await.take();
        ipc::remove_stale_endpoint(&cfg.ipc_path).await;

        let mut command = Command::new(&cfg.player_path);
        command
            .args(build_player_args(&cfg))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        // New session so signals address the whole player process group.
        unsafe {
            command.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn player '{}': {e}", cfg.player_path);
                return false;
            }
        };
        let pid = child.id();
        *process = Some(child);

        match IpcChannel::connect(&cfg.ipc_path, IPC_CONNECT_TIMEOUT).await {
            Ok(channel) => {
                *self.channel.lock().await = Some(channel);
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                info!("Player started (pid {pid:?}, generation {generation})");
                true
            }
            Err(e) => {
                warn!("Player IPC not available: {e}");
                false
            }
        }
    }

    async fn stop_locked(&self, process: &mut Option<Child>) {
        self.channel.lock().await.take();
        if let Some(mut child) = process.take() {
            terminate(&mut child).await;
        }
        let cfg = self.config.snapshot();
        ipc::remove_stale_endpoint(&cfg.ipc_path).await;
    }

    /// Fire-and-forget write; `true` iff the frame went out.
    async fn send_command(&self, command: PlayerCommand) -> bool {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return false;
        };
        match channel.send(&command.to_frame(None)).await {
            Ok(()) => true,
            Err(e) => {
                debug!("IPC send failed: {e}");
                false
            }
        }
    }

    /// Full round trip, holding the IPC lock until the response arrives.
    async fn send_request(&self, command: PlayerCommand, timeout: Duration) -> Option<Value> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut()?;
        let request_id = ipc::next_request_id();
        if let Err(e) = channel.send(&command.to_frame(Some(request_id))).await {
            debug!("IPC send failed: {e}");
            return None;
        }
        match channel.recv_response(request_id, timeout).await {
            Ok(response) => Some(response),
            Err(e) => {
                debug!("IPC recv failed: {e}");
                None
            }
        }
    }
}

fn is_alive(process: &mut Option<Child>) -> bool {
    match process.as_mut() {
        Some(child) => matches!(child.try_wait(), Ok(None)),
        None => false,
    }
}

/// Graceful group termination: SIGTERM, bounded wait, then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::killpg(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, child.wait())
                .await
                .is_ok()
            {
                return;
            }
            warn!("Player ignored SIGTERM, killing process group");
            unsafe {
                libc::killpg(pid as i32, libc::SIGKILL);
            }
            let _ = child.wait().await;
            return;
        }
    }
    let _ = child.start_kill();
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await;
}

#[async_trait]
impl PlayerHandle for PlayerController {
    async fn ensure_running(&self) -> bool {
        let mut process = self.process.lock().await;
        if is_alive(&mut process) {
            return true;
        }
        drop(process);
        self.start().await
    }

    async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        is_alive(&mut process)
    }

    async fn restart(&self) -> bool {
        self.stop().await;
        tokio::time::sleep(START_RETRY_DELAY).await;
        self.start().await
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn load_file(&self, path: &Path) -> bool {
        self.send_command(PlayerCommand::LoadFile {
            path: path.to_path_buf(),
            mode: LoadMode::Replace,
        })
        .await
    }

    async fn append_file(&self, path: &Path) -> bool {
        self.send_command(PlayerCommand::LoadFile {
            path: path.to_path_buf(),
            mode: LoadMode::Append,
        })
        .await
    }

    async fn playlist_next(&self) -> bool {
        self.send_command(PlayerCommand::PlaylistNext).await
    }

    async fn playlist_remove(&self, index: usize) -> bool {
        self.send_command(PlayerCommand::PlaylistRemove { index })
            .await
    }

    async fn set_property(&self, name: &str, value: Value) -> bool {
        self.send_command(PlayerCommand::SetProperty {
            name: name.to_string(),
            value,
        })
        .await
    }

    async fn seek_absolute(&self, seconds: f64) -> bool {
        self.send_command(PlayerCommand::SeekAbsolute { seconds })
            .await
    }

    async fn ping(&self) -> bool {
        self.get_property("idle-active", RESPONSE_TIMEOUT)
            .await
            .is_some()
    }

    async fn get_property(&self, name: &str, timeout: Duration) -> Option<Value> {
        let response = self
            .send_request(
                PlayerCommand::GetProperty {
                    name: name.to_string(),
                },
                timeout,
            )
            .await?;
        if response.get("error").and_then(Value::as_str) == Some("success") {
            Some(response.get("data").cloned().unwrap_or(Value::Null))
        } else {
            None
        }
    }
}
