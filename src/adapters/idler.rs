//! `SteamClient` backed by helper processes.
//!
//! Each idled game gets one child launched from `idle_command` with `{appid}`
//! substituted. The helper attaches to the locally running Steam client and
//! shows the game as being played for as long as it lives.

use crate::adapters::http::HttpSession;
use crate::adapters::library::resolve_vanity_url;
use crate::config::settings::STEAM_MAX_GAMES;
use crate::config::Settings;
use crate::domain::model::AppId;
use crate::domain::ports::SteamClient;
use crate::utils::error::{BotError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

const APPID_PLACEHOLDER: &str = "{appid}";

pub struct ProcessIdler {
    settings: Settings,
    http: HttpSession,
    program: Option<PathBuf>,
    children: Vec<(AppId, Child)>,
    steam_id: Option<String>,
    logged_in: bool,
}

impl ProcessIdler {
    pub fn new(settings: Settings, http: HttpSession) -> Self {
        Self {
            settings,
            http,
            program: None,
            children: Vec::new(),
            steam_id: None,
            logged_in: false,
        }
    }

    pub fn idled_games(&self) -> Vec<AppId> {
        self.children.iter().map(|(app_id, _)| *app_id).collect()
    }

    fn command_for(&self, program: &Path, app_id: AppId) -> Command {
        let mut command = Command::new(program);
        let id = app_id.to_string();
        command
            .args(
                self.settings
                    .idle_command
                    .iter()
                    .skip(1)
                    .map(|arg| arg.replace(APPID_PLACEHOLDER, &id)),
            )
            .env("SteamAppId", &id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn kill_children(&mut self) {
        for (app_id, mut child) in self.children.drain(..) {
            if let Err(e) = child.kill().await {
                tracing::debug!("Idle helper for {} already gone: {}", app_id, e);
            }
        }
    }

    async fn resolve_steam_id(&self) -> Result<Option<String>> {
        let Some(configured) = self
            .settings
            .steam_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        let is_steam64 = configured.len() >= 17 && configured.chars().all(|c| c.is_ascii_digit());
        match self.settings.api_key() {
            Some(key) if !is_steam64 && !configured.contains('/') => {
                let resolved = resolve_vanity_url(
                    &self.http,
                    &self.settings.endpoints.web_api_url,
                    key,
                    configured,
                )
                .await?;
                tracing::debug!("Resolved vanity name {} to {}", configured, resolved);
                Ok(Some(resolved))
            }
            _ => Ok(Some(configured.to_string())),
        }
    }
}

/// Looks `program` up the way a shell would: paths are used as-is, bare names
/// are searched on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| path.is_file())
}

#[async_trait]
impl SteamClient for ProcessIdler {
    async fn initialize(&mut self) -> Result<()> {
        let program = self
            .settings
            .idle_command
            .first()
            .cloned()
            .unwrap_or_default();
        let path = find_program(&program).ok_or(BotError::IdleHelperMissing { program })?;
        tracing::info!("Idle helper found at {}", path.display());
        self.program = Some(path);
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        let Some(program) = self.program.as_deref() else {
            return Err(BotError::ConnectionError {
                message: "Steam client not initialized".to_string(),
            });
        };
        let program = program.display().to_string();
        let username = self.settings.ensure_credentials_configured()?.to_string();

        tracing::info!("{}", "=".repeat(60));
        tracing::info!("🔐 STEAM SIGN-IN");
        tracing::info!("{}", "=".repeat(60));
        tracing::info!("Account: {}", username);
        tracing::info!("Presence is handed to the idle helper ({})", program);
        tracing::info!("⚠️  The local Steam client must be signed in as {}", username);
        tracing::info!("⚠️  Approve Steam Guard prompts in the Steam client or mobile app");
        tracing::info!("⚠️  Use Ctrl+C to stop the bot at any time");
        tracing::info!("{}", "=".repeat(60));

        self.steam_id = self.resolve_steam_id().await.map_err(|e| match e {
            e @ BotError::AuthenticationError { .. } => e,
            other => BotError::AuthenticationError {
                message: format!("Login failed: {}", other),
            },
        })?;
        self.logged_in = true;

        tracing::info!("🎮 Idle helper ready for {}", username);
        match &self.steam_id {
            Some(id) => tracing::debug!("Steam ID: {}", id),
            None => tracing::warn!("No steam_id configured; owned games and drop checks are limited"),
        }
        Ok(())
    }

    fn steam_id(&self) -> Option<String> {
        self.steam_id.clone()
    }

    async fn start_idling(&mut self, games: &[AppId]) -> Result<()> {
        let Some(program) = self.program.clone() else {
            return Err(BotError::ConnectionError {
                message: "Steam client not initialized".to_string(),
            });
        };
        if !self.logged_in {
            return Err(BotError::ConnectionError {
                message: "Not connected to Steam".to_string(),
            });
        }

        self.kill_children().await;
        let games = &games[..games.len().min(STEAM_MAX_GAMES)];
        for &app_id in games {
            let child = self.command_for(&program, app_id).spawn().map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BotError::IdleHelperMissing {
                        program: program.display().to_string(),
                    }
                } else {
                    BotError::ConnectionError {
                        message: format!("Failed to start idling {}: {}", app_id, e),
                    }
                }
            })?;
            self.children.push((app_id, child));
        }

        tracing::info!("Started idling {} games: {:?}", games.len(), games);
        Ok(())
    }

    async fn stop_idling(&mut self) -> Result<()> {
        if self.children.is_empty() {
            return Ok(());
        }
        self.kill_children().await;
        tracing::info!("Stopped idling all games");
        Ok(())
    }

    async fn is_connected(&mut self) -> bool {
        if !self.logged_in {
            return false;
        }
        self.children
            .iter_mut()
            .all(|(_, child)| matches!(child.try_wait(), Ok(None)))
    }

    async fn logout(&mut self) -> Result<()> {
        self.kill_children().await;
        if self.logged_in {
            self.logged_in = false;
            tracing::info!("Logged out from Steam");
        }
        Ok(())
    }
}
