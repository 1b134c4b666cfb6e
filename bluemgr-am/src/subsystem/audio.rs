//! Audio server control via `pactl`

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::{CommandLine, CommandOutcome, CommandRunner};
use crate::parser;

/// Integration modules the audio server needs to expose Bluetooth sinks
pub const BLUETOOTH_MODULES: [&str; 2] = ["module-bluetooth-discover", "module-bluetooth-policy"];

/// Typed operations on the audio server
#[derive(Clone)]
pub struct AudioControl {
    runner: Arc<dyn CommandRunner>,
    pactl: String,
    daemon: String,
}

impl AudioControl {
    pub fn new(runner: Arc<dyn CommandRunner>, pactl: impl Into<String>, daemon: impl Into<String>) -> Self {
        Self {
            runner,
            pactl: pactl.into(),
            daemon: daemon.into(),
        }
    }

    fn pactl<I, S>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::new(self.pactl.clone()).args(args)
    }

    async fn run(&self, cmd: CommandLine) -> Result<String> {
        self.runner.execute(&cmd).await.into_result(&cmd)
    }

    async fn list_short(&self, what: &str) -> Result<String> {
        self.run(self.pactl(["list", what, "short"])).await
    }

    pub async fn list_sinks(&self) -> Result<String> {
        self.list_short("sinks").await
    }

    pub async fn list_cards(&self) -> Result<String> {
        self.list_short("cards").await
    }

    pub async fn list_modules(&self) -> Result<String> {
        self.list_short("modules").await
    }

    pub async fn list_streams(&self) -> Result<String> {
        self.list_short("sink-inputs").await
    }

    pub async fn default_sink(&self) -> Result<String> {
        let text = self.run(self.pactl(["get-default-sink"])).await?;
        Ok(text.trim().to_string())
    }

    pub async fn set_default_sink(&self, sink: &str) -> Result<()> {
        self.run(self.pactl(["set-default-sink", sink])).await.map(|_| ())
    }

    pub async fn set_volume(&self, sink: &str, percent: u8) -> Result<()> {
        let volume = format!("{}%", percent);
        self.run(self.pactl(["set-sink-volume", sink, volume.as_str()]))
            .await
            .map(|_| ())
    }

    pub async fn unmute(&self, sink: &str) -> Result<()> {
        self.run(self.pactl(["set-sink-mute", sink, "0"])).await.map(|_| ())
    }

    /// Identifiers of the currently active playback streams
    pub async fn stream_ids(&self) -> Result<Vec<String>> {
        let listing = self.list_streams().await?;
        Ok(parser::parse_stream_ids(&listing))
    }

    pub async fn move_stream(&self, stream_id: &str, sink: &str) -> Result<()> {
        self.run(self.pactl(["move-sink-input", stream_id, sink]))
            .await
            .map(|_| ())
    }

    /// Select a card profile; true if the server accepted it
    pub async fn set_card_profile(&self, card: &str, profile: &str) -> bool {
        let cmd = self.pactl(["set-card-profile", card, profile]);
        match self.runner.execute(&cmd).await {
            CommandOutcome::Ok(text) => !parser::profile_rejected(&text),
            CommandOutcome::Failed(text) => {
                debug!(card, profile, "Profile rejected: {}", text.trim());
                false
            }
            CommandOutcome::TimedOut => false,
        }
    }

    pub async fn load_module(&self, module: &str) -> CommandOutcome {
        self.runner.execute(&self.pactl(["load-module", module])).await
    }

    pub async fn unload_module(&self, module: &str) -> CommandOutcome {
        self.runner.execute(&self.pactl(["unload-module", module])).await
    }

    /// Load each of the Bluetooth integration modules that is not already
    /// loaded; returns the modules that were loaded
    pub async fn ensure_bluetooth_modules(&self) -> Result<Vec<&'static str>> {
        let modules = self.list_modules().await?;
        let mut loaded = Vec::new();

        for module in BLUETOOTH_MODULES {
            if parser::module_loaded(&modules, module) {
                continue;
            }

            info!(module, "Loading audio server module");
            match self.load_module(module).await {
                CommandOutcome::Ok(_) => loaded.push(module),
                other => warn!(module, outcome = ?other, "Module load failed"),
            }
        }

        Ok(loaded)
    }

    /// Ask the audio server daemon to exit
    pub async fn stop_server(&self) -> CommandOutcome {
        self.runner
            .execute(&CommandLine::new(self.daemon.clone()).arg("-k"))
            .await
    }

    pub async fn start_server(&self) -> CommandOutcome {
        self.runner
            .execute(&CommandLine::new(self.daemon.clone()).arg("--start"))
            .await
    }
}
