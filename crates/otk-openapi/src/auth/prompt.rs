//! Interaction seams of the auth flows: credential entry and browser launch.

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};
use tracing::warn;

/// Source of interactively entered secrets.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Ask for one value. `secret` marks values an implementation may mask.
    async fn prompt(&self, label: &str, secret: bool) -> anyhow::Result<String>;
}

/// Prompts on stderr and reads one line from stdin.
///
/// Input is not masked.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl CredentialPrompt for StdinPrompt {
    async fn prompt(&self, label: &str, _secret: bool) -> anyhow::Result<String> {
        let label = label.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let mut stderr = io::stderr();
            write!(stderr, "{label}: ")?;
            stderr.flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        })
        .await?
    }
}

/// Opens an authorization URL for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Uses the platform opener (`open`, `xdg-open`, or the URL protocol
/// handler on Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

/// Opener invocation passing `url` as one argument, never through a shell.
fn opener_command(url: &str) -> Command {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("rundll32");
        command.arg("url.dll,FileProtocolHandler");
        command
    } else {
        Command::new("xdg-open")
    };
    command.arg(url);
    command
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        let mut child = opener_command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                warn!("Browser opener exited with {}", status);
            }
            Ok(_) => {}
            Err(e) => warn!("Browser opener could not be reaped: {}", e),
        });
        Ok(())
    }
}
