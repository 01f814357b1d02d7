//! Desktop actions: the side effects a plan step turns into.
//!
//! `SystemDesktop` shells out to the platform's own launcher and input tools:
//! - Windows: `cmd /C start`, PowerShell `SendKeys`
//! - macOS: `open -a`, `osascript` keystrokes
//! - Linux/other: `xdg-open`, `xdotool type`

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::ToolError;
use crate::plan::Action;

/// Upper bound on a launcher or input helper process.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can carry out desktop actions.
#[async_trait]
pub trait Desktop: Send + Sync {
    /// Launch a program. Returns once the launch has been issued.
    async fn open_application(&self, app_name: &str) -> Result<(), ToolError>;

    /// Type text into the focused window. `\n` presses Enter.
    async fn write_text(&self, text: &str) -> Result<(), ToolError>;
}

/// Dispatch one action to the desktop.
pub async fn perform(desktop: &dyn Desktop, action: &Action) -> Result<(), ToolError> {
    match action {
        Action::OpenApplication { app_name } => desktop.open_application(app_name).await,
        Action::WriteText { text_to_write } => desktop.write_text(text_to_write).await,
    }
}

/// Host platform, selects which helper commands are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// A program plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Spawn and return immediately instead of waiting for exit.
    pub detach: bool,
}

/// Command that launches `app_name`.
pub fn open_command(platform: Platform, app_name: &str) -> CommandSpec {
    match platform {
        Platform::Windows => CommandSpec {
            program: "cmd".into(),
            args: vec!["/C".into(), "start".into(), String::new(), app_name.into()],
            detach: false,
        },
        Platform::MacOs => CommandSpec {
            program: "open".into(),
            args: vec![
                "-a".into(),
                app_name.trim_end_matches(".exe").trim_end_matches(".app").into(),
            ],
            detach: false,
        },
        Platform::Linux => CommandSpec {
            program: "xdg-open".into(),
            args: vec![app_name.into()],
            detach: true,
        },
    }
}

/// Escape text for `SendKeys`: metacharacters are wrapped in braces and
/// newlines become `{ENTER}`.
fn sendkeys_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '+' | '^' | '%' | '~' | '(' | ')' | '[' | ']' | '{' | '}' => {
                out.push('{');
                out.push(c);
                out.push('}');
            }
            '\n' => out.push_str("{ENTER}"),
            '\r' => {}
            '\'' => out.push_str("''"),
            _ => out.push(c),
        }
    }
    out
}

/// Build an AppleScript that types each line and presses Return between them.
fn applescript_for(text: &str) -> String {
    let lines: Vec<String> = text
        .split('\n')
        .map(|line| {
            let escaped = line.replace('\\', "\\\\").replace('"', "\\\"");
            format!("keystroke \"{escaped}\"")
        })
        .collect();
    format!(
        "tell application \"System Events\"\n{}\nend tell",
        lines.join("\nkey code 36\n")
    )
}

/// Command that types `text` into the focused window.
pub fn type_command(platform: Platform, text: &str) -> CommandSpec {
    match platform {
        Platform::Windows => CommandSpec {
            program: "powershell".into(),
            args: vec![
                "-NoProfile".into(),
                "-Command".into(),
                format!(
                    "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('{}')",
                    sendkeys_escape(text)
                ),
            ],
            detach: false,
        },
        Platform::MacOs => CommandSpec {
            program: "osascript".into(),
            args: vec!["-e".into(), applescript_for(text)],
            detach: false,
        },
        Platform::Linux => CommandSpec {
            program: "xdotool".into(),
            args: vec![
                "type".into(),
                "--delay".into(),
                "50".into(),
                "--".into(),
                text.into(),
            ],
            detach: false,
        },
    }
}

async fn run_command(tool: &str, spec: &CommandSpec) -> Result<(), ToolError> {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);

    if spec.detach {
        command.spawn().map_err(|e| ToolError::ExecutionFailed {
            name: tool.to_string(),
            reason: format!("failed to spawn {}: {e}", spec.program),
        })?;
        return Ok(());
    }

    let status = tokio::time::timeout(COMMAND_TIMEOUT, command.status())
        .await
        .map_err(|_| ToolError::Timeout {
            name: tool.to_string(),
            timeout: COMMAND_TIMEOUT,
        })?
        .map_err(|e| ToolError::ExecutionFailed {
            name: tool.to_string(),
            reason: format!("failed to run {}: {e}", spec.program),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ToolError::ExecutionFailed {
            name: tool.to_string(),
            reason: format!("{} exited with {status}", spec.program),
        })
    }
}

/// Performs actions on the real desktop.
#[derive(Debug, Clone)]
pub struct SystemDesktop {
    platform: Platform,
    /// Pause before typing so a just-launched window can take focus.
    settle_delay: Duration,
}

impl SystemDesktop {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            settle_delay: Duration::from_secs(1),
        }
    }
}

impl Default for SystemDesktop {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Desktop for SystemDesktop {
    async fn open_application(&self, app_name: &str) -> Result<(), ToolError> {
        info!(app = %app_name, "ACTION: Opening application");
        run_command("open_application", &open_command(self.platform, app_name)).await
    }

    async fn write_text(&self, text: &str) -> Result<(), ToolError> {
        info!(chars = text.chars().count(), "ACTION: Typing text");
        tokio::time::sleep(self.settle_delay).await;
        run_command("write_text", &type_command(self.platform, text)).await
    }
}

/// Logs actions without touching the desktop.
#[derive(Debug, Clone, Default)]
pub struct DryRunDesktop;

#[async_trait]
impl Desktop for DryRunDesktop {
    async fn open_application(&self, app_name: &str) -> Result<(), ToolError> {
        info!(app = %app_name, "DRY RUN: would open application");
        Ok(())
    }

    async fn write_text(&self, text: &str) -> Result<(), ToolError> {
        info!(text = %text, "DRY RUN: would type text");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_open_uses_start_with_empty_title() {
        let spec = open_command(Platform::Windows, "notepad.exe");
        assert_eq!(spec.program, "cmd");
        assert_eq!(spec.args, vec!["/C", "start", "", "notepad.exe"]);
        assert!(!spec.detach);
    }

    #[test]
    fn linux_open_hands_target_to_xdg_open() {
        let spec = open_command(Platform::Linux, "notepad.exe");
        assert_eq!(spec.program, "xdg-open");
        assert_eq!(spec.args, vec!["notepad.exe"]);
        assert!(spec.detach);

        let spec = open_command(Platform::Linux, "https://youtube.com");
        assert_eq!(spec.args, vec!["https://youtube.com"]);
    }

    #[test]
    fn macos_open_strips_extensions() {
        let spec = open_command(Platform::MacOs, "Safari.app");
        assert_eq!(spec.args, vec!["-a", "Safari"]);
    }

    #[test]
    fn sendkeys_escapes_metacharacters() {
        assert_eq!(sendkeys_escape("a+b\n"), "a{+}b{ENTER}");
        assert_eq!(sendkeys_escape("it's (ok)"), "it''s {(}ok{)}");
    }

    #[test]
    fn applescript_presses_return_between_lines() {
        let script = applescript_for("youtube.com\n");
        assert!(script.contains("keystroke \"youtube.com\"\nkey code 36\nkeystroke \"\""));
        assert!(applescript_for("say \"hi\"").contains(r#"keystroke "say \"hi\"""#));
    }

    #[test]
    fn xdotool_types_after_separator() {
        let spec = type_command(Platform::Linux, "--help");
        assert_eq!(spec.program, "xdotool");
        assert_eq!(spec.args.last().map(String::as_str), Some("--help"));
        assert_eq!(spec.args[spec.args.len() - 2], "--");
    }

    #[tokio::test]
    async fn missing_program_is_execution_failure() {
        let spec = CommandSpec {
            program: "cortex-definitely-not-a-real-binary".into(),
            args: Vec::new(),
            detach: false,
        };
        let err = run_command("open_application", &spec).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        let desktop = DryRunDesktop;
        let action = Action::OpenApplication {
            app_name: "notepad.exe".into(),
        };
        assert!(perform(&desktop, &action).await.is_ok());
    }
}
