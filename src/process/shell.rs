//! # Opaque shell command execution.
//!
//! Backup configuration may carry `pre_exec`/`post_exec` strings that are
//! handed verbatim to the platform shell and awaited to completion. The
//! command's stdout/stderr inherit warden's console.

use std::process::ExitStatus;

use tokio::process::Command;

/// Runs `cmd` in the platform shell and waits for it to exit.
pub async fn run_shell_command(cmd: &str) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    let (shell, flag) = ("/bin/sh", "-c");
    #[cfg(windows)]
    let (shell, flag) = ("cmd.exe", "/C");

    Command::new(shell).arg(flag).arg(cmd).status().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_exit_status_is_reported() {
        assert!(run_shell_command("true").await.unwrap().success());
        assert!(!run_shell_command("false").await.unwrap().success());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_command_side_effects_are_visible() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        run_shell_command(&format!("touch {}", marker.display()))
            .await
            .unwrap();
        assert!(marker.exists());
    }
}
