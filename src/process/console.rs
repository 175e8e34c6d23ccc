//! # Operator console echo.
//!
//! Every line the server prints is echoed to warden's own stdout so the
//! operator sees the live console. Two suppression mechanisms exist:
//!
//! - an **ignore list** of patterns for expected high-frequency chatter
//!   (the save-protocol lines, AutoCompaction noise);
//! - a global **mute flag** the backup coordinator sets while the
//!   hold/query protocol is mid-flight, so automated query traffic does
//!   not spam the operator.

use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;

use crate::error::SupervisorError;

/// Filtered echo of server output to the operator console.
pub struct ConsoleEcho {
    ignore: Vec<Regex>,
    enabled: AtomicBool,
    muted: AtomicBool,
}

impl ConsoleEcho {
    /// Compiles the ignore list; echo starts enabled and unmuted.
    pub fn new(ignore_patterns: &[String]) -> Result<Self, SupervisorError> {
        let mut ignore = Vec::with_capacity(ignore_patterns.len());
        for pattern in ignore_patterns {
            let regex = Regex::new(pattern).map_err(|source| SupervisorError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            ignore.push(regex);
        }
        Ok(Self {
            ignore,
            enabled: AtomicBool::new(true),
            muted: AtomicBool::new(false),
        })
    }

    /// Permanently enables or disables the echo path.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Mutes or unmutes the echo while automated protocol traffic runs.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Release);
    }

    /// Whether this line would currently be shown.
    pub fn should_echo(&self, line: &str) -> bool {
        if !self.enabled.load(Ordering::Acquire) || self.muted.load(Ordering::Acquire) {
            return false;
        }
        !self.ignore.iter().any(|re| re.is_match(line))
    }

    /// Prints the line to the operator console unless suppressed.
    pub fn echo(&self, line: &str) {
        if self.should_echo(line) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_with(patterns: &[&str]) -> ConsoleEcho {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        ConsoleEcho::new(&patterns).unwrap()
    }

    #[test]
    fn test_ignore_list_suppresses_matching_lines() {
        let echo = echo_with(&[r"^Saving\.\.\.", r"AutoCompaction"]);
        assert!(!echo.should_echo("Saving..."));
        assert!(!echo.should_echo("Running AutoCompaction..."));
        assert!(echo.should_echo("[INFO] Player connected: Steve, xuid: 1"));
    }

    #[test]
    fn test_mute_flag_suppresses_everything() {
        let echo = echo_with(&[]);
        assert!(echo.should_echo("anything"));
        echo.set_muted(true);
        assert!(!echo.should_echo("anything"));
        echo.set_muted(false);
        assert!(echo.should_echo("anything"));
    }

    #[test]
    fn test_bad_ignore_pattern_is_rejected() {
        let result = ConsoleEcho::new(&["(broken".to_string()]);
        assert!(matches!(result, Err(SupervisorError::Pattern { .. })));
    }
}
