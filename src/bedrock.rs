//! Console protocol of the Bedrock-style dedicated server.
//!
//! Everything warden knows about the supervised binary is collected here:
//! the command lines it accepts on stdin and the response patterns it
//! prints on stdout. Patterns are regular expressions matched per line by
//! the [`PatternRegistry`](crate::PatternRegistry).

/// Command lines sent to the server's stdin.
pub mod cmd {
    /// Pause world saving and start flushing (phase 1 of a hot backup).
    pub const SAVE_HOLD: &str = "save hold";
    /// Ask for the frozen file manifest (phase 2 of a hot backup).
    pub const SAVE_QUERY: &str = "save query";
    /// Resume world saving (phase 5 of a hot backup).
    pub const SAVE_RESUME: &str = "save resume";
    /// Graceful shutdown.
    pub const STOP: &str = "stop";
}

/// Response patterns printed on the server's stdout.
pub mod pat {
    /// Ready banner: the server finished initializing and is serving.
    pub const SERVER_STARTED: &str = r"^.+ (Server started\.)";
    /// Version announcement, capture group 1 is the version string.
    pub const VERSION: &str = r"^.+ Version:? (\d+\.\d+\.\d+(?:\.\d+)?)";
    /// A player joined, capture group 1 is the player name.
    pub const PLAYER_CONNECTED: &str = r".+Player connected:\s(.+),";
    /// A player left, capture group 1 is the player name.
    pub const PLAYER_DISCONNECTED: &str = r".+Player disconnected:\s(.+),";
    /// Acknowledgement that `save hold` paused writes and began flushing.
    pub const SAVE_HELD: &str = r"^(Saving\.\.\.|Data saved\. Files are now ready to be copied\.)";
    /// Acknowledgement that `save resume` unfroze the world.
    pub const SAVE_RESUMED: &str = r"^(Changes to the level are resumed\.)";
}

/// Pattern matching the `save query` manifest line for `world_name`.
///
/// The manifest line starts with the world directory name followed by a
/// path separator, then repeats `path:bytes` tokens.
pub fn manifest_line_pattern(world_name: &str) -> String {
    format!(r"^({}[/\\])", regex::escape(world_name))
}

/// Pattern extracting one `relativePath:byteCount` manifest token.
///
/// Capture group 1 is the path (still prefixed with the world name),
/// capture group 2 is the frozen byte length.
pub fn manifest_entry_pattern(world_name: &str) -> String {
    format!(r"({}[/\\][^:,\s]+):(\d+)", regex::escape(world_name))
}

/// Save-protocol chatter suppressed from the operator console by default.
pub fn default_ignore_patterns(world_name: &str) -> Vec<String> {
    vec![
        manifest_line_pattern(world_name),
        r"^(Saving\.\.\.)".to_string(),
        r"^(A previous save has not been completed\.)".to_string(),
        r"^(Data saved\. Files are now ready to be copied\.)".to_string(),
        r"^(Changes to the level are resumed\.)".to_string(),
        r"Running AutoCompaction\.\.\.".to_string(),
    ]
}

/// Builds the in-game broadcast command for an operator notification.
pub fn tellraw(message: &str) -> String {
    format!(
        "tellraw @a {{\"rawtext\":[{{\"text\":\"§l[WARDEN]\"}},{{\"text\":\"§r {}\"}}]}}",
        message
    )
}
