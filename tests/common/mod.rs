//! Shared fixtures: a scripted fake server that speaks just enough of the
//! Bedrock console protocol for the supervisor and backup tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use warden::LaunchSpec;

/// World directory name used across the fixtures.
pub const WORLD: &str = "world";

/// Writes a fake server script that prints the ready banner and answers
/// the save-protocol commands.
///
/// Knobs via environment variables:
/// - `MANIFEST`: the line echoed after `save query`
/// - `HOLD_DELAY`: seconds to sleep before acknowledging `save hold`
pub fn write_fake_server(dir: &Path) -> PathBuf {
    let script = r#"#!/bin/sh
echo "[2024-01-01 00:00:00 INFO] Version: 1.20.81.01"
echo "[2024-01-01 00:00:01 INFO] Server started."
while IFS= read -r line; do
  case "$line" in
    "save hold") sleep "${HOLD_DELAY:-0}"; echo "Saving..." ;;
    "save query") echo "Data saved. Files are now ready to be copied."; echo "$MANIFEST" ;;
    "save resume") echo "Changes to the level are resumed." ;;
    "stop") echo "Quit correctly"; exit 0 ;;
    *) echo "Unknown command: $line" ;;
  esac
done
exit 0
"#;
    write_script(dir, "fake_server.sh", script)
}

/// Writes a server that exits with a non-zero status immediately.
pub fn write_crashing_server(dir: &Path) -> PathBuf {
    write_script(dir, "crashing_server.sh", "#!/bin/sh\nexit 1\n")
}

/// Launch spec for a scripted server in `dir` with extra environment.
pub fn script_spec(binary: &Path, dir: &Path, env: Vec<(String, String)>) -> LaunchSpec {
    LaunchSpec {
        binary: binary.to_path_buf(),
        working_dir: dir.to_path_buf(),
        env,
    }
}

fn write_script(dir: &Path, name: &str, contents: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
