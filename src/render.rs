//! # RenderRunner: invokes the external map renderer.
//!
//! The renderer is a separate executable invoked once per configured task,
//! sequentially, against a temporary copy of the latest backup (so a
//! concurrent backup cycle can never patch files under the renderer's
//! feet). Arguments come from a template in which `${WORLD_PATH}` and
//! `${OUTPUT_PATH}` are substituted per invocation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::process::Command;

use crate::backup::{clear_dir, copy_dir_recursive};
use crate::config::RenderConfig;
use crate::error::RenderError;
use crate::events::{Bus, Event, EventKind};
use crate::process::ProcessSupervisor;
use crate::processing::ProcessingGuard;

/// Placeholder substituted with the world working-copy path.
const WORLD_PLACEHOLDER: &str = "${WORLD_PATH}";
/// Placeholder substituted with the render output path.
const OUTPUT_PLACEHOLDER: &str = "${OUTPUT_PATH}";

/// Runs the configured renderer tasks under a `Processing` flag.
pub struct RenderRunner {
    supervisor: Arc<ProcessSupervisor>,
    cfg: RenderConfig,
    bus: Bus,
    processing: AtomicBool,
}

impl RenderRunner {
    pub fn new(supervisor: Arc<ProcessSupervisor>, cfg: RenderConfig) -> Arc<Self> {
        let bus = supervisor.bus().clone();
        Arc::new(Self {
            supervisor,
            cfg,
            bus,
            processing: AtomicBool::new(false),
        })
    }

    /// Whether a render cycle is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Renders `world_copy` (a finished backup destination) into the
    /// configured output directory, one task at a time.
    pub async fn render(&self, world_copy: &Path) -> Result<(), RenderError> {
        let _guard = ProcessingGuard::acquire(&self.processing).ok_or(RenderError::Busy)?;

        self.bus.publish(Event::new(EventKind::RenderStarted));
        self.supervisor.send_notice("Rendering map...").await;
        tracing::info!("initializing map rendering");

        let result = self.run_tasks(world_copy).await;
        match &result {
            Ok(()) => {
                self.supervisor.send_notice("Done rendering!").await;
                tracing::info!("rendering done");
            }
            Err(error) => tracing::warn!(%error, "rendering failed"),
        }
        self.bus.publish(Event::new(EventKind::RenderFinished));
        result
    }

    async fn run_tasks(&self, world_copy: &Path) -> Result<(), RenderError> {
        // Render from a throwaway copy so the next backup cycle cannot
        // mutate the files mid-render.
        let scratch = scratch_path(world_copy);
        clear_dir(&scratch).await?;
        copy_dir_recursive(world_copy, &scratch).await?;
        fs::create_dir_all(&self.cfg.output_path).await?;

        let total = self.cfg.tasks.len();
        for (index, task) in self.cfg.tasks.iter().enumerate() {
            tracing::info!(task = index + 1, total, "rendering map");

            let mut command = Command::new(&self.cfg.bin_path);
            for arg in self.cfg.global_args.split_whitespace() {
                command.arg(substitute(arg, &scratch, &self.cfg.output_path));
            }
            for arg in task.split_whitespace() {
                command.arg(substitute(arg, &scratch, &self.cfg.output_path));
            }
            if self.cfg.hide_stdout {
                command.stdout(Stdio::null());
            }

            let status = command.status().await?;
            if !status.success() {
                tracing::warn!(task = index + 1, %status, "renderer exited unsuccessfully");
            }
        }

        fs::remove_dir_all(&scratch).await?;
        Ok(())
    }
}

/// Sibling path with a `_` prefix for the temporary render copy.
fn scratch_path(world_copy: &Path) -> PathBuf {
    let name = world_copy
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "world".to_string());
    world_copy.with_file_name(format!("_{name}"))
}

/// Substitutes the path placeholders inside one argument token.
fn substitute(arg: &str, world: &Path, output: &Path) -> String {
    arg.replace(WORLD_PLACEHOLDER, &world.display().to_string())
        .replace(OUTPUT_PLACEHOLDER, &output.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_substituted_within_tokens() {
        let world = Path::new("/tmp/temp/world");
        let output = Path::new("/srv/render");
        assert_eq!(substitute("-w", world, output), "-w");
        assert_eq!(substitute("${WORLD_PATH}", world, output), "/tmp/temp/world");
        assert_eq!(
            substitute("--out=${OUTPUT_PATH}/index", world, output),
            "--out=/srv/render/index"
        );
    }

    #[test]
    fn test_scratch_path_prefixes_the_directory_name() {
        assert_eq!(
            scratch_path(Path::new("/tmp/temp/world")),
            PathBuf::from("/tmp/temp/_world")
        );
    }
}
