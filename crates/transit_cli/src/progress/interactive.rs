use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use transit::MigrationProgress;

/// Interactive progress reporter using indicatif.
///
/// One bar per resource, in the order the phases start.
pub struct InteractiveReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            bars: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn bar(&self, resource: &str) -> Option<ProgressBar> {
        self.bars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
            .cloned()
    }

    fn spinner(&self, resource: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(Self::spinner_style());
        pb.set_prefix(format!("{:10}", resource));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn handle(&self, event: MigrationProgress) {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            MigrationProgress::Counting { resource } => {
                let pb = self.spinner(&resource);
                pb.set_message("Counting...");
                bars.insert(resource, pb);
            }
            MigrationProgress::PhaseStarted { resource, total } => {
                let pb = match bars.get(&resource) {
                    Some(pb) => pb.clone(),
                    None => {
                        let pb = self.spinner(&resource);
                        bars.insert(resource.clone(), pb.clone());
                        pb
                    }
                };
                pb.disable_steady_tick();
                pb.set_length(total as u64);
                pb.set_position(0);
                pb.set_style(Self::bar_style());
                pb.set_message(format!("Migrating {}...", resource));
            }
            MigrationProgress::Migrated {
                resource,
                source_id,
                created,
                ..
            } => {
                if let Some(pb) = bars.get(&resource) {
                    pb.inc(1);
                    let symbol = if created { "+" } else { "·" };
                    pb.set_message(format!("{} #{}", symbol, source_id));
                }
            }
            MigrationProgress::Skipped {
                resource,
                source_id,
                reason,
            } => {
                if let Some(pb) = bars.get(&resource) {
                    pb.inc(1);
                    pb.set_message(format!("- #{}: {}", source_id, reason));
                }
            }
            MigrationProgress::Failed {
                resource,
                source_id,
                error,
            } => {
                if let Some(pb) = bars.get(&resource) {
                    pb.inc(1);
                    pb.set_message(format!("✗ #{}: {}", source_id, error));
                }
            }
            MigrationProgress::PhaseComplete {
                resource,
                migrated,
                skipped,
                failed,
            } => {
                if let Some(pb) = bars.get(&resource) {
                    let msg = if failed > 0 {
                        format!(
                            "✓ {} migrated, {} skipped, {} failed",
                            migrated, skipped, failed
                        )
                    } else {
                        format!("✓ {} migrated, {} skipped", migrated, skipped)
                    };
                    pb.finish_with_message(msg);
                }
            }
            MigrationProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                self.multi
                    .println(format!(
                        "⏳ Rate limited on {}, retrying in {}ms (attempt {})",
                        target, retry_after_ms, attempt
                    ))
                    .ok();
            }
            MigrationProgress::Warning { message } => {
                self.multi.println(format!("⚠ {}", message)).ok();
            }
            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for pb in bars.values() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
