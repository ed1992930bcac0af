use transit::MigrationProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: MigrationProgress) {
        match event {
            MigrationProgress::StateChanged { from, to } => {
                tracing::debug!(%from, %to, "Migration state changed");
            }

            MigrationProgress::Counting { resource } => {
                tracing::info!(resource = %resource, "Counting source records");
            }

            MigrationProgress::PhaseStarted { resource, total } => {
                tracing::info!(resource = %resource, total, "Migrating");
            }

            MigrationProgress::Migrated {
                resource,
                source_id,
                sink_id,
                created,
            } => {
                if created {
                    tracing::debug!(resource = %resource, source_id, sink_id, "Created");
                } else {
                    tracing::debug!(resource = %resource, source_id, sink_id, "Already present");
                }
            }

            MigrationProgress::Skipped {
                resource,
                source_id,
                reason,
            } => {
                tracing::warn!(resource = %resource, source_id, reason = %reason, "Skipped");
            }

            MigrationProgress::Failed {
                resource,
                source_id,
                error,
            } => {
                tracing::error!(resource = %resource, source_id, error = %error, "Failed to write");
            }

            MigrationProgress::AssetFetched { id, valid } => {
                tracing::debug!(id, valid, "Asset fetched");
            }

            MigrationProgress::PhaseComplete {
                resource,
                migrated,
                skipped,
                failed,
            } => {
                tracing::info!(resource = %resource, migrated, skipped, failed, "Phase complete");
            }

            MigrationProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::warn!(
                    request = %target,
                    retry_after_ms,
                    attempt,
                    "Rate limited, backing off"
                );
            }

            MigrationProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
