//! Two-phase migration orchestrator.
//!
//! Parents are migrated first. Every parent task is joined and the
//! identifier map is frozen before the first child task is spawned, so a
//! child only ever sees parents that were actually written.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use super::error::MigrationError;
use super::id_map::IdentifierMap;
use super::plan::{ChildPlan, ParentPlan, build_fields, natural_key};
use super::progress::{MigrationProgress, ProgressCallback, SharedProgressCallback, emit};
use super::state::MigrationState;
use super::types::{
    Preflight, ResourceCount, ResourceSummary, RunSummary, SkipReason, SourceMode, WriteMode,
};
use crate::asset::{AssetClient, AssetSource};
use crate::config::{MigrationConfig, MigrationSettings};
use crate::limit::RequestLimiter;
use crate::sink::normalize::encode_asset;
use crate::sink::{
    FieldMap, RecordSink, SinkClient, SinkError, SinkId, SinkSession, UpsertOutcome,
};
use crate::source::{RecordSource, RemoteRecord, SourceClient, SourceError, check_count};

/// An item waiting to be migrated: either an id still to fetch or a record
/// already read from a page walk.
#[derive(Debug, Clone)]
enum Pending {
    Id(u64),
    Record(RemoteRecord),
}

impl Pending {
    fn source_id(&self) -> u64 {
        match self {
            Pending::Id(id) => *id,
            Pending::Record(record) => record.id,
        }
    }

    async fn resolve(
        self,
        source: &dyn RecordSource,
        resource: &str,
    ) -> Result<RemoteRecord, SkipReason> {
        match self {
            Pending::Record(record) => Ok(record),
            Pending::Id(id) => match source.fetch_one(resource, id).await {
                Ok(Some(record)) => Ok(record),
                Ok(None) => Err(SkipReason::NotFound),
                Err(e) => Err(SkipReason::FetchFailed {
                    error: e.to_string(),
                }),
            },
        }
    }
}

/// What happened to one item.
#[derive(Debug)]
enum ItemOutcome {
    Migrated {
        sink_id: SinkId,
        created: bool,
        missing_asset: bool,
    },
    Skipped(SkipReason),
    Failed(String),
}

impl ItemOutcome {
    fn from_write(result: Result<UpsertOutcome, SinkError>, missing_asset: bool) -> Self {
        match result {
            Ok(outcome) => ItemOutcome::Migrated {
                sink_id: outcome.id(),
                created: outcome.is_created(),
                missing_asset,
            },
            Err(e) => ItemOutcome::Failed(e.to_string()),
        }
    }
}

/// Everything a spawned task needs, cheap to clone.
#[derive(Clone)]
struct TaskContext {
    source: Arc<dyn RecordSource>,
    assets: Arc<dyn AssetSource>,
    sink: Arc<dyn RecordSink>,
    session: SinkSession,
    write_mode: WriteMode,
}

impl TaskContext {
    async fn write(
        &self,
        model: &str,
        key_field: &str,
        key: &str,
        fields: &FieldMap,
    ) -> Result<UpsertOutcome, SinkError> {
        match self.write_mode {
            WriteMode::Upsert => {
                self.sink
                    .upsert(&self.session, model, key_field, key, fields)
                    .await
            }
            WriteMode::BlindCreate => self
                .sink
                .create(&self.session, model, fields)
                .await
                .map(UpsertOutcome::Created),
        }
    }

    async fn migrate_parent(&self, plan: &ParentPlan, pending: Pending) -> ItemOutcome {
        let record = match pending.resolve(self.source.as_ref(), &plan.resource).await {
            Ok(record) => record,
            Err(reason) => return ItemOutcome::Skipped(reason),
        };

        let mut fields = build_fields(&record, &plan.fields);
        let Some(key) = natural_key(&mut fields, &plan.key_field) else {
            return ItemOutcome::Skipped(SkipReason::MissingNaturalKey);
        };

        let result = self.write(&plan.model, &plan.key_field, &key, &fields).await;
        ItemOutcome::from_write(result, false)
    }

    async fn migrate_child(
        &self,
        plan: &ChildPlan,
        parents: &IdentifierMap,
        pending: Pending,
    ) -> ItemOutcome {
        let record = match pending.resolve(self.source.as_ref(), &plan.resource).await {
            Ok(record) => record,
            Err(reason) => return ItemOutcome::Skipped(reason),
        };

        let Some(parent_id) = record.parent_reference(&plan.parent_link) else {
            return ItemOutcome::Skipped(SkipReason::DependencyUnresolved { parent_id: None });
        };
        let Some(parent_sink_id) = parents.get(parent_id) else {
            return ItemOutcome::Skipped(SkipReason::DependencyUnresolved {
                parent_id: Some(parent_id),
            });
        };

        let mut fields = build_fields(&record, &plan.fields);
        let Some(key) = natural_key(&mut fields, &plan.key_field) else {
            return ItemOutcome::Skipped(SkipReason::MissingNaturalKey);
        };
        fields.insert(plan.parent_target.clone(), parent_sink_id.into());

        let mut missing_asset = false;
        if let Some(ref target) = plan.asset_target {
            match self.assets.fetch_and_validate(record.id).await {
                (_, Some(payload)) => {
                    fields.insert(target.clone(), encode_asset(&payload.bytes).into());
                }
                (id, None) => {
                    tracing::warn!(
                        resource = %plan.resource,
                        source_id = id,
                        "Creating record without asset"
                    );
                    missing_asset = true;
                }
            }
        }

        let result = self.write(&plan.model, &plan.key_field, &key, &fields).await;
        ItemOutcome::from_write(result, missing_asset)
    }
}

/// Runs one migration from a source, through an asset service, into a sink.
pub struct Migrator {
    source: Arc<dyn RecordSource>,
    assets: Arc<dyn AssetSource>,
    sink: Arc<dyn RecordSink>,
    settings: MigrationSettings,
    state: MigrationState,
    on_progress: Option<SharedProgressCallback>,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        assets: Arc<dyn AssetSource>,
        sink: Arc<dyn RecordSink>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            source,
            assets,
            sink,
            settings,
            state: MigrationState::Idle,
            on_progress: None,
        }
    }

    /// Build HTTP clients for every system in `config`.
    ///
    /// Each system gets its own limiter sized from the settings. When
    /// `on_progress` is given the clients report rate-limit back-off to it.
    pub fn from_config(
        config: &MigrationConfig,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Self, MigrationError> {
        let settings = &config.settings;
        let on_progress: Option<SharedProgressCallback> = on_progress.map(Arc::new);

        let mut source = SourceClient::new(
            &config.source.url,
            RequestLimiter::new(settings.source_concurrency)
                .with_rate(config.source.requests_per_second),
        )
        .map_err(|e| MigrationError::Setup {
            system: "source",
            message: e.to_string(),
        })?;
        let mut assets = AssetClient::new(
            &config.assets.url,
            RequestLimiter::new(settings.asset_concurrency)
                .with_rate(config.assets.requests_per_second),
        )
        .map_err(|e| MigrationError::Setup {
            system: "assets",
            message: e.to_string(),
        })?;
        let mut sink = SinkClient::new(
            &config.sink.url,
            config.sink_credentials(),
            RequestLimiter::new(settings.sink_concurrency)
                .with_rate(config.sink.requests_per_second),
        )
        .map_err(|e| MigrationError::Setup {
            system: "sink",
            message: e.to_string(),
        })?;

        if let Some(ref callback) = on_progress {
            source = source.with_progress(Arc::clone(callback));
            assets = assets.with_progress(Arc::clone(callback));
            sink = sink.with_progress(Arc::clone(callback));
        }

        let mut migrator = Self::new(
            Arc::new(source),
            Arc::new(assets),
            Arc::new(sink),
            settings.clone(),
        );
        migrator.on_progress = on_progress;
        Ok(migrator)
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn settings(&self) -> &MigrationSettings {
        &self.settings
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    fn transition(&mut self, next: MigrationState) -> Result<(), MigrationError> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(MigrationError::InvalidTransition { from, to: next });
        }
        self.state = next;
        tracing::debug!(%from, to = %next, "Migration state changed");
        emit(
            self.progress(),
            MigrationProgress::StateChanged { from, to: next },
        );
        Ok(())
    }

    /// Move to `Failed` and hand back `err`.
    fn fail(&mut self, err: MigrationError) -> MigrationError {
        if let Err(e) = self.transition(MigrationState::Failed) {
            tracing::debug!(error = %e, "Could not record failure state");
        }
        err
    }

    /// Authenticate and ask the source for both counts without writing.
    pub async fn preflight(&self) -> Result<Preflight, MigrationError> {
        let session = self
            .sink
            .authenticate()
            .await
            .map_err(MigrationError::Authentication)?;

        let mut counts = Vec::with_capacity(2);
        for resource in [&self.settings.parents.resource, &self.settings.children.resource] {
            let count = match self
                .source
                .count(resource)
                .await
                .and_then(|n| check_count(resource, n))
            {
                Ok(n) => ResourceCount {
                    resource: resource.clone(),
                    count: Some(n),
                    error: None,
                },
                Err(e) => ResourceCount {
                    resource: resource.clone(),
                    count: None,
                    error: Some(e.to_string()),
                },
            };
            counts.push(count);
        }

        Ok(Preflight {
            uid: session.uid,
            counts,
        })
    }

    /// Run the migration to completion.
    ///
    /// Fails only when the sink refuses the login or the source cannot list
    /// parents; everything else is reported in the summary.
    #[tracing::instrument(skip_all, fields(
        parents = %self.settings.parents.resource,
        children = %self.settings.children.resource,
    ))]
    pub async fn run(&mut self) -> Result<RunSummary, MigrationError> {
        let started_at = Utc::now();

        if self.state != MigrationState::Idle {
            return Err(MigrationError::InvalidTransition {
                from: self.state,
                to: MigrationState::Authenticated,
            });
        }

        let session = match self.sink.authenticate().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Sink authentication failed");
                return Err(self.fail(MigrationError::Authentication(e)));
            }
        };
        self.transition(MigrationState::Authenticated)?;

        let ctx = TaskContext {
            source: Arc::clone(&self.source),
            assets: Arc::clone(&self.assets),
            sink: Arc::clone(&self.sink),
            session,
            write_mode: self.settings.write_mode,
        };

        let (parents, id_map) = match self.migrate_parents(&ctx).await {
            Ok(done) => done,
            Err(e) => return Err(self.fail(e)),
        };
        self.transition(MigrationState::ParentsMigrated)?;

        let children = self.migrate_children(&ctx, Arc::new(id_map)).await;
        self.transition(MigrationState::ChildrenMigrated)?;

        let summary = RunSummary {
            parents,
            children,
            started_at,
            finished_at: Utc::now(),
        };
        self.transition(MigrationState::Done)?;

        tracing::info!(
            migrated = summary.migrated(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "Migration finished"
        );
        Ok(summary)
    }

    /// List what a phase has to process.
    async fn discover(&self, resource: &str) -> Result<Vec<Pending>, SourceError> {
        emit(
            self.progress(),
            MigrationProgress::Counting {
                resource: resource.to_string(),
            },
        );
        match self.settings.source_mode {
            SourceMode::Numbered => {
                let count = check_count(resource, self.source.count(resource).await?)?;
                Ok((1..=count).map(Pending::Id).collect())
            }
            SourceMode::Paginated => {
                let records = self.source.fetch_pages(resource).await?;
                Ok(records.into_iter().map(Pending::Record).collect())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(resource = %self.settings.parents.resource))]
    async fn migrate_parents(
        &self,
        ctx: &TaskContext,
    ) -> Result<(ResourceSummary, IdentifierMap), MigrationError> {
        let plan = Arc::new(self.settings.parents.clone());
        let pending = self
            .discover(&plan.resource)
            .await
            .map_err(|source| MigrationError::SourceUnavailable {
                resource: plan.resource.clone(),
                source,
            })?;

        let mut summary = ResourceSummary::new(&plan.resource, &plan.model);
        summary.total = pending.len();
        self.phase_started(&summary);

        let mut id_map = IdentifierMap::new();
        match ctx.write_mode {
            WriteMode::Upsert => {
                let mut tasks = JoinSet::new();
                for item in pending {
                    let ctx = ctx.clone();
                    let plan = Arc::clone(&plan);
                    tasks.spawn(async move {
                        let source_id = item.source_id();
                        (source_id, ctx.migrate_parent(&plan, item).await)
                    });
                }
                while let Some(joined) = tasks.join_next().await {
                    self.collect(&mut summary, Some(&mut id_map), joined);
                }
            }
            WriteMode::BlindCreate => {
                self.blind_create_parents(ctx, &plan, pending, &mut summary, &mut id_map)
                    .await;
            }
        }

        self.phase_complete(&summary);
        Ok((summary, id_map))
    }

    /// Fetch every parent, then create them in one input-ordered batch.
    async fn blind_create_parents(
        &self,
        ctx: &TaskContext,
        plan: &Arc<ParentPlan>,
        pending: Vec<Pending>,
        summary: &mut ResourceSummary,
        id_map: &mut IdentifierMap,
    ) {
        let mut tasks = JoinSet::new();
        for item in pending {
            let source = Arc::clone(&ctx.source);
            let plan = Arc::clone(plan);
            tasks.spawn(async move {
                let source_id = item.source_id();
                (source_id, item.resolve(source.as_ref(), &plan.resource).await)
            });
        }

        let mut staged: Vec<(u64, FieldMap)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((source_id, Ok(record))) => {
                    let mut fields = build_fields(&record, &plan.fields);
                    if natural_key(&mut fields, &plan.key_field).is_some() {
                        staged.push((source_id, fields));
                        continue;
                    }
                    Ok((source_id, ItemOutcome::Skipped(SkipReason::MissingNaturalKey)))
                }
                Ok((source_id, Err(reason))) => Ok((source_id, ItemOutcome::Skipped(reason))),
                Err(e) => Err(e),
            };
            self.collect(summary, None, outcome);
        }

        staged.sort_by_key(|(source_id, _)| *source_id);
        let (source_ids, batch): (Vec<u64>, Vec<FieldMap>) = staged.into_iter().unzip();
        let results = ctx.sink.create_batch(&ctx.session, &plan.model, &batch).await;

        for (source_id, result) in source_ids.into_iter().zip(results) {
            let outcome = ItemOutcome::from_write(result.map(UpsertOutcome::Created), false);
            self.collect(summary, Some(id_map), Ok((source_id, outcome)));
        }
    }

    #[tracing::instrument(skip_all, fields(resource = %self.settings.children.resource))]
    async fn migrate_children(
        &self,
        ctx: &TaskContext,
        parents: Arc<IdentifierMap>,
    ) -> ResourceSummary {
        let plan = Arc::new(self.settings.children.clone());
        let mut summary = ResourceSummary::new(&plan.resource, &plan.model);

        let pending = match self.discover(&plan.resource).await {
            Ok(pending) => pending,
            Err(e) => {
                let message = format!("Could not list {}: {}", plan.resource, e);
                tracing::error!(resource = %plan.resource, error = %e, "Could not list children");
                emit(
                    self.progress(),
                    MigrationProgress::Warning {
                        message: message.clone(),
                    },
                );
                summary.errors.push(message);
                self.phase_complete(&summary);
                return summary;
            }
        };

        summary.total = pending.len();
        self.phase_started(&summary);

        let mut tasks = JoinSet::new();
        for item in pending {
            let ctx = ctx.clone();
            let plan = Arc::clone(&plan);
            let parents = Arc::clone(&parents);
            tasks.spawn(async move {
                let source_id = item.source_id();
                (source_id, ctx.migrate_child(&plan, &parents, item).await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            self.collect(&mut summary, None, joined);
        }

        self.phase_complete(&summary);
        summary
    }

    fn phase_started(&self, summary: &ResourceSummary) {
        tracing::info!(resource = %summary.resource, total = summary.total, "Migrating");
        emit(
            self.progress(),
            MigrationProgress::PhaseStarted {
                resource: summary.resource.clone(),
                total: summary.total,
            },
        );
    }

    fn phase_complete(&self, summary: &ResourceSummary) {
        tracing::info!(
            resource = %summary.resource,
            created = summary.created,
            existing = summary.existing,
            skipped = summary.skipped,
            failed = summary.failed,
            "Phase complete"
        );
        emit(
            self.progress(),
            MigrationProgress::PhaseComplete {
                resource: summary.resource.clone(),
                migrated: summary.migrated(),
                skipped: summary.skipped,
                failed: summary.failed,
            },
        );
    }

    /// Fold one joined task into the summary (and the map, for parents).
    fn collect(
        &self,
        summary: &mut ResourceSummary,
        id_map: Option<&mut IdentifierMap>,
        joined: Result<(u64, ItemOutcome), tokio::task::JoinError>,
    ) {
        let resource = summary.resource.clone();
        let (source_id, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(resource = %resource, error = %e, "Migration task failed");
                summary.failed += 1;
                summary.errors.push(format!("task failed: {}", e));
                return;
            }
        };

        match outcome {
            ItemOutcome::Migrated {
                sink_id,
                created,
                missing_asset,
            } => {
                if created {
                    summary.created += 1;
                } else {
                    summary.existing += 1;
                }
                if missing_asset {
                    summary.missing_assets += 1;
                }
                if let Some(map) = id_map {
                    map.insert(source_id, sink_id);
                }
                tracing::info!(resource = %resource, source_id, sink_id, created, "Migrated record");
                emit(
                    self.progress(),
                    MigrationProgress::Migrated {
                        resource,
                        source_id,
                        sink_id,
                        created,
                    },
                );
            }
            ItemOutcome::Skipped(reason) => {
                summary.skipped += 1;
                summary.errors.push(format!("{} {}: {}", resource, source_id, reason));
                tracing::warn!(resource = %resource, source_id, reason = %reason, "Skipped record");
                emit(
                    self.progress(),
                    MigrationProgress::Skipped {
                        resource,
                        source_id,
                        reason,
                    },
                );
            }
            ItemOutcome::Failed(error) => {
                summary.failed += 1;
                summary.errors.push(format!("{} {}: {}", resource, source_id, error));
                tracing::error!(resource = %resource, source_id, error = %error, "Sink rejected record");
                emit(
                    self.progress(),
                    MigrationProgress::Failed {
                        resource,
                        source_id,
                        error,
                    },
                );
            }
        }
    }
}
