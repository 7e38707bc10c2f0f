//! Composition root.
//!
//! Builds one event store, one read store per view, the subscription table that
//! connects them, and the services on top. Registration order is delivery order:
//! reference mirrors come first so the row projectors that consult them see the
//! record being published.

use std::sync::Arc;

use serde::Serialize;
use chrono::Utc;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use tania_core::{AggregateId, AggregateType};
use tania_events::integration::{AREA_REFERENCE_KINDS, ASSET_REFERENCE_KINDS};
use tania_events::{
    EventBus, EventHandler, EventRecord, ForeignProjector, InMemoryEventBus, ProjectionError, Projector,
    SubscriptionTable, SubscriptionTableBuilder,
};

use crate::config::{ConfigError, PersistenceEngine, TaniaConfig};
use crate::db::{DbError, PgHandle};
use crate::event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use crate::projections::tasks::ASSET_SOURCES;
use crate::projections::{
    AreaProjector, AreaReferenceMarker, AreaRow, AssetReferenceMarker, CropActivityProjector,
    CropActivityRow, CropProjector, CropRow, FarmProjector, FarmRow, MaterialProjector,
    MaterialRow, ReferenceProjector, ReferenceRow, ReservoirProjector, ReservoirRow,
    TaskProjector, TaskRow, UserProjector, UserRow, views,
};
use crate::read_model::{
    InMemoryRowStore, ManagedView, PostgresRowStore, RebuildStats, ReadStore, ReadStoreError,
    RowStore,
};
use crate::repository::Repository;
use crate::services::{AssetsService, CommandError, GrowthService, TasksService, UserService};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("failed to register the default user: {0}")]
    Bootstrap(#[from] CommandError),
}

/// Where rows and events live.
enum Backend {
    InMemory,
    Postgres(PgHandle),
}

impl Backend {
    fn event_store(&self) -> Arc<dyn EventStore> {
        match self {
            Backend::InMemory => Arc::new(InMemoryEventStore::new()),
            Backend::Postgres(db) => Arc::new(PostgresEventStore::new(db.clone())),
        }
    }

    fn read_store<V>(&self, view: &'static str, projector: impl Projector<V> + 'static) -> ReadStore<V>
    where
        V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let rows: Arc<dyn RowStore<V>> = match self {
            Backend::InMemory => Arc::new(InMemoryRowStore::new()),
            Backend::Postgres(db) => Arc::new(PostgresRowStore::new(db.clone(), view)),
        };
        ReadStore::new(view, rows, Arc::new(projector))
    }
}

/// Every read store of the application.
#[derive(Debug, Clone)]
pub struct Views {
    pub area_refs: ReadStore<ReferenceRow>,
    pub asset_refs: ReadStore<ReferenceRow>,
    pub farms: ReadStore<FarmRow>,
    pub areas: ReadStore<AreaRow>,
    pub reservoirs: ReadStore<ReservoirRow>,
    pub materials: ReadStore<MaterialRow>,
    pub crops: ReadStore<CropRow>,
    pub crop_activities: ReadStore<CropActivityRow>,
    pub tasks: ReadStore<TaskRow>,
    pub users: ReadStore<UserRow>,
}

impl Views {
    fn build(backend: &Backend) -> Self {
        let area_refs = backend.read_store(views::AREA_REFS, ReferenceProjector::new([AggregateType::Area]));
        let asset_refs = backend.read_store(views::ASSET_REFS, ReferenceProjector::new(ASSET_SOURCES));

        Self {
            farms: backend.read_store(views::FARMS, FarmProjector),
            areas: backend.read_store(views::AREAS, AreaProjector),
            reservoirs: backend.read_store(views::RESERVOIRS, ReservoirProjector),
            materials: backend.read_store(views::MATERIALS, MaterialProjector),
            crops: backend.read_store(views::CROPS, CropProjector::new(area_refs.clone())),
            crop_activities: backend
                .read_store(views::CROP_ACTIVITIES, CropActivityProjector::new(area_refs.clone())),
            tasks: backend.read_store(views::TASKS, TaskProjector::new(asset_refs.clone())),
            users: backend.read_store(views::USERS, UserProjector),
            area_refs,
            asset_refs,
        }
    }

    /// Mirrors first: the other projectors read them.
    fn managed(&self) -> Vec<Arc<dyn ManagedView>> {
        vec![
            Arc::new(self.area_refs.clone()),
            Arc::new(self.asset_refs.clone()),
            Arc::new(self.farms.clone()),
            Arc::new(self.areas.clone()),
            Arc::new(self.reservoirs.clone()),
            Arc::new(self.materials.clone()),
            Arc::new(self.crops.clone()),
            Arc::new(self.crop_activities.clone()),
            Arc::new(self.tasks.clone()),
            Arc::new(self.users.clone()),
        ]
    }

    fn subscriptions(&self) -> SubscriptionTable {
        let mut table = SubscriptionTable::builder();

        own_events(&mut table, &self.area_refs);
        own_events(&mut table, &self.asset_refs);
        own_events(&mut table, &self.farms);
        own_events(&mut table, &self.areas);
        own_events(&mut table, &self.reservoirs);
        own_events(&mut table, &self.materials);
        own_events(&mut table, &self.crops);
        own_events(&mut table, &self.crop_activities);
        own_events(&mut table, &self.tasks);
        own_events(&mut table, &self.users);

        let area_marker = AreaReferenceMarker::new(self.area_refs.clone());
        foreign_events(&mut table, AREA_REFERENCE_KINDS, &self.crops, area_marker.clone());
        foreign_events(&mut table, AREA_REFERENCE_KINDS, &self.crop_activities, area_marker);
        foreign_events(
            &mut table,
            ASSET_REFERENCE_KINDS,
            &self.tasks,
            AssetReferenceMarker::new(self.asset_refs.clone()),
        );

        table.build()
    }
}

/// Route every record of the store's source types into `apply`.
fn own_events<V>(table: &mut SubscriptionTableBuilder, store: &ReadStore<V>)
where
    V: Clone + Send + Sync + 'static,
{
    let handler_store = store.clone();
    let handler: EventHandler = Arc::new(move |record: &EventRecord| -> Result<(), ProjectionError> {
        if handler_store.consumes(record) {
            handler_store.apply(record)?;
        }
        Ok(())
    });
    table.subscribe_all(store.view(), handler);
}

/// Route foreign integration kinds into `apply_foreign`.
fn foreign_events<V, P>(
    table: &mut SubscriptionTableBuilder,
    kinds: &[&str],
    store: &ReadStore<V>,
    marker: P,
) where
    V: Clone + Send + Sync + 'static,
    P: ForeignProjector<V> + 'static,
{
    let handler_store = store.clone();
    let handler: EventHandler = Arc::new(move |record: &EventRecord| -> Result<(), ProjectionError> {
        handler_store.apply_foreign(record, &marker)?;
        Ok(())
    });
    let handler_id = format!("{}.references", store.view());
    table.subscribe_many(kinds.iter().copied(), &handler_id, handler);
}

/// Per-view outcome of [`Tania::rebuild_read_models`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRebuild {
    pub view: &'static str,
    pub stats: RebuildStats,
}

/// The assembled application.
#[derive(Clone)]
pub struct Tania {
    repository: Repository,
    views: Views,
    table: Arc<SubscriptionTable>,
    assets: AssetsService,
    growth: GrowthService,
    tasks: TasksService,
    users: UserService,
}

impl std::fmt::Debug for Tania {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tania")
            .field("views", &self.views)
            .field("handlers", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Tania {
    /// Everything in process memory, with no accounts.
    pub fn in_memory() -> Self {
        Self::assemble(Backend::InMemory)
    }

    /// Assemble the configured backend and register the default user when its name is
    /// still free.
    pub fn from_config(config: &TaniaConfig) -> Result<Self, StartupError> {
        let backend = match config.engine {
            PersistenceEngine::InMemory => Backend::InMemory,
            PersistenceEngine::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or(ConfigError::MissingDatabaseUrl)?;
                Backend::Postgres(PgHandle::connect(url, config.db_max_connections)?)
            }
        };
        info!(engine = ?config.engine, "assembling tania");
        let tania = Self::assemble(backend);

        if let Some(account) = &config.default_user {
            tania
                .users
                .ensure_default_user(&account.username, &account.credential_digest, Utc::now())?;
        }
        Ok(tania)
    }

    fn assemble(backend: Backend) -> Self {
        let events = backend.event_store();
        let views = Views::build(&backend);
        let table = Arc::new(views.subscriptions());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(table.clone()));
        let repository = Repository::new(events, bus);

        Self {
            assets: AssetsService::new(
                repository.clone(),
                views.farms.clone(),
                views.areas.clone(),
                views.reservoirs.clone(),
                views.materials.clone(),
            ),
            growth: GrowthService::new(
                repository.clone(),
                views.crops.clone(),
                views.crop_activities.clone(),
            ),
            tasks: TasksService::new(repository.clone(), views.tasks.clone()),
            users: UserService::new(repository.clone(), views.users.clone()),
            repository,
            views,
            table,
        }
    }

    pub fn assets(&self) -> &AssetsService {
        &self.assets
    }

    pub fn growth(&self) -> &GrowthService {
        &self.growth
    }

    pub fn tasks(&self) -> &TasksService {
        &self.tasks
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    pub fn subscriptions(&self) -> Arc<SubscriptionTable> {
        self.table.clone()
    }

    /// Replay the whole log into every view, reference mirrors first.
    ///
    /// Saves through this instance wait until the rebuild is done. Writers in other
    /// processes sharing the database must be stopped by the operator.
    pub fn rebuild_read_models(&self) -> Result<Vec<ViewRebuild>, ProjectionError> {
        let _paused = self
            .repository
            .pause_saves()
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;
        let store = self.repository.store();
        let mut rebuilt = Vec::new();
        for view in self.views.managed() {
            let stats = view.rebuild(store.as_ref())?;
            if stats.failures > 0 {
                warn!(view = view.view(), failures = stats.failures, "rebuild left stale rows");
            }
            rebuilt.push(ViewRebuild {
                view: view.view(),
                stats,
            });
        }
        Ok(rebuilt)
    }

    /// Views with rows flagged possibly stale; empty when everything is current.
    pub fn stale_ids(&self) -> Result<Vec<(&'static str, Vec<AggregateId>)>, ReadStoreError> {
        let mut stale = Vec::new();
        for view in self.views.managed() {
            let ids = view.stale_ids()?;
            if !ids.is_empty() {
                stale.push((view.view(), ids));
            }
        }
        Ok(stale)
    }
}
