//! Wires stores, broker, projections and peers for the hosted contexts.

use std::sync::Arc;

use axum::Router;
use common::AggregateKind;
use domain::{Aggregate, Book, CommandHandler, Loan, Member, Return};
use messaging::{
    Broker, BrokerError, EventPublisher, InMemoryBroker, OutboxRelay, RelayConfig, Topology,
};
use projections::{
    DocumentStore, InMemoryDocumentStore, PostgresDocumentStore, ProjectionError,
    ProjectionWorker, ReadProjector, ReadRepository,
};
use query::{HttpPeerClient, PeerClient, PeerError, QueryAggregator, StaticRegistry};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use write_store::{InMemoryWriteStore, PostgresWriteStore, WriteStoreError};

use crate::config::{Config, ConfigError};
use crate::routes::{loans, resources, resources::ResourceContext};

const MAX_DB_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    WriteStore(#[from] WriteStoreError),

    #[error(transparent)]
    ReadStore(#[from] ProjectionError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Peer(#[from] PeerError),
}

/// The running contexts and their background tasks.
pub struct Runtime {
    routes: Router,
    hosted: Vec<AggregateKind>,
    registry: StaticRegistry,
    broker: InMemoryBroker,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// The `/api/...` routes of every hosted context.
    pub fn routes(&self) -> Router {
        self.routes.clone()
    }

    pub fn hosted(&self) -> &[AggregateKind] {
        &self.hosted
    }

    pub fn registry(&self) -> &StaticRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &InMemoryBroker {
        &self.broker
    }

    /// Signals the projection workers and the relay to stop and waits for
    /// them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
    }
}

enum WriteBackend {
    Memory(Arc<InMemoryWriteStore>),
    Postgres(Arc<PostgresWriteStore>),
}

impl WriteBackend {
    async fn connect(url: Option<&str>) -> Result<Self, StartupError> {
        match url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(MAX_DB_CONNECTIONS)
                    .connect(url)
                    .await?;
                let store = PostgresWriteStore::new(pool);
                store.run_migrations().await?;
                tracing::info!("write store: postgres");
                Ok(WriteBackend::Postgres(Arc::new(store)))
            }
            None => {
                tracing::info!("write store: in-memory");
                Ok(WriteBackend::Memory(Arc::new(InMemoryWriteStore::new())))
            }
        }
    }

    fn handler<A: Aggregate>(&self, publisher: EventPublisher) -> CommandHandler<A> {
        match self {
            WriteBackend::Memory(store) => CommandHandler::new(Arc::clone(store), publisher),
            WriteBackend::Postgres(store) => CommandHandler::new(Arc::clone(store), publisher),
        }
    }

    fn spawn_relay(
        &self,
        publisher: EventPublisher,
        config: RelayConfig,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        match self {
            WriteBackend::Memory(store) => {
                let relay = OutboxRelay::new(Arc::clone(store), publisher, config);
                tokio::spawn(relay.run(shutdown))
            }
            WriteBackend::Postgres(store) => {
                let relay = OutboxRelay::new(Arc::clone(store), publisher, config);
                tokio::spawn(relay.run(shutdown))
            }
        }
    }
}

async fn connect_documents(url: Option<&str>) -> Result<Arc<dyn DocumentStore>, StartupError> {
    match url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(MAX_DB_CONNECTIONS)
                .connect(url)
                .await?;
            let store = PostgresDocumentStore::new(pool);
            store.run_migrations().await?;
            tracing::info!("read store: postgres");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("read store: in-memory");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}

struct Wiring {
    writes: WriteBackend,
    documents: Arc<dyn DocumentStore>,
    broker: InMemoryBroker,
    publisher: EventPublisher,
    peers: Arc<dyn PeerClient>,
    shutdown: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Wiring {
    /// Subscribes the context's read model and starts its projection worker.
    async fn context<A: Aggregate>(&mut self) -> Result<ResourceContext<A>, StartupError> {
        let reads = ReadRepository::<A::View>::new(Arc::clone(&self.documents), A::KIND);
        let topology = self.publisher.topology();
        let subscription = self
            .broker
            .subscribe(
                &topology.queue_for(A::KIND.service_name(), A::KIND),
                &topology.exchange_for(A::KIND),
                &A::KIND.routing_patterns(),
            )
            .await?;

        let mut worker = ProjectionWorker::new();
        worker.register(Arc::new(ReadProjector::<A>::new(reads.clone())));
        self.tasks.push(worker.spawn(subscription, self.shutdown.clone()));

        Ok(ResourceContext {
            commands: self.writes.handler(self.publisher.clone()),
            queries: QueryAggregator::new(reads, Arc::clone(&self.peers)),
        })
    }
}

/// Connects the stores and starts every context `config` asks for.
#[tracing::instrument(skip_all)]
pub async fn build(config: &Config) -> Result<Runtime, StartupError> {
    let writes = WriteBackend::connect(config.database_url.as_deref()).await?;
    let documents = connect_documents(config.read_database_url.as_deref()).await?;

    let broker = InMemoryBroker::new();
    let publisher = EventPublisher::new(
        Arc::new(broker.clone()),
        Topology::new(config.exchange_prefix.clone()),
    );

    let hosted: Vec<AggregateKind> = AggregateKind::ALL
        .into_iter()
        .filter(|kind| config.hosts(*kind))
        .collect();

    let registry = StaticRegistry::from_entries(config.registry.clone());
    for kind in &hosted {
        if !registry.contains(kind.service_name()).await {
            registry.register(kind.service_name(), config.self_url()).await;
        }
    }
    let peers = HttpPeerClient::new(Arc::new(registry.clone()), config.peer_policy())?;

    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut wiring = Wiring {
        writes,
        documents,
        broker: broker.clone(),
        publisher: publisher.clone(),
        peers: Arc::new(peers),
        shutdown: shutdown_rx.clone(),
        tasks: Vec::new(),
    };

    let mut routes = Router::new();
    for kind in &hosted {
        let context_routes = match kind {
            AggregateKind::Member => resources::router(wiring.context::<Member>().await?),
            AggregateKind::Book => resources::router(wiring.context::<Book>().await?),
            AggregateKind::Loan => loans::router(wiring.context::<Loan>().await?),
            AggregateKind::Return => resources::router(wiring.context::<Return>().await?),
        };
        routes = routes.merge(context_routes);
    }

    if let Some(interval) = config.outbox_relay_interval {
        let relay = RelayConfig {
            interval,
            ..RelayConfig::default()
        };
        let handle = wiring.writes.spawn_relay(publisher, relay, shutdown_rx);
        wiring.tasks.push(handle);
    }

    tracing::info!(services = ?hosted, "contexts started");

    Ok(Runtime {
        routes,
        hosted,
        registry,
        broker,
        shutdown,
        tasks: wiring.tasks,
    })
}
