// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle supervisor: ordered startup, bounded-drain shutdown.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_broker::topology::{QUEUE_AGENT_RESPONSES, QUEUE_AGENT_TASKS, QUEUE_API_RESPONSES, QUEUE_API_TASKS, QUEUE_INSTRUCTIONS};
use vigil_broker::{
    run_consumer, Broker, ConsumeOptions, DeadLetterSink, Handler, LapinDeadLetter,
    LapinPublisher, Publisher, Role,
};
use vigil_core::SystemClock;
use vigil_engine::{Detector, Dispatcher, IngestionConsumer, ResultConsumer, Worker, WorkerConfig};
use vigil_store::{PgStore, StoreError, StoreGateway};

use crate::config::{Config, ConfigError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store startup failed: {0}")]
    Store(#[from] StoreError),
}

/// Which task queue a worker pool consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerQueue {
    Api,
    Agent,
}

impl WorkerQueue {
    pub fn queue(&self) -> &'static str {
        match self {
            WorkerQueue::Api => QUEUE_API_TASKS,
            WorkerQueue::Agent => QUEUE_AGENT_TASKS,
        }
    }
}

/// One worker pool registration: a queue plus the detector that serves it.
/// Concrete detectors are supplied by the embedder.
pub struct WorkerSpec {
    pub queue: WorkerQueue,
    pub worker_id: String,
    pub detector: Arc<dyn Detector>,
}

/// Owns every component's lifetime.
///
/// Startup order: store pool → broker connections → result consumer →
/// ingestion consumer → workers. Shutdown reverses it: cancel consumers
/// (no new deliveries), drain in-flight work up to the grace period, then
/// close channels, connections, and the database pool. Whatever is still
/// unacked afterwards is redelivered on the next start.
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(
        self,
        workers: Vec<WorkerSpec>,
        shutdown: CancellationToken,
    ) -> Result<(), LifecycleError> {
        let config = self.config;
        let settings = Arc::new(config.broker.clone());

        // 1. Store gateway.
        let store = Arc::new(
            PgStore::connect(
                &config.database_url,
                config.db_pool_min,
                config.db_pool_max,
                config.db_timeout,
            )
            .await?,
        );
        let gateway: Arc<dyn StoreGateway> = Arc::clone(&store) as Arc<dyn StoreGateway>;
        info!(pool_max = config.db_pool_max, "store gateway ready");

        // 2. One broker connection per role. Connections open lazily on
        // first channel use and reconnect with backoff on their own.
        let ingest_broker =
            Arc::new(Broker::new(Arc::clone(&settings), Role::Ingestion, shutdown.clone()));
        let dispatch_broker =
            Arc::new(Broker::new(Arc::clone(&settings), Role::Dispatcher, shutdown.clone()));
        let worker_broker =
            Arc::new(Broker::new(Arc::clone(&settings), Role::Worker, shutdown.clone()));
        let results_broker =
            Arc::new(Broker::new(Arc::clone(&settings), Role::Results, shutdown.clone()));

        let options = |queue: &'static str| ConsumeOptions {
            queue,
            prefetch: settings.prefetch,
            pool_size: config.pool_size,
            poison_threshold: config.poison_threshold,
        };
        let dead_letter = |broker: &Arc<Broker>| -> Arc<dyn DeadLetterSink> {
            Arc::new(LapinDeadLetter::new(
                Arc::clone(broker),
                settings.dead_letter.clone(),
                settings.publish_timeout,
            ))
        };

        let mut tasks = JoinSet::new();

        // 3. Result consumer, one channel per response queue.
        let results = Arc::new(ResultConsumer::new(Arc::clone(&gateway), SystemClock));
        for queue in [QUEUE_API_RESPONSES, QUEUE_AGENT_RESPONSES] {
            tasks.spawn(run_consumer(
                Arc::clone(&results_broker),
                dead_letter(&results_broker),
                Arc::clone(&results) as Arc<dyn Handler>,
                options(queue),
                shutdown.clone(),
            ));
        }

        // 4. Ingestion consumer, publishing tasks through the dispatcher
        // role.
        let task_publisher: Arc<dyn Publisher> = Arc::new(LapinPublisher::new(
            Arc::clone(&dispatch_broker),
            settings.publish_timeout,
        ));
        let dispatcher = Arc::new(Dispatcher::new(task_publisher, SystemClock));
        let ingestion = Arc::new(IngestionConsumer::new(
            Arc::clone(&gateway),
            dispatcher,
            config.default_max_retries,
        ));
        tasks.spawn(run_consumer(
            Arc::clone(&ingest_broker),
            dead_letter(&ingest_broker),
            ingestion as Arc<dyn Handler>,
            options(QUEUE_INSTRUCTIONS),
            shutdown.clone(),
        ));

        // 5. Worker pools.
        if workers.is_empty() {
            info!("no detection workers registered; task queues idle in this process");
        }
        for spec in workers {
            let response_publisher: Arc<dyn Publisher> = Arc::new(LapinPublisher::new(
                Arc::clone(&worker_broker),
                settings.publish_timeout,
            ));
            let worker = Arc::new(Worker::new(
                spec.detector,
                Arc::clone(&gateway),
                response_publisher,
                WorkerConfig {
                    worker_id: spec.worker_id,
                    jitter_min: config.worker.jitter_min,
                    jitter_max: config.worker.jitter_max,
                    retry_delay: config.worker.retry_delay,
                    detector_timeout: config.worker.detector_timeout,
                },
                SystemClock,
            ));
            tasks.spawn(run_consumer(
                Arc::clone(&worker_broker),
                dead_letter(&worker_broker),
                worker as Arc<dyn Handler>,
                options(spec.queue.queue()),
                shutdown.clone(),
            ));
        }

        info!("checking engine running");
        shutdown.cancelled().await;
        info!(
            grace_ms = config.shutdown_grace.as_millis() as u64,
            "shutdown requested, draining in-flight deliveries"
        );

        // Consumers stop taking deliveries once cancelled; give in-flight
        // handlers the grace period, then abandon them. Unacked messages
        // are redelivered after restart.
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(config.shutdown_grace, drain).await.is_err() {
            warn!("shutdown grace expired, abandoning remaining in-flight work");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        // Channels die with their connections; close connections, then
        // the database pool.
        for broker in [&worker_broker, &ingest_broker, &dispatch_broker, &results_broker] {
            broker.close().await;
        }
        store.close().await;
        info!("shutdown complete");
        Ok(())
    }
}
