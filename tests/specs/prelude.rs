// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the pipeline specs.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

pub use vigil_broker::{Disposition, Handler};
pub use vigil_core::{
    Detected, DetectionExecutionRow, DetectionResultRow, DetectionStatus, DetectionType,
};
pub use vigil_store::StoreGateway;
use vigil_broker::{FakePublisher, Publisher};
use vigil_core::{FakeClock, LinkId, OperationId};
use vigil_engine::{
    Detector, Dispatcher, FakeDetector, IngestionConsumer, ResultConsumer, Worker, WorkerConfig,
};
use vigil_store::MemStore;
use vigil_wire::{ROUTE_AGENT_RESPONSE, ROUTE_AGENT_TASK, ROUTE_API_RESPONSE, ROUTE_API_TASK};

pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// The whole pipeline over fakes. The `bus` stands in for the broker:
/// tests drain published task/response payloads and feed them back into
/// the matching handler, so delivery order and redelivery are scriptable.
pub struct Pipeline {
    pub clock: FakeClock,
    pub store: Arc<MemStore>,
    pub bus: Arc<FakePublisher>,
    pub api_detector: Arc<FakeDetector>,
    pub agent_detector: Arc<FakeDetector>,
    pub ingestion: IngestionConsumer<FakeClock>,
    pub api_worker: Worker<FakeClock>,
    pub agent_worker: Worker<FakeClock>,
    pub results: ResultConsumer<FakeClock>,
    cursor: Mutex<usize>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_worker_tuning(WorkerConfig::default())
    }

    pub fn with_worker_tuning(base: WorkerConfig) -> Self {
        let clock = FakeClock::new();
        let store = Arc::new(MemStore::with_clock(clock.clone()));
        let gateway: Arc<dyn StoreGateway> = Arc::clone(&store) as Arc<dyn StoreGateway>;
        let bus = Arc::new(FakePublisher::new());
        let publisher: Arc<dyn Publisher> = Arc::clone(&bus) as Arc<dyn Publisher>;

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&publisher), clock.clone()));
        let ingestion =
            IngestionConsumer::new(Arc::clone(&gateway), dispatcher, DEFAULT_MAX_RETRIES);

        let api_detector = Arc::new(FakeDetector::new("siem.test"));
        let agent_detector = Arc::new(FakeDetector::new("host.test"));
        let api_worker = Worker::new(
            Arc::clone(&api_detector) as Arc<dyn Detector>,
            Arc::clone(&gateway),
            Arc::clone(&publisher),
            WorkerConfig { worker_id: "api-worker-1".into(), ..base.clone() },
            clock.clone(),
        );
        let agent_worker = Worker::new(
            Arc::clone(&agent_detector) as Arc<dyn Detector>,
            Arc::clone(&gateway),
            Arc::clone(&publisher),
            WorkerConfig { worker_id: "agent-worker-1".into(), ..base },
            clock.clone(),
        );

        let results = ResultConsumer::new(gateway, clock.clone());

        Self {
            clock,
            store,
            bus,
            api_detector,
            agent_detector,
            ingestion,
            api_worker,
            agent_worker,
            results,
            cursor: Mutex::new(0),
        }
    }

    /// Deliver one instruction message.
    pub async fn ingest(&self, payload: &[u8]) -> Disposition {
        self.ingestion.handle(payload).await
    }

    /// Messages published since the last drain.
    pub fn take_published(&self) -> Vec<(String, Vec<u8>)> {
        let all = self.bus.published();
        let mut cursor = self.cursor.lock();
        let new = all[*cursor..].to_vec();
        *cursor = all.len();
        new
    }

    /// Route every new task message to its worker pool. Returns the
    /// dispositions in delivery order.
    pub async fn run_workers(&self) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        for (route, payload) in self.take_published() {
            let disposition = match route.as_str() {
                ROUTE_API_TASK => self.api_worker.handle(&payload).await,
                ROUTE_AGENT_TASK => self.agent_worker.handle(&payload).await,
                other => panic!("unrouted message to {other}"),
            };
            dispositions.push(disposition);
        }
        dispositions
    }

    /// Deliver every new response message to the result consumer.
    pub async fn run_results(&self) -> Vec<Disposition> {
        let mut dispositions = Vec::new();
        for (route, payload) in self.take_published() {
            match route.as_str() {
                ROUTE_API_RESPONSE | ROUTE_AGENT_RESPONSE => {
                    dispositions.push(self.results.handle(&payload).await);
                }
                other => panic!("unrouted message to {other}"),
            }
        }
        dispositions
    }

    /// Ingest, run workers, deliver responses. Panics if any stage does
    /// not ack.
    pub async fn run_to_completion(&self, payload: &[u8]) {
        assert_eq!(self.ingest(payload).await, Disposition::Ack);
        for disposition in self.run_workers().await {
            assert_eq!(disposition, Disposition::Ack);
        }
        for disposition in self.run_results().await {
            assert_eq!(disposition, Disposition::Ack);
        }
    }

    /// Every detection execution in the store, regardless of status.
    pub async fn detections(&self) -> Vec<DetectionExecutionRow> {
        let mut rows = Vec::new();
        for status in [
            DetectionStatus::Pending,
            DetectionStatus::Running,
            DetectionStatus::Completed,
            DetectionStatus::Failed,
            DetectionStatus::Cancelled,
        ] {
            rows.extend(self.store.detection_executions_by_status(status).await.unwrap());
        }
        rows
    }
}

/// A well-formed execution record payload.
pub struct RecordBuilder {
    operation_id: OperationId,
    link_id: LinkId,
    command: String,
    detections: Value,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            operation_id: OperationId::new(),
            link_id: LinkId::new(),
            command: "whoami".into(),
            detections: json!({ "api": { "siem": { "query": "index=main user=root" } } }),
        }
    }

    pub fn operation_id(mut self, id: OperationId) -> Self {
        self.operation_id = id;
        self
    }

    pub fn link_id(mut self, id: LinkId) -> Self {
        self.link_id = id;
        self
    }

    pub fn detections(mut self, detections: Value) -> Self {
        self.detections = detections;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "operation": {
                "id": self.operation_id,
                "name": "discovery-sweep",
                "started_at": "2026-03-01T10:00:00.000000Z"
            },
            "execution": {
                "link_id": self.link_id,
                "agent_host": "ws-042",
                "agent_paw": "qwerty",
                "command": self.command,
                "pid": 3110,
                "status": 0,
                "result_data": {"stdout": "root", "stderr": "", "exit_code": 0},
                "agent_reported_at": "2026-03-01T10:05:00.000000Z",
                "link_state": "SUCCESS"
            },
            "detections": self.detections,
            "raw_message": {"opaque": true}
        }))
        .unwrap()
    }
}

pub fn assert_detected(results: &[DetectionResultRow], expected: Detected) {
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.detected == expected));
}
