//! In-memory runtime for `--demo`: one compose stack plus a couple of
//! standalone containers, with generated stats and logs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use parking_lot::Mutex;

use dockview_core::adapter::{AdapterError, LogByteStream, LogOptions, RawEntity, RuntimeAdapter};
use dockview_core::compose::{self, ContainerRecord, PROJECT_LABEL, SERVICE_LABEL};
use dockview_core::model::{ActionKind, EntityId, LifecycleState, ResourceSample};

use super::merged;

const PROJECT: &str = "shop";

#[derive(Clone, Debug)]
struct DemoContainer {
    id: String,
    name: String,
    service: Option<&'static str>,
    image: &'static str,
    state: LifecycleState,
    healthcheck: bool,
    /// Start fails with this engine error
    start_error: Option<&'static str>,
}

impl DemoContainer {
    fn new(id: &str, name: &str, service: Option<&'static str>, image: &'static str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service,
            image,
            state: LifecycleState::Running,
            healthcheck: false,
            start_error: None,
        }
    }

    fn record(&self) -> ContainerRecord {
        let mut labels = BTreeMap::new();
        if let Some(service) = self.service {
            labels.insert(PROJECT_LABEL.to_string(), PROJECT.to_string());
            labels.insert(SERVICE_LABEL.to_string(), service.to_string());
        }
        let status = match self.state {
            LifecycleState::Running if self.healthcheck => "Up 12 minutes (healthy)".to_string(),
            LifecycleState::Running => "Up 12 minutes".to_string(),
            LifecycleState::Exited => "Exited (0) 3 minutes ago".to_string(),
            other => other.label().to_string(),
        };
        ContainerRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            image: Some(self.image.to_string()),
            state: self.state.label().to_string(),
            status,
            labels,
        }
    }

    fn role(&self) -> &str {
        self.service.unwrap_or(&self.name)
    }
}

fn initial_containers() -> Vec<DemoContainer> {
    let mut db = DemoContainer::new("c0d1", "shop-db-1", Some("db"), "postgres:16");
    db.healthcheck = true;
    let mut legacy = DemoContainer::new("c0f1", "legacy-cron", None, "busybox:1.36");
    legacy.state = LifecycleState::Exited;
    legacy.start_error = Some(
        "driver failed programming external connectivity on endpoint legacy-cron: Bind for 0.0.0.0:8080 failed: port is already allocated",
    );

    vec![
        DemoContainer::new("c0a1", "shop-api-1", Some("api"), "shop/api:1.4"),
        DemoContainer::new("c0a2", "shop-api-2", Some("api"), "shop/api:1.4"),
        DemoContainer::new("c0b1", "shop-worker-1", Some("worker"), "shop/worker:1.4"),
        db,
        DemoContainer::new("c0e1", "redis-cache", None, "redis:7"),
        legacy,
    ]
}

type Containers = Arc<Mutex<Vec<DemoContainer>>>;

pub struct DemoAdapter {
    containers: Containers,
    tick: AtomicU64,
    line_interval: Duration,
    action_delay: Duration,
}

impl DemoAdapter {
    pub fn new() -> Self {
        Self::with_timing(Duration::from_millis(600), Duration::from_millis(400))
    }

    pub fn with_timing(line_interval: Duration, action_delay: Duration) -> Self {
        Self {
            containers: Arc::new(Mutex::new(initial_containers())),
            tick: AtomicU64::new(0),
            line_interval,
            action_delay,
        }
    }

    /// Container ids `id` stands for: itself, or the members of a group
    fn resolve(&self, id: &str) -> Vec<(String, String)> {
        self.containers
            .lock()
            .iter()
            .filter(|c| {
                c.id == id
                    || c.service.is_some_and(|s| {
                        compose::stack_id(PROJECT) == id || compose::service_id(PROJECT, s) == id
                    })
            })
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect()
    }

    fn container_logs(&self, id: &str, options: &LogOptions) -> LogByteStream {
        let Some(container) = self.containers.lock().iter().find(|c| c.id == id).cloned() else {
            return stream::empty().boxed();
        };
        let role = container.role().to_string();
        let history: Vec<Result<Vec<u8>, AdapterError>> = (0..options.tail.min(5) as u64)
            .map(|n| Ok(format!("{}\n", log_text(&role, n)).into_bytes()))
            .collect();

        let containers = self.containers.clone();
        let interval = self.line_interval;
        let live = stream::unfold(5u64, move |n| {
            let containers = containers.clone();
            let id = container.id.clone();
            let role = role.clone();
            async move {
                tokio::time::sleep(interval).await;
                let running = containers
                    .lock()
                    .iter()
                    .any(|c| c.id == id && c.state.is_running());
                running.then(|| (Ok(format!("{}\n", log_text(&role, n)).into_bytes()), n + 1))
            }
        });
        stream::iter(history).chain(live).boxed()
    }
}

impl Default for DemoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn log_text(role: &str, n: u64) -> String {
    match role {
        "api" => {
            if n % 12 == 7 {
                "\x1b[31mERROR\x1b[0m Connection refused to upstream service".into()
            } else if n % 8 == 3 {
                "\x1b[33mWARN\x1b[0m High latency detected: 450ms".into()
            } else {
                let routes = ["GET /health 200", "GET /api/users 200", "POST /api/orders 201", "GET /api/status 200"];
                routes[(n as usize) % routes.len()].into()
            }
        }
        "worker" => {
            if n % 10 == 5 {
                format!("ERROR job {} failed: timeout after 30s", n)
            } else if n % 7 == 2 {
                format!("WARN queue depth high: {} pending", 50 + (n % 30))
            } else {
                format!("processed job id={}", n)
            }
        }
        "db" => {
            if n % 15 == 10 {
                "WARN slow query detected: 1250ms".into()
            } else {
                let msgs = ["checkpoint complete", "autovacuum: processing", "connection accepted"];
                msgs[(n as usize) % msgs.len()].into()
            }
        }
        "redis-cache" => format!("keys: {}, memory: {:.1}MB", 1000 + (n % 500), 2.0 + (n % 10) as f64 * 0.1),
        _ => format!("tick {}", n),
    }
}

fn exec_output(command: &[String]) -> String {
    match command.first().map(String::as_str) {
        Some("ls") => "bin\netc\nhome\nusr\nvar\n".into(),
        Some("env") => "PATH=/usr/local/bin:/usr/bin:/bin\nHOSTNAME=demo\n".into(),
        Some("echo") => format!("{}\n", command[1..].join(" ")),
        Some(other) => format!("sh: {}: not found\n", other),
        None => String::new(),
    }
}

#[async_trait]
impl RuntimeAdapter for DemoAdapter {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn list_entities(&self) -> Result<Vec<RawEntity>, AdapterError> {
        self.tick.fetch_add(1, Ordering::Relaxed);
        let records = self.containers.lock().iter().map(DemoContainer::record).collect();
        Ok(compose::assemble(records))
    }

    async fn read_stats(&self, id: &EntityId) -> Result<ResourceSample, AdapterError> {
        let containers = self.containers.lock();
        let container = containers
            .iter()
            .find(|c| c.id == *id && c.state.is_running())
            .ok_or_else(|| AdapterError::StatsUnavailable {
                id: id.clone(),
                reason: "container is not running".into(),
            })?;

        let tick = self.tick.load(Ordering::Relaxed);
        let (base_cpu, base_mem) = match container.role() {
            "api" => (12.0, 150_000_000u64),
            "worker" => (35.0, 280_000_000u64),
            "db" => (8.0, 512_000_000u64),
            "redis-cache" => (3.0, 64_000_000u64),
            _ => (5.0, 50_000_000u64),
        };
        Ok(ResourceSample {
            cpu_percent: Some((base_cpu + (tick % 10) as f64 * 1.5 - 5.0).max(0.1)),
            memory_used: Some(base_mem + (tick % 20) * 1_000_000),
            memory_limit: Some(2_048 * 1024 * 1024),
            net_rx_bytes: Some(tick * 14_000),
            net_tx_bytes: Some(tick * 9_000),
            stale: false,
        })
    }

    async fn stream_logs(&self, id: &EntityId, options: &LogOptions) -> Result<LogByteStream, AdapterError> {
        let targets = self.resolve(id);
        match targets.as_slice() {
            [] => Err(AdapterError::StreamError {
                id: id.clone(),
                reason: format!("No such container: {id}"),
            }),
            [(cid, _)] if cid == id => Ok(self.container_logs(cid, options)),
            _ => Ok(merged(
                targets
                    .iter()
                    .map(|(cid, name)| (name.clone(), self.container_logs(cid, options)))
                    .collect(),
            )),
        }
    }

    async fn perform_action(&self, id: &EntityId, action: &ActionKind) -> Result<Option<String>, AdapterError> {
        tokio::time::sleep(self.action_delay).await;

        let targets: Vec<String> = self.resolve(id).into_iter().map(|(cid, _)| cid).collect();
        if targets.is_empty() {
            return Err(AdapterError::ActionError(format!("No such container: {id}")));
        }

        let mut containers = self.containers.lock();
        if let ActionKind::Exec { command } = action {
            if targets.len() > 1 || targets[0] != *id {
                return Err(AdapterError::ActionError("exec needs a single container".into()));
            }
            return Ok(Some(exec_output(command)));
        }
        if *action == ActionKind::Remove {
            containers.retain(|c| !targets.contains(&c.id));
            return Ok(None);
        }

        for container in containers.iter_mut().filter(|c| targets.contains(&c.id)) {
            container.state = match action {
                ActionKind::Start | ActionKind::Restart => {
                    if let Some(reason) = container.start_error {
                        return Err(AdapterError::ActionError(reason.into()));
                    }
                    LifecycleState::Running
                }
                _ => LifecycleState::Exited,
            };
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use dockview_core::model::EntityKind;

    use super::*;

    fn fast() -> DemoAdapter {
        DemoAdapter::with_timing(Duration::from_millis(1), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_listing_groups_the_stack() {
        let adapter = fast();
        let entities = adapter.list_entities().await.unwrap();

        assert_eq!(entities[0].id, "stack:shop");
        assert_eq!(entities[0].kind, EntityKind::Stack);
        let api = entities.iter().find(|e| e.id == "service:shop/api").unwrap();
        assert_eq!(api.parent.as_deref(), Some("stack:shop"));
        assert_eq!(
            entities.iter().filter(|e| e.parent.as_deref() == Some("service:shop/api")).count(),
            2
        );
        assert_eq!(entities.last().unwrap().name, "redis-cache");
    }

    #[tokio::test]
    async fn test_service_stop_applies_to_members() {
        let adapter = fast();
        adapter
            .perform_action(&"service:shop/api".to_string(), &ActionKind::Stop)
            .await
            .unwrap();

        let entities = adapter.list_entities().await.unwrap();
        let api = entities.iter().find(|e| e.id == "service:shop/api").unwrap();
        assert_eq!(api.state, LifecycleState::Exited);
        assert!(
            adapter
                .read_stats(&"c0a1".to_string())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_start_error_is_reported_verbatim() {
        let adapter = fast();
        let err = adapter
            .perform_action(&"c0f1".to_string(), &ActionKind::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ActionError(reason) if reason.ends_with("port is already allocated")));
    }

    #[tokio::test]
    async fn test_log_stream_ends_when_container_stops() {
        let adapter = fast();
        let options = LogOptions {
            tail: 2,
            since: None,
        };
        let mut logs = adapter.stream_logs(&"c0b1".to_string(), &options).await.unwrap();
        assert_eq!(logs.next().await.unwrap().unwrap(), b"processed job id=0\n".to_vec());

        adapter
            .perform_action(&"c0b1".to_string(), &ActionKind::Stop)
            .await
            .unwrap();
        // History drains, then the live part sees the stop
        let rest: Vec<_> = logs.collect().await;
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn test_exec_returns_output() {
        let adapter = fast();
        let out = adapter
            .perform_action(
                &"c0e1".to_string(),
                &ActionKind::Exec {
                    command: vec!["echo".into(), "hi".into()],
                },
            )
            .await
            .unwrap();
        assert_eq!(out.as_deref(), Some("hi\n"));
    }
}
