#![cfg(feature = "docker")]

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    ListContainersOptions, LogsOptions, RemoveContainerOptions, RestartContainerOptions,
    StartContainerOptions, Stats, StatsOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tracing::debug;

use dockview_core::adapter::{AdapterError, LogByteStream, LogOptions, RawEntity, RuntimeAdapter};
use dockview_core::compose::{self, ContainerRecord};
use dockview_core::model::{ActionKind, EntityId, EntityKind, ResourceSample};

use super::merged;

/// Seconds the engine waits before killing a container on stop/restart
const STOP_GRACE_SECS: i64 = 10;

#[derive(Clone, Debug)]
struct Member {
    id: String,
    name: String,
}

pub struct DockerAdapter {
    client: Docker,
    /// Member containers of every stack and service in the last listing
    groups: Mutex<HashMap<EntityId, Vec<Member>>>,
}

impl DockerAdapter {
    /// Connect using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self, AdapterError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| AdapterError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            groups: Mutex::new(HashMap::new()),
        })
    }

    /// Member containers when `id` is a stack or service
    fn members(&self, id: &EntityId) -> Option<Vec<Member>> {
        self.groups.lock().get(id).cloned()
    }

    fn remember_groups(&self, entities: &[RawEntity]) {
        let parents: HashMap<&str, &str> = entities
            .iter()
            .filter_map(|e| e.parent.as_deref().map(|p| (e.id.as_str(), p)))
            .collect();

        let mut groups: HashMap<EntityId, Vec<Member>> = HashMap::new();
        for container in entities.iter().filter(|e| e.kind == EntityKind::Container) {
            let mut cursor = parents.get(container.id.as_str()).copied();
            while let Some(group) = cursor {
                groups.entry(group.to_string()).or_default().push(Member {
                    id: container.id.clone(),
                    name: container.name.clone(),
                });
                cursor = parents.get(group).copied();
            }
        }
        *self.groups.lock() = groups;
    }

    async fn container_action(&self, id: &str, action: &ActionKind) -> Result<Option<String>, AdapterError> {
        match action {
            ActionKind::Start => self
                .client
                .start_container(id, None::<StartContainerOptions<String>>)
                .await
                .map_err(action_error)?,
            ActionKind::Stop => self
                .client
                .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
                .await
                .map_err(action_error)?,
            ActionKind::Restart => self
                .client
                .restart_container(
                    id,
                    Some(RestartContainerOptions {
                        t: STOP_GRACE_SECS as isize,
                    }),
                )
                .await
                .map_err(action_error)?,
            ActionKind::Remove => self
                .client
                .remove_container(
                    id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
                .map_err(action_error)?,
            ActionKind::Exec { command } => return self.exec(id, command).await.map(Some),
        }
        Ok(None)
    }

    async fn exec(&self, id: &str, command: &[String]) -> Result<String, AdapterError> {
        let created = self
            .client
            .create_exec(
                id,
                CreateExecOptions {
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    cmd: Some(command.to_vec()),
                    ..Default::default()
                },
            )
            .await
            .map_err(action_error)?;

        let mut text = String::new();
        if let StartExecResults::Attached { mut output, .. } = self
            .client
            .start_exec(&created.id, None)
            .await
            .map_err(action_error)?
        {
            while let Some(chunk) = output.next().await {
                text.push_str(&chunk.map_err(action_error)?.to_string());
            }
        }
        Ok(text)
    }

    fn container_logs(&self, id: &str, options: &LogOptions) -> LogByteStream {
        let since = options
            .since
            .and_then(|window| SystemTime::now().checked_sub(window))
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let entity: EntityId = id.to_string();
        self.client
            .logs(
                id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    since,
                    tail: options.tail.to_string(),
                    ..Default::default()
                }),
            )
            .map(move |item| {
                item.map(|out| out.into_bytes().to_vec())
                    .map_err(|e| AdapterError::StreamError {
                        id: entity.clone(),
                        reason: e.to_string(),
                    })
            })
            .boxed()
    }
}

/// Engine error text is shown to the user verbatim
fn action_error(err: DockerError) -> AdapterError {
    match err {
        DockerError::DockerResponseServerError { message, .. } => AdapterError::ActionError(message),
        other => AdapterError::ActionError(other.to_string()),
    }
}

/// Share of host CPU used between two readings, scaled so one busy core is 100%
fn cpu_percent(cpu_delta: u64, system_delta: u64, cpus: u64) -> Option<f64> {
    (system_delta > 0).then(|| cpu_delta as f64 / system_delta as f64 * cpus as f64 * 100.0)
}

fn sample_from(stats: &Stats) -> ResourceSample {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .zip(stats.precpu_stats.system_cpu_usage)
        .map(|(now, before)| now.saturating_sub(before))
        .unwrap_or(0);
    let cpus = stats
        .cpu_stats
        .online_cpus
        .or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u64)
        })
        .unwrap_or(1);

    let cpu_percent = cpu_percent(cpu_delta, system_delta, cpus);

    let (rx, tx) = stats
        .networks
        .as_ref()
        .map(|nets| {
            nets.values()
                .fold((0u64, 0u64), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes))
        })
        .unzip();

    ResourceSample {
        cpu_percent: cpu_percent.or(Some(0.0)),
        memory_used: stats.memory_stats.usage,
        memory_limit: stats.memory_stats.limit,
        net_rx_bytes: rx,
        net_tx_bytes: tx,
        stale: false,
    }
}

#[async_trait]
impl RuntimeAdapter for DockerAdapter {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn list_entities(&self) -> Result<Vec<RawEntity>, AdapterError> {
        let summaries = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| AdapterError::RuntimeUnavailable(e.to_string()))?;

        let records: Vec<ContainerRecord> = summaries
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.chars().take(12).collect());
                Some(ContainerRecord {
                    id,
                    name,
                    image: c.image,
                    state: c.state.unwrap_or_default(),
                    status: c.status.unwrap_or_default(),
                    labels: c
                        .labels
                        .map(|l| l.into_iter().collect::<BTreeMap<_, _>>())
                        .unwrap_or_default(),
                })
            })
            .collect();

        let entities = compose::assemble(records);
        self.remember_groups(&entities);
        Ok(entities)
    }

    async fn read_stats(&self, id: &EntityId) -> Result<ResourceSample, AdapterError> {
        let unavailable = |reason: String| AdapterError::StatsUnavailable {
            id: id.clone(),
            reason,
        };
        let stats = self
            .client
            .stats(
                id,
                Some(StatsOptions {
                    stream: false,
                    one_shot: false,
                }),
            )
            .next()
            .await
            .ok_or_else(|| unavailable("no stats returned".into()))?
            .map_err(|e| unavailable(e.to_string()))?;
        Ok(sample_from(&stats))
    }

    async fn stream_logs(&self, id: &EntityId, options: &LogOptions) -> Result<LogByteStream, AdapterError> {
        if let Some(members) = self.members(id) {
            debug!(%id, members = members.len(), "merging member log streams");
            let members = members
                .into_iter()
                .map(|m| {
                    let stream = self.container_logs(&m.id, options);
                    (m.name, stream)
                })
                .collect();
            return Ok(merged(members));
        }
        Ok(self.container_logs(id, options))
    }

    async fn perform_action(&self, id: &EntityId, action: &ActionKind) -> Result<Option<String>, AdapterError> {
        if let Some(members) = self.members(id) {
            if matches!(action, ActionKind::Exec { .. }) {
                return Err(AdapterError::ActionError(
                    "exec needs a single container".into(),
                ));
            }
            for member in &members {
                debug!(group = %id, container = %member.name, action = action.label(), "group action");
                self.container_action(&member.id, action).await?;
            }
            return Ok(None);
        }
        self.container_action(id, action).await
    }
}
