//! Compose grouping
//!
//! Turns a flat container listing into the stack → service → container tree
//! using the labels Compose puts on every container it creates.

use std::collections::BTreeMap;

use crate::adapter::RawEntity;
use crate::model::{EntityId, EntityKind, HealthStatus, LifecycleState};

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
pub const CONFIG_FILES_LABEL: &str = "com.docker.compose.project.config_files";

/// One container as listed by the engine
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    /// Engine state string ("running", "exited", ...)
    pub state: String,
    /// Engine status text ("Up 5 minutes (healthy)")
    pub status: String,
    pub labels: BTreeMap<String, String>,
}

pub fn stack_id(project: &str) -> EntityId {
    format!("stack:{project}")
}

pub fn service_id(project: &str, service: &str) -> EntityId {
    format!("service:{project}/{service}")
}

#[derive(Default)]
struct ServiceGroup {
    containers: Vec<RawEntity>,
}

#[derive(Default)]
struct StackGroup {
    config_file: Option<String>,
    services: BTreeMap<String, ServiceGroup>,
    /// Containers with a project label but no service label
    loose: Vec<RawEntity>,
}

/// Build the entity list for one poll.
///
/// Order: each stack (by project name), then its services (by name), each
/// followed by its containers (by name); containers outside any project come
/// last. The order is deterministic for identical input.
pub fn assemble(records: Vec<ContainerRecord>) -> Vec<RawEntity> {
    let mut stacks: BTreeMap<String, StackGroup> = BTreeMap::new();
    let mut standalone: Vec<RawEntity> = Vec::new();

    for record in records {
        let project = record.labels.get(PROJECT_LABEL).cloned();
        let service = record.labels.get(SERVICE_LABEL).cloned();
        let config_file = record.labels.get(CONFIG_FILES_LABEL).cloned();

        let mut container = RawEntity {
            id: record.id,
            name: record.name,
            kind: EntityKind::Container,
            state: LifecycleState::parse(&record.state),
            health: HealthStatus::from_status_text(&record.status),
            parent: None,
            image: record.image,
            status_text: record.status,
            config_file: None,
        };

        match project {
            Some(project) => {
                let stack = stacks.entry(project.clone()).or_default();
                if stack.config_file.is_none() {
                    stack.config_file = config_file;
                }
                match service {
                    Some(service) => {
                        container.parent = Some(service_id(&project, &service));
                        stack
                            .services
                            .entry(service)
                            .or_default()
                            .containers
                            .push(container);
                    }
                    None => {
                        container.parent = Some(stack_id(&project));
                        stack.loose.push(container);
                    }
                }
            }
            None => standalone.push(container),
        }
    }

    let mut out = Vec::new();

    for (project, mut stack) in stacks {
        let sid = stack_id(&project);

        let mut members: Vec<(LifecycleState, Option<HealthStatus>)> = Vec::new();
        let mut body: Vec<RawEntity> = Vec::new();

        for (service, mut group) in std::mem::take(&mut stack.services) {
            group.containers.sort_by(|a, b| a.name.cmp(&b.name));
            let states: Vec<_> = group
                .containers
                .iter()
                .map(|c| (c.state, c.health))
                .collect();
            members.extend(states.iter().copied());

            body.push(RawEntity {
                id: service_id(&project, &service),
                name: service.clone(),
                kind: EntityKind::Service,
                state: aggregate_state(states.iter().map(|(s, _)| *s)),
                health: aggregate_health(states.iter().map(|(_, h)| *h)),
                parent: Some(sid.clone()),
                image: group.containers.first().and_then(|c| c.image.clone()),
                status_text: summary_text(&states),
                config_file: None,
            });
            body.extend(group.containers);
        }

        stack.loose.sort_by(|a, b| a.name.cmp(&b.name));
        members.extend(stack.loose.iter().map(|c| (c.state, c.health)));
        body.extend(stack.loose);

        out.push(RawEntity {
            id: sid,
            name: project,
            kind: EntityKind::Stack,
            state: aggregate_state(members.iter().map(|(s, _)| *s)),
            health: aggregate_health(members.iter().map(|(_, h)| *h)),
            parent: None,
            image: None,
            status_text: summary_text(&members),
            config_file: stack.config_file,
        });
        out.extend(body);
    }

    standalone.sort_by(|a, b| a.name.cmp(&b.name));
    out.extend(standalone);
    out
}

/// Group state from member states: restarting wins, then running, paused,
/// all-created, dead, and finally exited.
pub fn aggregate_state(states: impl IntoIterator<Item = LifecycleState>) -> LifecycleState {
    let states: Vec<LifecycleState> = states.into_iter().collect();
    if states.is_empty() {
        return LifecycleState::Unknown;
    }
    let any = |s: LifecycleState| states.contains(&s);

    if any(LifecycleState::Restarting) {
        LifecycleState::Restarting
    } else if any(LifecycleState::Running) {
        LifecycleState::Running
    } else if any(LifecycleState::Paused) {
        LifecycleState::Paused
    } else if states.iter().all(|s| *s == LifecycleState::Created) {
        LifecycleState::Created
    } else if any(LifecycleState::Dead) {
        LifecycleState::Dead
    } else if any(LifecycleState::Exited) {
        LifecycleState::Exited
    } else {
        LifecycleState::Unknown
    }
}

/// Group health: any unhealthy member makes the group unhealthy, any
/// starting member makes it starting, and it is healthy only when every
/// member reports healthy.
pub fn aggregate_health(
    health: impl IntoIterator<Item = Option<HealthStatus>>,
) -> Option<HealthStatus> {
    let health: Vec<Option<HealthStatus>> = health.into_iter().collect();
    if health.contains(&Some(HealthStatus::Unhealthy)) {
        Some(HealthStatus::Unhealthy)
    } else if health.contains(&Some(HealthStatus::Starting)) {
        Some(HealthStatus::Starting)
    } else if !health.is_empty() && health.iter().all(|h| *h == Some(HealthStatus::Healthy)) {
        Some(HealthStatus::Healthy)
    } else {
        None
    }
}

fn summary_text(members: &[(LifecycleState, Option<HealthStatus>)]) -> String {
    let running = members.iter().filter(|(s, _)| s.is_running()).count();
    let exited = members
        .iter()
        .filter(|(s, _)| *s == LifecycleState::Exited)
        .count();
    format!("{running} running, {exited} exited, {} total", members.len())
}
