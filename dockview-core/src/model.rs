use serde::{Deserialize, Serialize};

/// Runtime-assigned identity (container id) or a derived group id
/// (`stack:<project>`, `service:<project>/<service>`).
pub type EntityId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Container,
    Service,
    Stack,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Container => "container",
            EntityKind::Service => "service",
            EntityKind::Stack => "stack",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Running,
    Paused,
    Restarting,
    Exited,
    Dead,
    #[default]
    Unknown,
}

impl LifecycleState {
    /// Parse the runtime's state string. Anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => LifecycleState::Created,
            "running" | "up" => LifecycleState::Running,
            "paused" => LifecycleState::Paused,
            "restarting" => LifecycleState::Restarting,
            "exited" | "stopped" => LifecycleState::Exited,
            "dead" | "removing" => LifecycleState::Dead,
            _ => LifecycleState::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Paused => "paused",
            LifecycleState::Restarting => "restarting",
            LifecycleState::Exited => "exited",
            LifecycleState::Dead => "dead",
            LifecycleState::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, LifecycleState::Running)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
}

impl HealthStatus {
    /// Extract the health marker from a runtime status line such as
    /// `Up 3 minutes (healthy)` or `Up 2 seconds (health: starting)`.
    pub fn from_status_text(status: &str) -> Option<Self> {
        let lower = status.to_ascii_lowercase();
        if lower.contains("(unhealthy)") {
            Some(HealthStatus::Unhealthy)
        } else if lower.contains("(health: starting)") {
            Some(HealthStatus::Starting)
        } else if lower.contains("(healthy)") {
            Some(HealthStatus::Healthy)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Starting => "starting",
        }
    }
}

/// One resource reading. Every metric is optional; `stale` marks a sample
/// carried over from an earlier poll because the latest read failed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: Option<f64>,
    pub memory_used: Option<u64>,
    pub memory_limit: Option<u64>,
    pub net_rx_bytes: Option<u64>,
    pub net_tx_bytes: Option<u64>,
    #[serde(default)]
    pub stale: bool,
}

impl ResourceSample {
    pub fn into_stale(mut self) -> Self {
        self.stale = true;
        self
    }

    pub fn memory_percent(&self) -> Option<f64> {
        match (self.memory_used, self.memory_limit) {
            (Some(used), Some(limit)) if limit > 0 => Some(used as f64 / limit as f64 * 100.0),
            _ => None,
        }
    }

    /// Sum member samples into a group sample. Returns `None` when no member
    /// has a sample yet.
    pub fn aggregate<'a>(samples: impl IntoIterator<Item = &'a ResourceSample>) -> Option<Self> {
        fn add<T: std::ops::Add<Output = T>>(acc: Option<T>, v: Option<T>) -> Option<T> {
            match (acc, v) {
                (Some(a), Some(b)) => Some(a + b),
                (a, None) => a,
                (None, b) => b,
            }
        }

        let mut out: Option<ResourceSample> = None;
        for s in samples {
            let acc = out.get_or_insert_with(ResourceSample::default);
            acc.cpu_percent = add(acc.cpu_percent, s.cpu_percent);
            acc.memory_used = add(acc.memory_used, s.memory_used);
            acc.memory_limit = add(acc.memory_limit, s.memory_limit);
            acc.net_rx_bytes = add(acc.net_rx_bytes, s.net_rx_bytes);
            acc.net_tx_bytes = add(acc.net_tx_bytes, s.net_tx_bytes);
            acc.stale |= s.stale;
        }
        out
    }
}

/// A container, service or stack as the dashboard tracks it.
///
/// `name`, `state`, `health` and `resources` are the rendered fields; the
/// diff engine ignores everything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub state: LifecycleState,
    pub health: Option<HealthStatus>,
    pub resources: Option<ResourceSample>,
    /// Service for a container, stack for a service.
    pub parent: Option<EntityId>,
    pub image: Option<String>,
    /// Runtime status text ("Up 5 minutes"); changes every poll.
    pub status_text: String,
    /// Compose file(s) a stack was started from.
    pub config_file: Option<String>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            state: LifecycleState::Unknown,
            health: None,
            resources: None,
            parent: None,
            image: None,
            status_text: String::new(),
            config_file: None,
        }
    }

    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_health(mut self, health: Option<HealthStatus>) -> Self {
        self.health = health;
        self
    }

    pub fn with_resources(mut self, resources: Option<ResourceSample>) -> Self {
        self.resources = resources;
        self
    }
}

/// What the user can ask the runtime to do to an entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    Remove,
    Exec { command: Vec<String> },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Restart => "restart",
            ActionKind::Remove => "remove",
            ActionKind::Exec { .. } => "exec",
        }
    }

    /// State shown while the action is unconfirmed. `Exec` leaves the
    /// entity's state alone.
    pub fn optimistic_state(&self) -> Option<LifecycleState> {
        match self {
            ActionKind::Start => Some(LifecycleState::Running),
            ActionKind::Stop => Some(LifecycleState::Exited),
            ActionKind::Restart => Some(LifecycleState::Restarting),
            ActionKind::Remove => Some(LifecycleState::Dead),
            ActionKind::Exec { .. } => None,
        }
    }
}
