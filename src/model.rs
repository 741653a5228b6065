use chrono::{DateTime, Local, Utc};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Provisioning,
    Pending,
    Activating,
    Running,
    Deactivating,
    Stopping,
    Deprovisioning,
    Stopped,
    Deleted,
    Unknown(String),
}

impl TaskStatus {
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "PROVISIONING" => Self::Provisioning,
            "PENDING" => Self::Pending,
            "ACTIVATING" => Self::Activating,
            "RUNNING" => Self::Running,
            "DEACTIVATING" => Self::Deactivating,
            "STOPPING" => Self::Stopping,
            "DEPROVISIONING" => Self::Deprovisioning,
            "STOPPED" => Self::Stopped,
            "DELETED" => Self::Deleted,
            _ => Self::Unknown(token.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Pending => "PENDING",
            Self::Activating => "ACTIVATING",
            Self::Running => "RUNNING",
            Self::Deactivating => "DEACTIVATING",
            Self::Stopping => "STOPPING",
            Self::Deprovisioning => "DEPROVISIONING",
            Self::Stopped => "STOPPED",
            Self::Deleted => "DELETED",
            Self::Unknown(raw) => raw,
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub runtime_id: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub status: TaskStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub containers: Vec<Container>,
    pub exec_enabled: bool,
}

impl Task {
    /// Only running tasks with the exec capability turned on accept sessions.
    pub fn is_connectable(&self) -> bool {
        self.exec_enabled && self.status == TaskStatus::Running
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|container| container.name == name)
    }

    pub fn container_names(&self) -> String {
        self.containers
            .iter()
            .map(|container| container.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn created_label(&self) -> String {
        self.created_at
            .map(|created| {
                created
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn resources_label(&self) -> String {
        format!(
            "CPU: {}, Memory: {}",
            self.cpu.as_deref().unwrap_or("-"),
            self.memory.as_deref().unwrap_or("-")
        )
    }

    pub fn display_label(&self) -> String {
        format!(
            "{} | {} | {}",
            self.id,
            self.created_label(),
            self.container_names()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub cluster: String,
    pub task_id: String,
    pub container: String,
}

impl SessionRequest {
    pub fn new(
        cluster: impl Into<String>,
        task_id: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            task_id: task_id.into(),
            container: container.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub stream_url: String,
    pub token: String,
}

impl std::fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGrant")
            .field("session_id", &self.session_id)
            .field("stream_url", &self.stream_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub profile: String,
    pub region: String,
    pub endpoint_url: String,
    pub shell: String,
}

/// Last path segment of an ARN, or the input unchanged when it is already a bare name.
pub fn resource_name(arn_or_name: &str) -> &str {
    arn_or_name.rsplit('/').next().unwrap_or(arn_or_name)
}
