use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::Client;
use aws_sdk_ecs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ecs::types::DesiredStatus;
use chrono::DateTime;
use tracing::{debug, warn};

use crate::error::ControlPlaneError;
use crate::model::{
    Container, SessionContext, SessionGrant, SessionRequest, Task, TaskStatus, resource_name,
};

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, ControlPlaneError>;

    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, ControlPlaneError>;

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<Task>, ControlPlaneError>;

    async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionGrant, ControlPlaneError>;
}

pub const DESCRIBE_TASKS_LIMIT: usize = 100;

#[derive(Clone)]
pub struct EcsGateway {
    client: Client,
    context: SessionContext,
}

impl EcsGateway {
    pub async fn connect(profile: &str, region: Option<&str>, shell: &str) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_name(profile);
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map(|region| region.to_string())
            .with_context(|| format!("no AWS region configured for profile '{profile}'"))?;
        let endpoint_url = sdk_config
            .endpoint_url()
            .map(str::to_string)
            .unwrap_or_else(|| default_endpoint(&region));
        debug!(profile, region = %region, endpoint = %endpoint_url, "initialized ECS client");

        Ok(Self {
            client: Client::new(&sdk_config),
            context: SessionContext {
                profile: profile.to_string(),
                region,
                endpoint_url,
                shell: shell.to_string(),
            },
        })
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.context
    }
}

#[async_trait]
impl ControlPlane for EcsGateway {
    async fn list_services(&self, cluster: &str) -> Result<Vec<String>, ControlPlaneError> {
        let mut pages = self
            .client
            .list_services()
            .cluster(cluster)
            .into_paginator()
            .send();

        let mut arns = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| classify("ListServices", error))?;
            arns.extend(page.service_arns().iter().cloned());
        }
        Ok(arns)
    }

    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, ControlPlaneError> {
        let mut pages = self
            .client
            .list_tasks()
            .cluster(cluster)
            .service_name(service)
            .desired_status(DesiredStatus::Running)
            .into_paginator()
            .send();

        let mut arns = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|error| classify("ListTasks", error))?;
            arns.extend(page.task_arns().iter().cloned());
        }
        Ok(arns)
    }

    async fn describe_tasks(
        &self,
        cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<Task>, ControlPlaneError> {
        let output = self
            .client
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(task_ids.to_vec()))
            .send()
            .await
            .map_err(|error| classify("DescribeTasks", error))?;

        for failure in output.failures() {
            warn!(
                arn = failure.arn().unwrap_or("-"),
                reason = failure.reason().unwrap_or("-"),
                "task could not be described"
            );
        }

        Ok(output.tasks().iter().map(task_from_sdk).collect())
    }

    async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionGrant, ControlPlaneError> {
        let output = self
            .client
            .execute_command()
            .cluster(&request.cluster)
            .task(&request.task_id)
            .container(&request.container)
            .command(&self.context.shell)
            .interactive(true)
            .send()
            .await
            .map_err(|error| classify("ExecuteCommand", error))?;

        let session = output.session().ok_or_else(|| ControlPlaneError::Request {
            operation: "ExecuteCommand",
            source: anyhow::anyhow!("response did not include a session"),
        })?;

        Ok(SessionGrant {
            session_id: required(session.session_id(), "sessionId")?,
            stream_url: required(session.stream_url(), "streamUrl")?,
            token: required(session.token_value(), "tokenValue")?,
        })
    }
}

fn task_from_sdk(task: &aws_sdk_ecs::types::Task) -> Task {
    let id = resource_name(task.task_arn().unwrap_or("-")).to_string();
    let containers = task
        .containers()
        .iter()
        .map(|container| Container {
            name: container.name().unwrap_or("-").to_string(),
            runtime_id: container.runtime_id().map(str::to_string),
            image: container.image().map(str::to_string),
        })
        .collect();

    Task {
        id,
        status: TaskStatus::from_token(task.last_status().unwrap_or("UNKNOWN")),
        created_at: task
            .created_at()
            .and_then(|created| DateTime::from_timestamp(created.secs(), created.subsec_nanos())),
        cpu: task.cpu().map(str::to_string),
        memory: task.memory().map(str::to_string),
        containers,
        exec_enabled: task.enable_execute_command(),
    }
}

fn required(value: Option<&str>, field: &str) -> Result<String, ControlPlaneError> {
    value
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ControlPlaneError::Request {
            operation: "ExecuteCommand",
            source: anyhow::anyhow!("session is missing {field}"),
        })
}

fn classify<E, R>(operation: &'static str, error: SdkError<E, R>) -> ControlPlaneError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if error.code() == Some("AccessDeniedException") {
        return ControlPlaneError::AccessDenied {
            permission: format!("ecs:{operation}"),
            message: error.message().unwrap_or("access denied").to_string(),
        };
    }

    ControlPlaneError::Request {
        operation,
        source: anyhow::anyhow!("{}", DisplayErrorContext(&error)),
    }
}

fn default_endpoint(region: &str) -> String {
    if region.starts_with("cn-") {
        format!("https://ecs.{region}.amazonaws.com.cn")
    } else {
        format!("https://ecs.{region}.amazonaws.com")
    }
}
