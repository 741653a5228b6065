use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ecs::ControlPlane;
use crate::error::ShellError;
use crate::model::{SessionContext, SessionGrant, SessionRequest, Task, resource_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerSignal {
    Interrupt,
    Terminate,
}

#[async_trait]
pub trait BrokerProcess: Send {
    async fn wait(&mut self) -> Result<i32>;

    fn signal(&mut self, signal: BrokerSignal) -> Result<()>;
}

#[async_trait]
pub trait InterruptSource: Send {
    async fn recv(&mut self) -> Option<BrokerSignal>;
}

pub trait BrokerRuntime: Send + Sync {
    fn binary(&self) -> &str;

    fn locate(&self) -> Option<PathBuf>;

    fn spawn(&self, program: &Path, invocation: &BrokerInvocation)
    -> Result<Box<dyn BrokerProcess>>;

    /// Starts intercepting interrupts. Only called once a session exists.
    fn interrupts(&self) -> Result<Box<dyn InterruptSource>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload<'a> {
    session_id: &'a str,
    stream_url: &'a str,
    token_value: &'a str,
}

#[derive(Serialize)]
struct TargetPayload {
    #[serde(rename = "Target")]
    target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInvocation {
    pub args: Vec<String>,
}

impl BrokerInvocation {
    pub fn new(
        grant: &SessionGrant,
        context: &SessionContext,
        request: &SessionRequest,
        runtime_id: &str,
    ) -> Result<Self, serde_json::Error> {
        let session = serde_json::to_string(&SessionPayload {
            session_id: &grant.session_id,
            stream_url: &grant.stream_url,
            token_value: &grant.token,
        })?;
        let target = serde_json::to_string(&TargetPayload {
            target: format!(
                "ecs:{}_{}_{}",
                resource_name(&request.cluster),
                request.task_id,
                runtime_id
            ),
        })?;

        Ok(Self {
            args: vec![
                session,
                context.region.clone(),
                "StartSession".to_string(),
                context.profile.clone(),
                target,
                context.endpoint_url.clone(),
            ],
        })
    }
}

pub struct SessionHandle {
    grant: SessionGrant,
    process: Box<dyn BrokerProcess>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.grant.session_id
    }

    pub fn stream_url(&self) -> &str {
        &self.grant.stream_url
    }

    pub async fn supervise(mut self, interrupts: &mut dyn InterruptSource) -> Result<i32> {
        let mut listening = true;
        loop {
            tokio::select! {
                status = self.process.wait() => return status,
                signal = interrupts.recv(), if listening => match signal {
                    Some(signal) => {
                        debug!(?signal, session_id = %self.grant.session_id, "forwarding signal to broker");
                        if let Err(error) = self.process.signal(signal) {
                            warn!("failed to forward {signal:?} to broker: {error:#}");
                        }
                    }
                    None => listening = false,
                },
            }
        }
    }
}

pub struct Launcher {
    control_plane: Arc<dyn ControlPlane>,
    runtime: Box<dyn BrokerRuntime>,
    context: SessionContext,
}

impl Launcher {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        runtime: Box<dyn BrokerRuntime>,
        context: SessionContext,
    ) -> Self {
        Self {
            control_plane,
            runtime,
            context,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Opens a shell in `container` and returns the broker's exit code unchanged.
    /// The session request is made exactly once per call.
    pub async fn connect(
        &self,
        cluster: &str,
        task: &Task,
        container: &str,
    ) -> Result<i32, ShellError> {
        if !task.is_connectable() {
            let reason = if task.exec_enabled {
                format!("status is {}", task.status)
            } else {
                "execute command is disabled".to_string()
            };
            return Err(ShellError::ExecNotEnabled {
                task_id: task.id.clone(),
                reason,
            });
        }

        let runtime_id = task
            .container(container)
            .and_then(|found| found.runtime_id.clone())
            .ok_or_else(|| ShellError::ContainerUnavailable {
                task_id: task.id.clone(),
                container: container.to_string(),
            })?;

        let request = SessionRequest::new(cluster, &task.id, container);
        let grant = self.control_plane.request_session(&request).await?;
        info!(session_id = %grant.session_id, task = %task.id, container, "session granted");

        let program = self
            .runtime
            .locate()
            .ok_or_else(|| ShellError::BrokerNotFound {
                binary: self.runtime.binary().to_string(),
            })?;

        let invocation = BrokerInvocation::new(&grant, &self.context, &request, &runtime_id)
            .map_err(|error| broker_error(error.into()))?;
        let mut interrupts = self.runtime.interrupts().map_err(broker_error)?;
        let process = self
            .runtime
            .spawn(&program, &invocation)
            .map_err(broker_error)?;
        debug!(program = %program.display(), "broker started");

        let handle = SessionHandle { grant, process };
        debug!(
            session_id = handle.session_id(),
            stream_url = handle.stream_url(),
            "supervising session"
        );
        let code = handle
            .supervise(interrupts.as_mut())
            .await
            .map_err(broker_error)?;
        info!(code, "session ended");
        Ok(code)
    }
}

fn broker_error(source: anyhow::Error) -> ShellError {
    ShellError::Broker { source }
}
