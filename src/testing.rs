//! Test doubles for every seam of the pipeline: control plane, key input,
//! rendering, terminal mode and the session broker.

use anyhow::Result;
use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::ecs::ControlPlane;
use crate::error::ControlPlaneError;
use crate::launcher::{
    BrokerInvocation, BrokerProcess, BrokerRuntime, BrokerSignal, InterruptSource,
};
use crate::model::{
    Container, SessionContext, SessionGrant, SessionRequest, Task, TaskStatus, resource_name,
};
use crate::select::{KeySource, Line, RenderSink};
use crate::terminal::TerminalMode;

pub fn running_task(id: &str, containers: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        status: TaskStatus::Running,
        created_at: None,
        cpu: Some("256".to_string()),
        memory: Some("512".to_string()),
        containers: containers
            .iter()
            .map(|name| Container {
                name: name.to_string(),
                runtime_id: Some(format!("{id}-{name}-runtime")),
                image: Some(format!("{name}:latest")),
            })
            .collect(),
        exec_enabled: true,
    }
}

pub fn session_context() -> SessionContext {
    SessionContext {
        profile: "dev".to_string(),
        region: "us-east-1".to_string(),
        endpoint_url: "https://ecs.us-east-1.amazonaws.com".to_string(),
        shell: "sh".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calls {
    pub list_services: usize,
    pub list_tasks: Vec<(String, String)>,
    pub describe_batches: Vec<usize>,
    pub request_session: Vec<SessionRequest>,
}

#[derive(Debug, Clone, Copy)]
enum SessionFailure {
    Denied,
    Transport,
}

#[derive(Default)]
pub struct FakeControlPlane {
    services: Vec<String>,
    task_ids: Option<Vec<String>>,
    tasks: Vec<Task>,
    failing_discovery: bool,
    stalling_services: bool,
    session_failure: Option<SessionFailure>,
    calls: Mutex<Calls>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(mut self, services: Vec<&str>) -> Self {
        self.services = services.into_iter().map(str::to_string).collect();
        self
    }

    /// Ids returned by ListTasks. Defaults to the ids of the described tasks.
    pub fn with_task_ids(mut self, ids: Vec<&str>) -> Self {
        self.task_ids = Some(ids.into_iter().map(str::to_string).collect());
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn failing_discovery(mut self) -> Self {
        self.failing_discovery = true;
        self
    }

    /// ListServices never answers, like a control plane that hangs.
    pub fn stalling_services(mut self) -> Self {
        self.stalling_services = true;
        self
    }

    pub fn denying_sessions(mut self) -> Self {
        self.session_failure = Some(SessionFailure::Denied);
        self
    }

    pub fn failing_sessions(mut self) -> Self {
        self.session_failure = Some(SessionFailure::Transport);
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    fn discovery_failure(&self, operation: &'static str) -> Result<(), ControlPlaneError> {
        if self.failing_discovery {
            return Err(ControlPlaneError::Request {
                operation,
                source: anyhow::anyhow!("connection refused"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list_services(&self, _cluster: &str) -> Result<Vec<String>, ControlPlaneError> {
        self.calls.lock().unwrap().list_services += 1;
        if self.stalling_services {
            std::future::pending::<()>().await;
        }
        self.discovery_failure("ListServices")?;
        Ok(self.services.clone())
    }

    async fn list_tasks(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Vec<String>, ControlPlaneError> {
        self.calls
            .lock()
            .unwrap()
            .list_tasks
            .push((cluster.to_string(), service.to_string()));
        self.discovery_failure("ListTasks")?;
        Ok(self
            .task_ids
            .clone()
            .unwrap_or_else(|| self.tasks.iter().map(|task| task.id.clone()).collect()))
    }

    async fn describe_tasks(
        &self,
        _cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<Task>, ControlPlaneError> {
        self.calls
            .lock()
            .unwrap()
            .describe_batches
            .push(task_ids.len());
        self.discovery_failure("DescribeTasks")?;
        Ok(task_ids
            .iter()
            .filter_map(|id| {
                self.tasks
                    .iter()
                    .find(|task| task.id == resource_name(id))
                    .cloned()
            })
            .collect())
    }

    async fn request_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionGrant, ControlPlaneError> {
        self.calls
            .lock()
            .unwrap()
            .request_session
            .push(request.clone());
        match self.session_failure {
            Some(SessionFailure::Denied) => Err(ControlPlaneError::AccessDenied {
                permission: "ecs:ExecuteCommand".to_string(),
                message: "User is not authorized to perform: ecs:ExecuteCommand".to_string(),
            }),
            Some(SessionFailure::Transport) => Err(ControlPlaneError::Request {
                operation: "ExecuteCommand",
                source: anyhow::anyhow!("connection reset"),
            }),
            None => Ok(SessionGrant {
                session_id: "s-1".to_string(),
                stream_url: "wss://ssmmessages.us-east-1.amazonaws.com/v1/data-channel/s-1"
                    .to_string(),
                token: "tok".to_string(),
            }),
        }
    }
}

pub fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

pub fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

pub fn text(input: &str) -> Vec<KeyEvent> {
    input.chars().map(|c| key(KeyCode::Char(c))).collect()
}

/// Replays a fixed key script, then fails like a closed terminal.
pub struct ScriptedKeys {
    keys: VecDeque<KeyEvent>,
}

impl ScriptedKeys {
    pub fn new(keys: impl IntoIterator<Item = KeyEvent>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn next_key(&mut self) -> Result<KeyEvent> {
        self.keys
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted input exhausted"))
    }
}

#[derive(Debug, Default)]
struct SinkLog {
    frames: Vec<Vec<Line>>,
    notices: Vec<String>,
    clears: usize,
}

#[derive(Clone, Default)]
pub struct CapturingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl CapturingSink {
    pub fn frames(&self) -> Vec<Vec<Line>> {
        self.log.lock().unwrap().frames.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.log.lock().unwrap().notices.clone()
    }

    pub fn clears(&self) -> usize {
        self.log.lock().unwrap().clears
    }
}

impl RenderSink for CapturingSink {
    fn draw(&mut self, lines: &[Line]) -> Result<()> {
        self.log.lock().unwrap().frames.push(lines.to_vec());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.log.lock().unwrap().clears += 1;
        Ok(())
    }

    fn notice(&mut self, text: &str) -> Result<()> {
        self.log.lock().unwrap().notices.push(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TerminalLog {
    raw: bool,
    transitions: Vec<&'static str>,
}

#[derive(Clone, Default)]
pub struct FakeTerminal {
    log: Arc<Mutex<TerminalLog>>,
}

impl FakeTerminal {
    pub fn already_raw() -> Self {
        let terminal = Self::default();
        terminal.log.lock().unwrap().raw = true;
        terminal
    }

    pub fn transitions(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().transitions.clone()
    }

    pub fn is_raw(&self) -> bool {
        self.log.lock().unwrap().raw
    }
}

impl TerminalMode for FakeTerminal {
    fn enter_raw(&mut self) -> Result<bool> {
        let mut log = self.log.lock().unwrap();
        log.transitions.push("raw");
        let was_raw = log.raw;
        log.raw = true;
        Ok(was_raw)
    }

    fn restore(&mut self, was_raw: bool) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.transitions.push("restore");
        log.raw = was_raw;
        Ok(())
    }
}

struct BrokerShared {
    spawns: Mutex<Vec<BrokerInvocation>>,
    forwarded: Mutex<Vec<BrokerSignal>>,
    released: Notify,
    interrupt_tx: UnboundedSender<BrokerSignal>,
    interrupt_rx: Mutex<Option<UnboundedReceiver<BrokerSignal>>>,
}

/// Broker runtime that never launches a real binary.
#[derive(Clone)]
pub struct FakeBrokerRuntime {
    installed: bool,
    exit_code: i32,
    exit_on_signal: bool,
    shared: Arc<BrokerShared>,
}

impl FakeBrokerRuntime {
    pub fn exiting_with(exit_code: i32) -> Self {
        let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
        Self {
            installed: true,
            exit_code,
            exit_on_signal: false,
            shared: Arc::new(BrokerShared {
                spawns: Mutex::new(Vec::new()),
                forwarded: Mutex::new(Vec::new()),
                released: Notify::new(),
                interrupt_tx,
                interrupt_rx: Mutex::new(Some(interrupt_rx)),
            }),
        }
    }

    /// The broker keeps running until a signal is forwarded to it.
    pub fn exiting_on_signal(exit_code: i32) -> Self {
        Self {
            exit_on_signal: true,
            ..Self::exiting_with(exit_code)
        }
    }

    pub fn without_binary(mut self) -> Self {
        self.installed = false;
        self
    }

    pub fn send_interrupt(&self, signal: BrokerSignal) {
        self.shared.interrupt_tx.send(signal).unwrap();
    }

    pub fn spawns(&self) -> Vec<BrokerInvocation> {
        self.shared.spawns.lock().unwrap().clone()
    }

    pub fn forwarded(&self) -> Vec<BrokerSignal> {
        self.shared.forwarded.lock().unwrap().clone()
    }
}

impl BrokerRuntime for FakeBrokerRuntime {
    fn binary(&self) -> &str {
        "session-manager-plugin"
    }

    fn locate(&self) -> Option<PathBuf> {
        self.installed
            .then(|| PathBuf::from("/usr/local/bin/session-manager-plugin"))
    }

    fn spawn(
        &self,
        _program: &Path,
        invocation: &BrokerInvocation,
    ) -> Result<Box<dyn BrokerProcess>> {
        self.shared.spawns.lock().unwrap().push(invocation.clone());
        Ok(Box::new(FakeBrokerProcess {
            exit_code: self.exit_code,
            exit_on_signal: self.exit_on_signal,
            shared: self.shared.clone(),
        }))
    }

    fn interrupts(&self) -> Result<Box<dyn InterruptSource>> {
        let receiver = self
            .shared
            .interrupt_rx
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        Ok(Box::new(ManualInterrupts { receiver }))
    }
}

struct FakeBrokerProcess {
    exit_code: i32,
    exit_on_signal: bool,
    shared: Arc<BrokerShared>,
}

#[async_trait]
impl BrokerProcess for FakeBrokerProcess {
    async fn wait(&mut self) -> Result<i32> {
        if self.exit_on_signal {
            self.shared.released.notified().await;
        }
        Ok(self.exit_code)
    }

    fn signal(&mut self, signal: BrokerSignal) -> Result<()> {
        self.shared.forwarded.lock().unwrap().push(signal);
        self.shared.released.notify_one();
        Ok(())
    }
}

pub struct ManualInterrupts {
    receiver: UnboundedReceiver<BrokerSignal>,
}

impl ManualInterrupts {
    pub fn channel() -> (UnboundedSender<BrokerSignal>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }
}

#[async_trait]
impl InterruptSource for ManualInterrupts {
    async fn recv(&mut self) -> Option<BrokerSignal> {
        self.receiver.recv().await
    }
}
