use anyhow::{Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command as TokioCommand};
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};

use crate::launcher::{BrokerInvocation, BrokerProcess, BrokerRuntime, BrokerSignal, InterruptSource};

pub const DEFAULT_BROKER_BINARY: &str = "session-manager-plugin";

pub struct SessionManagerPlugin {
    binary: String,
}

impl SessionManagerPlugin {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl BrokerRuntime for SessionManagerPlugin {
    fn binary(&self) -> &str {
        &self.binary
    }

    fn locate(&self) -> Option<PathBuf> {
        which::which(&self.binary).ok()
    }

    fn spawn(
        &self,
        program: &Path,
        invocation: &BrokerInvocation,
    ) -> Result<Box<dyn BrokerProcess>> {
        let child = TokioCommand::new(program)
            .args(&invocation.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn {}", program.display()))?;
        Ok(Box::new(PluginProcess { child }))
    }

    fn interrupts(&self) -> Result<Box<dyn InterruptSource>> {
        Ok(Box::new(SignalInterrupts::install()?))
    }
}

pub struct PluginProcess {
    child: Child,
}

#[async_trait]
impl BrokerProcess for PluginProcess {
    async fn wait(&mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .await
            .context("failed to wait for session broker")?;
        Ok(exit_code(status))
    }

    fn signal(&mut self, signal: BrokerSignal) -> Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).context("broker pid out of range")?;
        let signal = match signal {
            BrokerSignal::Interrupt => Signal::SIGINT,
            BrokerSignal::Terminate => Signal::SIGTERM,
        };
        kill(Pid::from_raw(pid), signal).with_context(|| format!("failed to send {signal:?} to broker"))
    }
}

/// SIGINT/SIGTERM intercepted for this process. Once installed the default
/// "terminate" disposition no longer applies.
pub struct SignalInterrupts {
    interrupt: SignalStream,
    terminate: SignalStream,
}

impl SignalInterrupts {
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?,
        })
    }
}

#[async_trait]
impl InterruptSource for SignalInterrupts {
    async fn recv(&mut self) -> Option<BrokerSignal> {
        tokio::select! {
            received = self.interrupt.recv() => received.map(|()| BrokerSignal::Interrupt),
            received = self.terminate.recv() => received.map(|()| BrokerSignal::Terminate),
        }
    }
}

/// Exit code as a shell reports it: signals become `128 + signo`.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signo| 128 + signo))
        .unwrap_or(1)
}
