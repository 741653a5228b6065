use std::future::Future;
use tracing::{debug, info};

use crate::error::ShellError;
use crate::explorer::Explorer;
use crate::launcher::{InterruptSource, Launcher};
use crate::model::{Container, SessionRequest, Task};
use crate::select::{Selection, Selector};
use crate::ui;

/// Exit code reported when the user backs out of a prompt.
pub const CANCELLED_EXIT_CODE: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    ServicesLoaded,
    ServiceSelected,
    TasksLoaded,
    TaskSelected,
    SessionActive,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NothingToDo,
    Cancelled,
    Session(i32),
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::NothingToDo => 0,
            Self::Cancelled => CANCELLED_EXIT_CODE,
            Self::Session(code) => (code & 0xff) as u8,
        }
    }
}

pub struct Orchestrator {
    explorer: Explorer,
    selector: Selector,
    launcher: Launcher,
    interrupts: Box<dyn InterruptSource>,
    phase: Phase,
}

impl Orchestrator {
    /// `interrupts` cancels the run while a discovery call is in flight.
    pub fn new(
        explorer: Explorer,
        selector: Selector,
        launcher: Launcher,
        interrupts: Box<dyn InterruptSource>,
    ) -> Self {
        Self {
            explorer,
            selector,
            launcher,
            interrupts,
            phase: Phase::Start,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run(&mut self, cluster: &str) -> Result<Outcome, ShellError> {
        self.enter(Phase::Start);
        let profile = self.launcher.context().profile.clone();
        for line in ui::header_lines(&profile, cluster) {
            self.selector.notice(&line)?;
        }

        self.selector.notice("Fetching services...")?;
        let fetched = interruptible(
            self.interrupts.as_mut(),
            self.explorer.list_services(cluster),
        )
        .await?;
        let Some(services) = fetched else {
            return self.cancelled();
        };
        if services.is_empty() {
            self.selector
                .notice(&format!("No services found in cluster '{cluster}'"))?;
            return Ok(self.finish(Outcome::NothingToDo));
        }
        self.enter(Phase::ServicesLoaded);

        let service = match self
            .selector
            .prompt("Select a service", &services, |service| service.name.clone())?
        {
            Selection::Confirmed(service) => service,
            Selection::Cancelled => return self.cancelled(),
        };
        self.enter(Phase::ServiceSelected);
        self.selector
            .notice(&format!("✓ Selected service: {}", service.name))?;

        self.selector
            .notice(&format!("Fetching tasks for {}...", service.name))?;
        let fetched = interruptible(
            self.interrupts.as_mut(),
            self.explorer.list_tasks(cluster, &service.name),
        )
        .await?;
        let Some(task_ids) = fetched else {
            return self.cancelled();
        };

        let tasks = if task_ids.is_empty() {
            Vec::new()
        } else {
            self.selector.notice("Getting task details...")?;
            let fetched = interruptible(
                self.interrupts.as_mut(),
                self.explorer.describe_tasks(cluster, &task_ids),
            )
            .await?;
            match fetched {
                Some(tasks) => tasks,
                None => return self.cancelled(),
            }
        };
        self.enter(Phase::TasksLoaded);

        let eligible = tasks
            .iter()
            .filter(|task| task.is_connectable())
            .collect::<Vec<_>>();
        if eligible.is_empty() {
            self.selector.notice(&format!(
                "No running tasks found for service '{}'",
                service.name
            ))?;
            let hidden = tasks.len();
            if hidden > 0 {
                self.selector.notice(&format!(
                    "{hidden} task(s) hidden: not running or execute command disabled (enable it on the service and redeploy)"
                ))?;
            }
            return Ok(self.finish(Outcome::NothingToDo));
        }

        let task: &Task = match self
            .selector
            .prompt("Select a task", &eligible, |task| task.display_label())?
        {
            Selection::Confirmed(task) => *task,
            Selection::Cancelled => return self.cancelled(),
        };
        self.enter(Phase::TaskSelected);
        self.selector
            .notice(&format!("✓ Selected task: {}", task.id))?;
        debug!(task = %task.id, resources = %task.resources_label(), "task selected");

        let container = match self.choose_container(task)? {
            Selection::Confirmed(container) => container,
            Selection::Cancelled => return self.cancelled(),
        };

        let request = SessionRequest::new(cluster, &task.id, container.name.as_str());
        for line in ui::connection_lines(self.launcher.context(), &request) {
            self.selector.notice(&line)?;
        }

        self.enter(Phase::SessionActive);
        let code = self
            .launcher
            .connect(cluster, task, &container.name)
            .await?;
        Ok(self.finish(Outcome::Session(code)))
    }

    fn choose_container<'t>(
        &mut self,
        task: &'t Task,
    ) -> Result<Selection<&'t Container>, ShellError> {
        match task.containers.as_slice() {
            [] => Err(ShellError::ContainerUnavailable {
                task_id: task.id.clone(),
                container: "-".to_string(),
            }),
            [only] => Ok(Selection::Confirmed(only)),
            containers => self.selector.prompt("Select a container", containers, |container| {
                match container.image.as_deref() {
                    Some(image) => format!("{} ({image})", container.name),
                    None => container.name.clone(),
                }
            }),
        }
    }

    fn cancelled(&mut self) -> Result<Outcome, ShellError> {
        self.selector.notice("Goodbye!")?;
        Ok(self.finish(Outcome::Cancelled))
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        self.enter(Phase::Done);
        info!(?outcome, "finished");
        outcome
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }
}

/// Runs `work` to completion unless an interrupt arrives first, in which case
/// the work is dropped and `None` is returned.
async fn interruptible<T>(
    interrupts: &mut dyn InterruptSource,
    work: impl Future<Output = Result<T, ShellError>>,
) -> Result<Option<T>, ShellError> {
    tokio::pin!(work);
    let mut listening = true;
    loop {
        tokio::select! {
            result = &mut work => return result.map(Some),
            signal = interrupts.recv(), if listening => match signal {
                Some(signal) => {
                    debug!(?signal, "discovery interrupted");
                    return Ok(None);
                }
                None => listening = false,
            },
        }
    }
}
