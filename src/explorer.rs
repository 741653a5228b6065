use std::sync::Arc;

use tracing::debug;

use crate::ecs::{ControlPlane, DESCRIBE_TASKS_LIMIT};
use crate::error::ShellError;
use crate::model::{Service, Task, resource_name};

pub struct Explorer {
    control_plane: Arc<dyn ControlPlane>,
}

impl Explorer {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    pub async fn list_services(&self, cluster: &str) -> Result<Vec<Service>, ShellError> {
        let arns = self
            .control_plane
            .list_services(cluster)
            .await
            .map_err(|source| ShellError::Discovery {
                operation: "ListServices",
                source,
            })?;

        let mut names = arns
            .iter()
            .map(|arn| resource_name(arn).to_string())
            .collect::<Vec<_>>();
        names.sort();
        names.dedup();
        debug!(cluster, count = names.len(), "listed services");

        Ok(names
            .into_iter()
            .map(|name| Service {
                name,
                cluster: cluster.to_string(),
            })
            .collect())
    }

    pub async fn list_tasks(&self, cluster: &str, service: &str) -> Result<Vec<String>, ShellError> {
        let arns = self
            .control_plane
            .list_tasks(cluster, service)
            .await
            .map_err(|source| ShellError::Discovery {
                operation: "ListTasks",
                source,
            })?;

        let ids = arns
            .iter()
            .map(|arn| resource_name(arn).to_string())
            .collect::<Vec<_>>();
        debug!(cluster, service, count = ids.len(), "listed tasks");
        Ok(ids)
    }

    pub async fn describe_tasks(
        &self,
        cluster: &str,
        task_ids: &[String],
    ) -> Result<Vec<Task>, ShellError> {
        let mut tasks = Vec::with_capacity(task_ids.len());
        for batch in task_ids.chunks(DESCRIBE_TASKS_LIMIT) {
            let described = self
                .control_plane
                .describe_tasks(cluster, batch)
                .await
                .map_err(|source| ShellError::Discovery {
                    operation: "DescribeTasks",
                    source,
                })?;
            tasks.extend(described);
        }
        debug!(
            cluster,
            requested = task_ids.len(),
            described = tasks.len(),
            "described tasks"
        );
        Ok(tasks)
    }
}
