use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("access denied (missing {permission}): {message}")]
    AccessDenied { permission: String, message: String },

    #[error("{operation} request failed")]
    Request {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{operation} failed")]
    Discovery {
        operation: &'static str,
        #[source]
        source: ControlPlaneError,
    },

    #[error("not authorized to open a session: {message} (grant the `{permission}` permission)")]
    Authorization { permission: String, message: String },

    #[error(
        "task {task_id} does not accept exec sessions ({reason}); enable execute command on the service and redeploy the task"
    )]
    ExecNotEnabled { task_id: String, reason: String },

    #[error("container {container} in task {task_id} is not available for a session")]
    ContainerUnavailable { task_id: String, container: String },

    #[error(
        "session broker `{binary}` was not found; install the Session Manager plugin for the AWS CLI and make sure it is on PATH"
    )]
    BrokerNotFound { binary: String },

    #[error("session broker failed")]
    Broker {
        #[source]
        source: anyhow::Error,
    },

    #[error("terminal interaction failed")]
    Terminal {
        #[source]
        source: anyhow::Error,
    },

    #[error("setup failed")]
    Config {
        #[source]
        source: anyhow::Error,
    },
}

impl ShellError {
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// True when the failure looks like expired or missing credentials.
    pub fn is_credential_failure(&self) -> bool {
        let source = match self {
            Self::Discovery { source, .. } => source,
            _ => return false,
        };
        let ControlPlaneError::Request { source, .. } = source else {
            return false;
        };
        source.chain().any(|cause| {
            let text = cause.to_string().to_ascii_lowercase();
            text.contains("credentials") || (text.contains("token") && text.contains("expired"))
        })
    }
}

impl From<ControlPlaneError> for ShellError {
    fn from(error: ControlPlaneError) -> Self {
        match error {
            ControlPlaneError::AccessDenied {
                permission,
                message,
            } => Self::Authorization {
                permission,
                message,
            },
            other => Self::Discovery {
                operation: "ExecuteCommand",
                source: other,
            },
        }
    }
}
