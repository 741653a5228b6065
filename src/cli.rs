use clap::Parser;

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ecs-shell",
    version,
    about = "Pick an ECS service and task interactively and open a shell in it."
)]
pub struct CliArgs {
    /// AWS profile used for discovery and the exec session
    pub profile: String,

    /// ECS cluster name or ARN
    pub cluster: String,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,
}
