//! One-shot provisioning of the container service that hosts the agent.
//!
//! Every `ensure_*` step is create-or-get: a resource that already exists
//! resolves to its identifier instead of failing. There is no rollback.

pub mod aws;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{FORWARDED_VARIABLES, OPTIONAL_FORWARDED_VARIABLES};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const REPOSITORY_NAME: &str = "weather-agent";
pub const LOG_GROUP: &str = "/ecs/weather-agent";
pub const TASK_FAMILY: &str = "weather-agent";
pub const CONTAINER_NAME: &str = "weather-agent";
pub const SERVICE_NAME: &str = "weather-agent-service";
pub const CONTAINER_PORT: i32 = 8080;
pub const TASK_CPU: &str = "256";
pub const TASK_MEMORY: &str = "512";
pub const LOG_STREAM_PREFIX: &str = "ecs";
pub const DESIRED_COUNT: i32 = 1;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{operation} failed: {message}")]
    Api { operation: &'static str, message: String },

    #[error("{operation} response is missing {field}")]
    MissingField { operation: &'static str, field: &'static str },
}

pub type DeployResult<T> = std::result::Result<T, DeployError>;

/// Result of a create call on a resource that may already exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(String),
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub group: String,
    pub region: String,
    pub stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub environment: Vec<(String, String)>,
    pub port: i32,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionSpec {
    pub family: String,
    pub cpu: String,
    pub memory: String,
    pub execution_role_arn: String,
    pub container: ContainerSpec,
}

impl TaskDefinitionSpec {
    /// The Fargate task that runs the agent image.
    #[must_use]
    pub fn weather_agent(image: &str, environment: Vec<(String, String)>, account_id: &str, region: &str) -> Self {
        Self {
            family: TASK_FAMILY.to_string(),
            cpu: TASK_CPU.to_string(),
            memory: TASK_MEMORY.to_string(),
            execution_role_arn: format!("arn:aws:iam::{account_id}:role/ecsTaskExecutionRole"),
            container: ContainerSpec {
                name: CONTAINER_NAME.to_string(),
                image: image.to_string(),
                environment,
                port: CONTAINER_PORT,
                log: LogSettings {
                    group: LOG_GROUP.to_string(),
                    region: region.to_string(),
                    stream_prefix: LOG_STREAM_PREFIX.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub cluster: String,
    pub name: String,
    pub task_definition_arn: String,
    pub desired_count: i32,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// The control-plane calls provisioning needs.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    fn region(&self) -> &str;
    async fn account_id(&self) -> DeployResult<String>;
    async fn create_repository(&self, name: &str) -> DeployResult<CreateOutcome>;
    async fn describe_repository(&self, name: &str) -> DeployResult<String>;
    async fn create_log_group(&self, name: &str) -> DeployResult<CreateOutcome>;
    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> DeployResult<String>;
    async fn create_cluster(&self, name: &str) -> DeployResult<CreateOutcome>;
    async fn describe_cluster(&self, name: &str) -> DeployResult<String>;
    async fn create_service(&self, spec: &ServiceSpec) -> DeployResult<String>;
}

#[derive(Debug)]
pub struct Deployer<P> {
    plane: P,
}

impl<P: ControlPlane> Deployer<P> {
    pub const fn new(plane: P) -> Self {
        Self { plane }
    }

    pub const fn plane(&self) -> &P {
        &self.plane
    }

    /// Create the image repository (scan on push) or look up the existing one.
    ///
    /// # Errors
    /// Returns an error if the control plane rejects the call.
    pub async fn ensure_repository(&self, name: &str) -> DeployResult<String> {
        let uri = match self.plane.create_repository(name).await? {
            CreateOutcome::Created(uri) => uri,
            CreateOutcome::AlreadyExists => {
                tracing::info!(repository = name, "Repository already exists");
                self.plane.describe_repository(name).await?
            }
        };
        tracing::info!(repository = name, %uri, "Repository ready");
        Ok(uri)
    }

    /// # Errors
    /// Returns an error if the control plane rejects the call.
    pub async fn ensure_log_group(&self, name: &str) -> DeployResult<String> {
        if self.plane.create_log_group(name).await? == CreateOutcome::AlreadyExists {
            tracing::info!(log_group = name, "Log group already exists");
        }
        Ok(name.to_string())
    }

    /// Register the agent task definition for `image`, returning its ARN.
    ///
    /// # Errors
    /// Returns an error if the account lookup or registration fails.
    pub async fn register_task_definition(
        &self,
        image: &str,
        environment: Vec<(String, String)>,
    ) -> DeployResult<String> {
        let account_id = self.plane.account_id().await?;
        let spec = TaskDefinitionSpec::weather_agent(image, environment, &account_id, self.plane.region());
        let arn = self.plane.register_task_definition(&spec).await?;
        tracing::info!(family = %spec.family, %arn, "Task definition registered");
        Ok(arn)
    }

    /// # Errors
    /// Returns an error if the control plane rejects the call.
    pub async fn ensure_cluster(&self, name: &str) -> DeployResult<String> {
        let arn = match self.plane.create_cluster(name).await? {
            CreateOutcome::Created(arn) => arn,
            CreateOutcome::AlreadyExists => self.plane.describe_cluster(name).await?,
        };
        tracing::info!(cluster = name, %arn, "Cluster ready");
        Ok(arn)
    }

    /// Create the agent service: one Fargate task with a public IP.
    ///
    /// # Errors
    /// Returns an error if the control plane rejects the call.
    pub async fn create_service(
        &self,
        cluster: &str,
        task_definition_arn: &str,
        subnets: Vec<String>,
        security_groups: Vec<String>,
    ) -> DeployResult<String> {
        let spec = ServiceSpec {
            cluster: cluster.to_string(),
            name: SERVICE_NAME.to_string(),
            task_definition_arn: task_definition_arn.to_string(),
            desired_count: DESIRED_COUNT,
            subnets,
            security_groups,
            assign_public_ip: true,
        };
        let arn = self.plane.create_service(&spec).await?;
        tracing::info!(service = %spec.name, %arn, "Service created");
        Ok(arn)
    }
}

/// The agent's variables as passed to the task.
///
/// Required ones are always present, empty when unset. Optional tuning
/// variables appear only with a non-blank value.
#[must_use]
pub fn forwarded_environment(lookup: impl Fn(&str) -> Option<String>) -> Vec<(String, String)> {
    let required = FORWARDED_VARIABLES
        .iter()
        .map(|name| ((*name).to_string(), lookup(name).unwrap_or_default()));
    let optional = OPTIONAL_FORWARDED_VARIABLES.iter().filter_map(|name| {
        lookup(name)
            .filter(|value| !value.trim().is_empty())
            .map(|value| ((*name).to_string(), value))
    });
    required.chain(optional).collect()
}

/// Manual steps to build the `repository` image and push it to `repository_uri`.
#[must_use]
pub fn push_instructions(repository: &str, repository_uri: &str, region: &str) -> String {
    format!(
        "Next steps (run these commands locally):\n\
         \n\
         1. Build and tag the Docker image:\n\
         \x20  docker build -t {repository} .\n\
         \x20  docker tag {repository}:latest {repository_uri}:latest\n\
         \n\
         2. Login to ECR and push:\n\
         \x20  aws ecr get-login-password --region {region} | docker login --username AWS --password-stdin {repository_uri}\n\
         \x20  docker push {repository_uri}:latest\n"
    )
}
