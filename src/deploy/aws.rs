use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecr::error::DisplayErrorContext;
use aws_sdk_ecr::types::ImageScanningConfiguration;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, Compatibility, ContainerDefinition, KeyValuePair, LaunchType,
    LogConfiguration, LogDriver, NetworkConfiguration, NetworkMode, PortMapping, TransportProtocol,
};

use super::{ControlPlane, CreateOutcome, DeployError, DeployResult, ServiceSpec, TaskDefinitionSpec};

/// ECR, ECS, CloudWatch Logs and STS clients for one region.
#[derive(Debug, Clone)]
pub struct AwsControlPlane {
    region: String,
    ecr: aws_sdk_ecr::Client,
    ecs: aws_sdk_ecs::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsControlPlane {
    /// Load credentials from the default provider chain.
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            region: region.to_string(),
            ecr: aws_sdk_ecr::Client::new(&config),
            ecs: aws_sdk_ecs::Client::new(&config),
            logs: aws_sdk_cloudwatchlogs::Client::new(&config),
            sts: aws_sdk_sts::Client::new(&config),
        }
    }
}

fn api_error<E: std::error::Error>(operation: &'static str, err: E) -> DeployError {
    DeployError::Api { operation, message: DisplayErrorContext(err).to_string() }
}

const fn missing(operation: &'static str, field: &'static str) -> DeployError {
    DeployError::MissingField { operation, field }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    fn region(&self) -> &str {
        &self.region
    }

    async fn account_id(&self) -> DeployResult<String> {
        let out = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| api_error("GetCallerIdentity", e))?;
        out.account()
            .map(str::to_string)
            .ok_or_else(|| missing("GetCallerIdentity", "account"))
    }

    async fn create_repository(&self, name: &str) -> DeployResult<CreateOutcome> {
        let scanning = ImageScanningConfiguration::builder().scan_on_push(true).build();
        match self
            .ecr
            .create_repository()
            .repository_name(name)
            .image_scanning_configuration(scanning)
            .send()
            .await
        {
            Ok(out) => out
                .repository()
                .and_then(|repo| repo.repository_uri())
                .map(|uri| CreateOutcome::Created(uri.to_string()))
                .ok_or_else(|| missing("CreateRepository", "repositoryUri")),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_repository_already_exists_exception() {
                    Ok(CreateOutcome::AlreadyExists)
                } else {
                    Err(api_error("CreateRepository", err))
                }
            }
        }
    }

    async fn describe_repository(&self, name: &str) -> DeployResult<String> {
        let out = self
            .ecr
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
            .map_err(|e| api_error("DescribeRepositories", e))?;
        out.repositories()
            .first()
            .and_then(|repo| repo.repository_uri())
            .map(str::to_string)
            .ok_or_else(|| missing("DescribeRepositories", "repositoryUri"))
    }

    async fn create_log_group(&self, name: &str) -> DeployResult<CreateOutcome> {
        match self.logs.create_log_group().log_group_name(name).send().await {
            Ok(_) => Ok(CreateOutcome::Created(name.to_string())),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_resource_already_exists_exception() {
                    Ok(CreateOutcome::AlreadyExists)
                } else {
                    Err(api_error("CreateLogGroup", err))
                }
            }
        }
    }

    async fn register_task_definition(&self, spec: &TaskDefinitionSpec) -> DeployResult<String> {
        const OPERATION: &str = "RegisterTaskDefinition";
        let container = &spec.container;

        let environment = container
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair::builder().name(name).value(value).build())
            .collect();
        let logging = LogConfiguration::builder()
            .log_driver(LogDriver::Awslogs)
            .options("awslogs-group", &container.log.group)
            .options("awslogs-region", &container.log.region)
            .options("awslogs-stream-prefix", &container.log.stream_prefix)
            .build()
            .map_err(|e| api_error(OPERATION, e))?;
        let port = PortMapping::builder()
            .container_port(container.port)
            .protocol(TransportProtocol::Tcp)
            .build();
        let definition = ContainerDefinition::builder()
            .name(&container.name)
            .image(&container.image)
            .essential(true)
            .set_environment(Some(environment))
            .port_mappings(port)
            .log_configuration(logging)
            .build();

        let out = self
            .ecs
            .register_task_definition()
            .family(&spec.family)
            .network_mode(NetworkMode::Awsvpc)
            .requires_compatibilities(Compatibility::Fargate)
            .cpu(&spec.cpu)
            .memory(&spec.memory)
            .execution_role_arn(&spec.execution_role_arn)
            .container_definitions(definition)
            .send()
            .await
            .map_err(|e| api_error(OPERATION, e))?;
        out.task_definition()
            .and_then(|def| def.task_definition_arn())
            .map(str::to_string)
            .ok_or_else(|| missing(OPERATION, "taskDefinitionArn"))
    }

    // CreateCluster returns the existing cluster when the name is taken.
    async fn create_cluster(&self, name: &str) -> DeployResult<CreateOutcome> {
        let out = self
            .ecs
            .create_cluster()
            .cluster_name(name)
            .send()
            .await
            .map_err(|e| api_error("CreateCluster", e))?;
        out.cluster()
            .and_then(|cluster| cluster.cluster_arn())
            .map(|arn| CreateOutcome::Created(arn.to_string()))
            .ok_or_else(|| missing("CreateCluster", "clusterArn"))
    }

    async fn describe_cluster(&self, name: &str) -> DeployResult<String> {
        let out = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| api_error("DescribeClusters", e))?;
        out.clusters()
            .first()
            .and_then(|cluster| cluster.cluster_arn())
            .map(str::to_string)
            .ok_or_else(|| missing("DescribeClusters", "clusterArn"))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> DeployResult<String> {
        const OPERATION: &str = "CreateService";
        let public_ip = if spec.assign_public_ip { AssignPublicIp::Enabled } else { AssignPublicIp::Disabled };
        let vpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(spec.subnets.clone()))
            .set_security_groups(Some(spec.security_groups.clone()))
            .assign_public_ip(public_ip)
            .build()
            .map_err(|e| api_error(OPERATION, e))?;
        let network = NetworkConfiguration::builder().awsvpc_configuration(vpc).build();

        let out = self
            .ecs
            .create_service()
            .cluster(&spec.cluster)
            .service_name(&spec.name)
            .task_definition(&spec.task_definition_arn)
            .desired_count(spec.desired_count)
            .launch_type(LaunchType::Fargate)
            .network_configuration(network)
            .send()
            .await
            .map_err(|e| api_error(OPERATION, e))?;
        out.service()
            .and_then(|service| service.service_arn())
            .map(str::to_string)
            .ok_or_else(|| missing(OPERATION, "serviceArn"))
    }
}
