//! sunny-deploy: provisions the container service that hosts the agent.

use anyhow::Context;
use clap::Parser;
use sunny_agent::deploy::aws::AwsControlPlane;
use sunny_agent::deploy::{
    ControlPlane, DEFAULT_REGION, Deployer, LOG_GROUP, REPOSITORY_NAME, forwarded_environment, push_instructions,
};

#[derive(Parser, Debug)]
#[command(name = "sunny-deploy", about = "Deploy the weather agent to ECS Fargate")]
struct Args {
    #[arg(long, default_value = DEFAULT_REGION)]
    region: String,

    /// Image repository name.
    #[arg(long, default_value = REPOSITORY_NAME)]
    repository: String,

    /// Cluster to create the service in. Without it (and a subnet) the
    /// service step is skipped.
    #[arg(long)]
    cluster: Option<String>,

    #[arg(long = "subnet")]
    subnets: Vec<String>,

    #[arg(long = "security-group")]
    security_groups: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sunny_agent=info,sunny_deploy=info".into()),
        )
        .init();

    let args = Args::parse();
    let deployer = Deployer::new(AwsControlPlane::from_env(&args.region).await);
    let environment = forwarded_environment(|name| std::env::var(name).ok());

    tracing::info!(region = %args.region, "Starting AWS deployment");

    let repository_uri = deployer
        .ensure_repository(&args.repository)
        .await
        .context("creating image repository")?;
    println!("{}", push_instructions(&args.repository, &repository_uri, deployer.plane().region()));

    let image = format!("{repository_uri}:latest");
    deployer.ensure_log_group(LOG_GROUP).await.context("creating log group")?;
    let task_definition_arn = deployer
        .register_task_definition(&image, environment)
        .await
        .context("registering task definition")?;

    match args.cluster {
        Some(cluster) if !args.subnets.is_empty() => {
            deployer.ensure_cluster(&cluster).await.context("creating cluster")?;
            let service_arn = deployer
                .create_service(&cluster, &task_definition_arn, args.subnets, args.security_groups)
                .await
                .context("creating service")?;
            println!("Service created: {service_arn}");
        }
        _ => {
            println!(
                "Deployment setup complete. Push the image, then rerun with \
                 --cluster and --subnet to create the service."
            );
        }
    }

    Ok(())
}
