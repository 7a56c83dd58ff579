//! chaosctl: connect chaos infrastructure agents to Kubernetes clusters

use chaos_rs::{ChaosConfig, ChaosError, Credentials, GraphqlRegistry, KubeCluster, Kubectl};
use chaosctl_core::{
    CapabilityProber, InstallationScope, Platform, PromptField, Prompter, ProvisionRequest,
    ProvisionSettings, ProvisioningOrchestrator,
};
use chaosctl_term::{HeadlessPrompter, TermPrompter, render_failure, render_outcome, render_report};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use std::fs::File;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};

/// chaosctl: connect chaos infrastructures to Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "chaosctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the account config file (default: ~/.chaosconfig)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log file path (default: <temp_dir>/chaosctl.log)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a chaos infrastructure and install its agent
    Connect(ConnectArgs),
    /// Check whether the current identity may install an agent
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct KubeArgs {
    /// Path to the kubeconfig of the target cluster
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long)]
    kube_context: Option<String>,
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Project to register the chaos infrastructure in
    #[arg(long)]
    project_id: Option<String>,

    /// Chaos infrastructure name
    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "")]
    description: String,

    /// cluster or namespace
    #[arg(long, default_value = "cluster")]
    installation_mode: InstallationScope,

    /// Namespace to install into (default: litmus)
    #[arg(long)]
    namespace: Option<String>,

    /// Service account for the agent (default: litmus)
    #[arg(long)]
    service_account: Option<String>,

    /// AWS, GKE, Azure, Openshift, Rancher or Others (detected when omitted)
    #[arg(long)]
    platform: Option<Platform>,

    #[arg(long)]
    environment_id: Option<String>,

    /// Node selector for the agent pods, e.g. pool=chaos
    #[arg(long)]
    node_selector: Option<String>,

    /// Skip TLS verification towards the control plane
    #[arg(long)]
    skip_ssl: bool,

    /// Take every answer from flags instead of prompting
    #[arg(long)]
    non_interactive: bool,

    /// Confirm the plan without asking
    #[arg(short, long)]
    yes: bool,

    /// Give up after this many answers to one prompt
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds to wait for the agent pod to run
    #[arg(long, default_value = "300")]
    rollout_timeout: u64,

    /// Leave registration and cluster changes in place on failure
    #[arg(long)]
    keep_on_failure: bool,

    /// Control plane endpoint (overrides the config file)
    #[arg(long)]
    endpoint: Option<String>,

    /// Access token (overrides the config file)
    #[arg(long)]
    token: Option<String>,

    #[command(flatten)]
    kube: KubeArgs,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// cluster or namespace
    #[arg(long, default_value = "cluster")]
    installation_mode: InstallationScope,

    /// Namespace checked in namespace mode
    #[arg(long, default_value = chaosctl_core::settings::DEFAULT_NAMESPACE)]
    namespace: String,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    kube: KubeArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;

    // Log to a file so log lines never mix with prompts
    let log_path = resolve_log_path(cli.log_file);
    let log_file = File::create(&log_path)?;

    let filter = if cli.debug {
        EnvFilter::from_default_env()
            .add_directive(Level::DEBUG.into())
            .add_directive("h2=info".parse()?)
            .add_directive("hyper=info".parse()?)
            .add_directive("tower=info".parse()?)
            .add_directive("rustls=info".parse()?)
            .add_directive("kube_client=info".parse()?)
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(false),
        )
        .with(filter)
        .init();

    tracing::info!("Starting chaosctl");

    let succeeded = match cli.command {
        Command::Connect(args) => connect(cli.config.as_deref(), args).await?,
        Command::Check(args) => check(args).await?,
    };

    tracing::info!(succeeded, "Done");
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn connect(config_path: Option<&str>, args: ConnectArgs) -> Result<bool> {
    let credentials = resolve_credentials(
        config_path.map(Path::new),
        args.endpoint.as_deref(),
        args.token.as_deref(),
    )?;
    tracing::info!(endpoint = %credentials.endpoint, user = %credentials.username, "Using account");

    let cluster = KubeCluster::connect(
        args.kube.kubeconfig.as_deref(),
        args.kube.kube_context.as_deref(),
    )
    .await
    .wrap_err("could not connect to the Kubernetes cluster")?;
    let registry = GraphqlRegistry::new(&credentials.endpoint, &credentials.token, args.skip_ssl)?;
    let applier = Kubectl::new(
        &credentials.endpoint,
        args.kube.kubeconfig.clone(),
        args.kube.kube_context.clone(),
    );

    let interactive = !args.non_interactive && std::io::stdin().is_terminal();
    let mut prompter: Box<dyn Prompter> = if interactive {
        Box::new(TermPrompter::new())
    } else {
        Box::new(
            HeadlessPrompter::new(args.yes)
                .preset(PromptField::ProjectId, args.project_id.as_deref())
                .preset(PromptField::InfraName, args.name.as_deref())
                .preset(PromptField::Namespace, args.namespace.as_deref())
                .preset(PromptField::ServiceAccount, args.service_account.as_deref()),
        )
    };

    let settings = ProvisionSettings {
        max_attempts: args.max_attempts,
        rollout_timeout: Duration::from_secs(args.rollout_timeout),
        compensate_on_failure: !args.keep_on_failure,
        ..Default::default()
    };
    let request = ProvisionRequest {
        project_id: args.project_id.unwrap_or_default(),
        scope: args.installation_mode,
        name: args.name.unwrap_or_default(),
        description: args.description,
        namespace: args.namespace.unwrap_or_default(),
        service_account: args.service_account.unwrap_or_default(),
        platform: args.platform,
        environment_id: args.environment_id,
        node_selector: args.node_selector,
        skip_ssl: args.skip_ssl,
    };

    let mut orchestrator = ProvisioningOrchestrator::new(&cluster, &registry, &applier, settings);
    match orchestrator
        .run(prompter.as_mut(), request, ctrl_c())
        .await
    {
        Ok(outcome) => {
            print!("{}", render_outcome(&outcome));
            Ok(true)
        }
        Err(failure) => {
            eprint!("{}", render_failure(&failure));
            Ok(false)
        }
    }
}

async fn check(args: CheckArgs) -> Result<bool> {
    let cluster = KubeCluster::connect(
        args.kube.kubeconfig.as_deref(),
        args.kube.kube_context.as_deref(),
    )
    .await
    .wrap_err("could not connect to the Kubernetes cluster")?;

    let report = CapabilityProber::new(&cluster)
        .probe(args.installation_mode, &args.namespace)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(report.sufficient())
}

/// Resolves once Ctrl-C is pressed. The handler is only installed when the
/// future is first polled, so prompts keep the default interrupt behaviour.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received"),
        Err(e) => {
            tracing::warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Credentials from flags, falling back to the account config file
fn resolve_credentials(
    config_path: Option<&Path>,
    endpoint: Option<&str>,
    token: Option<&str>,
) -> std::result::Result<Credentials, ChaosError> {
    let mut credentials = match (endpoint, token) {
        (Some(endpoint), Some(token)) => Credentials {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: String::new(),
            token: token.to_string(),
            expires_at: None,
        },
        _ => ChaosConfig::load(config_path)?.current_credentials()?,
    };

    if let Some(endpoint) = endpoint {
        credentials.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if let Some(token) = token {
        credentials.token = token.to_string();
        credentials.expires_at = None;
    }

    if credentials.is_expired_at(Utc::now()) {
        return Err(ChaosError::TokenExpired(credentials.username));
    }
    Ok(credentials)
}

/// Resolve the log file path, falling back to the platform temp directory.
fn resolve_log_path(log_file: Option<String>) -> PathBuf {
    match log_file {
        Some(path) => PathBuf::from(path),
        None => std::env::temp_dir().join("chaosctl.log"),
    }
}
