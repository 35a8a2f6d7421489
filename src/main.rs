use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use stitchway::backends::BackendService;
use stitchway::config::{DEFAULT_CONFIG_PATH, LogLevel, LoggingConfig, SupergraphConfig};
use stitchway::{FederationGateway, GatewayInitError, logger, server};

#[derive(Parser)]
#[command(name = "stitchway")]
#[command(about = "Schema-stitching GraphQL gateway and its bundled backends")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compose the configured subgraphs and serve the gateway
    Gateway(GatewayArgs),
    /// Serve one of the bundled backends
    Backend(BackendArgs),
    /// Compose the configured subgraphs and print the stitched SDL
    Compose(ComposeArgs),
}

#[derive(Args)]
struct GatewayArgs {
    /// Supergraph config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Overrides `listen` from the config file
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[derive(Args)]
struct BackendArgs {
    /// book-service, author-service or publisher-service
    name: String,

    /// Defaults to the backend's own port
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    log_level: Option<LogLevel>,
}

#[derive(Args)]
struct ComposeArgs {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

async fn bind(address: SocketAddr) -> Result<TcpListener, GatewayInitError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| GatewayInitError::Bind { address, source })
}

async fn run_gateway(args: GatewayArgs) -> Result<(), GatewayInitError> {
    let mut config = SupergraphConfig::load(&args.config)?;
    config.log.apply_env_overrides()?;
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    logger::configure_logging(&config.log);

    let gateway =
        FederationGateway::from_services(config.services()?)?.with_subgraph_timeout(config.subgraph_timeout);
    info!(
        subgraphs = gateway.schema().subschemas().len(),
        fields = gateway.schema().delegation_plan().len(),
        "schema composed"
    );

    let address = args.listen.unwrap_or(config.listen);
    let listener = bind(address).await?;
    info!("GraphiQL UI available at http://{}/graphql", address);

    server::serve(listener, Arc::new(gateway)).await?;
    Ok(())
}

async fn run_backend(args: BackendArgs) -> Result<(), GatewayInitError> {
    let mut log = LoggingConfig::default();
    log.apply_env_overrides()?;
    if let Some(level) = args.log_level {
        log.level = level;
    }
    logger::configure_logging(&log);

    let backend = BackendService::by_name(&args.name)?;
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port.unwrap_or(backend.default_port())));
    let listener = bind(address).await?;

    server::serve(listener, Arc::new(backend)).await?;
    Ok(())
}

fn run_compose(args: ComposeArgs) -> Result<(), GatewayInitError> {
    let mut config = SupergraphConfig::load(&args.config)?;
    config.log.apply_env_overrides()?;
    logger::configure_logging(&config.log);

    let gateway = FederationGateway::from_services(config.services()?)?;
    println!("{}", gateway.schema().type_graph());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Gateway(args) => run_gateway(args).await,
        Command::Backend(args) => run_backend(args).await,
        Command::Compose(args) => run_compose(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // No-op when the command already installed its subscriber.
            logger::configure_logging(&LoggingConfig::default());
            error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}
