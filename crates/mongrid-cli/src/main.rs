use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mongrid::{ConnectionRegistry, MongoConnector};

mod commands;

use commands::Target;

#[derive(Parser)]
#[command(
    name = "mongrid",
    about = "mongrid — inspect a MongoDB endpoint through the connection registry",
    version,
    propagate_version = true,
)]
struct Cli {
    /// TOML configuration file. Without it, MONGRID_* environment variables are read.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured host
    #[arg(long, global = true)]
    host: Option<String>,
    /// Override the configured port
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Establish the pool for the endpoint and report its identity
    Ping,
    /// Count documents in a collection
    Count {
        #[command(flatten)]
        target: Target,
        /// Use collection metadata instead of scanning
        #[arg(long)]
        estimated: bool,
    },
    /// Filtered, sorted, paged search. Prints one JSON document per line.
    Search {
        #[command(flatten)]
        target: Target,
        /// Exact match, repeatable
        #[arg(long = "eq", value_name = "FIELD=VALUE")]
        equals: Vec<String>,
        /// Regular-expression match, repeatable
        #[arg(long = "like", value_name = "FIELD=PATTERN")]
        like: Vec<String>,
        /// Sort key, repeatable; direction defaults to asc
        #[arg(long, value_name = "FIELD[:asc|desc]")]
        sort: Vec<String>,
        /// Maximum documents (0 = server-side default cap)
        #[arg(long, default_value_t = 0)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        /// Print the number of matches instead of the documents
        #[arg(long)]
        count: bool,
    },
    /// Fetch documents whose field is (or with --not, is not) in a value set.
    ///
    /// Groups are OR-combined: `--group name=a,b --group email=c@x.io`.
    FindIn {
        #[command(flatten)]
        target: Target,
        #[arg(long = "not")]
        negate: bool,
        #[arg(long = "group", value_name = "FIELD=V1,V2", required = true)]
        groups: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,mongrid=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.host, cli.port)?;
    tracing::debug!(key = %config.key(), "configuration loaded");
    let registry = ConnectionRegistry::new(MongoConnector::with_app_name("mongrid"));

    let result = match cli.command {
        Commands::Ping => commands::ping::ping(&registry, &config).await,
        Commands::Count { target, estimated } => {
            commands::count::count(&registry, &config, &target, estimated).await
        }
        Commands::Search {
            target,
            equals,
            like,
            sort,
            limit,
            skip,
            count,
        } => {
            let query = commands::search::build_query(&equals, &like, &sort, limit, skip)?;
            commands::search::search(&registry, &config, &target, &query, count).await
        }
        Commands::FindIn {
            target,
            negate,
            groups,
        } => commands::find_in::find_in(&registry, &config, &target, negate, &groups).await,
    };

    registry.release_all().await;
    result
}
