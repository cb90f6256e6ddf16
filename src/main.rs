mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sitegrid::config::Config;
use sitegrid::models::{ContentType, NodeCategory, NodeId, SiteId, Tag};

use commands::{CreateParams, Runtime, UpdateParams};

#[derive(Parser)]
#[command(
    name = "sitegrid",
    version,
    about = "Site registry and site-to-node assignment for distributed crawlers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides logging.format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ContentTypeArg {
    Html,
    Api,
}

impl From<ContentTypeArg> for ContentType {
    fn from(arg: ContentTypeArg) -> Self {
        match arg {
            ContentTypeArg::Html => ContentType::Html,
            ContentTypeArg::Api => ContentType::Api,
        }
    }
}

/// Parse a `key=name` tag argument
fn parse_tag(raw: &str) -> std::result::Result<Tag, String> {
    match raw.split_once('=') {
        Some((key, name)) => Ok(Tag::new(key, name)),
        None => Err(format!("expected key=name, got '{raw}'")),
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the registry from the site-definition catalog
    Init {
        /// Catalog file (defaults to sites.catalog_path)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Print site snapshots as JSON, one per line
    List {
        /// Only enabled sites
        #[arg(long, default_value = "false")]
        enabled: bool,
    },

    /// Print one site snapshot
    Show {
        /// Site id
        id: SiteId,
    },

    /// Create a site
    Create {
        /// Unique short key
        #[arg(long)]
        key: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Root URL (http or https)
        #[arg(long)]
        root: String,

        /// Description
        #[arg(long)]
        desc: Option<String>,

        /// Content type
        #[arg(long = "type", value_enum)]
        content_type: Option<ContentTypeArg>,

        /// Cron expression (5 fields)
        #[arg(long)]
        cron: Option<String>,

        /// Start enabled
        #[arg(long, default_value = "false")]
        enable: bool,

        /// Tag as key=name, repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,

        /// Route to nodes of this category
        #[arg(long, conflicts_with = "hosts")]
        node_type: Option<i8>,

        /// Route to these node ids (comma separated)
        #[arg(long, value_delimiter = ',')]
        hosts: Option<Vec<NodeId>>,
    },

    /// Update fields of a site
    Update {
        /// Site id
        id: SiteId,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        root: Option<String>,

        #[arg(long)]
        desc: Option<String>,

        #[arg(long = "type", value_enum)]
        content_type: Option<ContentTypeArg>,

        #[arg(long)]
        cron: Option<String>,

        /// Enable or disable the site
        #[arg(long)]
        enable: Option<bool>,

        /// Replace the tag list; key=name, repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Option<Vec<Tag>>,

        /// Switch to category routing
        #[arg(long, conflicts_with = "hosts")]
        node_type: Option<i8>,

        /// Switch to explicit host routing (comma separated)
        #[arg(long, value_delimiter = ',')]
        hosts: Option<Vec<NodeId>>,
    },

    /// Resolve the nodes eligible to run a site
    Eligible {
        /// Site id
        id: SiteId,
    },

    /// List the enabled sites a node should run
    NodeSites {
        /// Node id
        node_id: NodeId,
    },

    /// Delete a node and remove it from every site's host list
    DeleteNode {
        /// Node id
        node_id: NodeId,
    },

    /// Print the front-end tab configuration
    Tabs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;
    tracing::debug!(
        sqlite_path = %config.database.sqlite_path.display(),
        nodes = config.nodes.len(),
        "Configuration loaded"
    );

    let rt = Runtime::open(config)?;

    let result = run(&rt, cli.command).await;
    rt.close()?;
    result
}

async fn run(rt: &Runtime, command: Commands) -> Result<()> {
    match command {
        Commands::Init { catalog } => {
            tracing::info!(catalog = ?catalog, "Starting init command");
            commands::init(rt, catalog)
        }

        Commands::List { enabled } => commands::list(rt, enabled),

        Commands::Show { id } => commands::show(rt, id),

        Commands::Create {
            key,
            name,
            root,
            desc,
            content_type,
            cron,
            enable,
            tags,
            node_type,
            hosts,
        } => {
            tracing::info!(key = %key, root = %root, "Starting create command");
            commands::create(
                rt,
                CreateParams {
                    key,
                    name,
                    root,
                    desc,
                    content_type: content_type.map(Into::into),
                    cron,
                    enable,
                    tags,
                    node_type: node_type.map(NodeCategory),
                    hosts,
                },
            )
        }

        Commands::Update {
            id,
            name,
            root,
            desc,
            content_type,
            cron,
            enable,
            tags,
            node_type,
            hosts,
        } => {
            tracing::info!(site_id = id, "Starting update command");
            commands::update(
                rt,
                id,
                UpdateParams {
                    name,
                    root,
                    desc,
                    content_type: content_type.map(Into::into),
                    cron,
                    enable,
                    tags,
                    node_type: node_type.map(NodeCategory),
                    hosts,
                },
            )
        }

        Commands::Eligible { id } => commands::eligible(rt, id),

        Commands::NodeSites { node_id } => commands::node_sites(rt, node_id),

        Commands::DeleteNode { node_id } => {
            tracing::info!(node_id, "Starting delete-node command");
            commands::delete_node(rt, node_id).await
        }

        Commands::Tabs => commands::tabs(rt),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("sitegrid=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("sitegrid={level},warn"))
            .with_context(|| format!("Invalid log level: {level}"))?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
