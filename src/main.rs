use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use meetroute::cli::{audit, client, grant, ingest, list, project, read};
use meetroute::classify::DomainClassifier;
use meetroute::config::Config;
use meetroute::ingest::Ingestor;
use meetroute::source::SourceRegistry;
use meetroute::store::{ProjectScope, Role, Store};
use meetroute::visibility::Viewer;

#[derive(Parser)]
#[command(name = "meetroute")]
#[command(about = "Meeting transcript ingestion, project routing and visibility enforcement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "meetroute.yaml")]
    config: String,

    /// User recorded as the actor of catalog changes
    #[arg(long, global = true)]
    actor: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest transcript payloads from a JSON file or directory
    Ingest {
        /// JSON file, or directory searched recursively for *.json
        path: PathBuf,

        /// Payload format (circleback, direct)
        #[arg(short, long, default_value = "circleback")]
        source: String,

        /// Correlation id recorded on audit events
        #[arg(long)]
        request_id: Option<String>,
    },

    /// List transcripts visible to a user
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: String,
        /// Title substring
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Read a transcript as a user
    Read {
        /// Transcript ID (short prefix or full ID)
        transcript_id: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        email: String,
    },

    /// Client management
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },

    /// Project and routing rule management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Access grants
    Grant {
        #[command(subcommand)]
        command: GrantCommands,
    },

    /// Show the audit trail of a transcript
    Audit {
        /// Transcript ID (short prefix or full ID)
        transcript_id: String,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Create a new client
    Create {
        name: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// List all clients
    List,
    /// Rename a client or change its owner
    Update {
        /// Client ID or Name
        client: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_owner")]
        owner: Option<String>,
        #[arg(long)]
        clear_owner: bool,
    },
    /// Delete a client and all of its projects
    Delete {
        /// Client ID or Name
        client: String,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a new project
    Create {
        /// Client ID or Name
        client: String,
        /// Project name
        name: String,
        /// Project scope (personal, client, global)
        #[arg(long, default_value = "client")]
        scope: ProjectScope,
        #[arg(long)]
        owner: Option<String>,
        /// Fallback destination for its client, or globally for scope=global
        #[arg(long)]
        inbox: bool,
    },
    /// List projects
    List {
        /// Client ID or Name
        #[arg(long)]
        client: Option<String>,
    },
    /// Change a project; routing of later ingests follows the new values
    Update {
        /// Project ID or Name
        project: String,
        /// Move to another client (ID or Name)
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        scope: Option<ProjectScope>,
        #[arg(long, conflicts_with = "clear_owner")]
        owner: Option<String>,
        #[arg(long)]
        clear_owner: bool,
        /// true or false
        #[arg(long)]
        inbox: Option<bool>,
    },
    /// Delete a project; its transcripts become unrouted
    Delete {
        /// Project ID or Name
        project: String,
    },
    /// Route attendees on a domain to a project
    AddDomain {
        /// Project ID or Name
        project: String,
        domain: String,
    },
    /// Remove a domain rule
    RemoveDomain { id: i64 },
    /// Route a meeting title to a project
    AddAlias {
        /// Project ID or Name
        project: String,
        alias: String,
    },
    /// Remove an alias rule
    RemoveAlias { id: i64 },
}

#[derive(Subcommand)]
enum GrantCommands {
    /// Give a user access to every project of a client
    Client {
        user: String,
        /// Client ID or Name
        client: String,
    },
    /// Give a user access to one project
    Project {
        user: String,
        /// Project ID or Name
        project: String,
    },
    /// Set a user's global role (admin, member)
    Role { user: String, role: Role },
}

fn init_logging(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config)?;
    init_logging(&config);

    // Initialize store
    let mut store = Store::open(&config.database_path())?;
    let actor = cli.actor.as_deref();

    match cli.command {
        Commands::Ingest {
            path,
            source,
            request_id,
        } => {
            let registry = SourceRegistry::new(&config);
            let ingestor = Ingestor::new(Box::new(DomainClassifier::from_config(
                &config.classification,
            )));
            ingest::run(
                &mut store,
                &registry,
                &ingestor,
                &path,
                &source,
                request_id.as_deref(),
            )?;
        }
        Commands::List {
            user,
            email,
            query,
            limit,
        } => {
            list::run(&store, &Viewer::new(user, email), query, limit)?;
        }
        Commands::Read {
            transcript_id,
            user,
            email,
        } => {
            read::run(&store, &Viewer::new(user, email), &transcript_id)?;
        }
        Commands::Client { command } => match command {
            ClientCommands::Create { name, owner } => {
                client::create(&mut store, name, owner, actor)?;
            }
            ClientCommands::List => {
                client::list(&store)?;
            }
            ClientCommands::Update {
                client,
                name,
                owner,
                clear_owner,
            } => {
                client::update(&mut store, client, name, owner, clear_owner, actor)?;
            }
            ClientCommands::Delete { client } => {
                client::delete(&mut store, client, actor)?;
            }
        },
        Commands::Project { command } => match command {
            ProjectCommands::Create {
                client,
                name,
                scope,
                owner,
                inbox,
            } => {
                project::create(&mut store, client, name, scope, owner, inbox, actor)?;
            }
            ProjectCommands::List { client } => {
                project::list(&store, client)?;
            }
            ProjectCommands::Update {
                project,
                client,
                name,
                scope,
                owner,
                clear_owner,
                inbox,
            } => {
                project::update(
                    &mut store,
                    project,
                    client,
                    name,
                    scope,
                    owner,
                    clear_owner,
                    inbox,
                    actor,
                )?;
            }
            ProjectCommands::Delete { project } => {
                project::delete(&mut store, project, actor)?;
            }
            ProjectCommands::AddDomain { project, domain } => {
                project::add_domain(&mut store, project, domain, actor)?;
            }
            ProjectCommands::RemoveDomain { id } => {
                project::remove_domain(&mut store, id, actor)?;
            }
            ProjectCommands::AddAlias { project, alias } => {
                project::add_alias(&mut store, project, alias, actor)?;
            }
            ProjectCommands::RemoveAlias { id } => {
                project::remove_alias(&mut store, id, actor)?;
            }
        },
        Commands::Grant { command } => match command {
            GrantCommands::Client { user, client } => {
                grant::client(&mut store, user, client, actor)?;
            }
            GrantCommands::Project { user, project } => {
                grant::project(&mut store, user, project, actor)?;
            }
            GrantCommands::Role { user, role } => {
                grant::role(&mut store, user, role, actor)?;
            }
        },
        Commands::Audit { transcript_id } => {
            audit::run(&store, &transcript_id)?;
        }
    }

    Ok(())
}
