//! Podium CLI - operator tooling for the Podium server
//!
//! Service credentials are provisioned here, from the machine that runs
//! the database; there is no network surface for minting them.

use clap::{Parser, Subcommand};
use podium_auth::{
    AccountId, AuthService, PermissionSet, ServiceCredentialView, ServiceId, SqliteStore,
};
use podium_core::{init_logging, PodiumConfig, PodiumResult};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "podium")]
#[command(about = "Operator tooling for the Podium member-management server")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, view and edit service credentials
    #[command(subcommand)]
    App(AppCommands),

    /// Manage user auth sessions
    #[command(subcommand)]
    Session(SessionCommands),

    /// Manage member accounts
    #[command(subcommand)]
    Account(AccountCommands),
}

#[derive(Subcommand)]
enum AppCommands {
    /// Create a service credential and print its secret
    Create {
        /// Label for the new credential
        label: String,

        /// Comma-separated permissions to grant (e.g. "manage-teams,authenticate-users")
        #[arg(short, long, default_value = "")]
        grant: String,

        /// Grant every service permission
        #[arg(short, long)]
        all: bool,
    },

    /// Edit a service credential
    Edit {
        /// The credential's numeric id
        id: ServiceId,

        /// Comma-separated permissions to grant
        #[arg(short, long, default_value = "")]
        grant: String,

        /// Comma-separated permissions to revoke
        #[arg(short, long, default_value = "")]
        revoke: String,

        /// A new label
        #[arg(short, long)]
        label: Option<String>,

        /// Rotate the secret (invalidates the old one immediately)
        #[arg(short = 't', long)]
        rotate: bool,
    },

    /// Delete a service credential
    Delete {
        /// The credential's numeric id
        id: ServiceId,
    },

    /// List all service credentials
    List,

    /// View a service credential
    View {
        /// The credential's numeric id
        id: ServiceId,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Delete all expired sessions
    Prune,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Grant an account every permission an account may hold
    Superuser {
        /// The account's numeric id
        id: AccountId,
    },
}

fn show_app(view: &ServiceCredentialView) {
    println!("{} ({})", view.username, view.label);
    if let Some(password) = &view.password {
        println!("  Password: {}", password);
    }
    println!("  Permissions: {}", view.permissions);
}

async fn run(cli: Cli, config: PodiumConfig) -> PodiumResult<()> {
    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);
    let service = AuthService::new(
        store.clone(),
        store.clone(),
        config.auth.session_lifetime()?,
    );

    match cli.command {
        Commands::App(AppCommands::Create { label, grant, all }) => {
            let permissions = if all {
                podium_auth::CredentialKind::Service.allowed()
            } else {
                PermissionSet::parse_list(&grant)?
            };
            let view = service.create_service(&label, permissions).await?;
            show_app(&view);
        }
        Commands::App(AppCommands::Edit {
            id,
            grant,
            revoke,
            label,
            rotate,
        }) => {
            let view = service
                .edit_service(
                    id,
                    label.as_deref(),
                    PermissionSet::parse_list(&grant)?,
                    PermissionSet::parse_list(&revoke)?,
                    rotate,
                )
                .await?;
            show_app(&view);
        }
        Commands::App(AppCommands::Delete { id }) => {
            service.delete_service(id).await?;
            println!("Deleted service credential {}.", id);
        }
        Commands::App(AppCommands::List) => {
            for view in service.list_services().await? {
                println!("{}: {}", view.username, view.label);
            }
        }
        Commands::App(AppCommands::View { id }) => {
            let view = service.service_credential(id).await?;
            show_app(&view);
        }
        Commands::Session(SessionCommands::Prune) => {
            let pruned = service.prune_sessions().await?;
            println!("Deleted {} expired sessions.", pruned);
        }
        Commands::Account(AccountCommands::Superuser { id }) => {
            let view = service.make_superuser(id).await?;
            println!(
                "Made account {} ({}#{}) a superuser.",
                view.id, view.name, view.discriminator
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match PodiumConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = init_logging(&config.logging) {
        eprintln!("failed to initialize logging: {}", err);
    }

    if let Err(err) = run(cli, config).await {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
