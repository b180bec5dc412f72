use clap::Parser;
use toru_vault::cli::{Cli, Commands};
use toru_vault::logging;
use toru_vault::VaultSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List(opts) => {
            let session = VaultSession::connect()?;
            let projects = session.projects(opts.org_id.as_deref()).await?;

            if projects.is_empty() {
                println!("No projects found");
            } else {
                println!("Available Projects:");
                println!("===================");
                for project in &projects {
                    println!("ID: {}", project.id);
                    println!("Name: {}", project.name);
                    if let Some(created) = &project.creation_date {
                        println!("Created: {created}");
                    }
                    println!("{}", "-".repeat(50));
                }
            }
        }
        Commands::Version => {
            println!("toru-vault {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
