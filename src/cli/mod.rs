use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "toru-vault", version, about = "Secrets-manager vault CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the projects available to the organization.
    List(ListOpts),
    /// Print the version.
    Version,
}

#[derive(clap::Args)]
pub struct ListOpts {
    /// Organization id; falls back to the configured value.
    #[arg(short, long)]
    pub org_id: Option<String>,
}
