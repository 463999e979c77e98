use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "pgverify",
    about = "Verify that an Azure PostgreSQL flexible server carries the configuration its deployment declared",
    version
)]
pub struct Cli {
    /// Settings file. Defaults to ./pgverify.yml when present.
    #[arg(long, env = "PGVERIFY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check every configuration key from the deployment outputs against the live server.
    Verify {
        #[command(flatten)]
        source: OutputSourceArgs,

        /// Also fail when a live value differs from the deployment output.
        #[arg(long)]
        strict_values: bool,

        /// Report format.
        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// Print the deployment outputs the check would consume. Makes no Azure calls.
    Outputs {
        #[command(flatten)]
        source: OutputSourceArgs,

        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },

    /// List every configuration of a live server.
    Configs {
        #[arg(long)]
        resource_group: String,

        #[arg(long)]
        server: String,

        #[arg(long, default_value = "text")]
        output: OutputFormat,
    },
}

/// Where deployment outputs come from; overrides the settings file.
#[derive(Debug, Clone, Args)]
pub struct OutputSourceArgs {
    /// Directory of the applied Terraform configuration.
    #[arg(long, env = "PGVERIFY_TERRAFORM_DIR")]
    pub terraform_dir: Option<PathBuf>,

    /// IaC binary: terraform or tofu.
    #[arg(long, env = "PGVERIFY_TERRAFORM_BINARY")]
    pub binary: Option<String>,

    /// Captured `terraform output -json` document instead of running the binary.
    #[arg(long, conflicts_with = "terraform_dir")]
    pub outputs_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
