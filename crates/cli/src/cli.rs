use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "research",
    version,
    about = "Terminal client for the document research service"
)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the server address (also read from RESEARCH_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Print request metrics on exit.
    #[arg(long, global = true, default_value_t = false)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Backend and subsystem availability.
    Health(HealthArgs),
    /// List uploaded documents.
    Documents,
    /// Show one document.
    Document(DocumentArgs),
    /// Upload a PDF or image.
    Upload(UploadArgs),
    /// Ask a question across all documents.
    Ask(AskArgs),
    /// Show a stored query response.
    ShowQuery(ShowQueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct HealthArgs {
    /// Keep polling and print every change.
    #[arg(long, default_value_t = false)]
    pub watch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    pub path: PathBuf,

    /// Defaults to the file name without its extension.
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    #[arg(required = true)]
    pub text: Vec<String>,

    /// Print the raw response as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowQueryArgs {
    pub id: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
