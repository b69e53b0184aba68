mod cli;
mod render;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use client::error::describe_read_error;
use client::{App, ClientConfig};
use std::io::Write;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{AskArgs, Cli, Commands, HealthArgs, ShowQueryArgs, UploadArgs};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let app = Arc::new(App::new(config)?);

    let outcome = match cli.command {
        Commands::Health(args) => health(&app, args).await,
        Commands::Documents => documents(&app).await,
        Commands::Document(args) => {
            let doc = app
                .document(&args.id)
                .await
                .map_err(|e| anyhow!(describe_read_error(&e)))?;
            println!("{}", render::document(&doc));
            Ok(())
        }
        Commands::Upload(args) => upload(&app, args).await,
        Commands::Ask(args) => ask(&app, args).await,
        Commands::ShowQuery(args) => show_query(&app, args).await,
    };

    if cli.stats {
        eprintln!("{}", render::stats(&app.metrics().snapshot()));
    }
    app.shutdown();
    outcome
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();

    if let Some(url) = &cli.api_url {
        config = config.with_base_url(url.clone());
    }
    Ok(config)
}

async fn health(app: &App, args: HealthArgs) -> Result<()> {
    if !args.watch {
        println!("{}", render::health(&app.current_health().await));
        return Ok(());
    }

    let mut updates = app.health().subscribe();
    app.start();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *updates.borrow_and_update();
                println!("{}\n", render::health(&status));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

async fn documents(app: &App) -> Result<()> {
    let docs = app
        .documents()
        .await
        .map_err(|e| anyhow!(describe_read_error(&e)))?;
    println!("{}", render::documents(&docs));
    Ok(())
}

async fn upload(app: &App, args: UploadArgs) -> Result<()> {
    let uploads = app.uploads();
    uploads
        .select_path(&args.path)
        .await
        .map_err(|e| anyhow!(render::error(&e)))?;
    if let Some(title) = args.title {
        uploads.set_title(title);
    }

    let doc = uploads
        .upload_selected()
        .await
        .map_err(|e| anyhow!(render::error(&e)))?;
    println!("Uploaded {}", render::document(&doc));
    Ok(())
}

async fn ask(app: &Arc<App>, args: AskArgs) -> Result<()> {
    let degraded = !app.current_health().await.llm_available();
    if degraded {
        eprintln!("warning: the language model is unavailable, answers may be limited");
    }
    app.start();

    app.queries().set_draft(args.text.join(" "));
    let mut lifecycle = app.lifecycle();
    let mut submit = {
        let app = Arc::clone(app);
        tokio::spawn(async move { app.queries().submit_draft().await })
    };

    let mut stderr = std::io::stderr();
    let result = loop {
        tokio::select! {
            joined = &mut submit => break joined.context("query task failed")?,
            Some(view) = lifecycle.changed() => {
                if let Some(message) = view.progress_message() {
                    let bar = if view.show_progress_bar() { " [.....]" } else { "" };
                    let _ = write!(stderr, "\r{} {}s{}", message, view.elapsed.as_secs(), bar);
                    let _ = stderr.flush();
                }
            }
        }
    };
    eprintln!();

    let response = result.map_err(|e| anyhow!(render::error(&e)))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*response)?);
    } else {
        println!("{}", render::response(&response));
    }
    Ok(())
}

async fn show_query(app: &App, args: ShowQueryArgs) -> Result<()> {
    let response = app
        .query(&args.id)
        .await
        .map_err(|e| anyhow!(describe_read_error(&e)))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*response)?);
    } else {
        println!("{}", render::response(&response));
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
