use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use notion_imagegen::config;
use notion_imagegen::notion::NotionClient;

/// Print the database schema and check the configured field labels against it.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config (defaults to ./config.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database ID to inspect (defaults to the configured one)
    #[arg(long)]
    db_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;
    let db_id = args.db_id.unwrap_or_else(|| cfg.notion.database_id.clone());
    let client = NotionClient::new(cfg.notion.token.clone(), cfg.notion.version.clone())?;

    let db = client
        .retrieve_database(&db_id)
        .await
        .context("failed to retrieve database schema")?;
    println!("Database ID: {}", db.id);
    println!("Properties:");
    let mut names: Vec<_> = db.properties.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, prop) in names {
        println!("  {} -> {{ id: {}, type: {} }}", name, prop.id, prop.typ);
    }

    let fields = cfg.field_map();
    let missing: Vec<_> = fields
        .iter()
        .filter(|(_, label)| !db.properties.contains_key(*label))
        .collect();
    if missing.is_empty() {
        println!("All configured fields are present.");
    } else {
        println!("Configured fields missing from the database:");
        for (key, label) in missing {
            println!("  {} -> {}", key.as_str(), label);
        }
    }
    Ok(())
}
