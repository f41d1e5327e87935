use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use paperfile::{
    config::AppConfig, db, DocumentStore, Exporter, Importer, PgDocumentStore, Synchronizer,
};

const USAGE: &str = "Usage: maintenance <export TARGET | import SOURCE | rename | delete ID>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let command = args.next();
    let argument = args.next();

    match (command.as_deref(), argument) {
        (Some("export"), Some(target)) => export(PathBuf::from(target)),
        (Some("import"), Some(source)) => import(PathBuf::from(source)),
        (Some("rename"), None) => rename_all(),
        (Some("delete"), Some(id)) => {
            let id: i32 = id.parse().context("document id must be an integer")?;
            delete(id)
        }
        (Some(cmd), _) => {
            eprintln!("Unknown or incomplete command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        (None, _) => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn open_store(config: &AppConfig) -> Result<PgDocumentStore> {
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        originals = %config.originals_dir.display(),
        filename_format = config.filename_format.as_deref().unwrap_or("<default>"),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    Ok(PgDocumentStore::new(pool))
}

fn export(target: PathBuf) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = open_store(&config)?;

    let summary = Exporter::new(config.storage_roots())
        .export(&store, &target)
        .with_context(|| format!("export to {} failed", target.display()))?;

    println!(
        "Exported {} documents ({} files) to {}.",
        summary.documents,
        summary.files,
        target.display()
    );
    Ok(())
}

fn import(source: PathBuf) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = open_store(&config)?;

    let summary = Importer::new(config.storage_roots(), config.naming())
        .import(&store, &source)
        .with_context(|| format!("import from {} failed", source.display()))?;

    println!(
        "Imported {} documents ({} records).",
        summary.documents, summary.entities
    );
    if summary.checksum_mismatches > 0 {
        eprintln!(
            "{} imported files did not match their recorded checksum.",
            summary.checksum_mismatches
        );
    }
    Ok(())
}

fn rename_all() -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = open_store(&config)?;

    let summary = Synchronizer::new(config.storage_roots(), config.naming())
        .reconcile_all(&store)
        .context("failed to list documents")?;

    println!(
        "Moved {}, unchanged {}, skipped {}, rolled back {}, failed {}.",
        summary.moved, summary.unchanged, summary.skipped, summary.rolled_back, summary.failed
    );
    Ok(())
}

fn delete(id: i32) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = open_store(&config)?;

    let document = store
        .load_document(id)
        .with_context(|| format!("failed to load document {id}"))?;
    store
        .delete_document(id)
        .with_context(|| format!("failed to delete document {id}"))?;

    let report = Synchronizer::new(config.storage_roots(), config.naming()).retire(&document);
    println!("Deleted document {id}, removed {} files.", report.removed.len());
    for (path, err) in &report.failures {
        eprintln!("Failed to remove {}: {err}", path.display());
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
