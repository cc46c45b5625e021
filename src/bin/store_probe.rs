use std::sync::Arc;

use anyhow::Context;

use lifelog::backend::flat::FlatBackend;
use lifelog::backend::sqlite::SqliteBackend;
use lifelog::backend::StorageBackend;
use lifelog::utils::truncate_str;
use lifelog::{AppConfig, BackendKind, Collection, DataGateway, RecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let recent_days_arg = args
        .windows(2)
        .find(|w| w[0] == "--recent")
        .map(|w| w[1].parse::<u32>())
        .transpose()?;
    let collection_filter = args
        .windows(2)
        .find(|w| w[0] == "--collection")
        .map(|w| w[1].parse::<Collection>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let run_cleanup = args.iter().any(|a| a == "--cleanup");

    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut config = match std::env::var("LIFELOG_CONFIG") {
        Ok(path) => AppConfig::load(std::path::Path::new(&path))
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => AppConfig::default(),
    };
    match std::env::var("LIFELOG_BACKEND").as_deref() {
        Ok("flat") => config.store.backend = BackendKind::Flat,
        Ok("sqlite") => config.store.backend = BackendKind::Sqlite,
        Ok(other) => anyhow::bail!("unknown LIFELOG_BACKEND {:?}", other),
        Err(_) => {}
    }
    if let Ok(path) = std::env::var("LIFELOG_DB_PATH") {
        config.store.db_path = path;
    }
    if let Ok(dir) = std::env::var("LIFELOG_DATA_DIR") {
        config.store.data_dir = dir;
    }

    println!("== Store ==");
    let backend: Arc<dyn StorageBackend> = match config.store.backend {
        BackendKind::Sqlite => {
            let db_path = &config.store.db_path;
            println!("- backend=sqlite path={}", db_path);
            Arc::new(
                SqliteBackend::open(db_path)
                    .await
                    .with_context(|| format!("failed to open sqlite store at {}", db_path))?,
            )
        }
        BackendKind::Flat => {
            let data_dir = &config.store.data_dir;
            println!("- backend=flat dir={}", data_dir);
            Arc::new(
                FlatBackend::open(data_dir)
                    .await
                    .with_context(|| format!("failed to open flat store at {}", data_dir))?,
            )
        }
    };

    let recent_days = recent_days_arg
        .unwrap_or(config.store.default_recent_days)
        .clamp(1, 365);

    let store = Arc::new(RecordStore::new(backend));
    let gateway = DataGateway::new(store.clone());

    println!("\n== Record Counts ==");
    for (collection, count) in gateway.stats().await {
        println!("- {}={}", collection.as_str(), count);
    }

    if run_cleanup {
        println!("\n== Cleanup ==");
        let report = store.run_cleanup().await;
        for (collection, stats) in &report.collections {
            println!(
                "- {} scanned={} removed={}",
                collection.as_str(),
                stats.scanned,
                stats.removed
            );
        }
        println!("- total_removed={}", report.total_removed());
    }

    println!("\n== Recent Records (Last {} Days) ==", recent_days);
    let collections: Vec<Collection> = match collection_filter {
        Some(c) => vec![c],
        None => Collection::ALL.to_vec(),
    };
    for collection in collections {
        let records = store.get_recent(collection, recent_days).await;
        println!("\n[{}] {} record(s)", collection.as_str(), records.len());
        for record in records {
            let payload = serde_json::to_string(&record.content).unwrap_or_default();
            println!(
                "- id={} created={} updated={}\n  {}",
                record.id,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                truncate_str(&payload, 240)
            );
        }
    }

    Ok(())
}
