use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use marktbook::utils::error::{ErrorSeverity, MarktError};
use marktbook::utils::{logger, validation::Validate};
use marktbook::{AppConfig, AppState, CliConfig, LocalStorage, MemoryStore};
use tokio::net::TcpListener;
use tokio::sync::watch;

fn report_and_exit(context: &str, e: &MarktError) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low | ErrorSeverity::High => 1,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

/// 啟動時若有快照則還原，否則從空資料開始
async fn open_store(config: &AppConfig) -> Result<MemoryStore, MarktError> {
    let Some(dir) = &config.storage.data_dir else {
        tracing::warn!("⚠️ No data_dir configured, data lives in memory only");
        return Ok(MemoryStore::new());
    };

    let storage = LocalStorage::new(dir);
    if storage.exists(&config.storage.snapshot_file).await {
        tracing::info!("📂 Restoring snapshot from {}", dir);
        MemoryStore::load_from(&storage, &config.storage.snapshot_file).await
    } else {
        tracing::info!("📂 No snapshot found in {}, starting empty", dir);
        Ok(MemoryStore::new())
    }
}

async fn save_snapshot(store: &MemoryStore, storage: &LocalStorage, file: &str) {
    match store.save_to(storage, file).await {
        Ok(bytes) => tracing::debug!(bytes, "💾 Snapshot saved"),
        Err(e) => tracing::error!(
            "❌ Snapshot failed: {} ({})",
            e,
            e.recovery_suggestion()
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("🛑 Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting MarktBook v{}", env!("CARGO_PKG_VERSION"));

    // 載入並驗證配置
    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => report_and_exit("Failed to load configuration", &e),
    };
    if let Err(e) = config.validate() {
        report_and_exit("Configuration validation failed", &e);
    }
    if config.server.debug {
        tracing::warn!("⚠️ Debug mode: identity is taken from X-Business-Id headers, do not expose this server");
    }

    let store = match open_store(&config).await {
        Ok(store) => Arc::new(store),
        Err(e) => report_and_exit("Failed to restore snapshot", &e),
    };

    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(e) => report_and_exit("Invalid listen address", &e),
    };
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => report_and_exit("Failed to bind listener", &MarktError::IoError(e)),
    };

    let persistence = config
        .storage
        .data_dir
        .as_ref()
        .map(|dir| (LocalStorage::new(dir), config.storage.snapshot_file.clone()));
    let interval = Duration::from_secs(config.storage.snapshot_interval_seconds.max(1));

    let state = Arc::new(AppState::new(config, store.clone()));

    // 定期寫入快照，直到收到關閉訊號
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let snapshot_task = persistence.clone().map(|(storage, file)| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => save_snapshot(&store, &storage, &file).await,
                    _ = stop_rx.changed() => break,
                }
            }
        })
    });

    if let Err(e) = marktbook::serve(listener, state, shutdown_signal()).await {
        report_and_exit("Server stopped unexpectedly", &e);
    }

    let _ = stop_tx.send(true);
    if let Some(task) = snapshot_task {
        let _ = task.await;
    }
    if let Some((storage, file)) = persistence {
        save_snapshot(&store, &storage, &file).await;
        tracing::info!("💾 Final snapshot written to {}", storage.base_path().display());
    }

    tracing::info!("✅ MarktBook stopped");
    Ok(())
}
