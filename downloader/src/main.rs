/// Courier Downloader - Main Entry Point
///
/// Fetches a fixed list of URLs concurrently by speaking HTTP/1.1 directly
/// over TCP sockets, streaming each response body into its own file.
mod config;
mod fan_out;
mod orchestrator;
mod sink;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use tracing::{info, warn};

use config::DownloaderConfig;
use orchestrator::DownloadOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("courier_downloader=info".parse()?)
                .add_directive("courier_shared=info".parse()?),
        )
        .init();

    info!("=== Courier Downloader Starting ===");

    let config = DownloaderConfig::from_env().context("Invalid downloader configuration")?;

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output directory {}", config.output_dir.display())
    })?;

    let targets = config.targets().context("Invalid download target")?;
    info!(
        "Downloading {} targets into {} (recv buffer {} bytes, header limit {} bytes)",
        targets.len(),
        config.output_dir.display(),
        config.recv_buffer_size,
        config.max_header_bytes
    );

    let options = DownloadOptions::from(&config);
    let summary = if config.cancel_on_ctrl_c {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {} (downloads cannot be interrupted)", e);
                std::future::pending::<()>().await;
            }
        };
        fan_out::run_until(targets, options, shutdown).await
    } else {
        fan_out::run_all(targets, options).await
    };

    match summary.to_json_line() {
        Ok(json) => info!("Run summary: {}", json),
        Err(e) => warn!("Failed to serialize run summary: {}", e),
    }
    if let Some(path) = &config.summary_path {
        match summary.write_to(path) {
            Ok(()) => info!("Run summary written to {}", path.display()),
            Err(e) => warn!("Failed to write run summary to {}: {}", path.display(), e),
        }
    }
    if summary.all_succeeded() {
        info!("All {} downloads succeeded", summary.total);
    } else {
        for url in &summary.failed_urls {
            warn!("Failed: {}", url);
        }
    }

    info!("Done");
    Ok(())
}
