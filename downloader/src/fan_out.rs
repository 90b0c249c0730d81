/// Fan-out driver: one task per target, all running at once, joined at the end.
///
/// There is no concurrency limit and no retry, and one failure never stops
/// the others. The join is the only point where downloads meet.
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_shared::models::{DownloadReport, Target};
use courier_shared::run_summary::RunSummary;

use crate::orchestrator::{download, DownloadOptions};

/// Download every target and wait for all of them, however long that takes.
pub async fn run_all(targets: Vec<Target>, options: DownloadOptions) -> RunSummary {
    run_until(targets, options, std::future::pending::<()>()).await
}

/// Like [`run_all`], but stop waiting once `shutdown` resolves: downloads
/// still running at that point are aborted and reported as cancelled.
pub async fn run_until<F>(targets: Vec<Target>, options: DownloadOptions, shutdown: F) -> RunSummary
where
    F: Future,
{
    let options = Arc::new(options);
    info!("Launching {} downloads", targets.len());

    let launched: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let id = Uuid::new_v4();
            let started_at = Utc::now();
            let options = options.clone();
            let task_target = target.clone();
            let handle = tokio::spawn(async move {
                download(id, task_target, started_at, &options).await
            });
            (id, target, started_at, handle)
        })
        .collect();

    tokio::pin!(shutdown);
    let mut cancelled = false;
    let mut reports = Vec::with_capacity(launched.len());

    for (id, target, started_at, mut handle) in launched {
        let finished = if cancelled {
            None
        } else {
            tokio::select! {
                joined = &mut handle => Some(joined),
                _ = &mut shutdown => {
                    warn!("Shutdown requested, aborting outstanding downloads");
                    cancelled = true;
                    None
                }
            }
        };
        let joined = match finished {
            Some(joined) => joined,
            None => {
                handle.abort();
                handle.await
            }
        };

        let report = match joined {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => DownloadReport::failed(
                id,
                target,
                "cancelled",
                "download cancelled at shutdown".to_string(),
                started_at,
            ),
            Err(e) => {
                warn!("Download task for {} panicked: {}", target.url, e);
                DownloadReport::failed(id, target, "panicked", e.to_string(), started_at)
            }
        };
        debug!("{} ended as {}", report.target.url, report.status);
        reports.push(report);
    }

    let summary = RunSummary::from_reports(reports);
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        total_bytes = summary.total_bytes,
        "All {} downloads reached a terminal state",
        summary.total
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{response_with_body, serve_chunks, serve_silent};
    use courier_shared::models::DownloadStatus;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_for_file(path: &Path, len: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if std::fs::metadata(path).map(|m| m.len() == len).unwrap_or(false) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("download did not finish in time");
    }

    #[tokio::test]
    async fn test_independent_downloads_with_one_silent_peer() {
        let dir = tempfile::tempdir().unwrap();
        let bodies: Vec<Vec<u8>> = (1..=3).map(|i| vec![i as u8; i * 100]).collect();

        let mut targets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            let server = serve_chunks(vec![response_with_body(body)], Duration::ZERO).await;
            let path = dir.path().join(format!("file{}.bin", i + 1));
            targets.push(Target::new(&format!("http://{}/bytes/{}", server.addr, body.len()), path).unwrap());
        }

        let (release, released) = oneshot::channel();
        let silent = serve_silent(released).await;
        let silent_path = dir.path().join("silent.bin");
        targets.push(Target::new(&format!("http://{}/", silent.addr), &silent_path).unwrap());

        let run = tokio::spawn(run_all(targets, DownloadOptions::default()));

        for (i, body) in bodies.iter().enumerate() {
            wait_for_file(&dir.path().join(format!("file{}.bin", i + 1)), body.len() as u64).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!run.is_finished(), "driver returned before the silent download ended");

        release.send(()).unwrap();
        let summary = run.await.unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total_bytes, 600);
        assert_eq!(summary.reports[3].error_kind.as_deref(), Some("malformed_response"));
        assert!(!silent_path.exists());
        for (i, body) in bodies.iter().enumerate() {
            assert_eq!(summary.reports[i].status, DownloadStatus::Done);
            assert_eq!(&std::fs::read(dir.path().join(format!("file{}.bin", i + 1))).unwrap(), body);
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_others() {
        let dir = tempfile::tempdir().unwrap();
        let refused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let refused_addr = refused.local_addr().unwrap();
        drop(refused);

        let server = serve_chunks(vec![response_with_body(b"ok")], Duration::ZERO).await;
        let targets = vec![
            Target::new(&format!("http://{}/", refused_addr), dir.path().join("a.bin")).unwrap(),
            Target::new(&format!("http://{}/", server.addr), dir.path().join("b.bin")).unwrap(),
        ];

        let summary = run_all(targets, DownloadOptions::default()).await;
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.reports[0].error_kind.as_deref(), Some("connect"));
        assert_eq!(std::fs::read(dir.path().join("b.bin")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_outstanding() {
        let dir = tempfile::tempdir().unwrap();
        let (_release, released) = oneshot::channel::<()>();
        let silent = serve_silent(released).await;
        let targets = vec![Target::new(&format!("http://{}/", silent.addr), dir.path().join("x.bin")).unwrap()];

        let summary = run_until(
            targets,
            DownloadOptions::default(),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.reports[0].error_kind.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_empty_target_list() {
        let summary = run_all(Vec::new(), DownloadOptions::default()).await;
        assert_eq!(summary.total, 0);
    }
}
