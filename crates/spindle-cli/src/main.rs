//! spindle demo: a producer → AsyncQueue → consumer pipeline plus a
//! heartbeat ControllableTask that is paused, resumed and stopped.
//!
//! Usage:
//!
//!   spindle [--config <PATH>]
//!
//! `RUST_LOG` controls log output (default `info`).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use spindle_core::ports::TracingEventSink;
use spindle_core::{AsyncQueue, ControllableTask, SpindleConfig, SpindleError, TaskConfig};
use tokio::time::{Duration, sleep};

#[derive(Debug, Serialize)]
struct Transfer {
    seq: u32,
    amount_sats: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run().await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SpindleError> {
    let config = match config_path() {
        Some(path) => SpindleConfig::load(path)?,
        None => SpindleConfig::default(),
    };

    // (A) heartbeat タスクを用意（設定がなければデフォルト）
    let task_config = config
        .tasks
        .first()
        .cloned()
        .unwrap_or_else(|| TaskConfig {
            interval_ms: 200,
            ..TaskConfig::default_heartbeat()
        });
    let beats = Arc::new(AtomicU64::new(0));
    let heartbeat = {
        let beats = Arc::clone(&beats);
        ControllableTask::builder_from_config(&task_config)
            .event_sink(TracingEventSink)
            .build(move || {
                let n = beats.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::info!(beat = n, "heartbeat");
            })?
    };
    heartbeat.start()?;

    // (B) queue を挟んで producer と consumer をつなぐ
    let (tx, mut rx, worker) = AsyncQueue::bridge_with_config::<Transfer>(&config.queue);

    const TRANSFERS: u32 = 20;

    // producer は tx を返す。consumer が全件受け取るまで input を閉じない
    // （閉じた時点でバッファに残った分は捨てられる）
    let producer = tokio::spawn(async move {
        for seq in 0..TRANSFERS {
            let transfer = Transfer {
                seq,
                amount_sats: 1_000 * u64::from(seq + 1),
            };
            if tx.send(transfer).await.is_err() {
                break;
            }
        }
        tx
    });

    let consumer = tokio::spawn(async move {
        let mut received = 0u32;
        while received < TRANSFERS {
            let Some(transfer) = rx.recv().await else {
                break;
            };
            // consumer は producer より遅い
            sleep(Duration::from_millis(25)).await;
            let line = serde_json::to_string(&transfer).unwrap_or_default();
            tracing::info!(%line, "consumed");
            received += 1;
        }
        received
    });

    // (C) heartbeat を止めたり再開したり
    sleep(task_config.interval() * 3).await;
    heartbeat.pause()?;
    tracing::info!(running = heartbeat.running(), "heartbeat paused");
    sleep(task_config.interval() * 2).await;
    heartbeat.restart()?;
    tracing::info!(running = heartbeat.running(), "heartbeat resumed");

    // (D) 後片付け: consumer が drain し終えてから input を閉じる
    let tx = producer.await;
    let received = consumer.await.unwrap_or_default();
    tracing::info!(received, "consumer finished");
    drop(tx);
    match worker.await {
        Ok(report) => tracing::info!(
            accepted = report.accepted,
            delivered = report.delivered,
            dropped = report.dropped,
            reason = ?report.reason,
            "queue finished"
        ),
        Err(e) => tracing::warn!("queue worker failed: {e}"),
    }

    if let Some(stats) = heartbeat.stop_and_join().await {
        let stats = serde_json::to_string(&stats).unwrap_or_default();
        tracing::info!(%stats, "heartbeat stopped");
    }
    Ok(())
}

fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
