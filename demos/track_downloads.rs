//! Track a pair of downloads over HTTP
//!
//! Usage:
//!
//! ```text
//! cargo run --example track_downloads -- https://cdn.example.com/Build/game.data.br https://cdn.example.com/Build/game.wasm.br
//! ```
//!
//! Set `RUST_LOG=fetch_tracker=debug` for more detail.

use fetch_tracker::{
    DownloadTracker, Event, LogSink, ReqwestRetriever, RequestOptions, Retriever, TrackerConfig,
};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: track_downloads <url>...");
        return Ok(());
    }

    let config = TrackerConfig::from_json_str(r#"{ "report_interval_seconds": 2 }"#)?;
    let tracker = DownloadTracker::new(config)?
        .with_sink(LogSink)
        .with_sink(|name: &str, props: &Map<String, Value>| {
            println!("[analytics] {name} {}", Value::Object(props.clone()));
        });

    // UI subscriber, only cares about progress
    let mut events = tracker.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Event::Progress { files } = event {
                for file in files {
                    println!("[ui] {} {}%", file.name, file.progress);
                }
            }
        }
    });

    let retriever = tracker.wrap(ReqwestRetriever::new()?);
    tracker.start_tracking()?;

    let downloads = urls.iter().map(|url| {
        let retriever = &retriever;
        async move {
            let response = retriever.retrieve(url, &RequestOptions::default()).await?;
            let status = response.status();
            let body = response.bytes().await?;
            println!("{url}: {status}, {} bytes", body.len());
            Ok::<_, reqwest::Error>(())
        }
    });
    for result in futures::future::join_all(downloads).await {
        if let Err(e) = result {
            eprintln!("download failed: {e}");
        }
    }

    // Untracked URLs never open the gate, so don't wait forever
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        tracker.wait_for_completion(),
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(_) => {
            tracker.stop_tracking();
            tracker.wait_for_completion().await
        }
    };
    if let Some(outcome) = outcome {
        println!(
            "finished: success={} reason={} network={} ({})",
            outcome.success,
            outcome.reason.label(),
            outcome.network.label,
            outcome.network.score
        );
    }

    Ok(())
}
