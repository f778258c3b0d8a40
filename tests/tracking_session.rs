//! End-to-end tracking sessions through the public API

mod common;

use common::*;
use fetch_tracker::{
    AbortPolicy, DownloadStatus, Event, FailureKind, FinishReason, GateState, TrackedFileSpec,
    TrackerConfig,
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn scenario_reports_each_file_once_and_opens_gate() {
    let (tracker, sink) = tracker(TrackerConfig::default());
    let retriever = tracker.wrap(
        ScriptedRetriever::new()
            .script(DATA_URL, Script::chunks(vec![250_000; 4], Duration::from_millis(500)))
            .script(WASM_URL, Script::chunks(vec![250_000; 2], Duration::from_millis(500))),
    );
    tracker.start_tracking().unwrap();

    let (data, wasm) = tokio::join!(fetch(&retriever, DATA_URL), fetch(&retriever, WASM_URL));
    assert_eq!(data.unwrap().as_ref(), body_content(1_000_000).as_slice());
    assert_eq!(wasm.unwrap().as_ref(), body_content(500_000).as_slice());

    let outcome = tracker.wait_for_completion().await.unwrap();
    assert!(outcome.success);

    let data = outcome.files.iter().find(|f| f.name == "DataFile").unwrap();
    assert_eq!(data.average_speed_bps, 500_000);
    assert_eq!(data.status, DownloadStatus::Loaded);
    assert_eq!(data.progress, "100.00");
    assert_eq!(data.loaded_bytes, 1_000_000);

    let completed: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|(name, _)| name == "Client_Download_Full")
        .collect();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].1["Name"], "WasmFile");
    assert_eq!(completed[1].1["Name"], "DataFile");
    assert_eq!(completed[1].1["Speed"], "0.4768");
    assert_eq!(completed[1].1["Time"], "2.00");

    let names = sink.names();
    assert_eq!(names.first().map(String::as_str), Some("Client_Download_Started"));
    assert_eq!(names.last().map(String::as_str), Some("Client_Download_Full_All"));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_session_finished_last() {
    let (tracker, _sink) = tracker(TrackerConfig::default());
    let mut events = tracker.subscribe();
    let retriever = tracker.wrap(
        ScriptedRetriever::new()
            .script(DATA_URL, Script::chunks(vec![1024; 3], Duration::from_millis(100)))
            .script(WASM_URL, Script::chunks(vec![1024; 3], Duration::from_millis(100))),
    );
    tracker.start_tracking().unwrap();

    let (data, wasm) = tokio::join!(fetch(&retriever, DATA_URL), fetch(&retriever, WASM_URL));
    assert!(data.is_ok() && wasm.is_ok());
    tracker.wait_for_completion().await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    let started = received
        .iter()
        .filter(|e| matches!(e, Event::DownloadStarted { .. }))
        .count();
    assert_eq!(started, 2);

    match received.last() {
        Some(Event::SessionFinished { outcome }) => {
            assert!(outcome.success);
            assert_eq!(outcome.stats.completed, 2);
            assert_eq!(outcome.stats.loaded_bytes, 6 * 1024);
        }
        other => panic!("expected SessionFinished last, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_sizes_never_report_zero_or_nan() {
    let (tracker, sink) = tracker(TrackerConfig::default());
    let retriever = tracker.wrap(
        ScriptedRetriever::new()
            .script(
                DATA_URL,
                Script::chunks(vec![4096; 30], Duration::from_millis(500)).without_length(),
            )
            .script(WASM_URL, Script::chunks(vec![4096; 2], Duration::from_millis(100))),
    );
    tracker.start_tracking().unwrap();

    let (data, wasm) = tokio::join!(fetch(&retriever, DATA_URL), fetch(&retriever, WASM_URL));
    assert!(data.is_ok() && wasm.is_ok());
    tracker.wait_for_completion().await.unwrap();

    let progress: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|(name, _)| name == "Client_Download")
        .collect();
    assert!(!progress.is_empty());
    for (_, props) in &progress {
        assert_eq!(props["Full_size_DataFile"], "Unknown");
        assert_eq!(props["Progress_DataFile"], "Unknown");
    }
}

#[tokio::test(start_paused = true)]
async fn optional_failure_policies() {
    // Under AnyError the session fails while DataFile is still in flight,
    // so its incomplete record is reported too
    let cases = [
        (AbortPolicy::AnyError, false, 2),
        (AbortPolicy::CriticalOnly, true, 1),
    ];
    for (policy, expect_success, expected_errors) in cases {
        let config = TrackerConfig {
            tracked_files: vec![
                TrackedFileSpec::new(".data.br", "DataFile"),
                TrackedFileSpec::optional(".json", "Manifest"),
            ],
            abort_policy: policy,
            ..Default::default()
        };
        let manifest_url = "https://cdn.example.com/Build/manifest.json";
        let (tracker, sink) = tracker(config);
        let retriever = tracker.wrap(
            ScriptedRetriever::new()
                .script(DATA_URL, Script::chunks(vec![2048; 6], Duration::from_millis(200)))
                .script(
                    manifest_url,
                    Script::chunks(vec![512; 4], Duration::from_millis(100)).failing_after(2),
                ),
        );
        tracker.start_tracking().unwrap();

        let (data, manifest) =
            tokio::join!(fetch(&retriever, DATA_URL), fetch(&retriever, manifest_url));
        assert!(data.is_ok());
        assert_eq!(
            manifest.unwrap_err().to_string(),
            "scripted failure: body read interrupted"
        );

        let outcome = tracker.wait_for_completion().await.unwrap();
        assert_eq!(outcome.success, expect_success, "policy {policy:?}");
        assert_eq!(
            sink.count("Client_Download_Error"),
            expected_errors,
            "policy {policy:?}"
        );

        let manifest = outcome.files.iter().find(|f| f.name == "Manifest").unwrap();
        assert_eq!(manifest.loaded_bytes, 1024);
        assert_eq!(
            manifest.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::StreamRead)
        );
        if !expect_success {
            assert!(matches!(outcome.reason, FinishReason::Failed { ref name, .. } if name == "Manifest"));
            assert!(matches!(outcome.stats.gate, GateState::Failed { .. }));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn transport_failure_fails_session_and_returns_error() {
    let (tracker, sink) = tracker(TrackerConfig::default());
    let retriever = tracker.wrap(
        ScriptedRetriever::new()
            .script(DATA_URL, Script::chunks(vec![1024; 8], Duration::from_millis(200))),
    );
    tracker.start_tracking().unwrap();

    let (data, wasm) = tokio::join!(fetch(&retriever, DATA_URL), fetch(&retriever, WASM_URL));
    let error = wasm.unwrap_err();
    assert_eq!(error.0, format!("no route to {WASM_URL}"));

    let outcome = tracker.wait_for_completion().await.unwrap();
    assert!(!outcome.success);

    let wasm = outcome.files.iter().find(|f| f.name == "WasmFile").unwrap();
    assert_eq!(wasm.loaded_bytes, 0);
    assert_eq!(wasm.failure.as_ref().map(|f| f.kind), Some(FailureKind::Transport));

    // DataFile was still downloading when the session failed
    let data_stats = outcome.files.iter().find(|f| f.name == "DataFile").unwrap();
    assert_eq!(
        data_stats.failure.as_ref().map(|f| f.kind),
        Some(FailureKind::Incomplete)
    );
    assert_eq!(sink.count("Client_Download_Error"), 2);

    // The caller's download is not cancelled
    assert_eq!(data.unwrap().len(), 8 * 1024);
}

#[tokio::test(start_paused = true)]
async fn config_loaded_from_json_drives_tracking() {
    let config = TrackerConfig::from_json_str(
        r#"{
            "tracked_files": [{ "suffix": ".pck", "name": "Pack" }],
            "report_interval_seconds": 2
        }"#,
    )
    .unwrap();
    let pack_url = "https://cdn.example.com/game.pck";
    let (tracker, sink) = tracker(config);
    let retriever = tracker.wrap(
        ScriptedRetriever::new()
            .script(pack_url, Script::chunks(vec![100; 5], Duration::from_secs(1)))
            .script(DATA_URL, Script::chunks(vec![100; 1], Duration::from_millis(10))),
    );
    tracker.start_tracking().unwrap();

    // .data.br is not tracked by this configuration
    fetch(&retriever, DATA_URL).await.unwrap();
    fetch(&retriever, pack_url).await.unwrap();

    let outcome = tracker.wait_for_completion().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].name, "Pack");
    // Two-second ticks while the five-second download ran
    assert_eq!(sink.count("Client_Download"), 3);
}
