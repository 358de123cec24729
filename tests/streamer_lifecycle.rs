use seriesflow::streaming::{create_streamer, DataStreamer, ParserFactory, StreamError, StreamerEvent};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn sample_count(streamer: &dyn DataStreamer) -> usize {
    streamer.data_map().lock().sample_count()
}

async fn assert_quiet_after_shutdown(mut streamer: Box<dyn DataStreamer>, start_args: Vec<String>) {
    streamer.start(&start_args).await.unwrap();
    assert!(streamer.is_running());

    let started = Instant::now();
    streamer.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!streamer.is_running());

    let after_shutdown = sample_count(streamer.as_ref());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sample_count(streamer.as_ref()), after_shutdown);
}

#[tokio::test]
async fn test_dummy_shutdown_immediately_after_start() {
    let streamer = create_streamer("dummy").unwrap();
    assert_quiet_after_shutdown(streamer, args(&["rate_hz=1000"])).await;
}

#[tokio::test]
async fn test_csv_replay_shutdown_immediately_after_start() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "a,b").unwrap();
    for i in 0..1000 {
        writeln!(file, "{},{}", i, i * 2).unwrap();
    }

    let streamer = create_streamer("csv_replay").unwrap();
    assert_quiet_after_shutdown(
        streamer,
        vec![
            format!("path={}", file.path().display()),
            "rate_limit_ms=1".to_string(),
            "loop_playback=true".to_string(),
        ],
    )
    .await;
}

#[tokio::test]
async fn test_udp_shutdown_immediately_after_start() {
    let mut streamer = create_streamer("udp").unwrap();
    streamer.set_available_parsers(Arc::new(ParserFactory::with_builtins()));
    assert_quiet_after_shutdown(streamer, args(&["bind_addr=127.0.0.1:0"])).await;
}

#[tokio::test]
async fn test_udp_without_parsers_fails_to_start() {
    let mut streamer = create_streamer("udp").unwrap();
    let result = streamer.start(&args(&["bind_addr=127.0.0.1:0"])).await;
    assert!(matches!(result, Err(StreamError::NoParser(_))));
    assert!(!streamer.is_running());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut streamer = create_streamer("dummy").unwrap();
    streamer.start(&[]).await.unwrap();
    let second = streamer.start(&[]).await;
    assert!(matches!(second, Err(StreamError::AlreadyRunning)));
    streamer.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_after_shutdown() {
    let mut streamer = create_streamer("dummy").unwrap();
    streamer.start(&args(&["rate_hz=500"])).await.unwrap();
    streamer.shutdown().await.unwrap();
    streamer.start(&args(&["rate_hz=500"])).await.unwrap();
    assert!(streamer.is_running());
    streamer.shutdown().await.unwrap();
    assert!(!streamer.is_running());
}

#[tokio::test]
async fn test_run_status_events() {
    let mut streamer = create_streamer("dummy").unwrap();
    let events = streamer.events();
    streamer.start(&[]).await.unwrap();
    streamer.shutdown().await.unwrap();

    let statuses: Vec<bool> = events
        .try_iter()
        .filter_map(|event| match event {
            StreamerEvent::RunStatusChanged { running, .. } => Some(running),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![true, false]);
}

#[tokio::test]
async fn test_unknown_streamer() {
    assert!(create_streamer("serial").is_err());
}
