//! Integration tests for the full macro lifecycle: record live input,
//! persist it, load it back, and replay it through the same engine path.

use std::sync::Arc;
use std::time::Duration;

use hidpilot_core::Modifiers;
use hidpilot_daemon::{
    KeyboardEngine, MacroService, MockReportSink, PlaybackOutcome, RecordingStore, ReportSink,
    ServiceError, StoreError,
};
use uuid::Uuid;

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hidpilot_it_{}", Uuid::new_v4()))
}

fn make_service() -> (MacroService, Arc<MockReportSink>, std::path::PathBuf) {
    let sink = Arc::new(MockReportSink::new());
    let (handle, _task) = KeyboardEngine::spawn(Arc::clone(&sink) as Arc<dyn ReportSink>);
    let dir = temp_dir();
    let service = MacroService::new(handle, RecordingStore::new(&dir));
    (service, sink, dir)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_recorded_macro_replays_the_exact_report_sequence() {
    // Arrange
    let (mut service, sink, dir) = make_service();

    // Act – record a short Shift+A, B sequence typed live
    service.start_recording().await.unwrap();
    let keyboard = service.keyboard().clone();
    keyboard
        .press(Modifiers(Modifiers::LEFT_SHIFT), Some(0x04))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(15)).await;
    keyboard
        .release(Modifiers(Modifiers::LEFT_SHIFT), Some(0x04))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(15)).await;
    keyboard.press(Modifiers::NONE, Some(0x05)).await.unwrap();
    keyboard.release(Modifiers::NONE, Some(0x05)).await.unwrap();
    let saved_path = service.stop_recording(Some("shift-a-b")).await.unwrap();
    assert!(saved_path.is_file());

    let live_reports = sink.reports();

    // Replay it
    service.play(Some("shift-a-b")).await.unwrap();
    let outcome = service.wait_for_playback().await;

    // Assert – the replay drove the identical byte sequence through the sink
    assert_eq!(outcome, Some(PlaybackOutcome::Completed));
    let all_reports = sink.reports();
    assert_eq!(all_reports.len(), live_reports.len() * 2);
    assert_eq!(
        &all_reports[live_reports.len()..],
        &live_reports[..],
        "replay must reproduce the live report sequence exactly"
    );

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_stop_recording_without_a_name_uses_the_default() {
    // Arrange
    let (mut service, _sink, dir) = make_service();
    service.start_recording().await.unwrap();
    service
        .keyboard()
        .press(Modifiers::NONE, Some(0x04))
        .await
        .unwrap();

    // Act
    let path = service.stop_recording(None).await.unwrap();

    // Assert
    assert!(path.ends_with("default.json"));
    assert_eq!(service.saved_macros().unwrap(), vec!["default".to_string()]);

    // A saved default macro is replayable by name-less play too
    service.play(None).await.unwrap();
    assert_eq!(
        service.wait_for_playback().await,
        Some(PlaybackOutcome::Completed)
    );

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_playing_a_missing_macro_surfaces_not_found_and_touches_nothing() {
    // Arrange
    let (mut service, sink, _dir) = make_service();

    // Act
    let result = service.play(Some("never-recorded")).await;

    // Assert – typed error, no report written
    assert!(matches!(
        result,
        Err(ServiceError::Store(StoreError::NotFound { .. }))
    ));
    assert!(sink.is_empty());
    assert!(!service.is_playing());
}

#[tokio::test]
async fn test_playing_a_corrupt_macro_surfaces_parse_error() {
    // Arrange
    let (mut service, sink, dir) = make_service();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("garbled.json"), "{{{{").unwrap();

    // Act
    let result = service.play(Some("garbled")).await;

    // Assert
    assert!(matches!(
        result,
        Err(ServiceError::Store(StoreError::Parse { .. }))
    ));
    assert!(sink.is_empty());

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn test_playing_a_name_with_path_components_is_rejected() {
    let (mut service, _sink, _dir) = make_service();
    let result = service.play(Some("../../etc/passwd")).await;
    assert!(matches!(
        result,
        Err(ServiceError::Store(StoreError::InvalidName { .. }))
    ));
}

#[tokio::test]
async fn test_shutdown_cancels_replay_and_releases_all_keys() {
    // Arrange – a macro that holds a key for a long time
    let (mut service, sink, dir) = make_service();
    service.start_recording().await.unwrap();
    service
        .keyboard()
        .press(Modifiers::NONE, Some(0x04))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    service
        .keyboard()
        .release(Modifiers::NONE, Some(0x04))
        .await
        .unwrap();
    service.stop_recording(Some("held")).await.unwrap();
    service.keyboard().release_all().await.unwrap();

    service.play(Some("held")).await.unwrap();

    // Act
    service.shutdown().await;

    // Assert – whatever the replay was doing, the host ends all-released
    assert_eq!(sink.last_report(), Some([0u8; 8]));
    assert!(!service.is_playing());

    std::fs::remove_dir_all(dir).ok();
}
