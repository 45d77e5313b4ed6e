mod common;

use std::time::Duration;

use posture_monitor::{
    Database, MonitorEvent, MonitorSettings, MonitorStatus, PostureMonitor, SettingsStore,
};
use tempfile::TempDir;
use tokio::{sync::broadcast, time::timeout};

use common::{ScoreScript, StillCamera};

const WAIT: Duration = Duration::from_secs(10);

fn write_fast_settings(dir: &TempDir) {
    let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
    store
        .update(MonitorSettings {
            analysis_interval_ms: 1_000,
            preview_fps: 20,
            ..MonitorSettings::default()
        })
        .unwrap();
}

async fn next_check(events: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event @ MonitorEvent::PostureChecked { .. })
                | Ok(event @ MonitorEvent::DetectionFailed) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for an analysis tick")
}

#[tokio::test]
async fn monitoring_run_persists_each_tick() {
    let dir = TempDir::new().unwrap();
    write_fast_settings(&dir);
    let (camera, releases) = StillCamera::new();
    let app = PostureMonitor::open(
        dir.path(),
        Box::new(camera),
        Box::new(ScoreScript::new(vec![Some(0.089), Some(0.156), Some(0.092)])),
    )
    .await
    .unwrap();
    assert_eq!(app.controller.settings().analysis_interval_ms, 1_000);

    let mut events = app.controller.subscribe();
    app.controller.start_monitoring().await.unwrap();
    assert_eq!(app.controller.status().await, MonitorStatus::Monitoring);

    let mut verdicts = Vec::new();
    for _ in 0..3 {
        match next_check(&mut events).await {
            MonitorEvent::PostureChecked { is_good, .. } => verdicts.push(is_good),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(verdicts, [true, false, true]);

    let session = app.controller.stop_monitoring().await.unwrap().unwrap();
    let checks = app.db.get_session_checks(session.id).await.unwrap();
    assert!(session.total_checks >= 3);
    assert_eq!(session.bad_count, 1);
    assert_eq!(session.total_checks, session.good_count + session.bad_count);
    assert_eq!(checks.len() as u64, session.total_checks);

    let tally = app.controller.tally();
    assert_eq!(tally.bad, 1);
    assert_eq!(tally.data_loss, 0);

    app.close().await;
    assert_eq!(app.controller.status().await, MonitorStatus::Idle);
    assert_eq!(releases.count(), 1);
}

#[tokio::test]
async fn undetected_ticks_are_stored_as_failed_checks() {
    let dir = TempDir::new().unwrap();
    write_fast_settings(&dir);
    let (camera, _releases) = StillCamera::new();
    let app = PostureMonitor::open(
        dir.path(),
        Box::new(camera),
        Box::new(ScoreScript::new(vec![None])),
    )
    .await
    .unwrap();
    let mut events = app.controller.subscribe();

    app.controller.start_monitoring().await.unwrap();
    assert_eq!(next_check(&mut events).await, MonitorEvent::DetectionFailed);
    let session = app.controller.stop_monitoring().await.unwrap().unwrap();

    assert_eq!(session.total_checks, 0);
    assert_eq!(session.average_score, Some(0.0));
    let checks = app.db.get_session_checks(session.id).await.unwrap();
    assert!(!checks.is_empty());
    assert!(checks.iter().all(|check| !check.detection_successful));
    app.close().await;
}

#[tokio::test]
async fn open_recovers_session_left_by_crash() {
    let dir = TempDir::new().unwrap();
    let crashed = {
        let db = Database::new(dir.path().join("posture_statistics.db")).unwrap();
        let session_id = db.start_session().await.unwrap();
        db.add_check(true, 0.07, true).await.unwrap();
        session_id
    };

    let (camera, _releases) = StillCamera::new();
    let app = PostureMonitor::open(
        dir.path(),
        Box::new(camera),
        Box::new(ScoreScript::new(vec![None])),
    )
    .await
    .unwrap();

    assert!(app.db.open_session().await.unwrap().is_none());
    let recovered = app.db.get_session(crashed).await.unwrap().unwrap();
    assert!(recovered.end_time.is_some());
    assert_eq!(recovered.average_score, Some(0.07));

    app.controller.set_preview_fps(12).await.unwrap();
    app.save_settings().unwrap();
    let reloaded = SettingsStore::new(dir.path().join("settings.json")).unwrap();
    assert_eq!(reloaded.monitor().preview_fps, 12);
}
