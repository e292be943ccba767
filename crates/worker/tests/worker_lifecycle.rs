use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use taskboard_core::{BoardId, MemberId, TaskId, UserId};
use taskboard_infra::config::WorkerConfig;
use taskboard_infra::document_store::{DocumentStore, FieldValue, Fields, Query, WriteBatch};
use taskboard_infra::notifications::InMemoryDispatcher;
use taskboard_infra::penalties::records;
use taskboard_tasks::{BoardMember, OverdueTask, TaskStatus};
use taskboard_worker::app::{connect_store, start, start_with_dispatcher, Worker};

fn board() -> BoardId {
    BoardId::new("b1").unwrap()
}

async fn seed(store: &Arc<dyn DocumentStore>) {
    let task = OverdueTask::new(TaskId::new("T1").unwrap())
        .with_board(board())
        .with_deadline(Utc::now() - ChronoDuration::days(1))
        .with_status(TaskStatus::InProgress)
        .with_penalty_points(5)
        .with_assigned_members(vec![MemberId::new("m1").unwrap()]);
    let member = BoardMember::new(board(), MemberId::new("m1").unwrap(), 10);

    let mut user = Fields::new();
    user.insert(records::FCM_TOKEN.into(), "device-token".into());

    let mut batch = WriteBatch::new();
    batch
        .set(records::task_path(&task.id).unwrap(), records::encode_task(&task))
        .set(
            records::member_path(&board(), &member.member_id).unwrap(),
            records::encode_member(&member),
        )
        .set(
            records::user_path(&UserId::from(member.member_id.clone())).unwrap(),
            user,
        );
    store.commit(batch).await.unwrap();
}

async fn wait_until(worker: &Worker, done: impl Fn(&Worker) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(worker) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn in_memory_store_without_database_url() {
    let config = WorkerConfig::default();
    assert!(config.database_url.is_none());

    let store = connect_store(&config).await.unwrap();
    assert!(store.query(&Query::collection("tasks")).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn worker_penalizes_on_startup_and_shuts_down_cleanly() {
    let config = WorkerConfig::default()
        .with_interval(Duration::from_secs(3600))
        .with_run_on_startup(true)
        .with_max_concurrent(2);
    let store = connect_store(&config).await.unwrap();
    seed(&store).await;

    let worker = start(&config, store.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;
    let stats = worker.scheduler_stats();
    worker.shutdown().await;

    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.runs_completed, 1);
    assert_eq!(stats.tasks_applied, 1);

    let task = store
        .get(&records::task_path(&TaskId::new("T1").unwrap()).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.get(records::PENALTY_APPLIED), Some(&FieldValue::Boolean(true)));

    let member = store
        .get(&records::member_path(&board(), &MemberId::new("m1").unwrap()).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.get(records::POINTS), Some(&FieldValue::Integer(5)));
}

#[tokio::test]
async fn adding_a_member_sends_a_notification() {
    let config = WorkerConfig::default();
    let store = connect_store(&config).await.unwrap();
    seed(&store).await;

    let dispatcher = Arc::new(InMemoryDispatcher::new());
    let worker = start_with_dispatcher(&config, store.clone(), dispatcher.clone());

    let mut user = Fields::new();
    user.insert(records::FCM_TOKEN.into(), "new-device".into());
    let newcomer = BoardMember::new(board(), MemberId::new("m2").unwrap(), 0);
    let mut batch = WriteBatch::new();
    batch
        .set(
            records::user_path(&UserId::from(newcomer.member_id.clone())).unwrap(),
            user,
        )
        .set(
            records::member_path(&board(), &newcomer.member_id).unwrap(),
            records::encode_member(&newcomer),
        );
    store.commit(batch).await.unwrap();

    wait_until(&worker, |w| w.notification_stats().sent == 1).await;

    // Updating an existing member is not an addition.
    worker.scheduler().trigger();
    wait_until(&worker, |w| w.scheduler_stats().runs_completed == 1).await;

    let stats = worker.notification_stats();
    worker.shutdown().await;

    assert_eq!(stats.members_added, 1);
    let sent = dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "new-device");
}

#[tokio::test]
async fn members_seeded_before_start_are_not_announced() {
    let config = WorkerConfig::default();
    let store = connect_store(&config).await.unwrap();
    seed(&store).await;

    let dispatcher = Arc::new(InMemoryDispatcher::new());
    let worker = start_with_dispatcher(&config, store.clone(), dispatcher.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = worker.notification_stats();
    worker.shutdown().await;

    assert_eq!(stats.members_added, 0);
    assert!(dispatcher.sent().is_empty());
}
