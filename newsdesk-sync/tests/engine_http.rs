//! End-to-end engine flows against a canned HTTP service.

use std::time::Duration;

use chrono::NaiveDate;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

use newsdesk_core::{NewsId, NewsQuery, NewsdeskConfig, WorkStatus};
use newsdesk_sync::{FetchOutcome, SyncEngine, SyncError};

const WAIT: Duration = Duration::from_secs(5);

fn query() -> NewsQuery {
    NewsQuery::new(NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"), "")
}

async fn serve_records(server: &mut ServerGuard) {
    server
        .mock("GET", "/api/news")
        .match_query(Matcher::UrlEncoded("date".into(), "2024-05-01".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "success": true,
                "data": [
                    {"news_id": "A1", "title": "budget vote", "status": "미진행"},
                    {"news_id": "B2", "title": "storm warning", "status": "작업중"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
}

fn engine_for(server: &ServerGuard) -> SyncEngine {
    let config = NewsdeskConfig {
        reconnect_delay_secs: 60,
        ..NewsdeskConfig::default()
    }
    .with_base_url(server.url());
    SyncEngine::from_config(&config).expect("engine")
}

fn status(engine: &SyncEngine, id: &str) -> Option<WorkStatus> {
    engine.get(&NewsId::from(id)).map(|item| item.status)
}

#[tokio::test]
async fn rejected_status_change_rolls_back() {
    let mut server = Server::new_async().await;
    serve_records(&mut server).await;
    let write = server
        .mock("POST", "/api/news/status")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success":false,"message":"뉴스 ID와 상태 정보가 필요합니다."}"#)
        .create_async()
        .await;

    let engine = engine_for(&server);
    assert_eq!(
        engine.refetch(query()).await.expect("fetch"),
        FetchOutcome::Applied { count: 2 }
    );

    let err = engine
        .set_status(&NewsId::from("A1"), WorkStatus::InProgress)
        .await
        .unwrap_err();
    write.assert_async().await;
    assert!(matches!(err, SyncError::ServerRejected { .. }));
    assert_eq!(status(&engine, "A1"), Some(WorkStatus::Pending));
}

#[tokio::test]
async fn accepted_status_change_sticks() {
    let mut server = Server::new_async().await;
    serve_records(&mut server).await;
    server
        .mock("POST", "/api/news/status")
        .match_body(Matcher::PartialJson(json!({"news_id": "B2"})))
        .with_status(200)
        .with_body(r#"{"success":true}"#)
        .create_async()
        .await;

    let engine = engine_for(&server);
    engine.refetch(query()).await.expect("fetch");
    engine
        .set_status(&NewsId::from("B2"), WorkStatus::InProgress.next())
        .await
        .expect("set");
    assert_eq!(status(&engine, "B2"), Some(WorkStatus::Completed));
}

#[tokio::test]
async fn push_stream_updates_running_engine() {
    let mut server = Server::new_async().await;
    serve_records(&mut server).await;
    server
        .mock("GET", "/api/events")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"type\":\"status_change\",\"data\":{\"news_id\":\"A1\",\"status\":\"작업완료\"}}\n",
            "data: {\"type\":\"ai_content_generated\",\"data\":{\"news_id\":\"B2\",\"ai_content\":\"summary\"}}\n",
        ))
        .create_async()
        .await;

    let engine = engine_for(&server);
    engine.refetch(query()).await.expect("fetch");
    let mut changes = engine.subscribe();
    engine.start();

    tokio::time::timeout(WAIT, async {
        while !(status(&engine, "A1") == Some(WorkStatus::Completed)
            && engine
                .get(&NewsId::from("B2"))
                .is_some_and(|item| item.has_generated_content()))
        {
            assert!(changes.changed().await, "store dropped");
        }
    })
    .await
    .expect("push events applied");

    engine.shutdown().await.expect("shutdown");
}
