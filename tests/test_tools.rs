use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use loki_mcp::client::LokiClient;
use loki_mcp::config::LokiConfig;
use loki_mcp::error::LokiError;
use loki_mcp::tools::{
    LabelsParams, LabelsResultType, LokiTools, QueryParams, SeriesParams, StatsParams,
};

fn tools_for(url: String) -> LokiTools {
    let client = LokiClient::new(&LokiConfig {
        url,
        ..Default::default()
    })
    .unwrap();
    LokiTools::new(client)
}

#[tokio::test]
async fn query_applies_defaults_and_formats_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .and(query_param("limit", "100"))
        .and(query_param("direction", "backward"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [{
                    "stream": {"app": "test"},
                    "values": [["1609459200000000000", "test log line"]]
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .query(QueryParams {
            query: "{app=\"test\"}".into(),
            limit: -5,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(result.result_type, "streams");
    assert_eq!(result.count, 1);
    assert!(result.output.contains("Stream: {\"app\":\"test\"}"));
    assert!(result.output.contains("1609459200000000000 | test log line"));

    let requests = server.received_requests().await.unwrap();
    let url = &requests[0].url;
    let param = |key: &str| {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    };
    let start: i64 = param("start").parse().unwrap();
    let end: i64 = param("end").parse().unwrap();
    assert_eq!(end - start, 3_600_000_000_000);
}

#[tokio::test]
async fn query_passes_explicit_options() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .and(query_param("limit", "5"))
        .and(query_param("direction", "forward"))
        .and(query_param("start", "1704067200000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "streams", "result": []}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .query(QueryParams {
            query: "{app=\"test\"}".into(),
            start: "2024-01-01T00:00:00Z".into(),
            end: "now".into(),
            limit: 5,
            direction: "forward".into(),
        })
        .await
        .unwrap();
    assert_eq!(result.count, 0);
    assert_eq!(result.output, "No results found.");
}

#[tokio::test]
async fn query_backend_error_keeps_taxonomy_under_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error at line 1"
        })))
        .mount(&server)
        .await;

    let err = tools_for(server.uri())
        .query(QueryParams {
            query: "{bad".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("query failed: "));
    assert!(matches!(err.root(), LokiError::BackendApi { error_type, .. } if error_type == "bad_data"));
}

#[tokio::test]
async fn query_with_empty_string_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = tools_for(server.uri())
        .query(QueryParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LokiError::QueryRequired));
}

#[tokio::test]
async fn labels_without_name_lists_names() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": ["app", "env"]
        })))
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .labels(LabelsParams::default())
        .await
        .unwrap();
    assert_eq!(result.kind, LabelsResultType::LabelNames);
    assert_eq!(result.count, 2);
    assert_eq!(result.labels, vec!["app", "env"]);
    assert_eq!(result.output, "Found 2 label names:\n  - app\n  - env\n");
}

#[tokio::test]
async fn labels_with_name_lists_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/label/app/values"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": []
        })))
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .labels(LabelsParams {
            name: Some("app".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.kind, LabelsResultType::LabelValues);
    assert_eq!(result.count, 0);
    assert_eq!(result.output, "No labels found.");

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["type"], "label_values");
}

#[tokio::test]
async fn series_requires_matchers_and_formats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": [{"app": "nginx"}]
        })))
        .mount(&server)
        .await;

    let tools = tools_for(server.uri());
    let err = tools.series(SeriesParams::default()).await.unwrap_err();
    assert!(matches!(err, LokiError::MatchRequired));

    let result = tools
        .series(SeriesParams {
            matchers: vec!["{app=\"nginx\"}".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(result.output, "Found 1 series:\n  1. {\"app\":\"nginx\"}\n");
}

#[tokio::test]
async fn stats_formats_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/index/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"streams": 3, "chunks": 7, "bytes": 5000000, "entries": 42}
        })))
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .stats(StatsParams {
            query: "{app=\"nginx\"}".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.bytes, 5_000_000);
    assert!(result.output.contains("Bytes: 4.77 MB"));
}

#[tokio::test]
async fn ready_never_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ready"))
        .mount(&server)
        .await;

    let ready = tools_for(server.uri()).ready().await;
    assert!(ready.ready);
    assert_eq!(ready.message, "Loki is ready");

    let down = tools_for("http://127.0.0.1:9".into()).ready().await;
    assert!(!down.ready);
    assert!(!down.message.is_empty());
}

#[tokio::test]
async fn ready_reports_non_2xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(503).set_body_string("not ready"))
        .mount(&server)
        .await;

    let ready = tools_for(server.uri()).ready().await;
    assert!(!ready.ready);
    assert!(ready.message.contains("503"));
}

#[tokio::test]
async fn config_tool_wraps_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let err = tools_for(server.uri()).config().await.unwrap_err();
    assert!(err.to_string().starts_with("failed to get config"));
}

#[tokio::test]
async fn call_dispatches_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string("auth_enabled: false\n"))
        .mount(&server)
        .await;

    let value = tools_for(server.uri())
        .call("loki_config", serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(value, json!({"config": "auth_enabled: false\n"}));
}

#[tokio::test]
async fn query_skips_malformed_value_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {
                        "stream": {"app": "test"},
                        "values": [["1", "ok"], "garbage", ["2", "ok2"]]
                    },
                    {"stream": {"app": "empty"}, "values": null}
                ]
            }
        })))
        .mount(&server)
        .await;

    let result = tools_for(server.uri())
        .query(QueryParams {
            query: "{app=~\".+\"}".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(result.count, 2);
    assert!(result.output.contains("  1 | ok\n  2 | ok2\n"));
    assert!(!result.output.contains("garbage"));
    assert!(result.output.contains("Stream: {\"app\":\"empty\"}\n\n"));
}

#[tokio::test]
async fn null_data_is_treated_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": null
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/series"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": null
        })))
        .mount(&server)
        .await;

    let tools = tools_for(server.uri());
    let labels = tools.labels(LabelsParams::default()).await.unwrap();
    assert_eq!(labels.count, 0);
    assert_eq!(labels.output, "No labels found.");

    let series = tools
        .series(SeriesParams {
            matchers: vec!["{app=\"nginx\"}".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(series.count, 0);
    assert_eq!(series.output, "No series found.");
}
