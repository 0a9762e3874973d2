mod common;

use std::sync::Arc;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};

use coderun::http_server::router;
use coderun::{AppState, CodeAssistant};
use common::{cat_runner, FakeGateway};

async fn spawn_server(gateway: &Arc<FakeGateway>) -> String {
    let state = AppState::new(gateway.clone(), CodeAssistant::disabled());
    let app = router(state, 1024 * 1024);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn file_part(name: &str, contents: &[u8]) -> Part {
    Part::bytes(contents.to_vec()).file_name(name.to_string())
}

async fn post_form(base: &str, form: Form) -> Value {
    let response = reqwest::Client::new()
        .post(format!("{}/execute", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

#[tokio::test]
async fn index_lists_supported_languages() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let body: Value = reqwest::get(format!("{}/", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({ "supportedLanguages": ["typescript", "javascript", "python"] })
    );

    let health = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn execute_with_file_then_cleanup() {
    let gateway = FakeGateway::new()
        .with_runner(cat_runner("/workspace/data.csv"))
        .into_arc();
    let base = spawn_server(&gateway).await;

    let form = Form::new()
        .text("language", "python")
        .text("code", "print(open('/workspace/data.csv').read())")
        .part("files", file_part("data.csv", b"x,y\n"));
    let body = post_form(&base, form).await;

    assert_eq!(body["result"]["success"], json!(true));
    assert_eq!(body["result"]["exitCode"], json!(0));
    assert_eq!(body["result"]["output"], json!("x,y\n"));
    assert_eq!(body["uploadedFiles"], json!(["/workspace/data.csv"]));
    let id = body["sessionId"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let summary: Value = client
        .get(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["id"], json!(id));
    assert_eq!(summary["language"], json!("python"));

    let listed: Value = client
        .get(format!("{}/sessions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let cleanup: Value = client
        .post(format!("{}/cleanup", base))
        .json(&json!({ "sessionId": id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        cleanup,
        json!({ "success": true, "found": true, "message": "Workspace cleaned up successfully" })
    );

    let missing = client
        .get(format!("{}/sessions/{}", base, id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(gateway.removes(), 1);
}

#[tokio::test]
async fn session_id_field_reuses_session() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let first = post_form(
        &base,
        Form::new().text("language", "javascript").text("code", "1"),
    )
    .await;
    let id = first["sessionId"].as_str().unwrap().to_string();

    let second = post_form(
        &base,
        Form::new()
            .text("sessionId", id.clone())
            .text("language", "python")
            .text("code", "2"),
    )
    .await;

    assert_eq!(second["sessionId"], json!(id));
    assert_eq!(second["result"]["output"], json!("2"));
    assert_eq!(gateway.creates(), 1);
}

#[tokio::test]
async fn missing_language_defaults_to_typescript() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let body = post_form(&base, Form::new().text("code", "console.log(1)")).await;

    let id = body["sessionId"].as_str().unwrap();
    let summary: Value = reqwest::get(format!("{}/sessions/{}", base, id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["language"], json!("typescript"));
}

#[tokio::test]
async fn unsupported_language_is_a_failed_result() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let body = post_form(
        &base,
        Form::new().text("language", "ruby").text("code", "puts 1"),
    )
    .await;

    assert_eq!(body["result"]["success"], json!(false));
    assert_eq!(body["result"]["exitCode"], json!(1));
    assert!(body["result"]["output"]
        .as_str()
        .unwrap()
        .contains("Language ruby is not supported"));
    assert_eq!(body["sessionId"], Value::Null);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn too_many_files_are_rejected_before_provisioning() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let mut form = Form::new().text("language", "python").text("code", "1");
    for i in 0..6 {
        form = form.part("files", file_part(&format!("f{i}.txt"), b"x"));
    }
    let body = post_form(&base, form).await;

    assert_eq!(body["result"]["success"], json!(false));
    assert!(body["result"]["output"]
        .as_str()
        .unwrap()
        .contains("at most 5 files"));
    assert_eq!(body["uploadedFiles"], json!([]));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn non_multipart_execute_is_a_failed_result() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let response = reqwest::Client::new()
        .post(format!("{}/execute", base))
        .json(&json!({ "language": "python", "code": "1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["success"], json!(false));
    assert_eq!(body["result"]["exitCode"], json!(1));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn analyze_without_api_key_reports_not_configured() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/analyze-code", base))
        .json(&json!({ "code": "print(1)", "language": "python", "action": "explain" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body,
        json!({
            "success": false,
            "message": "Anthropic API key not configured. Set ANTHROPIC_API_KEY in your environment."
        })
    );
}

#[tokio::test]
async fn cleanup_unknown_session_is_not_found() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/cleanup", base))
        .json(&json!({ "sessionId": "session-0-00000000" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        body,
        json!({ "success": false, "found": false, "message": "No workspace found with that session ID" })
    );
}

#[tokio::test]
async fn delete_session_then_delete_again() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;
    let body = post_form(
        &base,
        Form::new().text("language", "python").text("code", "1"),
    )
    .await;
    let id = body["sessionId"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    let url = format!("{}/sessions/{}", base, id);
    let first = client.delete(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::NO_CONTENT);
    let second = client.delete(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    assert_eq!(gateway.removes(), 1);
}

#[tokio::test]
async fn cleanup_accepts_url_encoded_form() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;
    let body = post_form(
        &base,
        Form::new().text("language", "python").text("code", "1"),
    )
    .await;
    let id = body["sessionId"].as_str().unwrap().to_string();

    let response = reqwest::Client::new()
        .post(format!("{}/cleanup", base))
        .form(&[("sessionId", id.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cleanup: Value = response.json().await.unwrap();
    assert_eq!(cleanup["found"], json!(true));
    assert_eq!(gateway.removes(), 1);
}

#[tokio::test]
async fn malformed_cleanup_body_is_a_failed_result() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;
    let client = reqwest::Client::new();

    let broken = client
        .post(format!("{}/cleanup", base))
        .header("content-type", "application/json")
        .body("{bad")
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), StatusCode::OK);
    let body: Value = broken.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["found"], json!(false));
    assert!(body["message"].as_str().unwrap().starts_with("Invalid request: "));

    let untyped = client
        .post(format!("{}/cleanup", base))
        .body("sessionId=abc")
        .send()
        .await
        .unwrap();
    assert_eq!(untyped.status(), StatusCode::OK);
    let body: Value = untyped.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn analyze_accepts_form_and_reports_bad_json() {
    let gateway = FakeGateway::new().into_arc();
    let base = spawn_server(&gateway).await;
    let client = reqwest::Client::new();

    let form: Value = client
        .post(format!("{}/analyze-code", base))
        .form(&[("code", "print(1)"), ("language", "python"), ("action", "explain")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(form["success"], json!(false));
    assert!(form["message"]
        .as_str()
        .unwrap()
        .starts_with("Anthropic API key not configured"));

    let broken = client
        .post(format!("{}/analyze-code", base))
        .header("content-type", "application/json")
        .body("{\"code\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(broken.status(), StatusCode::OK);
    let body: Value = broken.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].as_str().unwrap().starts_with("Invalid request: "));
    assert!(body.get("result").is_none());
}
