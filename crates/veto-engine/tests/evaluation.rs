//! End-to-end evaluation through the dispatcher.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use veto_engine::backends::InMemoryHost;
use veto_engine::config::EngineConfig;
use veto_engine::predicate::ChromeGlob;
use veto_engine::{
    BlockingResponse, ListenerSubscription, NoOpHost, RequestDetails, ResourceType,
    RuleDefinition, RuleError, Stage, WebRequestDispatcher,
};

fn rule(value: serde_json::Value) -> RuleDefinition {
    serde_json::from_value(value).unwrap()
}

fn listener(value: serde_json::Value) -> ListenerSubscription {
    serde_json::from_value(value).unwrap()
}

fn request(url: &str) -> RequestDetails {
    RequestDetails::parse(url).unwrap()
}

#[tokio::test]
async fn test_cancel_wins_over_later_redirect() {
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), Arc::new(NoOpHost));
    dispatcher
        .register_rule(&rule(json!({
            "id": "A",
            "registrant": "adblock",
            "conditions": [{"urlFilter": {"urlContains": "ads"}}],
            "actions": [{"type": "cancelRequest"}]
        })))
        .unwrap();
    dispatcher
        .register_rule(&rule(json!({
            "id": "B",
            "registrant": "adblock",
            "conditions": [{"urlFilter": {"urlContains": "ads"}}],
            "actions": [{"type": "redirectRequest", "redirectUrl": "https://safe.example"}]
        })))
        .unwrap();

    let report = dispatcher
        .evaluate_with_report(request("https://ads.example/x"))
        .await;
    assert!(report.response.is_cancelled());
    assert!(report.response.redirect_url().is_none());
    assert_eq!(report.matched_rules.len(), 1);
    assert!(report.cancelled_early);
}

#[test]
fn test_glob_subdomain_scenario() {
    let glob = ChromeGlob::compile("*://*.example.com/*").unwrap();
    assert!(glob.matches_str("https://sub.example.com/path"));
    assert!(!glob.matches_str("https://example.org/path"));
}

#[tokio::test]
async fn test_glob_rule_through_dispatcher() {
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), Arc::new(NoOpHost));
    dispatcher
        .register_rule(&rule(json!({
            "registrant": "ext",
            "conditions": [{"glob": "*://*.example.com/*"}],
            "actions": [{"type": "redirectToEmptyDocument"}]
        })))
        .unwrap();

    let hit = dispatcher
        .evaluate(request("https://sub.example.com/path"))
        .await;
    assert!(hit.synthetic().is_some());

    let miss = dispatcher.evaluate(request("https://example.org/path")).await;
    assert!(miss.is_passthrough());
}

#[tokio::test]
async fn test_malformed_glob_is_rejected_at_registration() {
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), Arc::new(NoOpHost));
    let err = dispatcher
        .register_rule(&rule(json!({
            "registrant": "ext",
            "conditions": [{"glob": "https://www.*.example.com/*"}],
            "actions": [{"type": "cancelRequest"}]
        })))
        .unwrap_err();
    assert!(matches!(err, RuleError::Pattern(_)));
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test]
async fn test_unregister_unknown_callback_is_noop() {
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), Arc::new(NoOpHost));
    dispatcher
        .register_rule(&rule(json!({
            "id": "keep",
            "registrant": "ext",
            "actions": [{"type": "cancelRequest"}]
        })))
        .unwrap();

    assert!(!dispatcher.unregister_rule(&"missing".into()));
    assert_eq!(dispatcher.registry().len(), 1);
    assert_eq!(
        dispatcher.unregister_all_for_registrant(&"nobody".into()),
        0
    );
}

#[tokio::test]
async fn test_evaluation_is_deterministic() {
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), Arc::new(NoOpHost));
    dispatcher
        .register_rules(&[
            rule(json!({
                "registrant": "a",
                "conditions": [{"urlFilter": {"pathPrefix": "/img"}}],
                "actions": [{"type": "redirectRequest", "redirectUrl": "https://cdn.example/1.png"}]
            })),
            rule(json!({
                "registrant": "b",
                "conditions": [{"responseState": {"redirected": true}}],
                "actions": [{"type": "redirectRequest", "redirectUrl": "https://cdn.example/2.png"}]
            })),
        ])
        .unwrap();

    let details = request("https://site.example/img/logo.png");
    let first = dispatcher.evaluate(details.clone()).await;
    let second = dispatcher.evaluate(details).await;
    assert_eq!(first, second);
    assert_eq!(first.redirect_url(), Some("https://cdn.example/2.png"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_evaluations_do_not_interfere() {
    let host = Arc::new(InMemoryHost::new());
    host.respond_after(
        "headers",
        Some(json!({"responseHeaders": [{"name": "X-Filtered", "value": "1"}]})),
        Duration::from_millis(20),
    );
    let dispatcher = Arc::new(WebRequestDispatcher::new(EngineConfig::default(), host));

    dispatcher
        .register_rule(&rule(json!({
            "registrant": "ext",
            "conditions": [{"urlFilter": {"hostEquals": "redirect.example"}}],
            "actions": [{"type": "redirectRequest", "redirectUrl": "https://safe.example/"}]
        })))
        .unwrap();
    dispatcher
        .add_listener(&listener(json!({
            "registrant": "ext",
            "stage": "onHeadersReceived",
            "callbackId": "headers",
            "filter": {"urls": ["*://headers.example/*"]},
            "extraInfo": ["blocking", "responseHeaders"]
        })))
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                let response = dispatcher
                    .on_headers_received(request(&format!("https://headers.example/{i}")))
                    .await;
                (i, response)
            } else {
                let response = dispatcher
                    .on_headers_received(request(&format!("https://redirect.example/{i}")))
                    .await;
                (i, response)
            }
        }));
    }

    for result in futures::future::join_all(handles).await {
        let (i, response) = result.unwrap();
        if i % 2 == 0 {
            assert!(response.redirect_url().is_none());
            assert_eq!(
                response.response_headers().unwrap().get("x-filtered"),
                Some("1")
            );
        } else {
            assert_eq!(response.redirect_url(), Some("https://safe.example/"));
            assert!(response.response_headers().is_none());
        }
    }
}

#[tokio::test]
async fn test_removal_does_not_affect_running_evaluation() {
    let host = Arc::new(InMemoryHost::new());
    host.respond_after("gate", None, Duration::from_millis(50));
    let dispatcher = Arc::new(WebRequestDispatcher::new(EngineConfig::default(), host));

    dispatcher
        .add_listener(&listener(json!({
            "registrant": "ext",
            "stage": "onBeforeRequest",
            "callbackId": "gate",
            "extraInfo": ["blocking"]
        })))
        .unwrap();
    dispatcher
        .register_rule(&rule(json!({
            "id": "block",
            "registrant": "ext",
            "actions": [{"type": "cancelRequest"}]
        })))
        .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<BlockingResponse>();
    let handle = dispatcher.evaluate_detached(
        request("https://a.example/").with_stage(Stage::OnBeforeRequest),
        move |response| {
            let _ = tx.send(response);
        },
    );

    // The evaluation is parked in the listener round-trip by now
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dispatcher.unregister_all_for_registrant(&"ext".into()), 2);

    handle.await.unwrap();
    let response = rx.await.unwrap();
    assert!(response.is_cancelled());

    // New evaluations see the removal
    let later = dispatcher.on_before_request(request("https://a.example/")).await;
    assert!(later.is_passthrough());
}

#[tokio::test]
async fn test_disabled_registrant_rules_do_not_fire() {
    let host = Arc::new(InMemoryHost::new());
    let dispatcher = WebRequestDispatcher::new(EngineConfig::default(), host.clone());
    dispatcher
        .register_rule(&rule(json!({
            "registrant": "ext",
            "actions": [{"type": "cancelRequest"}]
        })))
        .unwrap();

    host.disable("ext");
    let report = dispatcher
        .evaluate_with_report(request("https://a.example/"))
        .await;
    assert!(report.response.is_passthrough());
    assert_eq!(report.skipped_rules.len(), 1);

    host.enable(&"ext".into());
    assert!(dispatcher
        .evaluate(request("https://a.example/"))
        .await
        .is_cancelled());
}

#[tokio::test]
async fn test_unresponsive_listener_times_out() {
    let host = Arc::new(InMemoryHost::new());
    host.respond_after("stuck", Some(json!({"cancel": true})), Duration::from_secs(30));
    let config = EngineConfig {
        action_timeout_ms: 20,
        evaluation_timeout_ms: None,
    };
    let dispatcher = WebRequestDispatcher::new(config, host);
    dispatcher
        .add_listener(&listener(json!({
            "registrant": "ext",
            "stage": "onBeforeRequest",
            "callbackId": "stuck",
            "extraInfo": ["blocking"]
        })))
        .unwrap();
    dispatcher
        .register_rule(&rule(json!({
            "registrant": "ext",
            "actions": [{"type": "redirectRequest", "redirectUrl": "https://safe.example/"}]
        })))
        .unwrap();

    let report = dispatcher
        .evaluate_with_report(request("https://a.example/").with_resource_type(ResourceType::Image))
        .await;
    assert_eq!(report.action_failures, 1);
    assert!(!report.response.is_cancelled());
    assert_eq!(report.response.redirect_url(), Some("https://safe.example/"));
}
