//! Admin API over a real socket.

use reqwest::StatusCode;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use health_guard::admin::{self, AdminState};
use health_guard::health::{DependencyType, HealthChecker, ServiceDependency};
use health_guard::lifecycle::Shutdown;
use health_guard::resilience::CircuitState;

mod common;
use common::{manual_config, ScriptedProbe, Step};

const KEY: &str = "test-admin-key";

async fn start(checker: HealthChecker, shutdown: &Shutdown) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(admin::serve(AdminState::new(checker, KEY), listener, shutdown.clone()));
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Value) {
    let res = client()
        .get(format!("http://{}{}", addr, path))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body = res.json().await.unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_admin_api_reports_outage() {
    let checker = HealthChecker::new(manual_config());
    checker.set_probe(DependencyType::Api, ScriptedProbe::new([Step::Fail]));
    checker
        .register_service(ServiceDependency::new("patient-service", DependencyType::Api, "http://patients").critical())
        .unwrap();
    for _ in 0..3 {
        checker.check_now("patient-service").await.unwrap();
    }

    let shutdown = Shutdown::new();
    let addr = start(checker.clone(), &shutdown).await;

    let unauthorized = client()
        .get(format!("http://{}/admin/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = get(addr, "/admin/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["overall"], "UNHEALTHY");
    assert_eq!(body["healthcare_compliance"], false);

    let (status, body) = get(addr, "/admin/services/patient-service").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dependency"]["type"], "api");
    assert_eq!(body["health"]["consecutive_failures"], 3);

    let (status, _) = get(addr, "/admin/services/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get(addr, "/admin/incidents").await;
    assert_eq!(body.as_array().unwrap().len(), 4);
    let (_, body) = get(addr, "/admin/incidents?since=9999999999999").await;
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = get(addr, "/admin/breakers").await;
    assert_eq!(body[0]["name"], "patient-service");
    assert_eq!(body[0]["metrics"]["state"], "OPEN");

    let reset = client()
        .post(format!("http://{}/admin/breakers/patient-service/reset", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    assert_eq!(checker.breaker("patient-service").unwrap().state(), CircuitState::Closed);

    let missing = client()
        .post(format!("http://{}/admin/breakers/nope/reset", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
}

#[tokio::test]
async fn test_admin_health_ok_when_empty() {
    let shutdown = Shutdown::new();
    let addr = start(HealthChecker::new(manual_config()), &shutdown).await;

    let (status, body) = get(addr, "/admin/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall"], "HEALTHY");
    assert_eq!(body["average_uptime"], 100.0);

    let (status, body) = get(addr, "/admin/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");

    shutdown.trigger();
}
