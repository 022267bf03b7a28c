//! Reloading onto TLS keeps the same listening socket.

mod common;

use std::time::Duration;

use api_server::lifecycle::Supervisor;
use common::{fixture, images_app, local_config, InertHost, RunningServer, SharedSource};
use reqwest::StatusCode;

fn tls_client(addr: std::net::SocketAddr) -> reqwest::Client {
    let ca = std::fs::read(fixture("ca.crt")).unwrap();
    reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca).unwrap())
        .resolve("localhost", addr)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_reload_wraps_existing_socket_in_tls() {
    let source = SharedSource::new(local_config());
    let mut supervisor = Supervisor::new(source.clone(), InertHost, images_app()).unwrap();
    supervisor.start().unwrap();

    let addr = supervisor.local_addr().unwrap();
    let id = supervisor.socket().unwrap().id();
    assert!(!supervisor.socket().unwrap().is_tls());

    let mut tls = local_config();
    tls.server.cert_file = Some(fixture("server.crt"));
    tls.server.key_file = Some(fixture("server.key"));
    source.set(tls);
    supervisor.reload().unwrap();

    let socket = supervisor.socket().unwrap();
    assert!(socket.is_tls());
    assert_eq!(socket.id(), id);
    assert_eq!(socket.local_addr(), addr);

    let server = RunningServer::spawn(supervisor);

    let response = tls_client(addr)
        .get(format!("https://localhost:{}/images", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let plain = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
        .get(server.url("/images"))
        .send()
        .await;
    assert!(plain.is_err());

    server.stop();
}

#[tokio::test]
async fn test_invalid_reload_keeps_serving() {
    let source = SharedSource::new(local_config());
    let mut supervisor = Supervisor::new(source.clone(), InertHost, images_app()).unwrap();
    supervisor.start().unwrap();
    let addr = supervisor.local_addr().unwrap();

    let mut broken = local_config();
    broken.server.cert_file = Some(fixture("server.crt"));
    source.set(broken);
    supervisor.reload().unwrap();
    assert_eq!(supervisor.local_addr(), Some(addr));
    assert!(!supervisor.socket().unwrap().is_tls());
    assert_eq!(supervisor.config(), &local_config());

    let server = RunningServer::spawn(supervisor);
    let response = reqwest::get(server.url("/images")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    server.stop();
}
