//! Consul catalog to ServiceEntry, end to end against a mock catalog.

use std::sync::Arc;
use std::time::Duration;

use meshsync_common::constants::SYNCER_LABEL;
use meshsync_common::{RegistryConfig, RegistryKind, ShutdownSignal, SyncerConfig};
use meshsync_consul::{ConsulWatcher, ConsulWatcherConfig, RefreshOutcome};
use meshsync_mesh::ownership::owner_reference;
use meshsync_mesh::{
    InMemoryMeshApi, MeshApi, Owner, OwnershipModel, Port, RegistryWatcher, Resolution,
    Synchronizer, SynchronizerConfig,
};
use meshsync_server::App;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_catalog(server: &MockServer, index: u64, services: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1/catalog/services"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Consul-Index", index.to_string().as_str())
                .set_body_json(services),
        )
        .mount(server)
        .await;
}

async fn mount_orders(server: &MockServer) {
    mount_catalog(server, 1, json!({"orders": ["v1"]})).await;
    Mock::given(method("GET"))
        .and(path("/v1/catalog/service/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Address": "192.168.0.1", "ServiceAddress": "10.0.0.1", "ServicePort": 8080},
            {"Address": "192.168.0.2", "ServiceAddress": "10.0.0.2", "ServicePort": 8080}
        ])))
        .mount(server)
        .await;
}

fn in_memory_api(model: &Arc<OwnershipModel>) -> Arc<InMemoryMeshApi> {
    Arc::new(
        InMemoryMeshApi::new()
            .with_namespaces(["default"])
            .with_handler(model.clone()),
    )
}

#[tokio::test]
async fn test_catalog_changes_reach_the_mesh() {
    let server = MockServer::start().await;
    mount_orders(&server).await;

    let registry = RegistryConfig::new(RegistryKind::Consul, server.uri()).with_prefix("svc-");
    let watcher = ConsulWatcher::new(
        &registry,
        "default",
        ConsulWatcherConfig {
            tick: Duration::from_millis(50),
            wait: Duration::from_millis(100),
            token: None,
        },
    )
    .unwrap();

    let model = Arc::new(OwnershipModel::new(owner_reference(None)));
    let api = in_memory_api(&model);
    let cache = watcher.cache().unwrap();
    let synchronizer = Synchronizer::new(
        SynchronizerConfig::new("default", RegistryKind::Consul).with_prefix(watcher.prefix()),
        model.clone(),
        cache.clone(),
        api.clone(),
    );

    assert_eq!(watcher.refresh().await.unwrap(), RefreshOutcome::Refreshed(1));
    let hosts = cache.hosts();
    assert_eq!(hosts["svc-orders"].len(), 2);

    let report = synchronizer.sync().await;
    assert_eq!(report.created, 1);

    let entry = api.get("default", "svc-orders").await.unwrap().unwrap();
    assert_eq!(entry.spec.hosts, vec!["svc-orders".to_string()]);
    assert_eq!(entry.spec.resolution, Resolution::Static);
    assert_eq!(
        entry.spec.ports,
        vec![Port {
            number: 8080,
            protocol: "TCP".to_string(),
            name: "tcp".to_string(),
            target_port: None,
        }]
    );
    assert_eq!(entry.label(SYNCER_LABEL), Some("consul"));
    assert_eq!(model.classify("svc-orders"), Owner::Us);

    // The service disappears from the catalog.
    server.reset().await;
    mount_catalog(&server, 2, json!({})).await;

    assert_eq!(watcher.refresh().await.unwrap(), RefreshOutcome::Refreshed(0));
    let report = synchronizer.sync().await;
    assert_eq!(report.deleted, 1);
    assert!(api.entries().is_empty());
    assert_eq!(model.classify("svc-orders"), Owner::None);
}

#[tokio::test]
async fn test_dry_run_app_publishes_catalog() {
    let server = MockServer::start().await;
    mount_orders(&server).await;

    let config = SyncerConfig {
        mesh_id: "mesh-1".to_string(),
        namespace: "mesh-external".to_string(),
        dry_run: true,
        sync_interval_secs: 1,
        consul_poll_interval_secs: 1,
        consul_wait_secs: 1,
        registries: vec![RegistryConfig::new(RegistryKind::Consul, server.uri()).with_prefix("svc-")],
        ..Default::default()
    };
    let model = Arc::new(OwnershipModel::new(owner_reference(None)));
    let api = Arc::new(InMemoryMeshApi::new().with_handler(model.clone()));
    let app = App::with_api(config, model.clone(), api.clone());

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        signal.shutdown();
    });

    tokio::time::timeout(Duration::from_secs(15), app.run(shutdown))
        .await
        .unwrap()
        .unwrap();

    assert!(api.has_namespace("mesh-external"));
    let entry = api.get("mesh-external", "svc-orders").await.unwrap().unwrap();
    assert_eq!(entry.spec.endpoints.len(), 2);
    assert_eq!(model.classify("svc-orders"), Owner::Us);
}
