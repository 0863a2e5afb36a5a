//! Shared test utilities for mvirt-cache integration tests.

#![allow(dead_code)]

use mvirt_cache::provider::InventoryResource;
use mvirt_cache::resource::{Capacity, Instance, LoadBalancer, SecurityGroup, ServerGroup};
use mvirt_cache::rest::{AppState, create_router};
use mvirt_cache::{
    Agent, AgentScope, CacheAuditLogger, CacheStore, CachingAgent, CachingConfig, DefaultNamer,
    FixtureCloud, Keys, MemoryStore, Namespace, OnDemandDispatcher,
};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const ACCOUNT: &str = "prod";
pub const REGION: &str = "eu-1";

/// Cloud, store and agent factory for one scope.
pub struct Harness {
    pub scope: AgentScope,
    pub cloud: Arc<FixtureCloud>,
    pub store: Arc<MemoryStore>,
    pub keys: Keys,
    pub config: Arc<CachingConfig>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            scope: AgentScope::new(ACCOUNT, REGION),
            cloud: Arc::new(FixtureCloud::default()),
            store: Arc::new(MemoryStore::new()),
            keys: Keys::new("mvirt", Arc::new(DefaultNamer)),
            config: Arc::new(CachingConfig::default()),
        }
    }

    pub fn agent<R: InventoryResource>(&self) -> CachingAgent<R> {
        self.agent_in(self.scope.clone())
    }

    pub fn agent_in<R: InventoryResource>(&self, scope: AgentScope) -> CachingAgent<R> {
        CachingAgent::<R>::new(
            scope,
            self.config.clone(),
            self.keys.clone(),
            self.cloud.clone(),
            self.store.clone(),
            Arc::new(CacheAuditLogger::new("test")),
        )
    }

    pub fn all_agents(&self) -> Vec<Arc<dyn Agent>> {
        vec![
            Arc::new(self.agent::<ServerGroup>()) as Arc<dyn Agent>,
            Arc::new(self.agent::<LoadBalancer>()) as Arc<dyn Agent>,
            Arc::new(self.agent::<SecurityGroup>()) as Arc<dyn Agent>,
        ]
    }

    pub fn key(&self, namespace: Namespace, name: &str) -> String {
        self.keys.regional(namespace, ACCOUNT, REGION, name)
    }

    pub async fn upsert<R: InventoryResource>(&self, resource: R) {
        self.cloud.upsert(&self.scope, resource).await;
    }

    /// Overwrite the `cacheTime` of a stored envelope, as if it had been
    /// taken at another moment.
    pub async fn set_cache_time(&self, source: &str, key: &str, cache_time: i64) {
        let mut record = self
            .store
            .get(Namespace::OnDemand, key)
            .await
            .unwrap()
            .expect("envelope present");
        record
            .attributes
            .insert("cacheTime".into(), json!(cache_time));
        self.store
            .put_cache_data(Namespace::OnDemand, source, &[record])
            .await
            .unwrap();
    }
}

pub fn server_group(name: &str, min: u32, max: u32) -> ServerGroup {
    ServerGroup {
        name: name.into(),
        capacity: Capacity {
            min,
            max,
            desired: min,
        },
        zones: vec!["eu-1a".into()],
        image_id: Some("img-1".into()),
        instance_type: Some("m1.small".into()),
        instances: vec![],
        load_balancers: vec![],
        security_groups: vec![],
        disabled: false,
        created_time: Some(1_700_000_000_000),
    }
}

pub fn instance(id: &str) -> Instance {
    Instance {
        id: id.into(),
        zone: Some("eu-1a".into()),
        private_ip: None,
        health_state: Some("Up".into()),
        launch_time: None,
    }
}

pub fn load_balancer(name: &str) -> LoadBalancer {
    LoadBalancer {
        name: name.into(),
        dns_name: Some(format!("{}.lb.example.net", name)),
        listeners: vec![],
        network_id: Some("net-1".into()),
        subnets: vec!["subnet-a".into()],
        created_time: None,
    }
}

/// Trigger parameters as an atomic operation would send them.
pub fn params(name_param: &str, name: &str) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("account".into(), json!(ACCOUNT));
    params.insert("region".into(), json!(REGION));
    params.insert(name_param.into(), json!(name));
    params
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Let the clock move past the last recorded millisecond.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// REST server over a [`Harness`] with every agent registered.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub harness: Harness,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let harness = Harness::new();
        let app_state = Arc::new(AppState {
            store: harness.store.clone(),
            dispatcher: Arc::new(OnDemandDispatcher::new(harness.all_agents())),
        });
        let router = create_router(app_state);

        // Port 0 lets the OS choose
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
        let actual_addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr: actual_addr,
            client: Client::new(),
            harness,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn get_query(&self, path: &str, query: &[(&str, &str)]) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .query(query)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}
