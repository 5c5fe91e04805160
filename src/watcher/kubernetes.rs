//! ConfigMap watch backed by the Kubernetes API.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client, ResourceExt};

use super::{FragmentSource, WatchError};
use crate::config::SourceConfig;
use crate::fragment::{Fragment, FragmentId};
use crate::store::FragmentStore;

const SOURCE_NAME: &str = "kubernetes";

/// Watches ConfigMaps cluster-wide, or in one namespace.
pub struct KubeSource {
    api: Api<ConfigMap>,
    watch_config: watcher::Config,
}

impl KubeSource {
    /// Connect with ambient credentials (in-cluster service account or the
    /// local kubeconfig) and check that the API server answers.
    pub async fn connect(config: &SourceConfig) -> Result<Self, WatchError> {
        let client = Client::try_default().await?;
        let version = client.apiserver_version().await?;
        crate::log_event!(
            "watch",
            "connected",
            "kubernetes {}.{}",
            version.major,
            version.minor
        );

        let api = match &config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        let mut watch_config = watcher::Config::default();
        if let Some(selector) = &config.label_selector {
            watch_config = watch_config.labels(selector);
        }

        Ok(Self { api, watch_config })
    }
}

#[async_trait]
impl FragmentSource for KubeSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn run(self: Box<Self>, store: Arc<FragmentStore>) -> Result<(), WatchError> {
        let KubeSource { api, watch_config } = *self;
        let mut events = watcher::watcher(api, watch_config)
            .default_backoff()
            .boxed();

        // Objects of an in-progress relist, applied all at once on InitDone
        let mut relist: Option<Vec<Fragment>> = None;

        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Init) => {
                    crate::debug_event!("watch", "relist started");
                    relist = Some(Vec::new());
                }
                Ok(Event::InitApply(config_map)) => {
                    relist
                        .get_or_insert_with(Vec::new)
                        .push(fragment_from_config_map(&config_map));
                }
                Ok(Event::InitDone) => {
                    let fragments = relist.take().unwrap_or_default();
                    let listed = fragments.len();
                    let changes = store.replace(fragments);
                    crate::log_event!(
                        "watch",
                        "synced",
                        "{listed} configmaps, {changes} changed"
                    );
                }
                Ok(Event::Apply(config_map)) => {
                    store.apply(fragment_from_config_map(&config_map));
                }
                Ok(Event::Delete(config_map)) => {
                    store.delete(&fragment_id(&config_map));
                }
                Err(e) => {
                    tracing::warn!("[watch] configmap watch error, retrying: {e}");
                }
            }
        }

        Err(WatchError::StreamEnded {
            source_name: SOURCE_NAME.to_string(),
        })
    }
}

fn fragment_id(config_map: &ConfigMap) -> FragmentId {
    FragmentId::new(config_map.namespace().unwrap_or_default(), config_map.name_any())
}

/// Snapshot the parts of a ConfigMap generation cares about.
pub fn fragment_from_config_map(config_map: &ConfigMap) -> Fragment {
    Fragment {
        id: fragment_id(config_map),
        annotations: config_map.annotations().clone(),
        data: config_map.data.clone().unwrap_or_default(),
    }
}
