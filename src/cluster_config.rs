//! Cluster-wide KubeVirt settings read from the `kubevirt-config` ConfigMap
//!
//! Settings are read through a [`ConfigMapCache`] so lookups never touch the
//! API server. In a running controller the cache is a kube-runtime reflector
//! store built by [`config_map_store`]; tests substitute a mock.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Namespace holding the cluster config
pub const CONFIG_NAMESPACE: &str = "kube-system";

/// Name of the cluster config ConfigMap
pub const CONFIG_NAME: &str = "kubevirt-config";

/// Key enabling software emulation when hardware virtualization is missing
pub const ALLOW_EMULATION_KEY: &str = "debug.allowEmulation";

/// Read-only view of cached ConfigMaps
#[cfg_attr(test, automock)]
pub trait ConfigMapCache: Send + Sync {
    /// Look up a ConfigMap by namespace and name
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ConfigMap>>;
}

impl ConfigMapCache for Store<ConfigMap> {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<ConfigMap>> {
        Store::get(self, &ObjectRef::new(name).within(namespace))
    }
}

/// Whether VMs may fall back to software emulation.
///
/// A missing ConfigMap or a missing key means emulation is off. A value that
/// is not a recognized boolean is an error rather than a silent default.
pub fn is_emulation_allowed(cache: &dyn ConfigMapCache) -> Result<bool> {
    let Some(config) = cache.get(CONFIG_NAMESPACE, CONFIG_NAME) else {
        debug!("No cluster config found, emulation disabled");
        return Ok(false);
    };

    let Some(raw) = config
        .data
        .as_ref()
        .and_then(|data| data.get(ALLOW_EMULATION_KEY))
    else {
        return Ok(false);
    };

    parse_bool(raw).ok_or_else(|| Error::invalid_flag(ALLOW_EMULATION_KEY, raw.as_str()))
}

/// Parse a boolean flag value, accepting the usual spellings
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Build a reflector store that tracks the cluster config ConfigMap.
///
/// The returned stream must be polled for the store to fill; it retries
/// watch failures with backoff and never ends on its own.
pub fn config_map_store(
    client: Client,
) -> (
    Store<ConfigMap>,
    impl Stream<Item = watcher::Result<watcher::Event<ConfigMap>>> + Send + 'static,
) {
    let api: Api<ConfigMap> = Api::namespaced(client, CONFIG_NAMESPACE);
    let (store, writer) = reflector::store();
    let config = watcher::Config::default().fields(&format!("metadata.name={CONFIG_NAME}"));

    let stream = reflector(writer, watcher(api, config).default_backoff()).inspect_err(|e| {
        warn!(error = %e, "Cluster config watch failed, retrying");
    });

    (store, stream)
}

/// Wait until the store has seen its initial listing.
pub async fn wait_for_sync(store: &Store<ConfigMap>, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, store.wait_until_ready()).await {
        Ok(Ok(())) => {
            debug!("Cluster config cache synced");
            Ok(())
        }
        Ok(Err(e)) => Err(Error::cache_sync(format!("cluster config watch stopped: {e}"))),
        Err(_) => Err(Error::cache_sync(format!(
            "cluster config cache not synced after {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::api::ObjectMeta;
    use mockall::predicate::eq;

    use super::*;

    fn config_map(namespace: &str, name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn cache_with(value: Option<&str>) -> MockConfigMapCache {
        let data: Vec<(&str, &str)> = value
            .map(|v| vec![(ALLOW_EMULATION_KEY, v)])
            .unwrap_or_default();
        let cm = Arc::new(config_map(CONFIG_NAMESPACE, CONFIG_NAME, &data));

        let mut cache = MockConfigMapCache::new();
        cache
            .expect_get()
            .with(eq(CONFIG_NAMESPACE), eq(CONFIG_NAME))
            .returning(move |_, _| Some(cm.clone()));
        cache
    }

    // =========================================================================
    // Story: Emulation follows the cluster config flag
    // =========================================================================

    #[test]
    fn story_missing_config_map_disables_emulation() {
        let mut cache = MockConfigMapCache::new();
        cache.expect_get().times(1).returning(|_, _| None);

        assert!(!is_emulation_allowed(&cache).unwrap());
    }

    #[test]
    fn story_missing_key_disables_emulation() {
        assert!(!is_emulation_allowed(&cache_with(None)).unwrap());

        let cm = Arc::new(config_map(
            CONFIG_NAMESPACE,
            CONFIG_NAME,
            &[("feature-gates", "DataVolumes"), ("debug.useEmulation", "true")],
        ));
        let mut cache = MockConfigMapCache::new();
        cache.expect_get().returning(move |_, _| Some(cm.clone()));
        assert!(!is_emulation_allowed(&cache).unwrap());
    }

    #[test]
    fn story_config_map_without_data_disables_emulation() {
        let mut cm = config_map(CONFIG_NAMESPACE, CONFIG_NAME, &[]);
        cm.data = None;
        let cm = Arc::new(cm);

        let mut cache = MockConfigMapCache::new();
        cache.expect_get().returning(move |_, _| Some(cm.clone()));

        assert!(!is_emulation_allowed(&cache).unwrap());
    }

    #[test]
    fn story_true_flag_enables_emulation() {
        assert!(is_emulation_allowed(&cache_with(Some("true"))).unwrap());
    }

    #[test]
    fn story_false_flag_disables_emulation() {
        assert!(!is_emulation_allowed(&cache_with(Some("false"))).unwrap());
    }

    #[test]
    fn story_every_boolean_spelling_is_recognized() {
        for value in ["1", "t", "T", "TRUE", "true", "True", " true \n"] {
            assert!(
                is_emulation_allowed(&cache_with(Some(value))).unwrap(),
                "{value:?} should enable emulation"
            );
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            assert!(
                !is_emulation_allowed(&cache_with(Some(value))).unwrap(),
                "{value:?} should disable emulation"
            );
        }
    }

    #[test]
    fn story_unrecognized_value_is_an_error() {
        for value in ["notabool", "yes", "tRuE", "", "2"] {
            let err = is_emulation_allowed(&cache_with(Some(value))).unwrap_err();
            assert!(
                matches!(err, Error::InvalidFlag { ref key, .. } if key == ALLOW_EMULATION_KEY),
                "{value:?} should be rejected"
            );
        }
    }

    // =========================================================================
    // Story: The reflector store serves as the cache
    // =========================================================================

    #[tokio::test]
    async fn story_store_serves_lookups_after_sync() {
        let (store, mut writer) = reflector::store::<ConfigMap>();
        writer.apply_watcher_event(&watcher::Event::Init);
        writer.apply_watcher_event(&watcher::Event::InitApply(config_map(
            CONFIG_NAMESPACE,
            CONFIG_NAME,
            &[(ALLOW_EMULATION_KEY, "true")],
        )));
        writer.apply_watcher_event(&watcher::Event::InitDone);

        wait_for_sync(&store, Duration::from_secs(1)).await.unwrap();

        assert!(is_emulation_allowed(&store).unwrap());
        assert!(ConfigMapCache::get(&store, "default", CONFIG_NAME).is_none());
    }

    #[tokio::test]
    async fn story_store_reflects_deletion() {
        let (store, mut writer) = reflector::store::<ConfigMap>();
        let cm = config_map(CONFIG_NAMESPACE, CONFIG_NAME, &[(ALLOW_EMULATION_KEY, "1")]);
        writer.apply_watcher_event(&watcher::Event::Apply(cm.clone()));
        assert!(is_emulation_allowed(&store).unwrap());

        writer.apply_watcher_event(&watcher::Event::Delete(cm));
        assert!(!is_emulation_allowed(&store).unwrap());
    }

    #[tokio::test]
    async fn story_unsynced_store_times_out() {
        let (store, _writer) = reflector::store::<ConfigMap>();

        let err = wait_for_sync(&store, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheSync(_)));
    }

    #[tokio::test]
    async fn story_dropped_writer_fails_sync() {
        let (store, writer) = reflector::store::<ConfigMap>();
        drop(writer);

        let err = wait_for_sync(&store, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheSync(_)));
    }
}
