use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore as ExternalObjectStore;
use precompute_core::{PrecomputeError, Result};

/// Storage for rendered per-symbol report blobs (§6.3). A small trait rather
/// than a direct dependency on one backend, so the local-filesystem
/// implementation used in development and tests can be swapped for a cloud
/// object store in deployment without touching worker code.
#[async_trait]
pub trait ChartStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Local-filesystem-backed implementation built on the `object_store` crate's
/// own local backend, so swapping in a cloud backend later is a matter of
/// constructing a different `object_store::ObjectStore` rather than rewriting
/// this wrapper.
pub struct LocalChartStore {
    inner: LocalFileSystem,
}

impl LocalChartStore {
    pub fn new(root: impl AsRef<std::path::Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())
            .map_err(|e| PrecomputeError::OperationFailed(format!("creating chart store root: {e}")))?;
        let inner = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| PrecomputeError::OperationFailed(format!("opening local chart store: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl ChartStore for LocalChartStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = ObjectPath::from(key);
        self.inner
            .put(&path, bytes.into())
            .await
            .map_err(|e| PrecomputeError::OperationFailed(format!("chart store put {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = ObjectPath::from(key);
        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|e| PrecomputeError::OperationFailed(format!("chart store get {key}: {e}")))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| PrecomputeError::OperationFailed(format!("chart store read {key}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// The deterministic key shape §6.3 specifies: `reports/{symbol}/{date}/{symbol}_{date}_{ts}.json`.
pub fn report_key(display_symbol: &str, business_date: chrono::NaiveDate, generated_at_unix: i64) -> String {
    format!("reports/{display_symbol}/{business_date}/{display_symbol}_{business_date}_{generated_at_unix}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalChartStore::new(dir.path()).unwrap();
        store.put("reports/AAPL/2024-06-01/report.json", b"{\"ok\":true}".to_vec()).await.unwrap();

        let bytes = store.get("reports/AAPL/2024-06-01/report.json").await.unwrap();
        assert_eq!(bytes, b"{\"ok\":true}");
    }

    #[test]
    fn report_key_matches_the_deterministic_shape() {
        let key = report_key("AAPL", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 1_700_000_000);
        assert_eq!(key, "reports/AAPL/2024-06-01/AAPL_2024-06-01_1700000000.json");
    }
}
