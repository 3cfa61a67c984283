//! Activation sweep: drop every cache instance except the current one.

use seamcache_core::{CacheDb, Error};
use serde::Serialize;

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    /// Stale instances whose deletion failed; they are retried on the next
    /// activation.
    pub failed: Vec<String>,
}

/// Delete all instances whose name is not `current`.
///
/// Deletions are independent: one failing is logged and the rest still run.
/// Only listing the instances can fail the sweep as a whole.
pub async fn sweep(db: &CacheDb, current: &str) -> Result<SweepReport, Error> {
    let mut report = SweepReport::default();

    for name in db.instance_names().await? {
        if name == current {
            continue;
        }
        match db.delete_instance(&name).await {
            Ok(_) => {
                tracing::info!(instance = %name, "deleted stale cache");
                report.deleted.push(name);
            }
            Err(e) => {
                tracing::warn!(instance = %name, error = %e, "failed to delete stale cache");
                report.failed.push(name);
            }
        }
    }

    Ok(report)
}
