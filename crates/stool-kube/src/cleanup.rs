//! Transient access objects for operational tooling
//!
//! Interactive tooling gets a service account bound to a role that may exec
//! into a fixed set of pods. The objects are removed by a delayed background
//! task; its failures are logged and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::engine::ClusterEngine;
use crate::error::Result;

/// How long granted access stays usable by default
pub const DEFAULT_ACCESS_DELAY: Duration = Duration::from_secs(60 * 60);

/// Names of the objects making up one access grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessObjects {
    pub service_account: String,
    pub role: String,
    pub binding: String,
}

impl AccessObjects {
    pub fn named(name: &str) -> Self {
        Self {
            service_account: name.to_string(),
            role: format!("{name}-role"),
            binding: format!("{name}-binding"),
        }
    }
}

/// Create a service account allowed to exec into `pods`.
///
/// When a step fails, the objects created so far are deleted before the error is returned.
pub async fn grant_pod_access(engine: &dyn ClusterEngine, name: &str, pods: &[String]) -> Result<AccessObjects> {
    let objects = AccessObjects::named(name);
    engine.service_account_create(&objects.service_account).await?;

    if let Err(e) = engine.role_create(&objects.role, pods).await {
        rollback(&objects.service_account, engine.service_account_delete(&objects.service_account).await);
        return Err(e);
    }

    if let Err(e) = engine
        .binding_create(&objects.binding, &objects.role, &objects.service_account)
        .await
    {
        let (role, account) = futures::join!(
            engine.role_delete(&objects.role),
            engine.service_account_delete(&objects.service_account),
        );
        rollback(&objects.role, role);
        rollback(&objects.service_account, account);
        return Err(e);
    }
    Ok(objects)
}

fn rollback(name: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(name, error = %e, "failed to roll back access object");
    }
}

/// Delete the access objects after `delay`, on a detached task
pub fn schedule_access_cleanup(
    runtime: &Handle,
    engine: Arc<dyn ClusterEngine>,
    objects: AccessObjects,
    delay: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        info!(service_account = %objects.service_account, "removing access objects");

        let (binding, role, account) = futures::join!(
            engine.binding_delete(&objects.binding),
            engine.role_delete(&objects.role),
            engine.service_account_delete(&objects.service_account),
        );
        for (kind, name, result) in [
            ("binding", &objects.binding, binding),
            ("role", &objects.role, role),
            ("service account", &objects.service_account, account),
        ] {
            if let Err(e) = result {
                error!(kind, name = %name, error = %e, "access cleanup failed");
            }
        }
    })
}
