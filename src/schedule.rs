//! Periodic jobs for keeping the pool healthy.
//!
//! Nothing here is global: each job is a tokio task owned by the returned
//! [`JobHandle`], and stops when the handle is dropped or cancelled.

use crate::router::RequestRouter;

use log::info;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

/// Handle to a running periodic job. Dropping it stops the job.
#[derive(Debug)]
pub struct JobHandle {
    name: String,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the job. A run already in progress is dropped at its next await point.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `job` every `period`, starting one period from now.
///
/// Runs never overlap: the next period starts counting once a run finishes.
/// Must be called from within a tokio runtime.
pub fn every<F, Fut>(name: impl Into<String>, period: Duration, mut job: F) -> JobHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    info!("Job scheduled: {} every {:?}", name, period);

    let task = tokio::spawn(async move {
        loop {
            time::sleep(period).await;
            job().await;
        }
    });

    JobHandle { name, task }
}

/// Validate the router's pool on its configured `health_check_interval`.
pub fn spawn_health_checks(router: Arc<RequestRouter>) -> JobHandle {
    let period = router.config().health_check_interval;
    every("proxy-health-check", period, move || {
        let router = Arc::clone(&router);
        async move {
            let report = router.validate_pool().await;
            info!(
                "Proxy pool status update: {}/{} proxies kept",
                report.retained, report.checked
            );
        }
    })
}
