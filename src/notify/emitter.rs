use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::directory::JobDirectory;
use crate::model::{ApplicationUpdate, Job, topic};
use crate::router::{self, SharedRouter};
use crate::transport::message::event;
use crate::utils::error::NotifyError;

/// Publishes domain events to subscribed clients.
///
/// Build one per process and hand clones (or references) to whatever needs to
/// emit; clones share the same router. Every operation is fire-and-forget:
/// `Ok` means the message was handed to the router, not that anyone got it.
///
/// Job events go to the job's category topic and to `all jobs` in one router
/// call, so a connection watching both still gets a single copy.
/// Application updates go to the user's topic only.
#[derive(Debug, Clone)]
pub struct Notifier {
    router: SharedRouter,
    directory: Option<Arc<dyn JobDirectory>>,
}

impl Notifier {
    pub fn new(router: SharedRouter) -> Self {
        Self {
            router,
            directory: None,
        }
    }

    /// Keep `directory` in step with every lifecycle event published.
    pub fn with_directory(mut self, directory: Arc<dyn JobDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn notify_new_job(&self, job: &Job) -> Result<(), NotifyError> {
        check_job(job)?;
        self.fan_out(&job.category, event::NEW_JOB, to_payload(job));
        self.sync(|d| d.upsert(job.clone()));
        info!(job_id = %job.id, category = %job.category, "new job published");
        Ok(())
    }

    /// Routed by the job's current category only. Use `notify_job_moved`
    /// when the category changed since the job was first published.
    pub fn notify_job_update(&self, job: &Job) -> Result<(), NotifyError> {
        check_job(job)?;
        self.fan_out(&job.category, event::JOB_UPDATED, to_payload(job));
        self.sync(|d| d.upsert(job.clone()));
        debug!(job_id = %job.id, "job update published");
        Ok(())
    }

    /// The payload is the bare id; removed jobs are not sent in full.
    pub fn notify_job_removal(&self, job_id: &str, category: &str) -> Result<(), NotifyError> {
        require("id", job_id)?;
        require("category", category)?;
        self.fan_out(category, event::JOB_REMOVED, Value::String(job_id.to_string()));
        self.sync(|d| d.remove(job_id));
        debug!(job_id, category, "job removal published");
        Ok(())
    }

    pub fn notify_job_expiry(&self, job: &Job) -> Result<(), NotifyError> {
        check_job(job)?;
        self.fan_out(
            &job.category,
            event::JOB_EXPIRED,
            Value::String(job.id.clone()),
        );
        self.sync(|d| d.expire(&job.id));
        debug!(job_id = %job.id, "job expiry published");
        Ok(())
    }

    pub fn notify_job_application_update(
        &self,
        user_id: &str,
        job_id: &str,
        status: &str,
    ) -> Result<(), NotifyError> {
        require("userId", user_id)?;
        require("jobId", job_id)?;

        let update = ApplicationUpdate {
            job_id: job_id.to_string(),
            status: status.to_string(),
        };
        let payload = serde_json::to_value(&update).unwrap_or(Value::Null);
        router::lock(&self.router).publish(
            &topic::user(user_id),
            event::APPLICATION_UPDATE,
            &payload,
        );
        debug!(user_id, job_id, status, "application update published");
        Ok(())
    }

    /// A job changed category. Connections that only watch the old category
    /// get a `job removed`; everyone on the new category or `all jobs` gets
    /// the job as updated and keeps it in their list.
    pub fn notify_job_moved(
        &self,
        previous_category: &str,
        job: &Job,
    ) -> Result<(), NotifyError> {
        check_job(job)?;
        require("previousCategory", previous_category)?;

        if previous_category == job.category {
            return self.notify_job_update(job);
        }

        let updated = to_payload(job);
        {
            let router = router::lock(&self.router);
            let [category, all] = topic::job_targets(&job.category);
            let targets = [category.as_str(), all.as_str()];
            router.publish_except(
                &[topic::category(previous_category).as_str()],
                &targets,
                event::JOB_REMOVED,
                &Value::String(job.id.clone()),
            );
            router.publish_to(&targets, event::JOB_UPDATED, &updated);
        }
        self.sync(|d| d.upsert(job.clone()));
        debug!(
            job_id = %job.id,
            from = previous_category,
            to = %job.category,
            "job move published"
        );
        Ok(())
    }

    fn fan_out(&self, category: &str, event: &str, payload: Value) {
        let [category, all] = topic::job_targets(category);
        router::lock(&self.router).publish_to(
            &[category.as_str(), all.as_str()],
            event,
            &payload,
        );
    }

    fn sync(&self, apply: impl FnOnce(&dyn JobDirectory)) {
        if let Some(directory) = &self.directory {
            apply(directory.as_ref());
        }
    }
}

fn check_job(job: &Job) -> Result<(), NotifyError> {
    require("id", &job.id)?;
    require("category", &job.category)
}

fn require(field: &'static str, value: &str) -> Result<(), NotifyError> {
    if value.trim().is_empty() {
        return Err(NotifyError::MissingField(field));
    }
    Ok(())
}

fn to_payload(job: &Job) -> Value {
    // Job only holds strings, numbers and JSON values, so this cannot fail.
    serde_json::to_value(job).unwrap_or(Value::Null)
}
