//! Read-only scans that turn vault records into work items.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta};

use crate::config::JobConfig;
use crate::error::{AppError, Result};
use crate::params::ExpirationParameters;
use crate::platform::types::DocumentVersionId;
use crate::platform::{QueryService, VaultApiClient};
use crate::query::{field, to_name, Literal, Predicate, Query, Row};

use super::item::{CancelItem, StartItem, WorkItem};

const VERSION_ID: &str = "version_id";
const DOCUMENT_NUMBER: &str = "document_number__v";
const DOCUMENT_ID: &str = "id";

/// `today` shifted by a signed number of days.
pub fn offset_date(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    TimeDelta::try_days(days)
        .and_then(|delta| today.checked_add_signed(delta))
        .ok_or_else(|| AppError::InvalidInput(format!("{today} + {days} days is out of range")))
}

pub struct Discovery {
    queries: Arc<dyn QueryService>,
    api: VaultApiClient,
    job: Arc<JobConfig>,
}

impl Discovery {
    pub fn new(queries: Arc<dyn QueryService>, api: VaultApiClient, job: Arc<JobConfig>) -> Self {
        Self { queries, api, job }
    }

    /// Documents of the configured types, in steady state, not yet notified,
    /// expiring within `[today + low, today + high]`.
    pub fn start_query(&self, params: &ExpirationParameters, today: NaiveDate) -> Result<Query> {
        let date_from = offset_date(today, params.window_low_days)?;
        let date_to = offset_date(today, params.window_high_days)?;

        let types = self
            .job
            .document_types
            .iter()
            .map(|t| Literal::from(t.as_str()))
            .collect();

        Ok(
            Query::select(&[VERSION_ID, DOCUMENT_NUMBER, self.job.expiration_field.as_str()])
                .from("documents")
                .filter(Predicate::Contains(to_name("type__v"), types))
                .filter(Predicate::SteadyState(field("status__v")))
                .filter(Predicate::Ne(field(&self.job.notified_flag_field), true.into()))
                .filter(Predicate::Between(
                    field(&self.job.expiration_field),
                    date_from.into(),
                    date_to.into(),
                )),
        )
    }

    pub async fn discover_start_candidates(
        &self,
        params: &ExpirationParameters,
        today: NaiveDate,
    ) -> Result<Vec<WorkItem>> {
        tracing::info!("Looking for documents pending expiration to start workflows...");

        let query = self.start_query(params, today)?;
        tracing::debug!(query = %query, "Executing start candidate query");

        let rows = self
            .queries
            .query(&query)
            .await
            .map_err(|e| AppError::Discovery(format!("Start candidate query failed: {e}")))?;

        tracing::info!(count = rows.len(), "Found documents in start window");

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match self.start_item(&row, params) {
                Ok(item) => {
                    tracing::info!(
                        document = %item.document_number,
                        version = %item.document_version_id,
                        expiration_date = %item.expiration_date,
                        "Found start candidate"
                    );
                    items.push(WorkItem::Start(item));
                }
                Err(e) => {
                    tracing::warn!(error = %e, row = ?row, "Skipping unreadable start candidate");
                }
            }
        }

        Ok(items)
    }

    fn start_item(&self, row: &Row, params: &ExpirationParameters) -> Result<StartItem> {
        let document_version_id: DocumentVersionId = row.string(VERSION_ID)?.parse()?;
        Ok(StartItem {
            document_number: row.string(DOCUMENT_NUMBER)?,
            document_version_id,
            expiration_date: row.date(&self.job.expiration_field)?,
            task_due_days: Some(params.task_due_days),
        })
    }

    /// Documents in the job lifecycle whose expiration is at or before the kill date.
    pub fn cancel_query(&self, params: &ExpirationParameters, today: NaiveDate) -> Result<Query> {
        let kill_date = offset_date(today, params.kill_days)?;

        Ok(Query::select(&[DOCUMENT_ID])
            .from("documents")
            .filter(Predicate::Eq(
                to_name("lifecycle__v"),
                self.job.lifecycle.as_str().into(),
            ))
            .filter(Predicate::Le(field(&self.job.expiration_field), kill_date.into())))
    }

    /// Active workflow tasks on documents that reached the kill threshold.
    ///
    /// The date filter only applies to the local candidate ids; the remote
    /// workflow listing is not date filtered and is joined against them. A
    /// failed listing aborts discovery.
    pub async fn discover_cancel_candidates(
        &self,
        params: &ExpirationParameters,
        today: NaiveDate,
    ) -> Result<Vec<WorkItem>> {
        tracing::info!(
            kill_days = params.kill_days,
            "Looking for active workflows on documents near expiration..."
        );

        let query = self.cancel_query(params, today)?;
        let rows = self
            .queries
            .query(&query)
            .await
            .map_err(|e| AppError::Discovery(format!("Cancel candidate query failed: {e}")))?;

        let mut doc_ids = HashSet::with_capacity(rows.len());
        for row in &rows {
            match row.string(DOCUMENT_ID) {
                Ok(id) => {
                    doc_ids.insert(id);
                }
                Err(e) => tracing::warn!(error = %e, "Skipping cancel candidate without id"),
            }
        }

        let workflows = self
            .api
            .list_active_workflows(&self.job.workflow_name)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Active workflow query failed");
                AppError::Discovery(format!(
                    "An error occurred executing workflows query: {}: {}",
                    e.kind, e.message
                ))
            })?;

        tracing::info!(
            candidates = doc_ids.len(),
            active_workflows = workflows.len(),
            "Joining kill-threshold documents with active workflows"
        );

        let items = workflows
            .into_iter()
            .filter(|wf| doc_ids.contains(&wf.document_id))
            .map(|wf| {
                tracing::info!(document = %wf.document_id, task = %wf.task_id, "Expiration date is imminent");
                WorkItem::Cancel(CancelItem {
                    document_id: wf.document_id,
                    task_id: wf.task_id,
                })
            })
            .collect();

        Ok(items)
    }
}
