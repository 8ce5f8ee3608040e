//! Tunable thresholds for the expiration job and the rules protecting the
//! record that stores them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::platform::types::{CallError, CallResult, ErrorKind};
use crate::platform::QueryService;
use crate::query::{field, Predicate, Query};

pub const PARAMETER_SET_OBJECT: &str = "vproc_parameter_set__c";
pub const EXPIRATION_PARAMETER_SET: &str = "ExpirationPendingWorkflow";

const DEFAULT_START_BUFFER_DAYS: i64 = 30;

/// Day offsets, relative to the run date, that drive discovery and due dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExpirationParameters {
    /// Start window lower bound (inclusive).
    pub window_low_days: i64,
    /// Start window upper bound (inclusive).
    pub window_high_days: i64,
    /// Days before expiration that the workflow task is due.
    pub task_due_days: i64,
    /// Active workflows are cancelled once expiration is this close.
    pub kill_days: i64,
}

impl ExpirationParameters {
    /// Offsets may be negative: a window that starts in the past is valid.
    pub fn validate(&self) -> CallResult<()> {
        if self.window_low_days > self.window_high_days {
            return Err(CallError::invalid_input(format!(
                "start window is inverted: {} > {}",
                self.window_low_days, self.window_high_days
            )));
        }
        Ok(())
    }

    /// Parse the JSON stored in a parameter set record.
    ///
    /// Accepts explicit `windowLowDays`/`windowHighDays`, or derives the window
    /// from `workflowStartDays` minus `workflowStartBufferDays` (30 by default).
    pub fn from_parameter_json(json: &Value) -> CallResult<Self> {
        let high = match optional_days(json, "windowHighDays")? {
            Some(high) => high,
            None => required_days(json, "workflowStartDays")?,
        };
        let low = match optional_days(json, "windowLowDays")? {
            Some(low) => low,
            None => {
                let buffer = optional_days(json, "workflowStartBufferDays")?
                    .unwrap_or(DEFAULT_START_BUFFER_DAYS);
                high - buffer
            }
        };

        let params = Self {
            window_low_days: low,
            window_high_days: high,
            task_due_days: required_days(json, "taskDueDays")?,
            kill_days: required_days(json, "workflowKillDays")?,
        };
        params.validate()?;
        Ok(params)
    }
}

fn optional_days(json: &Value, key: &str) -> CallResult<Option<i64>> {
    match json.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| CallError::invalid_input(format!("{key} must be a whole number of days"))),
        Some(other) => Err(CallError::invalid_input(format!(
            "{key} must be a number (got {other})"
        ))),
    }
}

fn required_days(json: &Value, key: &str) -> CallResult<i64> {
    optional_days(json, key)?
        .ok_or_else(|| CallError::invalid_input(format!("Missing parameter {key}")))
}

/// Source of [`ExpirationParameters`], read once per job initialization.
#[async_trait]
pub trait ParameterProvider: Send + Sync {
    async fn load(&self) -> Result<ExpirationParameters>;
}

/// Fixed parameters, typically from the config file.
pub struct StaticParameterProvider(pub ExpirationParameters);

#[async_trait]
impl ParameterProvider for StaticParameterProvider {
    async fn load(&self) -> Result<ExpirationParameters> {
        self.0
            .validate()
            .map_err(|e| AppError::InvalidInput(e.message))?;
        Ok(self.0)
    }
}

/// Reads the JSON `parameters__c` of a named parameter set record.
pub struct VaultParameterProvider {
    queries: Arc<dyn QueryService>,
    parameter_set: String,
}

impl VaultParameterProvider {
    pub fn new(queries: Arc<dyn QueryService>, parameter_set: &str) -> Self {
        Self {
            queries,
            parameter_set: parameter_set.to_string(),
        }
    }
}

#[async_trait]
impl ParameterProvider for VaultParameterProvider {
    async fn load(&self) -> Result<ExpirationParameters> {
        let query = Query::select(&["parameters__c"])
            .from(PARAMETER_SET_OBJECT)
            .filter(Predicate::Eq(field("name__v"), self.parameter_set.as_str().into()));

        let rows = self.queries.query(&query).await?;
        let row = rows.first().ok_or_else(|| {
            AppError::Config(format!("Parameter set {} not found", self.parameter_set))
        })?;

        let raw = row.string("parameters__c")?;
        let json: Value = serde_json::from_str(&raw)?;
        let params = ExpirationParameters::from_parameter_json(&json)?;

        tracing::info!(
            parameter_set = %self.parameter_set,
            window_low_days = params.window_low_days,
            window_high_days = params.window_high_days,
            task_due_days = params.task_due_days,
            kill_days = params.kill_days,
            "Loaded expiration parameters"
        );
        Ok(params)
    }
}

/// A parameter set record as stored in the vault.
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterSetRecord {
    #[serde(rename = "name__v")]
    pub name: String,
    #[serde(rename = "parameters__c")]
    pub parameters: String,
}

/// A proposed change to parameter set records.
#[derive(Debug)]
pub enum ParameterSetChange<'a> {
    Delete,
    /// Pairs of (current, proposed) records.
    Update(&'a [(ParameterSetRecord, ParameterSetRecord)]),
}

/// Decide whether a change to parameter set records is allowed.
///
/// Deletes and bulk updates are refused, names are immutable, and the
/// expiration parameter set must keep parsing as numeric day offsets.
pub fn check_parameter_set_change(change: &ParameterSetChange<'_>) -> CallResult<()> {
    let changes = match change {
        ParameterSetChange::Delete => {
            return Err(CallError::new(
                ErrorKind::DeletionDenied,
                "Record deletions are not allowed in this object.",
            ))
        }
        ParameterSetChange::Update(changes) => *changes,
    };

    let [(current, proposed)] = changes else {
        return Err(CallError::new(
            ErrorKind::OperationDenied,
            "Bulk updates are not allowed",
        ));
    };

    if current.name != proposed.name {
        return Err(CallError::new(
            ErrorKind::UpdateDenied,
            "Cannot change the parameter set name.",
        ));
    }

    if proposed.name == EXPIRATION_PARAMETER_SET {
        let json: Value = serde_json::from_str(&proposed.parameters)
            .map_err(|e| CallError::invalid_input(format!("parameters__c is not valid JSON: {e}")))?;
        ExpirationParameters::from_parameter_json(&json)?;
    }

    Ok(())
}
