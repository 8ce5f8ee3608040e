use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::params::ExpirationParameters;
use crate::platform::api::DEFAULT_API_VERSION;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub vault: VaultConfig,
    #[serde(default)]
    pub job: JobConfig,
    /// Fixed thresholds. When absent they are read from the vault parameter set.
    #[serde(default)]
    pub parameters: Option<ExpirationParameters>,
}

#[derive(Deserialize, Clone)]
pub struct VaultConfig {
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Manual Debug impl to avoid leaking credentials
impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("session_id", &self.session_id.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Names and scheduling knobs for the expiration job.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JobConfig {
    /// Document type names eligible for a start notification.
    pub document_types: Vec<String>,
    /// Lifecycle whose documents are checked for task cancellation.
    pub lifecycle: String,
    pub workflow_name: String,
    /// Label of the lifecycle action that starts the workflow.
    pub action_label: String,
    /// Role whose users receive the workflow task.
    pub role: String,
    pub expiration_field: String,
    pub notified_flag_field: String,
    /// Set the notified flag after a successful start.
    pub mark_notified: bool,
    pub user_control_field: String,
    pub date_control_field: String,
    /// Record name in the parameter set object.
    pub parameter_set: String,
    pub task_size: usize,
    pub max_concurrent_tasks: usize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            document_types: ["jobs__c", "nprc__c", "par__c", "endoaesthetics__c"]
                .into_iter()
                .map(String::from)
                .collect(),
            lifecycle: "job_processing__c".to_string(),
            workflow_name: "Expiration Pending".to_string(),
            action_label: "expiration_pending_autostart".to_string(),
            role: "project_manager__c".to_string(),
            expiration_field: "expiration_date__c".to_string(),
            notified_flag_field: "pending_expiration_task_sent__c".to_string(),
            mark_notified: true,
            user_control_field: "user_control_multiple__c".to_string(),
            date_control_field: "date_control__c".to_string(),
            parameter_set: "ExpirationPendingWorkflow".to_string(),
            task_size: 100,
            max_concurrent_tasks: 4,
        }
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(
                config::File::with_name("expiration-jobs")
                    .required(false),
            );
        }

        // Environment variable overrides with EXPIRATION_JOBS_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("EXPIRATION_JOBS")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.job.task_size == 0 {
            return Err(AppError::Config("job.task_size must be at least 1".to_string()));
        }
        if self.job.max_concurrent_tasks == 0 {
            return Err(AppError::Config(
                "job.max_concurrent_tasks must be at least 1".to_string(),
            ));
        }
        if self.job.document_types.is_empty() {
            return Err(AppError::Config("job.document_types must not be empty".to_string()));
        }
        if let Some(params) = &self.parameters {
            params
                .validate()
                .map_err(|e| AppError::Config(format!("parameters: {e}")))?;
        }
        Ok(())
    }
}
