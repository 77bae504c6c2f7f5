//! Notification about the outcome of a backup run.
//!
//! Notifications are best effort: [send] logs transport errors and never
//! changes the outcome of the run itself.

use std::fmt;
use std::time::Duration;

use derive_more::{Display, Error, From};
use serde_json::json;

use crate::backup::BackupResult;
use crate::config::FeishuConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("成功"),
            Self::Failure => f.write_str("失败"),
        }
    }
}

/// What is reported about a run.
#[derive(Clone, Debug)]
pub struct Report<'a> {
    pub status: Status,
    /// Known backup, absent if the run failed before a name was assigned.
    pub result: Option<&'a BackupResult>,
    pub error: Option<String>,
}

impl<'a> Report<'a> {
    pub fn success(result: &'a BackupResult) -> Self {
        Self {
            status: Status::Success,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(result: Option<&'a BackupResult>, error: impl fmt::Display) -> Self {
        Self {
            status: Status::Failure,
            result,
            error: Some(error.to_string()),
        }
    }

    /// Message text, starting with the security `keyword`.
    pub fn text(&self, keyword: &str) -> String {
        let (name, artifact, log) = match self.result {
            Some(result) => (
                result.backup_name.clone(),
                result.archive_path.display().to_string(),
                result.log_path.display().to_string(),
            ),
            None => Default::default(),
        };

        let mut lines = vec![
            keyword.to_string(),
            format!("状态: {}", self.status),
            format!("备份名: {name}"),
            format!("文件: {artifact}"),
            format!("日志: {log}"),
        ];
        if let Some(error) = &self.error {
            lines.push(format!("错误: {error}"));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Display, Error, From)]
/// Errors on delivering a notification.
pub enum NotifyError {
    /// The webhook could not be reached or answered with an error.
    #[display("webhook request failed: {_0}")]
    Http(reqwest::Error),
}

/// Receiver of run [Report]s.
pub trait Notifier {
    fn notify(&self, report: &Report<'_>) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, report: &Report<'_>) -> Result<(), NotifyError> {
        (**self).notify(report)
    }
}

/// Delivers `report`, logging instead of failing.
pub fn send(notifier: &dyn Notifier, report: &Report<'_>) {
    match notifier.notify(report) {
        Ok(()) => log::debug!(target: "notify", "Notification sent: {}", report.status),
        Err(e) => log::error!(target: "notify", "Sending notification failed: {e}"),
    }
}

/// A Feishu bot webhook.
#[derive(Debug, Clone)]
pub struct FeishuWebhook {
    webhook: String,
    keyword: String,
}

impl FeishuWebhook {
    pub fn new(webhook: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            webhook: webhook.into(),
            keyword: keyword.into(),
        }
    }

    /// The webhook of an enabled and complete [FeishuConfig].
    pub fn from_config(config: &FeishuConfig) -> Option<Self> {
        if config.enabled && !config.webhook.is_empty() && !config.keyword.is_empty() {
            Some(Self::new(&config.webhook, &config.keyword))
        } else {
            None
        }
    }

    /// JSON body of the text message.
    pub fn payload(&self, report: &Report<'_>) -> serde_json::Value {
        json!({
            "msg_type": "text",
            "content": {
                "text": report.text(&self.keyword),
            },
        })
    }
}

impl Notifier for FeishuWebhook {
    fn notify(&self, report: &Report<'_>) -> Result<(), NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;

        client
            .post(&self.webhook)
            .json(&self.payload(report))
            .send()?
            .error_for_status()?;

        Ok(())
    }
}
