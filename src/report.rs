use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{BatchItem, FieldKey, FieldMap, Outcome};
use crate::resolve::resolve_opt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub page_id: String,
    pub name: String,
    pub order: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub prompt: String,
}

impl ReportEntry {
    pub fn from_item(item: &BatchItem, fields: &FieldMap) -> Self {
        let record = &item.record;
        let name = resolve_opt(record.property(fields, FieldKey::Title));
        let name = if name.is_empty() {
            record.id().to_string()
        } else {
            name
        };
        let order = resolve_opt(record.property(fields, FieldKey::Order));
        let (ok, url, error) = match &item.outcome {
            Outcome::Success { url } => (true, Some(url.clone()), None),
            Outcome::Failure { error, url } => (false, url.clone(), Some(error.clone())),
            Outcome::Pending => (false, None, Some("pending".to_string())),
        };
        Self {
            page_id: record.id().to_string(),
            name,
            order,
            ok,
            url,
            error,
            prompt: item.prompt.positive.clone(),
        }
    }

    /// Structured log line for this item's outcome.
    pub fn log(&self) {
        if self.ok {
            info!(
                page_id = %self.page_id,
                name = %self.name,
                order = %self.order,
                url = self.url.as_deref().unwrap_or_default(),
                "image generated"
            );
        } else {
            warn!(
                page_id = %self.page_id,
                name = %self.name,
                order = %self.order,
                url = self.url.as_deref().unwrap_or_default(),
                error = self.error.as_deref().unwrap_or_default(),
                "item failed"
            );
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(run_id: Uuid, entries: Vec<ReportEntry>) -> Self {
        let succeeded = entries.iter().filter(|e| e.ok).count();
        Self {
            run_id,
            generated_at: Utc::now(),
            processed: entries.len(),
            succeeded,
            failed: entries.len() - succeeded,
            entries,
        }
    }

    pub async fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Write the artifact; a failure is logged and otherwise ignored.
    pub async fn persist(&self, path: &Path) {
        match self.write_to(path).await {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(err) => warn!(?err, path = %path.display(), "failed to write report"),
        }
    }
}
