use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::batch::run_bounded;
use crate::config::{self, Config};
use crate::error::{ItemError, PipelineError};
use crate::imagegen::{ImageParams, ImageRequestClient, ImageService, SiliconFlowClient};
use crate::model::{BatchItem, FieldKey, FieldMap, Outcome, PromptPair, Record};
use crate::notion::model::{Predicate, Sort};
use crate::notion::{NotionClient, NotionService};
use crate::paginator::RecordPaginator;
use crate::prompt::{compose, has_description};
use crate::report::{ReportEntry, RunReport};
use crate::resolve::resolve_opt;
use crate::retry::RetryPolicy;
use crate::writeback::WriteBackGateway;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub database_id: String,
    pub max_per_run: usize,
    pub concurrency: usize,
    pub page_size: usize,
    pub write_back: bool,
    /// Extra `status equals <value>` predicate when set.
    pub status_filter: Option<String>,
    pub model: String,
    pub image: ImageParams,
    pub retry: RetryPolicy,
}

impl RunSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            database_id: cfg.notion.database_id.clone(),
            max_per_run: cfg.app.max_per_run,
            concurrency: cfg.app.concurrency,
            page_size: cfg.app.page_size,
            write_back: cfg.app.write_back,
            status_filter: cfg
                .app
                .filter_by_status
                .then(|| cfg.app.status_value.clone()),
            model: cfg.generation.model.clone(),
            image: cfg.image_params(),
            retry: cfg.retry_policy(),
        }
    }
}

pub struct Pipeline {
    notion: Arc<dyn NotionService>,
    images: ImageRequestClient,
    writer: Option<WriteBackGateway>,
    fields: FieldMap,
    settings: RunSettings,
}

impl Pipeline {
    pub fn new(
        notion: Arc<dyn NotionService>,
        image_service: Arc<dyn ImageService>,
        fields: FieldMap,
        settings: RunSettings,
    ) -> Self {
        let images = ImageRequestClient::new(image_service, settings.model.clone(), settings.retry);
        let writer = settings.write_back.then(|| {
            WriteBackGateway::new(
                notion.clone(),
                fields.label(FieldKey::ImageOutput),
                settings.retry,
            )
        });
        Self {
            notion,
            images,
            writer,
            fields,
            settings,
        }
    }

    /// Validate `cfg` and build the HTTP-backed pipeline it describes.
    pub fn from_config(cfg: &Config) -> Result<Self, PipelineError> {
        config::validate(cfg)?;
        let notion = NotionClient::new(cfg.notion.token.clone(), cfg.notion.version.clone())
            .map_err(|err| PipelineError::Client(format!("notion: {}", err)))?;
        let images = SiliconFlowClient::new(
            cfg.generation.api_key.clone(),
            &cfg.generation.endpoint,
            cfg.generation_timeout(),
        )
        .map_err(|err| PipelineError::Client(format!("image generation: {}", err)))?;
        Ok(Self::new(
            Arc::new(notion),
            Arc::new(images),
            cfg.field_map(),
            RunSettings::from_config(cfg),
        ))
    }

    /// Records eligible for generation: no image yet and a description present,
    /// optionally narrowed to one status.
    pub fn eligibility_filter(&self) -> Vec<Predicate> {
        let mut filter = vec![
            Predicate::files_is_empty(self.fields.label(FieldKey::ImageOutput)),
            Predicate::rich_text_is_not_empty(self.fields.label(FieldKey::Description)),
        ];
        if let Some(status) = self.settings.status_filter.as_deref() {
            filter.push(Predicate::status_equals(
                self.fields.label(FieldKey::Status),
                status,
            ));
        }
        filter
    }

    pub async fn fetch(&self) -> Result<Vec<Record>, PipelineError> {
        RecordPaginator::new(
            self.notion.clone(),
            self.settings.retry,
            self.settings.database_id.clone(),
            self.eligibility_filter(),
            Sort::ascending(self.fields.label(FieldKey::Order)),
            self.settings.page_size,
        )
        .collect(Some(self.settings.max_per_run))
        .await
    }

    /// One record end to end. Returns the generated URL.
    pub async fn process(&self, record: &Record, prompt: &PromptPair) -> Result<String, ItemError> {
        if !has_description(record, &self.fields) {
            return Err(ItemError::EmptyPrompt);
        }
        debug!(page_id = record.id(), "generating image");
        let url = self
            .images
            .generate(prompt, &self.settings.image)
            .await?
            .ok_or(ItemError::NoUrl)?;

        if let Some(writer) = &self.writer {
            let name = resolve_opt(record.property(&self.fields, FieldKey::Title));
            let display_name = format!("{}.jpg", if name.is_empty() { record.id() } else { name.as_str() });
            writer
                .write(record.id(), &url, &display_name)
                .await
                .map_err(|source| ItemError::WriteBack {
                    url: url.clone(),
                    source,
                })?;
        }
        Ok(url)
    }

    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn run(&self, run_id: Uuid) -> Result<RunReport, PipelineError> {
        let records = self.fetch().await?;
        if records.is_empty() {
            info!("no records need images (output already set or description empty)");
            return Ok(RunReport::new(run_id, Vec::new()));
        }
        info!(
            selected = records.len(),
            cap = self.settings.max_per_run,
            concurrency = self.settings.concurrency,
            write_back = self.settings.write_back,
            "processing records"
        );

        let prompts: Vec<PromptPair> = records.iter().map(|r| compose(r, &self.fields)).collect();
        let work: Vec<(&Record, &PromptPair)> = records.iter().zip(prompts.iter()).collect();
        let results = run_bounded(work, self.settings.concurrency, |_, (record, prompt)| {
            self.process(record, prompt)
        })
        .await;

        let entries: Vec<ReportEntry> = records
            .into_iter()
            .zip(prompts)
            .zip(results)
            .map(|((record, prompt), result)| {
                let outcome = match result {
                    Ok(url) => Outcome::Success { url },
                    Err(err) => Outcome::Failure {
                        url: err.generated_url().map(str::to_string),
                        error: err.to_string(),
                    },
                };
                let item = BatchItem {
                    record,
                    prompt,
                    outcome,
                };
                let entry = ReportEntry::from_item(&item, &self.fields);
                entry.log();
                entry
            })
            .collect();

        let report = RunReport::new(run_id, entries);
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "run finished"
        );
        Ok(report)
    }
}
