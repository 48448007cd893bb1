use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::RemoteError;
use crate::notion::{build_external_file_properties, NotionService};
use crate::retry::RetryPolicy;

pub struct WriteBackGateway {
    notion: Arc<dyn NotionService>,
    property: String,
    retry: RetryPolicy,
}

impl WriteBackGateway {
    /// `property` is the native label of the files field receiving the image.
    pub fn new(notion: Arc<dyn NotionService>, property: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            notion,
            property: property.into(),
            retry,
        }
    }

    /// Replace the target field with a single external reference to `url`.
    /// Re-running for the same record overwrites; an empty `url` is a no-op.
    #[instrument(skip(self, url, display_name))]
    pub async fn write(&self, record_id: &str, url: &str, display_name: &str) -> Result<(), RemoteError> {
        if url.is_empty() {
            return Ok(());
        }
        let notion = &self.notion;
        let properties = &build_external_file_properties(&self.property, display_name, url);
        self.retry
            .run("notion.update_page", move || {
                notion.update_page(record_id, properties.clone())
            })
            .await?;
        debug!(record_id, url, "image written back");
        Ok(())
    }
}
