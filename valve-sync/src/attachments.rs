//! Resolution of pending uploads before a record is stored
//!
//! Pending photos and files are pushed to blob storage when the backend is
//! reachable. Otherwise, or when an upload fails, the content is inlined as
//! a `data:` URL so the record stays complete on the device.

use crate::model::{Attachment, FileRef, PendingUpload, ValveRecord};
use crate::remote::RemoteGateway;
use chrono::Utc;
use logger_redacted::redact;
use uuid::Uuid;

/// Turns pending attachments into stored file references
pub struct AttachmentResolver<'a> {
    gateway: &'a dyn RemoteGateway,
    bucket: &'a str,
}

impl<'a> AttachmentResolver<'a> {
    pub fn new(gateway: &'a dyn RemoteGateway, bucket: &'a str) -> Self {
        Self { gateway, bucket }
    }

    /// Resolve the photo and every file of `record` in place
    pub async fn resolve_record(&self, record: &mut ValveRecord, valve_id: &str) {
        if !record.has_pending_uploads() {
            return;
        }

        let online = self.gateway.is_reachable().await;

        if let Some(photo) = record.valve_photo.take() {
            record.valve_photo = Some(self.resolve(photo, valve_id, online).await);
        }

        let files = std::mem::take(&mut record.files);
        for file in files {
            let resolved = self.resolve(file, valve_id, online).await;
            record.files.push(resolved);
        }
    }

    async fn resolve(&self, attachment: Attachment, valve_id: &str, online: bool) -> Attachment {
        match attachment {
            Attachment::Stored(file) => Attachment::Stored(file),
            Attachment::Pending(upload) => Attachment::Stored(self.store(upload, valve_id, online).await),
        }
    }

    async fn store(&self, upload: PendingUpload, valve_id: &str, online: bool) -> FileRef {
        let PendingUpload {
            file_name,
            content_type,
            category,
            data,
        } = upload;

        let url = if online {
            let path = upload_path(valve_id, &file_name);
            match self
                .gateway
                .upload(self.bucket, &path, data.clone(), &content_type)
                .await
            {
                Ok(url) => {
                    tracing::debug!(valve_id, path = %path, bytes = data.len(), "Uploaded attachment");
                    url
                }
                Err(e) => {
                    tracing::warn!(
                        valve_id,
                        error = %redact(&e.to_string()),
                        "Attachment upload failed; storing inline"
                    );
                    crate::model::attachment::data_url(&content_type, &data)
                }
            }
        } else {
            tracing::debug!(valve_id, "Offline; storing attachment inline");
            crate::model::attachment::data_url(&content_type, &data)
        };

        FileRef {
            url,
            category,
            original_name: Some(file_name),
            upload_date: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Blob path `valves/<valve id>/<uuid>-<file name>`
pub fn upload_path(valve_id: &str, file_name: &str) -> String {
    let safe_name: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!("valves/{}/{}-{}", valve_id, Uuid::new_v4(), safe_name)
}
