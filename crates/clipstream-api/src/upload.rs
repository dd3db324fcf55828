//! Multipart intake. Received files are spooled through [`TempUpload`]
//! guards, so any handler that bails out with a validation error drops
//! the guards and the temp files are gone before the error propagates.

use std::collections::HashMap;
use std::path::Path;

use axum::extract::Multipart;

use clipstream_media::TempUpload;

use crate::error::ApiError;

pub struct UploadForm {
    texts: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl UploadForm {
    /// Drain a multipart body. Fields named in `file_fields` are spooled
    /// to `spool_dir`; everything else is read as text.
    pub async fn read(
        multipart: &mut Multipart,
        spool_dir: &Path,
        file_fields: &[&str],
    ) -> Result<Self, ApiError> {
        let mut texts = HashMap::new();
        let mut files = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if file_fields.contains(&name.as_str()) {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?;
                if data.is_empty() {
                    continue;
                }
                let upload = TempUpload::write(spool_dir, &file_name, &data)
                    .await
                    .map_err(|e| ApiError::Internal(format!("failed to spool upload: {e}")))?;
                files.insert(name, upload);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?;
                texts.insert(name, value);
            }
        }

        Ok(Self { texts, files })
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.texts
            .get(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Trimmed, non-empty text field or BadRequest.
    pub fn required_text(&self, name: &str) -> Result<String, ApiError> {
        self.text(name)
            .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}
