//! Photo and file attachments
//!
//! An attachment is either already stored (it has a URL, possibly an inline
//! `data:` URL when the upload happened offline) or still pending, carrying
//! its bytes until a synchronizer save uploads them.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Reference to stored content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

impl FileRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: None,
            original_name: None,
            upload_date: None,
        }
    }

    /// Content embedded in the URL itself rather than in blob storage
    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// Content selected on the device but not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
    pub file_name: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attachment {
    Stored(FileRef),
    Pending(PendingUpload),
}

impl Attachment {
    pub fn stored(url: impl Into<String>) -> Self {
        Attachment::Stored(FileRef::new(url))
    }

    pub fn pending(file_name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Attachment::Pending(PendingUpload {
            file_name: file_name.into(),
            content_type: content_type.into(),
            category: None,
            data,
        })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Attachment::Stored(file) => Some(&file.url),
            Attachment::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Attachment::Pending(_))
    }
}

/// Serde adapter storing bytes as standard base64 text
pub mod base64_bytes {
    use super::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Inline `data:` URL for content that could not be uploaded
pub fn data_url(content_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_shapes() {
        let stored: Attachment = serde_json::from_value(json!({
            "url": "https://cdn.example/valves/v1/a.jpg",
            "originalName": "a.jpg"
        }))
        .unwrap();
        assert_eq!(stored.url(), Some("https://cdn.example/valves/v1/a.jpg"));

        let pending: Attachment = serde_json::from_value(json!({
            "fileName": "nameplate.png",
            "contentType": "image/png",
            "data": "AQID"
        }))
        .unwrap();
        match pending {
            Attachment::Pending(upload) => assert_eq!(upload.data, vec![1, 2, 3]),
            other => panic!("expected pending upload, got {:?}", other),
        }
    }

    #[test]
    fn test_data_url() {
        let url = data_url("image/png", &[1, 2, 3]);
        assert_eq!(url, "data:image/png;base64,AQID");
        assert!(FileRef::new(url).is_inline());
        assert!(!FileRef::new("https://x/y").is_inline());
    }
}
