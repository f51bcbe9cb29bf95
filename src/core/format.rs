//! Document format classification.
//!
//! The format is decided once, when a remote file is listed, and drives both
//! the download strategy and the text extractor.

use serde::{Deserialize, Serialize};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const NATIVE_DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
const NATIVE_PRESENTATION_MIME: &str = "application/vnd.google-apps.presentation";
const NATIVE_SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Pdf,
    Docx,
    PlainText,
    /// Native document that must be exported by the store to obtain text
    NativeExport,
    Unsupported,
}

impl FileFormat {
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.split(';').next().unwrap_or_default().trim();
        match mime {
            PDF_MIME => Self::Pdf,
            DOCX_MIME => Self::Docx,
            NATIVE_DOCUMENT_MIME | NATIVE_PRESENTATION_MIME | NATIVE_SPREADSHEET_MIME => {
                Self::NativeExport
            }
            "application/json" | "application/xml" | "application/x-yaml"
            | "application/javascript" | "application/rtf" => Self::PlainText,
            m if m.starts_with("text/") => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    #[must_use]
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Export target for native documents
    #[must_use]
    pub fn export_mime(mime: &str) -> &'static str {
        if mime == NATIVE_SPREADSHEET_MIME {
            "text/csv"
        } else {
            "text/plain"
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "text",
            Self::NativeExport => "native",
            Self::Unsupported => "unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_known_mime_types() {
        assert_eq!(FileFormat::from_mime("application/pdf"), FileFormat::Pdf);
        assert_eq!(FileFormat::from_mime(DOCX_MIME), FileFormat::Docx);
        assert_eq!(FileFormat::from_mime("text/markdown"), FileFormat::PlainText);
        assert_eq!(
            FileFormat::from_mime("text/plain; charset=utf-8"),
            FileFormat::PlainText
        );
        assert_eq!(
            FileFormat::from_mime(NATIVE_DOCUMENT_MIME),
            FileFormat::NativeExport
        );
        assert_eq!(FileFormat::from_mime("image/png"), FileFormat::Unsupported);
        assert_eq!(FileFormat::from_mime("application/zip"), FileFormat::Unsupported);
    }

    #[test]
    fn test_export_mime() {
        assert_eq!(FileFormat::export_mime(NATIVE_SPREADSHEET_MIME), "text/csv");
        assert_eq!(FileFormat::export_mime(NATIVE_DOCUMENT_MIME), "text/plain");
    }
}
