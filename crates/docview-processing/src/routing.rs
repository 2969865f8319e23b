use crate::traits::TargetFormat;

/// How a supported extension is turned into a stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionRoute {
    /// Word and PowerPoint documents are rendered to PDF
    ToPdf,
    /// Legacy spreadsheets are normalized to XLSX
    XlsToXlsx,
    /// Already viewable formats are stored as-is
    CacheOnly,
}

impl ConversionRoute {
    /// Route for a lower-case extension with leading dot; `None` for anything
    /// outside the routing table.
    pub fn for_extension(extension: &str) -> Option<Self> {
        match extension {
            ".doc" | ".docx" | ".ppt" | ".pptx" => Some(ConversionRoute::ToPdf),
            ".xls" => Some(ConversionRoute::XlsToXlsx),
            ".xlsx" | ".pdf" => Some(ConversionRoute::CacheOnly),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<TargetFormat> {
        match self {
            ConversionRoute::ToPdf => Some(TargetFormat::Pdf),
            ConversionRoute::XlsToXlsx => Some(TargetFormat::Xlsx),
            ConversionRoute::CacheOnly => None,
        }
    }

    /// Prefix of the conversion-result cache key.
    pub fn cache_method(&self) -> &'static str {
        match self {
            ConversionRoute::ToPdf => "pdf",
            ConversionRoute::XlsToXlsx => "xlsx",
            ConversionRoute::CacheOnly => "original",
        }
    }

    /// Recorded as `conversion_method` on the converted info.
    pub fn method_name(&self) -> &'static str {
        match self {
            ConversionRoute::ToPdf => "libreoffice_pdf",
            ConversionRoute::XlsToXlsx => "libreoffice_xlsx",
            ConversionRoute::CacheOnly => "passthrough",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table() {
        assert_eq!(ConversionRoute::for_extension(".docx"), Some(ConversionRoute::ToPdf));
        assert_eq!(ConversionRoute::for_extension(".ppt"), Some(ConversionRoute::ToPdf));
        assert_eq!(ConversionRoute::for_extension(".xls"), Some(ConversionRoute::XlsToXlsx));
        assert_eq!(ConversionRoute::for_extension(".xlsx"), Some(ConversionRoute::CacheOnly));
        assert_eq!(ConversionRoute::for_extension(".pdf"), Some(ConversionRoute::CacheOnly));
        assert_eq!(ConversionRoute::for_extension(".odt"), None);
    }

    #[test]
    fn passthrough_has_no_target() {
        assert!(ConversionRoute::CacheOnly.target().is_none());
        assert_eq!(ConversionRoute::XlsToXlsx.target(), Some(TargetFormat::Xlsx));
        assert_eq!(ConversionRoute::XlsToXlsx.cache_method(), "xlsx");
    }
}
