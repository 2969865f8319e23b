//! Cache key layout shared by the cache manager and the identity mapping.
//!
//! - `file_info:{file_id}`: serialized file record
//! - `md5:{content_hash}`: content hash to file id
//! - `id:{file_id}`: file id to stored path
//! - `file:{content_hash}`: content hash to stored path
//! - `url_mapping:{md5(url)}`: source URL to file id
//! - `retired:{file_id}`: tombstone of a deleted id
//! - `{method}_{content_hash}`: conversion result path (`pdf_`, `xlsx_`, `original_`)

use docview_core::file_utils::md5_str;

pub const FILE_INFO_PREFIX: &str = "file_info:";

pub fn file_info(file_id: &str) -> String {
    format!("{}{}", FILE_INFO_PREFIX, file_id)
}

/// Glob matching every file record key.
pub fn file_info_pattern() -> String {
    format!("{}*", FILE_INFO_PREFIX)
}

pub fn md5(content_hash: &str) -> String {
    format!("md5:{}", content_hash)
}

pub fn id(file_id: &str) -> String {
    format!("id:{}", file_id)
}

pub fn content(content_hash: &str) -> String {
    format!("file:{}", content_hash)
}

pub fn url_mapping(url: &str) -> String {
    format!("url_mapping:{}", md5_str(url))
}

pub fn retired(file_id: &str) -> String {
    format!("retired:{}", file_id)
}

pub fn conversion(method: &str, content_hash: &str) -> String {
    format!("{}_{}", method, content_hash)
}

/// Namespaces owned by the identity mapping. Their entries only make sense as a
/// group, so size eviction never touches them one by one.
const IDENTITY_PREFIXES: [&str; 6] = [
    FILE_INFO_PREFIX,
    "md5:",
    "id:",
    "file:",
    "url_mapping:",
    "retired:",
];

pub fn is_identity_key(key: &str) -> bool {
    IDENTITY_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        assert_eq!(file_info("abc"), "file_info:abc");
        assert_eq!(md5("ff"), "md5:ff");
        assert_eq!(conversion("pdf", "ff"), "pdf_ff");
        assert_eq!(
            url_mapping("http://x/y.docx"),
            format!("url_mapping:{}", md5_str("http://x/y.docx"))
        );
        assert!(file_info("abc").starts_with(&file_info_pattern()[..FILE_INFO_PREFIX.len()]));
    }

    #[test]
    fn identity_keys_are_recognized() {
        for key in [
            file_info("a"),
            md5("ff"),
            id("a"),
            content("ff"),
            url_mapping("http://x"),
            retired("a"),
        ] {
            assert!(is_identity_key(&key), "{}", key);
        }
        assert!(!is_identity_key(&conversion("pdf", "ff")));
        assert!(!is_identity_key("misc"));
    }
}
