//! Attachment validation and filename derivation.

use percent_encoding::percent_decode_str;

/// Extensions the backend accepts for uploads.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
    ".txt", ".rtf", ".odt", ".ods", ".odp",
    ".csv", ".json", ".xml",
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif",
    ".zip", ".rar", ".7z",
];

/// Lowercased dotted extension of a filename, if it has one.
pub fn file_extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .filter(|(_, ext)| !ext.is_empty())
        .map(|(_, ext)| format!(".{}", ext.to_lowercase()))
}

pub fn is_allowed_file(name: &str) -> bool {
    file_extension(name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Extensions of every file in a batch, for the rejection banner. Files
/// without an extension contribute an empty entry.
pub fn extension_list<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| file_extension(name).unwrap_or_default())
        .collect()
}

/// Decoded final path segment of an attachment URL.
pub fn file_name_from_url(data_url: &str) -> String {
    let last = data_url.rsplit('/').next().unwrap_or_default();
    let last = last.split('?').next().unwrap_or(last);
    percent_decode_str(last).decode_utf8_lossy().into_owned()
}
