//! Extension to content-type mapping.

use std::collections::HashMap;
use std::path::Path;

/// Content type sent for files whose extension is not registered.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const BUILTIN: &[(&str, &str)] = &[
    (".js", "application/javascript"),
    (".html", "text/html; charset=utf-8"),
    (".htm", "text/html; charset=utf-8"),
    (".css", "text/css"),
    (".json", "application/json; charset=utf-8"),
    (".txt", "text/plain"),
    (".xml", "text/xml"),
    (".jpeg", "image/jpeg"),
    (".jpg", "image/jpeg"),
    (".png", "image/png"),
    (".svg", "image/svg+xml"),
    (".pdf", "application/pdf"),
    (".ppt", "application/vnd.ms-powerpoint"),
    (".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    (".xls", "application/vnd.ms-excel"),
    (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    (".ttf", "font/ttf"),
    (".tif", "image/tiff"),
    (".tiff", "image/tiff"),
    (".vsd", "application/vnd.visio"),
    (".wav", "audio/wav"),
    (".weba", "audio/webm"),
    (".webm", "video/webm"),
    (".webp", "image/webp"),
    (".woff", "font/woff"),
    (".woff2", "font/woff2"),
    (".xhtml", "application/xhtml+xml"),
    (".oga", "audio/ogg"),
    (".ogv", "video/ogg"),
    (".ogx", "application/ogg"),
    (".otf", "font/otf"),
    (".mp3", "audio/mpeg"),
    (".mpeg", "video/mpeg"),
    (".mjs", "text/javascript"),
    (".ico", "image/vnd.microsoft.icon"),
    (".mid", "audio/midi"),
    (".midi", "audio/x-midi"),
    (".doc", "application/msword"),
    (".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    (".csv", "text/csv"),
    (".arc", "application/x-freearc"),
    (".abw", "application/x-abiword"),
    (".md", "text/markdown; charset=UTF-8"),
];

/// Maps lowercase file extensions (with the leading dot) to MIME types.
///
/// Built once before the server starts and shared read-only between
/// connections afterwards.
#[derive(Debug, Clone)]
pub struct ContentTypeRegistry {
    types: HashMap<String, String>,
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTypeRegistry {
    /// A registry holding the built-in table.
    pub fn new() -> Self {
        let types = BUILTIN
            .iter()
            .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
            .collect();
        Self { types }
    }

    /// Register or replace the content type for an extension.
    ///
    /// `extension` may be given with or without the leading dot, in any case.
    pub fn define(&mut self, extension: &str, content_type: impl Into<String>) {
        self.types.insert(normalize(extension), content_type.into());
    }

    /// The registered content type for an extension, if any.
    pub fn get(&self, extension: &str) -> Option<&str> {
        self.types.get(&normalize(extension)).map(String::as_str)
    }

    /// The content type to send for a file path.
    pub fn for_path(&self, path: &Path) -> &str {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get(ext))
            .unwrap_or(FALLBACK_CONTENT_TYPE)
    }
}

fn normalize(extension: &str) -> String {
    let lower = extension.to_ascii_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}
