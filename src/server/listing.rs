//! Directory responses: index-file substitution and generated listings.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use html_escape::encode_text;
use log::debug;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tokio::fs;
use tokio::io::AsyncWrite;

use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::files::{send_error, send_file, send_not_found};
use crate::server::mime::ContentTypeRegistry;
use crate::server::response::{HttpResponse, StatusCode};

/// Characters escaped when a file name is used as a link target.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub modified: SystemTime,
    pub is_dir: bool,
    pub size: u64,
}

/// Dotfiles are left out of listings. `..foo` is not hidden, only names
/// where the dot is followed by something other than another dot.
pub fn is_hidden(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next() == Some('.') && matches!(chars.next(), Some(c) if c != '.' && c != '/')
}

/// Directories first; within each group, oldest first.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by_key(|entry| entry.modified);
    entries.sort_by_key(|entry| !entry.is_dir);
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Render the HTML listing page.
///
/// Names are padded to line the timestamp column up behind the longest name.
pub fn render_listing(request_path: &str, entries: &[DirectoryEntry]) -> String {
    let name_width = entries
        .iter()
        .map(|entry| entry.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut html = String::from("<html><head><meta charset=\"utf-8\"/></head><body>");
    html.push_str(&format!("<h1>Index Of {}</h1><hr/><pre>", encode_text(request_path)));
    html.push_str("<a href=\"../\">../</a>\n");

    for entry in entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let shown = format!("{}{suffix}", entry.name);
        let padding = name_width + 31 - shown.chars().count();
        let size = if entry.is_dir {
            "-".to_string()
        } else {
            entry.size.to_string()
        };

        html.push_str(&format!(
            "<a href=\"{href}{suffix}\">{text}</a>{pad}{time}{gap}{size}\n",
            href = utf8_percent_encode(&entry.name, HREF),
            text = encode_text(&shown),
            pad = " ".repeat(padding),
            time = format_time(entry.modified),
            gap = " ".repeat(15),
        ));
    }

    html.push_str("</pre><hr/></body></html>");
    html
}

/// Stat the visible children of `dir`, sorted for display.
///
/// Entries that cannot be stat'ed (dangling symlinks, races with deletion)
/// are skipped.
pub async fn read_entries(dir: &Path, names: &[String]) -> Vec<DirectoryEntry> {
    let mut entries = Vec::new();
    for name in names.iter().filter(|name| !is_hidden(name)) {
        match fs::metadata(dir.join(name)).await {
            Ok(meta) => entries.push(DirectoryEntry {
                name: name.clone(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                is_dir: meta.is_dir(),
                size: meta.len(),
            }),
            Err(e) => debug!("Skipping {name} in listing: {e}"),
        }
    }
    sort_entries(&mut entries);
    entries
}

async fn child_names(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// The first configured index name that is a regular file in `dir`.
async fn find_index<'a>(dir: &Path, names: &[String], index: &'a [String]) -> Option<&'a str> {
    for candidate in index.iter().filter(|candidate| names.contains(candidate)) {
        match fs::metadata(dir.join(candidate)).await {
            Ok(metadata) if metadata.is_file() => return Some(candidate.as_str()),
            Ok(_) => debug!("Skipping index {candidate} in {}: not a file", dir.display()),
            Err(e) => debug!("Skipping index {candidate} in {}: {e}", dir.display()),
        }
    }
    None
}

/// Respond for a directory requested with a trailing slash.
///
/// The first configured index file present in the directory is served in
/// place of the directory itself; index names that are directories are
/// ignored. Otherwise a listing is generated when
/// autoindex is on, and a 404 is sent when it is off.
pub async fn send_directory<W>(
    socket: &mut W,
    config: &ServerConfig,
    registry: &ContentTypeRegistry,
    dir: &Path,
    request_path: &str,
) -> Result<StatusCode, Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let error_page = config.error_page.as_deref();
    let names = match child_names(dir).await {
        Ok(names) => names,
        Err(e) => return send_error(socket, registry, error_page, &e).await,
    };

    if let Some(index) = find_index(dir, &names, &config.index).await {
        return send_file(socket, registry, error_page, &dir.join(index)).await;
    }

    if !config.autoindex {
        send_not_found(socket, registry, error_page).await?;
        return Ok(StatusCode::NotFound);
    }

    let entries = read_entries(dir, &names).await;
    HttpResponse::new(StatusCode::Ok)
        .with_content_type("text/html; charset=utf-8")
        .with_body_string(render_listing(request_path, &entries))
        .write_to(socket)
        .await?;
    Ok(StatusCode::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(name: &str, secs: u64, is_dir: bool, size: u64) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            is_dir,
            size,
        }
    }

    #[test]
    fn hidden_names() {
        assert!(is_hidden(".hidden"));
        assert!(is_hidden(".git"));
        assert!(!is_hidden("visible.txt"));
        assert!(!is_hidden(".."));
        assert!(!is_hidden("..config"));
        assert!(!is_hidden("."));
    }

    #[test]
    fn directories_first_then_by_time() {
        let mut entries = vec![
            entry("new.txt", 300, false, 1),
            entry("old-dir", 200, true, 0),
            entry("old.txt", 100, false, 1),
            entry("new-dir", 400, true, 0),
        ];
        sort_entries(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["old-dir", "new-dir", "old.txt", "new.txt"]);
    }

    #[test]
    fn renders_aligned_lines() {
        let entries = vec![entry("a", 0, true, 4096), entry("b.txt", 86_400, false, 100)];
        let html = render_listing("/docs/", &entries);

        assert!(html.starts_with("<html><head><meta charset=\"utf-8\"/></head><body><h1>Index Of /docs/</h1><hr/><pre>"));
        assert!(html.ends_with("</pre><hr/></body></html>"));

        let expected_dir = format!(
            "<a href=\"a/\">a/</a>{}1970-01-01 00:00:00{}-\n",
            " ".repeat(5 + 31 - 2),
            " ".repeat(15)
        );
        let expected_file = format!(
            "<a href=\"b.txt\">b.txt</a>{}1970-01-02 00:00:00{}100\n",
            " ".repeat(31),
            " ".repeat(15)
        );
        let parent = html.find("<a href=\"../\">../</a>\n").unwrap();
        let dir = html.find(&expected_dir).unwrap();
        let file = html.find(&expected_file).unwrap();
        assert!(parent < dir && dir < file);
    }

    #[test]
    fn escapes_names() {
        let entries = vec![entry("a <b>#1.txt", 0, false, 1)];
        let html = render_listing("/", &entries);
        assert!(html.contains("<a href=\"a%20%3Cb%3E%231.txt\">a &lt;b&gt;#1.txt</a>"));
    }

    #[tokio::test]
    async fn listing_skips_hidden_and_orders_directories_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), vec![b'x'; 100]).unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join(".hidden"), b"secret").unwrap();

        let names = child_names(dir.path()).await.unwrap();
        let entries = read_entries(dir.path(), &names).await;
        let listed: Vec<(&str, bool, u64)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_dir, if e.is_dir { 0 } else { e.size }))
            .collect();
        assert_eq!(listed, vec![("a", true, 0), ("b.txt", false, 100)]);
    }

    #[tokio::test]
    async fn index_must_be_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("index.html")).unwrap();
        std::fs::write(dir.path().join("index.htm"), b"htm").unwrap();

        let names = child_names(dir.path()).await.unwrap();
        let index = vec!["index.html".to_string(), "index.htm".to_string()];
        assert_eq!(find_index(dir.path(), &names, &index).await, Some("index.htm"));
        assert_eq!(find_index(dir.path(), &names, &index[..1]).await, None);
    }
}
