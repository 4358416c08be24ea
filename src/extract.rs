//! Archive extraction: zip upload → bounded [`ExtractionContext`].
//!
//! Walks the archive once, in entry order, and collects four signals:
//!
//! - the first package manifest outside `node_modules`,
//! - the first README outside `node_modules`,
//! - up to [`MAX_SNIPPETS`] excerpts of priority source files,
//! - a two-level directory digest of the whole tree.
//!
//! Every read is bounded. Entries are decompressed through `Read::take`, so a
//! zip bomb costs at most [`MAX_ENTRY_BYTES`] per entry that is actually read,
//! and only manifest, README, and snippet candidates are ever read.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::ArchiveError;
use crate::models::ExtractionContext;

/// Maximum number of source excerpts in the context.
pub const MAX_SNIPPETS: usize = 10;
/// Files with this many characters or more are never excerpted.
pub const MAX_SNIPPET_SOURCE_CHARS: usize = 15_000;
/// Each excerpt keeps at most this many characters of its file.
pub const MAX_SNIPPET_CHARS: usize = 3_000;
/// Second-level names listed per top-level directory before eliding.
pub const MAX_TREE_CHILDREN: usize = 9;
/// Largest accepted upload.
pub const MAX_ARCHIVE_BYTES: usize = 100 * 1024 * 1024;
/// Maximum decompressed bytes read from a single entry.
pub const MAX_ENTRY_BYTES: u64 = 8 * 1024 * 1024;

pub const EMPTY_MANIFEST: &str = "{}";
pub const NO_README: &str = "No README provided in root directory";
pub const NO_SNIPPETS: &str = "No core architectural code files extracted.";
pub const FLAT_TREE_SUMMARY: &str = "Standard flattened or empty file structure.";

const DEPENDENCY_DIR: &str = "node_modules";

const MANIFEST_NAMES: &[&str] = &[
    "package.json",
    "cargo.toml",
    "pyproject.toml",
    "go.mod",
    "pom.xml",
    "composer.json",
];

const README_NAMES: &[&str] = &["readme.md", "readme.txt"];

/// Directories whose contents never produce snippets.
const SNIPPET_EXCLUDED_DIRS: &[&str] = &["node_modules", ".next", "dist", "build"];

/// Top-level directories left out of the tree digest.
const TREE_EXCLUDED_TOP_DIRS: &[&str] = &["node_modules", ".git", ".next"];

/// Path suffixes eligible for snippets (matched on the lower-cased path).
const PRIORITY_SUFFIXES: &[&str] = &[
    ".ts",
    ".tsx",
    ".schema.prisma",
    "schema.prisma",
    ".js",
    ".jsx",
    ".py",
    ".java",
    ".go",
];

/// Extract a context from an archive on disk.
///
/// The project name is the file name without its last extension.
pub fn extract_file(path: &Path, model_id: &str) -> Result<ExtractionContext, ArchiveError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    extract(&project_name_from_file_name(&file_name), &bytes, model_id)
}

/// Strip the last extension: `shop.v2.zip` → `shop.v2`.
pub fn project_name_from_file_name(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => file_name[..idx].to_string(),
        _ => file_name.to_string(),
    }
}

/// Turn zip bytes into an [`ExtractionContext`].
///
/// # Errors
///
/// [`ArchiveError`] when the input is empty, larger than
/// [`MAX_ARCHIVE_BYTES`], not a zip container, has no file entries, or has an
/// entry that cannot be decompressed.
pub fn extract(
    project_name: &str,
    bytes: &[u8],
    model_id: &str,
) -> Result<ExtractionContext, ArchiveError> {
    if bytes.is_empty() {
        return Err(ArchiveError::Empty);
    }
    if bytes.len() > MAX_ARCHIVE_BYTES {
        return Err(ArchiveError::TooLarge {
            size: bytes.len(),
            limit: MAX_ARCHIVE_BYTES,
        });
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ArchiveError::Malformed(e.to_string()))?;

    let mut paths: Vec<String> = Vec::new();
    let mut manifest: Option<String> = None;
    let mut readme: Option<String> = None;
    let mut snippets = String::new();
    let mut snippet_count = 0usize;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().replace('\\', "/");
        let lower = path.to_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);
        let in_dependencies = has_dir_component(&lower, &[DEPENDENCY_DIR]);

        if manifest.is_none() && !in_dependencies && MANIFEST_NAMES.contains(&file_name) {
            manifest = Some(read_entry_text(&mut entry, &path)?);
        } else if readme.is_none() && !in_dependencies && README_NAMES.contains(&file_name) {
            readme = Some(read_entry_text(&mut entry, &path)?);
        } else if snippet_count < MAX_SNIPPETS
            && !has_dir_component(&lower, SNIPPET_EXCLUDED_DIRS)
            && is_priority_source(&lower)
        {
            let text = read_entry_text(&mut entry, &path)?;
            if text.chars().count() < MAX_SNIPPET_SOURCE_CHARS {
                let excerpt: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
                snippets.push_str(&format!("\n\n--- FILE: {} ---\n{}", path, excerpt));
                snippet_count += 1;
            } else {
                tracing::debug!(path = %path, "skipping oversized snippet candidate");
            }
        }

        paths.push(path);
    }

    if paths.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let file_tree_summary = summarize_tree(paths.iter().map(String::as_str));

    tracing::info!(
        project = project_name,
        files = paths.len(),
        snippets = snippet_count,
        manifest = manifest.is_some(),
        readme = readme.is_some(),
        "extracted archive"
    );

    Ok(ExtractionContext {
        project_name: project_name.to_string(),
        file_tree_summary,
        manifest_text: manifest
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| EMPTY_MANIFEST.to_string()),
        readme_text: readme
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| NO_README.to_string()),
        source_snippets: if snippets.is_empty() {
            NO_SNIPPETS.to_string()
        } else {
            snippets
        },
        snippet_count,
        model_id: model_id.to_string(),
    })
}

/// Read an entry as lossy UTF-8, stopping at [`MAX_ENTRY_BYTES`].
fn read_entry_text<R: Read>(entry: &mut R, name: &str) -> Result<String, ArchiveError> {
    let mut buf = Vec::new();
    entry
        .take(MAX_ENTRY_BYTES)
        .read_to_end(&mut buf)
        .map_err(|e| ArchiveError::Entry {
            name: name.to_string(),
            message: e.to_string(),
        })?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// True when any directory component (not the file name) is in `dirs`.
fn has_dir_component(path: &str, dirs: &[&str]) -> bool {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    parts.iter().any(|p| dirs.contains(p))
}

fn is_priority_source(path: &str) -> bool {
    PRIORITY_SUFFIXES.iter().any(|ext| path.ends_with(ext))
}

/// Two-level digest of archive paths, in first-seen order.
///
/// Root-level files are not counted. Paths under an excluded top-level
/// directory are skipped entirely.
pub fn summarize_tree<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut dirs: Vec<(&'a str, Vec<&'a str>)> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut file_count = 0usize;

    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 2 || TREE_EXCLUDED_TOP_DIRS.contains(&parts[0]) {
            continue;
        }

        let slot = *index.entry(parts[0]).or_insert_with(|| {
            dirs.push((parts[0], Vec::new()));
            dirs.len() - 1
        });
        if parts.len() > 2 {
            let children = &mut dirs[slot].1;
            if !children.contains(&parts[1]) {
                children.push(parts[1]);
            }
        }
        file_count += 1;
    }

    if dirs.is_empty() {
        return FLAT_TREE_SUMMARY.to_string();
    }

    let mut out = format!(
        "Total Extracted Files (excluding node_modules/git): ~{}\n\n",
        file_count
    );
    for (dir, children) in &dirs {
        out.push_str(&format!("- {}/\n", dir));
        for child in children.iter().take(MAX_TREE_CHILDREN) {
            out.push_str(&format!("  - {}/\n", child));
        }
        if children.len() > MAX_TREE_CHILDREN {
            out.push_str("  - ...\n");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in files {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn block_count(snippets: &str) -> usize {
        snippets.matches("--- FILE: ").count()
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(extract("p", b"", "m"), Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_not_a_zip_is_error() {
        let err = extract("p", b"definitely not a zip", "m").unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed(_)));
    }

    #[test]
    fn test_zip_without_files_is_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            zip.add_directory("src/", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(extract("p", &buf, "m"), Err(ArchiveError::Empty)));
    }

    #[test]
    fn test_snippets_capped_at_ten() {
        let bodies: Vec<(String, String)> = (0..14)
            .map(|i| (format!("src/file{:02}.ts", i), "x".repeat(5_000)))
            .collect();
        let files: Vec<(&str, &str)> = bodies
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_str()))
            .collect();

        let ctx = extract("p", &zip_of(&files), "m").unwrap();
        assert_eq!(ctx.snippet_count, 10);
        assert_eq!(block_count(&ctx.source_snippets), 10);
        assert!(ctx.source_snippets.contains("src/file09.ts"));
        assert!(!ctx.source_snippets.contains("src/file10.ts"));
        for block in ctx.source_snippets.split("--- FILE: ").skip(1) {
            let body = block.split_once("---\n").unwrap().1.trim_end();
            assert!(body.chars().count() <= MAX_SNIPPET_CHARS);
        }
    }

    #[test]
    fn test_excluded_directories_never_snippeted() {
        let files = [
            ("node_modules/lib/index.js", "dep"),
            ("dist/bundle.js", "bundle"),
            ("web/.next/server.js", "cache"),
            ("app/build/out.js", "out"),
            ("src/main.ts", "real code"),
        ];
        let ctx = extract("p", &zip_of(&files), "m").unwrap();
        assert_eq!(ctx.snippet_count, 1);
        assert!(ctx.source_snippets.contains("--- FILE: src/main.ts ---\nreal code"));
        assert!(!ctx.source_snippets.contains("node_modules"));
        assert!(!ctx.source_snippets.contains("dist/"));
    }

    #[test]
    fn test_oversized_file_skipped() {
        let big = "a".repeat(MAX_SNIPPET_SOURCE_CHARS);
        let just_under = "b".repeat(MAX_SNIPPET_SOURCE_CHARS - 1);
        let files = [("src/big.py", big.as_str()), ("src/ok.py", just_under.as_str())];
        let ctx = extract("p", &zip_of(&files), "m").unwrap();
        assert_eq!(ctx.snippet_count, 1);
        assert!(!ctx.source_snippets.contains("src/big.py"));
        assert!(ctx.source_snippets.contains("src/ok.py"));
    }

    #[test]
    fn test_non_priority_files_ignored() {
        let files = [("src/style.css", "body{}"), ("docs/notes.md", "# hi")];
        let ctx = extract("p", &zip_of(&files), "m").unwrap();
        assert_eq!(ctx.snippet_count, 0);
        assert_eq!(ctx.source_snippets, NO_SNIPPETS);
    }

    #[test]
    fn test_first_manifest_and_readme_win() {
        let files = [
            ("node_modules/x/package.json", "{\"name\":\"dep\"}"),
            ("package.json", "{\"name\":\"root\"}"),
            ("client/package.json", "{\"name\":\"client\"}"),
            ("README.md", "root readme"),
            ("docs/readme.txt", "second readme"),
        ];
        let bytes = zip_of(&files);
        let first = extract("p", &bytes, "m").unwrap();
        assert_eq!(first.manifest_text, "{\"name\":\"root\"}");
        assert_eq!(first.readme_text, "root readme");

        let second = extract("p", &bytes, "m").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_defaults_when_absent() {
        let ctx = extract("p", &zip_of(&[("main.go", "package main")]), "m").unwrap();
        assert_eq!(ctx.manifest_text, EMPTY_MANIFEST);
        assert_eq!(ctx.readme_text, NO_README);
        assert_eq!(ctx.file_tree_summary, FLAT_TREE_SUMMARY);
        assert_eq!(ctx.snippet_count, 1);
    }

    #[test]
    fn test_snippet_keeps_multibyte_characters_intact() {
        let body = "é".repeat(4_000);
        let ctx = extract("p", &zip_of(&[("src/accents.js", body.as_str())]), "m").unwrap();
        let excerpt = ctx.source_snippets.split("---\n").nth(1).unwrap();
        assert_eq!(excerpt.chars().count(), MAX_SNIPPET_CHARS);
        assert!(excerpt.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_tree_summary_caps_children() {
        let mut paths: Vec<String> = (0..12).map(|i| format!("src/mod{:02}/lib.ts", i)).collect();
        paths.push("api/routes/users.ts".to_string());
        paths.push("api/index.ts".to_string());
        let summary = summarize_tree(paths.iter().map(String::as_str));

        assert!(summary.starts_with("Total Extracted Files (excluding node_modules/git): ~14\n\n"));
        let src_block = summary
            .split("- api/")
            .next()
            .unwrap()
            .split("- src/\n")
            .nth(1)
            .unwrap();
        assert_eq!(src_block.matches("  - mod").count(), 9);
        assert_eq!(src_block.matches("  - ...").count(), 1);
        assert!(summary.contains("- api/\n  - routes/\n"));
        assert!(!summary.contains("index.ts"));
    }

    #[test]
    fn test_tree_summary_skips_excluded_top_dirs() {
        let paths = [
            "node_modules/react/index.js",
            ".git/HEAD",
            ".next/cache/a",
            "README.md",
        ];
        assert_eq!(summarize_tree(paths), FLAT_TREE_SUMMARY);
    }

    #[test]
    fn test_project_name_from_file_name() {
        assert_eq!(project_name_from_file_name("shop.zip"), "shop");
        assert_eq!(project_name_from_file_name("shop.v2.zip"), "shop.v2");
        assert_eq!(project_name_from_file_name("shop"), "shop");
        assert_eq!(project_name_from_file_name("shop."), "shop.");
    }
}
