//! Prompts/resources cache manager (C11, §4.11): a two-tier cache over a
//! templated-file tree, filled lazily and invalidated by a file watcher.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use regex::Regex;

/// Which of the two cache trees an entry (or a lookup) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Prompt,
    Resource,
}

/// Supported content formats, recognized by extension. Unknown
/// extensions are ignored (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Markdown,
    Text,
    JavaScript,
    TypeScript,
    Json,
    Yaml,
}

impl ContentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "mts" => Some(Self::TypeScript),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// One cached prompt or resource entry (§3 `CacheEntry (prompts/resources)`).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub relative_path: PathBuf,
    pub name: String,
    pub format: ContentFormat,
    pub content: String,
    pub parameters: Vec<String>,
    pub has_parameters: bool,
    pub mtime: SystemTime,
}

/// Extract every distinct `{{name}}` occurrence, in first-seen order.
pub fn extract_parameters(content: &str) -> Vec<String> {
    let re = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static pattern is valid");
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cap in re.captures_iter(content) {
        let name = cap[1].to_string();
        if seen.insert(name.clone()) {
            out.push(name);
        }
    }
    out
}

#[derive(Default)]
struct TierStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TierStats {
    fn snapshot(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// Observability snapshot: hits/misses per tier (§4.11: "tracks
/// hits/misses per type for observability").
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatsSnapshot {
    pub prompt_hits: u64,
    pub prompt_misses: u64,
    pub resource_hits: u64,
    pub resource_misses: u64,
}

/// Two-tier cache (one map per [`CacheKind`]) keyed by path relative to
/// each tier's root.
pub struct CacheManager {
    prompts_root: PathBuf,
    resources_root: PathBuf,
    prompts: DashMap<PathBuf, CacheEntry>,
    resources: DashMap<PathBuf, CacheEntry>,
    prompt_stats: TierStats,
    resource_stats: TierStats,
}

impl CacheManager {
    pub fn new(prompts_root: impl Into<PathBuf>, resources_root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            prompts_root: prompts_root.into(),
            resources_root: resources_root.into(),
            prompts: DashMap::new(),
            resources: DashMap::new(),
            prompt_stats: TierStats::default(),
            resource_stats: TierStats::default(),
        })
    }

    fn root(&self, kind: CacheKind) -> &Path {
        match kind {
            CacheKind::Prompt => &self.prompts_root,
            CacheKind::Resource => &self.resources_root,
        }
    }

    fn map(&self, kind: CacheKind) -> &DashMap<PathBuf, CacheEntry> {
        match kind {
            CacheKind::Prompt => &self.prompts,
            CacheKind::Resource => &self.resources,
        }
    }

    fn stats(&self, kind: CacheKind) -> &TierStats {
        match kind {
            CacheKind::Prompt => &self.prompt_stats,
            CacheKind::Resource => &self.resource_stats,
        }
    }

    /// Read one entry by path relative to the tier's root, filling the
    /// cache on miss. Returns `Ok(None)` for files with an unsupported
    /// extension or that don't exist.
    pub fn get(
        &self,
        kind: CacheKind,
        relative_path: &Path,
    ) -> std::io::Result<Option<CacheEntry>> {
        if let Some(entry) = self.map(kind).get(relative_path) {
            self.stats(kind).hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry.clone()));
        }
        self.stats(kind).misses.fetch_add(1, Ordering::Relaxed);

        let full_path = self.root(kind).join(relative_path);
        let Some(entry) = self.load_entry(relative_path, &full_path)? else {
            return Ok(None);
        };
        self.map(kind).insert(relative_path.to_path_buf(), entry.clone());
        Ok(Some(entry))
    }

    fn load_entry(
        &self,
        relative_path: &Path,
        full_path: &Path,
    ) -> std::io::Result<Option<CacheEntry>> {
        let Some(format) = full_path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ContentFormat::from_extension)
        else {
            return Ok(None);
        };
        if !full_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(full_path)?;
        let metadata = std::fs::metadata(full_path)?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let parameters = extract_parameters(&content);
        let name = relative_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Some(CacheEntry {
            relative_path: relative_path.to_path_buf(),
            name,
            format,
            has_parameters: !parameters.is_empty(),
            parameters,
            content,
            mtime,
        }))
    }

    /// List every supported entry under a tier's root, filling the cache
    /// for any that aren't already present.
    pub fn list(&self, kind: CacheKind) -> std::io::Result<Vec<CacheEntry>> {
        let mut out = Vec::new();
        let root = self.root(kind).to_path_buf();
        if !root.exists() {
            return Ok(out);
        }
        for relative in walk_relative(&root, &root)? {
            if let Some(entry) = self.get(kind, &relative)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Evict one entry, e.g. in response to a filesystem event.
    pub fn evict(&self, kind: CacheKind, relative_path: &Path) {
        self.map(kind).remove(relative_path);
    }

    pub fn stats_snapshot(&self) -> CacheStatsSnapshot {
        let (prompt_hits, prompt_misses) = self.prompt_stats.snapshot();
        let (resource_hits, resource_misses) = self.resource_stats.snapshot();
        CacheStatsSnapshot {
            prompt_hits,
            prompt_misses,
            resource_hits,
            resource_misses,
        }
    }

    pub fn prompts_root(&self) -> &Path {
        &self.prompts_root
    }

    pub fn resources_root(&self) -> &Path {
        &self.resources_root
    }
}

fn walk_relative(root: &Path, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_relative(root, &path)?);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_distinct_parameters_in_order() {
        let params = extract_parameters("hello {{name}}, your id is {{id}} ({{name}} again)");
        assert_eq!(params, vec!["name".to_string(), "id".to_string()]);
    }

    #[test]
    fn unsupported_extension_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.bin"), b"\x00\x01").unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let result = manager.get(CacheKind::Prompt, Path::new("notes.bin")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn fills_on_miss_and_hits_on_second_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greet.md"), "hi {{name}}").unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), dir.path().to_path_buf());

        let first = manager.get(CacheKind::Prompt, Path::new("greet.md")).unwrap().unwrap();
        assert_eq!(first.parameters, vec!["name".to_string()]);
        assert!(first.has_parameters);

        let _second = manager.get(CacheKind::Prompt, Path::new("greet.md")).unwrap().unwrap();
        let stats = manager.stats_snapshot();
        assert_eq!(stats.prompt_hits, 1);
        assert_eq!(stats.prompt_misses, 1);
    }

    #[test]
    fn evict_forces_a_reread() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "v1").unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        manager.get(CacheKind::Resource, Path::new("a.txt")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "v2").unwrap();
        manager.evict(CacheKind::Resource, Path::new("a.txt"));
        let entry = manager.get(CacheKind::Resource, Path::new("a.txt")).unwrap().unwrap();
        assert_eq!(entry.content, "v2");
    }

    #[test]
    fn list_discovers_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/b.md"), "body").unwrap();
        let manager = CacheManager::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        let entries = manager.list(CacheKind::Prompt).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b");
    }
}
