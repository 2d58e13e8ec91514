//! Shared memory store.
//!
//! One explicitly constructed store per agency, handed to every tool
//! invocation through the execution context. Three provenance sources
//! (user uploads, agent-sourced files, chat-saved files) each keep a
//! "latest" partition that its source replaces wholesale and a "working"
//! partition derived from it by an include/exclude projection. Domain
//! tools read the working partitions only.

use parking_lot::RwLock;
use thiserror::Error;

/// One named file handle inside a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Display name, the handle agents refer to in conversation.
    pub name: String,
    /// Opaque locator (path, backend file id, URL).
    pub locator: String,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }
}

/// Provenance of a latest/working partition pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySource {
    Upload,
    Sourced,
    Chat,
}

impl MemorySource {
    /// The key agents use to address the latest partition.
    pub fn latest_key(self) -> &'static str {
        match self {
            Self::Upload => "latest_upload_memory",
            Self::Sourced => "latest_sourced_memory",
            Self::Chat => "latest_chat_memory",
        }
    }

    /// The key of the derived working partition.
    pub fn working_key(self) -> &'static str {
        match self {
            Self::Upload => "working_upload_memory",
            Self::Sourced => "working_sourced_memory",
            Self::Chat => "working_chat_memory",
        }
    }

    pub fn from_latest_key(key: &str) -> Option<Self> {
        match key {
            "latest_upload_memory" => Some(Self::Upload),
            "latest_sourced_memory" => Some(Self::Sourced),
            "latest_chat_memory" => Some(Self::Chat),
            _ => None,
        }
    }

    pub const ALL: [Self; 3] = [Self::Upload, Self::Sourced, Self::Chat];
}

/// Invalid selector combinations for a working-set update.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkingSetError {
    #[error("only one of files_to_include or files_to_exclude can be provided")]
    BothSelectors,

    #[error(
        "either files_to_include or files_to_exclude must be provided; \
         pass an empty exclude list to take every file"
    )]
    NoSelector,
}

#[derive(Default)]
struct SourceMemory {
    latest: Vec<FileEntry>,
    working: Vec<FileEntry>,
}

struct MemoryState {
    upload: SourceMemory,
    sourced: SourceMemory,
    chat: SourceMemory,
    /// Snapshot of the upload partition at the last change notification.
    previous_upload: Vec<FileEntry>,
    /// Everything ever stored, merged by name. No tool consumes it yet.
    longterm: Vec<FileEntry>,
    /// Accumulated user-facing interaction text, consumed by workflow save.
    transcript: String,
    display_all: bool,
    user_input_pending: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            upload: SourceMemory::default(),
            sourced: SourceMemory::default(),
            chat: SourceMemory::default(),
            previous_upload: Vec::new(),
            longterm: Vec::new(),
            transcript: String::new(),
            display_all: true,
            user_input_pending: false,
        }
    }
}

/// Process-lifetime shared store. Mutations are serialized by the lock,
/// so wholesale-replace semantics hold even if callers ever drive sibling
/// threads concurrently.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a source's latest partition wholesale. The entries are also
    /// merged into the consolidated longterm store by name.
    pub fn set_latest(&self, source: MemorySource, entries: Vec<FileEntry>) {
        let mut state = self.inner.write();
        for entry in &entries {
            match state.longterm.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => existing.locator = entry.locator.clone(),
                None => state.longterm.push(entry.clone()),
            }
        }
        state.source_mut(source).latest = entries;
    }

    pub fn latest(&self, source: MemorySource) -> Vec<FileEntry> {
        self.inner.read().source(source).latest.clone()
    }

    pub fn working(&self, source: MemorySource) -> Vec<FileEntry> {
        self.inner.read().source(source).working.clone()
    }

    pub fn longterm(&self) -> Vec<FileEntry> {
        self.inner.read().longterm.clone()
    }

    /// Rebuild a source's working partition from its latest partition.
    ///
    /// Exactly one selector must be supplied. `include` names 1-indexed
    /// positions to keep (out-of-range and non-numeric entries are
    /// silently skipped); an empty `exclude` copies the whole partition;
    /// a non-empty `exclude` removes the named positions. The result
    /// replaces the working partition wholesale and preserves the latest
    /// partition's relative order.
    ///
    /// Returns the number of files in the new working partition.
    pub fn update_working(
        &self,
        source: MemorySource,
        include: Option<&[String]>,
        exclude: Option<&[String]>,
    ) -> Result<usize, WorkingSetError> {
        let selection = match (include, exclude) {
            (Some(_), Some(_)) => return Err(WorkingSetError::BothSelectors),
            (None, None) => return Err(WorkingSetError::NoSelector),
            (Some(include), None) => Selection::Include(include),
            (None, Some(exclude)) => Selection::Exclude(exclude),
        };

        let mut state = self.inner.write();
        let latest = &state.source(source).latest;

        let working: Vec<FileEntry> = match selection {
            Selection::Include(indices) => {
                let keep = parse_positions(indices, latest.len());
                latest
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| keep.contains(i))
                    .map(|(_, entry)| entry.clone())
                    .collect()
            }
            Selection::Exclude(indices) => {
                let drop = parse_positions(indices, latest.len());
                latest
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !drop.contains(i))
                    .map(|(_, entry)| entry.clone())
                    .collect()
            }
        };

        let count = working.len();
        state.source_mut(source).working = working;
        tracing::debug!(
            partition = source.working_key(),
            files = count,
            "working memory updated"
        );
        Ok(count)
    }

    /// Report fresh uploads exactly once.
    ///
    /// When the latest upload partition differs from the snapshot taken at
    /// the previous call, the snapshot advances, a descriptive annotation
    /// is appended to the transcript, and the annotation is returned so
    /// the front-end can attach it to the outgoing user message.
    pub fn upload_annotation(&self) -> Option<String> {
        let mut state = self.inner.write();
        if state.upload.latest == state.previous_upload {
            return None;
        }
        state.previous_upload = state.upload.latest.clone();
        let annotation = format!(
            "📎 Attached: {} file(s). `latest_upload_memory` updated.",
            state.upload.latest.len()
        );
        state.transcript.push_str("\n\n");
        state.transcript.push_str(&annotation);
        Some(annotation)
    }

    pub fn append_transcript(&self, text: &str) {
        let mut state = self.inner.write();
        if !state.transcript.is_empty() {
            state.transcript.push_str("\n\n");
        }
        state.transcript.push_str(text);
    }

    pub fn transcript(&self) -> String {
        self.inner.read().transcript.clone()
    }

    pub fn display_all(&self) -> bool {
        self.inner.read().display_all
    }

    pub fn set_display_all(&self, value: bool) {
        self.inner.write().display_all = value;
    }

    pub fn user_input_pending(&self) -> bool {
        self.inner.read().user_input_pending
    }

    pub fn set_user_input_pending(&self, value: bool) {
        self.inner.write().user_input_pending = value;
    }
}

impl MemoryState {
    fn source(&self, source: MemorySource) -> &SourceMemory {
        match source {
            MemorySource::Upload => &self.upload,
            MemorySource::Sourced => &self.sourced,
            MemorySource::Chat => &self.chat,
        }
    }

    fn source_mut(&mut self, source: MemorySource) -> &mut SourceMemory {
        match source {
            MemorySource::Upload => &mut self.upload,
            MemorySource::Sourced => &mut self.sourced,
            MemorySource::Chat => &mut self.chat,
        }
    }
}

enum Selection<'a> {
    Include(&'a [String]),
    Exclude(&'a [String]),
}

/// Convert 1-indexed position strings to valid 0-based indices, silently
/// skipping anything non-numeric or out of range.
fn parse_positions(indices: &[String], len: usize) -> Vec<usize> {
    indices
        .iter()
        .filter_map(|raw| raw.trim().parse::<usize>().ok())
        .filter(|&pos| pos >= 1 && pos <= len)
        .map(|pos| pos - 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_three() -> MemoryStore {
        let store = MemoryStore::new();
        store.set_latest(
            MemorySource::Upload,
            vec![
                FileEntry::new("a.pdf", "/tmp/a.pdf"),
                FileEntry::new("b.pdf", "/tmp/b.pdf"),
                FileEntry::new("c.pdf", "/tmp/c.pdf"),
            ],
        );
        store
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn both_selectors_fail_validation() {
        let store = store_with_three();
        let include = vec!["1".to_string()];
        let exclude = vec!["2".to_string()];
        assert_eq!(
            store.update_working(MemorySource::Upload, Some(&include), Some(&exclude)),
            Err(WorkingSetError::BothSelectors)
        );
    }

    #[test]
    fn missing_selectors_fail_validation() {
        let store = store_with_three();
        assert_eq!(
            store.update_working(MemorySource::Upload, None, None),
            Err(WorkingSetError::NoSelector)
        );
    }

    #[test]
    fn include_takes_positional_subset() {
        let store = store_with_three();
        let include = vec!["2".to_string()];
        let count = store
            .update_working(MemorySource::Upload, Some(&include), None)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(names(&store.working(MemorySource::Upload)), ["b.pdf"]);
    }

    #[test]
    fn exclude_drops_positions_preserving_order() {
        let store = store_with_three();
        let exclude = vec!["2".to_string()];
        store
            .update_working(MemorySource::Upload, None, Some(&exclude))
            .unwrap();
        assert_eq!(
            names(&store.working(MemorySource::Upload)),
            ["a.pdf", "c.pdf"]
        );
    }

    #[test]
    fn empty_exclude_copies_latest() {
        let store = store_with_three();
        store
            .update_working(MemorySource::Upload, None, Some(&[]))
            .unwrap();
        assert_eq!(
            store.working(MemorySource::Upload),
            store.latest(MemorySource::Upload)
        );
    }

    #[test]
    fn invalid_positions_are_skipped() {
        let store = store_with_three();
        let include = vec!["0".into(), "17".into(), "two".into(), "3".into()];
        store
            .update_working(MemorySource::Upload, Some(&include), None)
            .unwrap();
        assert_eq!(names(&store.working(MemorySource::Upload)), ["c.pdf"]);
    }

    #[test]
    fn working_is_replaced_wholesale() {
        let store = store_with_three();
        let include = vec!["1".to_string()];
        store
            .update_working(MemorySource::Upload, Some(&include), None)
            .unwrap();
        let include = vec!["2".to_string()];
        store
            .update_working(MemorySource::Upload, Some(&include), None)
            .unwrap();
        // No merge with the earlier working set.
        assert_eq!(names(&store.working(MemorySource::Upload)), ["b.pdf"]);
    }

    #[test]
    fn latest_replacement_does_not_touch_working() {
        let store = store_with_three();
        store
            .update_working(MemorySource::Upload, None, Some(&[]))
            .unwrap();
        store.set_latest(
            MemorySource::Upload,
            vec![FileEntry::new("d.pdf", "/tmp/d.pdf")],
        );
        // The working partition persists until the next explicit update.
        assert_eq!(
            names(&store.working(MemorySource::Upload)),
            ["a.pdf", "b.pdf", "c.pdf"]
        );
        assert_eq!(names(&store.latest(MemorySource::Upload)), ["d.pdf"]);
    }

    #[test]
    fn upload_annotation_fires_once_per_change() {
        let store = MemoryStore::new();
        store.set_latest(
            MemorySource::Upload,
            vec![FileEntry::new("a.pdf", "/tmp/a.pdf")],
        );

        let annotation = store.upload_annotation().unwrap();
        assert!(annotation.contains("1 file(s)"));
        assert!(store.transcript().contains("1 file(s)"));

        // Unchanged partition: no second annotation.
        assert_eq!(store.upload_annotation(), None);

        store.set_latest(
            MemorySource::Upload,
            vec![
                FileEntry::new("a.pdf", "/tmp/a.pdf"),
                FileEntry::new("b.pdf", "/tmp/b.pdf"),
            ],
        );
        assert!(store.upload_annotation().unwrap().contains("2 file(s)"));
    }

    #[test]
    fn longterm_consolidates_by_name() {
        let store = MemoryStore::new();
        store.set_latest(
            MemorySource::Upload,
            vec![FileEntry::new("a.pdf", "/tmp/a.pdf")],
        );
        store.set_latest(
            MemorySource::Sourced,
            vec![
                FileEntry::new("a.pdf", "/tmp/newer-a.pdf"),
                FileEntry::new("s.csv", "/tmp/s.csv"),
            ],
        );
        let longterm = store.longterm();
        assert_eq!(names(&longterm), ["a.pdf", "s.csv"]);
        assert_eq!(longterm[0].locator, "/tmp/newer-a.pdf");
    }
}
