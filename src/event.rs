//! Creation events observed in the source directory.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use notify::EventKind;
use notify::event::{CreateKind, ModifyKind, RenameMode};

/// A file or directory that appeared in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path to the created file or directory.
    pub path: PathBuf,

    /// Whether the created entry is a directory.
    pub is_directory: bool,

    /// When the event was observed.
    pub observed_at: DateTime<Utc>,
}

impl FileEvent {
    /// Create an event for a newly created file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(path, false)
    }

    /// Create an event for a newly created directory.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path, true)
    }

    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
            observed_at: Utc::now(),
        }
    }

    /// Final component of the path, if any.
    pub fn file_name(&self) -> Option<Cow<'_, str>> {
        self.path.file_name().map(|name| name.to_string_lossy())
    }

    /// "File" or "Directory", for log lines.
    pub fn kind_label(&self) -> &'static str {
        if self.is_directory { "Directory" } else { "File" }
    }

    /// Milliseconds since the event was observed.
    pub fn age_ms(&self) -> i64 {
        (Utc::now() - self.observed_at).num_milliseconds()
    }
}

/// Converts a raw `notify` event into creation events for `root`.
///
/// `Create` notifications produce events, and so does anything renamed into
/// the watched tree: an unpaired `To` rename is a file moved in from outside,
/// and the destination of a paired rename counts when it lies under `root`.
/// When the backend cannot tell files from folders, the filesystem is asked.
pub fn creation_events(event: &notify::Event, root: &Path) -> Vec<FileEvent> {
    let arrived: Vec<(&PathBuf, Option<bool>)> = match event.kind {
        EventKind::Create(kind) => {
            let is_directory = match kind {
                CreateKind::Folder => Some(true),
                CreateKind::File => Some(false),
                CreateKind::Any | CreateKind::Other => None,
            };
            event.paths.iter().map(|path| (path, is_directory)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|path| (path, None)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event
            .paths
            .get(1)
            .filter(|to| to.starts_with(root))
            .map(|to| (to, None))
            .into_iter()
            .collect(),
        // Backends that cannot pair renames report both ends alike; only the
        // end that still exists is an arrival.
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => event
            .paths
            .iter()
            .filter(|path| path.starts_with(root) && path.exists())
            .map(|path| (path, None))
            .collect(),
        _ => Vec::new(),
    };

    arrived
        .into_iter()
        .map(|(path, is_directory)| {
            FileEvent::new(path.clone(), is_directory.unwrap_or_else(|| is_dir(path)))
        })
        .collect()
}

fn is_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, RemoveKind};
    use tempfile::TempDir;

    const ROOT: &str = "/inbox";

    #[test]
    fn test_file_event_creation() {
        let event = FileEvent::file("/test/report.csv");
        assert!(!event.is_directory);
        assert_eq!(event.path, Path::new("/test/report.csv"));
        assert_eq!(event.file_name().as_deref(), Some("report.csv"));
        assert_eq!(event.kind_label(), "File");
        assert_eq!(FileEvent::directory("/test/dir").kind_label(), "Directory");
    }

    #[test]
    fn test_create_file_event_is_converted() {
        let event = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/inbox/a.txt"));

        let events = creation_events(&event, Path::new(ROOT));
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_directory);
    }

    #[test]
    fn test_create_folder_event_is_directory() {
        let event = notify::Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/inbox/sub"));

        let events = creation_events(&event, Path::new(ROOT));
        assert!(events[0].is_directory);
    }

    #[test]
    fn test_ambiguous_create_consults_filesystem() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let event = notify::Event::new(EventKind::Create(CreateKind::Any))
            .add_path(sub)
            .add_path(dir.path().join("missing.txt"));

        let events = creation_events(&event, dir.path());
        assert!(events[0].is_directory);
        assert!(!events[1].is_directory);
    }

    #[test]
    fn test_non_create_events_are_ignored() {
        let modify = notify::Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/inbox/a.txt"));
        let remove = notify::Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/inbox/a.txt"));
        let moved_out = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/inbox/a.txt"));

        assert!(creation_events(&modify, Path::new(ROOT)).is_empty());
        assert!(creation_events(&remove, Path::new(ROOT)).is_empty());
        assert!(creation_events(&moved_out, Path::new(ROOT)).is_empty());
    }

    #[test]
    fn test_file_moved_in_from_outside_is_an_arrival() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/inbox/report.csv"));

        let events = creation_events(&event, Path::new(ROOT));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, Path::new("/inbox/report.csv"));
        assert!(!events[0].is_directory);
    }

    #[test]
    fn test_paired_rename_yields_destination_under_root() {
        let within = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/inbox/report.csv.part"))
            .add_path(PathBuf::from("/inbox/report.csv"));
        let leaving = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/inbox/report.csv"))
            .add_path(PathBuf::from("/elsewhere/report.csv"));

        let events = creation_events(&within, Path::new(ROOT));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, Path::new("/inbox/report.csv"));
        assert!(creation_events(&leaving, Path::new(ROOT)).is_empty());
    }

    #[test]
    fn test_unpaired_rename_keeps_only_existing_end() {
        let dir = TempDir::new().unwrap();
        let arrived = dir.path().join("report.csv");
        std::fs::write(&arrived, "").unwrap();

        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(dir.path().join("report.tmp"))
            .add_path(arrived.clone());

        let events = creation_events(&event, dir.path());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, arrived);
    }

    #[test]
    fn test_age_ms_is_non_negative() {
        assert!(FileEvent::file("/inbox/a.txt").age_ms() >= 0);
    }
}
