/// Moving matched files into their destination directories.
///
/// This module resolves where a matched file should go, creates the
/// destination directory tree as needed, and relocates the file by linking it
/// under the new name and unlinking the old one whenever source and
/// destination share a volume. Across volumes the file is staged under a
/// temporary name in the destination and only persisted once fully written,
/// so a half-copied file is never visible under its final name. Neither path
/// replaces a file that already exists at the destination.
use crate::config::{Config, Rule};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Record of a completed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moved {
    /// The path of the file before it was moved.
    pub original_path: PathBuf,
    /// The path of the file after it was moved.
    pub new_path: PathBuf,
    /// The directory the file was moved into.
    pub destination_dir: PathBuf,
}

/// Errors that can occur while moving a file.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The resolved destination exists but is not a directory.
    #[error("Target path is a file: {}", path.display())]
    TargetIsFile { path: PathBuf },

    /// The source file is gone, typically because an earlier event moved it.
    #[error("Source file not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// Failed to create the destination directory.
    #[error("Failed to create directory {}: {error}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    /// A file with the same name is already present in the destination.
    #[error("Destination already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// The rename or copy itself failed.
    #[error("Failed to move {} to {}: {error}", from.display(), to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: io::Error,
    },
}

impl MoveError {
    /// True for the misconfiguration case that is skipped with a warning
    /// rather than reported as a failure.
    pub fn is_target_is_file(&self) -> bool {
        matches!(self, Self::TargetIsFile { .. })
    }
}

/// Result type for move operations.
pub type MoveResult<T> = Result<T, MoveError>;

/// Moves files into the directory selected by a rule.
pub struct MoveExecutor;

impl MoveExecutor {
    /// Resolves the destination directory for a rule.
    ///
    /// Precedence: the rule's own `target`, then `default_target/folder`,
    /// then the default target itself.
    pub fn resolve_destination(rule: &Rule, config: &Config) -> PathBuf {
        if let Some(target) = &rule.target {
            return target.clone();
        }
        match &rule.folder {
            Some(folder) => config.default_target.join(folder),
            None => config.default_target.clone(),
        }
    }

    /// Moves `file_path` into the destination selected by `rule`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dropsort::config::{Config, Rule};
    /// use dropsort::mover::MoveExecutor;
    /// use std::path::{Path, PathBuf};
    ///
    /// let config = Config {
    ///     source: PathBuf::from("/data/inbox"),
    ///     default_target: PathBuf::from("/data/sorted"),
    ///     suffix_filter: None,
    ///     rules: vec![Rule::new("invoice").with_folder("invoices")],
    ///     recursive: false,
    /// };
    ///
    /// match MoveExecutor::execute(Path::new("/data/inbox/invoice_7.pdf"), &config.rules[0], &config) {
    ///     Ok(moved) => println!("Moved to {}", moved.new_path.display()),
    ///     Err(e) => eprintln!("Move failed: {}", e),
    /// }
    /// ```
    pub fn execute(file_path: &Path, rule: &Rule, config: &Config) -> MoveResult<Moved> {
        let destination_dir = Self::resolve_destination(rule, config);
        Self::move_into(file_path, &destination_dir)
    }

    /// Moves a file into `destination_dir`, keeping its file name.
    pub fn move_into(file_path: &Path, destination_dir: &Path) -> MoveResult<Moved> {
        // A file squatting on the destination path aborts the move.
        if let Ok(metadata) = fs::metadata(destination_dir)
            && !metadata.is_dir()
        {
            return Err(MoveError::TargetIsFile {
                path: destination_dir.to_path_buf(),
            });
        }

        match fs::symlink_metadata(file_path) {
            Ok(metadata) if !metadata.is_dir() => {}
            _ => {
                return Err(MoveError::SourceMissing {
                    path: file_path.to_path_buf(),
                });
            }
        }

        let file_name = file_path
            .file_name()
            .ok_or_else(|| MoveError::FileMoveFailure {
                from: file_path.to_path_buf(),
                to: destination_dir.to_path_buf(),
                error: io::Error::new(io::ErrorKind::InvalidInput, "file has no name component"),
            })?;

        fs::create_dir_all(destination_dir).map_err(|error| {
            MoveError::DirectoryCreationFailed {
                path: destination_dir.to_path_buf(),
                error,
            }
        })?;

        let destination_path = destination_dir.join(file_name);
        if fs::symlink_metadata(&destination_path).is_ok() {
            return Err(MoveError::DestinationExists {
                path: destination_path,
            });
        }

        relocate(file_path, &destination_path).map_err(|error| {
            if error.kind() == io::ErrorKind::AlreadyExists {
                MoveError::DestinationExists {
                    path: destination_path.clone(),
                }
            } else {
                MoveError::FileMoveFailure {
                    from: file_path.to_path_buf(),
                    to: destination_path.clone(),
                    error,
                }
            }
        })?;

        Ok(Moved {
            original_path: file_path.to_path_buf(),
            new_path: destination_path,
            destination_dir: destination_dir.to_path_buf(),
        })
    }
}

/// Moves `source` to `destination` without ever replacing an existing file.
///
/// On one filesystem the file is hard-linked under its new name and the old
/// name removed; `link` fails with `AlreadyExists` where `rename` would
/// overwrite. Filesystems without hard links, and moves across devices, go
/// through [`copy_across`].
pub(crate) fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::CrossesDevices
                    | io::ErrorKind::Unsupported
                    | io::ErrorKind::PermissionDenied
            ) =>
        {
            return copy_across(source, destination);
        }
        Err(e) => return Err(e),
    }

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

/// Copy-then-delete move for when a link cannot cross filesystems.
///
/// The data is written to a hidden temporary file next to `destination` and
/// persisted under the final name without overwriting anything. If the
/// source cannot be removed afterwards, the copy is removed again so that
/// exactly one of the two paths holds the file.
pub(crate) fn copy_across(source: &Path, destination: &Path) -> io::Result<()> {
    let dir = destination
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;

    let mut input = fs::File::open(source)?;
    let permissions = input.metadata()?.permissions();

    let mut staged = tempfile::Builder::new()
        .prefix(".dropsort-")
        .suffix(".part")
        .tempfile_in(dir)?;
    io::copy(&mut input, staged.as_file_mut())?;
    staged.as_file().set_permissions(permissions)?;
    staged.as_file().sync_all()?;
    drop(input);

    staged
        .persist_noclobber(destination)
        .map_err(|e| e.error)?;

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }

    Ok(())
}
