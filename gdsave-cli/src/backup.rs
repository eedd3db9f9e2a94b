use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use gdsave_core::decrypt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::services::save_file_service::SAVE_FILES;

/// Timestamped backups of the save files, kept in a `backup/`
/// subdirectory of the save folder
pub struct BackupManager {
    save_dir: PathBuf,
    backup_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct BackupInfo {
    pub filename: String,
    pub timestamp: DateTime<Local>,
    pub size: u64,
    pub is_valid: bool,
}

impl BackupManager {
    pub fn new(save_dir: PathBuf) -> Self {
        let backup_dir = save_dir.join("backup");
        Self {
            save_dir,
            backup_dir,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Lists all .bak files sorted by timestamp (newest first)
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.backup_dir).context("Failed to read backup directory")? {
            let entry = entry?;
            let path = entry.path();

            // Only process .bak files
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("bak") {
                continue;
            }

            let metadata = fs::metadata(&path)?;
            let modified = metadata.modified()?;
            let timestamp: DateTime<Local> = modified.into();

            let filename = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();

            // Validate backup by attempting to decrypt
            let is_valid = Self::validate_backup(&path);

            backups.push(BackupInfo {
                filename,
                timestamp,
                size: metadata.len(),
                is_valid,
            });
        }

        // Sort by timestamp, newest first
        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(backups)
    }

    /// Validates a backup file by attempting to decrypt it
    fn validate_backup(path: &Path) -> bool {
        if let Ok(data) = fs::read(path) {
            decrypt(&data).is_ok()
        } else {
            false
        }
    }

    /// Creates a timestamped backup of one save file
    /// Format: CCGameManager_2026-01-31_12-00-00.bak
    pub fn create_backup(&self, source_path: &Path) -> Result<PathBuf> {
        if !source_path.exists() {
            bail!("Source file does not exist: {}", source_path.display());
        }

        fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;

        let stem = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("save");
        let now = Local::now();
        let filename = format!("{}_{}.bak", stem, now.format("%Y-%m-%d_%H-%M-%S"));
        let backup_path = self.backup_dir.join(filename);

        fs::copy(source_path, &backup_path).context("Failed to create backup")?;

        Ok(backup_path)
    }

    /// Restores a backup over the save file it was taken from, returning
    /// the restored path
    ///
    /// The current save file, if any, is snapshotted first so a restore can
    /// itself be undone.
    pub fn restore_backup(&self, backup_path: &Path) -> Result<PathBuf> {
        if !backup_path.exists() {
            bail!("Backup file does not exist: {}", backup_path.display());
        }

        let save_file = Self::save_file_for(backup_path)?;
        let target = self.save_dir.join(save_file);

        if target.exists() {
            fs::create_dir_all(&self.backup_dir).context("Failed to create backup directory")?;

            let stem = target.file_stem().and_then(|s| s.to_str()).unwrap_or("save");
            let now = Local::now();
            let emergency_filename =
                format!("{}_emergency_{}.bak", stem, now.format("%Y-%m-%d_%H-%M-%S"));
            let emergency_backup = self.backup_dir.join(emergency_filename);
            fs::copy(&target, &emergency_backup).context("Failed to create emergency backup")?;
        }

        fs::copy(backup_path, &target).context("Failed to restore backup")?;

        Ok(target)
    }

    /// Which save file a backup belongs to, read off its name prefix
    fn save_file_for(backup_path: &Path) -> Result<&'static str> {
        let name = backup_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        for save_file in SAVE_FILES {
            let stem = Path::new(save_file)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(save_file);
            if name.starts_with(&format!("{stem}_")) {
                return Ok(save_file);
            }
        }

        bail!("Cannot tell which save file '{}' is a backup of", name);
    }
}
