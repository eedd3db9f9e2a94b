mod backup;
mod services;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::backup::BackupManager;
use crate::services::save_file_service::{SAVE_FILES, SaveFileService, xml_name};
use crate::services::save_locator::{SaveLocationProvider, SaveLocator};

#[derive(Parser)]
#[command(name = "gdsave-cli")]
#[command(about = "Geometry Dash save (de|en)crypt – CLI tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decrypt the save files in a directory to editable XML
    Decrypt {
        /// Directory holding CCGameManager.dat / CCLocalLevels.dat
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Write the payload as-is instead of pretty-printing it
        #[arg(long)]
        no_pretty: bool,

        /// Fail on a checksum or size mismatch in the container trailer
        #[arg(long)]
        strict: bool,

        /// Overwrite existing .xml files without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Encrypt the edited XML files back into save files
    Encrypt {
        /// Directory holding CCGameManager.xml / CCLocalLevels.xml
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Directory to write the .dat files to (defaults to --dir)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Overwrite existing .dat files without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy the .dat files from a directory into the game's save folder
    Commit {
        /// Directory holding the .dat files to install
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Skip the automatic backup of the folder's current save files
        #[arg(long)]
        no_backup: bool,
    },

    /// List stored backups of the game's save files
    Backups,

    /// Restore a backup over the live save file it was taken from
    Restore {
        /// Backup file name as shown by `backups`, or a path to one
        backup: PathBuf,
    },

    /// Print the resolved save folder and what's in it
    Where,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Decrypt {
            dir,
            no_pretty,
            strict,
            yes,
        } => cmd_decrypt(&dir, !no_pretty, strict, yes, &StdinPrompt),
        Commands::Encrypt { dir, dest, yes } => {
            let dest = dest.unwrap_or_else(|| dir.clone());
            cmd_encrypt(&dir, &dest, yes, &StdinPrompt)
        }
        Commands::Commit { dir, no_backup } => cmd_commit(&dir, no_backup, &SaveLocator::new()),
        Commands::Backups => cmd_backups(&SaveLocator::new()),
        Commands::Restore { backup } => cmd_restore(&backup, &SaveLocator::new()),
        Commands::Where => cmd_where(&SaveLocator::new()),
    }
}

fn cmd_decrypt(
    dir: &Path,
    pretty: bool,
    strict: bool,
    yes: bool,
    prompt: &dyn ConfirmPrompt,
) -> Result<()> {
    let service = SaveFileService::new();
    let mut failures = 0;

    for file in SAVE_FILES {
        let source = dir.join(file);
        if !source.exists() {
            eprintln!("[warn] {} not found, skipping", source.display());
            continue;
        }

        let out_path = dir.join(xml_name(file));
        if out_path.exists()
            && !yes
            && !prompt.confirm(&format!("{} already exists. Overwrite?", out_path.display()))?
        {
            println!("[info] skipped {}", out_path.display());
            continue;
        }

        if let Err(e) = decrypt_one(&service, file, &source, &out_path, pretty, strict) {
            eprintln!("[warn] {}: {:#}", file, e);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} file(s) failed to decrypt", failures);
    }
    Ok(())
}

fn decrypt_one(
    service: &SaveFileService,
    file: &str,
    source: &Path,
    out_path: &Path,
    pretty: bool,
    strict: bool,
) -> Result<()> {
    let save = service.decrypt_file(source, pretty, strict)?;

    println!(
        "[info] {}: checksum stored=0x{:08x}  calc=0x{:08x}  -> {}",
        file,
        save.stored_checksum,
        save.calculated_checksum,
        if save.stored_checksum == save.calculated_checksum {
            "OK"
        } else {
            "MISMATCH"
        }
    );

    if let Some(err) = &save.pretty_error {
        eprintln!(
            "[warn] {}: could not pretty-print ({}), writing payload as-is",
            file, err
        );
    }

    fs::write(out_path, &save.xml)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!("[ok] wrote payload -> {}", out_path.display());

    Ok(())
}

fn cmd_encrypt(dir: &Path, dest: &Path, yes: bool, prompt: &dyn ConfirmPrompt) -> Result<()> {
    let service = SaveFileService::new();
    let mut failures = 0;

    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create destination: {}", dest.display()))?;

    for file in SAVE_FILES {
        let source = dir.join(xml_name(file));
        if !source.exists() {
            eprintln!("[warn] {} not found, skipping", source.display());
            continue;
        }

        let out_path = dest.join(file);
        if out_path.exists()
            && !yes
            && !prompt.confirm(&format!("{} already exists. Overwrite?", out_path.display()))?
        {
            println!("[info] skipped {}", out_path.display());
            continue;
        }

        if let Err(e) = encrypt_one(&service, &source, &out_path) {
            eprintln!("[warn] {}: {:#}", file, e);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} file(s) failed to encrypt", failures);
    }
    Ok(())
}

fn encrypt_one(service: &SaveFileService, source: &Path, out_path: &Path) -> Result<()> {
    let enc = service.encrypt_file(source)?;

    fs::write(out_path, &enc)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!("[ok] wrote encrypted save -> {}", out_path.display());

    Ok(())
}

fn cmd_commit(dir: &Path, no_backup: bool, provider: &dyn SaveLocationProvider) -> Result<()> {
    let save_dir = resolve_save_dir(provider)?;
    if !save_dir.exists() {
        bail!("Save folder does not exist: {}", save_dir.display());
    }

    let manager = BackupManager::new(save_dir.clone());
    let mut attempted = 0;
    let mut failures = 0;

    for file in SAVE_FILES {
        let source = dir.join(file);
        if !source.exists() {
            eprintln!("[warn] {} not found, skipping", source.display());
            continue;
        }

        attempted += 1;
        let target = save_dir.join(file);
        if let Err(e) = commit_one(&manager, &source, &target, no_backup) {
            eprintln!("[warn] {}: {:#}", file, e);
            failures += 1;
        }
    }

    if attempted == 0 {
        bail!("No save files found in {}", dir.display());
    }
    if failures > 0 {
        bail!("{} file(s) failed to commit", failures);
    }
    Ok(())
}

fn commit_one(
    manager: &BackupManager,
    source: &Path,
    target: &Path,
    no_backup: bool,
) -> Result<()> {
    // Snapshot whatever the game currently has before overwriting it
    if !no_backup && target.exists() {
        let backup_path = manager
            .create_backup(target)
            .with_context(|| format!("Failed to back up {}", target.display()))?;
        println!("[info] backed up {} -> {}", target.display(), backup_path.display());
    }

    fs::copy(source, target).with_context(|| {
        format!("Failed to copy {} -> {}", source.display(), target.display())
    })?;

    println!("[ok] committed {} -> {}", source.display(), target.display());

    Ok(())
}

fn cmd_backups(provider: &dyn SaveLocationProvider) -> Result<()> {
    let manager = BackupManager::new(resolve_save_dir(provider)?);

    let backups = manager.list_backups()?;
    if backups.is_empty() {
        println!("[info] no backups found");
        return Ok(());
    }

    for info in backups {
        println!(
            "{}  {:>9} bytes  {:7}  {}",
            info.timestamp.format("%Y-%m-%d %H:%M:%S"),
            info.size,
            if info.is_valid { "ok" } else { "INVALID" },
            info.filename
        );
    }

    Ok(())
}

fn cmd_restore(backup: &Path, provider: &dyn SaveLocationProvider) -> Result<()> {
    let manager = BackupManager::new(resolve_save_dir(provider)?);

    // Accept either a bare filename from `backups` or a full path
    let backup_path = if backup.exists() {
        backup.to_path_buf()
    } else {
        manager.backup_dir().join(backup)
    };

    let target = manager.restore_backup(&backup_path)?;
    println!("[ok] restored {} -> {}", backup_path.display(), target.display());

    Ok(())
}

fn cmd_where(provider: &dyn SaveLocationProvider) -> Result<()> {
    let save_dir = resolve_save_dir(provider)?;

    println!("{}", save_dir.display());

    if !save_dir.exists() {
        eprintln!("[warn] folder does not exist on this machine");
        return Ok(());
    }

    for file in SAVE_FILES {
        let path = save_dir.join(file);
        if path.exists() {
            let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!("[info] {} ({} bytes)", file, size);
        } else {
            println!("[info] {} (missing)", file);
        }
    }

    Ok(())
}

fn resolve_save_dir(provider: &dyn SaveLocationProvider) -> Result<PathBuf> {
    provider
        .save_directory()
        .context("Could not resolve the save folder on this platform")
}

/// y/n prompt; anything but an explicit yes declines
trait ConfirmPrompt {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Prompts on stdout and reads the answer from stdin
struct StdinPrompt;

impl ConfirmPrompt for StdinPrompt {
    fn confirm(&self, question: &str) -> Result<bool> {
        print!("{} [y/N] ", question);
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut answer = String::new();
        io::stdin()
            .read_line(&mut answer)
            .context("Failed to read answer")?;

        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}
