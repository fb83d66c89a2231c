//! Upload archive handling
//!
//! Deliverables arrive as zip archives named `<name>_<date>.<format>.zip`
//! (e.g. `IDO-08061_202203071.gdb.zip`), as already extracted directories,
//! or as a bare `.gpkg` file.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Parts encoded in an upload file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    /// File name without any extension, e.g. `IDO-08061_202203071`
    pub stem: String,
    /// Name before the date suffix, e.g. `IDO-08061`
    pub base_name: String,
    /// Date suffix digits, e.g. `202203071`
    pub date: Option<String>,
    /// Container format between the stem and `.zip`, e.g. `gdb`
    pub format: Option<String>,
}

fn date_suffix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<base>.+)_(?P<date>\d{8,})$").ok())
        .as_ref()
}

impl ArchiveName {
    pub fn parse(file_name: &str) -> Self {
        let without_zip = match file_name.len().checked_sub(4) {
            Some(cut) if file_name.is_char_boundary(cut) && file_name[cut..].eq_ignore_ascii_case(".zip") => {
                &file_name[..cut]
            }
            _ => file_name,
        };

        let (stem, format) = match without_zip.split_once('.') {
            Some((stem, format)) if !format.is_empty() => (stem, Some(format.to_ascii_lowercase())),
            _ => (without_zip, None),
        };

        let (base_name, date) = match date_suffix().and_then(|re| re.captures(stem)) {
            Some(caps) => (caps["base"].to_string(), Some(caps["date"].to_string())),
            None => (stem.to_string(), None),
        };

        Self {
            stem: stem.to_string(),
            base_name,
            date,
            format,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(Self::parse)
    }
}

pub fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
}

/// Extract a zip archive into `<dest_root>/<stem>/` and return that directory
pub fn extract_archive(archive_path: &Path, dest_root: &Path) -> Result<PathBuf> {
    let name = ArchiveName::from_path(archive_path)
        .with_context(|| format!("Invalid archive name: {}", archive_path.display()))?;

    log::info!(
        "Extracting {} (name: {}, format: {}, date: {})",
        archive_path.display(),
        name.base_name,
        name.format.as_deref().unwrap_or("unknown"),
        name.date.as_deref().unwrap_or("none")
    );
    if name.date.is_none() {
        log::warn!("Archive name {} carries no date suffix", archive_path.display());
    }

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid zip archive: {}", archive_path.display()))?;

    let destination = dest_root.join(&name.stem);
    fs::create_dir_all(&destination)
        .with_context(|| format!("Failed to create directory: {}", destination.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {}", i, archive_path.display()))?;

        // Entries escaping the destination are skipped
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let target = destination.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create file: {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract: {}", target.display()))?;
    }

    log::info!("Extracted {} entries to {}", archive.len(), destination.display());
    Ok(destination)
}

/// Find the single GeoPackage at or below `path`
pub fn locate_geopackage(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        let is_gpkg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gpkg"));
        if is_gpkg {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("Unsupported workspace file: {}", path.display());
    }

    if !path.is_dir() {
        anyhow::bail!("Workspace path does not exist: {}", path.display());
    }

    let mut found = Vec::new();
    collect_geopackages(path, &mut found)?;
    found.sort();

    match found.len() {
        0 => anyhow::bail!("No GeoPackage found under {}", path.display()),
        1 => Ok(found.remove(0)),
        n => anyhow::bail!(
            "Expected one GeoPackage under {}, found {}: {}",
            path.display(),
            n,
            found
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn collect_geopackages(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_geopackages(&path, found)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gpkg"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Workspace resolved from a run path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedWorkspace {
    /// GeoPackage to open
    pub geopackage: PathBuf,
    /// Directory the archive was extracted to, when the input was a zip
    pub extracted_to: Option<PathBuf>,
}

/// Extract the input if it is an archive and locate its GeoPackage
///
/// Archives are extracted under `extract_dir` when given, otherwise next to
/// the archive.
pub fn prepare_workspace(path: &Path, extract_dir: Option<&Path>) -> Result<PreparedWorkspace> {
    if is_zip(path) {
        let dest_root = match extract_dir {
            Some(dir) => dir.to_path_buf(),
            None => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let extracted = extract_archive(path, &dest_root)?;
        let geopackage = locate_geopackage(&extracted)?;
        return Ok(PreparedWorkspace {
            geopackage,
            extracted_to: Some(extracted),
        });
    }

    Ok(PreparedWorkspace {
        geopackage: locate_geopackage(path)?,
        extracted_to: None,
    })
}

#[cfg(test)]
pub(crate) fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}
