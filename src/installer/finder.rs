//! Installer discovery.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::InstallerInfo;
use crate::config::OsRelease;
use crate::error::{Error, Result};
use crate::size::{directory_size, format_gb, size_with_margin, MARGIN_SIZE_MB};

pub const DOWNLOAD_HINT: &str = "https://github.com/ninxsoft/Mist/releases";

/// Find one installer bundle per catalog entry in `app_dir`.
///
/// Output follows catalog order. A bundle picked for a newer release is not
/// offered to an older one whose keyword it also contains.
pub fn find_installers(app_dir: &Path, catalog: &[OsRelease]) -> Result<Vec<InstallerInfo>> {
    info!("Searching for installers in {}", app_dir.display());
    println!("🔍 Searching for installers in {}...", app_dir.display());

    if !app_dir.exists() {
        error!("{} does not exist", app_dir.display());
        return Err(Error::DiscoveryFailed(format!(
            "directory {} does not exist",
            app_dir.display()
        )));
    }
    if !app_dir.is_dir() {
        error!("{} is not a directory", app_dir.display());
        return Err(Error::DiscoveryFailed(format!(
            "{} is not a directory",
            app_dir.display()
        )));
    }

    let entries = list_entries(app_dir)?;
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut found = Vec::new();

    for release in catalog {
        let mut candidates: Vec<&PathBuf> = entries
            .iter()
            .filter(|path| !claimed.contains(*path) && is_candidate(path, release.keyword))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort();

        let path = candidates[0];
        if candidates.len() > 1 {
            let names: Vec<String> = candidates.iter().map(|p| file_name(p)).collect();
            warn!(
                "Several installers found for {}: {:?}, using {}",
                release.name,
                names,
                file_name(path)
            );
            println!(
                "⚠️  Several installers found for {}, using: {}",
                release.name,
                file_name(path)
            );
        }
        claimed.insert(path.clone());

        if !path.is_dir() {
            warn!("Invalid path for {}: {}", release.name, path.display());
            println!("   ⚠️  Invalid path for {}: {}", release.name, path.display());
            continue;
        }

        info!("Measuring {}", release.name);
        let size_bytes = directory_size(path);
        info!(
            "Found {} -> {} ({}, {} with margin)",
            release.name,
            path.display(),
            format_gb(size_bytes),
            format_gb(size_with_margin(size_bytes))
        );
        println!("✅ Found: {}", release.name);
        found.push(InstallerInfo {
            name: release.name.to_string(),
            path: path.clone(),
            volume: release.volume.to_string(),
            size_bytes,
        });
    }

    if found.is_empty() {
        error!("No installer found in {}", app_dir.display());
        return Err(Error::DiscoveryFailed(format!(
            "no installer found in {}; download them first with Mist ({})",
            app_dir.display(),
            DOWNLOAD_HINT
        )));
    }

    Ok(found)
}

fn list_entries(app_dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = fs::read_dir(app_dir).map_err(|e| {
        error!("Cannot list {}: {}", app_dir.display(), e);
        Error::DiscoveryFailed(format!("cannot list {}: {}", app_dir.display(), e))
    })?;
    Ok(read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect())
}

/// `*.app` entries whose name contains both "Install" and the keyword.
fn is_candidate(path: &Path, keyword: &str) -> bool {
    let name = file_name(path);
    path.extension().is_some_and(|ext| ext == "app")
        && name.contains("Install")
        && name.contains(keyword)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Print each installer's size, margin and margined size.
pub fn display_size_summary(installers: &[InstallerInfo]) {
    println!("\n📊 Size summary:");
    for installer in installers {
        println!(
            "   • {}: {} (+ {} MB margin = {})",
            installer.name,
            format_gb(installer.size_bytes),
            MARGIN_SIZE_MB,
            format_gb(size_with_margin(installer.size_bytes))
        );
    }
}

/// Space needed for every installer including margins.
pub fn total_space_needed(installers: &[InstallerInfo]) -> u64 {
    let total = installers
        .iter()
        .map(|i| size_with_margin(i.size_bytes))
        .sum();
    info!("Total space needed: {}", format_gb(total));
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TARGET_OS;
    use crate::size::BYTES_PER_MB;
    use tempfile::TempDir;

    fn bundle(root: &Path, name: &str, payload: usize) {
        let resources = root.join(name).join("Contents/Resources");
        fs::create_dir_all(&resources).unwrap();
        fs::write(resources.join("payload"), vec![0u8; payload]).unwrap();
    }

    #[test]
    fn test_catalog_order_and_sizes() {
        let temp = TempDir::new().unwrap();
        bundle(temp.path(), "Install macOS Ventura.app", 300);
        bundle(temp.path(), "Install macOS Sonoma.app", 200);
        fs::write(temp.path().join("Notes.txt"), b"ignored").unwrap();

        let found = find_installers(temp.path(), TARGET_OS).unwrap();
        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["macOS Sonoma", "macOS Ventura"]);
        assert_eq!(found[0].volume, "Install macOS Sonoma");
        assert_eq!(found[0].size_bytes, 200);
        assert_eq!(found[1].size_bytes, 300);
    }

    #[test]
    fn test_high_sierra_not_reused_for_sierra() {
        let temp = TempDir::new().unwrap();
        bundle(temp.path(), "Install macOS High Sierra.app", 10);

        let found = find_installers(temp.path(), TARGET_OS).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "macOS High Sierra");
    }

    #[test]
    fn test_duplicates_pick_first_by_name() {
        let temp = TempDir::new().unwrap();
        bundle(temp.path(), "Install macOS Sonoma 14.5.app", 1);
        bundle(temp.path(), "Install macOS Sonoma 14.1.app", 2);

        let found = find_installers(temp.path(), TARGET_OS).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].path.ends_with("Install macOS Sonoma 14.1.app"));
    }

    #[test]
    fn test_non_directory_bundle_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Install macOS Ventura.app"), b"not a bundle").unwrap();
        bundle(temp.path(), "Install macOS Monterey.app", 5);

        let found = find_installers(temp.path(), TARGET_OS).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "macOS Monterey");
    }

    #[test]
    fn test_requires_install_and_app_extension() {
        let temp = TempDir::new().unwrap();
        bundle(temp.path(), "macOS Sonoma.app", 1);
        bundle(temp.path(), "Install macOS Sonoma.dmg", 1);

        let err = find_installers(temp.path(), TARGET_OS).unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed(ref msg) if msg.contains("Mist")));
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let temp = TempDir::new().unwrap();
        let err = find_installers(&temp.path().join("nope"), TARGET_OS).unwrap_err();
        assert!(matches!(err, Error::DiscoveryFailed(_)));

        let file = temp.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(find_installers(&file, TARGET_OS).is_err());
    }

    #[test]
    fn test_total_space_needed() {
        let installers = vec![
            InstallerInfo {
                name: "a".into(),
                path: PathBuf::from("/a"),
                volume: "A".into(),
                size_bytes: 100,
            },
            InstallerInfo {
                name: "b".into(),
                path: PathBuf::from("/b"),
                volume: "B".into(),
                size_bytes: 50,
            },
        ];
        assert_eq!(total_space_needed(&installers), 150 + 1000 * BYTES_PER_MB);
    }
}
