//! Module for searching for PenMount device config files

use std::{
    ffi::OsString,
    fs::{self, DirEntry},
    path::PathBuf,
};

/// Base system fallback path to use if one cannot be found with XDG
const FALLBACK_BASE_PATH: &str = "/usr/share/penmount";

/// Returns the base path for configuration data
pub fn get_base_path() -> PathBuf {
    let Ok(base_dirs) = xdg::BaseDirectories::with_prefix("penmount") else {
        log::warn!("Unable to determine config base path. Using fallback path.");
        return PathBuf::from(FALLBACK_BASE_PATH);
    };

    // Get the data directories in preference order
    let data_dirs = base_dirs.get_data_dirs();
    for dir in data_dirs {
        if dir.exists() {
            return dir;
        }
    }

    log::warn!("Config base path not found. Using fallback path.");
    PathBuf::from(FALLBACK_BASE_PATH)
}

/// Returns a list of directories in load order to find device configurations.
/// E.g. ["/etc/penmount/devices.d", "/usr/share/penmount/devices"]
pub fn get_devices_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./rootfs/usr/share/penmount/devices"),
        PathBuf::from("/etc/penmount/devices.d"),
        get_base_path().join("devices"),
    ]
}

/// Returns a list of file paths for the given directories sorted by filename across
/// all given directories. Files with the same name are ordered by the position
/// of their directory in `paths`. The filter argument is a closure that should
/// return `true` for any files that should be included in the final results.
pub fn get_multidir_sorted_files<F>(paths: &[PathBuf], filter: F) -> Vec<PathBuf>
where
    F: Fn(&DirEntry) -> bool,
{
    let mut entries: Vec<(OsString, usize, PathBuf)> = Vec::new();
    for (priority, path) in paths.iter().enumerate() {
        log::trace!("Checking {path:?} for files");
        let files = match fs::read_dir(path) {
            Ok(files) => files,
            Err(e) => {
                log::debug!("Unable to read directory: {path:?}: {e}");
                continue;
            }
        };
        for entry in files.flatten() {
            if !filter(&entry) {
                continue;
            }
            entries.push((entry.file_name(), priority, entry.path()));
        }
    }

    entries.sort();
    log::trace!("Got sorted entries: {entries:?}");

    entries.into_iter().map(|(_, _, path)| path).collect()
}

/// Returns true if the given entry is a YAML file
pub fn is_yaml_file(entry: &DirEntry) -> bool {
    let path = entry.path();
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
