use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Prefix of every split output file (`export_part_1.sql`, …).
pub const PART_PREFIX: &str = "export_part_";

/// File name of part `n`.
pub fn part_file_name(n: usize) -> String {
    format!("{}{}.sql", PART_PREFIX, n)
}

/// Numeric part index of a file name, `None` for anything else.
pub fn part_index(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(PART_PREFIX)?
        .strip_suffix(".sql")?
        .parse()
        .ok()
}

/// `*.sql` files directly inside `dir`, ordered by part index, then by name
/// for files without one. A missing directory yields an empty list.
pub fn list_sql_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_sql = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("sql"))
            .unwrap_or(false);
        if is_sql && path.is_file() {
            files.push(path);
        }
    }

    files.sort_by_key(|p| {
        let name = p
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (part_index(&name).unwrap_or(usize::MAX), name)
    });
    Ok(files)
}

/// Name of the manifest written at the root of every run directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Upper bound on `_<n>` suffixes tried for one run directory name.
const MAX_RUN_DIR_SUFFIX: usize = 1000;

/// Create a fresh run directory `root/<name>`. When that directory already
/// exists (two runs in the same second) `<name>_2`, `<name>_3`, … are tried
/// instead, so a run never writes into another run's directory.
pub fn create_run_dir(root: &Path, name: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(root)?;
    for n in 1..=MAX_RUN_DIR_SUFFIX {
        let candidate = match n {
            1 => root.join(name),
            n => root.join(format!("{}_{}", name, n)),
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free run directory for {} under {}", name, root.display()),
    ))
}

/// Run directories (`export_*`) under `root`, newest first.
pub fn list_run_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_run = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("export_"))
            .unwrap_or(false);
        if is_run && path.is_dir() {
            dirs.push(path);
        }
    }
    // Timestamped names sort chronologically.
    dirs.sort();
    dirs.reverse();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_index_parses_only_part_files() {
        assert_eq!(part_index("export_part_12.sql"), Some(12));
        assert_eq!(part_index("export_part_x.sql"), None);
        assert_eq!(part_index("products.sql"), None);
    }

    #[test]
    fn sql_files_sort_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for n in [10, 2, 1, 9] {
            fs::write(dir.path().join(part_file_name(n)), "").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let names: Vec<String> = list_sql_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "export_part_1.sql",
                "export_part_2.sql",
                "export_part_9.sql",
                "export_part_10.sql"
            ]
        );
    }

    #[test]
    fn missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_sql_files(&dir.path().join("nope")).unwrap().is_empty());
        assert!(list_run_dirs(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn run_dir_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("exports");
        let first = create_run_dir(&root, "export_20240305_140709").unwrap();
        let second = create_run_dir(&root, "export_20240305_140709").unwrap();
        let third = create_run_dir(&root, "export_20240305_140709").unwrap();

        assert!(first.ends_with("export_20240305_140709"));
        assert!(second.ends_with("export_20240305_140709_2"));
        assert!(third.ends_with("export_20240305_140709_3"));
        assert_eq!(list_run_dirs(&root).unwrap().len(), 3);
    }

    #[test]
    fn run_dir_blocked_by_a_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("exports");
        fs::write(&root, "not a dir").unwrap();
        assert!(create_run_dir(&root, "export_20240305_140709").is_err());
    }

    #[test]
    fn run_dirs_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("export_20240101_000000")).unwrap();
        fs::create_dir(dir.path().join("export_20240301_000000")).unwrap();
        fs::create_dir(dir.path().join("other")).unwrap();
        let dirs = list_run_dirs(dir.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("export_20240301_000000"));
    }
}
