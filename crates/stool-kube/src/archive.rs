//! Tar streams used to move working directories in and out of pods

use std::fs;
use std::io;
use std::path::Path;

/// Pack the contents of a directory, paths relative to it
pub fn pack_dir(source: &Path) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source)?;
    builder.into_inner()
}

/// Replace the contents of `destination` with the archive
pub fn unpack_replacing(data: &[u8], destination: &Path) -> io::Result<()> {
    clear_dir(destination)?;
    tar::Archive::new(data).unpack(destination)
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_then_unpack_replaces_content() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("web")).unwrap();
        fs::write(source.path().join("web/state"), "42").unwrap();

        let destination = tempfile::tempdir().unwrap();
        fs::write(destination.path().join("stale"), "x").unwrap();

        let data = pack_dir(source.path()).unwrap();
        unpack_replacing(&data, destination.path()).unwrap();

        assert_eq!(fs::read_to_string(destination.path().join("web/state")).unwrap(), "42");
        assert!(!destination.path().join("stale").exists());
    }

    #[test]
    fn test_pack_empty_dir() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let data = pack_dir(source.path()).unwrap();
        unpack_replacing(&data, &destination.path().join("new")).unwrap();
        assert!(destination.path().join("new").is_dir());
    }
}
