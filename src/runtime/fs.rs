//! File system operations (read, write, directory, recursive copy).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::RealRuntime;

impl RealRuntime {
    #[tracing::instrument(skip(self, contents))]
    pub(crate) fn write_impl(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("Failed to write to {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_impl(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_to_string_impl(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?} to string", path))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn rename_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).with_context(|| format!("Failed to rename {:?} to {:?}", from, to))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_impl(&self, from: &Path, to: &Path) -> Result<u64> {
        fs::copy(from, to).with_context(|| format!("Failed to copy {:?} to {:?}", from, to))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn copy_dir_impl(&self, from: &Path, to: &Path) -> Result<()> {
        fs::create_dir_all(to).with_context(|| format!("Failed to create directory {:?}", to))?;
        for entry in self.read_dir_impl(from)? {
            let Some(name) = entry.file_name() else {
                continue;
            };
            let dest = to.join(name);
            if entry.is_dir() {
                self.copy_dir_impl(&entry, &dest)?;
            } else {
                if dest.exists() {
                    // Module caches hand out read-only files; make sure we can overwrite.
                    make_owner_writable(&dest)?;
                }
                fs::copy(&entry, &dest)
                    .with_context(|| format!("Failed to copy {:?} to {:?}", entry, dest))?;
                make_owner_writable(&dest)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Failed to create directory {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn create_file_impl(&self, path: &Path) -> Result<Box<dyn std::io::Write + Send>> {
        let file = fs::File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        Ok(Box::new(file))
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_file_impl(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("Failed to remove file {:?}", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn remove_dir_all_impl(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory {:?} and its contents", path))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn exists_impl(&self, path: &Path) -> bool {
        path.exists()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_dir_impl(&self, path: &Path) -> bool {
        path.is_dir()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn is_file_impl(&self, path: &Path) -> bool {
        path.is_file()
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn read_dir_impl(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {:?}", path))?
            .map(|entry| Ok(entry?.path()))
            .collect::<Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    #[tracing::instrument(skip(self))]
    pub(crate) fn set_permissions_impl(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = fs::Permissions::from_mode(mode);
            fs::set_permissions(path, permissions).context("Failed to set permissions")?;
        }
        #[cfg(not(unix))]
        {
            let _ = (path, mode); // Suppress unused warnings on non-Unix
        }
        Ok(())
    }
}

fn make_owner_writable(path: &Path) -> Result<()> {
    let mut permissions = fs::metadata(path)
        .with_context(|| format!("Failed to stat {:?}", path))?
        .permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to make {:?} writable", path))
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_real_runtime_file_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test.txt");

        // Test write
        runtime.write(&file_path, b"hello").unwrap();
        assert!(runtime.exists(&file_path));
        assert!(runtime.is_file(&file_path));

        // Test read_to_string and read
        assert_eq!(runtime.read_to_string(&file_path).unwrap(), "hello");
        assert_eq!(runtime.read(&file_path).unwrap(), b"hello");

        // Test copy
        let copy_path = dir.path().join("copy.txt");
        runtime.copy(&file_path, &copy_path).unwrap();
        assert!(runtime.exists(&copy_path));

        // Test rename
        let new_path = dir.path().join("renamed.txt");
        runtime.rename(&file_path, &new_path).unwrap();
        assert!(!runtime.exists(&file_path));
        assert!(runtime.exists(&new_path));

        // Test remove_file
        runtime.remove_file(&new_path).unwrap();
        assert!(!runtime.exists(&new_path));
    }

    #[test]
    fn test_real_runtime_dir_ops() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let sub_dir = dir.path().join("sub/nested");

        runtime.create_dir_all(&sub_dir).unwrap();
        assert!(runtime.is_dir(&sub_dir));
        assert!(!runtime.is_file(&sub_dir));

        let parent = dir.path().join("sub");
        runtime.create_dir_all(&parent.join("another")).unwrap();
        let entries = runtime.read_dir(&parent).unwrap();
        assert_eq!(entries.len(), 2);
        // Entries come back sorted by name
        assert!(entries[0].ends_with("another"));
        assert!(entries[1].ends_with("nested"));

        runtime.remove_dir_all(&parent).unwrap();
        assert!(!runtime.exists(&parent));
    }

    #[test]
    fn test_real_runtime_copy_dir() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("out/dst");

        runtime.create_dir_all(&src.join("a/b")).unwrap();
        runtime.write(&src.join("top.txt"), b"top").unwrap();
        runtime.write(&src.join("a/b/deep.txt"), b"deep").unwrap();

        runtime.copy_dir(&src, &dst).unwrap();

        assert_eq!(runtime.read_to_string(&dst.join("top.txt")).unwrap(), "top");
        assert_eq!(
            runtime.read_to_string(&dst.join("a/b/deep.txt")).unwrap(),
            "deep"
        );
        // Source is left untouched
        assert!(runtime.exists(&src.join("top.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runtime_copy_dir_overwrites_read_only_files() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        runtime.create_dir_all(&src).unwrap();
        runtime.create_dir_all(&dst).unwrap();
        runtime.write(&src.join("f.txt"), b"new").unwrap();
        runtime.set_permissions(&src.join("f.txt"), 0o444).unwrap();
        runtime.write(&dst.join("f.txt"), b"old").unwrap();
        runtime.set_permissions(&dst.join("f.txt"), 0o444).unwrap();

        runtime.copy_dir(&src, &dst).unwrap();
        assert_eq!(runtime.read_to_string(&dst.join("f.txt")).unwrap(), "new");
        runtime.write(&dst.join("f.txt"), b"writable").unwrap();
    }

    #[test]
    fn test_real_runtime_create_file() {
        let runtime = RealRuntime;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stream.txt");

        {
            let mut writer = runtime.create_file(&file_path).unwrap();
            writer.write_all(b"streamed content").unwrap();
        }

        assert_eq!(
            runtime.read_to_string(&file_path).unwrap(),
            "streamed content"
        );
    }

    #[test]
    fn test_real_runtime_errors() {
        let runtime = RealRuntime;

        let result = runtime.read_to_string(std::path::Path::new("/nonexistent/path/file.txt"));
        assert!(result.is_err());

        let result = runtime.remove_file(std::path::Path::new("/nonexistent/path/file.txt"));
        assert!(result.is_err());

        let result = runtime.read_dir(std::path::Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }
}
