//! File Stager (§4.6): atomic stage-then-swap of rendered content onto
//! `dest`, with diff output and a mount-point write fallback.

use crate::error::{ConfdError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct StagerOptions {
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub keep_stage_file: bool,
    pub noop: bool,
    pub show_diff: bool,
    pub diff_context: usize,
    pub color_diff: bool,
}

pub struct FileStager {
    options: StagerOptions,
}

impl FileStager {
    pub fn new(options: StagerOptions) -> Self {
        Self { options }
    }

    /// `setFileMode` (§4.9): resolve the effective mode — explicit, or
    /// inherited from `dest`, or `0644` — and remember it for subsequent
    /// stage creation.
    pub fn set_file_mode(&mut self, dest: &Path) -> Result<()> {
        if self.options.mode.is_some() {
            return Ok(());
        }
        let mode = fs::metadata(dest)
            .map(|m| mode_bits(&m))
            .unwrap_or(0o644);
        self.options.mode = Some(mode);
        Ok(())
    }

    /// Create a dot-prefixed temp file in `dest`'s directory (guaranteeing
    /// the later `rename` stays on one filesystem), write `content`, and
    /// apply mode/ownership.
    pub fn create_stage_file(&self, dest: &Path, content: &[u8]) -> Result<PathBuf> {
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let stage_name = format!(
            ".{}.confd-stage-{}",
            dest.file_name().and_then(|n| n.to_str()).unwrap_or("out"),
            std::process::id()
        );
        let stage_path = dir.join(stage_name);

        let result = self.write_stage(&stage_path, content);
        if result.is_err() {
            let _ = fs::remove_file(&stage_path);
        }
        result?;
        Ok(stage_path)
    }

    fn write_stage(&self, stage_path: &Path, content: &[u8]) -> Result<()> {
        let mut file = fs::File::create(stage_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        if let Some(mode) = self.options.mode {
            apply_mode(stage_path, mode)?;
        }
        apply_ownership(stage_path, self.options.owner.as_deref(), self.options.group.as_deref())?;
        Ok(())
    }

    /// Byte-equal comparison; a nonexistent `dest` always counts as changed.
    pub fn is_config_changed(&self, stage: &Path, dest: &Path) -> Result<bool> {
        let dest_content = match fs::read(dest) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        let stage_content = fs::read(stage)?;
        Ok(dest_content != stage_content)
    }

    /// Swap `stage` into `dest`. Assumes the caller already decided a swap
    /// is needed and `noop` is false.
    pub fn sync_files(&self, stage: &Path, dest: &Path) -> Result<()> {
        let result = if self.options.keep_stage_file {
            self.copy_fallback(stage, dest)
        } else {
            match fs::rename(stage, dest) {
                Ok(()) => Ok(()),
                Err(e) if is_cross_device(&e) => self.copy_fallback(stage, dest),
                Err(e) => Err(e.into()),
            }
        };

        if !self.options.keep_stage_file {
            let _ = fs::remove_file(stage);
        }
        result
    }

    fn copy_fallback(&self, stage: &Path, dest: &Path) -> Result<()> {
        let content = fs::read(stage)?;
        fs::write(dest, &content)?;
        if let Some(mode) = self.options.mode {
            apply_mode(dest, mode)?;
        }
        apply_ownership(dest, self.options.owner.as_deref(), self.options.group.as_deref())?;
        Ok(())
    }

    /// Print a unified diff between `dest` (old) and `stage` (new) to
    /// stdout. A no-op if the two are identical.
    pub fn show_diff_output(&self, stage: &Path, dest: &Path) -> Result<()> {
        if !self.options.show_diff {
            return Ok(());
        }
        let old = fs::read_to_string(dest).unwrap_or_default();
        let new = fs::read_to_string(stage)?;
        if old == new {
            return Ok(());
        }

        let diff = similar::TextDiff::from_lines(&old, &new);
        for group in diff.grouped_ops(self.options.diff_context.max(1)) {
            for op in group {
                for change in diff.iter_changes(&op) {
                    let sign = match change.tag() {
                        similar::ChangeTag::Delete => "-",
                        similar::ChangeTag::Insert => "+",
                        similar::ChangeTag::Equal => " ",
                    };
                    if self.options.color_diff {
                        let color = match change.tag() {
                            similar::ChangeTag::Delete => "\x1b[31m",
                            similar::ChangeTag::Insert => "\x1b[32m",
                            similar::ChangeTag::Equal => "",
                        };
                        print!("{}{}{}\x1b[0m", color, sign, change);
                    } else {
                        print!("{}{}", sign, change);
                    }
                }
            }
        }
        Ok(())
    }
}

fn is_cross_device(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        let _ = err;
        false
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn mode_bits(_metadata: &fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_ownership(path: &Path, owner: Option<&str>, group: Option<&str>) -> Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    if owner.is_none() && group.is_none() {
        return Ok(());
    }

    let uid = owner.map(lookup_uid).transpose()?.unwrap_or(u32::MAX);
    let gid = group.map(lookup_gid).transpose()?.unwrap_or(u32::MAX);

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| ConfdError::backend(format!("path contains NUL byte: {}", e)))?;

    let result = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if result != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_ownership(_path: &Path, _owner: Option<&str>, _group: Option<&str>) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn lookup_uid(name: &str) -> Result<u32> {
    use std::ffi::CString;
    let c_name = CString::new(name).map_err(|e| ConfdError::backend(e.to_string()))?;
    let passwd = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if passwd.is_null() {
        return Err(ConfdError::backend(format!("unknown user '{}'", name)));
    }
    Ok(unsafe { (*passwd).pw_uid })
}

#[cfg(unix)]
fn lookup_gid(name: &str) -> Result<u32> {
    use std::ffi::CString;
    let c_name = CString::new(name).map_err(|e| ConfdError::backend(e.to_string()))?;
    let group = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if group.is_null() {
        return Err(ConfdError::backend(format!("unknown group '{}'", name)));
    }
    Ok(unsafe { (*group).gr_gid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonexistent_dest_counts_as_changed() {
        let dir = tempfile::tempdir().unwrap();
        let stager = FileStager::new(StagerOptions::default());
        let stage = dir.path().join("stage");
        fs::write(&stage, b"hello").unwrap();
        assert!(stager.is_config_changed(&stage, &dir.path().join("missing")).unwrap());
    }

    #[test]
    fn identical_content_is_not_changed() {
        let dir = tempfile::tempdir().unwrap();
        let stager = FileStager::new(StagerOptions::default());
        let stage = dir.path().join("stage");
        let dest = dir.path().join("dest");
        fs::write(&stage, b"hello").unwrap();
        fs::write(&dest, b"hello").unwrap();
        assert!(!stager.is_config_changed(&stage, &dest).unwrap());
    }

    #[test]
    fn sync_files_renames_stage_onto_dest() {
        let dir = tempfile::tempdir().unwrap();
        let stager = FileStager::new(StagerOptions::default());
        let dest = dir.path().join("dest");
        let stage = stager.create_stage_file(&dest, b"rendered").unwrap();
        stager.sync_files(&stage, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"rendered");
        assert!(!stage.exists());
    }

    #[test]
    fn keep_stage_file_leaves_stage_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = StagerOptions::default();
        options.keep_stage_file = true;
        let stager = FileStager::new(options);
        let dest = dir.path().join("dest");
        let stage = stager.create_stage_file(&dest, b"rendered").unwrap();
        stager.sync_files(&stage, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"rendered");
        assert!(stage.exists());
    }

    #[test]
    fn set_file_mode_defaults_to_0644_when_dest_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut stager = FileStager::new(StagerOptions::default());
        stager.set_file_mode(&dir.path().join("missing")).unwrap();
        assert_eq!(stager.options.mode, Some(0o644));
    }
}
