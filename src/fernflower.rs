use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::backend::{CancelToken, DecompilerBackend};
use crate::catalog::read_class_family;
use crate::error::DecompileError;
use crate::java::{JavaRuntime, check_success};
use crate::source::simple_name;

/// Fernflower's console decompiler, fed with class files extracted into a scratch
/// directory owned by this instance. Two concurrent calls would overwrite each
/// other's inputs, so every task gets its own instance.
#[derive(Debug)]
pub struct Fernflower {
    java: JavaRuntime,
    fernflower_jar: PathBuf,
    class_jar: PathBuf,
    scratch: TempDir,
}

impl Fernflower {
    pub fn new(
        java: JavaRuntime,
        fernflower_jar: PathBuf,
        class_jar: PathBuf,
    ) -> Result<Self, DecompileError> {
        let scratch = tempfile::Builder::new()
            .prefix("batch-decompile-fernflower-")
            .tempdir()?;
        Ok(Self {
            java,
            fernflower_jar,
            class_jar,
            scratch,
        })
    }

    fn prepare_input(&self, class_name: &str) -> Result<(PathBuf, PathBuf), DecompileError> {
        let input = self.scratch.path().join("in");
        let output = self.scratch.path().join("out");
        reset_dir(&input)?;
        reset_dir(&output)?;

        let family = read_class_family(&self.class_jar, class_name)
            .map_err(|e| DecompileError::Backend(format!("{e:#}")))?;
        if family.is_empty() {
            return Err(DecompileError::ClassNotFound(class_name.to_string()));
        }

        for (entry, bytes) in family {
            let target = input.join(&entry);
            if !is_within(&input, &target) {
                return Err(DecompileError::Backend(format!(
                    "jar entry {entry} resolves outside the scratch directory"
                )));
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)?;
        }
        Ok((input, output))
    }
}

impl DecompilerBackend for Fernflower {
    fn decompile(&self, class_name: &str, cancel: &CancelToken) -> Result<String, DecompileError> {
        let (input, output) = self.prepare_input(class_name)?;

        let args: Vec<OsString> = vec![
            "-jar".into(),
            self.fernflower_jar.clone().into(),
            "-dgs=1".into(),
            input.into(),
            output.clone().into(),
        ];
        check_success(self.java.run(args, cancel, class_name)?)?;

        let wanted = format!("{}.java", simple_name(class_name));
        let path = find_file(&output, &wanted)?
            .ok_or_else(|| DecompileError::NoOutput(class_name.to_string()))?;
        Ok(fs::read_to_string(path)?)
    }

    fn requires_fresh_instance_per_task(&self) -> bool {
        true
    }
}

// Lexical containment; the scratch tree only holds directories we created.
fn is_within(root: &Path, target: &Path) -> bool {
    let Ok(rest) = target.strip_prefix(root) else {
        return false;
    };
    rest.components()
        .all(|c| matches!(c, std::path::Component::Normal(_)))
}

fn reset_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

fn find_file(dir: &Path, file_name: &str) -> io::Result<Option<PathBuf>> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if let Some(found) = find_file(&path, file_name)? {
                return Ok(Some(found));
            }
        } else if entry.file_name() == file_name {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
