use std::ffi::OsString;
use std::path::PathBuf;

use crate::backend::{CancelToken, DecompilerBackend};
use crate::error::DecompileError;
use crate::java::{JavaRuntime, check_success};

/// CFR run as a separate java process per class. Holds no mutable state, so one
/// instance serves every worker.
#[derive(Debug, Clone)]
pub struct Cfr {
    java: JavaRuntime,
    cfr_jar: PathBuf,
    class_jar: PathBuf,
}

impl Cfr {
    pub fn new(java: JavaRuntime, cfr_jar: PathBuf, class_jar: PathBuf) -> Self {
        Self {
            java,
            cfr_jar,
            class_jar,
        }
    }

    fn args(&self, class_name: &str) -> Vec<OsString> {
        vec![
            "-jar".into(),
            self.cfr_jar.clone().into(),
            "--extraclasspath".into(),
            self.class_jar.clone().into(),
            class_name.replace('/', ".").into(),
            "--silent".into(),
            "true".into(),
            "--comments".into(),
            "false".into(),
        ]
    }
}

impl DecompilerBackend for Cfr {
    fn decompile(&self, class_name: &str, cancel: &CancelToken) -> Result<String, DecompileError> {
        let output = self.java.run(self.args(class_name), cancel, class_name)?;
        let source = check_success(output)?;
        if source.trim().is_empty() {
            return Err(DecompileError::NoOutput(class_name.to_string()));
        }
        Ok(source)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "batch_decompile_cfr_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn make_executable(path: &Path) -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[test]
    fn decompile_passes_dotted_name_and_extraclasspath() -> anyhow::Result<()> {
        let base = temp_dir("decompile_class");
        let fake_java = base.join("bin").join("java");
        write_file(
            &fake_java,
            r#"#!/bin/sh
set -e
if [ "$3" = "--extraclasspath" ] && [ "$5" = "org.example.Demo" ]; then
  cat <<'EOF'
package org.example;

public class Demo {
}
EOF
else
  echo "unexpected args: $*" >&2
  exit 1
fi
"#,
        )?;
        make_executable(&fake_java)?;

        let cfr = Cfr::new(
            JavaRuntime::new(&fake_java),
            base.join("cfr.jar"),
            base.join("demo.jar"),
        );
        let out = cfr.decompile("org/example/Demo", &CancelToken::new())?;
        assert!(out.contains("public class Demo"));
        assert!(!cfr.requires_fresh_instance_per_task());

        let _ = fs::remove_dir_all(base);
        Ok(())
    }

    #[test]
    fn decompile_surfaces_cfr_stderr() -> anyhow::Result<()> {
        let base = temp_dir("decompile_error");
        let fake_java = base.join("bin").join("java");
        write_file(
            &fake_java,
            "#!/bin/sh\necho \"boom from fake cfr\" >&2\nexit 1\n",
        )?;
        make_executable(&fake_java)?;

        let cfr = Cfr::new(
            JavaRuntime::new(&fake_java),
            base.join("cfr.jar"),
            base.join("demo.jar"),
        );
        let err = cfr
            .decompile("org/example/Demo", &CancelToken::new())
            .unwrap_err()
            .to_string();
        assert!(err.contains("boom from fake cfr"));

        let _ = fs::remove_dir_all(base);
        Ok(())
    }
}
