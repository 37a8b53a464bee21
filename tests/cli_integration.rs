#![cfg(unix)]

use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const FAKE_JAVA: &str = r#"#!/bin/sh
set -e
if [ "$3" = "--extraclasspath" ]; then
  cls="$5"
  case "$cls" in
    org.example.pkg.A)
      cat <<'EOF'
package org.example.pkg;

public class A {
    String greeting = "café";
}
EOF
      ;;
    org.example.pkg.B)
      cat <<'EOF'
package org.example.pkg;

public class B {
}
EOF
      ;;
    org.example.pkg.Broken)
      echo "java.lang.IllegalStateException: bad constant pool" >&2
      exit 1
      ;;
    org.example.pkg.Slow)
      exec sleep 5
      ;;
    *)
      echo "package other; public class Unknown {}"
      ;;
  esac
else
  echo "unexpected invocation: $*" >&2
  exit 2
fi
"#;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "batch_decompile_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

struct Fixture {
    base: PathBuf,
    jar: PathBuf,
    bin_dir: PathBuf,
    cfr: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> anyhow::Result<Self> {
        let base = temp_dir(name);
        let jar = base.join("lib").join("demo-1.0.jar");
        write_jar(
            &jar,
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n"),
                ("org/example/pkg/A.class", b""),
                ("org/example/pkg/B.class", b""),
                ("org/example/pkg/Broken.class", b""),
                ("org/example/pkg/Slow.class", b""),
                ("org/other/C.class", b""),
            ],
        )?;

        let bin_dir = base.join("bin");
        let java = bin_dir.join("java");
        write_file(&java, FAKE_JAVA)?;
        make_executable(&java)?;

        let cfr = base.join("cfr.jar");
        write_file(&cfr, "stub")?;

        Ok(Self {
            base,
            jar,
            bin_dir,
            cfr,
        })
    }

    fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        let path_env = format!(
            "{}:{}",
            self.bin_dir.to_string_lossy(),
            std::env::var("PATH").unwrap_or_default()
        );
        let out = Command::new(env!("CARGO_BIN_EXE_batch-decompile"))
            .arg("--cfr")
            .arg(&self.cfr)
            .args(args)
            .env("PATH", path_env)
            .env_remove("BATCH_DECOMPILE_JAVA")
            .env_remove("RUST_LOG")
            .output()?;
        Ok(out)
    }

    fn run_json(&self, args: &[&str]) -> anyhow::Result<Value> {
        let out = self.run(args)?;
        if !out.status.success() {
            return Err(anyhow::anyhow!(
                "command failed: status={:?}, stderr={}",
                out.status.code(),
                String::from_utf8_lossy(&out.stderr)
            ));
        }
        Ok(serde_json::from_slice(&out.stdout)?)
    }

    fn jar(&self) -> &str {
        self.jar.to_str().unwrap()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.base);
    }
}

fn archive_entries(path: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path)?)?;
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let mut content = String::new();
        entry.read_to_string(&mut content)?;
        entries.push((entry.name().to_string(), content));
    }
    Ok(entries)
}

#[test]
fn list_prints_matching_classes() -> anyhow::Result<()> {
    let fx = Fixture::new("list")?;
    let out = fx.run(&["list", fx.jar(), "--pattern", "org.example.pkg.*"])?;
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout)?;
    let names: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        names,
        [
            "org/example/pkg/A",
            "org/example/pkg/B",
            "org/example/pkg/Broken",
            "org/example/pkg/Slow",
        ]
    );
    Ok(())
}

#[test]
fn single_class_is_written_as_source_file() -> anyhow::Result<()> {
    let fx = Fixture::new("single")?;
    let dest = fx.base.join("out").join("A.java");
    let report = fx.run_json(&[
        "decompile",
        fx.jar(),
        "--class",
        "org.example.pkg.A",
        "-o",
        dest.to_str().unwrap(),
    ])?;

    assert_eq!(report["total"], Value::from(1));
    assert_eq!(report["succeeded"], Value::from(1));
    assert_eq!(
        report["output"],
        Value::String(dest.to_string_lossy().to_string())
    );

    let written = std::fs::read_to_string(&dest)?;
    assert!(written.starts_with("package org.example.pkg;"));
    assert!(written.contains("String greeting = \"café\";"));
    Ok(())
}

#[test]
fn package_with_failure_is_bundled_with_placeholder() -> anyhow::Result<()> {
    let fx = Fixture::new("package")?;
    let dest = fx.base.join("sources.zip");
    let report = fx.run_json(&[
        "decompile",
        fx.jar(),
        "--pattern",
        "re:org/example/pkg/(A|B|Broken)",
        "--threads",
        "2",
        "-o",
        dest.to_str().unwrap(),
    ])?;

    assert_eq!(report["total"], Value::from(3));
    assert_eq!(report["succeeded"], Value::from(2));
    assert_eq!(report["failed"], Value::from(1));
    assert_eq!(
        report["failures"][0]["class_name"],
        Value::String("org/example/pkg/Broken".to_string())
    );

    let entries = archive_entries(&dest)?;
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "org/example/pkg/A.java",
            "org/example/pkg/B.java",
            "org/example/pkg/Broken.java",
        ]
    );
    let broken = &entries[2].1;
    assert!(broken.contains("public class Broken"));
    assert!(broken.contains("Failed to decompile: org/example/pkg/Broken"));
    Ok(())
}

#[test]
fn slow_class_times_out_without_blocking_the_batch() -> anyhow::Result<()> {
    let fx = Fixture::new("timeout")?;
    let dest = fx.base.join("slow.zip");
    let started = Instant::now();
    let report = fx.run_json(&[
        "decompile",
        fx.jar(),
        "--pattern",
        "re:org/example/pkg/(B|Slow)",
        "--timeout",
        "1",
        "-o",
        dest.to_str().unwrap(),
    ])?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(report["total"], Value::from(2));
    assert_eq!(report["timed_out"], Value::from(1));
    assert_eq!(
        report["failures"][0]["reason"],
        Value::String("timed out".to_string())
    );

    let entries = archive_entries(&dest)?;
    let slow = &entries
        .iter()
        .find(|(n, _)| n == "org/example/pkg/Slow.java")
        .expect("slow entry")
        .1;
    assert!(slow.contains("took too long to decompile: org/example/pkg/Slow"));
    Ok(())
}

#[test]
fn without_output_nothing_is_written() -> anyhow::Result<()> {
    let fx = Fixture::new("no_output")?;
    let report = fx.run_json(&["decompile", fx.jar(), "--package", "org.other"])?;
    assert_eq!(report["succeeded"], Value::from(1));
    assert_eq!(report["output"], Value::Null);
    Ok(())
}

#[test]
fn empty_or_invalid_selection_fails_before_running() -> anyhow::Result<()> {
    let fx = Fixture::new("empty")?;
    let out = fx.run(&["decompile", fx.jar(), "--package", "com.missing"])?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("No classes matched"));

    let out = fx.run(&["decompile", fx.jar(), "--pattern", "re:("])?;
    assert!(!out.status.success());
    Ok(())
}
