use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{BackendKind, Toolchain};
use crate::cli::Cli;
use crate::executor::BatchConfig;
use crate::java::JavaRuntime;

const CFR_URL: &str = "https://github.com/leibnitz27/cfr/releases/download/0.152/cfr-0.152.jar";

pub fn resolve_java(cli: &Cli) -> JavaRuntime {
    if let Some(p) = cli.java.clone() {
        return JavaRuntime::new(p);
    }
    if let Ok(p) = env::var("BATCH_DECOMPILE_JAVA")
        && !p.trim().is_empty()
    {
        return JavaRuntime::new(p);
    }
    JavaRuntime::default()
}

pub fn resolve_cfr_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.cfr.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var("CFR_JAR") {
        return Ok(PathBuf::from(p));
    }

    let default_path = tools_dir()?.join("cfr.jar");
    if default_path.exists() {
        return Ok(default_path);
    }

    install_cfr_if_missing(&default_path)?;
    Ok(default_path)
}

/// Fernflower has no pinned release artifact, so it is never downloaded.
pub fn resolve_fernflower_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.fernflower.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var("FERNFLOWER_JAR") {
        return Ok(PathBuf::from(p));
    }

    let default_path = tools_dir()?.join("fernflower.jar");
    if default_path.exists() {
        return Ok(default_path);
    }

    anyhow::bail!(
        "fernflower.jar not found at {}. Use --fernflower or FERNFLOWER_JAR to point at it",
        default_path.display()
    )
}

/// Resolves only the decompiler `kind` actually needs.
pub fn resolve_toolchain(cli: &Cli, kind: BackendKind) -> Result<Toolchain> {
    let java = resolve_java(cli);
    let (cfr_jar, fernflower_jar) = match kind {
        BackendKind::Cfr => (Some(resolve_cfr_path(cli)?), None),
        BackendKind::Fernflower => (None, Some(resolve_fernflower_path(cli)?)),
    };
    Ok(Toolchain {
        java,
        cfr_jar,
        fernflower_jar,
    })
}

pub fn batch_config(threads: usize, timeout_secs: u64) -> BatchConfig {
    BatchConfig::new(threads, Duration::from_secs(timeout_secs))
}

fn tools_dir() -> Result<PathBuf> {
    Ok(batch_decompile_home()?.join("tools"))
}

fn batch_decompile_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("batch-decompile"))
}

fn install_cfr_if_missing(target_path: &Path) -> Result<()> {
    if target_path.exists() {
        return Ok(());
    }

    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    tracing::info!(target = %target_path.display(), "downloading CFR");
    eprintln!(
        "[batch-decompile] CFR not found, downloading to {}",
        target_path.display()
    );
    let status = std::process::Command::new("curl")
        .args([
            "-L",
            "--fail",
            "--silent",
            "--show-error",
            "-o",
            target_path
                .to_str()
                .context("cfr.jar target path is not valid UTF-8")?,
            CFR_URL,
        ])
        .status()
        .context(
            "Failed to execute curl (ensure curl is installed, or use --cfr to specify cfr.jar)",
        )?;

    if !status.success() {
        if cfg!(windows) {
            let ps_status = std::process::Command::new("powershell")
                .args([
                    "-NoProfile",
                    "-ExecutionPolicy",
                    "Bypass",
                    "-Command",
                    &format!(
                        "Invoke-WebRequest -Uri '{CFR_URL}' -OutFile '{}'",
                        target_path.display()
                    ),
                ])
                .status();

            if let Ok(s) = ps_status
                && s.success()
            {
                return Ok(());
            }
        }

        let _ = std::fs::remove_file(target_path);
        anyhow::bail!("Failed to download CFR (exit: {status}). You can use --cfr to specify local cfr.jar");
    }

    Ok(())
}
