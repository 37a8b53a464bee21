//! Decompiler backends and how the executor obtains them.
//!
//! A backend turns one internal class name into source text. Backends are either
//! reentrant, in which case one instance is shared by every worker, or carry
//! per-instance state that must not be touched by two calls at once. The latter
//! report it through [`DecompilerBackend::requires_fresh_instance_per_task`] and the
//! executor creates a new instance for each task.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cfr::Cfr;
use crate::error::DecompileError;
use crate::fernflower::Fernflower;
use crate::java::JavaRuntime;

/// Best-effort interruption request for one task.
///
/// Backends that can stop early (for example by killing a child process) poll it;
/// the rest simply finish and have their late result discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub trait DecompilerBackend: Send + Sync {
    fn decompile(&self, class_name: &str, cancel: &CancelToken) -> Result<String, DecompileError>;

    /// Whether an instance must be used by a single task only.
    fn requires_fresh_instance_per_task(&self) -> bool {
        false
    }
}

pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn DecompilerBackend>, DecompileError>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Box<dyn DecompilerBackend>, DecompileError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn DecompilerBackend>, DecompileError> {
        self()
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cfr,
    Fernflower,
}

/// Everything needed to launch the external decompilers.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub java: JavaRuntime,
    pub cfr_jar: Option<PathBuf>,
    pub fernflower_jar: Option<PathBuf>,
}

/// Builds the factory for `kind`, decompiling classes out of `class_jar`.
pub fn factory_for(
    kind: BackendKind,
    toolchain: &Toolchain,
    class_jar: &Path,
) -> Result<Arc<dyn BackendFactory>> {
    let java = toolchain.java.clone();
    let class_jar = class_jar.to_path_buf();

    let factory: Arc<dyn BackendFactory> = match kind {
        BackendKind::Cfr => {
            let cfr_jar = toolchain
                .cfr_jar
                .clone()
                .context("CFR backend selected but no cfr.jar was resolved")?;
            Arc::new(move || -> Result<Box<dyn DecompilerBackend>, DecompileError> {
                Ok(Box::new(Cfr::new(
                    java.clone(),
                    cfr_jar.clone(),
                    class_jar.clone(),
                )))
            })
        }
        BackendKind::Fernflower => {
            let fernflower_jar = toolchain
                .fernflower_jar
                .clone()
                .context("Fernflower backend selected but no fernflower.jar was resolved")?;
            Arc::new(move || -> Result<Box<dyn DecompilerBackend>, DecompileError> {
                Ok(Box::new(Fernflower::new(
                    java.clone(),
                    fernflower_jar.clone(),
                    class_jar.clone(),
                )?))
            })
        }
    };
    Ok(factory)
}
