use std::ffi::OsStr;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::CancelToken;
use crate::error::DecompileError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct JavaOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// The `java` launcher used by the external decompilers.
#[derive(Debug, Clone)]
pub struct JavaRuntime {
    bin: PathBuf,
}

impl JavaRuntime {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &std::path::Path {
        &self.bin
    }

    /// Runs java with `args`, killing the child if `cancel` fires before it exits.
    pub fn run<I, S>(&self, args: I, cancel: &CancelToken, label: &str) -> Result<JavaOutput, DecompileError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DecompileError::Launch {
                program: self.bin.display().to_string(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    abandon(&mut child, stdout, stderr);
                    return Err(e.into());
                }
            }
            if cancel.is_cancelled() {
                abandon(&mut child, stdout, stderr);
                return Err(DecompileError::Cancelled(label.to_string()));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        Ok(JavaOutput {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        #[cfg(windows)]
        {
            let lower = self.bin.to_string_lossy().to_ascii_lowercase();
            if lower.ends_with(".cmd") || lower.ends_with(".bat") {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(&self.bin).args(args);
                return cmd;
            }
        }

        let mut cmd = Command::new(&self.bin);
        cmd.args(args);
        cmd
    }
}

impl Default for JavaRuntime {
    fn default() -> Self {
        Self::new("java")
    }
}

/// Fails with the captured stderr unless java exited successfully.
pub fn check_success(output: JavaOutput) -> Result<String, DecompileError> {
    if !output.status.success() {
        return Err(DecompileError::Exit {
            status: output.status.to_string(),
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Kills and reaps the child, then waits for both pipe readers to hit EOF.
fn abandon(child: &mut Child, stdout: JoinHandle<String>, stderr: JoinHandle<String>) {
    let _ = child.kill();
    let _ = child.wait();
    let _ = stdout.join();
    let _ = stderr.join();
}
