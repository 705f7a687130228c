use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cadence_core::CadenceError;
use wait_timeout::ChildExt;

#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args` to completion, killing it once `timeout` elapses.
pub fn exec(program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {} {:?}", program, args))?;

    // drain pipes on threads so a chatty child cannot block on a full pipe
    let mut stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout pipe"))?;
    let mut stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr pipe"))?;
    let out_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf);
        buf
    });
    let err_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    });

    let Some(status) = child.wait_timeout(timeout).with_context(|| format!("wait for {program}"))? else {
        let _ = child.kill();
        let _ = child.wait();
        // readers are left detached; a grandchild may still hold the pipes
        return Err(CadenceError::CommandTimedOut {
            command: format!("{} {}", program, args.join(" ")),
            after_secs: timeout.as_secs(),
        }
        .into());
    };

    let stdout = out_reader.join().map_err(|_| anyhow!("stdout reader panicked"))?;
    let stderr = err_reader.join().map_err(|_| anyhow!("stderr reader panicked"))?;
    Ok(CommandOutput {
        success: status.success(),
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

/// Like [`exec`] but a non-zero exit is an error carrying both streams.
pub fn run(program: &str, args: &[String], timeout: Duration) -> Result<String> {
    let out = exec(program, args, timeout)?;
    if !out.success {
        return Err(anyhow!(
            "command failed: {} {:?}\nstdout:{}\nstderr:{}",
            program,
            args,
            out.stdout,
            out.stderr
        ));
    }
    Ok(out.stdout.trim().to_string())
}
