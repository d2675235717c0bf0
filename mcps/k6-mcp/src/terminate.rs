//! Process termination with graceful-then-forced escalation

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::error::K6Result;

/// How a child process ended after a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationOutcome {
    /// The grace period elapsed and the process was force-killed
    pub escalated: bool,
    pub exit_code: Option<i32>,
}

/// Ask `child` to exit, waiting up to `grace` before killing it outright
pub async fn terminate(child: &mut Child, pid: u32, grace: Duration) -> K6Result<TerminationOutcome> {
    request_graceful(child, pid)?;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            let status = status?;
            debug!(pid, ?status, "process exited after graceful stop");
            Ok(TerminationOutcome {
                escalated: false,
                exit_code: status.code(),
            })
        }
        Err(_elapsed) => {
            warn!(pid, grace_secs = grace.as_secs_f64(), "grace period elapsed, killing process");
            child.kill().await?;
            let exit_code = child.try_wait()?.as_ref().and_then(ExitStatus::code);
            Ok(TerminationOutcome {
                escalated: true,
                exit_code,
            })
        }
    }
}

#[cfg(unix)]
fn request_graceful(_child: &mut Child, pid: u32) -> K6Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // Already gone; the wait below returns immediately
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn request_graceful(child: &mut Child, _pid: u32) -> K6Result<()> {
    child.start_kill()?;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_sh(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    #[tokio::test]
    async fn test_graceful_stop() {
        let mut child = spawn_sh("exec sleep 30");
        let pid = child.id().unwrap();

        let outcome = terminate(&mut child, pid, Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.escalated);
        // Killed by SIGTERM, so no exit code
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn test_escalates_when_term_ignored() {
        let mut child = spawn_sh("trap '' TERM; sleep 5");
        let pid = child.id().unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(300)).await;

        let outcome = terminate(&mut child, pid, Duration::from_millis(200))
            .await
            .unwrap();

        assert!(outcome.escalated);
    }

    #[tokio::test]
    async fn test_already_exited_process() {
        let mut child = spawn_sh("exit 3");
        let pid = child.id().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let outcome = terminate(&mut child, pid, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!outcome.escalated);
        assert_eq!(outcome.exit_code, Some(3));
    }
}
