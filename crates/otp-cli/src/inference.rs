//! External inference command.
//!
//! The configured command receives the rendered prompt on stdin and must
//! print the model's reply on stdout. The reply is handed to the session
//! decoder untouched.

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use otp_core::{Completion, PromptFrame};
use otp_store::InferenceConfig;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("'{command}' returned an empty reply")]
    Empty { command: String },
}

pub struct CommandCompletion {
    command: String,
    args: Vec<String>,
}

impl CommandCompletion {
    /// `None` when no command is configured.
    pub fn from_config(config: &InferenceConfig) -> Option<Self> {
        let command = config.command.as_deref()?.trim();
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command: command.to_string(),
            args: config.args.clone(),
        })
    }
}

impl Completion for CommandCompletion {
    type Error = InferenceError;

    fn complete(&self, frame: &PromptFrame) -> Result<String, Self::Error> {
        let spawn_err = |source| InferenceError::Spawn {
            command: self.command.clone(),
            source,
        };

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("OTP_MODEL", &frame.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        // Feed stdin from its own thread so a command that writes while it
        // reads cannot fill both pipes and stall.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = frame.render();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let output = child.wait_with_output().map_err(spawn_err)?;

        // A command that exits without reading stdin reports through its status.
        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.join()
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(spawn_err(e));
        }

        if !output.status.success() {
            return Err(InferenceError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            return Err(InferenceError::Empty {
                command: self.command.clone(),
            });
        }
        tracing::debug!("inference reply: {} bytes", reply.len());
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> PromptFrame {
        PromptFrame {
            model: "gemini-2.5-flash".into(),
            system: "sys".into(),
            state: String::new(),
            user: "U(John){S:active}".into(),
        }
    }

    #[test]
    fn test_unconfigured() {
        assert!(CommandCompletion::from_config(&InferenceConfig::default()).is_none());
        let blank = InferenceConfig {
            command: Some("  ".into()),
            args: vec![],
        };
        assert!(CommandCompletion::from_config(&blank).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_reply_from_stdout() {
        // The rendered prompt ends with the user input.
        let backend = CommandCompletion::from_config(&InferenceConfig {
            command: Some("tail".into()),
            args: vec!["-n".into(), "1".into()],
        })
        .unwrap();
        assert_eq!(backend.complete(&frame()).unwrap(), "U(John){S:active}");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_status() {
        let backend = CommandCompletion::from_config(&InferenceConfig {
            command: Some("false".into()),
            args: vec![],
        })
        .unwrap();
        assert!(matches!(
            backend.complete(&frame()),
            Err(InferenceError::Failed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_large_prompt_through_echoing_command() {
        // `cat` writes while it reads; the prompt is far past a pipe buffer.
        let backend = CommandCompletion::from_config(&InferenceConfig {
            command: Some("cat".into()),
            args: vec![],
        })
        .unwrap();
        let mut big = frame();
        big.state = "A{x:1}\n".repeat(40_000);

        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(backend.complete(&big).map(|reply| reply.len()));
        });
        let len = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("completion should not block")
            .unwrap();
        assert!(len > 280_000);
    }

    #[test]
    fn test_missing_binary() {
        let backend = CommandCompletion::from_config(&InferenceConfig {
            command: Some("otp-no-such-binary".into()),
            args: vec![],
        })
        .unwrap();
        assert!(matches!(
            backend.complete(&frame()),
            Err(InferenceError::Spawn { .. })
        ));
    }
}
