//! Scoped external-tool execution.
//!
//! The pipeline shells out twice: the egocentric frame-extraction tool and
//! the video muxer. Every invocation goes through `ExternalTool::run`, which
//! blocks until the process exits, captures its exit status and stderr, and
//! surfaces a typed `ExternalTool` error on failure. No retries, no timeout;
//! failure is fatal for the invoking stage.

use std::process::Command;

use anyhow::Result;

use crate::PipelineError;

pub struct ExternalTool {
    program: String,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn run(&self, args: &[String]) -> Result<()> {
        log::info!("running: {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program).args(args).output().map_err(|e| {
            PipelineError::ExternalTool {
                tool: self.program.clone(),
                status: None,
                stderr: e.to_string(),
            }
        })?;
        if !output.status.success() {
            return Err(PipelineError::ExternalTool {
                tool: self.program.clone(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}
