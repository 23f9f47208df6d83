//! Converter that shells out to an external PDF-to-text tool.

use super::Converter;
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

const INPUT_PLACEHOLDER: &str = "{input}";

/// Runs a command line and takes its stdout as the converted text.
///
/// `{input}` in the arguments is replaced with the PDF path; without a
/// placeholder the path is appended as the last argument.
///
/// ```
/// use bulletin_digest::backend::CommandConverter;
///
/// let converter = CommandConverter::parse("pdftotext -layout {input} -").unwrap();
/// assert_eq!(converter.program(), "pdftotext");
/// ```
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| PipelineError::Conversion("converter command is empty".into()))?;
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn args_for(&self, pdf_path: &Path) -> Vec<String> {
        let path = pdf_path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(INPUT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(INPUT_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(path.into_owned());
        }
        args
    }
}

#[async_trait]
impl Converter for CommandConverter {
    async fn convert(&self, pdf_path: &Path) -> Result<String> {
        let args = self.args_for(pdf_path);
        tracing::info!(program = %self.program, pdf = %pdf_path.display(), "converting PDF");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::Conversion(format!("could not start {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Conversion(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::info!(chars = text.len(), "conversion complete");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
