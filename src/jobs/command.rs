//! Transform backed by an external program
//!
//! The program is invoked as `PROGRAM [ARGS..] CONTENT [STYLE] OUTPUT` and must write
//! the result image to OUTPUT (any format the `image` crate can read) and exit
//! with status 0. OUTPUT is unique per job; jobs on the same content may overlap.

use super::{ImageTransform, JobError, Rendered};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Cap on captured stderr in error messages
const MAX_STDERR_CHARS: usize = 500;

pub struct CommandTransform {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTransform {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Parse a whitespace-separated command line, e.g. `python3 fnst.py`
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }

    /// Fixed arguments placed before the image paths
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Result file next to the content image, sharing its stem
    fn output_path(content: &Path, job_id: &str) -> PathBuf {
        let stem = content
            .file_stem()
            .map_or_else(|| "content".to_string(), |s| s.to_string_lossy().into_owned());
        content.with_file_name(format!("{stem}.{job_id}.out.png"))
    }
}

impl ImageTransform for CommandTransform {
    fn transform(
        &self,
        job_id: &str,
        content: &Path,
        style: Option<&Path>,
    ) -> Result<Rendered, JobError> {
        let output = Self::output_path(content, job_id);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(content);
        if let Some(style) = style {
            cmd.arg(style);
        }
        cmd.arg(&output);

        let started = Instant::now();
        let result = cmd.output().map_err(|e| {
            JobError::Transform(format!("failed to run {}: {e}", self.program.display()))
        })?;
        let elapsed_secs = started.elapsed().as_secs_f64();

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            let _ = std::fs::remove_file(&output);
            return Err(JobError::Transform(format!(
                "{} exited with {}: {stderr}",
                self.program.display(),
                result.status
            )));
        }

        let image = image::open(&output);
        let _ = std::fs::remove_file(&output);
        let image = image.map_err(|e| {
            JobError::Transform(format!("unreadable output {}: {e}", output.display()))
        })?;

        Ok(Rendered {
            image,
            elapsed_secs,
        })
    }
}
