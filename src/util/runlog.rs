//! The per-run log file.

use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

const LINE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Log file of a single backup run.
///
/// Everything written is appended to the file and, unless disabled, echoed
/// to the console. Subprocess output is written through the [Write] impl,
/// progress messages through [RunLog::line].
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl RunLog {
    /// Opens (or creates) the log file at `path` in append mode.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            echo: true,
        })
    }

    /// Disables the console echo.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a timestamped line.
    pub fn line(&mut self, message: impl Display) -> io::Result<()> {
        let timestamp = Local::now().format(LINE_TIMESTAMP_FORMAT);
        writeln!(self, "[{timestamp}] {message}")
    }
}

impl Write for RunLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.echo {
            // console is best effort, the file is the record
            let _ = io::stdout().write_all(buf);
        }
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.echo {
            let _ = io::stdout().flush();
        }
        self.file.flush()
    }
}
