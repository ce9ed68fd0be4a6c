//! Console output with verbosity levels.
//!
//! Decoded records go through the [`Printer`]; diagnostics go through
//! `tracing` to stderr.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Output levels, from always shown to most detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    Verbose,
    VeryVerbose,
    Chatty,
}

impl Verbosity {
    /// Level for a repeated `-v` flag.
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => Verbosity::Quiet,
            1 => Verbosity::Verbose,
            2 => Verbosity::VeryVerbose,
            _ => Verbosity::Chatty,
        }
    }

    /// Default `tracing` filter for this level when `RUST_LOG` is unset.
    pub fn log_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
            Verbosity::Chatty => "trace",
        }
    }
}

/// Line writer that drops lines above its configured level.
///
/// Writes run on tokio's blocking pool, so a stalled sink never holds an
/// async worker and the caller can stop waiting at any time.
pub struct Printer {
    level: Verbosity,
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Printer {
    pub fn new(level: Verbosity, sink: impl Write + Send + 'static) -> Self {
        Self {
            level,
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn stdout(level: Verbosity) -> Self {
        Self::new(level, io::stdout())
    }

    pub fn level(&self) -> Verbosity {
        self.level
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        level <= self.level
    }

    /// Write the enabled lines as one block, each followed by a newline.
    ///
    /// Blocks from concurrent callers never interleave.
    pub async fn write_lines(&self, lines: Vec<(Verbosity, String)>) -> io::Result<()> {
        let mut block = String::new();
        for (level, line) in lines {
            if self.enabled(level) {
                block.push_str(&line);
                block.push('\n');
            }
        }
        if block.is_empty() {
            return Ok(());
        }

        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            sink.write_all(block.as_bytes())?;
            sink.flush()
        })
        .await
        .map_err(io::Error::other)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_from_count() {
        assert_eq!(Verbosity::from_count(0), Verbosity::Quiet);
        assert_eq!(Verbosity::from_count(1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_count(2), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from_count(3), Verbosity::Chatty);
        assert_eq!(Verbosity::from_count(9), Verbosity::Chatty);
    }

    #[tokio::test]
    async fn test_write_lines_filters_by_level() {
        let buffer = Buffer::default();
        let printer = Printer::new(Verbosity::Verbose, buffer.clone());

        printer
            .write_lines(vec![
                (Verbosity::Verbose, "header".to_string()),
                (Verbosity::VeryVerbose, "details".to_string()),
                (Verbosity::Chatty, "raw".to_string()),
                (Verbosity::Quiet, "always".to_string()),
            ])
            .await
            .unwrap();
        printer
            .write_lines(vec![(Verbosity::Chatty, "dropped".to_string())])
            .await
            .unwrap();

        let out = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out, "header\nalways\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_blocks_do_not_interleave() {
        let buffer = Buffer::default();
        let printer = Arc::new(Printer::new(Verbosity::Quiet, buffer.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for writer in 0..8 {
            let printer = Arc::clone(&printer);
            tasks.spawn(async move {
                for block in 0..20 {
                    let lines = (0..3)
                        .map(|line| (Verbosity::Quiet, format!("{writer}:{block}:{line}")))
                        .collect();
                    printer.write_lines(lines).await.unwrap();
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let out = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 8 * 20 * 3);
        for block in lines.chunks(3) {
            let prefix = block[0].rsplit_once(':').unwrap().0;
            for (i, line) in block.iter().enumerate() {
                assert_eq!(*line, format!("{prefix}:{i}"));
            }
        }
    }
}
