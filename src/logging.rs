use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing_subscriber::{
    fmt, fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "info,settlement_keeper=debug";

// Initialize logging and tracing: console always, log file when a path is given
pub fn init_tracing(log_path: Option<&Path>) {
    let file_layer = log_path.map(|path| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(AppendLog::new(path))
    });

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
        ))
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

/// Append-only log file sink.
///
/// I/O failures never reach the caller: the first one is reported on stderr,
/// later ones are dropped silently, and the file is reopened on the next write.
#[derive(Clone)]
pub struct AppendLog {
    inner: Arc<AppendLogInner>,
}

struct AppendLogInner {
    path: PathBuf,
    file: Mutex<Option<File>>,
    reported: AtomicBool,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let log = Self {
            inner: Arc::new(AppendLogInner {
                path: path.into(),
                file: Mutex::new(None),
                reported: AtomicBool::new(false),
            }),
        };
        let file = log.open();
        *log.inner.file.lock() = file;
        log
    }

    fn open(&self) -> Option<File> {
        match open_append(&self.inner.path) {
            Ok(file) => Some(file),
            Err(e) => {
                self.report(&e);
                None
            }
        }
    }

    fn report(&self, e: &io::Error) {
        if !self.inner.reported.swap(true, Ordering::Relaxed) {
            eprintln!(
                "⚠️ Cannot write log file {}: {} (continuing with console logging only)",
                self.inner.path.display(),
                e
            );
        }
    }

    fn append(&self, buf: &[u8]) {
        let mut file = self.inner.file.lock();
        if file.is_none() {
            *file = self.open();
        }
        if let Some(handle) = file.as_mut() {
            if let Err(e) = handle.write_all(buf) {
                self.report(&e);
                *file = None;
            }
        }
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for &AppendLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for AppendLog {
    type Writer = &'a AppendLog;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}
