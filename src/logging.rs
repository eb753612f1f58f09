use crate::config::LogConfig;
use chrono::Local;
use env_logger::{Builder, Target};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
};

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("cannot open log file: {0}")]
    File(#[from] io::Error),
    #[error(transparent)]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Writes every line to stderr and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Installs the global logger. `RUST_LOG`, when set, overrides the level.
pub fn init(config: &LogConfig) -> Result<(), LogInitError> {
    let mut builder = Builder::new();
    builder
        .filter_level(config.level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.target(),
                record.level(),
                record.args()
            )
        });

    if let Some(path) = &config.file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(Tee { file })));
    }

    builder.try_init()?;
    Ok(())
}
