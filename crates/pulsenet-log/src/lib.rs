//! A minimal buffered stdout logger used by the `pulsenet` binary.
//!
//! Log records are formatted on the caller's thread and handed to a
//! dedicated writer thread over a bounded channel, so logging from the
//! I/O task never blocks on a slow terminal.

use chrono::Local;
use log::{set_boxed_logger, set_max_level, Level, Log, SetLoggerError};
use std::io::{stdout, BufWriter, Write};
use std::sync::mpsc;
use std::thread;

enum LogCommand {
    Record(String),
    Flush,
}

pub struct PulsenetLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl PulsenetLogger {
    /// Installs the logger as the global `log` backend.
    ///
    /// `buffer_size` bounds the number of in-flight records; once full,
    /// `log` calls drop the record rather than block (see `Log::log`).
    pub fn init(max_level: Level, buffer_size: usize) -> Result<(), SetLoggerError> {
        let (sender, receiver) = mpsc::sync_channel(buffer_size.max(1));
        let logger = PulsenetLogger { max_level, sender };

        thread::Builder::new()
            .name("pulsenet-log-writer".into())
            .spawn(move || {
                let mut writer = BufWriter::new(stdout());
                while let Ok(command) = receiver.recv() {
                    match command {
                        LogCommand::Record(message) => {
                            if let Err(e) = writer.write_all(message.as_bytes()) {
                                eprintln!("[pulsenet-log] failed to write record: {e}");
                            }
                        }
                        LogCommand::Flush => {
                            let _ = writer.flush();
                        }
                    }
                }
                let _ = writer.flush();
            })
            .expect("failed to spawn pulsenet-log writer thread");

        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

impl Log for PulsenetLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now();
        let message = format!(
            "{} {:<5} [{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        if self.sender.try_send(LogCommand::Record(message)).is_err() {
            eprintln!("[pulsenet-log] dropped record, writer thread saturated");
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
