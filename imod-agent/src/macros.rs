/// Logs a single line tagged with a component name.
/// Usage:
/// ```rust
/// use log::Level;
/// imod::imod_log!(Level::Info, "imod", "Found {} controller(s)", 2);
/// imod::imod_log!(Level::Warn, "imod.driver", "Stop request failed");
/// ```
/// The component becomes the record target, which the fern formatter prints
/// between the level and the pid:
/// [2025-04-25T16:32:10+02:00][INFO ][imod][pid=4568][tid=ThreadId(1)] Found 2 controller(s)
#[macro_export]
macro_rules! imod_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        log::log!(target: $component, $level, $fmt $(, $($arg)+)?)
    };
}

#[cfg(test)]
mod tests {
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    /// A tiny in-memory logger that captures up to DEBUG.
    struct MemoryLogger {
        buffer: Mutex<String>,
    }

    impl MemoryLogger {
        const fn new() -> Self {
            MemoryLogger { buffer: Mutex::new(String::new()) }
        }

        fn take(&self) -> String {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }
    }

    static LOGGER: MemoryLogger = MemoryLogger::new();

    impl Log for MemoryLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Debug
        }
        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let mut buf = self.buffer.lock().unwrap();
                buf.push_str(&format!("[{}][{}] {}\n", record.level(), record.target(), record.args()));
            }
        }
        fn flush(&self) {}
    }

    #[test]
    fn imod_log_tags_the_component() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Debug);
        LOGGER.take();

        imod_log!(Level::Debug, "imod.driver", "Mapped {:#X}", 0xF7F0_0000u64);
        imod_log!(Level::Warn, "imod", "plain message");

        let output = LOGGER.take();
        assert!(output.contains("[DEBUG][imod.driver] Mapped 0xF7F00000"), "{}", output);
        assert!(output.contains("[WARN][imod] plain message"), "{}", output);
    }
}
