//! Logging bootstrap for the node binary.
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::PanicInfo;

use clap::ValueEnum;
use tracing::error;
use tracing_log::LogTracer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt as subscriber_fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;

#[derive(ValueEnum, Debug, Clone, Copy)]
#[clap(rename_all = "kebab-case")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(val: LogLevel) -> Self {
        match val {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        write!(f, "{name}")
    }
}

fn set_panic_hook() {
    // Record panics as tracing events so they land in the same stream,
    // with the span context they happened in.
    std::panic::set_hook(Box::new(|panic| {
        log_panic(panic);
    }));
}

fn log_panic(panic: &PanicInfo) {
    let backtrace = Backtrace::force_capture();
    let backtrace = format!("{backtrace:?}");
    if let Some(location) = panic.location() {
        error!(
            message = %panic,
            backtrace = %backtrace,
            panic.file = location.file(),
            panic.line = location.line(),
            panic.column = location.column(),
        );
    } else {
        error!(message = %panic, backtrace = %backtrace);
    }
}

pub fn init_logging(level: LevelFilter) {
    set_panic_hook();

    let subscriber = Registry::default().with(
        subscriber_fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(level),
    );

    // Route log-crate records from dependencies into tracing; ignore
    // errors from double initialization.
    let _ = LogTracer::init();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
