//! Binary entry point for the loupe server.
//!
//! Speaks the framed JSON-RPC protocol on stdin/stdout; logs go to stderr
//! so they never corrupt the message stream.

use std::io;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, ValueEnum};

use loupe::handlers;
use loupe::server::{self, WriterSink};
use loupe::state::ServerState;

/// Source-code index query server.
#[derive(Parser, Debug)]
#[command(name = "loupe", version, about = "Source-code index query server")]
struct Cli {
    /// Log level for tracing output.
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let sink = Rc::new(WriterSink::new(io::stdout()));
    let mut state = ServerState::new(sink);
    let handler = handlers::message_handler();

    let mut reader = io::stdin().lock();
    let code = server::run(&mut state, &handler, &mut reader);
    ExitCode::from(code.clamp(0, u8::MAX as i32) as u8)
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
