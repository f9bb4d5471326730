//! Binary entry point: wires CLI args, logging, an in-memory demo store,
//! and the acceptor run loop together. The non-blocking socket pipeline
//! itself lives in `kvnode-net`; this binary only assembles it.

mod demo_store;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use kvnode_core::RequestHandler;
use kvnode_net::{Acceptor, DEFAULT_BUFFER_CAPACITY};

use demo_store::InMemoryRepository;

/// A single-selector-thread key-value storage node.
#[derive(Parser, Debug)]
#[command(name = "kvnoded", version, about)]
struct Args {
    /// Address to accept connections on.
    #[arg(long, default_value = "127.0.0.1:6666")]
    bind: SocketAddr,

    /// Per-connection input/output buffer capacity, in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    buffer_capacity: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let handler = Arc::new(RequestHandler::new(InMemoryRepository::default()));
    let mut acceptor = match Acceptor::bind_with_capacity(args.bind, handler, args.buffer_capacity) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            tracing::error!(error = %e, addr = %args.bind, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %args.bind, "listening");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            tracing::warn!(error = %e, "failed to install signal handler");
        }
    }

    while !shutdown.load(Ordering::SeqCst) {
        if let Err(e) = acceptor.poll_once(Some(Duration::from_millis(200))) {
            tracing::error!(error = %e, "poll failed");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!("shutting down");
    ExitCode::SUCCESS
}
