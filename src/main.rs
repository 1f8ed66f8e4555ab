#![forbid(unsafe_code)]

//! `viasock` — keep slow-starting filter programs resident behind a
//! Unix-domain socket.
//!
//! One binary, three roles: `run` (user entry point; finds or starts the
//! right server, then acts as a client), `server` (the daemon owning the
//! child process), and `client` (stdio pump against an existing socket).

use clap::Parser;
use tracing::error;

use viasock::cli::{self, Cli, Command};
use viasock::server::ServerConfig;
use viasock::{client, logging, runner, server, Result};

fn main() {
    let args = Cli::parse();

    let log_path = match &args.command {
        Command::Run { daemon, .. } | Command::Server { daemon, .. } => daemon.log.clone(),
        Command::Client { .. } => None,
    };

    if let Err(err) = logging::init(log_path.as_deref()) {
        eprintln!("viasock: {err}");
        std::process::exit(1);
    }

    // Two workers: one for the accept loop and session handler, one for the
    // concurrent stdin write of the duplex bridge.
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("viasock: failed to build tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(dispatch(args)) {
        if log_path.is_some() {
            // Detached servers have null stderr; the log file is their
            // only reporting surface.
            error!(%err, "exiting with failure");
        }
        eprintln!("viasock: {err}");
        std::process::exit(1);
    }
}

async fn dispatch(args: Cli) -> Result<()> {
    match args.command {
        Command::Run {
            framing,
            daemon,
            program,
            args,
        } => {
            let options = cli::session_options(&framing, Some(&daemon))?;
            runner::run(&program, &args, &options).await
        }

        Command::Server {
            framing,
            daemon,
            socket,
            hash,
            program,
            args,
        } => {
            let options = cli::session_options(&framing, Some(&daemon))?;
            server::run(ServerConfig {
                socket_path: socket,
                expected_hash: hash,
                program,
                args,
                options,
            })
            .await
        }

        Command::Client { framing, socket } => {
            let options = cli::session_options(&framing, None)?;
            client::run(&socket, &options).await
        }
    }
}
