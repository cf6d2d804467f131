// Error handling
use anyhow::{Context, Result};

// Diagnostics go to the log, reports to stdout
use log::error;

// Console output and exit status
use std::io;
use std::process::ExitCode;

// Argument parsing, raw socket and probe loop
use rping::args::{self, Command, PingArgs};
use rping::socket::IcmpSocket;
use rping::{Probe, ProbeSession, stop_channel};

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let args = match args::parse(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            print!("{}", args::USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Ping(args)) => args,
        Err(err) => {
            eprintln!("ping: usage error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: PingArgs) -> Result<()> {
    // Ctrl+C stops the loop at the next tick
    let (handle, stop) = stop_channel();
    ctrlc::set_handler(move || handle.raise()).context("failed to install Ctrl+C handler")?;

    let socket = IcmpSocket::connect(&args.destination, args.config.timeout)?;
    let address = socket.peer();
    let session = ProbeSession::new(args.destination, address, args.config);

    Probe::new(socket, session, stop)
        .run(&mut io::stdout().lock())
        .context("failed to write to stdout")?;
    Ok(())
}
