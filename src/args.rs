use anyhow::{Context, Result, bail};
use std::time::Duration;

use crate::icmp;
use crate::probe::ProbeConfig;

pub const USAGE: &str = "\
Usage
\t ping [options] <destination>

Options:
\t-h\t\tprint help and exit
\t-w <timeout>\ttime to wait for response
\t-s <size>\tuse <size> as number of data bytes to be sent
\t-c <count>\tstop after <count> packets sent
";

#[derive(Debug, Clone, PartialEq)]
pub struct PingArgs {
    pub destination: String,
    pub config: ProbeConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Ping(PingArgs),
}

/// Parses the arguments following the program name.
pub fn parse<I>(args: I) -> Result<Command>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    if args.is_empty() {
        bail!("destination address required");
    }

    let mut config = ProbeConfig::default();
    let mut destination = None;
    let mut help = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" => help = true,
            "-w" => {
                let ms: u64 = value(&mut iter, "-w")?;
                if ms == 0 {
                    bail!("timeout must be greater than zero");
                }
                config.timeout = Duration::from_millis(ms);
            }
            "-s" => {
                let size: usize = value(&mut iter, "-s")?;
                if size > icmp::MAX_PAYLOAD {
                    bail!("packet size {size} is too large, maximum is {}", icmp::MAX_PAYLOAD);
                }
                config.size = size;
            }
            "-c" => config.count = value(&mut iter, "-c")?,
            // The last positional argument is the destination
            val => destination = Some(val.to_owned()),
        }
    }

    if help {
        return Ok(Command::Help);
    }
    let destination = destination.context("destination address required")?;
    Ok(Command::Ping(PingArgs {
        destination,
        config,
    }))
}

fn value<'a, T>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = iter
        .next()
        .with_context(|| format!("option requires an argument -- {flag}"))?;
    raw.parse()
        .with_context(|| format!("invalid value for {flag}: {raw}"))
}
