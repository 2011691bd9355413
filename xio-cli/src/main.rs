//! Command line driver for the xio socket state machine.
//!
//! Connects to a TCP endpoint, optionally sends a message, and copies
//! everything that arrives to stdout until the linger time runs out or the
//! peer closes the connection.
//!
//! ```bash
//! xio localhost 7 --message "ping"
//! xio --config endpoint.json --linger-ms 2000 -v
//! ```

use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use xio::{
    EndpointConfig, IoStateMachine, OpenResult, SendResult, SocketAdapter, XioState,
    OPTION_TCP_KEEPALIVE,
};

/// Talk to a TCP endpoint through a non-blocking xio state machine
#[derive(Parser, Debug)]
#[command(name = "xio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host to connect to
    #[arg(required_unless_present = "config")]
    host: Option<String>,

    /// Port to connect to
    #[arg(required_unless_present = "config")]
    port: Option<u16>,

    /// JSON endpoint configuration, used instead of HOST and PORT
    #[arg(short, long, conflicts_with_all = ["host", "port"])]
    config: Option<PathBuf>,

    /// Message to send once the connection is open
    #[arg(short, long)]
    message: Option<String>,

    /// Enable TCP keepalive on the socket
    #[arg(long)]
    keepalive: bool,

    /// Give up if the connection is not open after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Keep reading for this many milliseconds after the message is sent
    #[arg(long, default_value_t = 500)]
    linger_ms: u64,

    /// Log state transitions and opening steps
    #[arg(short, long)]
    verbose: bool,
}

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn endpoint(cli: &Cli) -> Result<EndpointConfig> {
    let mut config = match (&cli.config, &cli.host, cli.port) {
        (Some(path), _, _) => EndpointConfig::from_file(path)
            .with_context(|| format!("Failed to load endpoint from '{}'", path.display()))?,
        (None, Some(host), Some(port)) => EndpointConfig::new(host.as_str(), port),
        _ => bail!("either --config or HOST and PORT are required"),
    };
    if cli.keepalive {
        config.options.push(OPTION_TCP_KEEPALIVE, true);
    }
    Ok(config)
}

fn poll_until<F: Fn(&IoStateMachine) -> bool>(
    xio: &mut IoStateMachine,
    deadline: Instant,
    done: F,
) -> bool {
    while !done(xio) {
        if Instant::now() >= deadline {
            return false;
        }
        xio.dowork();
        thread::sleep(POLL_INTERVAL);
    }
    true
}

fn run(cli: &Cli) -> Result<()> {
    let config = endpoint(cli)?;
    let target = format!("{}:{}", config.hostname, config.port);
    let mut xio = IoStateMachine::create::<SocketAdapter>(config)
        .with_context(|| format!("Failed to create socket adapter for {target}"))?;

    let opened = Rc::new(Cell::new(None));
    let io_error = Rc::new(Cell::new(false));
    let (o, e) = (opened.clone(), io_error.clone());
    xio.open(
        move |result| o.set(Some(result)),
        |bytes| {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(bytes).and_then(|_| stdout.flush()) {
                warn!("Failed to write to stdout: {}", e);
            }
        },
        move || e.set(true),
    )?;

    let deadline = Instant::now() + Duration::from_millis(cli.timeout_ms);
    if !poll_until(&mut xio, deadline, |x| x.state() != XioState::Opening) {
        bail!("Timed out connecting to {target}");
    }
    match opened.get() {
        Some(OpenResult::Ok) => debug!("Connected to {}", target),
        other => return Err(anyhow!("Failed to open {target}: {:?}", other)),
    }

    let sent = Rc::new(RefCell::new(None));
    if let Some(ref message) = cli.message {
        let s = sent.clone();
        xio.send(message.as_bytes(), move |result| *s.borrow_mut() = Some(result))
            .context("Failed to queue message")?;
        let sent_check = sent.clone();
        if !poll_until(&mut xio, deadline, move |x| {
            sent_check.borrow().is_some() || x.state() != XioState::Open
        }) {
            bail!("Timed out sending to {target}");
        }
        if *sent.borrow() != Some(SendResult::Ok) {
            bail!("Failed to send to {target}: {:?}", sent.borrow());
        }
    }

    let linger = Instant::now() + Duration::from_millis(cli.linger_ms);
    poll_until(&mut xio, linger, |x| x.state() != XioState::Open);
    if io_error.get() {
        warn!("Connection to {} ended", target);
    }

    let closed = Rc::new(Cell::new(false));
    let c = closed.clone();
    xio.close(move || c.set(true))?;
    let deadline = Instant::now() + Duration::from_millis(cli.timeout_ms);
    if !poll_until(&mut xio, deadline, |x| x.state() == XioState::Closed) {
        bail!("Timed out closing {target}");
    }
    debug!("Closed {} (callback fired: {})", target, closed.get());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_endpoint_from_args() {
        let cli = Cli::parse_from(["xio", "localhost", "7", "--keepalive"]);
        let config = endpoint(&cli).unwrap();
        assert_eq!(
            config,
            EndpointConfig::new("localhost", 7).with_option(OPTION_TCP_KEEPALIVE, true)
        );
    }

    #[test]
    fn test_host_required_without_config() {
        assert!(Cli::try_parse_from(["xio"]).is_err());
    }
}
