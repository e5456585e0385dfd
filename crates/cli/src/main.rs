//! Thin command-line frontend over the [`scp_core`] facade.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use scp_core::Scp;
use scp_transport::{RemoteSpec, SshCommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "oc-scp", version, about = "Copy files over ssh with the classic scp protocol")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Program used to reach the remote shell.
    #[arg(long = "ssh", default_value = "ssh", global = true)]
    ssh_program: String,

    /// Remote port.
    #[arg(short = 'P', long = "port", global = true)]
    port: Option<u16>,

    /// Remote user; overrides the user embedded in the operand.
    #[arg(short = 'l', long = "login", global = true)]
    user: Option<String>,

    /// Remote scp program, e.g. "sudo scp".
    #[arg(long = "scp-path", global = true)]
    scp_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy a local file or directory to the remote host.
    Send {
        /// Recurse into directories.
        #[arg(short = 'r', long)]
        recursive: bool,
        /// Local source path.
        local: PathBuf,
        /// Remote destination as [user@]host:path.
        remote: String,
    },
    /// Copy a remote file or directory to the local machine.
    Recv {
        /// Recurse into directories.
        #[arg(short = 'r', long)]
        recursive: bool,
        /// Remote source as [user@]host:path.
        remote: String,
        /// Local destination path.
        local: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("oc-scp: {error}");
            let mut source = error.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let operand = match &cli.command {
        Command::Send { remote, .. } | Command::Recv { remote, .. } => RemoteSpec::parse(remote)?,
    };

    let mut ssh = SshCommand::new(operand.host());
    ssh.set_program(&cli.ssh_program);
    if let Some(user) = cli.user.as_deref().or(operand.user()) {
        ssh.set_user(user);
    }
    if let Some(port) = cli.port {
        ssh.set_port(port);
    }

    let mut client = Scp::new(ssh);
    if let Some(path) = &cli.scp_path {
        client.set_scp_path(path.clone());
    }

    match &cli.command {
        Command::Send {
            recursive,
            local,
            remote,
        } => {
            if *recursive {
                client.send_dir(local, operand.path(), None)?;
            } else {
                client.send_file(local, operand.path())?;
            }
            info!(local = %local.display(), remote = %remote, "transfer complete");
        }
        Command::Recv {
            recursive,
            remote,
            local,
        } => {
            if *recursive {
                client.recv_dir(operand.path(), local, None)?;
            } else {
                client.recv_file(operand.path(), local)?;
            }
            info!(remote = %remote, local = %local.display(), "transfer complete");
        }
    }
    Ok(())
}
