use ansi_term::Color::{Green, Red};
use anyhow::{Context, Result};
use masscp::{MasscpConfig, Transfer, TransferError, TransferRequest};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::Level;

#[derive(StructOpt)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
    /// Path of JSON configuration file (only 1 format must be specified)
    #[structopt(short, long, conflicts_with("yaml"), required_unless("yaml"))]
    json: Option<PathBuf>,
    /// Path of YAML configuration file (only 1 format must be specified)
    #[structopt(short, long, conflicts_with("json"), required_unless("json"))]
    yaml: Option<PathBuf>,
    /// Target host, as `host` or `host:port` (overrides the configured hosts)
    #[structopt(short = "H", long = "host")]
    hosts: Vec<String>,
    /// Log level (error, warn, info, debug, trace)
    #[structopt(long, default_value = "warn")]
    log_level: Level,
}

#[derive(StructOpt)]
enum Command {
    /// Downloads a file from the configured hosts
    Get {
        /// Path of download's source file on remote machine
        remote_path: String,
        /// Path of download's destination directory on local machine
        local_path: PathBuf,
    },
    /// Uploads a file to the configured hosts
    Put {
        /// Path of upload's source file on local machine
        local_path: PathBuf,
        /// Path of upload's destination file on remote machine (a directory if it ends with '/')
        remote_path: String,
        /// Replaces the remote file if it already exists
        #[structopt(long)]
        overwrite: bool,
    },
}

/// Configuration file formats supported by the `MasscpConfig` struct.
enum Format {
    Json,
    Yaml,
}

fn main() {
    // Build an `Opt` struct from the command line arguments.
    // Print an error message and exit the program on failure.
    let opt = Opt::from_args();

    tracing_subscriber::fmt()
        .with_max_level(opt.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(opt) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            let message = Red.paint(format!("{:#}", error));
            eprintln!("{}", message);
            std::process::exit(1);
        }
    }
}

/// Runs the transfer and prints its report. Returns whether every host succeeded.
fn run(opt: Opt) -> Result<bool> {
    // Extract the configuration file's path and format from the `Opt` struct.
    let (path, format) = if let Some(path) = opt.json {
        (path, Format::Json)
    } else if let Some(path) = opt.yaml {
        (path, Format::Yaml)
    } else {
        unreachable!();
    };

    let string =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
    let config = match format {
        Format::Json => MasscpConfig::from_json(&string),
        Format::Yaml => MasscpConfig::from_yaml(&string),
    }
    .with_context(|| format!("Failed to parse {:?}", path))?;

    let hosts = if opt.hosts.is_empty() {
        config.hosts.clone()
    } else {
        opt.hosts
    };
    let request = match opt.cmd {
        Command::Get {
            remote_path,
            local_path,
        } => TransferRequest::fetch(remote_path, local_path, hosts),
        Command::Put {
            local_path,
            remote_path,
            overwrite,
        } => TransferRequest::send(local_path, remote_path, hosts).overwrite(overwrite),
    };

    let transfer = Transfer::from_config(&config)?;
    let report = transfer.run(&request)?;

    // Print each host's result line in green and each failure in red.
    let mut lines = Vec::new();
    report.results.pretty_print(&mut lines)?;
    for line in String::from_utf8_lossy(&lines).lines() {
        println!("{}", Green.paint(line));
    }
    for (host, error) in &report.failures {
        print_failure(host, error);
    }

    // Print summaries of the number of successes and failures.
    println!();
    print_summary("success", report.results.len());
    print_summary("failure", report.failures.len());

    Ok(report.is_success())
}

/// Prints a summary of the number of successes or failures.
fn print_summary(label: &str, count: usize) {
    let color = if label == "success" { Green } else { Red };
    let noun = if count == 1 { "host" } else { "hosts" };
    let message = format!("{}: {} {}", label, count, noun);
    println!("{}", color.paint(message));
}

/// Prints host's failure message in red.
fn print_failure(host: &str, error: &TransferError) {
    let message = Red.paint(format!("failure: {}", error));
    println!("[{}]: {}", host, message);
}
