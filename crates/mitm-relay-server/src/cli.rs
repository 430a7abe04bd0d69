//! Command-line flags.

use clap::Parser;
use mitm_relay_core::ConfigOverrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Man-in-the-middle TCP/TLS relay for inspecting client/server traffic")]
pub struct Args {
    /// Local port to listen on
    #[arg(short = 'p')]
    pub local_port: Option<u16>,

    /// Local address to listen on
    #[arg(short = 'l')]
    pub local_host: Option<String>,

    /// Remote server address host:port
    #[arg(short = 'r')]
    pub remote_host: Option<String>,

    /// Config file; command-line flags override its values
    #[arg(short = 'c')]
    pub config: Option<PathBuf>,

    /// Create a TLS proxy
    #[arg(short = 's')]
    pub tls: bool,

    /// Certificate base path (loads <base>.pem and <base>.key)
    #[arg(long)]
    pub cert: Option<String>,

    /// Host to listen on for status requests
    #[arg(long = "ca")]
    pub control_host: Option<String>,

    /// Port to listen on for status requests
    #[arg(long = "cp")]
    pub control_port: Option<u16>,

    /// Do not serve status requests
    #[arg(long)]
    pub no_control: bool,

    /// Close a session once neither side has sent anything for this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Log relayed traffic
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Do not log relayed traffic; wins over -v
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        let verbose = if self.quiet {
            Some(false)
        } else if self.verbose {
            Some(true)
        } else {
            None
        };

        ConfigOverrides {
            local_host: self.local_host.clone(),
            local_port: self.local_port,
            remote_host: self.remote_host.clone(),
            tls: self.tls.then_some(true),
            cert_file: self.cert.clone(),
            idle_timeout_secs: self.idle_timeout,
            control_host: self.control_host.clone(),
            control_port: self.control_port,
            control_enabled: self.no_control.then_some(false),
            verbose,
        }
    }
}
