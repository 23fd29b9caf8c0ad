//! Single-instance arbitration over the fixed loopback port.
//!
//! Whoever binds the port first is the primary and serves the editor for the
//! whole desktop session. Every later launch finds the port taken, hands its
//! file over to the primary and exits.

pub mod handover;

use std::{
    ffi::OsString,
    io,
    net::TcpListener,
    path::PathBuf,
};

use crate::{
    config::LOOPBACK,
    error::{Result, ShellError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Primary,
    Secondary,
}

#[derive(Debug)]
pub enum Claim {
    /// Owns the listener the HTTP server will run on.
    Primary(TcpListener),
    Secondary,
}

impl Claim {
    pub fn role(&self) -> InstanceRole {
        match self {
            Self::Primary(_) => InstanceRole::Primary,
            Self::Secondary => InstanceRole::Secondary,
        }
    }
}

pub fn claim(port: u16) -> Result<Claim> {
    let addr = format!("{LOOPBACK}:{port}");
    match TcpListener::bind(&addr) {
        Ok(listener) => {
            tracing::info!(%addr, "claimed port, running as primary instance");
            Ok(Claim::Primary(listener))
        }
        Err(error) if error.kind() == io::ErrorKind::AddrInUse => {
            tracing::info!(%addr, "port already held, running as secondary instance");
            Ok(Claim::Secondary)
        }
        Err(source) => Err(ShellError::Bind { addr, source }),
    }
}

/// Command line of one launch: at most one positional file argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchArgs {
    pub file: Option<PathBuf>,
}

impl LaunchArgs {
    pub fn from_env() -> Self {
        Self::parse(std::env::args_os().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = OsString>) -> Self {
        let file = args
            .into_iter()
            .find(|arg| !arg.is_empty())
            .map(PathBuf::from);
        Self { file }
    }
}
