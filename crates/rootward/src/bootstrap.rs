//! Discovery of the operating system's resolvers.
//!
//! These servers are consulted once per resolver, only to learn the root
//! name server set; the discovered list is kept for subsequent lookups.

use std::io;
use std::net::SocketAddr;

/// Reads the resolvers configured in `/etc/resolv.conf`.
#[cfg(unix)]
pub(crate) fn system_servers(port: u16) -> io::Result<Vec<SocketAddr>> {
    use std::net::IpAddr;

    let raw = std::fs::read("/etc/resolv.conf")?;
    let config = resolv_conf::Config::parse(&raw)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

    let servers: Vec<SocketAddr> = config
        .nameservers
        .iter()
        .map(|ns| {
            let ip = match ns {
                resolv_conf::ScopedIp::V4(ip) => IpAddr::V4(*ip),
                resolv_conf::ScopedIp::V6(ip, _) => IpAddr::V6(*ip),
            };
            SocketAddr::new(ip, port)
        })
        .collect();

    if servers.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no name servers in /etc/resolv.conf",
        ));
    }

    Ok(servers)
}

#[cfg(windows)]
pub(crate) fn system_servers(_port: u16) -> io::Result<Vec<SocketAddr>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "system resolver discovery is not implemented on this platform; \
         configure bootstrap servers explicitly",
    ))
}
