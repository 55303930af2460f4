use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const HUB_PORT: &str = "SERVICEWATCH_PORT";

const DEFAULT_PORT: u16 = 8080;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HUB_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const HUB_ADDR: &str = "SERVICEWATCH_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(HUB_ADDR);
    addr_from_env.map_or(IpAddr::V4(DEFAULT_ADDR), |res| {
        res.parse().unwrap_or(IpAddr::V4(DEFAULT_ADDR))
    })
}

/// Bind address from the config, falling back to the environment
pub fn bind_addr(configured: Option<SocketAddr>) -> SocketAddr {
    configured.unwrap_or_else(|| SocketAddr::new(get_addr(), get_port()))
}
