use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};

fn listen() -> String {
    "0.0.0.0:4241".into()
}

fn ttl() -> String {
    "3s".into()
}

#[derive(Deserialize, Default)]
pub struct General {
    #[serde(default = "listen")]
    listen: String,

    /// the exposition endpoint caches a snapshot for this long to avoid
    /// forcing an extra tick-sized stall on every scrape
    #[serde(default = "ttl")]
    ttl: String,
}

impl General {
    pub fn check(&self) {
        if let Err(e) = self.ttl.parse::<humantime::Duration>() {
            eprintln!("ttl couldn't be parsed: {e}");
            std::process::exit(1);
        }
        if self.listen().is_err() {
            eprintln!("bad listen address: {}", self.listen);
            std::process::exit(1);
        }
    }

    fn listen(&self) -> Result<SocketAddr, String> {
        self.listen
            .to_socket_addrs()
            .map_err(|e| e.to_string())?
            .next()
            .ok_or_else(|| "could not resolve socket addr".to_string())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen().expect("listen address already validated by check()")
    }

    pub fn ttl(&self) -> std::time::Duration {
        *self.ttl.parse::<humantime::Duration>().unwrap()
    }
}
