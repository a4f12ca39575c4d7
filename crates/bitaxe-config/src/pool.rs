//! Pool/client descriptors, modeled on the teacher's `bosminer-config`
//! client descriptor but extended with the fields both Stratum versions
//! need: port, TLS flag, suggested difficulty, extranonce-subscribe flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which Stratum protocol generation a pool descriptor speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    StratumV1,
    StratumV2,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::StratumV1 => "stratum+tcp",
            Protocol::StratumV2 => "stratum2+tcp",
        }
    }

    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "stratum+tcp" => Some(Protocol::StratumV1),
            "stratum2+tcp" => Some(Protocol::StratumV2),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// A single pool endpoint plus its credentials, used for both the primary
/// and fallback slots (spec §4.6 "Two pools").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tls: bool,
    pub suggested_difficulty: Option<u64>,
    pub extranonce_subscribe: bool,
}

impl PoolDescriptor {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}
