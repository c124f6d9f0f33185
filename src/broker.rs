//! Broker identifier resolution
//!
//! Broker names are resolved once, at the entry point, into the closed set of
//! recognition chains the orchestrator knows how to run.

use crate::error::CaptchaError;

/// Recognition chain selected by a broker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerKind {
    /// Dedicated conditioning chain, then OCR; never calls the remote service
    Gf,
    /// Remote recognition service only (yh_client, gj_client)
    RemoteOnly,
    /// Remote service, then voting ensemble, then manual input
    Default,
}

/// What to do with a broker name missing from the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum UnknownBrokerPolicy {
    /// Fail with `UnknownBroker`
    #[default]
    Reject,
    /// Run the default chain
    TreatAsDefault,
}

const BROKER_TABLE: &[(&str, BrokerKind)] = &[
    ("gf", BrokerKind::Gf),
    ("广发", BrokerKind::Gf),
    ("yh_client", BrokerKind::RemoteOnly),
    ("银河客户端", BrokerKind::RemoteOnly),
    ("gj_client", BrokerKind::RemoteOnly),
    ("国金客户端", BrokerKind::RemoteOnly),
    ("ht", BrokerKind::Default),
    ("ht_client", BrokerKind::Default),
    ("华泰客户端", BrokerKind::Default),
    ("yjb", BrokerKind::Default),
    ("yh", BrokerKind::Default),
    ("default", BrokerKind::Default),
];

impl BrokerKind {
    pub fn resolve(name: &str, policy: UnknownBrokerPolicy) -> Result<Self, CaptchaError> {
        let normalized = name.trim().to_lowercase();
        if let Some((_, kind)) = BROKER_TABLE.iter().find(|(id, _)| *id == normalized) {
            return Ok(*kind);
        }

        match policy {
            UnknownBrokerPolicy::Reject => Err(CaptchaError::UnknownBroker(name.to_string())),
            UnknownBrokerPolicy::TreatAsDefault => {
                tracing::warn!("Unmapped broker {:?}, using default recognition chain", name);
                Ok(BrokerKind::Default)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gf => "gf",
            Self::RemoteOnly => "remote-only",
            Self::Default => "default",
        }
    }
}
