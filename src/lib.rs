//! Numeric captcha recognition for brokerage login flows
//!
//! [`Recognizer::recognize`] is the entry point: given an image path and a
//! broker identifier it returns exactly four digits or a typed error.

pub mod broker;
pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod manual;
pub mod orchestrator;
pub mod preprocessing;
pub mod remote;
pub mod server;
pub mod voting;

pub use broker::{BrokerKind, UnknownBrokerPolicy};
pub use config::Config;
pub use error::{CaptchaError, FailureKind};
pub use orchestrator::{LocalRecognizer, Recognizer};
