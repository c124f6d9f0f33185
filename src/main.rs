use captcha_solver::config::{Config, EngineKind, DEFAULT_REMOTE_ENDPOINT};
use captcha_solver::engine::OcrEngine;
use captcha_solver::engines::build_engine;
use captcha_solver::{CaptchaError, FailureKind, LocalRecognizer, Recognizer, UnknownBrokerPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "captcha-solver")]
#[command(about = "Recognize numeric brokerage login captchas")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// OCR engine
    #[arg(long, env = "CAPTCHA_ENGINE", value_enum, default_value = "tesseract", global = true)]
    pub engine: EngineKind,

    /// Path to the tesseract binary
    #[arg(long, env = "CAPTCHA_TESSERACT", default_value = "tesseract", global = true)]
    pub engine_path: PathBuf,

    /// Path to tessdata directory
    #[arg(long, env = "TESSDATA_PREFIX", global = true)]
    pub tessdata_path: Option<String>,

    /// Tesseract language data to load
    #[arg(long, env = "CAPTCHA_LANGUAGE", default_value = "eng", global = true)]
    pub language: String,

    /// Remote recognition service endpoint
    #[arg(long, env = "CAPTCHA_REMOTE_ENDPOINT", default_value = DEFAULT_REMOTE_ENDPOINT, global = true)]
    pub remote_endpoint: String,

    /// Remote request timeout in seconds
    #[arg(long, env = "CAPTCHA_REMOTE_TIMEOUT", default_value = "10", global = true)]
    pub remote_timeout_secs: u64,

    /// Binarization thresholds for the voting ensemble, in vote order
    #[arg(
        long,
        env = "CAPTCHA_THRESHOLDS",
        value_delimiter = ',',
        default_value = "180,200,220",
        global = true
    )]
    pub thresholds: Vec<u8>,

    /// Contrast enhancement factor applied before binarization
    #[arg(long, env = "CAPTCHA_CONTRAST", default_value = "1.5", global = true)]
    pub contrast_factor: f32,

    /// Run ensemble thresholds in parallel
    #[arg(long, env = "CAPTCHA_PARALLEL_VOTING", global = true)]
    pub parallel_voting: bool,

    /// Never prompt a human operator
    #[arg(long, env = "CAPTCHA_NO_MANUAL", global = true)]
    pub no_manual: bool,

    /// Give up waiting for the operator after this many seconds
    #[arg(long, env = "CAPTCHA_MANUAL_TIMEOUT", global = true)]
    pub manual_timeout_secs: Option<u64>,

    /// Command used to display the captcha to the operator
    #[arg(long, env = "CAPTCHA_VIEWER", global = true)]
    pub viewer: Option<String>,

    /// Handling of broker names missing from the broker table
    #[arg(long, env = "CAPTCHA_UNKNOWN_BROKER", value_enum, default_value = "reject", global = true)]
    pub unknown_broker: UnknownBrokerPolicy,

    /// Remote failures that fall back to the voting ensemble
    #[arg(
        long,
        env = "CAPTCHA_REMOTE_FALLBACK_ON",
        value_enum,
        value_delimiter = ',',
        default_value = "network,remote-service,malformed-response,wrong-length",
        global = true
    )]
    pub remote_fallback_on: Vec<FailureKind>,

    /// Ensemble failures that fall back to manual input
    #[arg(
        long,
        env = "CAPTCHA_ENSEMBLE_FALLBACK_ON",
        value_enum,
        value_delimiter = ',',
        default_value = "no-candidate",
        global = true
    )]
    pub ensemble_fallback_on: Vec<FailureKind>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recognize one captcha image and print the digits
    Recognize {
        /// Captcha image file
        image: PathBuf,

        /// Broker identifier (gf, yh_client, gj_client, ht, ...)
        #[arg(long, default_value = "ht")]
        broker: String,
    },
    /// Serve the recognition endpoint over HTTP
    Serve {
        /// Host address to bind to
        #[arg(long, env = "CAPTCHA_HOST", default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(long, env = "CAPTCHA_PORT", default_value = "5000")]
        port: u16,

        /// Maximum upload size in bytes
        #[arg(long, env = "CAPTCHA_MAX_FILE_SIZE", default_value = "1048576")]
        max_file_size: usize,
    },
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        let mut config = Self {
            engine: args.engine,
            engine_path: args.engine_path.clone(),
            tessdata_path: args.tessdata_path.clone(),
            language: args.language.clone(),
            remote_endpoint: args.remote_endpoint.clone(),
            remote_timeout: Duration::from_secs(args.remote_timeout_secs),
            thresholds: args.thresholds.clone(),
            contrast_factor: args.contrast_factor,
            parallel_voting: args.parallel_voting,
            manual_enabled: !args.no_manual,
            manual_timeout: args.manual_timeout_secs.map(Duration::from_secs),
            viewer: args.viewer.clone(),
            unknown_broker: args.unknown_broker,
            remote_fallback_on: args.remote_fallback_on.clone(),
            ensemble_fallback_on: args.ensemble_fallback_on.clone(),
            ..Self::default()
        };

        if let Commands::Serve {
            host,
            port,
            max_file_size,
        } = &args.command
        {
            config.host = host.clone();
            config.port = *port;
            config.max_file_size = *max_file_size;
        }

        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the recognized digits
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from(&args);
    config.validate()?;

    match &args.command {
        Commands::Recognize { image, broker } => {
            let recognizer = Recognizer::from_config(&config)?;
            let answer = recognizer.recognize(image, broker)?;
            println!("{}", answer);
            Ok(())
        }
        Commands::Serve { .. } => {
            tracing::info!("Starting captcha-solver v{}", env!("CARGO_PKG_VERSION"));
            let engine = build_engine(&config)?;

            // Blank image: only checks the engine can be invoked at all
            if let Err(e @ CaptchaError::EngineUnavailable(_)) =
                engine.recognize_digits(&image::DynamicImage::new_luma8(8, 8))
            {
                tracing::warn!("{}; every request will fail until this is fixed", e);
            }

            let recognizer = LocalRecognizer::new(engine, &config);

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(captcha_solver::server::run(config, recognizer))
        }
    }
}
