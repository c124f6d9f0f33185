//! Recognition orchestrator
//!
//! Resolves the broker once, then walks its strategy chain:
//!
//! ```text
//! gf          : TRY_BROKER_SPECIFIC
//! remote-only : TRY_REMOTE
//! default     : TRY_REMOTE -> TRY_VOTING_ENSEMBLE -> MANUAL
//! ```
//!
//! A strategy failure moves to the next stage only when its kind is in the
//! configured fallback set for that edge; anything else is returned as is.

use crate::broker::{BrokerKind, UnknownBrokerPolicy};
use crate::config::Config;
use crate::engine::OcrEngine;
use crate::engines::build_engine;
use crate::error::{CaptchaError, FailureKind};
use crate::manual::ManualFallback;
use crate::preprocessing::{load_image, Pipeline};
use crate::remote::{RemoteClient, RemoteRecognizer};
use crate::voting::{is_valid_answer, VotingEnsemble};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TryRemote,
    TryBrokerSpecific,
    TryVotingEnsemble,
    Manual,
}

impl Stage {
    fn strategy(&self) -> &'static str {
        match self {
            Self::TryRemote => "remote service",
            Self::TryBrokerSpecific => "broker-specific conditioning",
            Self::TryVotingEnsemble => "voting ensemble",
            Self::Manual => "manual input",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TryRemote => "TRY_REMOTE",
            Self::TryBrokerSpecific => "TRY_BROKER_SPECIFIC",
            Self::TryVotingEnsemble => "TRY_VOTING_ENSEMBLE",
            Self::Manual => "MANUAL",
        };
        f.write_str(name)
    }
}

/// Strategies that only need the OCR engine
pub struct LocalRecognizer {
    engine: Arc<dyn OcrEngine>,
    ensemble: VotingEnsemble,
}

impl LocalRecognizer {
    pub fn new(engine: Arc<dyn OcrEngine>, config: &Config) -> Self {
        let ensemble = VotingEnsemble::new(engine.clone(), config);
        Self { engine, ensemble }
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    /// gf chain: conditioning tuned for gf captchas, then a single OCR pass
    pub fn recognize_gf(&self, image_path: &Path) -> Result<String, CaptchaError> {
        let image = load_image(image_path)?;
        let conditioned = Pipeline::gf().process(&image)?;
        self.engine.recognize_digits(&conditioned.image)
    }

    pub fn recognize_by_voting(&self, image_path: &Path) -> Result<String, CaptchaError> {
        self.ensemble.recognize_by_voting(image_path)
    }

    /// Broker chain without remote or manual stages
    pub fn recognize_locally(
        &self,
        image_path: &Path,
        kind: BrokerKind,
    ) -> Result<String, CaptchaError> {
        match kind {
            BrokerKind::Gf => checked(Stage::TryBrokerSpecific, self.recognize_gf(image_path)),
            BrokerKind::RemoteOnly | BrokerKind::Default => checked(
                Stage::TryVotingEnsemble,
                self.recognize_by_voting(image_path),
            ),
        }
    }
}

pub struct Recognizer {
    local: LocalRecognizer,
    remote: Box<dyn RemoteRecognizer>,
    manual: Option<ManualFallback>,
    unknown_broker: UnknownBrokerPolicy,
    remote_fallback_on: Vec<FailureKind>,
    ensemble_fallback_on: Vec<FailureKind>,
}

impl Recognizer {
    /// Wire up the configured engine, the HTTP client and console input
    pub fn from_config(config: &Config) -> Result<Self, CaptchaError> {
        config.validate()?;
        let engine = build_engine(config)?;
        let remote = RemoteClient::new(config)?;
        tracing::debug!(
            "Engine {}, remote endpoint {}",
            engine.name(),
            remote.endpoint()
        );
        let manual = config
            .manual_enabled
            .then(|| ManualFallback::console(config));
        Self::new(config, engine, Box::new(remote), manual)
    }

    pub fn new(
        config: &Config,
        engine: Arc<dyn OcrEngine>,
        remote: Box<dyn RemoteRecognizer>,
        manual: Option<ManualFallback>,
    ) -> Result<Self, CaptchaError> {
        config.validate()?;
        Ok(Self {
            local: LocalRecognizer::new(engine, config),
            remote,
            manual,
            unknown_broker: config.unknown_broker,
            remote_fallback_on: config.remote_fallback_on.clone(),
            ensemble_fallback_on: config.ensemble_fallback_on.clone(),
        })
    }

    pub fn local(&self) -> &LocalRecognizer {
        &self.local
    }

    /// Resolve a captcha for `broker`; the answer is always exactly 4 digits
    pub fn recognize(&self, image_path: &Path, broker: &str) -> Result<String, CaptchaError> {
        let kind = BrokerKind::resolve(broker, self.unknown_broker)?;
        tracing::info!(
            "Recognizing {} for broker {} ({} chain)",
            image_path.display(),
            broker,
            kind.as_str()
        );

        match kind {
            BrokerKind::Gf => self.run(Stage::TryBrokerSpecific, image_path),
            BrokerKind::RemoteOnly => self.run(Stage::TryRemote, image_path),
            BrokerKind::Default => {
                if let Some(answer) =
                    self.advance(Stage::TryRemote, image_path, &self.remote_fallback_on)?
                {
                    return Ok(answer);
                }
                if let Some(answer) = self.advance(
                    Stage::TryVotingEnsemble,
                    image_path,
                    &self.ensemble_fallback_on,
                )? {
                    return Ok(answer);
                }
                self.run(Stage::Manual, image_path)
            }
        }
    }

    /// Run a stage; `Ok(None)` means its failure is a fallback edge
    fn advance(
        &self,
        stage: Stage,
        image_path: &Path,
        fallback_on: &[FailureKind],
    ) -> Result<Option<String>, CaptchaError> {
        match self.run(stage, image_path) {
            Ok(answer) => Ok(Some(answer)),
            Err(e) if fallback_on.contains(&e.kind()) => {
                tracing::warn!("{} failed, falling back: {}", stage, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn run(&self, stage: Stage, image_path: &Path) -> Result<String, CaptchaError> {
        tracing::debug!("Entering {}", stage);
        let outcome = match stage {
            Stage::TryRemote => self.remote.recognize_remote(image_path),
            Stage::TryBrokerSpecific => self.local.recognize_gf(image_path),
            Stage::TryVotingEnsemble => self.local.recognize_by_voting(image_path),
            Stage::Manual => match &self.manual {
                Some(manual) => manual.recognize_manually(image_path),
                None => Err(CaptchaError::ManualInputDisabled),
            },
        };

        let result = checked(stage, outcome);
        match &result {
            Ok(answer) => tracing::info!("{} resolved captcha: {}", stage, answer),
            Err(e) => tracing::debug!("{} failed: {}", stage, e),
        }
        result
    }
}

/// No strategy may hand back anything but exactly 4 digits
fn checked(stage: Stage, outcome: Result<String, CaptchaError>) -> Result<String, CaptchaError> {
    let answer = outcome?;
    if is_valid_answer(&answer) {
        Ok(answer)
    } else {
        Err(CaptchaError::WrongLength {
            strategy: stage.strategy(),
            value: answer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manual::Operator;
    use image::{DynamicImage, GrayImage, Luma};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct ScriptedEngine {
        readings: Mutex<VecDeque<Result<&'static str, &'static str>>>,
        log: Log,
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn description(&self) -> &'static str {
            "pops prepared readings"
        }

        fn recognize_text(&self, _image: &DynamicImage) -> Result<String, CaptchaError> {
            self.log.lock().unwrap().push("ocr");
            match self.readings.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text.to_string()),
                Some(Err(_)) => Err(CaptchaError::EngineUnavailable("not installed".into())),
                None => Ok(String::new()),
            }
        }
    }

    struct ScriptedRemote {
        outcome: fn() -> Result<String, CaptchaError>,
        calls: AtomicUsize,
        log: Log,
    }

    impl RemoteRecognizer for ScriptedRemote {
        fn recognize_remote(&self, _image_path: &Path) -> Result<String, CaptchaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push("remote");
            (self.outcome)()
        }
    }

    struct ScriptedOperator {
        answer: &'static str,
        log: Log,
    }

    impl Operator for ScriptedOperator {
        fn show(&self, _image_path: &Path) -> Result<(), CaptchaError> {
            Ok(())
        }

        fn ask(&self, _prompt: &str) -> Result<String, CaptchaError> {
            self.log.lock().unwrap().push("manual");
            Ok(self.answer.to_string())
        }
    }

    struct Harness {
        recognizer: Recognizer,
        log: Log,
        _dir: tempfile::TempDir,
        image_path: std::path::PathBuf,
    }

    fn harness(
        config: Config,
        readings: Vec<Result<&'static str, &'static str>>,
        remote: fn() -> Result<String, CaptchaError>,
        manual_answer: Option<&'static str>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("captcha.png");
        GrayImage::from_fn(40, 16, |x, _| Luma([(x * 6) as u8]))
            .save(&image_path)
            .unwrap();

        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let engine = Arc::new(ScriptedEngine {
            readings: Mutex::new(readings.into()),
            log: log.clone(),
        });
        let remote = Box::new(ScriptedRemote {
            outcome: remote,
            calls: AtomicUsize::new(0),
            log: log.clone(),
        });
        let manual = manual_answer.map(|answer| {
            ManualFallback::new(Box::new(ScriptedOperator {
                answer,
                log: log.clone(),
            }))
        });

        Harness {
            recognizer: Recognizer::new(&config, engine, remote, manual).unwrap(),
            log,
            _dir: dir,
            image_path,
        }
    }

    fn remote_ok() -> Result<String, CaptchaError> {
        Ok("4711".to_string())
    }

    fn remote_down() -> Result<String, CaptchaError> {
        Err(CaptchaError::Network("connection refused".into()))
    }

    fn remote_rejects() -> Result<String, CaptchaError> {
        Err(CaptchaError::RemoteService {
            status: 500,
            message: "busy".into(),
        })
    }

    fn remote_short() -> Result<String, CaptchaError> {
        Ok("471".to_string())
    }

    impl Harness {
        fn recognize(&self, broker: &str) -> Result<String, CaptchaError> {
            self.recognizer.recognize(&self.image_path, broker)
        }

        fn recognize_path(&self, path: &Path, broker: &str) -> Result<String, CaptchaError> {
            self.recognizer.recognize(path, broker)
        }

        fn log(&self) -> Vec<&'static str> {
            self.log.lock().unwrap().clone()
        }
    }

    #[test]
    fn test_gf_never_calls_remote() {
        let h = harness(Config::default(), vec![Ok("0 4 2 7")], remote_ok, None);
        assert_eq!(h.recognize("gf").unwrap(), "0427");
        assert_eq!(h.log(), vec!["ocr"]);
    }

    #[test]
    fn test_gf_engine_unavailable_is_fatal() {
        let h = harness(Config::default(), vec![Err("missing")], remote_ok, Some("1111"));
        let err = h.recognize("gf").unwrap_err();
        assert!(matches!(err, CaptchaError::EngineUnavailable(_)));
        assert_eq!(h.log(), vec!["ocr"]);
    }

    #[test]
    fn test_gf_wrong_length_is_rejected() {
        let h = harness(Config::default(), vec![Ok("042")], remote_ok, None);
        let err = h.recognize("gf").unwrap_err();
        assert!(matches!(err, CaptchaError::WrongLength { .. }));
    }

    #[test]
    fn test_remote_only_brokers_never_vote() {
        for broker in ["yh_client", "gj_client"] {
            let h = harness(Config::default(), vec![Ok("1234")], remote_ok, Some("1111"));
            assert_eq!(h.recognize(broker).unwrap(), "4711");
            assert_eq!(h.log(), vec!["remote"]);
        }
    }

    #[test]
    fn test_remote_only_errors_propagate() {
        let h = harness(Config::default(), vec![Ok("1234")], remote_down, Some("1111"));
        let err = h.recognize("yh_client").unwrap_err();
        assert!(matches!(err, CaptchaError::Network(_)));
        assert_eq!(h.log(), vec!["remote"]);

        let h = harness(Config::default(), vec![Ok("1234")], remote_rejects, None);
        let err = h.recognize("gj_client").unwrap_err();
        assert!(matches!(err, CaptchaError::RemoteService { .. }));
    }

    #[test]
    fn test_default_short_circuits_on_remote_success() {
        let h = harness(Config::default(), vec![], remote_ok, Some("1111"));
        assert_eq!(h.recognize("ht").unwrap(), "4711");
        assert_eq!(h.log(), vec!["remote"]);
    }

    #[test]
    fn test_default_falls_back_to_voting() {
        let h = harness(
            Config::default(),
            vec![Ok("1234"), Ok("1234"), Ok("5678")],
            remote_down,
            Some("1111"),
        );
        assert_eq!(h.recognize("ht").unwrap(), "1234");
        assert_eq!(h.log(), vec!["remote", "ocr", "ocr", "ocr"]);
    }

    #[test]
    fn test_default_falls_back_to_manual_last() {
        let h = harness(
            Config::default(),
            vec![Ok("12"), Ok(""), Ok("123456")],
            remote_rejects,
            Some("2024"),
        );
        assert_eq!(h.recognize("ht").unwrap(), "2024");
        assert_eq!(h.log(), vec!["remote", "ocr", "ocr", "ocr", "manual"]);
    }

    #[test]
    fn test_short_remote_answer_falls_back() {
        let h = harness(
            Config::default(),
            vec![Ok("8888"), Ok("8888"), Ok("8888")],
            remote_short,
            None,
        );
        assert_eq!(h.recognize("ht").unwrap(), "8888");
    }

    #[test]
    fn test_manual_errors_are_fatal() {
        let h = harness(Config::default(), vec![], remote_down, Some("12a4"));
        let err = h.recognize("ht").unwrap_err();
        assert!(matches!(err, CaptchaError::InvalidManualInput(_)));
    }

    #[test]
    fn test_disabled_manual_input() {
        let h = harness(Config::default(), vec![], remote_down, None);
        let err = h.recognize("ht").unwrap_err();
        assert!(matches!(err, CaptchaError::ManualInputDisabled));
    }

    #[test]
    fn test_fallback_edges_are_configurable() {
        let config = Config {
            remote_fallback_on: vec![FailureKind::Network],
            ..Config::default()
        };
        let h = harness(config, vec![Ok("1234")], remote_rejects, Some("1111"));
        let err = h.recognize("ht").unwrap_err();
        assert!(matches!(err, CaptchaError::RemoteService { .. }));
        assert_eq!(h.log(), vec!["remote"]);
    }

    #[test]
    fn test_engine_unavailable_in_ensemble_is_fatal_by_default() {
        let h = harness(Config::default(), vec![Err("missing")], remote_down, Some("1111"));
        let err = h.recognize("ht").unwrap_err();
        assert!(matches!(err, CaptchaError::EngineUnavailable(_)));
        assert_eq!(h.log(), vec!["remote", "ocr"]);
    }

    #[test]
    fn test_engine_unavailable_can_reach_manual() {
        let config = Config {
            ensemble_fallback_on: vec![FailureKind::NoCandidate, FailureKind::EngineUnavailable],
            ..Config::default()
        };
        let h = harness(config, vec![Err("missing")], remote_down, Some("1111"));
        assert_eq!(h.recognize("ht").unwrap(), "1111");
    }

    #[test]
    fn test_unknown_broker_policy() {
        let h = harness(Config::default(), vec![], remote_ok, None);
        assert!(matches!(
            h.recognize("xq"),
            Err(CaptchaError::UnknownBroker(_))
        ));
        assert!(h.log().is_empty());

        let config = Config {
            unknown_broker: UnknownBrokerPolicy::TreatAsDefault,
            ..Config::default()
        };
        let h = harness(config, vec![], remote_ok, None);
        assert_eq!(h.recognize("xq").unwrap(), "4711");
    }

    #[test]
    fn test_local_recognizer_skips_remote_and_manual() {
        let h = harness(Config::default(), vec![Ok("3141"); 3], remote_ok, Some("1111"));
        let answer = h
            .recognizer
            .local()
            .recognize_locally(&h.image_path, BrokerKind::Default)
            .unwrap();
        assert_eq!(answer, "3141");
        assert_eq!(h.log(), vec!["ocr", "ocr", "ocr"]);
    }

    #[test]
    fn test_extensionless_captcha_is_recognized() {
        let h = harness(Config::default(), vec![Ok("2718"); 3], remote_down, None);
        let path = h.image_path.with_extension("");
        std::fs::copy(&h.image_path, &path).unwrap();

        let local = h.recognizer.local();
        assert_eq!(
            local.recognize_locally(&path, BrokerKind::Default).unwrap(),
            "2718"
        );
        assert_eq!(h.recognize_path(&path, "ht").unwrap(), "2718");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::TryVotingEnsemble.to_string(), "TRY_VOTING_ENSEMBLE");
        assert_eq!(Stage::Manual.to_string(), "MANUAL");
    }
}
