//! Optional decoder check of recovered pictures.
//!
//! A recovered picture that an independent decoder accepts is stronger
//! evidence than one that merely parses. The verdict only moves the
//! frame's confidence; it never adds or removes frames.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tamperscope_forensics::{noisy_or, RecoveryReport};
use tamperscope_probe::Codec;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::VerifyConfig;
use crate::extract::FrameStream;
use crate::tools::find_ffmpeg;

/// Weight a successful decode adds to a frame's confidence.
const VERIFIED_WEIGHT: f64 = 0.5;

/// Verdict of a decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Verified,
    /// The decoder rejected the data.
    Failed(String),
    /// No decoder to ask.
    Unavailable,
    TimedOut,
}

impl VerifyOutcome {
    /// Frame confidence after this verdict.
    pub fn adjust(&self, confidence: f64) -> f64 {
        match self {
            Self::Verified => noisy_or([confidence, VERIFIED_WEIGHT]),
            Self::Failed(_) => confidence / 2.0,
            Self::Unavailable | Self::TimedOut => confidence,
        }
    }
}

/// Verdict for one recovered frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameVerification {
    /// Index into the recovery report's frames.
    pub frame: usize,
    pub outcome: VerifyOutcome,
}

/// Something that can try to decode a standalone elementary stream.
#[async_trait]
pub trait FrameVerifier: Send + Sync {
    async fn verify(&self, codec: Codec, data: &[u8]) -> VerifyOutcome;
}

/// Decodes with `ffmpeg -f <format> -i <file> -frames:v 1 -f null -`.
#[derive(Debug, Clone)]
pub struct FfmpegVerifier {
    program: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegVerifier {
    pub fn new(program: Option<PathBuf>, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    pub fn from_config(config: &VerifyConfig) -> Self {
        Self::new(
            find_ffmpeg(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn is_available(&self) -> bool {
        self.program.is_some()
    }
}

#[async_trait]
impl FrameVerifier for FfmpegVerifier {
    async fn verify(&self, codec: Codec, data: &[u8]) -> VerifyOutcome {
        let Some(program) = &self.program else {
            return VerifyOutcome::Unavailable;
        };

        let workspace = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => return VerifyOutcome::Failed(format!("failed to create workspace: {e}")),
        };
        let input = workspace.path().join(format!("frame.{}", codec.extension()));
        if let Err(e) = tokio::fs::write(&input, data).await {
            return VerifyOutcome::Failed(format!("failed to write frame: {e}"));
        }

        let mut cmd = Command::new(program);
        cmd.args(["-v", "error", "-f", codec.ffmpeg_format(), "-i"])
            .arg(&input)
            .args(["-frames:v", "1", "-f", "null", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {:?}: {}", program, e);
                return VerifyOutcome::Unavailable;
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if output.status.success() && stderr.is_empty() {
                    VerifyOutcome::Verified
                } else if stderr.is_empty() {
                    VerifyOutcome::Failed(format!("exit status {}", output.status))
                } else {
                    VerifyOutcome::Failed(stderr)
                }
            }
            Ok(Err(e)) => VerifyOutcome::Failed(format!("failed to wait for decoder: {e}")),
            // Dropping the future drops the child, which kills it.
            Err(_) => VerifyOutcome::TimedOut,
        }
    }
}

/// Run the verifier over every stream, at most `concurrency` at a time.
///
/// Results come back in stream order.
pub async fn verify_streams(
    verifier: Arc<dyn FrameVerifier>,
    streams: Vec<FrameStream>,
    concurrency: usize,
) -> Vec<FrameVerification> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (slot, stream) in streams.into_iter().enumerate() {
        let verifier = Arc::clone(&verifier);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => verifier.verify(stream.codec, &stream.data).await,
                Err(_) => VerifyOutcome::Unavailable,
            };
            debug!(frame = stream.frame, ?outcome, "verified recovered frame");
            (
                slot,
                FrameVerification {
                    frame: stream.frame,
                    outcome,
                },
            )
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("Verification task failed: {}", e),
        }
    }
    results.sort_by_key(|(slot, _)| *slot);
    results.into_iter().map(|(_, v)| v).collect()
}

/// Fold verdicts into the frames' confidence.
pub fn apply_verification(recovery: &mut RecoveryReport, verdicts: &[FrameVerification]) {
    for verdict in verdicts {
        if let Some(frame) = recovery.frames.get_mut(verdict.frame) {
            frame.confidence = verdict.outcome.adjust(frame.confidence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tamperscope_forensics::FrameStatus;

    struct FixedVerifier(VerifyOutcome);

    #[async_trait]
    impl FrameVerifier for FixedVerifier {
        async fn verify(&self, _codec: Codec, data: &[u8]) -> VerifyOutcome {
            if data.is_empty() {
                VerifyOutcome::Failed("empty".to_string())
            } else {
                self.0.clone()
            }
        }
    }

    fn stream(frame: usize, data: Vec<u8>) -> FrameStream {
        FrameStream {
            frame,
            codec: Codec::H264,
            status: FrameStatus::Decodable,
            data,
        }
    }

    #[test]
    fn test_adjust() {
        assert!((VerifyOutcome::Verified.adjust(0.9) - 0.95).abs() < 1e-9);
        assert!((VerifyOutcome::Failed(String::new()).adjust(0.9) - 0.45).abs() < 1e-9);
        assert_eq!(VerifyOutcome::Unavailable.adjust(0.9), 0.9);
        assert_eq!(VerifyOutcome::TimedOut.adjust(0.4), 0.4);
    }

    #[tokio::test]
    async fn test_verify_streams_keeps_order() {
        let verifier: Arc<dyn FrameVerifier> = Arc::new(FixedVerifier(VerifyOutcome::Verified));
        let streams = vec![stream(4, vec![1]), stream(1, Vec::new()), stream(7, vec![2])];

        let results = verify_streams(verifier, streams, 2).await;
        let frames: Vec<usize> = results.iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![4, 1, 7]);
        assert_eq!(results[0].outcome, VerifyOutcome::Verified);
        assert_eq!(results[1].outcome, VerifyOutcome::Failed("empty".to_string()));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_unavailable() {
        let verifier = FfmpegVerifier::new(None, Duration::from_secs(1));
        assert!(!verifier.is_available());
        assert_eq!(
            verifier.verify(Codec::Hevc, &[0, 0, 0, 1]).await,
            VerifyOutcome::Unavailable
        );
    }

    #[test]
    fn test_apply_verification_ignores_unknown_frames() {
        let mut recovery = RecoveryReport::default();
        apply_verification(
            &mut recovery,
            &[FrameVerification {
                frame: 3,
                outcome: VerifyOutcome::Verified,
            }],
        );
        assert!(recovery.frames.is_empty());
    }
}
