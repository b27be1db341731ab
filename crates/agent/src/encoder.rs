use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::PipelineError;

/// A launchable encoder candidate: a human-readable name plus the
/// command used to invoke it.
#[derive(Debug, Clone)]
pub struct EncoderCandidate {
    pub name: &'static str,
    pub program: &'static str,
    pub args: Vec<String>,
}

/// How long a freshly spawned encoder is given to prove it's alive
/// before its stdout is trusted as the bitstream source.
const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Builds the ordered candidate list for the requested dimensions and
/// framerate: a platform hardware encoder first, a software encoder
/// second. When `forced` names one of these candidates it is tried
/// alone.
pub fn candidates(
    width: u16,
    height: u16,
    framerate: u32,
    forced: Option<&str>,
) -> Vec<EncoderCandidate> {
    let size = format!("{width}x{height}");
    let fps = framerate.to_string();

    let all = vec![
        EncoderCandidate {
            name: "nvenc",
            program: "ffmpeg",
            args: vec![
                "-f".into(),
                "x11grab".into(),
                "-video_size".into(),
                size.clone(),
                "-framerate".into(),
                fps.clone(),
                "-i".into(),
                ":0".into(),
                "-c:v".into(),
                "h264_nvenc".into(),
                "-preset".into(),
                "llhq".into(),
                "-zerolatency".into(),
                "1".into(),
                "-f".into(),
                "h264".into(),
                "-".into(),
            ],
        },
        EncoderCandidate {
            name: "x264",
            program: "ffmpeg",
            args: vec![
                "-f".into(),
                "x11grab".into(),
                "-video_size".into(),
                size,
                "-framerate".into(),
                fps,
                "-i".into(),
                ":0".into(),
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "ultrafast".into(),
                "-tune".into(),
                "zerolatency".into(),
                "-f".into(),
                "h264".into(),
                "-".into(),
            ],
        },
    ];

    match forced {
        Some(name) => all.into_iter().filter(|c| c.name == name).collect(),
        None => all,
    }
}

/// Supervises the external encoder process: launches candidates in
/// order, keeping the first one that survives the settle delay.
pub struct Supervisor {
    child: Option<Child>,
}

impl Supervisor {
    /// Tries each candidate in order, returning the live child's
    /// standard output along with the name of the candidate that
    /// succeeded. Returns `None` if every candidate fails to spawn or
    /// exits within the settle delay.
    pub fn launch(
        candidates: &[EncoderCandidate],
    ) -> Option<(Supervisor, std::process::ChildStdout, &'static str)> {
        for candidate in candidates {
            tracing::info!(encoder = candidate.name, "attempting to launch encoder");
            let mut cmd = Command::new(candidate.program);
            cmd.args(&candidate.args)
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .stdin(Stdio::null());

            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(source) => {
                    let err = PipelineError::EncoderLaunchFailed {
                        candidate: candidate.name,
                        source,
                    };
                    tracing::warn!(error = %err, "trying next candidate");
                    continue;
                }
            };

            std::thread::sleep(SETTLE_DELAY);

            match child.try_wait() {
                Ok(Some(status)) => {
                    let err = PipelineError::EncoderEarlyExit {
                        candidate: candidate.name,
                    };
                    tracing::warn!(error = %err, %status, "trying next candidate");
                    continue;
                }
                Ok(None) => {
                    let stdout = child.stdout.take().expect("piped stdout");
                    tracing::info!(encoder = candidate.name, "encoder is live");
                    return Some((
                        Supervisor {
                            child: Some(child),
                        },
                        stdout,
                        candidate.name,
                    ));
                }
                Err(e) => {
                    tracing::warn!(encoder = candidate.name, error = %e, "failed to poll encoder status");
                    continue;
                }
            }
        }
        None
    }

    /// Requests the encoder to stop. No restart is attempted; a new
    /// `Supervisor` must be created for a new session.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reads from the encoder's stdout in fixed-size chunks, handing each
/// chunk to `on_chunk`. Runs on the dedicated blocking thread; returns
/// when the pipe reaches EOF (the encoder process exited).
pub fn read_loop(mut stdout: impl Read, mut on_chunk: impl FnMut(&[u8])) {
    let mut buf = [0u8; 64 * 1024];
    loop {
        match stdout.read(&mut buf) {
            Ok(0) => {
                tracing::info!("encoder stdout reached EOF");
                break;
            }
            Ok(n) => on_chunk(&buf[..n]),
            Err(e) => {
                tracing::warn!(error = %e, "error reading encoder stdout");
                break;
            }
        }
    }
}
