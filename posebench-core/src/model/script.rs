//! External predictor backend.
//!
//! Spawns a long-lived predictor process (by default `python3 -m pose_predictor`)
//! that owns the network. Requests and responses are single JSON lines on the
//! child's stdin/stdout; the child's stderr is passed through.

use super::{Checkpoint, CheckpointFormat, ModelConfig, PoseModel, RawPoseOutput, validate_outputs};
use crate::config::PredictorConfig;
use crate::data::PoseSample;
use crate::error::PoseError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request<'a> {
    Load {
        checkpoint: &'a Path,
        format: CheckpointFormat,
        model: &'a ModelConfig,
        workers: usize,
    },
    Predict {
        samples: &'a [PoseSample],
    },
    Shutdown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Response {
    Ready,
    Outputs { outputs: Vec<RawPoseOutput> },
    Error { message: String },
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Pose model served by an external predictor process.
pub struct ScriptModel {
    model: ModelConfig,
    predictor: PredictorConfig,
    workers: usize,
    session: Option<Session>,
}

impl ScriptModel {
    pub fn new(model: ModelConfig, predictor: PredictorConfig, workers: usize) -> Self {
        Self {
            model,
            predictor,
            workers,
            session: None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.predictor.timeout_secs)
    }

    fn spawn(&self) -> Result<Session, PoseError> {
        let mut cmd = Command::new(&self.predictor.program);
        cmd.args(&self.predictor.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.predictor.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            PoseError::predictor(format!(
                "Failed to spawn predictor '{}': {e}",
                self.predictor.program
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoseError::predictor("predictor stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoseError::predictor("predictor stdout unavailable"))?;

        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn exchange(&mut self, request: &Request<'_>) -> Result<Response, PoseError> {
        let timeout = self.timeout();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| PoseError::predictor("predictor not started; call load() first"))?;

        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');

        let result: Result<Result<Response, PoseError>, _> = tokio::time::timeout(timeout, async {
            session.stdin.write_all(&line).await?;
            session.stdin.flush().await?;
            loop {
                let Some(reply) = session.stdout.next_line().await? else {
                    return Err(PoseError::predictor(
                        "predictor closed its output before replying",
                    ));
                };
                if reply.trim().is_empty() {
                    continue;
                }
                return serde_json::from_str::<Response>(reply.trim()).map_err(|e| {
                    PoseError::predictor(format!("Invalid predictor reply: {e}"))
                });
            }
        })
        .await;

        match result {
            Ok(Ok(Response::Error { message })) => Err(PoseError::Predictor(message)),
            Ok(inner) => inner,
            Err(_) => Err(PoseError::Timeout(format!(
                "predictor did not reply within {}s",
                timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl PoseModel for ScriptModel {
    fn name(&self) -> &str {
        "script"
    }

    async fn load(&mut self, checkpoint: &Checkpoint) -> Result<(), PoseError> {
        if self.session.is_none() {
            debug!(program = %self.predictor.program, args = ?self.predictor.args, "Spawning predictor");
            self.session = Some(self.spawn()?);
        }

        let model = self.model.clone();
        let request = Request::Load {
            checkpoint: &checkpoint.path,
            format: checkpoint.format,
            model: &model,
            workers: self.workers,
        };
        match self.exchange(&request).await? {
            Response::Ready => {
                info!(checkpoint = %checkpoint.path.display(), "Predictor loaded checkpoint");
                Ok(())
            }
            other => Err(PoseError::predictor(format!(
                "unexpected reply to load: {other:?}"
            ))),
        }
    }

    async fn predict(&mut self, samples: &[PoseSample]) -> Result<Vec<RawPoseOutput>, PoseError> {
        match self.exchange(&Request::Predict { samples }).await? {
            Response::Outputs { outputs } => {
                validate_outputs(&self.model, samples.len(), &outputs)?;
                Ok(outputs)
            }
            other => Err(PoseError::predictor(format!(
                "unexpected reply to predict: {other:?}"
            ))),
        }
    }

    async fn shutdown(&mut self) -> Result<(), PoseError> {
        let timeout = self.timeout();
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let mut line = serde_json::to_vec(&Request::Shutdown)?;
        line.push(b'\n');
        if let Err(e) = session.stdin.write_all(&line).await {
            debug!(error = %e, "Predictor stdin already closed");
        }
        drop(session.stdin);

        match tokio::time::timeout(timeout, session.child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => {
                warn!(%status, "Predictor exited with failure status");
                Ok(())
            }
            Ok(Err(e)) => Err(PoseError::Io(e)),
            Err(_) => {
                warn!("Predictor did not exit in time, killing it");
                session.child.kill().await?;
                Ok(())
            }
        }
    }
}
