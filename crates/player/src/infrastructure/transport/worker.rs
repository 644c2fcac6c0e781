//! Worker adapter: a child process speaking line-delimited JSON envelopes.
//!
//! The worker announces itself with a `ready` event, then answers requests on
//! stdout in any order, correlated by id. Any other event it writes is
//! forwarded to subscribers.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};

use reelnexus_domain::TransportError;
use reelnexus_engine::worker_host::READY_EVENT;
use reelnexus_shared::{RequestEnvelope, WorkerInbound};

use super::core::{
    Channel, ChannelAdapter, ChannelSession, EstablishError, Inbound, HANDSHAKE_TIMEOUT,
};
use crate::config::TransportKind;

type WorkerReader = Box<dyn AsyncRead + Send + Unpin>;
type WorkerWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both ends of a freshly started worker.
pub struct WorkerIo {
    pub reader: WorkerReader,
    pub writer: WorkerWriter,
    /// Kept alive for the session; dropping it kills the process.
    pub child: Option<Child>,
}

/// Starts one worker instance per session.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
    async fn launch(&self) -> Result<WorkerIo, TransportError>;
}

/// Launches the worker as an OS process with piped stdio.
pub struct ProcessLauncher {
    path: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            path: path.into(),
            args,
        }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<WorkerIo, TransportError> {
        let mut child = Command::new(&self.path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::connection(format!(
                    "failed to start worker {}: {e}",
                    self.path.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::connection("worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connection("worker stdout unavailable"))?;

        tracing::debug!(path = %self.path.display(), pid = ?child.id(), "Worker started");
        Ok(WorkerIo {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

pub type WorkerAdapter = ChannelAdapter<WorkerChannel>;

impl ChannelAdapter<WorkerChannel> {
    pub fn with_launcher(launcher: Arc<dyn WorkerLauncher>) -> Self {
        ChannelAdapter::new(TransportKind::WebWorker, WorkerChannel { launcher })
    }

    pub fn for_process(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self::with_launcher(Arc::new(ProcessLauncher::new(path, args)))
    }
}

pub struct WorkerChannel {
    launcher: Arc<dyn WorkerLauncher>,
}

#[async_trait]
impl Channel for WorkerChannel {
    type Session = WorkerSession;

    async fn establish(&self) -> Result<WorkerSession, EstablishError> {
        let io = self.launcher.launch().await?;
        let mut session = WorkerSession {
            lines: BufReader::new(io.reader).lines(),
            writer: io.writer,
            _child: io.child,
        };

        tokio::time::timeout(HANDSHAKE_TIMEOUT, session.await_ready())
            .await
            .map_err(|_| {
                TransportError::connection(format!(
                    "worker not ready within {}ms",
                    HANDSHAKE_TIMEOUT.as_millis()
                ))
            })??;
        Ok(session)
    }
}

pub struct WorkerSession {
    lines: Lines<BufReader<WorkerReader>>,
    writer: WorkerWriter,
    _child: Option<Child>,
}

impl WorkerSession {
    async fn await_ready(&mut self) -> Result<(), TransportError> {
        loop {
            match self.next_message().await {
                Some(WorkerInbound::Event { event }) if event.name == READY_EVENT => {
                    tracing::info!(data = %event.data, "Worker ready");
                    return Ok(());
                }
                Some(other) => tracing::debug!(?other, "Ignoring worker output before ready"),
                None => return Err(TransportError::connection("worker exited before ready")),
            }
        }
    }

    async fn next_message(&mut self) -> Option<WorkerInbound> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<WorkerInbound>(&line) {
                    Ok(message) => return Some(message),
                    Err(e) => tracing::warn!(error = %e, "Unparseable worker output"),
                },
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "Worker read failed");
                    return None;
                }
            }
        }
    }
}

#[async_trait]
impl ChannelSession for WorkerSession {
    async fn send(&mut self, envelope: RequestEnvelope) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_vec(&envelope).map_err(|e| TransportError::protocol(e.to_string()))?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| TransportError::connection(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::connection(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Inbound> {
        loop {
            match self.next_message().await? {
                WorkerInbound::Reply(reply) => return Some(Inbound::Reply(reply)),
                WorkerInbound::Event { event } if event.name == READY_EVENT => {}
                WorkerInbound::Event { event } => return Some(Inbound::Push(event)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{duplex, DuplexStream};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use reelnexus_domain::{PlayerId, SessionId, SpinId};
    use reelnexus_engine::{GameAuthority, SlotEngine};
    use reelnexus_shared::{SpinContext, SpinRequest};

    use crate::infrastructure::messaging::ConnectionState;
    use crate::infrastructure::transport::TransportAdapter;

    const READY_LINE: &[u8] = b"{\"event\":{\"name\":\"ready\",\"data\":{}}}\n";

    enum Script {
        /// Announce ready and hand the host end to the test
        Ready,
        /// Announce ready, then exit
        ReadyThenExit,
        /// Announce ready, stay up for a while, then exit
        ReadyThenExitAfter(Duration),
        /// Run the slot engine worker host on the other end
        Engine(Arc<dyn GameAuthority>),
    }

    struct ScriptedLauncher {
        scripts: Mutex<VecDeque<Script>>,
        launches: Mutex<Vec<Instant>>,
        hosts: mpsc::UnboundedSender<DuplexStream>,
    }

    impl ScriptedLauncher {
        fn new(scripts: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
            let (hosts, rx) = mpsc::unbounded_channel();
            let launcher = Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                launches: Mutex::new(Vec::new()),
                hosts,
            });
            (launcher, rx)
        }

        fn launch_times(&self) -> Vec<Instant> {
            self.launches.lock().clone()
        }
    }

    #[async_trait]
    impl WorkerLauncher for ScriptedLauncher {
        async fn launch(&self) -> Result<WorkerIo, TransportError> {
            self.launches.lock().push(Instant::now());
            let script = self.scripts.lock().pop_front();
            let Some(script) = script else {
                return Err(TransportError::connection("spawn failed"));
            };

            let (client, mut host) = duplex(16 * 1024);
            match script {
                Script::Ready => {
                    host.write_all(READY_LINE).await.unwrap();
                    let _ = self.hosts.send(host);
                }
                Script::ReadyThenExit => {
                    host.write_all(READY_LINE).await.unwrap();
                    drop(host);
                }
                Script::ReadyThenExitAfter(uptime) => {
                    host.write_all(READY_LINE).await.unwrap();
                    tokio::spawn(async move {
                        tokio::time::sleep(uptime).await;
                        drop(host);
                    });
                }
                Script::Engine(authority) => {
                    let (read, write) = tokio::io::split(host);
                    tokio::spawn(reelnexus_engine::serve(authority, read, write));
                }
            }

            let (reader, writer) = tokio::io::split(client);
            Ok(WorkerIo {
                reader: Box::new(reader),
                writer: Box::new(writer),
                child: None,
            })
        }
    }

    fn spin_request(bet_level: u64, lines: u32) -> SpinRequest {
        SpinRequest {
            bet_amount: bet_level * u64::from(lines),
            context: SpinContext {
                player_id: PlayerId::new("p1"),
                session_id: SessionId::new(),
                spin_id: SpinId::new(),
                bet_level,
                lines,
                free_spin: false,
            },
        }
    }

    #[tokio::test]
    async fn spins_against_engine_worker_host() {
        let engine: Arc<dyn GameAuthority> = Arc::new(SlotEngine::seeded(1_000, 11));
        let (launcher, _hosts) = ScriptedLauncher::new(vec![Script::Engine(engine)]);
        let adapter = WorkerAdapter::with_launcher(launcher);

        adapter.connect().await.unwrap();
        let request = spin_request(2, 10);
        let spin_id = request.context.spin_id;
        let response = adapter.request_spin(request).await;

        let result = response.into_result().unwrap();
        assert_eq!(result.spin_id, spin_id);
        assert_eq!(result.balance, Some(1_000 - 20 + result.win_amount));

        let balance = adapter.request_balance(&PlayerId::new("p1")).await;
        assert_eq!(Some(balance.balance), result.balance);
        adapter.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_after_thirty_seconds() {
        let (launcher, mut hosts) = ScriptedLauncher::new(vec![Script::Ready]);
        let adapter = WorkerAdapter::with_launcher(launcher);
        adapter.connect().await.unwrap();
        // Keep the worker alive but silent.
        let _host = hosts.recv().await.unwrap();

        let started = Instant::now();
        let response = adapter.request_spin(spin_request(1, 10)).await;

        assert!(!response.success);
        assert!(response.error.unwrap().contains("timed out"));
        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(adapter.pending_requests(), 0);
        assert_eq!(adapter.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_exponential_backoff_then_fails() {
        let (launcher, _hosts) = ScriptedLauncher::new(vec![Script::ReadyThenExit]);
        let adapter = WorkerAdapter::with_launcher(launcher.clone());
        let mut states = adapter.watch_state();

        adapter.connect().await.unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();

        let launches = launcher.launch_times();
        assert_eq!(launches.len(), 6, "one initial launch plus five retries");
        let gaps: Vec<u128> = launches
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![1_000, 2_000, 4_000, 8_000, 16_000]);

        // Failed is terminal until connect() is called again.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(launcher.launch_times().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn long_lived_sessions_restart_the_retry_budget() {
        let uptime = Duration::from_secs(90);
        let scripts = (0..8).map(|_| Script::ReadyThenExitAfter(uptime)).collect();
        let (launcher, _hosts) = ScriptedLauncher::new(scripts);
        let adapter = WorkerAdapter::with_launcher(launcher.clone());
        let mut states = adapter.watch_state();

        adapter.connect().await.unwrap();
        states
            .wait_for(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();

        // Eight stable sessions, each followed by a first-attempt retry. Only
        // the launch failures after the last one escalate.
        let launches = launcher.launch_times();
        assert_eq!(launches.len(), 13);
        let gaps: Vec<u128> = launches
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect();
        let mut expected = vec![91_000; 8];
        expected.extend([2_000, 4_000, 8_000, 16_000]);
        assert_eq!(gaps, expected);
    }

    #[tokio::test]
    async fn disconnect_rejects_outstanding_requests() {
        let (launcher, mut hosts) = ScriptedLauncher::new(vec![Script::Ready]);
        let adapter = Arc::new(WorkerAdapter::with_launcher(launcher));
        adapter.connect().await.unwrap();
        let _host = hosts.recv().await.unwrap();

        let pending = {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.request_balance(&PlayerId::new("p1")).await })
        };
        while adapter.pending_requests() == 0 {
            tokio::task::yield_now().await;
        }

        adapter.disconnect().await;
        assert!(!pending.await.unwrap().success);
        assert_eq!(adapter.pending_requests(), 0);
        assert_eq!(adapter.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn worker_that_never_starts_fails_connect() {
        let (launcher, _hosts) = ScriptedLauncher::new(Vec::new());
        let adapter = WorkerAdapter::with_launcher(launcher);
        assert!(adapter.connect().await.is_err());
        assert_eq!(adapter.state(), ConnectionState::Failed);
    }
}
