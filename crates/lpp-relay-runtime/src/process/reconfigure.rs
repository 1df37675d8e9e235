//! Reconfiguration control loop.
//!
//! Polls launch parameters and cellular identity while the client runs.
//! A parameter change needs a relaunch: the client is interrupted and the
//! loop ends in [`LoopState::RestartPending`]. A cellular change is sent
//! to the running client as a hot-patch command instead.

use std::sync::Arc;
use std::time::Duration;

use lpp_relay_core::{CellularIdentity, DeviceIdentityPort, HotPatchCommand, Parameters};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::supervisor::{ChildControl, ProcessState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Client alive, polling.
    Running,
    /// Parameters changed and the client was interrupted.
    RestartPending,
    /// Client ended without a pending restart.
    Terminated,
}

pub struct ReconfigureLoop {
    child: Arc<dyn ChildControl>,
    identity: Arc<dyn DeviceIdentityPort>,
    poll_interval: Duration,
    params: Parameters,
    cellular: CellularIdentity,
    state: LoopState,
}

impl ReconfigureLoop {
    /// `params` and `cellular` are the snapshots the client was launched with.
    pub fn new(
        child: Arc<dyn ChildControl>,
        identity: Arc<dyn DeviceIdentityPort>,
        poll_interval: Duration,
        params: Parameters,
        cellular: CellularIdentity,
    ) -> Self {
        Self {
            child,
            identity,
            poll_interval,
            params,
            cellular,
            state: LoopState::Running,
        }
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub const fn cellular(&self) -> &CellularIdentity {
        &self.cellular
    }

    /// Wait for the client to be running, then poll until a terminal state.
    ///
    /// Nothing is polled or written before `process` reports
    /// [`ProcessState::Running`].
    pub async fn run(
        mut self,
        mut process: watch::Receiver<ProcessState>,
        cancel_token: CancellationToken,
    ) -> LoopState {
        let ready = tokio::select! {
            () = cancel_token.cancelled() => None,
            state = async {
                // Copy the state out so no watch guard is held across an await.
                process
                    .wait_for(|s| *s != ProcessState::NotStarted)
                    .await
                    .ok()
                    .map(|s| *s)
            } => state,
        };
        match ready {
            Some(ProcessState::Running { pid }) => {
                info!(pid, interval = ?self.poll_interval, "periodically checking for configuration changes");
            }
            other => {
                debug!(state = ?other, "client never became ready, reconfiguration loop not started");
                self.state = LoopState::Terminated;
                return self.state;
            }
        }

        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state == LoopState::Running {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    debug!("reconfiguration loop cancelled");
                    self.state = LoopState::Terminated;
                }
                _exited = async {
                    process
                        .wait_for(|s| matches!(s, ProcessState::Exited { .. }))
                        .await
                        .is_ok()
                } => {
                    info!("correction client terminated");
                    self.state = LoopState::Terminated;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        self.state
    }

    /// Run one poll cycle.
    ///
    /// A failed read skips the rest of the cycle and keeps the last
    /// observed snapshots.
    pub async fn tick(&mut self) -> LoopState {
        if self.state != LoopState::Running {
            return self.state;
        }

        if !self.child.is_running().await {
            info!("correction client terminated");
            self.state = LoopState::Terminated;
            return self.state;
        }

        let params = match self.identity.parameters().await {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "failed reading launch parameters, skipping poll");
                return self.state;
            }
        };
        if params != self.params {
            info!(?params, "launch parameters changed, interrupting client");
            self.child.interrupt().await;
            self.params = params;
            self.state = LoopState::RestartPending;
            return self.state;
        }

        let cellular = match self.identity.cellular().await {
            Ok(cellular) => cellular,
            Err(e) => {
                warn!(error = %e, "failed reading cellular identity, skipping poll");
                return self.state;
            }
        };
        debug!(
            observed = %cellular.summary(),
            current = %self.cellular.summary(),
            "cell check"
        );
        if cellular != self.cellular {
            let command = HotPatchCommand::cell_update(&cellular);
            info!(%command, "cellular identity changed, updating client");
            self.child.write(&command.to_wire()).await;
            self.cellular = cellular;
        }

        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lpp_relay_core::domain::StartingCell;
    use lpp_relay_core::{ConfigError, OutputMode, ProtocolFormat, StoreError};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeChild {
        stopped: AtomicBool,
        interrupts: AtomicUsize,
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl FakeChild {
        fn interrupts(&self) -> usize {
            self.interrupts.load(Ordering::SeqCst)
        }

        fn writes(&self) -> Vec<String> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|w| String::from_utf8(w.clone()).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl ChildControl for FakeChild {
        async fn is_running(&self) -> bool {
            !self.stopped.load(Ordering::SeqCst)
        }

        async fn interrupt(&self) -> bool {
            self.interrupts.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn write(&self, data: &[u8]) {
            self.writes.lock().unwrap().push(data.to_vec());
        }
    }

    struct FakeIdentity {
        params: Mutex<Parameters>,
        cellular: Mutex<CellularIdentity>,
        failing: AtomicBool,
    }

    impl FakeIdentity {
        fn new() -> Self {
            Self {
                params: Mutex::new(params()),
                cellular: Mutex::new(cellular()),
                failing: AtomicBool::new(false),
            }
        }

        fn failure() -> ConfigError {
            ConfigError::store(
                "/config/system/sdk/appdata",
                StoreError::Timeout {
                    path: "/config/system/sdk/appdata".to_string(),
                },
            )
        }
    }

    #[async_trait]
    impl DeviceIdentityPort for FakeIdentity {
        async fn parameters(&self) -> Result<Parameters, ConfigError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            Ok(self.params.lock().unwrap().clone())
        }

        async fn cellular(&self) -> Result<CellularIdentity, ConfigError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Self::failure());
            }
            Ok(self.cellular.lock().unwrap().clone())
        }
    }

    fn params() -> Parameters {
        Parameters {
            host: "129.192.82.125".to_string(),
            port: 5431,
            serial: "/dev/ttyS1".to_string(),
            baud: 115_200,
            output: OutputMode::default(),
            format: ProtocolFormat::Osr,
            starting: StartingCell::default(),
            forwarding: String::new(),
            flags: Vec::new(),
            tokoro_flags: Vec::new(),
            spartn_flags: Vec::new(),
            nmea_store_path: Some("/status/rtk/nmea".to_string()),
            log_nmea: true,
        }
    }

    fn cellular() -> CellularIdentity {
        CellularIdentity {
            mcc: "310".to_string(),
            mnc: "410".to_string(),
            tac: "1".to_string(),
            cell_id: "2".to_string(),
            imsi: "0".to_string(),
            msisdn: None,
            nr: false,
        }
    }

    fn control_loop(child: &Arc<FakeChild>, identity: &Arc<FakeIdentity>) -> ReconfigureLoop {
        ReconfigureLoop::new(
            child.clone(),
            identity.clone(),
            Duration::from_secs(10),
            params(),
            cellular(),
        )
    }

    #[tokio::test]
    async fn test_unchanged_snapshots_do_nothing() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        for _ in 0..5 {
            assert_eq!(control.tick().await, LoopState::Running);
        }
        assert_eq!(child.interrupts(), 0);
        assert!(child.writes().is_empty());
    }

    #[tokio::test]
    async fn test_parameter_change_interrupts_once() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        assert_eq!(control.tick().await, LoopState::Running);
        identity.params.lock().unwrap().port = 5432;

        assert_eq!(control.tick().await, LoopState::RestartPending);
        assert_eq!(control.tick().await, LoopState::RestartPending);
        assert_eq!(child.interrupts(), 1);
        assert!(child.writes().is_empty());
    }

    #[tokio::test]
    async fn test_radio_change_writes_nr_command() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        identity.cellular.lock().unwrap().nr = true;
        assert_eq!(control.tick().await, LoopState::Running);
        assert_eq!(control.tick().await, LoopState::Running);

        assert_eq!(child.writes(), ["/CID,N,310,410,1,2\r\n"]);
        assert_eq!(child.interrupts(), 0);
        assert!(control.cellular().nr);
    }

    #[tokio::test]
    async fn test_cell_change_writes_lte_command() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        identity.cellular.lock().unwrap().cell_id = "77".to_string();
        control.tick().await;

        assert_eq!(child.writes(), ["/CID,L,310,410,1,77\r\n"]);
    }

    #[tokio::test]
    async fn test_config_error_skips_tick() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        identity.failing.store(true, Ordering::SeqCst);
        identity.params.lock().unwrap().port = 1;
        assert_eq!(control.tick().await, LoopState::Running);
        assert_eq!(child.interrupts(), 0);

        identity.failing.store(false, Ordering::SeqCst);
        assert_eq!(control.tick().await, LoopState::RestartPending);
    }

    #[tokio::test]
    async fn test_dead_child_terminates_loop() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let mut control = control_loop(&child, &identity);

        child.stopped.store(true, Ordering::SeqCst);
        identity.params.lock().unwrap().port = 1;
        assert_eq!(control.tick().await, LoopState::Terminated);
        assert_eq!(child.interrupts(), 0);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_run_future_is_send() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let (_state_tx, state_rx) = watch::channel(ProcessState::NotStarted);
        let run = control_loop(&child, &identity).run(state_rx, CancellationToken::new());
        assert_send(&run);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_readiness_before_polling() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        identity.params.lock().unwrap().port = 1;

        let (state_tx, state_rx) = watch::channel(ProcessState::NotStarted);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(control_loop(&child, &identity).run(state_rx, cancel));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(child.interrupts(), 0);

        state_tx.send_replace(ProcessState::Running { pid: 42 });
        assert_eq!(task.await.unwrap(), LoopState::RestartPending);
        assert_eq!(child.interrupts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_ends_loop_without_tick() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let (state_tx, state_rx) = watch::channel(ProcessState::Running { pid: 42 });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(control_loop(&child, &identity).run(state_rx, cancel));

        state_tx.send_replace(ProcessState::Exited { code: 0 });
        assert_eq!(task.await.unwrap(), LoopState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_never_polls() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        identity.cellular.lock().unwrap().nr = true;
        let (_state_tx, state_rx) = watch::channel(ProcessState::Exited {
            code: crate::process::LAUNCH_FAILED,
        });
        let task = tokio::spawn(
            control_loop(&child, &identity).run(state_rx, CancellationToken::new()),
        );

        assert_eq!(task.await.unwrap(), LoopState::Terminated);
        assert!(child.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop() {
        let child = Arc::new(FakeChild::default());
        let identity = Arc::new(FakeIdentity::new());
        let (_state_tx, state_rx) = watch::channel(ProcessState::Running { pid: 42 });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(control_loop(&child, &identity).run(state_rx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), LoopState::Terminated);
        assert_eq!(child.interrupts(), 0);
    }
}
