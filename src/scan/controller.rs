use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{scan_loop, ScanLoopContext};
use super::ScanState;
use crate::capture::{CameraBackend, CameraConstraints, CameraError, CaptureSession};
use crate::decode::{DecodeEngine, FrameSample};
use crate::settings::ScanSettings;
use crate::utils::env_flag;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Sampling cadence; roughly one display refresh.
    pub frame_interval: Duration,
    pub constraints: CameraConstraints,
    /// Return from `Found` to `Idle` on its own after this delay.
    pub auto_reset: Option<Duration>,
    /// Emit a miss summary every N unrecognized frames.
    pub miss_log_every: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_settings(&ScanSettings::default())
    }
}

impl ScanConfig {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        let debug_mode = env_flag("QRKIT_DEBUG");

        Self {
            frame_interval: Duration::from_millis(settings.frame_interval_ms.max(1)),
            constraints: settings.constraints(),
            auto_reset: settings.auto_reset_ms.map(Duration::from_millis),
            miss_log_every: if debug_mode { 1 } else { 60 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Camera streams successfully opened so far.
    pub acquired: u64,
    /// Camera streams released so far.
    pub released: u64,
    pub open: bool,
}

/// State guarded by one lock: the current scan state and the session that
/// owns the camera. Nothing outside the scan module can reach the session.
pub(crate) struct ScanShared {
    pub state: ScanState,
    session: Option<CaptureSession>,
    acquired: u64,
    released: u64,
    events: broadcast::Sender<ScanState>,
}

impl ScanShared {
    fn new(events: broadcast::Sender<ScanState>) -> Self {
        Self {
            state: ScanState::Idle,
            session: None,
            acquired: 0,
            released: 0,
            events,
        }
    }

    /// Applies a state change and announces it. Same-state and illegal moves are ignored.
    pub fn transition(&mut self, next: ScanState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(&next) {
            log_warn!("ignoring scan transition {:?} -> {:?}", self.state, next);
            return false;
        }

        log_info!("scan state {:?} -> {:?}", self.state, next);
        self.state = next.clone();
        // No subscribers is fine.
        let _ = self.events.send(next);
        true
    }

    pub fn sample(&mut self) -> Option<FrameSample> {
        self.session.as_mut()?.sample()
    }

    /// Closes and drops the current session. Returns whether a device was released.
    pub fn release_session(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        let released = session.close();
        self.acquired += session.acquired();
        self.released += session.released();
        released
    }

    fn stats(&self) -> SessionStats {
        let (acquired, released, open) = match &self.session {
            Some(session) => (
                self.acquired + session.acquired(),
                self.released + session.released(),
                session.is_open(),
            ),
            None => (self.acquired, self.released, false),
        };
        SessionStats {
            acquired,
            released,
            open,
        }
    }
}

struct ScanWorker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Drives the camera scan: permission, sampling loop, result, cancellation.
///
/// Cloning is cheap; all clones control the same scan.
#[derive(Clone)]
pub struct ScanController {
    shared: Arc<Mutex<ScanShared>>,
    backend: Arc<dyn CameraBackend>,
    engine: Arc<dyn DecodeEngine>,
    generation: Arc<AtomicU64>,
    // Held for the whole of start/stop/reset so those never interleave.
    worker: Arc<Mutex<Option<ScanWorker>>>,
    events: broadcast::Sender<ScanState>,
    config: ScanConfig,
}

impl ScanController {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        engine: Arc<dyn DecodeEngine>,
        config: ScanConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Self {
            shared: Arc::new(Mutex::new(ScanShared::new(events.clone()))),
            backend,
            engine,
            generation: Arc::new(AtomicU64::new(0)),
            worker: Arc::new(Mutex::new(None)),
            events,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanState> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ScanState {
        self.shared.lock().await.state.clone()
    }

    pub async fn session_stats(&self) -> SessionStats {
        self.shared.lock().await.stats()
    }

    /// Requests the camera and, once granted, starts sampling.
    ///
    /// Any previous session is closed first. Camera failures are reported through
    /// the returned state, never as an error.
    pub async fn start_scan(&self) -> ScanState {
        let mut worker = self.worker.lock().await;
        self.invalidate(&mut worker);

        let mut shared = self.shared.lock().await;
        shared.release_session();
        if shared.state.is_active() || matches!(shared.state, ScanState::Found(_)) {
            shared.transition(ScanState::Idle);
        }
        shared.transition(ScanState::AwaitingPermission);

        let mut session = CaptureSession::new(Arc::clone(&self.backend), self.config.constraints.clone());
        match session.open() {
            Ok(handle) => {
                shared.session = Some(session);
                let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                shared.transition(ScanState::Scanning);
                drop(shared);

                let cancel_token = CancellationToken::new();
                let ctx = ScanLoopContext {
                    shared: Arc::clone(&self.shared),
                    engine: Arc::clone(&self.engine),
                    generation: Arc::clone(&self.generation),
                    ticket,
                    frame_interval: self.config.frame_interval,
                    auto_reset: self.config.auto_reset,
                    miss_log_every: self.config.miss_log_every,
                };
                log_info!("scanning on stream {} (loop {})", handle.id, ticket);
                *worker = Some(ScanWorker {
                    handle: tokio::spawn(scan_loop(ctx, cancel_token.clone())),
                    cancel_token,
                });
                ScanState::Scanning
            }
            Err(err) => {
                let next = match err {
                    CameraError::PermissionDenied => ScanState::PermissionDenied,
                    other => ScanState::Error(other.to_string()),
                };
                shared.transition(next.clone());
                next
            }
        }
    }

    /// Stops sampling, closes the camera and clears the video sink, then goes `Idle`.
    ///
    /// Safe to call in any state and any number of times. A decode that is still
    /// running when this returns will have its result discarded.
    pub async fn stop_scan(&self) -> ScanState {
        let mut worker = self.worker.lock().await;
        self.invalidate(&mut worker);

        let mut shared = self.shared.lock().await;
        if shared.release_session() {
            log_info!("camera released on stop");
        }
        shared.transition(ScanState::Idle);
        shared.state.clone()
    }

    /// Acknowledges a finished attempt (`Found`, `PermissionDenied`, `Error`).
    pub async fn reset(&self) -> ScanState {
        let _worker = self.worker.lock().await;
        let mut shared = self.shared.lock().await;
        if shared.state.is_terminal() {
            shared.release_session();
            shared.transition(ScanState::Idle);
        }
        shared.state.clone()
    }

    /// Stops the scan and waits for the loop task to finish.
    pub async fn shutdown(&self) {
        let mut worker = self.worker.lock().await;
        let running = worker.take();
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(running) = running {
            running.cancel_token.cancel();
            if let Err(err) = running.handle.await {
                log_error!("scan loop ended abnormally: {err}");
            }
        }

        let mut shared = self.shared.lock().await;
        shared.release_session();
        shared.transition(ScanState::Idle);
    }

    /// Stops scheduling: any loop holding an older ticket becomes inert.
    fn invalidate(&self, worker: &mut Option<ScanWorker>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(running) = worker.take() {
            running.cancel_token.cancel();
            // The task exits on its own at its next check; not joined here so a
            // stop issued mid-decode does not wait for the engine.
            drop(running.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FrameScript, ScriptedBackend, ScriptedEngine};
    use crate::payload::Payload;
    use proptest::prelude::*;
    use std::sync::mpsc;

    fn test_config() -> ScanConfig {
        ScanConfig {
            frame_interval: Duration::from_millis(16),
            constraints: CameraConstraints::default(),
            auto_reset: None,
            miss_log_every: 60,
        }
    }

    fn controller(backend: &ScriptedBackend, engine: &ScriptedEngine) -> ScanController {
        ScanController::new(
            Arc::new(backend.clone()),
            Arc::new(engine.clone()),
            test_config(),
        )
    }

    fn drain(events: &mut broadcast::Receiver<ScanState>) -> Vec<ScanState> {
        let mut seen = Vec::new();
        while let Ok(state) = events.try_recv() {
            seen.push(state);
        }
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn recognizes_on_the_fifth_frame_exactly_once() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::recognize_on(5, "https://example.com");
        let scanner = controller(&backend, &engine);
        let mut events = scanner.subscribe();

        assert_eq!(scanner.start_scan().await, ScanState::Scanning);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let found = ScanState::Found(Payload::from("https://example.com"));
        assert_eq!(scanner.state().await, found);
        assert_eq!(engine.calls(), 5);
        assert_eq!(
            drain(&mut events),
            vec![ScanState::AwaitingPermission, ScanState::Scanning, found]
        );

        let stats = scanner.session_stats().await;
        assert_eq!(stats, SessionStats { acquired: 1, released: 1, open: false });
        assert_eq!(backend.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_safe_while_idle() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::never();
        let scanner = controller(&backend, &engine);

        assert_eq!(scanner.stop_scan().await, ScanState::Idle);
        assert_eq!(backend.stops(), 0);

        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scanner.stop_scan().await, ScanState::Idle);
        assert_eq!(scanner.stop_scan().await, ScanState::Idle);
        assert_eq!(backend.stops(), 1);
        assert_eq!(backend.live_streams(), 0);

        let calls = engine.calls();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.calls(), calls, "no frames sampled after stop");
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_closes_the_previous_session() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::never();
        let scanner = controller(&backend, &engine);
        let mut events = scanner.subscribe();

        scanner.start_scan().await;
        scanner.start_scan().await;

        assert_eq!(backend.opens(), 2);
        assert_eq!(backend.live_streams(), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                ScanState::AwaitingPermission,
                ScanState::Scanning,
                ScanState::Idle,
                ScanState::AwaitingPermission,
                ScanState::Scanning,
            ]
        );
        scanner.shutdown().await;
        assert_eq!(backend.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescanning_after_a_result_passes_through_idle() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::recognize_on(1, "hit");
        let scanner = controller(&backend, &engine);
        let mut events = scanner.subscribe();

        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let found = ScanState::Found(Payload::from("hit"));
        assert_eq!(scanner.state().await, found);

        let stats = scanner.session_stats().await;
        assert_eq!(stats.acquired, stats.released);
        assert_eq!(backend.live_streams(), 0);

        assert_eq!(scanner.start_scan().await, ScanState::Scanning);
        assert_eq!(
            drain(&mut events),
            vec![
                ScanState::AwaitingPermission,
                ScanState::Scanning,
                found,
                ScanState::Idle,
                ScanState::AwaitingPermission,
                ScanState::Scanning,
            ]
        );
        assert_eq!(
            scanner.session_stats().await,
            SessionStats { acquired: 2, released: 1, open: true }
        );
        assert_eq!(backend.live_streams(), 1);
        scanner.shutdown().await;
        assert_eq!(backend.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_can_be_retried() {
        let backend = ScriptedBackend::failing(CameraError::PermissionDenied);
        let engine = ScriptedEngine::never();
        let scanner = controller(&backend, &engine);
        let mut events = scanner.subscribe();

        assert_eq!(scanner.start_scan().await, ScanState::PermissionDenied);
        assert_eq!(scanner.start_scan().await, ScanState::PermissionDenied);
        assert_eq!(
            drain(&mut events),
            vec![
                ScanState::AwaitingPermission,
                ScanState::PermissionDenied,
                ScanState::AwaitingPermission,
                ScanState::PermissionDenied,
            ]
        );
        assert_eq!(engine.calls(), 0);
        assert_eq!(scanner.reset().await, ScanState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_camera_surfaces_as_error() {
        for failure in [CameraError::NoDeviceFound, CameraError::UnsupportedEnvironment] {
            let backend = ScriptedBackend::failing(failure.clone());
            let scanner = controller(&backend, &ScriptedEngine::never());
            assert_eq!(scanner.start_scan().await, ScanState::Error(failure.to_string()));
            assert!(!scanner.session_stats().await.open);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn engine_failures_count_as_misses() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::always_failing();
        let scanner = controller(&backend, &engine);

        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scanner.state().await, ScanState::Scanning);
        assert!(engine.calls() > 5);

        let panicky = ScriptedEngine::from_fn(|call| {
            if call < 3 {
                panic!("decoder blew up");
            }
            Ok(Some(Payload::from("after the storm")))
        });
        let scanner = controller(&backend, &panicky);
        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            scanner.state().await,
            ScanState::Found(Payload::from("after the storm"))
        );
        assert_eq!(panicky.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn starved_camera_never_reaches_the_engine() {
        let backend = ScriptedBackend::new(FrameScript::Starved);
        let engine = ScriptedEngine::recognize_on(1, "x");
        let scanner = controller(&backend, &engine);

        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(scanner.state().await, ScanState::Scanning);
        assert_eq!(engine.calls(), 0);
        scanner.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn found_resets_on_its_own_when_configured() {
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let engine = ScriptedEngine::recognize_on(1, "hello");
        let scanner = ScanController::new(
            Arc::new(backend.clone()),
            Arc::new(engine.clone()),
            ScanConfig {
                auto_reset: Some(Duration::from_secs(2)),
                ..test_config()
            },
        );

        scanner.start_scan().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(scanner.state().await, ScanState::Found(_)));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scanner.state().await, ScanState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn result_arriving_after_stop_is_discarded() {
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = std::sync::Mutex::new(entered_tx);
        let release_rx = std::sync::Mutex::new(release_rx);

        let engine = ScriptedEngine::from_fn(move |_| {
            entered_tx.lock().unwrap().send(()).ok();
            release_rx.lock().unwrap().recv().ok();
            Ok(Some(Payload::from("too late")))
        });
        let backend = ScriptedBackend::new(FrameScript::Endless);
        let scanner = controller(&backend, &engine);
        let mut events = scanner.subscribe();

        scanner.start_scan().await;
        entered_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("engine never ran");

        assert_eq!(scanner.stop_scan().await, ScanState::Idle);
        assert_eq!(backend.live_streams(), 0);
        release_tx.send(()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scanner.state().await, ScanState::Idle);
        assert_eq!(engine.calls(), 1);
        assert!(!drain(&mut events)
            .iter()
            .any(|state| matches!(state, ScanState::Found(_))));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Stop,
        Reset,
        Wait(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Stop),
            Just(Op::Reset),
            (1u64..120).prop_map(Op::Wait),
        ]
    }

    proptest! {
        #[test]
        fn camera_is_held_only_while_scanning(ops in prop::collection::vec(op(), 1..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();

            runtime.block_on(async {
                let backend = ScriptedBackend::new(FrameScript::Endless);
                let engine = ScriptedEngine::from_fn(|call| {
                    Ok((call % 7 == 0).then(|| Payload::from("hit")))
                });
                let scanner = controller(&backend, &engine);

                for op in ops {
                    match op {
                        Op::Start => { scanner.start_scan().await; }
                        Op::Stop => { scanner.stop_scan().await; }
                        Op::Reset => { scanner.reset().await; }
                        Op::Wait(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                    }

                    let state = scanner.state().await;
                    let stats = scanner.session_stats().await;
                    prop_assert_eq!(stats.open, state.is_scanning());
                    prop_assert_eq!(stats.acquired - stats.released, stats.open as u64);
                    prop_assert_eq!(backend.live_streams(), stats.open as usize);
                }

                scanner.shutdown().await;
                prop_assert_eq!(backend.live_streams(), 0);
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
