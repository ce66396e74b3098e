use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::controller::ScanShared;
use super::ScanState;
use crate::decode::{decode_quietly, DecodeEngine};
use crate::payload::Payload;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Everything one scan loop needs. `generation` is the loop's ticket: once the
/// controller moves the shared counter past it, the loop must not touch state.
pub(crate) struct ScanLoopContext {
    pub shared: Arc<Mutex<ScanShared>>,
    pub engine: Arc<dyn DecodeEngine>,
    pub generation: Arc<AtomicU64>,
    pub ticket: u64,
    pub frame_interval: Duration,
    pub auto_reset: Option<Duration>,
    pub miss_log_every: u64,
}

impl ScanLoopContext {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.ticket
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    /// The device had no frame ready.
    NoFrame,
    Miss,
    Found(Payload),
    /// The loop was cancelled or superseded.
    Stale,
}

pub(crate) async fn scan_loop(ctx: ScanLoopContext, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(ctx.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let started = Instant::now();
    let mut frames: u64 = 0;
    let mut misses: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("scan loop {} cancelled after {} frames", ctx.ticket, frames);
                return;
            }
            _ = ticker.tick() => {
                match scan_step(&ctx, &cancel_token).await {
                    StepOutcome::NoFrame => {}
                    StepOutcome::Miss => {
                        frames += 1;
                        misses += 1;
                        if misses % ctx.miss_log_every.max(1) == 0 {
                            log_debug!(
                                "scan loop {}: {} frames without a code ({}ms)",
                                ctx.ticket,
                                misses,
                                started.elapsed().as_millis()
                            );
                        }
                    }
                    StepOutcome::Found(payload) => {
                        frames += 1;
                        log_info!(
                            "scan loop {} recognized {} bytes after {} frames ({}ms)",
                            ctx.ticket,
                            payload.as_str().len(),
                            frames,
                            started.elapsed().as_millis()
                        );
                        break;
                    }
                    StepOutcome::Stale => {
                        log_debug!("scan loop {} superseded, exiting", ctx.ticket);
                        return;
                    }
                }
            }
        }
    }

    if let Some(delay) = ctx.auto_reset {
        tokio::select! {
            _ = cancel_token.cancelled() => {}
            _ = tokio::time::sleep(delay) => auto_reset(&ctx).await,
        }
    }
}

/// One sample-and-decode step. The shared lock is not held while the engine runs,
/// so a stop issued mid-decode takes effect at once and the late result is dropped.
pub(crate) async fn scan_step(ctx: &ScanLoopContext, cancel_token: &CancellationToken) -> StepOutcome {
    let sample = {
        let mut shared = ctx.shared.lock().await;
        if cancel_token.is_cancelled() || !ctx.is_current() || !shared.state.is_scanning() {
            return StepOutcome::Stale;
        }
        shared.sample()
    };

    let Some(sample) = sample else {
        return StepOutcome::NoFrame;
    };
    let Some(payload) = decode_quietly(ctx.engine.as_ref(), sample) else {
        return StepOutcome::Miss;
    };

    let mut shared = ctx.shared.lock().await;
    if cancel_token.is_cancelled() || !ctx.is_current() || !shared.state.is_scanning() {
        log_info!("discarding a recognition that finished after the scan was stopped");
        return StepOutcome::Stale;
    }
    shared.release_session();
    shared.transition(ScanState::Found(payload.clone()));
    StepOutcome::Found(payload)
}

async fn auto_reset(ctx: &ScanLoopContext) {
    let mut shared = ctx.shared.lock().await;
    if ctx.is_current() && matches!(shared.state, ScanState::Found(_)) {
        shared.transition(ScanState::Idle);
    }
}
