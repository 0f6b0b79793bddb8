//! Periodic anti-idle action while a session is active.

use std::{sync::Weak, time::Duration};

use botwarden_core::traits::Generation;
use rand::Rng;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};

use crate::controller::{KeepAliveTick, SessionController};

/// Random look offsets in `[-jitter, jitter]`.
pub(crate) fn look_offsets(jitter: f32) -> (f32, f32) {
    let bound = jitter.abs();
    if !bound.is_normal() {
        return (0.0, 0.0);
    }
    let mut rng = rand::rng();
    (
        rng.random_range(-bound..=bound),
        rng.random_range(-bound..=bound),
    )
}

/// Tick every `period` for one attempt, starting one period from now.
pub(crate) fn spawn(
    controller: Weak<SessionController>,
    generation: Generation,
    period: Duration,
    jitter: f32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(controller) = controller.upgrade() else {
                break;
            };
            let handle = match controller.keep_alive_tick(generation) {
                KeepAliveTick::Act(handle) => handle,
                KeepAliveTick::Skip => continue,
                KeepAliveTick::Done => break,
            };
            drop(controller);

            let (yaw, pitch) = look_offsets(jitter);
            if let Err(e) = handle.perform_keep_alive(yaw, pitch) {
                tracing::debug!(generation, error = %e, "keep-alive action failed");
            }
        }
    })
}
