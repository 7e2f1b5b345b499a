/*!
Time-bounded LED fades.

Fades live in their own list, behind their own lock, and are advanced by
[`AnimationScheduler::tick`] from the animation thread.
*/

use ptz_shared::{Result, Rgb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::leds::{LedMatrix, BLACK};

/// Handle for a scheduled fade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u64);

#[derive(Debug, Clone)]
struct Fade {
    x: usize,
    y: usize,
    from: Rgb,
    to: Rgb,
    start: Instant,
    duration: Duration,
}

impl Fade {
    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    fn color_at(&self, progress: f32) -> Rgb {
        let mut color = BLACK;
        for (i, channel) in color.iter_mut().enumerate() {
            let from = f32::from(self.from[i]);
            let to = f32::from(self.to[i]);
            *channel = (from + (to - from) * progress) as u8;
        }
        color
    }

    fn is_complete(&self, now: Instant) -> bool {
        now >= self.start + self.duration
    }
}

pub struct AnimationScheduler {
    leds: Arc<LedMatrix>,
    fades: Mutex<Vec<(AnimationId, Fade)>>,
    next_id: AtomicU64,
}

impl AnimationScheduler {
    pub fn new(leds: Arc<LedMatrix>) -> Self {
        Self {
            leds,
            fades: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn fade_to_black(&self, x: usize, y: usize, duration: Duration) -> Result<AnimationId> {
        self.fade_to_color(x, y, BLACK, duration)
    }

    /// Fade a cell from its current colour to `color`. Replaces any fade
    /// already running on that cell.
    pub fn fade_to_color(&self, x: usize, y: usize, color: Rgb, duration: Duration) -> Result<AnimationId> {
        self.fade_from(x, y, color, duration, Instant::now())
    }

    fn fade_from(&self, x: usize, y: usize, to: Rgb, duration: Duration, start: Instant) -> Result<AnimationId> {
        let from = self.leds.get(x, y)?;
        let id = AnimationId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut fades = self.lock();
        fades.retain(|(_, fade)| !(fade.x == x && fade.y == y));
        fades.push((
            id,
            Fade {
                x,
                y,
                from,
                to,
                start,
                duration,
            },
        ));
        debug!("Fade {:?} on ({}, {}) {:?} -> {:?} over {:?}", id, x, y, from, to, duration);
        Ok(id)
    }

    /// Stop a fade where it is; returns whether it was still running
    pub fn cancel(&self, id: AnimationId) -> bool {
        let mut fades = self.lock();
        let before = fades.len();
        fades.retain(|(fade_id, _)| *fade_id != id);
        fades.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every fade to `now`; finished fades write their final colour
    /// and are dropped in the same pass, as is a fade whose cell cannot be
    /// written. Returns how many were dropped.
    pub fn tick(&self, now: Instant) -> usize {
        let mut fades = self.lock();
        let before = fades.len();

        fades.retain(|(_, fade)| {
            let progress = fade.progress(now);
            if let Err(e) = self.leds.update(fade.x, fade.y, fade.color_at(progress)) {
                warn!("Dropping fade on ({}, {}): {}", fade.x, fade.y, e);
                return false;
            }
            !fade.is_complete(now)
        });

        before - fades.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(AnimationId, Fade)>> {
        self.fades.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
