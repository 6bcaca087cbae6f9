//! Interpolation.
//!
//! The server sends discrete samples at its tick rate. The client renders
//! at its own rate and interpolates remote player poses between the two
//! most recent samples, hiding network jitter. The engine never
//! extrapolates past the newest sample, and it holds position once a
//! target goes stale so motion does not visibly "resume" on a reconnect
//! burst.

use std::collections::HashMap;

use sync_shared::math::{Quat, Vec3};
use sync_shared::player::PlayerId;

/// A render-ready pose derived from buffered samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    position: Vec3,
    rotation: Quat,
    timestamp_ms: f64,
}

/// The two most recent samples for one remote player.
#[derive(Debug, Clone, Copy)]
struct Track {
    prev: Option<Sample>,
    next: Sample,
}

/// Per-remote-player smoothing between discrete network samples.
pub struct Interpolator {
    tracks: HashMap<PlayerId, Track>,
    /// Hold at the last sample once it is older than this.
    staleness_ms: f64,
}

impl Interpolator {
    /// `tick_hz` is the expected inbound sample rate; the staleness
    /// threshold is twice the tick interval.
    pub fn new(tick_hz: u32) -> Self {
        Self {
            tracks: HashMap::new(),
            staleness_ms: 2.0 * 1000.0 / f64::from(tick_hz.max(1)),
        }
    }

    /// Records a sample for a player.
    ///
    /// Only the most recent sample by timestamp becomes the interpolation
    /// target: a newer sample shifts the pair, an equal timestamp
    /// overwrites in insertion order (last write wins), and an older one
    /// is dropped.
    pub fn push(&mut self, id: &PlayerId, position: Vec3, rotation: Quat, timestamp_ms: f64) {
        let sample = Sample {
            position,
            rotation,
            timestamp_ms,
        };
        match self.tracks.get_mut(id) {
            None => {
                self.tracks.insert(
                    id.clone(),
                    Track {
                        prev: None,
                        next: sample,
                    },
                );
            }
            Some(track) => {
                if timestamp_ms > track.next.timestamp_ms {
                    track.prev = Some(track.next);
                    track.next = sample;
                } else if timestamp_ms == track.next.timestamp_ms {
                    track.next = sample;
                }
                // Older than the current target: superseded, discard.
            }
        }
    }

    /// Computes the render pose for a player at wall-clock `now_ms`.
    ///
    /// With a single known sample the pose is that sample verbatim; with a
    /// stale target it holds at the newest sample. The interpolation factor
    /// clamps to $[0,1]$, so sampling past the newest timestamp yields that
    /// sample exactly rather than extrapolating.
    pub fn sample(&self, id: &PlayerId, now_ms: f64) -> Option<Pose> {
        let track = self.tracks.get(id)?;
        let next = track.next;

        let prev = match track.prev {
            Some(prev) => prev,
            None => return Some(pose_of(next)),
        };

        if now_ms - next.timestamp_ms > self.staleness_ms {
            return Some(pose_of(next));
        }

        let span = next.timestamp_ms - prev.timestamp_ms;
        let alpha = if span > 0.0 {
            (((now_ms - prev.timestamp_ms) / span).clamp(0.0, 1.0)) as f32
        } else {
            1.0
        };

        Some(Pose {
            position: prev.position.lerp(next.position, alpha),
            rotation: prev.rotation.slerp(next.rotation, alpha),
        })
    }

    pub fn remove(&mut self, id: &PlayerId) {
        self.tracks.remove(id);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn tracked(&self) -> usize {
        self.tracks.len()
    }
}

fn pose_of(sample: Sample) -> Pose {
    Pose {
        position: sample.position,
        rotation: sample.rotation,
    }
}
