//! Taste profile derivation.
//!
//! Each unit-range feature is split at 0.5 into a low and a high bucket and the
//! target is the mean of the larger bucket, so a listener with both very
//! acoustic and very electronic tracks is not handed a 0.5 they rarely play.
//! Ties go to the high bucket. Tempo has no natural cutoff and is a plain mean.

use crate::models::AudioTargets;
use crate::spotify::AudioFeatures;

const BUCKET_SPLIT: f32 = 0.5;

/// Derives recommendation targets from a batch of audio features.
///
/// An empty batch yields all-zero targets.
pub fn derive_targets(samples: &[AudioFeatures]) -> AudioTargets {
    AudioTargets {
        acousticness: majority_mean(samples.iter().map(|s| s.acousticness)),
        danceability: majority_mean(samples.iter().map(|s| s.danceability)),
        energy: majority_mean(samples.iter().map(|s| s.energy)),
        instrumentalness: majority_mean(samples.iter().map(|s| s.instrumentalness)),
        liveness: majority_mean(samples.iter().map(|s| s.liveness)),
        valence: majority_mean(samples.iter().map(|s| s.valence)),
        tempo: mean(samples.iter().map(|s| s.tempo)),
    }
}

/// Mean of whichever side of the split holds strictly more values; the high
/// side on a tie.
fn majority_mean(values: impl Iterator<Item = f32>) -> f32 {
    let (low, high): (Vec<f32>, Vec<f32>) = values.partition(|v| *v < BUCKET_SPLIT);
    if low.len() > high.len() {
        mean(low.into_iter())
    } else {
        mean(high.into_iter())
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0u32), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
