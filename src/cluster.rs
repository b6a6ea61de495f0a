use std::fmt;

use palette::Srgb;
use tracing::trace;

use crate::sampler::Sample;

/// Euclidean RGB distance under which a sample joins an existing bucket.
///
/// Solid regions with per-channel noise of ~10-15 units (up to ~17 on every
/// channel at once) collapse into one bucket; distinct hues stay apart.
pub const SIMILARITY_THRESHOLD: f64 = 30.0;

const SIMILARITY_THRESHOLD_SQ: f64 = SIMILARITY_THRESHOLD * SIMILARITY_THRESHOLD;

/// A representative colour of the image together with its accumulated weight.
///
/// `weight` is the sum of `alpha / 255` over every pixel folded into this
/// colour, so a fully opaque pixel counts as 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtractedColor {
    pub color: Srgb<u8>,
    pub weight: f64,
}

impl ExtractedColor {
    /// Upper-case `RRGGBB`, no leading `#`.
    pub fn hex(&self) -> String {
        format!(
            "{:02X}{:02X}{:02X}",
            self.color.red, self.color.green, self.color.blue
        )
    }
}

impl fmt::Display for ExtractedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.hex(), self.weight)
    }
}

/// Running cluster. `mean` keeps full precision and is only rounded on output.
#[derive(Clone, Copy, Debug)]
struct Bucket {
    mean: Srgb<f64>,
    weight: f64,
}

impl Bucket {
    fn open(sample: &Sample) -> Self {
        Self {
            mean: widen(sample.color),
            weight: sample.weight,
        }
    }

    #[inline]
    fn distance_sq(&self, color: &Srgb<f64>) -> f64 {
        let dr = self.mean.red - color.red;
        let dg = self.mean.green - color.green;
        let db = self.mean.blue - color.blue;
        dr * dr + dg * dg + db * db
    }

    fn absorb(&mut self, sample: &Sample) {
        let color = widen(sample.color);
        let total = self.weight + sample.weight;

        if total == 0.0 {
            // Nothing to average against yet.
            self.mean = color;
        } else if sample.weight > 0.0 {
            let (old, new) = (self.weight / total, sample.weight / total);
            self.mean = Srgb::new(
                self.mean.red * old + color.red * new,
                self.mean.green * old + color.green * new,
                self.mean.blue * old + color.blue * new,
            );
        }
        self.weight = total;
    }

    fn finish(&self) -> ExtractedColor {
        ExtractedColor {
            color: Srgb::new(
                to_channel(self.mean.red),
                to_channel(self.mean.green),
                to_channel(self.mean.blue),
            ),
            weight: self.weight,
        }
    }
}

#[inline]
fn to_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Widen 8-bit channels to `f64` on the same 0..255 scale the threshold uses.
#[inline]
fn widen(color: Srgb<u8>) -> Srgb<f64> {
    Srgb::new(color.red as f64, color.green as f64, color.blue as f64)
}

/// Greedy online clustering of `samples`, in the order they are yielded.
///
/// Each sample joins the closest existing bucket when that bucket's current
/// mean lies within [`SIMILARITY_THRESHOLD`] (earliest bucket wins a tie),
/// otherwise it opens a new bucket at the end. Means drift as samples merge;
/// later samples are compared against the drifted mean.
///
/// The result is sorted by descending weight. Equal weights keep the order in
/// which their buckets were opened.
pub fn cluster<I>(samples: I) -> Vec<ExtractedColor>
where
    I: IntoIterator<Item = Sample>,
{
    let mut buckets: Vec<Bucket> = Vec::new();

    for sample in samples {
        let color = widen(sample.color);

        let mut nearest: Option<(usize, f64)> = None;
        for (idx, bucket) in buckets.iter().enumerate() {
            let d = bucket.distance_sq(&color);
            if nearest.is_none_or(|(_, best)| d < best) {
                nearest = Some((idx, d));
            }
        }

        match nearest {
            Some((idx, d)) if d <= SIMILARITY_THRESHOLD_SQ => buckets[idx].absorb(&sample),
            _ => {
                trace!(
                    r = sample.color.red,
                    g = sample.color.green,
                    b = sample.color.blue,
                    bucket = buckets.len(),
                    "opening bucket"
                );
                buckets.push(Bucket::open(&sample));
            }
        }
    }

    let mut colors: Vec<ExtractedColor> = buckets.iter().map(Bucket::finish).collect();
    // `sort_by` is stable, which keeps first-encountered order on ties.
    colors.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    colors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque(r: u8, g: u8, b: u8) -> Sample {
        Sample::from_rgba([r, g, b, 255])
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(Vec::<Sample>::new()).is_empty());
    }

    #[test]
    fn test_identical_samples_collapse() {
        let out = cluster(vec![opaque(12, 34, 56); 7]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, Srgb::new(12, 34, 56));
        assert_eq!(out[0].weight, 7.0);
    }

    #[test]
    fn test_weighted_average_of_close_samples() {
        let out = cluster(vec![
            opaque(255, 0, 0),
            opaque(255, 0, 0),
            opaque(245, 0, 0),
            opaque(245, 0, 0),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, Srgb::new(250, 0, 0));
        assert_eq!(out[0].weight, 4.0);
    }

    #[test]
    fn test_distant_colors_stay_apart() {
        let out = cluster(vec![opaque(255, 0, 0), opaque(0, 255, 0), opaque(255, 0, 0)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].color, Srgb::new(255, 0, 0));
        assert_eq!(out[0].weight, 2.0);
        assert_eq!(out[1].color, Srgb::new(0, 255, 0));
    }

    #[test]
    fn test_threshold_boundary() {
        // Exactly on the threshold merges, one unit past it does not.
        let on = cluster(vec![opaque(0, 0, 0), opaque(30, 0, 0)]);
        assert_eq!(on.len(), 1);

        let past = cluster(vec![opaque(0, 0, 0), opaque(31, 0, 0)]);
        assert_eq!(past.len(), 2);
    }

    #[test]
    fn test_threshold_across_all_channels() {
        // 17 on every channel is ~29.4 away, 18 is ~31.2.
        let on = cluster(vec![opaque(0, 0, 0), opaque(17, 17, 17)]);
        assert_eq!(on.len(), 1);

        let past = cluster(vec![opaque(0, 0, 0), opaque(18, 18, 18)]);
        assert_eq!(past.len(), 2);
    }

    #[test]
    fn test_ties_keep_first_encountered_order() {
        let out = cluster(vec![opaque(0, 0, 255), opaque(0, 255, 0), opaque(255, 0, 0)]);
        let order: Vec<Srgb<u8>> = out.iter().map(|c| c.color).collect();
        assert_eq!(
            order,
            vec![Srgb::new(0, 0, 255), Srgb::new(0, 255, 0), Srgb::new(255, 0, 0)]
        );
    }

    #[test]
    fn test_joins_nearest_bucket() {
        // (40,0,0) is within reach of both buckets but closer to the second.
        let out = cluster(vec![opaque(15, 0, 0), opaque(60, 0, 0), opaque(40, 0, 0)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].color, Srgb::new(50, 0, 0));
        assert_eq!(out[0].weight, 2.0);
        assert_eq!(out[1].color, Srgb::new(15, 0, 0));
    }

    #[test]
    fn test_mean_drift_is_preserved() {
        // The bucket opens at 0 and drifts to 15 after the second sample;
        // 42 is 42 away from the original colour but only 27 from the drifted mean.
        let drifted = cluster(vec![opaque(0, 0, 0), opaque(30, 0, 0), opaque(42, 0, 0)]);
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].color, Srgb::new(24, 0, 0));
        assert_eq!(drifted[0].weight, 3.0);

        // Without the intermediate sample the same colour opens its own bucket.
        let direct = cluster(vec![opaque(0, 0, 0), opaque(42, 0, 0)]);
        assert_eq!(direct.len(), 2);
    }

    #[test]
    fn test_transparent_sample_does_not_move_mean() {
        let out = cluster(vec![
            opaque(200, 100, 50),
            Sample::from_rgba([210, 110, 60, 0]),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, Srgb::new(200, 100, 50));
        assert_eq!(out[0].weight, 1.0);
    }

    #[test]
    fn test_transparent_bucket_takes_next_color() {
        // A zero-weight bucket has no average yet, so a zero-weight merge overwrites it.
        let out = cluster(vec![
            Sample::from_rgba([0, 0, 0, 0]),
            Sample::from_rgba([10, 0, 0, 0]),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, Srgb::new(10, 0, 0));
        assert_eq!(out[0].weight, 0.0);
    }

    #[test]
    fn test_transparent_bucket_adopts_first_weighted_color() {
        let out = cluster(vec![Sample::from_rgba([0, 0, 0, 0]), opaque(20, 0, 0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].color, Srgb::new(20, 0, 0));
        assert_eq!(out[0].weight, 1.0);
    }

    #[test]
    fn test_weight_is_conserved() {
        let samples: Vec<Sample> = (0..=255u8)
            .map(|i| Sample::from_rgba([i, i.wrapping_mul(7), 255 - i, i]))
            .collect();
        let expected: f64 = samples.iter().map(|s| s.weight).sum();

        let out = cluster(samples);
        let total: f64 = out.iter().map(|c| c.weight).sum();
        assert!((total - expected).abs() < 1e-9, "{total} != {expected}");
        assert!(out.windows(2).all(|w| w[0].weight >= w[1].weight));
    }

    #[test]
    fn test_hex_and_display() {
        let c = ExtractedColor {
            color: Srgb::new(213, 196, 10),
            weight: 2.5,
        };
        assert_eq!(c.hex(), "D5C40A");
        assert_eq!(c.to_string(), "#D5C40A (2.5)");
    }
}
