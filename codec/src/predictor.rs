//! Linear prediction of snapshot words from two earlier baselines.

use crate::Tick;

/// Extrapolates a value for `target` from values at two baseline ticks.
///
/// The predicted value is a better delta reference than the newest baseline
/// alone when a field changes at a steady rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPredictor {
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// No usable baseline: predict zero.
    Zero,
    /// Only the first baseline is usable.
    Hold,
    /// Continue the line through both baselines.
    Linear { numerator: i64, denominator: i64 },
}

impl DeltaPredictor {
    /// Builds a predictor for `target` from the ticks of `baseline1` and `baseline2`.
    ///
    /// An invalid `baseline1` tick predicts zero. An invalid or equal
    /// `baseline2` tick predicts the `baseline1` value unchanged.
    #[must_use]
    pub fn new(target: Tick, baseline1: Tick, baseline2: Tick) -> Self {
        let mode = match (target.ticks_since(baseline1), baseline2.ticks_since(baseline1)) {
            (None, _) if !baseline1.is_valid() => Mode::Zero,
            (Some(ahead), Some(span)) if span != 0 => Mode::Linear {
                numerator: i64::from(ahead),
                denominator: i64::from(span),
            },
            _ => Mode::Hold,
        };
        Self { mode }
    }

    /// Returns `true` when both baselines contribute.
    #[must_use]
    pub fn is_linear(&self) -> bool {
        matches!(self.mode, Mode::Linear { .. })
    }

    /// Predicts a signed value.
    #[must_use]
    pub fn predict_int(&self, baseline1: i32, baseline2: i32) -> i32 {
        self.predict_word(baseline1 as u32, baseline2 as u32) as i32
    }

    /// Predicts a 32-bit snapshot word.
    ///
    /// The slope is taken from the wrapping difference of the two words, so
    /// signed and unsigned fields predict identically. Rounds half away from zero.
    #[must_use]
    pub fn predict_word(&self, baseline1: u32, baseline2: u32) -> u32 {
        match self.mode {
            Mode::Zero => 0,
            Mode::Hold => baseline1,
            Mode::Linear {
                numerator,
                denominator,
            } => {
                let slope = i128::from(baseline2.wrapping_sub(baseline1) as i32);
                let scaled = slope * i128::from(numerator);
                let den = i128::from(denominator);
                let offset = div_round(scaled, den);
                baseline1.wrapping_add(offset as u32)
            }
        }
    }
}

fn div_round(num: i128, den: i128) -> i128 {
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}
