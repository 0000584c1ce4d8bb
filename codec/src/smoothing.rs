//! Client-side interpolation and extrapolation over received history.

use schema::Smoothing;

use crate::history::HistoryView;
use crate::registry::{FieldDescriptor, GhostTypeCodec};
use crate::snapshot::SnapshotData;
use crate::{FieldValue, Tick};

/// Entries bracketing a render time.
#[derive(Debug, Clone, Copy)]
pub struct Bracket<'a> {
    /// Newest entry at or before the render tick; the oldest entry if none is.
    pub before: (Tick, &'a SnapshotData),
    /// Oldest entry after `before`, if already received.
    pub after: Option<(Tick, &'a SnapshotData)>,
    /// Newest entry older than `before`, used to extrapolate.
    pub prev: Option<(Tick, &'a SnapshotData)>,
}

impl<'a> Bracket<'a> {
    /// Finds the bracket for `render_tick` in a ghost's history.
    #[must_use]
    pub fn find(view: HistoryView<'a, SnapshotData>, render_tick: Tick) -> Option<Self> {
        let before = view
            .at_or_before(render_tick)
            .or_else(|| view.iter().last())?;
        Some(Self {
            before,
            after: view.after(before.0),
            prev: view.at_or_before(before.0.subtract(1)),
        })
    }
}

/// Samples every replicated field at `render_tick + fraction`.
///
/// `fraction` is clamped to `[0, 1]`. Extrapolation never reaches further
/// than `max_extrapolation_ticks` past the newest entry.
#[must_use]
pub fn sample_fields(
    codec: &GhostTypeCodec,
    bracket: &Bracket<'_>,
    render_tick: Tick,
    fraction: f32,
    max_extrapolation_ticks: u32,
) -> Vec<FieldValue> {
    let fraction = fraction.clamp(0.0, 1.0);
    let (before_tick, before) = bracket.before;
    // Render time relative to `before`, in ticks.
    let offset = render_tick
        .ticks_since(before_tick)
        .map_or(0.0, |d| d as f32 + fraction)
        .max(0.0);

    let interpolation = bracket.after.map(|(after_tick, after)| {
        let span = after_tick.ticks_since(before_tick).unwrap_or(1).max(1) as f32;
        (after, (offset / span).clamp(0.0, 1.0))
    });
    let extrapolation = bracket.prev.map(|(prev_tick, prev)| {
        let span = before_tick.ticks_since(prev_tick).unwrap_or(1).max(1) as f32;
        let ahead = offset.min(max_extrapolation_ticks as f32);
        (prev, 1.0 + ahead / span)
    });

    codec
        .fields()
        .iter()
        .map(|field| {
            let value = before.value(field);
            match (field.smoothing, interpolation, extrapolation) {
                (Smoothing::Clamp, _, _) => value,
                (_, Some((after, t)), _) => blend(field, value, after.value(field), t, true),
                (Smoothing::InterpolateAndExtrapolate, None, Some((prev, t))) => {
                    blend(field, prev.value(field), value, t, false)
                }
                _ => value,
            }
        })
        .collect()
}

/// Blends `from` toward `to`. A jump larger than the field's maximum
/// smoothing distance snaps to the newer value instead.
fn blend(
    field: &FieldDescriptor,
    from: FieldValue,
    to: FieldValue,
    t: f32,
    forward: bool,
) -> FieldValue {
    let Some(lerp) = field.ops().blend else {
        return if forward { from } else { to };
    };
    if let (Some(max), Some(distance)) = (field.max_smoothing_distance, from.distance(&to)) {
        if distance > max {
            return to;
        }
    }
    lerp(&from, &to, t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::SnapshotHistory;
    use crate::snapshot_from_values;
    use crate::CodecRegistry;
    use glam::Vec2;
    use schema::{FieldDef, FieldKind, GhostTypeDef, GhostTypeId, Schema};

    const MOVER: GhostTypeId = GhostTypeId::new(1);

    fn registry() -> CodecRegistry {
        let schema = Schema::new(vec![GhostTypeDef::new(MOVER, "mover")
            .field(FieldDef::new("clamped", FieldKind::Float).quantized(100))
            .field(
                FieldDef::new("lerped", FieldKind::Float)
                    .quantized(100)
                    .smoothing(Smoothing::Interpolate),
            )
            .field(
                FieldDef::new("pos", FieldKind::Vector2)
                    .quantized(100)
                    .smoothing(Smoothing::InterpolateAndExtrapolate)
                    .max_smoothing_distance(50.0),
            )
            .field(FieldDef::new("open", FieldKind::Bool).smoothing(Smoothing::Interpolate))])
        .unwrap();
        CodecRegistry::new(&schema).unwrap()
    }

    fn history(
        registry: &CodecRegistry,
        entries: &[(u32, f32, bool)],
    ) -> SnapshotHistory<SnapshotData> {
        let codec = registry.ghost_type(MOVER).unwrap();
        let mut history = SnapshotHistory::new(16).unwrap();
        for &(tick, v, open) in entries {
            let data = snapshot_from_values(
                codec,
                &[
                    FieldValue::Float(v),
                    FieldValue::Float(v),
                    FieldValue::Vector2(Vec2::new(v, 0.0)),
                    FieldValue::Bool(open),
                ],
            )
            .unwrap();
            history.store(Tick::new(tick), data).unwrap();
        }
        history
    }

    fn float(value: &FieldValue) -> f32 {
        match value {
            FieldValue::Float(v) => *v,
            FieldValue::Vector2(v) => v.x,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn sample(
        history: &SnapshotHistory<SnapshotData>,
        registry: &CodecRegistry,
        tick: u32,
        fraction: f32,
    ) -> Vec<FieldValue> {
        let codec = registry.ghost_type(MOVER).unwrap();
        let bracket = Bracket::find(history.view(), Tick::new(tick)).unwrap();
        sample_fields(codec, &bracket, Tick::new(tick), fraction, 4)
    }

    #[test]
    fn interpolates_between_entries() {
        let registry = registry();
        let history = history(&registry, &[(10, 0.0, false), (12, 4.0, true)]);
        let values = sample(&history, &registry, 11, 0.0);
        assert_eq!(float(&values[0]), 0.0);
        assert!((float(&values[1]) - 2.0).abs() < 1e-5);
        assert!((float(&values[2]) - 2.0).abs() < 1e-5);
        assert_eq!(values[3], FieldValue::Bool(false));
    }

    #[test]
    fn extrapolates_with_limit() {
        let registry = registry();
        let history = history(&registry, &[(10, 0.0, false), (11, 1.0, false)]);
        let values = sample(&history, &registry, 12, 0.5);
        assert!((float(&values[2]) - 2.5).abs() < 1e-5);
        assert_eq!(float(&values[1]), 1.0);

        let far = sample(&history, &registry, 30, 0.0);
        assert!((float(&far[2]) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn large_jump_snaps() {
        let registry = registry();
        let history = history(&registry, &[(10, 0.0, false), (12, 100.0, false)]);
        let values = sample(&history, &registry, 11, 0.0);
        assert_eq!(float(&values[2]), 100.0);
        assert!((float(&values[1]) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn render_tick_before_history_uses_oldest() {
        let registry = registry();
        let history = history(&registry, &[(10, 3.0, false), (11, 4.0, false)]);
        let values = sample(&history, &registry, 2, 0.0);
        assert_eq!(float(&values[0]), 3.0);
        assert_eq!(float(&values[1]), 3.0);
    }
}
