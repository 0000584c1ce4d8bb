//! Importance ranking and greedy packing under a byte budget.
//!
//! Every tick a relevant ghost that is not sent adds its importance to an
//! accumulated priority, so a ghost that keeps losing to more important ones
//! eventually outranks them.

use codec::EntityId;
use glam::Vec3;

/// Scales importance down with distance from the connection's view.
///
/// The distance is cut into tiles; a ghost `n` tiles away has its importance
/// divided by `1 + n`, never dropping below 1.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DistanceImportance {
    pub tile_size: f32,
    /// Tiles beyond this count scale no further.
    pub max_tiles: u32,
}

impl Default for DistanceImportance {
    fn default() -> Self {
        Self {
            tile_size: 32.0,
            max_tiles: 16,
        }
    }
}

impl DistanceImportance {
    /// Importance of a ghost at `position` seen from `view`.
    #[must_use]
    pub fn scale(&self, importance: u32, position: Vec3, view: Vec3) -> u32 {
        if self.tile_size.is_nan() || self.tile_size <= 0.0 {
            return importance;
        }
        let tiles = (position.distance(view) / self.tile_size).floor();
        let tiles = if tiles.is_finite() {
            (tiles as u32).min(self.max_tiles)
        } else {
            self.max_tiles
        };
        (importance / (tiles + 1)).max(1)
    }
}

/// A ghost competing for space in one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub entity: EntityId,
    pub priority: u64,
}

/// Outcome of packing one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packing {
    pub sent: Vec<EntityId>,
    pub deferred: Vec<EntityId>,
}

/// Orders candidates by descending priority, then ascending entity id.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_unstable_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.entity.cmp(&b.entity))
    });
}

/// Offers ranked candidates to `place` in order.
///
/// `place` returns `true` when the candidate fit. A candidate that does not
/// fit is deferred and the next one is still tried, since a smaller slice may
/// fit the remaining space.
pub fn pack_greedy(
    ranked: &[Candidate],
    mut place: impl FnMut(&Candidate) -> bool,
) -> Packing {
    let mut packing = Packing::default();
    for candidate in ranked {
        if place(candidate) {
            packing.sent.push(candidate.entity);
        } else {
            packing.deferred.push(candidate.entity);
        }
    }
    packing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(priorities: &[u64]) -> Vec<Candidate> {
        priorities
            .iter()
            .enumerate()
            .map(|(i, &priority)| Candidate {
                entity: EntityId::new(i as u32),
                priority,
            })
            .collect()
    }

    #[test]
    fn budget_fits_six_of_ten() {
        let mut ranked = candidates(&[1; 10]);
        rank(&mut ranked);
        let mut budget = 300usize;
        let packing = pack_greedy(&ranked, |_| {
            let fits = budget >= 50;
            if fits {
                budget -= 50;
            }
            fits
        });
        assert_eq!(packing.sent.len(), 6);
        assert_eq!(packing.deferred.len(), 4);
        assert_eq!(packing.sent[0], EntityId::new(0));
    }

    #[test]
    fn ranks_by_priority_then_id() {
        let mut ranked = candidates(&[1, 5, 5, 3]);
        rank(&mut ranked);
        let order: Vec<u32> = ranked.iter().map(|c| c.entity.raw()).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn smaller_candidate_fills_leftover_space() {
        let ranked = candidates(&[3, 2, 1]);
        let sizes = [40usize, 80, 30];
        let mut budget = 100usize;
        let packing = pack_greedy(&ranked, |c| {
            let size = sizes[c.entity.raw() as usize];
            let fits = budget >= size;
            if fits {
                budget -= size;
            }
            fits
        });
        assert_eq!(packing.sent, vec![EntityId::new(0), EntityId::new(2)]);
        assert_eq!(packing.deferred, vec![EntityId::new(1)]);
    }

    #[test]
    fn distance_scaling() {
        let importance = DistanceImportance {
            tile_size: 10.0,
            max_tiles: 3,
        };
        let view = Vec3::ZERO;
        assert_eq!(importance.scale(100, Vec3::new(5.0, 0.0, 0.0), view), 100);
        assert_eq!(importance.scale(100, Vec3::new(15.0, 0.0, 0.0), view), 50);
        assert_eq!(importance.scale(100, Vec3::new(1000.0, 0.0, 0.0), view), 25);
        assert_eq!(importance.scale(1, Vec3::new(1000.0, 0.0, 0.0), view), 1);
        assert_eq!(importance.scale(100, Vec3::new(f32::NAN, 0.0, 0.0), view), 25);
    }
}
