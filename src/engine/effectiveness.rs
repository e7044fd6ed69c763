// Taming effectiveness: feeding sequence with decaying safety and rare negative events.

use rand::Rng;
use serde::Serialize;

use super::config::{
    KibbleProfile, EFFECTIVENESS_MAX, EFFECTIVENESS_MIN, FEEDING_PENALTY, HIT_BY_TAMER_PENALTY,
    SAFETY_DECAY, SAFETY_FLOOR,
};
use super::spawn::weighted_index;

/// Something that went wrong after the feeding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NegativeEvent {
    /// The tamer hit the creature; costs effectiveness but the tame still succeeds.
    #[serde(rename = "hittetByYou")]
    HitByTamer,
    /// The creature woke up; the tame fails.
    #[serde(rename = "awaken")]
    Awaken,
    /// A predator ate the creature; the tame fails.
    #[serde(rename = "eatenByPredator")]
    EatenByPredator,
}

impl NegativeEvent {
    /// Weighted bag the event is drawn from.
    pub const BAG: [(NegativeEvent, f64); 3] = [
        (NegativeEvent::HitByTamer, 1.0),
        (NegativeEvent::Awaken, 1.0),
        (NegativeEvent::EatenByPredator, 1.0),
    ];

    pub fn fails_tame(self) -> bool {
        matches!(self, NegativeEvent::Awaken | NegativeEvent::EatenByPredator)
    }
}

/// Outcome of one contributor's taming attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TameAttempt {
    pub feedings: u32,
    pub effectiveness: f64,
    pub event: Option<NegativeEvent>,
    pub success: bool,
}

/// Number of feedings needed to cover `food` with the given kibble.
pub fn required_feedings(food: f64, kibble: &KibbleProfile) -> u32 {
    if kibble.power <= 0.0 {
        return 0;
    }
    (food / kibble.power).ceil().max(0.0) as u32
}

/// Resolve effectiveness for a contributor feeding `kibble` to a creature with `food` points.
pub fn evaluate<R: Rng + ?Sized>(
    food: f64,
    kibble: &KibbleProfile,
    negative_event_chance: f64,
    rng: &mut R,
) -> TameAttempt {
    let feedings = required_feedings(food, kibble);
    let mut effectiveness = EFFECTIVENESS_MAX;
    let mut safety = kibble.safety;

    for _ in 0..feedings {
        if rng.gen::<f64>() > safety {
            let penalty = rng.gen_range(FEEDING_PENALTY.0..=FEEDING_PENALTY.1) as f64;
            effectiveness -= penalty;
            if effectiveness <= EFFECTIVENESS_MIN {
                effectiveness = EFFECTIVENESS_MIN;
                break;
            }
        }
        safety = (safety * SAFETY_DECAY).max(SAFETY_FLOOR);
    }

    let mut event = None;
    if rng.gen::<f64>() < negative_event_chance {
        let weights: Vec<f64> = NegativeEvent::BAG.iter().map(|(_, w)| *w).collect();
        if let Some(idx) = weighted_index(&weights, rng) {
            let picked = NegativeEvent::BAG[idx].0;
            if picked == NegativeEvent::HitByTamer {
                let penalty =
                    rng.gen_range(HIT_BY_TAMER_PENALTY.0..=HIT_BY_TAMER_PENALTY.1) as f64;
                effectiveness -= penalty;
            }
            event = Some(picked);
        }
    }

    let effectiveness = effectiveness.clamp(EFFECTIVENESS_MIN, EFFECTIVENESS_MAX);
    TameAttempt {
        feedings,
        effectiveness,
        event,
        success: !event.is_some_and(NegativeEvent::fails_tame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{kibble, KIBBLES};
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_required_feedings() {
        let basic = kibble("basic").unwrap();
        assert_eq!(required_feedings(3500.0, basic), 4);
        assert_eq!(required_feedings(3000.0, basic), 3);
        assert_eq!(required_feedings(0.0, basic), 0);
    }

    #[test]
    fn test_favorable_rolls_keep_full_effectiveness() {
        // StepRng(0, 0) draws 0.0 for every float: never above safety, never an event
        let basic = kibble("basic").unwrap();
        assert_eq!(basic.safety, 0.8);
        let mut rng = StepRng::new(0, 0);
        let attempt = evaluate(3500.0, basic, 0.0, &mut rng);
        assert_eq!(attempt.feedings, 4);
        assert_eq!(attempt.effectiveness, 100.0);
        assert_eq!(attempt.event, None);
        assert!(attempt.success);
    }

    #[test]
    fn test_unfavorable_rolls_floor_at_one() {
        // High bits set: floats just below 1.0 so every feeding fails safety.
        // Low bits clear: integer ranges draw their minimum (penalty 1).
        let basic = kibble("basic").unwrap();
        let mut rng = StepRng::new(0xFFFF_FFFF_0000_0000, 0);
        let attempt = evaluate(200_000.0, basic, 0.0, &mut rng);
        assert_eq!(attempt.feedings, 200);
        assert_eq!(attempt.effectiveness, 1.0);
        assert!(attempt.success);
    }

    #[test]
    fn test_effectiveness_always_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for kib in &KIBBLES {
            for food in [500.0, 3500.0, 12_000.0, 60_000.0] {
                for _ in 0..200 {
                    let attempt = evaluate(food, kib, 0.05, &mut rng);
                    assert!((1.0..=100.0).contains(&attempt.effectiveness));
                }
            }
        }
    }

    #[test]
    fn test_negative_events_fire_and_fail() {
        let basic = kibble("basic").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let attempt = evaluate(1000.0, basic, 1.0, &mut rng);
            let event = attempt.event.expect("event always fires at chance 1.0");
            assert_eq!(attempt.success, !event.fails_tame());
            if event == NegativeEvent::HitByTamer {
                assert!(attempt.effectiveness <= 95.0);
            }
            seen.insert(event);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_event_serialization_names() {
        let json = serde_json::to_string(&NegativeEvent::HitByTamer).unwrap();
        assert_eq!(json, "\"hittetByYou\"");
        let json = serde_json::to_string(&NegativeEvent::EatenByPredator).unwrap();
        assert_eq!(json, "\"eatenByPredator\"");
    }
}
