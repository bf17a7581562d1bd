use common::Direction;

/// Result of comparing two series across consecutive bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    Bullish, // a crossed above b
    Bearish, // a crossed below b
    Neutral, // no crossover on this bar
}

impl Crossover {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Crossover::Bullish => Some(Direction::Long),
            Crossover::Bearish => Some(Direction::Short),
            Crossover::Neutral => None,
        }
    }
}

/// Edge-triggered comparison of `(a, b)` between the previous and current bar.
///
/// Bullish requires `prev_a <= prev_b` and `cur_a > cur_b` strictly; an exact
/// tie on the current bar is `Neutral`.
pub fn cross(prev_a: f64, prev_b: f64, cur_a: f64, cur_b: f64) -> Crossover {
    if prev_a <= prev_b && cur_a > cur_b {
        Crossover::Bullish
    } else if prev_a >= prev_b && cur_a < cur_b {
        Crossover::Bearish
    } else {
        Crossover::Neutral
    }
}

/// Crossover of index-aligned series `a` and `b` at bar `t`. Undefined
/// values on either bar read as `Neutral`.
pub fn crossover_at(a: &[Option<f64>], b: &[Option<f64>], t: usize) -> Crossover {
    if t == 0 || t >= a.len() || t >= b.len() {
        return Crossover::Neutral;
    }
    match (a[t - 1], b[t - 1], a[t], b[t]) {
        (Some(pa), Some(pb), Some(ca), Some(cb)) => cross(pa, pb, ca, cb),
        _ => Crossover::Neutral,
    }
}

/// Crossover on the latest bar.
pub fn crossover(a: &[Option<f64>], b: &[Option<f64>]) -> Crossover {
    let len = a.len().min(b.len());
    if len < 2 {
        return Crossover::Neutral;
    }
    crossover_at(a, b, len - 1)
}

/// Every non-neutral crossover event with its bar index.
pub fn crossovers(a: &[Option<f64>], b: &[Option<f64>]) -> Vec<(usize, Crossover)> {
    (1..a.len().min(b.len()))
        .map(|t| (t, crossover_at(a, b, t)))
        .filter(|(_, c)| *c != Crossover::Neutral)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().copied().map(Some).collect()
    }

    #[test]
    fn single_crossover_fires_exactly_once() {
        let a = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = some(&[3.5; 6]);
        assert_eq!(crossovers(&a, &b), vec![(3, Crossover::Bullish)]);
        assert_eq!(crossover_at(&a, &b, 2), Crossover::Neutral);
        assert_eq!(crossover_at(&a, &b, 4), Crossover::Neutral);
    }

    #[test]
    fn touching_without_crossing_is_neutral() {
        let a = some(&[1.0, 2.0, 2.0, 2.0]);
        let b = some(&[2.0, 2.0, 2.0, 2.0]);
        assert!(crossovers(&a, &b).is_empty());
    }

    #[test]
    fn repeated_equal_value_does_not_retrigger() {
        // a sits above b, then stays identical bar after bar
        let a = some(&[1.0, 3.0, 3.0, 3.0]);
        let b = some(&[2.0, 2.0, 2.0, 2.0]);
        assert_eq!(crossovers(&a, &b), vec![(1, Crossover::Bullish)]);
    }

    #[test]
    fn bearish_mirror() {
        let a = some(&[5.0, 4.0, 3.0]);
        let b = some(&[4.5, 4.0, 3.5]);
        assert_eq!(crossover(&a, &b), Crossover::Bearish);
        assert_eq!(Crossover::Bearish.direction(), Some(Direction::Short));
    }

    #[test]
    fn undefined_values_are_neutral() {
        let a = vec![None, Some(3.0)];
        let b = some(&[2.0, 2.0]);
        assert_eq!(crossover(&a, &b), Crossover::Neutral);
    }
}
