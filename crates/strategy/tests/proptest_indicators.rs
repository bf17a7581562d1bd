use proptest::prelude::*;
use strategy::indicators::{crossovers, ema, rsi, stoch_rsi, Crossover};

fn defined(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

proptest! {
    /// A rising series crossing a flat level fires once, on the first bar above it.
    #[test]
    fn single_crossing_fires_exactly_once(
        start in -100.0f64..-0.5,
        steps in prop::collection::vec(0.01f64..5.0, 2..120),
        level in -0.5f64..0.5,
    ) {
        let mut a = vec![start];
        for s in &steps {
            let next = a[a.len() - 1] + s;
            a.push(next);
        }
        let b = vec![level; a.len()];
        let events = crossovers(&defined(&a), &defined(&b));

        match a.iter().position(|&v| v > level) {
            Some(i) => prop_assert_eq!(events, vec![(i, Crossover::Bullish)]),
            None => prop_assert!(events.is_empty()),
        }
    }

    /// Oscillators stay in range and never panic on arbitrary positive prices.
    #[test]
    fn oscillators_stay_bounded(closes in prop::collection::vec(0.01f64..100_000.0, 30..200)) {
        for v in rsi(&closes, 14).unwrap().into_iter().flatten() {
            prop_assert!((0.0..=100.0).contains(&v));
        }
        let out = stoch_rsi(&closes, 11, 8, 2).unwrap();
        for v in out.k.into_iter().chain(out.d).flatten() {
            prop_assert!((-1e-9..=100.0 + 1e-9).contains(&v));
        }
        let e = ema(&closes, 8).unwrap();
        prop_assert!(e[..7].iter().all(Option::is_none));
        prop_assert!(e[7..].iter().all(Option::is_some));
    }
}
