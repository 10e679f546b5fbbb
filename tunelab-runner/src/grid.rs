//! Parameter grid: Cartesian product of candidate values per parameter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tunelab_core::domain::{ParamError, ParameterSet};
use tunelab_core::strategy::StrategyKind;

/// Candidate values per parameter for one strategy family.
///
/// Axes are kept in a `BTreeMap`, so combinations are always generated in
/// the same order: keys ascending, the last key varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub strategy: String,
    pub axes: BTreeMap<String, Vec<f64>>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::rsi_sma_default()
    }
}

impl ParamGrid {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            axes: BTreeMap::new(),
        }
    }

    /// Builder-style axis insert.
    pub fn axis(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.insert(name.into(), values);
        self
    }

    /// Oscillator-regime grid: 3 × 3 × 3 × 3 before filtering.
    pub fn rsi_sma_default() -> Self {
        Self::new("rsi_sma")
            .axis("rsi_period", vec![10.0, 14.0, 21.0])
            .axis("sma_period", vec![15.0, 20.0, 30.0])
            .axis("rsi_buy", vec![30.0, 35.0, 40.0])
            .axis("rsi_sell", vec![60.0, 65.0, 70.0])
    }

    /// Number of raw combinations, before the validity filter.
    pub fn size(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Every raw combination in grid order.
    pub fn raw_combinations(&self) -> Vec<ParameterSet> {
        if self.axes.values().any(Vec::is_empty) {
            return Vec::new();
        }
        let axes: Vec<(&String, &Vec<f64>)> = self.axes.iter().collect();
        let mut combos = Vec::with_capacity(self.size());
        let mut cursor = vec![0usize; axes.len()];
        loop {
            let mut params = ParameterSet::new(self.strategy.clone());
            for (slot, (name, values)) in axes.iter().enumerate() {
                params.parameters.insert((*name).clone(), values[cursor[slot]]);
            }
            combos.push(params);

            // Odometer increment, last axis fastest.
            let mut slot = axes.len();
            loop {
                if slot == 0 {
                    return combos;
                }
                slot -= 1;
                cursor[slot] += 1;
                if cursor[slot] < axes[slot].1.len() {
                    break;
                }
                cursor[slot] = 0;
            }
        }
    }

    /// Combinations accepted by the strategy family's validity predicate.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        self.raw_combinations()
            .into_iter()
            .filter(|params| StrategyKind::validate(params).is_ok())
            .collect()
    }

    /// The first validation error among raw combinations, if every one fails.
    pub fn first_rejection(&self) -> Option<ParamError> {
        let mut first = None;
        for params in self.raw_combinations() {
            match StrategyKind::validate(&params) {
                Ok(()) => return None,
                Err(e) if first.is_none() => first = Some(e),
                Err(_) => {}
            }
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_filters_buy_not_below_sell() {
        let grid = ParamGrid::rsi_sma_default();
        assert_eq!(grid.size(), 81);
        // Every buy value is below every sell value.
        assert_eq!(grid.combinations().len(), 81);
    }

    #[test]
    fn invalid_combinations_are_skipped() {
        let grid = ParamGrid::new("rsi_sma")
            .axis("rsi_period", vec![14.0])
            .axis("sma_period", vec![20.0])
            .axis("rsi_buy", vec![30.0, 50.0, 70.0])
            .axis("rsi_sell", vec![50.0, 60.0]);
        let combos = grid.combinations();
        // (30,50) (30,60) (50,60)
        assert_eq!(combos.len(), 3);
        for c in &combos {
            assert!(c.get("rsi_buy").unwrap() < c.get("rsi_sell").unwrap());
        }
    }

    #[test]
    fn order_is_keys_ascending_last_fastest() {
        let grid = ParamGrid::new("ma_crossover")
            .axis("fast_period", vec![5.0, 10.0])
            .axis("slow_period", vec![20.0, 50.0]);
        let pairs: Vec<(f64, f64)> = grid
            .raw_combinations()
            .iter()
            .map(|p| (p.get("fast_period").unwrap(), p.get("slow_period").unwrap()))
            .collect();
        assert_eq!(pairs, vec![(5.0, 20.0), (5.0, 50.0), (10.0, 20.0), (10.0, 50.0)]);
    }

    #[test]
    fn empty_axis_means_no_combinations() {
        let grid = ParamGrid::rsi_sma_default().axis("rsi_buy", vec![]);
        assert_eq!(grid.size(), 0);
        assert!(grid.combinations().is_empty());
    }

    #[test]
    fn unknown_strategy_reports_rejection() {
        let grid = ParamGrid::new("macd").axis("fast", vec![12.0]);
        assert!(grid.combinations().is_empty());
        assert!(matches!(grid.first_rejection(), Some(ParamError::UnknownStrategy(_))));
    }
}
