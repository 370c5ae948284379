//! Down-sampling projection from buffered sample sets to chart point series.
//!
//! Pure functions of their inputs — no state, no mutation.  Recomputed from
//! the full window snapshot on every chart refresh.

use rail_core::{FilterMode, PlotPoint, Rail, RailSeries, SampleSet};

/// Project one rail's power draw to a point series.
///
/// X is seconds since the first set in the snapshot, Y is instantaneous
/// power in watts.  `factor == 1` emits one point per set; for
/// `factor = k > 1` consecutive runs of `k` points (the last run may be
/// shorter) are reduced to one point per `mode`.  The reduced point keeps
/// the X of its run's last sample — the instant the run completed.
pub fn project(
    sets: &[SampleSet],
    rail: Rail,
    factor: usize,
    mode: FilterMode,
) -> Vec<PlotPoint> {
    let Some(first) = sets.first() else {
        return Vec::new();
    };
    let origin_ms = first.timestamp_ms;

    let raw: Vec<PlotPoint> = sets
        .iter()
        .filter_map(|set| {
            set.power(rail).map(|watts| PlotPoint {
                x: (set.timestamp_ms - origin_ms) as f64 / 1000.0,
                y: watts,
            })
        })
        .collect();

    if factor <= 1 {
        return raw;
    }

    raw.chunks(factor).map(|run| reduce(run, mode)).collect()
}

/// Project all rails at once — the chart path's per-refresh output.
pub fn project_all(sets: &[SampleSet], factor: usize, mode: FilterMode) -> RailSeries {
    Rail::ALL
        .iter()
        .map(|&rail| (rail, project(sets, rail, factor, mode)))
        .collect()
}

fn reduce(run: &[PlotPoint], mode: FilterMode) -> PlotPoint {
    debug_assert!(!run.is_empty());
    let x = run[run.len() - 1].x;
    let y = match mode {
        FilterMode::Mean => run.iter().map(|p| p.y).sum::<f64>() / run.len() as f64,
        FilterMode::Min => run.iter().map(|p| p.y).fold(f64::INFINITY, f64::min),
        FilterMode::Max => run.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max),
        FilterMode::Last => run[run.len() - 1].y,
    };
    PlotPoint { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_core::RailSample;

    /// One-rail sets with voltage 1.0, so Y equals the current value.
    fn sets(values: &[f64]) -> Vec<SampleSet> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| SampleSet {
                timestamp_ms: i as u64 * 100,
                samples: vec![RailSample {
                    rail: Rail::Eps12V,
                    voltage: 1.0,
                    current: v,
                }],
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(project(&[], Rail::Eps12V, 1, FilterMode::Mean).is_empty());
    }

    #[test]
    fn factor_one_is_identity_length() {
        let input = sets(&[1.0, 2.0, 3.0]);
        let points = project(&input, Rail::Eps12V, 1, FilterMode::Mean);
        assert_eq!(points.len(), input.len());
        assert_eq!(points[0].x, 0.0);
        assert_eq!(points[2].x, 0.2);
    }

    #[test]
    fn projection_is_deterministic() {
        let input = sets(&[4.0, 7.0, 1.0, 9.0, 2.0]);
        let a = project(&input, Rail::Eps12V, 2, FilterMode::Max);
        let b = project(&input, Rail::Eps12V, 2, FilterMode::Max);
        assert_eq!(a, b);
    }

    #[test]
    fn reduction_length_is_ceil_n_over_k() {
        let input = sets(&[1.0; 7]);
        assert_eq!(project(&input, Rail::Eps12V, 3, FilterMode::Mean).len(), 3);
        assert_eq!(project(&input, Rail::Eps12V, 7, FilterMode::Mean).len(), 1);
        assert_eq!(project(&input, Rail::Eps12V, 10, FilterMode::Mean).len(), 1);
    }

    #[test]
    fn mean_reduces_runs_to_their_average() {
        let input = sets(&[1.0, 2.0, 3.0, 4.0]);
        let points = project(&input, Rail::Eps12V, 2, FilterMode::Mean);
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![1.5, 3.5]);
    }

    #[test]
    fn min_max_and_last_modes() {
        let input = sets(&[3.0, 1.0, 2.0, 5.0]);
        let min = project(&input, Rail::Eps12V, 4, FilterMode::Min);
        let max = project(&input, Rail::Eps12V, 4, FilterMode::Max);
        let last = project(&input, Rail::Eps12V, 4, FilterMode::Last);
        assert_eq!(min[0].y, 1.0);
        assert_eq!(max[0].y, 5.0);
        assert_eq!(last[0].y, 5.0);
        // Reduced point sits at the run's last timestamp.
        assert_eq!(min[0].x, 0.3);
    }

    #[test]
    fn missing_rail_produces_empty_series() {
        let input = sets(&[1.0, 2.0]);
        assert!(project(&input, Rail::Atx5V, 1, FilterMode::Mean).is_empty());
    }

    #[test]
    fn project_all_covers_every_rail() {
        let series = project_all(&sets(&[1.0]), 1, FilterMode::Mean);
        assert_eq!(series.len(), Rail::ALL.len());
        assert_eq!(series[&Rail::Eps12V].len(), 1);
        assert!(series[&Rail::PciExpress].is_empty());
    }
}
