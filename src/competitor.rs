use std::cmp::Ordering;

use crate::error::{ParseError, Result};
use crate::utils::{add_if_not_null, subtract_if_not_null, times_equal};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Reads the single-letter codes used by the results formats
    pub fn from_code(code: &str) -> Option<Gender> {
        match code.trim() {
            "M" => Some(Gender::Male),
            "F" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

/// A pair of control indexes bracketing a run of omitted times
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlIndexRange {
    pub start: usize,
    pub end: usize,
}

/// One competitor's result: identity, status flags and time series.
///
/// Cumulative times always start with 0 for the start and end with the
/// finish, so there are `num_controls + 2` of them. `None` is a missed
/// punch, `Some(NaN)` a time a repair pass judged to be dubious.
#[derive(Debug, Clone)]
pub struct Competitor {
    /// Stable position within the input, used to break ties when sorting
    pub order: usize,
    pub name: String,
    pub club: String,
    /// Seconds past midnight
    pub start_time: Option<f64>,
    pub class_name: Option<String>,
    pub year_of_birth: Option<i32>,
    pub gender: Option<Gender>,
    pub is_non_competitive: bool,
    pub is_non_starter: bool,
    pub is_non_finisher: bool,
    pub is_disqualified: bool,
    pub is_over_max_time: bool,
    is_ok_despite_missing_times: bool,
    total_time: Option<f64>,
    original_split_times: Vec<Option<f64>>,
    original_cum_times: Vec<Option<f64>>,
    split_times: Option<Vec<Option<f64>>>,
    cum_times: Option<Vec<Option<f64>>>,
    split_ranks: Option<Vec<Option<u32>>>,
    cum_ranks: Option<Vec<Option<u32>>>,
    time_losses: Option<Vec<f64>>,
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Derives split times from cumulative times. A split next to a missing
/// cumulative time is itself missing.
pub fn split_times_from_cum_times(cum_times: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
    match cum_times {
        [] => Err(ParseError::invalid("Array of cumulative times must not be empty")),
        [first, ..] if *first != Some(0.0) => Err(ParseError::invalid(
            "Array of cumulative times must have zero as its first item",
        )),
        [_] => Err(ParseError::invalid(
            "Array of cumulative times must contain more than just a single zero",
        )),
        _ => Ok(cum_times
            .windows(2)
            .map(|pair| subtract_if_not_null(pair[1], pair[0]))
            .collect()),
    }
}

/// Sums split times into cumulative times with a leading zero. Once a split
/// is missing, every later cumulative time is missing too.
pub fn cum_times_from_split_times(split_times: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut cum_times = Vec::with_capacity(split_times.len() + 1);
    cum_times.push(Some(0.0));
    let mut total = Some(0.0);
    for split in split_times {
        total = add_if_not_null(total, *split);
        cum_times.push(total);
    }
    cum_times
}

impl Competitor {
    fn new(
        order: usize,
        name: impl Into<String>,
        club: impl Into<String>,
        start_time: Option<f64>,
        original_cum_times: Vec<Option<f64>>,
    ) -> Result<Self> {
        let original_split_times = split_times_from_cum_times(&original_cum_times)?;
        let total_time = if original_cum_times.iter().any(Option::is_none) {
            None
        } else {
            original_cum_times.last().copied().flatten()
        };

        Ok(Competitor {
            order,
            name: name.into(),
            club: club.into(),
            start_time,
            class_name: None,
            year_of_birth: None,
            gender: None,
            is_non_competitive: false,
            is_non_starter: false,
            is_non_finisher: false,
            is_disqualified: false,
            is_over_max_time: false,
            is_ok_despite_missing_times: false,
            total_time,
            original_split_times,
            original_cum_times,
            split_times: None,
            cum_times: None,
            split_ranks: None,
            cum_ranks: None,
            time_losses: None,
        })
    }

    /// Creates a competitor whose times still need a repair pass
    pub fn from_original_cum_times(
        order: usize,
        name: impl Into<String>,
        club: impl Into<String>,
        start_time: Option<f64>,
        cum_times: Vec<Option<f64>>,
    ) -> Result<Self> {
        Competitor::new(order, name, club, start_time, cum_times)
    }

    /// Creates a competitor whose times are taken as already repaired
    pub fn from_cum_times(
        order: usize,
        name: impl Into<String>,
        club: impl Into<String>,
        start_time: Option<f64>,
        cum_times: Vec<Option<f64>>,
    ) -> Result<Self> {
        let mut competitor = Competitor::new(order, name, club, start_time, cum_times)?;
        competitor.split_times = Some(competitor.original_split_times.clone());
        competitor.cum_times = Some(competitor.original_cum_times.clone());
        Ok(competitor)
    }

    /// Creates a competitor from split times, taken as already repaired
    pub fn from_split_times(
        order: usize,
        name: impl Into<String>,
        club: impl Into<String>,
        start_time: Option<f64>,
        split_times: &[Option<f64>],
    ) -> Result<Self> {
        Competitor::from_cum_times(order, name, club, start_time, cum_times_from_split_times(split_times))
    }

    // ========================================================================
    // STATUS
    // ========================================================================

    /// Marks the competitor as having a valid result despite missing punches.
    /// The total time becomes the finish time, if there is one.
    pub fn set_ok_despite_missing_times(&mut self) {
        self.is_ok_despite_missing_times = true;
        self.total_time = self.original_cum_times.last().copied().flatten();
    }

    pub fn is_ok_despite_missing_times(&self) -> bool {
        self.is_ok_despite_missing_times
    }

    pub fn total_time(&self) -> Option<f64> {
        self.total_time
    }

    /// Whether the competitor finished with a valid result
    pub fn completed(&self) -> bool {
        self.total_time.is_some() && !self.is_disqualified && !self.is_over_max_time
    }

    /// Whether any time after the start was recorded
    pub fn has_any_times(&self) -> bool {
        self.original_cum_times.iter().skip(1).any(Option::is_some)
    }

    /// Whether there are split times but no start time to anchor them
    pub fn lacks_start_time(&self) -> bool {
        self.start_time.is_none() && self.split_times().iter().any(Option::is_some)
    }

    // ========================================================================
    // TIMES
    // ========================================================================

    pub fn num_controls(&self) -> usize {
        self.original_cum_times.len().saturating_sub(2)
    }

    /// Replaces the working cumulative times with repaired ones
    pub fn set_repaired_cumulative_times(&mut self, cum_times: Vec<Option<f64>>) -> Result<()> {
        self.split_times = Some(split_times_from_cum_times(&cum_times)?);
        self.cum_times = Some(cum_times);
        Ok(())
    }

    /// Whether a repair pass still has to supply repaired times
    pub fn needs_repair(&self) -> bool {
        self.cum_times.is_none()
    }

    /// Repaired cumulative times, or the originals if no repair has happened
    pub fn all_cumulative_times(&self) -> &[Option<f64>] {
        self.cum_times.as_deref().unwrap_or(&self.original_cum_times)
    }

    pub fn all_original_cumulative_times(&self) -> &[Option<f64>] {
        &self.original_cum_times
    }

    /// Repaired split times, or the originals if no repair has happened
    pub fn split_times(&self) -> &[Option<f64>] {
        self.split_times.as_deref().unwrap_or(&self.original_split_times)
    }

    pub fn original_split_times(&self) -> &[Option<f64>] {
        &self.original_split_times
    }

    pub fn get_split_time_to(&self, control_index: usize) -> Option<f64> {
        if control_index == 0 {
            Some(0.0)
        } else {
            self.split_times().get(control_index - 1).copied().flatten()
        }
    }

    pub fn get_original_split_time_to(&self, control_index: usize) -> Option<f64> {
        if control_index == 0 {
            Some(0.0)
        } else {
            self.original_split_times.get(control_index - 1).copied().flatten()
        }
    }

    pub fn get_cumulative_time_to(&self, control_index: usize) -> Option<f64> {
        self.all_cumulative_times().get(control_index).copied().flatten()
    }

    pub fn get_original_cumulative_time_to(&self, control_index: usize) -> Option<f64> {
        self.original_cum_times.get(control_index).copied().flatten()
    }

    pub fn is_split_time_dubious(&self, control_index: usize) -> bool {
        control_index > 0
            && !times_equal(
                self.get_original_split_time_to(control_index),
                self.get_split_time_to(control_index),
            )
    }

    pub fn is_cumulative_time_dubious(&self, control_index: usize) -> bool {
        !times_equal(
            self.get_original_cumulative_time_to(control_index),
            self.get_cumulative_time_to(control_index),
        )
    }

    // ========================================================================
    // RANKS AND TIME LOSSES
    // ========================================================================

    pub fn set_split_and_cumulative_ranks(&mut self, split_ranks: Vec<Option<u32>>, cum_ranks: Vec<Option<u32>>) {
        self.split_ranks = Some(split_ranks);
        self.cum_ranks = Some(cum_ranks);
    }

    pub fn get_split_rank_to(&self, control_index: usize) -> Option<u32> {
        if control_index == 0 {
            return None;
        }
        self.split_ranks.as_ref()?.get(control_index - 1).copied().flatten()
    }

    pub fn get_cumulative_rank_to(&self, control_index: usize) -> Option<u32> {
        if control_index == 0 {
            return None;
        }
        self.cum_ranks.as_ref()?.get(control_index - 1).copied().flatten()
    }

    /// Time lost at a control in seconds. None means not applicable,
    /// NaN means applicable but not computable.
    pub fn get_time_loss_at(&self, control_index: usize) -> Option<f64> {
        if control_index == 0 {
            return None;
        }
        self.time_losses.as_ref()?.get(control_index - 1).copied()
    }

    /// Computes time losses against the fastest split to each control.
    ///
    /// The competitor's typical pace is the median of their split ratios
    /// (split / fastest split); the loss at each control is how far the
    /// split exceeds the fastest split scaled by that pace.
    pub fn determine_time_losses(&mut self, fastest_splits: &[Option<f64>]) -> Result<()> {
        if !self.completed() {
            return Ok(());
        }

        let split_times = self.split_times().to_vec();
        if fastest_splits.len() != split_times.len() {
            return Err(ParseError::invalid(format!(
                "Cannot determine time loss of competitor with {} split times using {} fastest splits",
                split_times.len(),
                fastest_splits.len()
            )));
        }
        if fastest_splits.iter().flatten().any(|s| s.is_nan()) {
            return Err(ParseError::invalid(
                "Cannot determine time loss of competitor when there is a NaN value in the fastest splits",
            ));
        }

        let uncomputable = self.is_ok_despite_missing_times
            || fastest_splits.iter().any(|s| matches!(s, None | Some(0.0)))
            || split_times.iter().any(|s| matches!(s, Some(v) if v.is_nan()));

        if uncomputable {
            self.time_losses = Some(vec![f64::NAN; split_times.len()]);
            return Ok(());
        }

        let pairs: Vec<(f64, f64)> = split_times
            .iter()
            .zip(fastest_splits)
            .filter_map(|(split, fastest)| Some(((*split)?, (*fastest)?)))
            .collect();
        if pairs.len() != split_times.len() {
            self.time_losses = Some(vec![f64::NAN; split_times.len()]);
            return Ok(());
        }

        let mut ratios: Vec<f64> = pairs.iter().map(|(split, fastest)| split / fastest).collect();
        ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let median = median_of_sorted(&ratios);

        self.time_losses = Some(
            pairs
                .iter()
                .map(|(split, fastest)| round_half_up(split - fastest * median))
                .collect(),
        );
        Ok(())
    }

    // ========================================================================
    // COMPARISONS
    // ========================================================================

    /// Whether this competitor and another are ahead of each other at
    /// different points of the race, by absolute time of day. Equal times
    /// at a control count towards neither direction.
    pub fn crosses(&self, other: &Competitor) -> Result<bool> {
        let these = self.all_cumulative_times();
        let those = other.all_cumulative_times();
        if these.len() != those.len() {
            return Err(ParseError::invalid(
                "Two competitors with different numbers of controls cannot cross",
            ));
        }

        let this_start = self.start_time.unwrap_or(0.0);
        let other_start = other.start_time.unwrap_or(0.0);
        let mut before_other = false;
        let mut after_other = false;

        for (this_time, other_time) in these.iter().zip(those) {
            if let (Some(a), Some(b)) = (this_time, other_time) {
                let this_absolute = this_start + a;
                let other_absolute = other_start + b;
                if this_absolute < other_absolute {
                    before_other = true;
                } else if this_absolute > other_absolute {
                    after_other = true;
                }
            }
        }

        Ok(before_other && after_other)
    }

    fn check_reference(&self, reference: &[Option<f64>], purpose: &str) -> Result<()> {
        let own = self.all_cumulative_times();
        if reference.len() != own.len() {
            return Err(ParseError::invalid(format!(
                "Cannot {} because the numbers of times are different ({} and {})",
                purpose,
                own.len(),
                reference.len()
            )));
        }
        if reference.iter().any(Option::is_none) {
            return Err(ParseError::invalid(format!(
                "Cannot {} because a null value is in the reference data",
                purpose
            )));
        }
        Ok(())
    }

    /// Cumulative times minus a reference competitor's cumulative times
    pub fn get_cum_times_adjusted_to_reference(&self, reference: &[Option<f64>]) -> Result<Vec<Option<f64>>> {
        self.check_reference(reference, "adjust competitor times")?;
        Ok(self
            .all_cumulative_times()
            .iter()
            .zip(reference)
            .map(|(time, reference_time)| subtract_if_not_null(*time, *reference_time))
            .collect())
    }

    /// As `get_cum_times_adjusted_to_reference`, shifted by the start time
    pub fn get_cum_times_adjusted_to_reference_with_start_added(
        &self,
        reference: &[Option<f64>],
    ) -> Result<Vec<Option<f64>>> {
        let start_time = self.start_time;
        Ok(self
            .get_cum_times_adjusted_to_reference(reference)?
            .into_iter()
            .map(|time| add_if_not_null(time, start_time))
            .collect())
    }

    /// How far behind the reference each split is, as a percentage of the
    /// reference split. The start is always 0.
    pub fn get_split_percents_behind_reference_cum_times(
        &self,
        reference: &[Option<f64>],
    ) -> Result<Vec<Option<f64>>> {
        self.check_reference(reference, "determine percentages-behind")?;

        let mut percents = vec![Some(0.0)];
        for (index, split) in self.split_times().iter().enumerate() {
            let reference_split = subtract_if_not_null(reference[index + 1], reference[index]);
            percents.push(match (split, reference_split) {
                (Some(split), Some(reference_split)) if reference_split > 0.0 => {
                    Some(100.0 * (split - reference_split) / reference_split)
                }
                _ => None,
            });
        }
        Ok(percents)
    }

    // ========================================================================
    // OMITTED TIMES
    // ========================================================================

    /// Ranges around runs of omitted cumulative times
    pub fn get_control_indexes_around_omitted_cumulative_times(&self) -> Vec<ControlIndexRange> {
        indexes_around_omitted_times(self.all_cumulative_times(), self.is_ok_despite_missing_times)
    }

    /// Ranges around runs of omitted split times
    pub fn get_control_indexes_around_omitted_split_times(&self) -> Vec<ControlIndexRange> {
        let mut times = vec![Some(0.0)];
        times.extend_from_slice(self.split_times());
        indexes_around_omitted_times(&times, self.is_ok_despite_missing_times)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn median_of_sorted(values: &[f64]) -> f64 {
    let len = values.len();
    if len == 0 {
        f64::NAN
    } else if len % 2 == 1 {
        values[len / 2]
    } else {
        (values[len / 2 - 1] + values[len / 2]) / 2.0
    }
}

/// Rounds .5 towards positive infinity
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Finds interior runs of omitted times and returns the indexes of the
/// present times either side. A time is omitted if it is NaN, or if it is
/// missing and the competitor is OK despite missing times. Runs touching
/// either end, or bordered by a missing time, are not reported.
fn indexes_around_omitted_times(times: &[Option<f64>], missing_is_omitted: bool) -> Vec<ControlIndexRange> {
    let is_omitted = |time: Option<f64>| match time {
        Some(t) => t.is_nan(),
        None => missing_is_omitted,
    };

    let mut ranges = Vec::new();
    let mut start_index = 1;
    while start_index + 1 < times.len() {
        if is_omitted(times[start_index]) {
            let mut end_index = start_index;
            while end_index + 1 < times.len() && is_omitted(times[end_index + 1]) {
                end_index += 1;
            }

            if end_index + 1 < times.len()
                && times[start_index - 1].is_some()
                && times[end_index + 1].is_some()
            {
                ranges.push(ControlIndexRange {
                    start: start_index - 1,
                    end: end_index + 1,
                });
            }

            start_index = end_index + 1;
        } else {
            start_index += 1;
        }
    }

    ranges
}

/// Sort order for competitors: disqualified last, then by total time with
/// missing totals after present ones, ties broken by input order
pub fn compare_competitors(a: &Competitor, b: &Competitor) -> Ordering {
    if a.is_disqualified != b.is_disqualified {
        return if a.is_disqualified { Ordering::Greater } else { Ordering::Less };
    }

    match (a.total_time, b.total_time) {
        (x, y) if times_equal(x, y) => a.order.cmp(&b.order),
        (None, _) => Ordering::Greater,
        (_, None) => Ordering::Less,
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or_else(|| a.order.cmp(&b.order)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
