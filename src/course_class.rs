use crate::competitor::Competitor;
use crate::error::{ParseError, Result};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// The fastest split to one control within a class
#[derive(Debug, Clone, PartialEq)]
pub struct FastestSplit {
    pub split: f64,
    pub name: String,
}

/// A competitor seen at a control within a window of time of day
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitorAtControl {
    pub name: String,
    pub class_name: String,
    /// Seconds past midnight
    pub time: f64,
}

/// A group of competitors running the same course under one class name
#[derive(Debug, Clone)]
pub struct CourseClass {
    pub name: String,
    pub num_controls: usize,
    pub competitors: Vec<Competitor>,
    /// Index of the owning course within the event's courses
    pub course: Option<usize>,
    pub has_dubious_data: bool,
}

impl CourseClass {
    /// Creates a class and stamps its name onto each competitor
    pub fn new(name: impl Into<String>, num_controls: usize, mut competitors: Vec<Competitor>) -> Self {
        let name = name.into();
        for competitor in &mut competitors {
            competitor.class_name = Some(name.clone());
        }

        CourseClass {
            name,
            num_controls,
            competitors,
            course: None,
            has_dubious_data: false,
        }
    }

    pub fn record_has_dubious_data(&mut self) {
        self.has_dubious_data = true;
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }

    pub fn set_course(&mut self, course: usize) {
        self.course = Some(course);
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    /// The fastest split to a control (1 to num_controls + 1), ignoring
    /// missing and dubious splits. None if nobody has a usable split.
    pub fn get_fastest_split_to(&self, control_index: usize) -> Result<Option<FastestSplit>> {
        if control_index < 1 || control_index > self.num_controls + 1 {
            return Err(ParseError::invalid(format!(
                "Cannot return splits to leg '{}' in a course with {} control(s)",
                control_index, self.num_controls
            )));
        }

        let mut fastest: Option<FastestSplit> = None;
        for competitor in &self.competitors {
            let Some(split) = competitor.get_split_time_to(control_index).filter(|s| !s.is_nan()) else {
                continue;
            };
            match &fastest {
                Some(current) if current.split <= split => {}
                _ => {
                    fastest = Some(FastestSplit {
                        split,
                        name: competitor.name.clone(),
                    })
                }
            }
        }

        Ok(fastest)
    }

    /// Competitors whose time of day at a control falls within
    /// `[interval_start, interval_end]`. Competitors without a start time
    /// are never included.
    pub fn get_competitors_at_control_in_time_range(
        &self,
        control_num: usize,
        interval_start: f64,
        interval_end: f64,
    ) -> Result<Vec<CompetitorAtControl>> {
        if control_num > self.num_controls + 1 {
            return Err(ParseError::invalid(format!(
                "Control number must be a number between 0 and {} inclusive",
                self.num_controls + 1
            )));
        }

        Ok(self
            .competitors
            .iter()
            .filter_map(|competitor| {
                let time = competitor.get_cumulative_time_to(control_num)? + competitor.start_time?;
                (interval_start <= time && time <= interval_end).then(|| CompetitorAtControl {
                    name: competitor.name.clone(),
                    class_name: self.name.clone(),
                    time,
                })
            })
            .collect())
    }

    // ========================================================================
    // DERIVED DATA
    // ========================================================================

    /// Fastest split to every control, None where nobody has a usable split
    pub fn fastest_splits(&self) -> Result<Vec<Option<f64>>> {
        (1..=self.num_controls + 1)
            .map(|control| Ok(self.get_fastest_split_to(control)?.map(|f| f.split)))
            .collect()
    }

    /// Computes each competitor's time losses against the class's fastest splits
    pub fn determine_time_losses(&mut self) -> Result<()> {
        let fastest = self.fastest_splits()?;
        for competitor in &mut self.competitors {
            competitor.determine_time_losses(&fastest)?;
        }
        Ok(())
    }

    /// Ranks every competitor's split and cumulative time at each control.
    /// Missing and dubious times are unranked; equal times share a rank.
    pub fn compute_ranks(&mut self) {
        let num_legs = self.num_controls + 1;
        let splits: Vec<Vec<Option<f64>>> = (1..=num_legs)
            .map(|c| self.competitors.iter().map(|comp| comp.get_split_time_to(c)).collect())
            .collect();
        let cums: Vec<Vec<Option<f64>>> = (1..=num_legs)
            .map(|c| self.competitors.iter().map(|comp| comp.get_cumulative_time_to(c)).collect())
            .collect();

        let split_ranks: Vec<Vec<Option<u32>>> = splits.iter().map(|times| rank_times(times)).collect();
        let cum_ranks: Vec<Vec<Option<u32>>> = cums.iter().map(|times| rank_times(times)).collect();

        for (index, competitor) in self.competitors.iter_mut().enumerate() {
            competitor.set_split_and_cumulative_ranks(
                split_ranks.iter().map(|leg| leg[index]).collect(),
                cum_ranks.iter().map(|leg| leg[index]).collect(),
            );
        }
    }
}

/// 1-based standard competition ranking of the usable times
fn rank_times(times: &[Option<f64>]) -> Vec<Option<u32>> {
    let valid: Vec<f64> = times
        .iter()
        .filter_map(|t| t.filter(|v| !v.is_nan()))
        .collect();

    times
        .iter()
        .map(|time| {
            let time = time.filter(|v| !v.is_nan())?;
            let faster = valid.iter().filter(|&&other| other < time).count();
            u32::try_from(faster + 1).ok()
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn competitor(order: usize, name: &str, start: Option<f64>, cum: Vec<Option<f64>>) -> Competitor {
        Competitor::from_cum_times(order, name, "ABC", start, cum).unwrap()
    }

    fn sample_class() -> CourseClass {
        CourseClass::new(
            "Test class",
            3,
            vec![
                competitor(1, "Fred Brown", Some(36000.0), vec![Some(0.0), Some(81.0), Some(278.0), Some(385.0), Some(491.0)]),
                competitor(2, "John Smith", Some(36060.0), vec![Some(0.0), Some(65.0), Some(286.0), Some(470.0), Some(570.0)]),
                competitor(3, "Bill Baker", Some(36120.0), vec![Some(0.0), Some(78.0), None, Some(390.0), Some(460.0)]),
            ],
        )
    }

    #[test]
    fn test_new_sets_class_name_on_competitors() {
        let class = sample_class();
        assert!(class.competitors.iter().all(|c| c.class_name.as_deref() == Some("Test class")));
        assert!(!class.is_empty());
        assert!(CourseClass::new("Empty", 3, vec![]).is_empty());
    }

    #[test]
    fn test_record_dubious_data() {
        let mut class = sample_class();
        assert!(!class.has_dubious_data);
        class.record_has_dubious_data();
        assert!(class.has_dubious_data);
    }

    #[test]
    fn test_fastest_split_to() {
        let class = sample_class();
        assert_eq!(
            class.get_fastest_split_to(1).unwrap(),
            Some(FastestSplit { split: 65.0, name: "John Smith".to_string() })
        );
        assert_eq!(class.get_fastest_split_to(2).unwrap().unwrap().split, 197.0);
        assert_eq!(class.get_fastest_split_to(3).unwrap().unwrap().name, "Fred Brown");
        assert_eq!(class.get_fastest_split_to(4).unwrap().unwrap().split, 70.0);
        assert!(class.get_fastest_split_to(0).is_err());
        assert!(class.get_fastest_split_to(5).is_err());
    }

    #[test]
    fn test_fastest_split_to_skips_dubious_splits() {
        let class = CourseClass::new(
            "Test class",
            1,
            vec![
                competitor(1, "A", None, vec![Some(0.0), Some(f64::NAN), Some(150.0)]),
                competitor(2, "B", None, vec![Some(0.0), Some(80.0), Some(160.0)]),
            ],
        );
        assert_eq!(
            class.get_fastest_split_to(1).unwrap(),
            Some(FastestSplit { split: 80.0, name: "B".to_string() })
        );
    }

    #[test]
    fn test_fastest_split_to_with_no_data() {
        let class = CourseClass::new("Test class", 1, vec![competitor(1, "A", None, vec![Some(0.0), None, None])]);
        assert_eq!(class.get_fastest_split_to(1).unwrap(), None);
    }

    #[test]
    fn test_competitors_at_control_in_time_range() {
        let class = sample_class();
        let found = class
            .get_competitors_at_control_in_time_range(1, 36070.0, 36100.0)
            .unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fred Brown"]);
        assert_eq!(found[0].time, 36081.0);

        let at_two = class
            .get_competitors_at_control_in_time_range(2, 36000.0, 40000.0)
            .unwrap();
        assert_eq!(at_two.len(), 2);

        assert!(class.get_competitors_at_control_in_time_range(5, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_determine_time_losses() {
        let mut class = sample_class();
        class.determine_time_losses().unwrap();
        let fred = &class.competitors[0];
        assert!(fred.get_time_loss_at(1).is_some());
        let bill = &class.competitors[2];
        assert_eq!(bill.get_time_loss_at(2), None);
    }

    #[test]
    fn test_compute_ranks() {
        let mut class = sample_class();
        class.compute_ranks();
        let ranks: Vec<Option<u32>> = class.competitors.iter().map(|c| c.get_split_rank_to(1)).collect();
        assert_eq!(ranks, vec![Some(3), Some(1), Some(2)]);
        assert_eq!(class.competitors[2].get_split_rank_to(2), None);
        assert_eq!(class.competitors[2].get_cumulative_rank_to(4), Some(1));
    }

    #[test]
    fn test_rank_times_ties_share_rank() {
        assert_eq!(
            rank_times(&[Some(10.0), Some(5.0), Some(10.0), None, Some(f64::NAN)]),
            vec![Some(2), Some(1), Some(2), None, None]
        );
    }
}
