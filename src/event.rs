use std::cmp::Ordering;

use crate::competitor::Competitor;
use crate::course::{ControlCode, Course, LegFastestSplit};
use crate::course_class::{CompetitorAtControl, CourseClass};
use crate::error::Result;

/// The controls following a given control on one course
#[derive(Debug, Clone, PartialEq)]
pub struct NextControls {
    pub course: usize,
    pub next_controls: Vec<ControlCode>,
}

/// All the classes and courses of one race
#[derive(Debug, Clone, Default)]
pub struct Event {
    pub classes: Vec<CourseClass>,
    pub courses: Vec<Course>,
}

impl Event {
    /// Builds an event and points each class back at its course
    pub fn new(mut classes: Vec<CourseClass>, courses: Vec<Course>) -> Self {
        for (course_index, course) in courses.iter().enumerate() {
            for &class_index in &course.classes {
                if let Some(class) = classes.get_mut(class_index) {
                    class.set_course(course_index);
                }
            }
        }
        Event { classes, courses }
    }

    pub fn course_of(&self, class: &CourseClass) -> Option<&Course> {
        class.course.and_then(|index| self.courses.get(index))
    }

    pub fn competitors(&self) -> impl Iterator<Item = &Competitor> {
        self.classes.iter().flat_map(|class| class.competitors.iter())
    }

    /// Whether any competitor still lacks repaired times
    pub fn needs_repair(&self) -> bool {
        self.competitors().any(Competitor::needs_repair)
    }

    /// Takes the times as read as the repaired times for every competitor
    /// still awaiting repair
    pub fn accept_original_times(&mut self) -> Result<()> {
        for class in &mut self.classes {
            for competitor in class.competitors.iter_mut().filter(|c| c.needs_repair()) {
                let cum_times = competitor.all_original_cumulative_times().to_vec();
                competitor.set_repaired_cumulative_times(cum_times)?;
            }
        }
        Ok(())
    }

    pub fn determine_time_losses(&mut self) -> Result<()> {
        for class in &mut self.classes {
            class.determine_time_losses()?;
        }
        Ok(())
    }

    pub fn compute_ranks(&mut self) {
        for class in &mut self.classes {
            class.compute_ranks();
        }
    }

    /// Fastest splits over a leg from every course that has it, quickest first
    pub fn get_fastest_splits_for_leg(&self, start: &ControlCode, end: &ControlCode) -> Result<Vec<LegFastestSplit>> {
        let mut fastest = Vec::new();
        for course in self.courses.iter().filter(|c| c.uses_leg(start, end)) {
            fastest.extend(course.get_fastest_splits_for_leg(&self.classes, start, end)?);
        }
        fastest.sort_by(|a, b| a.split.partial_cmp(&b.split).unwrap_or(Ordering::Equal));
        Ok(fastest)
    }

    /// Competitors at a control within a window of time of day across all
    /// courses, earliest first
    pub fn get_competitors_at_control_in_time_range(
        &self,
        control: &ControlCode,
        interval_start: f64,
        interval_end: f64,
    ) -> Result<Vec<CompetitorAtControl>> {
        let mut competitors = Vec::new();
        for course in &self.courses {
            competitors.extend(course.get_competitors_at_control_in_time_range(
                &self.classes,
                control,
                interval_start,
                interval_end,
            )?);
        }
        competitors.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap_or(Ordering::Equal));
        Ok(competitors)
    }

    /// For each course containing a control (every course, for the start),
    /// the controls that follow it
    pub fn get_next_controls_after(&self, control: &ControlCode) -> Result<Vec<NextControls>> {
        self.courses
            .iter()
            .enumerate()
            .filter(|(_, course)| match control {
                ControlCode::Code(code) => course.has_control(code),
                _ => true,
            })
            .map(|(index, course)| {
                Ok(NextControls {
                    course: index,
                    next_controls: course.get_next_controls(control)?,
                })
            })
            .collect()
    }
}
