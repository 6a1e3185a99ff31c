use std::fmt;

use crate::course_class::{CompetitorAtControl, CourseClass};
use crate::error::{ParseError, Result};

// ============================================================================
// CONTROL CODES
// ============================================================================

/// A point on a course: the start, the finish, or a control by its code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlCode {
    Start,
    Finish,
    Code(String),
}

impl ControlCode {
    pub fn code(code: impl Into<String>) -> Self {
        ControlCode::Code(code.into())
    }

    fn matches(&self, code: &str) -> bool {
        matches!(self, ControlCode::Code(c) if c == code)
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCode::Start => write!(f, "start"),
            ControlCode::Finish => write!(f, "finish"),
            ControlCode::Code(code) => write!(f, "{}", code),
        }
    }
}

/// The fastest split on a leg for one class
#[derive(Debug, Clone, PartialEq)]
pub struct LegFastestSplit {
    pub name: String,
    pub class_name: String,
    pub split: f64,
}

// ============================================================================
// COURSE
// ============================================================================

/// A physical course, shared by one or more classes.
///
/// Classes live in the event; `classes` holds their indexes. Queries that
/// need class data take the event's class list.
#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub name: String,
    pub classes: Vec<usize>,
    /// Kilometres
    pub length: Option<f64>,
    /// Metres
    pub climb: Option<i64>,
    /// Control codes in order, excluding start and finish
    pub controls: Option<Vec<String>>,
}

impl Course {
    pub fn new(
        name: impl Into<String>,
        classes: Vec<usize>,
        length: Option<f64>,
        climb: Option<i64>,
        controls: Option<Vec<String>>,
    ) -> Self {
        Course {
            name: name.into(),
            classes,
            length,
            climb,
            controls,
        }
    }

    /// Every other class on this course
    pub fn get_other_classes(&self, class_index: usize) -> Result<Vec<usize>> {
        if !self.classes.contains(&class_index) {
            return Err(ParseError::invalid("Course.getOtherClasses: given class is not in this course"));
        }
        Ok(self.classes.iter().copied().filter(|&c| c != class_index).collect())
    }

    pub fn get_num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn has_controls(&self) -> bool {
        self.controls.is_some()
    }

    /// Control code for a control number: 0 is the start, one past the
    /// last control is the finish
    pub fn get_control_code(&self, control_num: usize) -> Result<ControlCode> {
        let controls = self.controls.as_deref().unwrap_or_default();
        if control_num == 0 {
            Ok(ControlCode::Start)
        } else if control_num <= controls.len() {
            Ok(ControlCode::Code(controls[control_num - 1].clone()))
        } else if control_num == controls.len() + 1 {
            Ok(ControlCode::Finish)
        } else {
            Err(ParseError::invalid(format!(
                "Cannot get control code of control {} because it is out of range",
                control_num
            )))
        }
    }

    pub fn uses_leg(&self, start: &ControlCode, end: &ControlCode) -> bool {
        self.get_leg_number(start, end).is_some()
    }

    /// The 1-based number of the leg between two controls, or None if the
    /// leg is not on this course. A course with no controls has the single
    /// leg start to finish.
    pub fn get_leg_number(&self, start: &ControlCode, end: &ControlCode) -> Option<usize> {
        let controls = self.controls.as_ref()?;

        match (start, end) {
            (ControlCode::Start, ControlCode::Finish) => controls.is_empty().then_some(1),
            (ControlCode::Start, _) => controls.first().filter(|c| end.matches(c)).map(|_| 1),
            (_, ControlCode::Finish) => controls
                .last()
                .filter(|c| start.matches(c))
                .map(|_| controls.len() + 1),
            _ => controls
                .windows(2)
                .position(|pair| start.matches(&pair[0]) && end.matches(&pair[1]))
                .map(|index| index + 2),
        }
    }

    /// The fastest split for each class on the course over one leg
    pub fn get_fastest_splits_for_leg(
        &self,
        classes: &[CourseClass],
        start: &ControlCode,
        end: &ControlCode,
    ) -> Result<Vec<LegFastestSplit>> {
        let leg_number = self.get_leg_number(start, end).ok_or_else(|| {
            let start = if *start == ControlCode::Start { "start".to_string() } else { start.to_string() };
            let end = if *end == ControlCode::Finish { "end".to_string() } else { end.to_string() };
            ParseError::invalid(format!("Leg from {} to {} not found in course {}", start, end, self.name))
        })?;

        let mut fastest_splits = Vec::new();
        for class in self.class_refs(classes) {
            if let Some(fastest) = class.get_fastest_split_to(leg_number)? {
                fastest_splits.push(LegFastestSplit {
                    name: fastest.name,
                    class_name: class.name.clone(),
                    split: fastest.split,
                });
            }
        }
        Ok(fastest_splits)
    }

    /// Competitors on this course at a control within a window of time of
    /// day. A course without control codes, or without the given control,
    /// gives nobody.
    pub fn get_competitors_at_control_in_time_range(
        &self,
        classes: &[CourseClass],
        control: &ControlCode,
        interval_start: f64,
        interval_end: f64,
    ) -> Result<Vec<CompetitorAtControl>> {
        let Some(controls) = &self.controls else {
            return Ok(Vec::new());
        };

        let control_num = match control {
            ControlCode::Start => 0,
            ControlCode::Finish => controls.len() + 1,
            ControlCode::Code(code) => match controls.iter().position(|c| c == code) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
        };

        self.get_competitors_at_control_num_in_time_range(classes, control_num, interval_start, interval_end)
    }

    pub fn get_competitors_at_control_num_in_time_range(
        &self,
        classes: &[CourseClass],
        control_num: usize,
        interval_start: f64,
        interval_end: f64,
    ) -> Result<Vec<CompetitorAtControl>> {
        let mut matching = Vec::new();
        for class in self.class_refs(classes) {
            matching.extend(class.get_competitors_at_control_in_time_range(control_num, interval_start, interval_end)?);
        }
        Ok(matching)
    }

    pub fn has_control(&self, code: &str) -> bool {
        self.controls.as_ref().is_some_and(|controls| controls.iter().any(|c| c == code))
    }

    /// The controls that follow a given control. A control visited more
    /// than once can have several.
    pub fn get_next_controls(&self, control: &ControlCode) -> Result<Vec<ControlCode>> {
        let Some(controls) = &self.controls else {
            return Err(ParseError::invalid("Course has no controls"));
        };

        match control {
            ControlCode::Finish => Err(ParseError::invalid("Cannot fetch next control after the finish")),
            ControlCode::Start => Ok(vec![controls
                .first()
                .map_or(ControlCode::Finish, |c| ControlCode::Code(c.clone()))]),
            ControlCode::Code(code) => {
                let next: Vec<ControlCode> = controls
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| *c == code)
                    .map(|(index, _)| {
                        controls
                            .get(index + 1)
                            .map_or(ControlCode::Finish, |c| ControlCode::Code(c.clone()))
                    })
                    .collect();

                if next.is_empty() {
                    Err(ParseError::invalid(format!(
                        "Control '{}' not found on course {}",
                        code, self.name
                    )))
                } else {
                    Ok(next)
                }
            }
        }
    }

    fn class_refs<'a>(&'a self, classes: &'a [CourseClass]) -> impl Iterator<Item = &'a CourseClass> + 'a {
        self.classes.iter().filter_map(move |&index| classes.get(index))
    }
}

// ============================================================================
// TESTS
// ============================================================================
