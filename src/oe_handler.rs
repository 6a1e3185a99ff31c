use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::competitor::{compare_competitors, Competitor, Gender};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{
    is_blank_or_time, normalise_line_endings, parse_course_climb, parse_course_length, parse_leading_int, parse_time,
};

const DELIMITERS: [char; 4] = [';', ',', '\t', '\\'];

/// Rows shorter than this cannot hold the columns before the controls
pub const MIN_CONTROLS_OFFSET: usize = 37;

static CONTROL_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

// ============================================================================
// COLUMN LAYOUTS
// ============================================================================

/// Column positions for one variation of the OE export.
///
/// Variations are named after the column holding the first control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OeLayout {
    pub control1: usize,
    pub course: usize,
    pub distance: usize,
    pub climb: usize,
    pub control_count: usize,
    pub placing: usize,
    pub start_punch: usize,
    pub finish: usize,
    pub non_competitive: usize,
    pub start_time: usize,
    pub time: usize,
    pub classifier: usize,
    pub club: usize,
    pub class_name: usize,
    pub year_of_birth: usize,
    pub combined_name: Option<usize>,
    pub forename: Option<usize>,
    pub surname: Option<usize>,
    pub gender: Option<usize>,
    pub class_name_fallback: Option<usize>,
    pub club_fallback: Option<usize>,
}

const fn layout_with_control1_at(offset: usize) -> OeLayout {
    OeLayout {
        control1: offset,
        course: offset - 7,
        distance: offset - 6,
        climb: offset - 5,
        control_count: offset - 4,
        placing: offset - 3,
        start_punch: offset - 2,
        finish: offset - 1,
        non_competitive: offset - 38,
        start_time: offset - 37,
        time: offset - 35,
        classifier: offset - 34,
        club: offset - 31,
        class_name: offset - 28,
        year_of_birth: 0,
        combined_name: None,
        forename: None,
        surname: None,
        gender: None,
        class_name_fallback: None,
        club_fallback: None,
    }
}

/// 44 columns: one combined name column
pub const OE_LAYOUT_44: OeLayout = OeLayout {
    combined_name: Some(3),
    year_of_birth: 4,
    ..layout_with_control1_at(44)
};

/// 46 columns: separate surname and forename
pub const OE_LAYOUT_46: OeLayout = OeLayout {
    surname: Some(3),
    forename: Some(4),
    year_of_birth: 5,
    gender: Some(6),
    ..layout_with_control1_at(46)
};

/// 60 columns, the 'nameless' variation of later OE versions
pub const OE_LAYOUT_60: OeLayout = OeLayout {
    combined_name: Some(3),
    surname: Some(5),
    forename: Some(6),
    year_of_birth: 7,
    gender: Some(8),
    non_competitive: 10,
    start_time: 11,
    time: 13,
    classifier: 14,
    club: 20,
    class_name: 26,
    class_name_fallback: Some(60 - 7),
    club_fallback: Some(18),
    ..layout_with_control1_at(60)
};

pub const OE_LAYOUTS: [OeLayout; 3] = [OE_LAYOUT_44, OE_LAYOUT_46, OE_LAYOUT_60];

// ============================================================================
// READER
// ============================================================================

/// Reads OE-style delimited exports
pub struct OeReader;

impl EventReader for OeReader {
    fn name(&self) -> &'static str {
        "OE"
    }

    fn sniff(&self, text: &str) -> bool {
        text.lines().nth(1).is_some_and(|line| identify_delimiter(line).is_some())
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_oe_event(text)
    }
}

pub fn parse_oe_event(text: &str) -> Result<Event> {
    let text = normalise_line_endings(text);
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= 1 {
        return Err(ParseError::wrong_format("No data found to read"));
    }

    let delimiter = identify_delimiter(lines[1])
        .ok_or_else(|| ParseError::wrong_format("Data appears not to be in the OE CSV format"))?;
    let layout = identify_layout(lines[1], delimiter)?;

    let mut builder = OeEventBuilder::new(layout);
    for (index, line) in lines.iter().enumerate().skip(1) {
        builder.read_line(line, index, delimiter)?;
    }
    Ok(builder.build())
}

/// The first delimiter that splits a data line into enough columns
fn identify_delimiter(line: &str) -> Option<char> {
    DELIMITERS
        .iter()
        .copied()
        .find(|&d| line.split(d).count() > MIN_CONTROLS_OFFSET)
}

/// Finds the layout with a control code where control 1 should be, blanks
/// or times in the two columns before it, and a control count
fn identify_layout(line: &str, delimiter: char) -> Result<OeLayout> {
    let row: Vec<&str> = line.split(delimiter).collect();
    OE_LAYOUTS
        .iter()
        .copied()
        .find(|layout| {
            layout.control1 < row.len()
                && CONTROL_CODE.is_match(row[layout.control1])
                && is_blank_or_time(row[layout.control1 - 2])
                && is_blank_or_time(row[layout.control1 - 1])
                // No control count suggests a triple-column file instead
                && !row[layout.control_count].trim().is_empty()
        })
        .ok_or_else(|| ParseError::wrong_format("Did not find control 1 at any of the supported indexes"))
}

fn dequote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].replace("\"\"", "\"").trim().to_string()
    } else {
        value.to_string()
    }
}

/// A cell by index, or "" past the end of the row
fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

fn strip_suffix_trimmed(value: &str, suffix: &str) -> String {
    match value.strip_suffix(suffix) {
        Some(stripped) if !suffix.is_empty() => stripped.trim().to_string(),
        _ => value.to_string(),
    }
}

#[derive(Debug)]
struct ClassRecord {
    num_controls: usize,
    competitors: Vec<Competitor>,
}

#[derive(Debug)]
struct CourseDetails {
    length: Option<f64>,
    climb: Option<i64>,
    controls: Vec<String>,
}

struct OeEventBuilder {
    layout: OeLayout,
    classes: BTreeMap<String, ClassRecord>,
    course_details: HashMap<String, CourseDetails>,
    /// Every (class, course) combination seen, in order of first appearance.
    /// One course may serve many classes and one class may span several
    /// courses.
    class_course_pairs: Vec<(String, String)>,
}

impl OeEventBuilder {
    fn new(layout: OeLayout) -> Self {
        OeEventBuilder {
            layout,
            classes: BTreeMap::new(),
            course_details: HashMap::new(),
            class_course_pairs: Vec::new(),
        }
    }

    fn class_name(&self, row: &[String]) -> String {
        let class_name = cell(row, self.layout.class_name);
        match self.layout.class_name_fallback {
            Some(fallback) if class_name.is_empty() => cell(row, fallback).to_string(),
            _ => class_name.to_string(),
        }
    }

    fn start_time(&self, row: &[String]) -> Option<f64> {
        let start_punch = cell(row, self.layout.start_punch);
        if start_punch.is_empty() {
            parse_time(cell(row, self.layout.start_time))
        } else {
            parse_time(start_punch)
        }
    }

    fn num_controls(&self, row: &[String], class_name: &str, line_number: usize) -> Result<usize> {
        if class_name.trim().is_empty() {
            return Err(ParseError::invalid(format!(
                "Line {} does not contain a class for the competitor",
                line_number
            )));
        }

        let count_str = cell(row, self.layout.control_count);
        let row_count = parse_leading_int(count_str).and_then(|n| usize::try_from(n).ok());

        if let Some(class) = self.classes.get(class_name) {
            return match row_count {
                Some(count) if count != class.num_controls => Err(ParseError::invalid(format!(
                    "Line {} has {} controls but class '{}' has {}",
                    line_number, count, class_name, class.num_controls
                ))),
                _ => Ok(class.num_controls),
            };
        }

        row_count.ok_or_else(|| {
            ParseError::invalid(format!(
                "Could not read control count '{}' from line {}",
                count_str, line_number
            ))
        })
    }

    fn cumulative_times(&self, row: &[String], num_controls: usize) -> Vec<Option<f64>> {
        let mut cum_times = vec![Some(0.0)];
        for control in 0..num_controls {
            let index = self.layout.control1 + 1 + 2 * control;
            cum_times.push(row.get(index).and_then(|s| parse_time(s)));
        }

        // Nameless variation has no total time, so work it out from the punches
        let total_time = parse_time(cell(row, self.layout.time)).or_else(|| {
            let start = self.start_time(row)?;
            let finish = parse_time(cell(row, self.layout.finish))?;
            Some(finish - start)
        });
        cum_times.push(total_time);
        cum_times
    }

    fn read_line(&mut self, line: &str, line_number: usize, delimiter: char) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        let row: Vec<String> = line.split(delimiter).map(|s| dequote(s.trim())).collect();
        if row.len() < MIN_CONTROLS_OFFSET {
            return Err(ParseError::invalid(format!(
                "Too few items on line {} of the input file: expected at least {}, got {}",
                line_number,
                MIN_CONTROLS_OFFSET,
                row.len()
            )));
        }

        let class_name = self.class_name(&row);
        let num_controls = self.num_controls(&row, &class_name, line_number)?;
        let cum_times = self.cumulative_times(&row, num_controls);
        let course_name = cell(&row, self.layout.course).to_string();

        self.classes.entry(class_name.clone()).or_insert_with(|| ClassRecord {
            num_controls,
            competitors: Vec::new(),
        });

        if !self.course_details.contains_key(&course_name) {
            let controls = (0..num_controls)
                .map(|control| cell(&row, self.layout.control1 + 2 * control).to_string())
                .collect();
            self.course_details.insert(
                course_name.clone(),
                CourseDetails {
                    length: parse_course_length(cell(&row, self.layout.distance)),
                    climb: parse_course_climb(cell(&row, self.layout.climb)),
                    controls,
                },
            );
        }

        if !self
            .class_course_pairs
            .iter()
            .any(|(class, course)| *class == class_name && *course == course_name)
        {
            self.class_course_pairs.push((class_name.clone(), course_name));
        }

        let competitor = self.create_competitor(&row, &class_name, cum_times)?;
        if let Some(class) = self.classes.get_mut(&class_name) {
            class.competitors.push(competitor);
        }
        Ok(())
    }

    fn create_competitor(&self, row: &[String], class_name: &str, cum_times: Vec<Option<f64>>) -> Result<Competitor> {
        let layout = &self.layout;
        let placing = cell(row, layout.placing);
        // Placings like "mp" or "n/c" are sometimes appended to the name too
        let is_placing_non_numeric = !placing.is_empty() && parse_leading_int(placing).is_none();

        let mut club = cell(row, layout.club).to_string();
        if let Some(fallback) = layout.club_fallback.filter(|_| club.is_empty()) {
            club = cell(row, fallback).to_string();
        }

        let mut name = String::new();
        if let (Some(forename), Some(surname)) = (layout.forename, layout.surname) {
            let mut surname = cell(row, surname).to_string();
            if is_placing_non_numeric {
                surname = strip_suffix_trimmed(&surname, placing);
            }
            name = format!("{} {}", cell(row, forename), surname).trim().to_string();
        }
        if let Some(combined) = layout.combined_name.filter(|_| name.is_empty()) {
            name = cell(row, combined).to_string();
            if is_placing_non_numeric {
                name = strip_suffix_trimmed(&name, placing);
            }
        }

        let order = self.classes.get(class_name).map_or(0, |c| c.competitors.len()) + 1;
        let mut competitor =
            Competitor::from_original_cum_times(order, name, club, self.start_time(row), cum_times)?;

        if (cell(row, layout.non_competitive) == "1" || is_placing_non_numeric) && competitor.completed() {
            competitor.is_non_competitive = true;
        }

        match cell(row, layout.classifier) {
            "" | "0" => {
                if !competitor.has_any_times() {
                    competitor.is_non_starter = true;
                } else if cell(row, layout.classifier) == "0"
                    && competitor.total_time().is_none()
                    && competitor.all_original_cumulative_times().last().copied().flatten().is_some()
                {
                    // Classified OK by the organisers despite a missing punch
                    competitor.set_ok_despite_missing_times();
                }
            }
            "1" => competitor.is_non_starter = true,
            "2" => competitor.is_non_finisher = true,
            "4" => competitor.is_disqualified = true,
            "5" => competitor.is_over_max_time = true,
            other => warn!(classifier = other, name = %competitor.name, "unrecognised OE classifier"),
        }

        let year_of_birth = cell(row, layout.year_of_birth);
        if !year_of_birth.is_empty() {
            competitor.year_of_birth = parse_leading_int(year_of_birth).and_then(|y| i32::try_from(y).ok());
        }
        if let Some(gender) = layout.gender {
            competitor.gender = Gender::from_code(cell(row, gender));
        }

        Ok(competitor)
    }

    fn build(self) -> Event {
        let OeEventBuilder {
            classes: class_records,
            course_details,
            class_course_pairs,
            ..
        } = self;

        let mut class_indexes = HashMap::new();
        let mut classes = Vec::with_capacity(class_records.len());
        for (index, (name, mut record)) in class_records.into_iter().enumerate() {
            record.competitors.sort_by(compare_competitors);
            class_indexes.insert(name.clone(), index);
            classes.push(CourseClass::new(name, record.num_controls, record.competitors));
        }

        let courses = link_classes_and_courses(&class_course_pairs)
            .into_iter()
            .map(|(course_name, class_names)| {
                let details = course_details.get(&course_name);
                Course::new(
                    course_name.clone(),
                    class_names.iter().filter_map(|c| class_indexes.get(c).copied()).collect(),
                    details.and_then(|d| d.length),
                    details.and_then(|d| d.climb),
                    details.map(|d| d.controls.clone()),
                )
            })
            .collect();

        Event::new(classes, courses)
    }
}

// ============================================================================
// CLASS / COURSE LINKING
// ============================================================================

/// Groups classes and courses that are connected through any chain of
/// shared (class, course) pairs. Each group becomes one course, named after
/// the first course of the group to appear, holding every class in the
/// group.
pub fn link_classes_and_courses(pairs: &[(String, String)]) -> Vec<(String, Vec<String>)> {
    let mut courses_to_classes: Vec<(&str, Vec<&str>)> = Vec::new();
    let mut classes_to_courses: HashMap<&str, Vec<&str>> = HashMap::new();
    for (class_name, course_name) in pairs {
        let (class_name, course_name) = (class_name.as_str(), course_name.as_str());
        match courses_to_classes.iter_mut().find(|(c, _)| *c == course_name) {
            Some((_, classes)) => classes.push(class_name),
            None => courses_to_classes.push((course_name, vec![class_name])),
        }
        classes_to_courses.entry(class_name).or_default().push(course_name);
    }
    let course_lookup: HashMap<&str, &Vec<&str>> =
        courses_to_classes.iter().map(|(course, classes)| (*course, classes)).collect();

    let mut done_courses: HashSet<&str> = HashSet::new();
    let mut linked = Vec::new();

    for (initial_course, _) in &courses_to_classes {
        if done_courses.contains(initial_course) {
            continue;
        }

        let mut courses_to_do: VecDeque<&str> = VecDeque::from([*initial_course]);
        let mut classes_to_do: VecDeque<&str> = VecDeque::new();
        let mut related_courses: Vec<&str> = Vec::new();
        let mut related_classes: Vec<&str> = Vec::new();

        while !courses_to_do.is_empty() || !classes_to_do.is_empty() {
            while let Some(course) = courses_to_do.pop_front() {
                for class in course_lookup.get(course).into_iter().flat_map(|c| c.iter()) {
                    if !classes_to_do.contains(class) && !related_classes.contains(class) {
                        classes_to_do.push_back(*class);
                    }
                }
                related_courses.push(course);
            }
            while let Some(class) = classes_to_do.pop_front() {
                for course in classes_to_courses.get(class).into_iter().flat_map(|c| c.iter()) {
                    if !courses_to_do.contains(course) && !related_courses.contains(course) {
                        courses_to_do.push_back(*course);
                    }
                }
                related_classes.push(class);
            }
        }

        done_courses.extend(related_courses.iter().copied());
        linked.push((
            initial_course.to_string(),
            related_classes.iter().map(|c| c.to_string()).collect(),
        ));
    }

    linked
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a delimited OE row for a given layout
    fn row(layout: &OeLayout, fields: &[(usize, &str)], controls: &[(&str, &str)], delimiter: char) -> String {
        let width = (layout.control1 + 2 * controls.len()).max(layout.control1 + 1);
        let mut cells = vec![String::new(); width];
        for (index, value) in fields {
            cells[*index] = value.to_string();
        }
        for (i, (code, time)) in controls.iter().enumerate() {
            cells[layout.control1 + 2 * i] = code.to_string();
            cells[layout.control1 + 2 * i + 1] = time.to_string();
        }
        cells.join(&delimiter.to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn competitor_row_46(
        surname: &str,
        forename: &str,
        club: &str,
        class: &str,
        course: &str,
        start: &str,
        time: &str,
        classifier: &str,
        placing: &str,
        controls: &[(&str, &str)],
    ) -> String {
        let l = &OE_LAYOUT_46;
        row(
            l,
            &[
                (0, "1"),
                (l.surname.unwrap(), surname),
                (l.forename.unwrap(), forename),
                (l.year_of_birth, "1984"),
                (l.gender.unwrap(), "M"),
                (l.start_time, start),
                (l.time, time),
                (l.classifier, classifier),
                (l.club, club),
                (l.class_name, class),
                (l.course, course),
                (l.distance, "4.1"),
                (l.climb, "140"),
                (l.control_count, &controls.len().to_string()),
                (l.placing, placing),
                (l.start_punch, start),
            ],
            controls,
            ';',
        )
    }

    fn header() -> String {
        "header".to_string()
    }

    #[test]
    fn test_parse_46_column_file() {
        let data = [
            header(),
            competitor_row_46("Smith", "John", "ABC", "Class 1", "Course 1", "10:00:00", "06:36", "0", "1",
                &[("208", "01:05"), ("227", "04:06"), ("212", "05:20")]),
            competitor_row_46("Baker", "Fred", "DEF", "Class 1", "Course 1", "10:03:00", "07:01", "0", "2",
                &[("208", "01:15"), ("227", "04:26"), ("212", "05:50")]),
        ]
        .join("\n");

        let event = parse_oe_event(&data).unwrap();
        assert_eq!(event.classes.len(), 1);
        let class = &event.classes[0];
        assert_eq!(class.name, "Class 1");
        assert_eq!(class.num_controls, 3);
        let john = &class.competitors[0];
        assert_eq!(john.name, "John Smith");
        assert_eq!(john.club, "ABC");
        assert_eq!(john.start_time, Some(36000.0));
        assert_eq!(john.year_of_birth, Some(1984));
        assert_eq!(john.gender, Some(Gender::Male));
        assert_eq!(
            john.all_original_cumulative_times(),
            &[Some(0.0), Some(65.0), Some(246.0), Some(320.0), Some(396.0)]
        );
        assert!(john.needs_repair());

        assert_eq!(event.courses.len(), 1);
        let course = &event.courses[0];
        assert_eq!(course.name, "Course 1");
        assert_eq!(course.length, Some(4.1));
        assert_eq!(course.climb, Some(140));
        assert_eq!(
            course.controls,
            Some(vec!["208".to_string(), "227".to_string(), "212".to_string()])
        );
        assert_eq!(class.course, Some(0));
    }

    #[test]
    fn test_parse_44_column_file_with_comma_delimiter() {
        let l = &OE_LAYOUT_44;
        let data = [
            header(),
            row(
                l,
                &[
                    (l.combined_name.unwrap(), "\"John Smith\""),
                    (l.start_time, "10:00:00"),
                    (l.time, "03:00"),
                    (l.club, "ABC"),
                    (l.class_name, "Class 1"),
                    (l.course, "Course 1"),
                    (l.control_count, "1"),
                    (l.placing, "1"),
                ],
                &[("31", "01:30")],
                ',',
            ),
        ]
        .join("\n");

        let event = parse_oe_event(&data).unwrap();
        let john = &event.classes[0].competitors[0];
        assert_eq!(john.name, "John Smith");
        assert_eq!(john.total_time(), Some(180.0));
    }

    #[test]
    fn test_parse_60_column_nameless_file() {
        let l = &OE_LAYOUT_60;
        let data = [
            header(),
            row(
                l,
                &[
                    (l.combined_name.unwrap(), "John Smith"),
                    (l.club_fallback.unwrap(), "ABC"),
                    (l.course, "Course 1"),
                    (l.control_count, "1"),
                    (l.start_punch, "10:00:00"),
                    (l.finish, "10:03:00"),
                ],
                &[("31", "01:30")],
                ';',
            ),
        ]
        .join("\n");

        let event = parse_oe_event(&data).unwrap();
        assert_eq!(event.classes[0].name, "Course 1");
        let john = &event.classes[0].competitors[0];
        assert_eq!(john.club, "ABC");
        assert_eq!(john.total_time(), Some(180.0));
    }

    #[test]
    fn test_classifiers_and_placings() {
        let controls = [("208", "01:05")];
        let data = [
            header(),
            competitor_row_46("Smith", "John", "ABC", "Class 1", "Course 1", "10:00:00", "", "1", "", &[("208", "")]),
            competitor_row_46("Baker", "Fred", "ABC", "Class 1", "Course 1", "10:00:00", "02:00", "2", "", &controls),
            competitor_row_46("Jones", "Jane", "ABC", "Class 1", "Course 1", "10:00:00", "02:00", "4", "", &controls),
            competitor_row_46("Brown", "Jill", "ABC", "Class 1", "Course 1", "10:00:00", "02:00", "5", "", &controls),
            competitor_row_46("Green n/c", "Bob", "ABC", "Class 1", "Course 1", "10:00:00", "02:00", "0", "n/c", &controls),
            competitor_row_46("White", "Sam", "ABC", "Class 1", "Course 1", "", "", "", "", &[("208", "")]),
        ]
        .join("\n");

        let event = parse_oe_event(&data).unwrap();
        let find = |name: &str| {
            event.classes[0]
                .competitors
                .iter()
                .find(|c| c.name == name)
                .unwrap()
                .clone()
        };

        assert!(find("John Smith").is_non_starter);
        assert!(find("Fred Baker").is_non_finisher);
        assert!(find("Jane Jones").is_disqualified);
        assert!(find("Jill Brown").is_over_max_time);
        let bob = find("Bob Green");
        assert!(bob.is_non_competitive);
        assert!(find("Sam White").is_non_starter);
    }

    #[test]
    fn test_ok_despite_missing_times() {
        let data = [
            header(),
            competitor_row_46("Smith", "John", "ABC", "Class 1", "Course 1", "10:00:00", "06:36", "0", "1",
                &[("208", "01:05"), ("227", "-----"), ("212", "05:20")]),
        ]
        .join("\n");
        let event = parse_oe_event(&data).unwrap();
        let john = &event.classes[0].competitors[0];
        assert!(john.is_ok_despite_missing_times());
        assert_eq!(john.total_time(), Some(396.0));
    }

    #[test]
    fn test_classes_sorted_and_courses_linked() {
        let c = [("208", "01:05")];
        let data = [
            header(),
            competitor_row_46("A", "A", "X", "M21E", "1A", "10:00:00", "02:00", "0", "1", &c),
            competitor_row_46("B", "B", "X", "M21E", "1B", "10:00:00", "02:00", "0", "1", &c),
            competitor_row_46("C", "C", "X", "W21E", "1B", "10:00:00", "02:00", "0", "1", &c),
            competitor_row_46("D", "D", "X", "M45", "2", "10:00:00", "02:00", "0", "1", &c),
        ]
        .join("\n");

        let event = parse_oe_event(&data).unwrap();
        let class_names: Vec<&str> = event.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(class_names, vec!["M21E", "M45", "W21E"]);

        assert_eq!(event.courses.len(), 2);
        assert_eq!(event.courses[0].name, "1A");
        assert_eq!(event.courses[0].classes, vec![0, 2]);
        assert_eq!(event.courses[1].name, "2");
        assert_eq!(event.courses[1].classes, vec![1]);
        assert_eq!(event.classes[2].course, Some(0));
    }

    #[test]
    fn test_link_classes_and_courses_chains() {
        let pairs: Vec<(String, String)> = [("C1", "K1"), ("C2", "K2"), ("C2", "K3"), ("C3", "K3"), ("C1", "K4")]
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let linked = link_classes_and_courses(&pairs);
        assert_eq!(
            linked,
            vec![
                ("K1".to_string(), vec!["C1".to_string()]),
                ("K2".to_string(), vec!["C2".to_string(), "C3".to_string()]),
            ]
        );
    }

    #[test]
    fn test_wrong_format() {
        assert!(parse_oe_event("just one line").unwrap_err().is_wrong_format());
        assert!(parse_oe_event("a;b;c\nd;e;f").unwrap_err().is_wrong_format());

        let short = format!("header\n{}", vec!["x"; 50].join(";"));
        assert!(parse_oe_event(&short).unwrap_err().is_wrong_format());
    }

    #[test]
    fn test_short_row_is_invalid() {
        let c = [("208", "01:05")];
        let data = [
            header(),
            competitor_row_46("A", "A", "X", "M21E", "1A", "10:00:00", "02:00", "0", "1", &c),
            "a;b;c".to_string(),
        ]
        .join("\n");
        assert!(matches!(parse_oe_event(&data), Err(ParseError::InvalidData(_))));
    }

    #[test]
    fn test_control_count_differing_from_class_is_invalid() {
        let data = [
            header(),
            competitor_row_46("A", "A", "X", "M21E", "1A", "10:00:00", "02:00", "0", "1", &[("208", "01:05")]),
            competitor_row_46("B", "B", "X", "M21E", "1A", "10:00:00", "03:00", "0", "2",
                &[("208", "01:05"), ("227", "02:10")]),
        ]
        .join("\n");
        let err = parse_oe_event(&data).unwrap_err();
        assert_eq!(err, ParseError::invalid("Line 2 has 2 controls but class 'M21E' has 1"));
    }

    #[test]
    fn test_missing_class_is_invalid() {
        let c = [("208", "01:05")];
        let data = [
            header(),
            competitor_row_46("A", "A", "X", "", "1A", "10:00:00", "02:00", "0", "1", &c),
        ]
        .join("\n");
        assert!(matches!(parse_oe_event(&data), Err(ParseError::InvalidData(_))));
    }
}
