use std::collections::HashMap;
use std::sync::LazyLock;

use csv::{ReaderBuilder, StringRecord};
use regex::Regex;

use crate::competitor::{compare_competitors, Competitor};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{normalise_line_endings, parse_time};

const DELIMITERS: [u8; 2] = [b',', b';'];

// Triple-column layout: code, cumulative time and an unused points column
// per control, starting at column AM. The last triple is the finish.
const CONTROLS_OFFSET: usize = 38;
const STEP: usize = 3;
const NAME: usize = 3;
const CLUB: usize = 5;
const COURSE_NAME: usize = 7;
const START_TIME: usize = 8;

static CONTROL_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());
static CONTINUED_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s\S").unwrap());

/// Reads sparse triple-column CSV exports, one competitor per row, with
/// the course's controls repeated on every row
pub struct AltCsvReader;

impl EventReader for AltCsvReader {
    fn name(&self) -> &'static str {
        "alternative CSV"
    }

    fn sniff(&self, text: &str) -> bool {
        text.lines().nth(1).is_some_and(|line| determine_delimiter(line).is_some())
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_triple_column_event(text)
    }
}

fn split_trimmed(line: &str, delimiter: u8) -> Vec<String> {
    let mut parts: Vec<String> = line.split(char::from(delimiter)).map(str::to_string).collect();
    trim_trailing_empty_cells(&mut parts);
    parts
}

fn trim_trailing_empty_cells(row: &mut Vec<String>) {
    while row.last().is_some_and(String::is_empty) {
        row.pop();
    }
}

fn determine_delimiter(first_data_line: &str) -> Option<u8> {
    DELIMITERS
        .iter()
        .copied()
        .find(|&d| split_trimmed(first_data_line, d).len() > CONTROLS_OFFSET)
}

/// Names containing the delimiter spill into the following columns, each
/// piece starting with a space. Glue them back together.
fn merge_multiple_competitor_names(row: &mut Vec<String>) {
    while row.len() > NAME + 1 && CONTINUED_NAME.is_match(&row[NAME + 1]) {
        let continued = row.remove(NAME + 1);
        row[NAME].push(',');
        row[NAME].push_str(&continued);
    }
}

fn check_control_codes_alphanumeric(first_data_line: &str, delimiter: u8) -> Result<()> {
    let mut row = split_trimmed(first_data_line, delimiter);
    merge_multiple_competitor_names(&mut row);

    let mut index = CONTROLS_OFFSET;
    while index + STEP < row.len() {
        if !CONTROL_CODE.is_match(&row[index]) {
            return Err(ParseError::wrong_format(format!(
                "Data appears not to be in an alternative CSV format - data in cell {} of the first row ('{}') is not an number",
                index, row[index]
            )));
        }
        index += STEP;
    }
    Ok(())
}

#[derive(Debug)]
struct ClassRecord {
    controls: Vec<String>,
    competitors: Vec<Competitor>,
}

pub fn parse_triple_column_event(text: &str) -> Result<Event> {
    let text = normalise_line_endings(text);
    let first_data_line = text
        .split('\n')
        .nth(1)
        .ok_or_else(|| ParseError::wrong_format("Data appears not to be in an alternative CSV format - too few lines"))?;

    let delimiter = determine_delimiter(first_data_line).ok_or_else(|| {
        ParseError::wrong_format(format!(
            "Data appears not to be in an alternative CSV format - first data line has fewer than {} parts when separated by any recognised delimiter",
            CONTROLS_OFFSET
        ))
    })?;
    check_control_codes_alphanumeric(first_data_line, delimiter)?;

    // Names are not quoted, so quotes carry no meaning here
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut classes: Vec<(String, ClassRecord)> = Vec::new();
    let mut class_lookup: HashMap<String, usize> = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::invalid(format!("Could not read row: {}", e)))?;
        read_data_row(&record, &mut classes, &mut class_lookup)?;
    }

    Ok(create_classes_and_courses(classes))
}

fn read_data_row(
    record: &StringRecord,
    classes: &mut Vec<(String, ClassRecord)>,
    class_lookup: &mut HashMap<String, usize>,
) -> Result<()> {
    let mut row: Vec<String> = record.iter().map(str::to_string).collect();
    trim_trailing_empty_cells(&mut row);
    merge_multiple_competitor_names(&mut row);

    // Blank lines and rows with no control data at all
    if row.len() <= CONTROLS_OFFSET {
        return Ok(());
    }
    // Competitor might be missing the cumulative time to the last control
    while (row.len() - CONTROLS_OFFSET) % STEP != 0 {
        row.push(String::new());
    }

    let course_name = row[COURSE_NAME].clone();
    let start_time = parse_time(&row[START_TIME]);
    let mut cum_times = vec![Some(0.0)];
    cum_times.extend(row.iter().skip(CONTROLS_OFFSET + 1).step_by(STEP).map(|t| parse_time(t)));

    let existing = class_lookup.get(&course_name).copied();
    let order = existing.map_or(1, |index| classes[index].1.competitors.len() + 1);
    let mut competitor =
        Competitor::from_original_cum_times(order, row[NAME].as_str(), row[CLUB].as_str(), start_time, cum_times)?;
    if !competitor.has_any_times() {
        competitor.is_non_starter = true;
    }

    match existing {
        Some(index) => {
            let class = &mut classes[index].1;
            let expected = class.controls.len() + 1;
            let actual = competitor.all_original_cumulative_times().len() - 1;
            if actual != expected {
                return Err(ParseError::invalid(format!(
                    "Competitor '{}' has the wrong number of splits for course '{}': expected {}, actual {}",
                    competitor.name, course_name, expected, actual
                )));
            }
            class.competitors.push(competitor);
        }
        None => {
            // Every triple but the last, which is the finish
            let controls = row
                .iter()
                .take(row.len() - STEP)
                .skip(CONTROLS_OFFSET)
                .step_by(STEP)
                .cloned()
                .collect();
            class_lookup.insert(course_name.clone(), classes.len());
            classes.push((
                course_name,
                ClassRecord {
                    controls,
                    competitors: vec![competitor],
                },
            ));
        }
    }
    Ok(())
}

/// Classes with the same list of controls share a course, named after the
/// first of them
fn create_classes_and_courses(classes: Vec<(String, ClassRecord)>) -> Event {
    let mut course_classes = Vec::with_capacity(classes.len());
    let mut courses_by_controls: Vec<(Vec<String>, String, Vec<usize>)> = Vec::new();

    for (index, (name, mut record)) in classes.into_iter().enumerate() {
        record.competitors.sort_by(compare_competitors);
        course_classes.push(CourseClass::new(name.clone(), record.controls.len(), record.competitors));

        match courses_by_controls.iter_mut().find(|(controls, _, _)| *controls == record.controls) {
            Some((_, _, class_indexes)) => class_indexes.push(index),
            None => courses_by_controls.push((record.controls, name, vec![index])),
        }
    }

    let courses = courses_by_controls
        .into_iter()
        .map(|(controls, name, class_indexes)| Course::new(name, class_indexes, None, None, Some(controls)))
        .collect();

    Event::new(course_classes, courses)
}

// ============================================================================
// TESTS
// ============================================================================
