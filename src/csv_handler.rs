use std::sync::LazyLock;

use regex::Regex;

use crate::competitor::{compare_competitors, Competitor};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{normalise_line_endings, parse_leading_int, parse_time};

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<html").unwrap());
static TRAILING_COMMAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",+\n").unwrap());
static FINAL_COMMAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",+$").unwrap());
static FULL_START_TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+:\d\d:\d\d$").unwrap());

/// Reads the simple comma-separated format: blocks of competitors, one per
/// class, each headed by a `class name,control count` line.
///
/// ```text
/// Class 1,3
/// John,Smith,ABC,10:00:00,01:05,03:41,03:04,01:40
/// ```
pub struct CsvReader;

impl EventReader for CsvReader {
    fn name(&self) -> &'static str {
        "CSV"
    }

    fn sniff(&self, text: &str) -> bool {
        !HTML_TAG.is_match(text) && text.contains(',')
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_csv_event(text)
    }
}

// ============================================================================
// EVENT PARSING
// ============================================================================

pub fn parse_csv_event(text: &str) -> Result<Event> {
    if HTML_TAG.is_match(text) {
        return Err(ParseError::wrong_format("Cannot parse this file as CSV as it appears to be HTML"));
    }

    let text = normalise_line_endings(text);
    let text = TRAILING_COMMAS.replace_all(&text, "\n");
    let text = FINAL_COMMAS.replace(&text, "");

    let mut classes = Vec::new();
    for section in text.split("\n\n").map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(class) = parse_course_class(section)? {
            if !class.is_empty() {
                classes.push(class);
            }
        }
    }

    if classes.is_empty() {
        return Err(ParseError::invalid("No competitor data was found"));
    }

    // The format has no course lengths, climbs or control codes
    let courses = classes
        .iter()
        .enumerate()
        .map(|(index, class)| Course::new(class.name.clone(), vec![index], None, None, None))
        .collect();

    Ok(Event::new(classes, courses))
}

/// Parses one class block. A negative control count on a block with no
/// competitors gives no class.
fn parse_course_class(section: &str) -> Result<Option<CourseClass>> {
    let mut lines = section.lines().filter(|line| !line.is_empty());
    let Some(first_line) = lines.next() else {
        return Err(ParseError::invalid("parseCourseClass got an empty list of lines"));
    };
    let competitor_lines: Vec<&str> = lines.collect();

    let first_line_parts: Vec<&str> = first_line.split(',').collect();
    let (class_name, control_count_str) = match first_line_parts.as_slice() {
        [name, count] => (*name, *count),
        parts => {
            return Err(ParseError::wrong_format(format!(
                "Expected first line to have two parts (class name and number of controls), got {} part(s) instead",
                parts.len()
            )))
        }
    };

    let control_count = parse_leading_int(control_count_str).ok_or_else(|| {
        ParseError::invalid(format!("Could not read control count: '{}'", control_count_str))
    })?;

    if control_count < 0 {
        if competitor_lines.is_empty() {
            return Ok(None);
        }
        return Err(ParseError::invalid(format!(
            "Expected a non-negative control count, got {} instead",
            control_count
        )));
    }
    let control_count = control_count as usize;

    let mut competitors = competitor_lines
        .iter()
        .enumerate()
        .map(|(index, line)| parse_competitor(index, line, control_count))
        .collect::<Result<Vec<_>>>()?;
    competitors.sort_by(compare_competitors);

    Ok(Some(CourseClass::new(class_name, control_count, competitors)))
}

/// Parses `forename,surname,club,start,split1,...,splitN,finish split`
fn parse_competitor(index: usize, line: &str, control_count: usize) -> Result<Competitor> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != control_count + 5 {
        return Err(ParseError::invalid(format!(
            "Expected {} items in row for competitor in class with {} controls, got {} instead.",
            control_count + 5,
            control_count,
            parts.len()
        )));
    }

    let (forename, surname, club, start_time_str) = (parts[0], parts[1], parts[2], parts[3]);
    let start_time = match parse_time(start_time_str) {
        Some(t) if t == 0.0 => None,
        // Hours and minutes rather than hours, minutes and seconds
        Some(t) if !FULL_START_TIME.is_match(start_time_str) => Some(t * 60.0),
        other => other,
    };

    let mut cum_times = vec![Some(0.0)];
    let mut last_cum_time_recorded = 0.0;
    for part in &parts[4..] {
        match parse_time(part) {
            Some(split) if split > 0.0 => {
                last_cum_time_recorded += split;
                cum_times.push(Some(last_cum_time_recorded));
            }
            _ => cum_times.push(None),
        }
    }

    let mut competitor = Competitor::from_cum_times(
        index + 1,
        format!("{} {}", forename, surname),
        club,
        start_time,
        cum_times,
    )?;
    if last_cum_time_recorded == 0.0 {
        competitor.is_non_starter = true;
    }
    Ok(competitor)
}

// ============================================================================
// TESTS
// ============================================================================
