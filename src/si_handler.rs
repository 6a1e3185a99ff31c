use std::collections::{BTreeMap, HashMap};

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::competitor::{compare_competitors, Competitor};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{format_time, parse_course_climb, parse_course_length, parse_leading_int, parse_time};

// 'City' holds the club name
const MANDATORY_COLUMN_NAMES: [&str; 7] = ["First name", "Surname", "City", "Start", "Time", "Course", "Course controls"];

const LENGTH_COLUMN: &str = "Km";
const CLIMB_COLUMN: &str = "m";

/// Reads SI semicolon-separated exports with a header row naming each
/// column, and `Punch1`..`PunchN` columns for the controls.
pub struct SiReader;

impl EventReader for SiReader {
    fn name(&self) -> &'static str {
        "SI"
    }

    fn sniff(&self, text: &str) -> bool {
        let Some(header) = text.lines().next() else {
            return false;
        };
        let columns: Vec<&str> = header.split(';').map(str::trim).collect();
        MANDATORY_COLUMN_NAMES.iter().filter(|name| columns.contains(name)).count() >= 2
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_si_event(text)
    }
}

/// Fails unless a present cumulative time comes strictly after the
/// previous one
pub fn verify_cumulative_times_in_order(prev_time: f64, next_time: Option<f64>) -> Result<()> {
    match next_time {
        Some(next) if next <= prev_time => Err(ParseError::invalid(format!(
            "Cumulative times must be strictly ascending: read {} and {} in that order",
            format_time(Some(prev_time), None),
            format_time(Some(next), None)
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Default)]
struct CourseRecord {
    num_controls: usize,
    length: Option<f64>,
    climb: Option<i64>,
    competitors: Vec<Competitor>,
}

/// Header names mapped to column positions
struct Columns(HashMap<String, usize>);

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let mut columns = HashMap::new();
        for (index, name) in headers.iter().enumerate() {
            columns.entry(name.to_string()).or_insert(index);
        }
        Columns(columns)
    }

    fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> &'r str {
        self.0.get(name).and_then(|&index| record.get(index)).unwrap_or("")
    }
}

pub fn parse_si_event(text: &str) -> Result<Event> {
    // The club is in 'City', and a second 'City' column follows 'Zip'
    let text = text.replacen(";Zip;City;", ";Zip;City2;", 1);

    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ParseError::wrong_format(format!("Could not read SI header: {}", e)))?
        .clone();
    if headers.len() <= 1 {
        return Err(ParseError::wrong_format("Data seems not to be in the SI semicolon-separated format"));
    }

    let columns = Columns::new(&headers);
    if let Some(missing) = MANDATORY_COLUMN_NAMES.iter().find(|name| !columns.has(name)) {
        return Err(ParseError::invalid(format!("Column '{}' missing", missing)));
    }

    let mut courses: BTreeMap<String, CourseRecord> = BTreeMap::new();
    let mut rows_read = 0;
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::invalid(format!("Could not read SI row: {}", e)))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows_read += 1;
        read_row(&columns, &record, &mut courses)?;
    }

    if rows_read == 0 {
        return Err(ParseError::wrong_format("No data found to read"));
    }

    let mut classes = Vec::with_capacity(courses.len());
    let mut event_courses = Vec::with_capacity(courses.len());
    for (index, (name, mut course)) in courses.into_iter().enumerate() {
        course.competitors.sort_by(compare_competitors);
        classes.push(CourseClass::new(name.clone(), course.num_controls, course.competitors));
        event_courses.push(Course::new(name, vec![index], course.length, course.climb, None));
    }

    Ok(Event::new(classes, event_courses))
}

fn read_row(columns: &Columns, record: &StringRecord, courses: &mut BTreeMap<String, CourseRecord>) -> Result<()> {
    let course_name = columns.get(record, "Course");

    if !courses.contains_key(course_name) {
        let num_controls_str = columns.get(record, "Course controls");
        let num_controls = parse_leading_int(num_controls_str)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::invalid(format!("Could not read control count '{}'", num_controls_str)))?;
        courses.insert(
            course_name.to_string(),
            CourseRecord {
                num_controls,
                length: parse_course_length(columns.get(record, LENGTH_COLUMN)),
                climb: parse_course_climb(columns.get(record, CLIMB_COLUMN)),
                competitors: Vec::new(),
            },
        );
    }
    let Some(course) = courses.get_mut(course_name) else {
        return Ok(());
    };

    let mut cum_times = vec![Some(0.0)];
    let mut last_cum_time = 0.0;
    for control in 1..=course.num_controls {
        let key = format!("Punch{}", control);
        if !columns.has(&key) {
            return Err(ParseError::invalid(format!("No '{}' column", key)));
        }

        let cum_time = parse_time(columns.get(record, &key));
        verify_cumulative_times_in_order(last_cum_time, cum_time)?;
        cum_times.push(cum_time);
        if let Some(time) = cum_time {
            last_cum_time = time;
        }
    }

    let total_time = parse_time(columns.get(record, "Time"));
    verify_cumulative_times_in_order(last_cum_time, total_time)?;
    cum_times.push(total_time);

    let name = format!("{} {}", columns.get(record, "First name"), columns.get(record, "Surname"));
    let competitor = Competitor::from_cum_times(
        course.competitors.len() + 1,
        name.trim(),
        columns.get(record, "City"),
        parse_time(columns.get(record, "Start")),
        cum_times,
    )?;
    course.competitors.push(competitor);
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
