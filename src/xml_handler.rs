use std::sync::LazyLock;

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};

use crate::competitor::{compare_competitors, Competitor, Gender};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{parse_leading_float, parse_leading_int, parse_time};

const FEET_PER_KILOMETRE: f64 = 3280.0;

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}").unwrap());
// Timezones are ignored; times are shown as local time
static ISO_8601: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d\d\d-?\d\d-?\d\dT?(\d\d):?(\d\d)(?::?(\d\d))?").unwrap());

const STATUS_OK: &str = "OK";
const STATUS_NON_COMPETITIVE: &str = "NotCompeting";
const STATUS_NON_STARTER: &str = "DidNotStart";
const STATUS_NON_FINISHER: &str = "DidNotFinish";
const STATUS_DISQUALIFIED: &str = "Disqualified";
const STATUS_OVER_MAX_TIME: &str = "OverTime";

// ============================================================================
// XML HELPERS
// ============================================================================

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

/// Follows a path of child element names
fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter().try_fold(node, |current, name| child(current, name))
}

fn text_of(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Text of the element at the end of a path, or "" if there is none
fn path_text(node: Node, path: &[&str]) -> String {
    descend(node, path).map(text_of).unwrap_or_default()
}

fn read_year(date: &str) -> Option<i32> {
    YEAR.find(date).and_then(|m| m.as_str().parse().ok())
}

// ============================================================================
// VERSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct TempCourse {
    id: Option<String>,
    name: String,
    length: Option<f64>,
    climb: Option<i64>,
    number_of_controls: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
struct SplitDatum {
    code: String,
    time: Option<f64>,
}

/// The parts of reading IOF XML that differ between versions of the standard
trait IofVersion {
    fn is_of_this_version(&self, data: &str) -> bool;
    fn check_version(&self, root: Node) -> Result<()>;
    fn read_class_name(&self, class_result: Node) -> String;
    fn read_course_from_class(&self, class_result: Node) -> Result<TempCourse>;
    fn competitor_name_element<'a, 'input>(&self, element: Node<'a, 'input>) -> Option<Node<'a, 'input>>;
    fn read_club_name(&self, element: Node) -> String;
    fn read_date_of_birth(&self, element: Node) -> String;
    fn read_start_time(&self, result: Node) -> Option<f64>;
    fn read_total_time(&self, result: Node) -> Option<f64>;
    fn read_status(&self, result: Node) -> String;
    fn is_additional(&self, split_time: Node) -> bool;
    fn read_split_time(&self, split_time: Node) -> Result<SplitDatum>;
}

fn check_complete_status(root: Node) -> Result<()> {
    match root.attribute("status") {
        Some(status) if !status.eq_ignore_ascii_case("complete") => Err(ParseError::invalid(
            "Only complete IOF data supported; snapshot and delta are not supported",
        )),
        _ => Ok(()),
    }
}

/// IOF XML 2.0.3
struct Version2;

impl IofVersion for Version2 {
    fn is_of_this_version(&self, data: &str) -> bool {
        data.contains("IOFdata.dtd")
    }

    fn check_version(&self, root: Node) -> Result<()> {
        let version_element =
            child(root, "IOFVersion").ok_or_else(|| ParseError::wrong_format("Could not find IOFVersion element"))?;
        match version_element.attribute("version") {
            None => return Err(ParseError::wrong_format("Version attribute missing from IOFVersion element")),
            Some("2.0.3") => {}
            Some(other) => {
                return Err(ParseError::wrong_format(format!(
                    "Found unrecognised IOF XML data format '{}'",
                    other
                )))
            }
        }
        check_complete_status(root)
    }

    fn read_class_name(&self, class_result: Node) -> String {
        path_text(class_result, &["ClassShortName"])
    }

    /// Courses are rarely given in 2.0.3 files, so the class name stands in
    /// for the course name and the first result supplies the length
    fn read_course_from_class(&self, class_result: Node) -> Result<TempCourse> {
        let name = path_text(class_result, &["ClassShortName"]);
        let length_element = child(class_result, "PersonResult")
            .and_then(|person_result| child(person_result, "Result"))
            .and_then(|result| child(result, "CourseLength"));

        let mut length = None;
        if let Some(element) = length_element {
            let length_str = text_of(element);
            if !length_str.is_empty() {
                let value = parse_leading_float(&length_str)
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ParseError::invalid(format!("Invalid course length: '{}'", length_str)))?;
                length = Some(match element.attribute("unit") {
                    None | Some("m") => value / 1000.0,
                    Some("km") => value,
                    Some("ft") => value / FEET_PER_KILOMETRE,
                    Some(unit) => {
                        return Err(ParseError::invalid(format!("Unrecognised course-length unit: '{}'", unit)))
                    }
                });
            }
        }

        Ok(TempCourse {
            id: None,
            name,
            length,
            climb: None,
            number_of_controls: None,
        })
    }

    fn competitor_name_element<'a, 'input>(&self, element: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
        descend(element, &["Person", "PersonName"])
    }

    fn read_club_name(&self, element: Node) -> String {
        path_text(element, &["Club", "ShortName"])
    }

    fn read_date_of_birth(&self, element: Node) -> String {
        path_text(element, &["Person", "BirthDate", "Date"])
    }

    fn read_start_time(&self, result: Node) -> Option<f64> {
        parse_time(&path_text(result, &["StartTime", "Clock"]))
    }

    fn read_total_time(&self, result: Node) -> Option<f64> {
        parse_time(&path_text(result, &["Time"]))
    }

    fn read_status(&self, result: Node) -> String {
        child(result, "CompetitorStatus")
            .and_then(|status| status.attribute("value"))
            .unwrap_or_default()
            .to_string()
    }

    fn is_additional(&self, _split_time: Node) -> bool {
        false
    }

    fn read_split_time(&self, split_time: Node) -> Result<SplitDatum> {
        // Either a ControlCode or a Control element holding one
        let mut code = path_text(split_time, &["ControlCode"]);
        if code.is_empty() {
            code = path_text(split_time, &["Control", "ControlCode"]);
        }
        if code.is_empty() {
            return Err(ParseError::invalid("Control code missing for control"));
        }

        Ok(SplitDatum {
            code,
            time: parse_time(&path_text(split_time, &["Time"])),
        })
    }
}

/// IOF XML 3.0
struct Version3;

impl Version3 {
    /// Times are in seconds and may be fractional
    fn read_time(time_str: &str) -> Option<f64> {
        parse_leading_float(time_str).filter(|t| t.is_finite())
    }
}

impl IofVersion for Version3 {
    fn is_of_this_version(&self, data: &str) -> bool {
        data.contains("http://www.orienteering.org/datastandard/3.0")
    }

    fn check_version(&self, root: Node) -> Result<()> {
        match root.attribute("iofVersion") {
            None => return Err(ParseError::wrong_format("Could not find IOF version number")),
            Some("3.0") => {}
            Some(other) => {
                return Err(ParseError::wrong_format(format!(
                    "Found unrecognised IOF XML data format '{}'",
                    other
                )))
            }
        }
        check_complete_status(root)
    }

    fn read_class_name(&self, class_result: Node) -> String {
        path_text(class_result, &["Class", "Name"])
    }

    fn read_course_from_class(&self, class_result: Node) -> Result<TempCourse> {
        let course = child(class_result, "Course");
        let text = |name: &str| course.map(|c| path_text(c, &[name])).unwrap_or_default();

        let id = Some(text("Id")).filter(|id| !id.is_empty());
        let length_str = text("Length");
        let length = if length_str.is_empty() {
            None
        } else {
            let metres = parse_leading_int(&length_str)
                .ok_or_else(|| ParseError::invalid(format!("Unrecognised course length: '{}'", length_str)))?;
            Some(metres as f64 / 1000.0)
        };

        Ok(TempCourse {
            id,
            name: text("Name"),
            length,
            climb: parse_leading_int(&text("Climb")),
            number_of_controls: parse_leading_int(&text("NumberOfControls")).and_then(|n| usize::try_from(n).ok()),
        })
    }

    fn competitor_name_element<'a, 'input>(&self, element: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
        descend(element, &["Person", "Name"])
    }

    fn read_club_name(&self, element: Node) -> String {
        path_text(element, &["Organisation", "ShortName"])
    }

    fn read_date_of_birth(&self, element: Node) -> String {
        path_text(element, &["Person", "BirthDate"])
    }

    fn read_start_time(&self, result: Node) -> Option<f64> {
        let start_time_str = path_text(result, &["StartTime"]);
        let caps = ISO_8601.captures(&start_time_str)?;
        let hours = caps[1].parse().ok()?;
        let minutes = caps[2].parse().ok()?;
        let seconds = caps.get(3).map_or(Some(0), |s| s.as_str().parse().ok())?;
        NaiveTime::from_hms_opt(hours, minutes, seconds).map(|time| f64::from(time.num_seconds_from_midnight()))
    }

    fn read_total_time(&self, result: Node) -> Option<f64> {
        Self::read_time(&path_text(result, &["Time"]))
    }

    fn read_status(&self, result: Node) -> String {
        path_text(result, &["Status"])
    }

    fn is_additional(&self, split_time: Node) -> bool {
        split_time.attribute("status") == Some("Additional")
    }

    fn read_split_time(&self, split_time: Node) -> Result<SplitDatum> {
        let code = path_text(split_time, &["ControlCode"]);
        if code.is_empty() {
            return Err(ParseError::invalid("Control code missing for control"));
        }

        // Missed controls have their time omitted
        let time = if split_time.attribute("status") == Some("Missing") {
            None
        } else {
            Self::read_time(&path_text(split_time, &["Time"]))
        };
        Ok(SplitDatum { code, time })
    }
}

// ============================================================================
// EVENT PARSING
// ============================================================================

fn read_competitor_name(name_element: Option<Node>) -> Result<String> {
    let (forename, surname) = match name_element {
        Some(element) => (path_text(element, &["Given"]), path_text(element, &["Family"])),
        None => (String::new(), String::new()),
    };

    match (forename.is_empty(), surname.is_empty()) {
        (true, true) => Err(ParseError::invalid("Cannot read competitor's name")),
        (true, false) => Ok(surname),
        (false, true) => Ok(forename),
        (false, false) => Ok(format!("{} {}", forename, surname)),
    }
}

fn parse_competitor(element: Node, order: usize, version: &dyn IofVersion) -> Result<(Competitor, Vec<String>)> {
    let name = read_competitor_name(version.competitor_name_element(element))?;
    let club = version.read_club_name(element);
    let year_of_birth = read_year(&version.read_date_of_birth(element));
    let gender = child(element, "Person")
        .and_then(|person| person.attribute("sex"))
        .and_then(Gender::from_code);

    let result = element
        .descendants()
        .find(|n| n.has_tag_name("Result"))
        .ok_or_else(|| ParseError::invalid(format!("No result found for competitor '{}'", name)))?;

    let start_time = version.read_start_time(result);
    let total_time = version.read_total_time(result);

    let split_data = result
        .children()
        .filter(|n| n.has_tag_name("SplitTime") && !version.is_additional(*n))
        .map(|n| version.read_split_time(n))
        .collect::<Result<Vec<_>>>()?;

    let mut cum_times = vec![Some(0.0)];
    cum_times.extend(split_data.iter().map(|datum| datum.time));
    cum_times.push(total_time);
    let controls = split_data.into_iter().map(|datum| datum.code).collect();

    let mut competitor = Competitor::from_original_cum_times(order, name, club, start_time, cum_times)?;
    competitor.year_of_birth = year_of_birth;
    competitor.gender = gender;

    match version.read_status(result).as_str() {
        STATUS_NON_COMPETITIVE => competitor.is_non_competitive = true,
        STATUS_NON_STARTER => competitor.is_non_starter = true,
        STATUS_NON_FINISHER => competitor.is_non_finisher = true,
        STATUS_DISQUALIFIED => competitor.is_disqualified = true,
        STATUS_OVER_MAX_TIME => competitor.is_over_max_time = true,
        STATUS_OK => {
            let missing_punch = competitor.all_original_cumulative_times().iter().any(Option::is_none);
            if missing_punch && total_time.is_some() {
                competitor.set_ok_despite_missing_times();
            }
            if !competitor.has_any_times() {
                competitor.is_non_starter = true;
            }
        }
        // Absent or unrecognised status: no times at all means no start
        _ => {
            if !competitor.has_any_times() {
                competitor.is_non_starter = true;
            }
        }
    }

    Ok((competitor, controls))
}

#[derive(Debug)]
struct ParsedClass {
    name: String,
    competitors: Vec<Competitor>,
    controls: Vec<String>,
    course: TempCourse,
}

fn parse_class_data(element: Node, version: &dyn IofVersion) -> Result<ParsedClass> {
    let mut course = version.read_course_from_class(element)?;
    let name = version.read_class_name(element);
    if name.is_empty() {
        return Err(ParseError::invalid("Missing class name"));
    }

    let person_results: Vec<Node> = element.children().filter(|n| n.has_tag_name("PersonResult")).collect();
    if person_results.is_empty() {
        return Err(ParseError::invalid(format!("Class '{}' has no competitors", name)));
    }

    let mut class_controls: Option<Vec<String>> = None;
    let mut competitors = Vec::with_capacity(person_results.len());
    for (index, person_result) in person_results.into_iter().enumerate() {
        let (competitor, controls) = parse_competitor(person_result, index + 1, version)?;

        // The first competitor's controls are taken as the class's controls
        let expected_controls = class_controls.get_or_insert_with(|| controls.clone());
        let expected_count = *course.number_of_controls.get_or_insert(expected_controls.len());

        let actual_count = competitor.num_controls();
        if actual_count != expected_count {
            return Err(ParseError::invalid(format!(
                "Unexpected number of controls for competitor '{}' in class '{}': expected {}, actual {}",
                competitor.name, name, expected_count, actual_count
            )));
        }
        for (control_index, (expected, actual)) in expected_controls.iter().zip(&controls).enumerate() {
            if expected != actual {
                return Err(ParseError::invalid(format!(
                    "Unexpected control code for competitor '{}' at control {}: expected '{}', actual '{}'",
                    competitor.name,
                    control_index + 1,
                    expected,
                    actual
                )));
            }
        }
        competitors.push(competitor);
    }

    let controls = class_controls.unwrap_or_default();
    // Without a course ID, the list of controls identifies the course
    if course.id.is_none() && !controls.is_empty() {
        course.id = Some(controls.join(","));
    }

    competitors.sort_by(compare_competitors);
    Ok(ParsedClass {
        name,
        competitors,
        controls,
        course,
    })
}

fn determine_version(data: &str) -> Result<&'static dyn IofVersion> {
    let versions: [&'static dyn IofVersion; 2] = [&Version2, &Version3];
    versions
        .into_iter()
        .find(|version| version.is_of_this_version(data))
        .ok_or_else(|| ParseError::wrong_format("Data apparently not of any recognised IOF XML format"))
}

pub fn parse_iof_xml_event(data: &str) -> Result<Event> {
    let version = determine_version(data)?;

    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(data, options)
        .map_err(|e| ParseError::invalid(format!("XML data not well-formed: {}", e)))?;

    let root = document.root_element();
    if !root.has_tag_name("ResultList") {
        return Err(ParseError::wrong_format(format!(
            "Root element of XML document does not have expected name 'ResultList', got '{}'",
            root.tag_name().name()
        )));
    }
    version.check_version(root)?;

    let class_results: Vec<Node> = root.children().filter(|n| n.has_tag_name("ClassResult")).collect();
    if class_results.is_empty() {
        return Err(ParseError::invalid("No class result elements found"));
    }

    let mut classes = Vec::with_capacity(class_results.len());
    // (course key, course, class indexes, controls)
    let mut temp_courses: Vec<(Option<String>, TempCourse, Vec<usize>, Vec<String>)> = Vec::new();
    for class_result in class_results {
        let parsed = parse_class_data(class_result, version)?;
        let class_index = classes.len();
        classes.push(CourseClass::new(parsed.name, parsed.controls.len(), parsed.competitors));

        // Classes only share a course when both the ID and the controls agree
        let course_key = parsed
            .course
            .id
            .as_ref()
            .map(|id| format!("{},{}", id, parsed.controls.join(",")));
        match temp_courses
            .iter_mut()
            .find(|(key, ..)| key.is_some() && *key == course_key)
        {
            Some((_, _, class_indexes, _)) => class_indexes.push(class_index),
            None => temp_courses.push((course_key, parsed.course, vec![class_index], parsed.controls)),
        }
    }

    let courses = temp_courses
        .into_iter()
        .map(|(_, course, class_indexes, controls)| {
            Course::new(course.name, class_indexes, course.length, course.climb, Some(controls))
        })
        .collect();

    Ok(Event::new(classes, courses))
}

// ============================================================================
// READER
// ============================================================================

/// Reads IOF XML results lists, versions 2.0.3 and 3.0
pub struct IofXmlReader;

impl EventReader for IofXmlReader {
    fn name(&self) -> &'static str {
        "IOF XML"
    }

    fn sniff(&self, text: &str) -> bool {
        Version2.is_of_this_version(text) || Version3.is_of_this_version(text)
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_iof_xml_event(text)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_person(given: &str, family: &str, club: &str, start: &str, time: &str, status: &str, splits: &str) -> String {
        format!(
            r#"<PersonResult>
    <Person sex="M"><Name><Family>{family}</Family><Given>{given}</Given></Name><BirthDate>1984-06-13</BirthDate></Person>
    <Organisation><ShortName>{club}</ShortName></Organisation>
    <Result><StartTime>2014-06-07T{start}+01:00</StartTime><Time>{time}</Time><Status>{status}</Status>{splits}</Result>
  </PersonResult>"#
        )
    }

    fn v3_event(class_results: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ResultList xmlns="http://www.orienteering.org/datastandard/3.0" iofVersion="3.0" status="Complete">
  {class_results}
</ResultList>"#
        )
    }

    fn v3_class(name: &str, course_id: &str, people: &[String]) -> String {
        format!(
            r#"<ClassResult>
  <Class><Name>{name}</Name></Class>
  <Course><Id>{course_id}</Id><Name>Course {course_id}</Name><Length>4100</Length><Climb>140</Climb><NumberOfControls>2</NumberOfControls></Course>
  {}
</ClassResult>"#,
            people.join("\n")
        )
    }

    const SPLITS: &str = r#"<SplitTime><ControlCode>208</ControlCode><Time>65</Time></SplitTime><SplitTime><ControlCode>227</ControlCode><Time>221</Time></SplitTime>"#;

    #[test]
    fn test_parse_v3() {
        let data = v3_event(&v3_class(
            "M21",
            "1",
            &[
                v3_person("John", "Smith", "ABC", "10:00:00", "393", "OK", SPLITS),
                v3_person("Fred", "Baker", "DEF", "10:05:30", "380.5", "OK", SPLITS),
            ],
        ));
        let event = parse_iof_xml_event(&data).unwrap();
        assert_eq!(event.classes.len(), 1);
        let class = &event.classes[0];
        assert_eq!(class.name, "M21");
        assert_eq!(class.num_controls, 2);

        let fred = &class.competitors[0];
        assert_eq!(fred.name, "Fred Baker");
        assert_eq!(fred.start_time, Some(36330.0));
        assert_eq!(fred.total_time(), Some(380.5));
        let john = &class.competitors[1];
        assert_eq!(john.club, "ABC");
        assert_eq!(john.year_of_birth, Some(1984));
        assert_eq!(john.gender, Some(Gender::Male));
        assert_eq!(
            john.all_original_cumulative_times(),
            &[Some(0.0), Some(65.0), Some(221.0), Some(393.0)]
        );

        let course = &event.courses[0];
        assert_eq!(course.name, "Course 1");
        assert_eq!(course.length, Some(4.1));
        assert_eq!(course.climb, Some(140));
        assert_eq!(course.controls, Some(vec!["208".to_string(), "227".to_string()]));
    }

    #[test]
    fn test_v3_statuses() {
        let missing = r#"<SplitTime><ControlCode>208</ControlCode><Time>65</Time></SplitTime><SplitTime status="Missing"><ControlCode>227</ControlCode></SplitTime>"#;
        let data = v3_event(&v3_class(
            "M21",
            "1",
            &[
                v3_person("A", "One", "X", "10:00:00", "393", "OK", missing),
                v3_person("B", "Two", "X", "10:00:00", "", "DidNotStart", missing),
                v3_person("C", "Three", "X", "10:00:00", "393", "Disqualified", missing),
                v3_person("D", "Four", "X", "10:00:00", "393", "NotCompeting", SPLITS),
                v3_person("E", "Five", "X", "10:00:00", "393", "OverTime", SPLITS),
                v3_person("F", "Six", "X", "10:00:00", "", "DidNotFinish", missing),
            ],
        ));
        let event = parse_iof_xml_event(&data).unwrap();
        let find = |name: &str| event.classes[0].competitors.iter().find(|c| c.name == name).unwrap();

        let one = find("A One");
        assert!(one.is_ok_despite_missing_times());
        assert_eq!(one.total_time(), Some(393.0));
        assert!(find("B Two").is_non_starter);
        assert!(find("C Three").is_disqualified);
        assert!(!find("C Three").is_ok_despite_missing_times());
        assert!(find("D Four").is_non_competitive);
        assert!(find("E Five").is_over_max_time);
        assert!(find("F Six").is_non_finisher);
    }

    #[test]
    fn test_v3_absent_or_unknown_status() {
        let missing = r#"<SplitTime status="Missing"><ControlCode>208</ControlCode></SplitTime><SplitTime status="Missing"><ControlCode>227</ControlCode></SplitTime>"#;
        let no_status = |given: &str, splits: &str, time: &str| {
            v3_person(given, "X", "ABC", "10:00:00", time, "", splits).replace("<Status></Status>", "")
        };
        let data = v3_event(&v3_class(
            "M21",
            "1",
            &[
                v3_person("A", "X", "ABC", "10:00:00", "", "Inactive", missing),
                no_status("B", missing, ""),
                no_status("C", SPLITS, "393"),
            ],
        ));
        let event = parse_iof_xml_event(&data).unwrap();
        let find = |name: &str| event.classes[0].competitors.iter().find(|c| c.name == name).unwrap();

        assert!(find("A X").is_non_starter);
        assert!(find("B X").is_non_starter);

        let finisher = find("C X");
        assert!(!finisher.is_non_starter);
        assert!(!finisher.is_non_finisher);
        assert!(finisher.completed());
        assert_eq!(finisher.total_time(), Some(393.0));
    }

    #[test]
    fn test_v3_additional_controls_ignored() {
        let splits = format!(
            r#"{SPLITS}<SplitTime status="Additional"><ControlCode>999</ControlCode><Time>300</Time></SplitTime>"#
        );
        let data = v3_event(&v3_class("M21", "1", &[v3_person("John", "Smith", "ABC", "10:00:00", "393", "OK", &splits)]));
        let event = parse_iof_xml_event(&data).unwrap();
        assert_eq!(event.classes[0].competitors[0].num_controls(), 2);
    }

    #[test]
    fn test_classes_sharing_course_id_and_controls_share_course() {
        let person = v3_person("John", "Smith", "ABC", "10:00:00", "393", "OK", SPLITS);
        let classes = [
            v3_class("M21", "1", &[person.clone()]),
            v3_class("W21", "1", &[person.clone()]),
            v3_class("M45", "2", &[person]),
        ]
        .join("\n");
        let event = parse_iof_xml_event(&v3_event(&classes)).unwrap();
        assert_eq!(event.courses.len(), 2);
        assert_eq!(event.courses[0].classes, vec![0, 1]);
        assert_eq!(event.courses[1].classes, vec![2]);
        assert_eq!(event.classes[2].course, Some(1));
    }

    #[test]
    fn test_control_mismatch_is_invalid() {
        let other = r#"<SplitTime><ControlCode>208</ControlCode><Time>65</Time></SplitTime><SplitTime><ControlCode>999</ControlCode><Time>221</Time></SplitTime>"#;
        let data = v3_event(&v3_class(
            "M21",
            "1",
            &[
                v3_person("John", "Smith", "ABC", "10:00:00", "393", "OK", SPLITS),
                v3_person("Fred", "Baker", "DEF", "10:00:00", "393", "OK", other),
            ],
        ));
        assert!(matches!(parse_iof_xml_event(&data), Err(ParseError::InvalidData(_))));
    }

    const V2: &str = r#"<?xml version="1.0" encoding="ISO-8859-1" ?>
<!DOCTYPE ResultList SYSTEM "IOFdata.dtd">
<ResultList status="complete">
  <IOFVersion version="2.0.3" />
  <ClassResult>
    <ClassShortName>Course 1</ClassShortName>
    <PersonResult>
      <Person sex="F">
        <PersonName><Family>Jones</Family><Given>Jane</Given></PersonName>
        <BirthDate><Date>1990-01-01</Date></BirthDate>
      </Person>
      <Club><ShortName>ABC</ShortName></Club>
      <Result>
        <StartTime><Clock>10:11:00</Clock></StartTime>
        <Time>06:33</Time>
        <CompetitorStatus value="OK" />
        <CourseLength unit="m">4100</CourseLength>
        <SplitTime sequence="1"><ControlCode>208</ControlCode><Time>01:05</Time></SplitTime>
        <SplitTime sequence="2"><Control><ControlCode>227</ControlCode></Control><Time>03:41</Time></SplitTime>
      </Result>
    </PersonResult>
  </ClassResult>
</ResultList>
"#;

    #[test]
    fn test_parse_v2() {
        let event = parse_iof_xml_event(V2).unwrap();
        let jane = &event.classes[0].competitors[0];
        assert_eq!(jane.name, "Jane Jones");
        assert_eq!(jane.club, "ABC");
        assert_eq!(jane.gender, Some(Gender::Female));
        assert_eq!(jane.year_of_birth, Some(1990));
        assert_eq!(jane.start_time, Some(36660.0));
        assert_eq!(
            jane.all_original_cumulative_times(),
            &[Some(0.0), Some(65.0), Some(221.0), Some(393.0)]
        );

        let course = &event.courses[0];
        assert_eq!(course.name, "Course 1");
        assert_eq!(course.length, Some(4.1));
        assert_eq!(course.controls, Some(vec!["208".to_string(), "227".to_string()]));
    }

    #[test]
    fn test_v2_course_length_units() {
        let feet = V2.replace(r#"unit="m">4100"#, r#"unit="ft">6560"#);
        let event = parse_iof_xml_event(&feet).unwrap();
        assert_eq!(event.courses[0].length, Some(2.0));

        let bad = V2.replace(r#"unit="m""#, r#"unit="mi""#);
        assert!(matches!(parse_iof_xml_event(&bad), Err(ParseError::InvalidData(_))));
    }

    #[test]
    fn test_version_and_status_checks() {
        let wrong_version = V2.replace("2.0.3\"", "2.0.2\"");
        assert!(parse_iof_xml_event(&wrong_version).unwrap_err().is_wrong_format());

        let snapshot = V2.replace("status=\"complete\"", "status=\"snapshot\"");
        assert!(matches!(parse_iof_xml_event(&snapshot), Err(ParseError::InvalidData(_))));

        let not_well_formed = V2.replace("</ResultList>", "");
        assert!(matches!(parse_iof_xml_event(&not_well_formed), Err(ParseError::InvalidData(_))));

        assert!(parse_iof_xml_event("<ResultList/>").unwrap_err().is_wrong_format());
    }

    #[test]
    fn test_missing_name_is_invalid() {
        let data = V2.replace("<Family>Jones</Family><Given>Jane</Given>", "");
        assert_eq!(
            parse_iof_xml_event(&data).unwrap_err(),
            ParseError::invalid("Cannot read competitor's name")
        );
    }
}
