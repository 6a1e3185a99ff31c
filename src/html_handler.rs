use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::competitor::{compare_competitors, Competitor};
use crate::course::Course;
use crate::course_class::CourseClass;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::reader::EventReader;
use crate::utils::{normalise_line_endings, parse_course_length, parse_time};

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static FONT_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<font[^>]*>(.*?)</font>").unwrap());
static DISTANCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9.,]+)\s*(?:Km|km)").unwrap());
static CLIMB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*(?:Cm|Hm|hm|m)").unwrap());
static DIGITS_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d*$").unwrap());

static FONT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("font").unwrap());
static TD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static TH_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());

const CLOSE_FONT: &str = "</font>";

// ============================================================================
// TEXT EXTRACTION
// ============================================================================

fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Text inside each `<font>` element of a line
fn font_bits(line: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(line);
    fragment
        .select(&FONT_SELECTOR)
        .map(|font| font.text().collect::<String>())
        .collect()
}

/// Trimmed text inside each table cell of a line of table rows
fn table_data_bits(line: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(&format!("<table>{}</table>", line));
    fragment
        .select(&TD_SELECTOR)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

fn non_empty_table_data_bits(line: &str) -> Vec<String> {
    table_data_bits(line).into_iter().filter(|bit| !bit.is_empty()).collect()
}

fn non_empty_table_header_bits(line: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(&format!("<table>{}</table>", line));
    fragment
        .select(&TH_SELECTOR)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .filter(|bit| !bit.is_empty())
        .collect()
}

fn bit(bits: &[String], index: usize) -> Result<&str> {
    bits.get(index).map(String::as_str).ok_or_else(|| {
        ParseError::invalid(format!(
            "Expected at least {} items in competitor row, found {}",
            index + 1,
            bits.len()
        ))
    })
}

fn has_number(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text.parse::<f64>().is_ok_and(f64::is_finite)
}

fn try_read_distance(text: &str) -> Option<f64> {
    DISTANCE.captures(text).and_then(|caps| parse_course_length(&caps[1]))
}

fn try_read_climb(text: &str) -> Option<i64> {
    CLIMB.captures(text).and_then(|caps| caps[1].parse().ok())
}

/// The text before any opening parenthesis, trimmed
fn name_before_parenthesis(text: &str) -> String {
    text.split('(').next().unwrap_or(text).trim().to_string()
}

/// Reads labels of the form `num(code)`. A last label without parentheses
/// is the finish, which has no code.
fn read_control_codes(labels: &[String]) -> Result<Vec<Option<String>>> {
    labels
        .iter()
        .enumerate()
        .map(|(index, label)| match label.find('(') {
            Some(paren) if label.ends_with(')') => Ok(Some(label[paren + 1..label.len() - 1].to_string())),
            _ if index + 1 == labels.len() => Ok(None),
            _ => Err(ParseError::invalid(format!("Unrecognised control header label: '{}'", label))),
        })
        .collect()
}

/// Drops trailing controls a competitor punched that are not on their
/// course. Their split 'times' begin with an asterisk.
fn remove_extra_controls(cum_times: &mut Vec<Option<f64>>, split_times: &mut Vec<String>) {
    while split_times.last().is_some_and(|split| split.starts_with('*')) {
        split_times.pop();
        cum_times.pop();
    }
}

// ============================================================================
// PARSE RECORDS
// ============================================================================

/// Competitor data read from a pair of lines, possibly partial
#[derive(Debug, Clone, PartialEq)]
struct CompetitorParseRecord {
    name: String,
    club: String,
    class_name: Option<String>,
    total_time: String,
    cum_times: Vec<Option<f64>>,
    competitive: bool,
}

impl CompetitorParseRecord {
    /// A continuation record carries only further times for the competitor
    /// read before it
    fn is_continuation(&self) -> bool {
        self.name.is_empty()
            && self.club.is_empty()
            && self.class_name.is_none()
            && self.total_time.is_empty()
            && !self.competitive
    }

    fn append(&mut self, other: CompetitorParseRecord) {
        self.cum_times.extend(other.cum_times);
    }

    fn into_competitor(self, order: usize) -> Result<Competitor> {
        let mut cum_times = vec![Some(0.0)];
        cum_times.extend(self.cum_times);

        let mut competitor = Competitor::from_original_cum_times(order, self.name, self.club, None, cum_times)?;
        if competitor.completed() && !self.competitive {
            competitor.is_non_competitive = true;
        }
        if !competitor.has_any_times() {
            competitor.is_non_starter = true;
        }
        Ok(competitor)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CourseHeader {
    name: String,
    distance: Option<f64>,
    climb: Option<i64>,
}

#[derive(Debug)]
struct CourseParseRecord {
    header: CourseHeader,
    /// Control codes, `None` for the finish
    controls: Vec<Option<String>>,
    competitors: Vec<CompetitorParseRecord>,
}

impl CourseParseRecord {
    fn new(header: CourseHeader) -> Self {
        CourseParseRecord {
            header,
            controls: Vec::new(),
            competitors: Vec::new(),
        }
    }

    fn has_all_controls(&self) -> bool {
        matches!(self.controls.last(), Some(None))
    }

    fn add_competitor(&mut self, mut competitor: CompetitorParseRecord) -> Result<()> {
        // Mispunchers may be missing even a placeholder for the finish split
        if !competitor.competitive && competitor.cum_times.len() + 1 == self.controls.len() {
            competitor.cum_times.push(None);
        }
        if parse_time(&competitor.total_time).is_none() && competitor.cum_times.is_empty() {
            competitor.cum_times.resize(self.controls.len(), None);
        }

        if competitor.cum_times.len() != self.controls.len() {
            return Err(ParseError::invalid(format!(
                "Competitor '{}' should have {} cumulative times, but has {} times",
                competitor.name,
                self.controls.len(),
                competitor.cum_times.len()
            )));
        }
        self.competitors.push(competitor);
        Ok(())
    }
}

// ============================================================================
// RECOGNIZERS
// ============================================================================

/// The format-specific half of HTML parsing. The shared parser feeds a
/// recognizer one line at a time and asks it what each line holds.
trait Recognizer {
    fn is_text_of_this_format(&self, text: &str) -> bool;

    /// Trims the text down to the lines the parser needs
    fn preprocess(&mut self, text: &str) -> Result<String>;

    fn can_ignore_this_line(&mut self, line: &str) -> bool;

    fn is_course_header_line(&self, line: &str) -> bool;

    fn parse_course_header_line(&self, line: &str) -> Result<CourseHeader>;

    fn parse_controls_line(&self, line: &str) -> Result<Vec<Option<String>>>;

    fn parse_competitor(&mut self, first_line: &str, second_line: &str) -> Result<CompetitorParseRecord>;
}

/// Older results pages: preformatted text with fields in `<font>` elements
#[derive(Debug, Default)]
struct PreformattedRecognizer {
    /// 4 when the second column is blank or a number, otherwise 3
    preceding_column_count: Option<usize>,
}

impl PreformattedRecognizer {
    fn read_competitor_split_data_line(&self, line: &str, preceding_column_count: usize) -> Vec<String> {
        let mut rest = line;
        for _ in 0..preceding_column_count {
            match rest.find(CLOSE_FONT) {
                Some(pos) => rest = &rest[pos + CLOSE_FONT.len()..],
                None => break,
            }
        }
        strip_html(rest).split_whitespace().map(str::to_string).collect()
    }

    /// The class name sits between the preceding font columns
    fn read_class_name(first_line: &str, preceding_column_count: usize) -> Option<String> {
        let mut end = 0;
        for _ in 0..preceding_column_count {
            match first_line[end..].find(CLOSE_FONT) {
                Some(pos) => end += pos + CLOSE_FONT.len(),
                None => {
                    end = first_line.len();
                    break;
                }
            }
        }
        let without_fonts = FONT_ELEMENT.replace_all(&first_line[..end], "");
        without_fonts.split_whitespace().next().map(str::to_string)
    }
}

impl Recognizer for PreformattedRecognizer {
    fn is_text_of_this_format(&self, text: &str) -> bool {
        text.contains("<pre>") && text.contains("<font")
    }

    fn preprocess(&mut self, text: &str) -> Result<String> {
        let pre_pos = text
            .find("<pre>")
            .ok_or_else(|| ParseError::invalid("Cannot find opening pre tag"))?;
        let text = match text[pre_pos..].find('\n') {
            Some(line_end) => &text[pre_pos + line_end + 1..],
            None => text,
        };

        let close_pre_pos = text
            .rfind("</pre>")
            .ok_or_else(|| ParseError::invalid("Found opening <pre> but no closing </pre>"))?;
        let text = match text[..close_pre_pos].rfind('\n') {
            Some(line_end) => &text[..line_end],
            None => "",
        };
        Ok(text.trim().to_string())
    }

    fn can_ignore_this_line(&mut self, line: &str) -> bool {
        line.is_empty()
    }

    fn is_course_header_line(&self, line: &str) -> bool {
        font_bits(line).len() == 2
    }

    fn parse_course_header_line(&self, line: &str) -> Result<CourseHeader> {
        match font_bits(line).as_slice() {
            [name_and_controls, distance_and_climb] => Ok(CourseHeader {
                name: name_before_parenthesis(name_and_controls),
                distance: try_read_distance(distance_and_climb),
                climb: try_read_climb(distance_and_climb),
            }),
            _ => Err(ParseError::invalid("Course header line should have two parts")),
        }
    }

    fn parse_controls_line(&self, line: &str) -> Result<Vec<Option<String>>> {
        let controls_text = match line.rfind(CLOSE_FONT) {
            Some(pos) => &line[pos + CLOSE_FONT.len()..],
            None => line,
        };
        let labels: Vec<String> = controls_text.split_whitespace().map(str::to_string).collect();
        read_control_codes(&labels)
    }

    fn parse_competitor(&mut self, first_line: &str, second_line: &str) -> Result<CompetitorParseRecord> {
        let first_line_bits = font_bits(first_line);
        let second_line_bits = font_bits(second_line);

        let preceding_column_count = match self.preceding_column_count {
            Some(count) => count,
            None => {
                let count = if DIGITS_ONLY.is_match(bit(&first_line_bits, 1)?.trim()) { 4 } else { 3 };
                self.preceding_column_count = Some(count);
                count
            }
        };

        let competitive = has_number(bit(&first_line_bits, 0)?);
        let name = bit(&first_line_bits, preceding_column_count - 2)?.trim().to_string();
        let total_time = bit(&first_line_bits, preceding_column_count - 1)?.trim().to_string();
        let club = bit(&second_line_bits, preceding_column_count - 2)?.trim().to_string();

        let mut cum_times: Vec<Option<f64>> = self
            .read_competitor_split_data_line(first_line, preceding_column_count)
            .iter()
            .map(|time| parse_time(time))
            .collect();
        let mut split_times = self.read_competitor_split_data_line(second_line, preceding_column_count);
        remove_extra_controls(&mut cum_times, &mut split_times);

        let class_name = if name.is_empty() {
            None
        } else {
            Self::read_class_name(first_line, preceding_column_count)
        };

        Ok(CompetitorParseRecord {
            name,
            club,
            class_name,
            total_time,
            cum_times,
            competitive,
        })
    }
}

static NBSP_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<tr[^>]*><td[^>]*>(?:<nobr>)?&nbsp;?(?:</nobr>)?</td></tr>").unwrap()
});
static CLOSE_COL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</col[^>]*>").unwrap());
static NAV_ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<a id="[^"]*"></a>"#).unwrap());
static NAV_DIV: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?s)<div id="navigation">.*?</div>"#).unwrap());

/// Newer results pages: one header table and one results table per course,
/// after an event title table
#[derive(Debug, Default)]
struct MultiTableRecognizer {
    current_course_has_class: bool,
}

impl MultiTableRecognizer {
    fn read_competitor_split_data_line(&self, bits: &[String]) -> Vec<String> {
        let start = if self.current_course_has_class { 5 } else { 4 };
        let end = bits.iter().rposition(|bit| !bit.is_empty()).map_or(0, |pos| pos + 1);
        bits.get(start..end)
            .unwrap_or_default()
            .iter()
            .filter(|bit| !bit.is_empty())
            .cloned()
            .collect()
    }
}

impl Recognizer for MultiTableRecognizer {
    fn is_text_of_this_format(&self, text: &str) -> bool {
        text.matches("<table").count() >= 5
    }

    fn preprocess(&mut self, text: &str) -> Result<String> {
        let table_end = text
            .find("</table>")
            .ok_or_else(|| ParseError::invalid("Could not find any closing </table> tags"))?;
        let mut text = &text[table_end + "</table>".len()..];

        if let (Some(close_div), Some(open_table)) = (text.find("</div>"), text.find("<table")) {
            if close_div < open_table {
                text = &text[close_div + "</div>".len()..];
            }
        }

        // One table row per line, and table tags on lines of their own
        let text = text
            .replace(">\n<", "><")
            .replace("><tr>", ">\n<tr>")
            .replace("</tr><", "</tr>\n<")
            .replace("><table", ">\n<table")
            .replace("</table><", "</table>\n<");

        let text = CLOSE_COL.replace_all(&text, "");
        let text = NBSP_ROW.replace_all(&text, "");
        let text = NAV_ANCHOR.replace_all(&text, "");
        let text = NAV_DIV.replace_all(&text, "");
        Ok(text.replacen("</body></html>", "", 1).trim().to_string())
    }

    fn can_ignore_this_line(&mut self, line: &str) -> bool {
        if line.contains("<th>") {
            self.current_course_has_class = non_empty_table_header_bits(line).len() == 5;
            return true;
        }
        line.is_empty() || line.contains("<table") || line.contains("</table>")
    }

    fn is_course_header_line(&self, line: &str) -> bool {
        line.contains(r#"<td id="header""#)
    }

    fn parse_course_header_line(&self, line: &str) -> Result<CourseHeader> {
        let data_bits = non_empty_table_data_bits(line);
        let Some((name, rest)) = data_bits.split_first() else {
            return Err(ParseError::invalid("No parts found in course header line"));
        };

        Ok(CourseHeader {
            name: name_before_parenthesis(name),
            distance: rest.iter().find_map(|bit| try_read_distance(bit)),
            climb: rest.iter().find_map(|bit| try_read_climb(bit)),
        })
    }

    fn parse_controls_line(&self, line: &str) -> Result<Vec<Option<String>>> {
        read_control_codes(&non_empty_table_data_bits(line))
    }

    fn parse_competitor(&mut self, first_line: &str, second_line: &str) -> Result<CompetitorParseRecord> {
        let first_line_bits = table_data_bits(first_line);
        let second_line_bits = table_data_bits(second_line);

        let competitive = has_number(bit(&first_line_bits, 0)?);
        let name = bit(&first_line_bits, 2)?.to_string();
        let total_time = bit(&first_line_bits, if self.current_course_has_class { 4 } else { 3 })?.to_string();
        let club = bit(&second_line_bits, 2)?.to_string();
        let class_name = if self.current_course_has_class && !name.is_empty() {
            Some(bit(&first_line_bits, 3)?.to_string())
        } else {
            None
        };

        let mut cum_times: Vec<Option<f64>> = self
            .read_competitor_split_data_line(&first_line_bits)
            .iter()
            .map(|time| parse_time(time))
            .collect();
        let mut split_times = self.read_competitor_split_data_line(&second_line_bits);
        remove_extra_controls(&mut cum_times, &mut split_times);

        let recorded_cum_times = cum_times.iter().filter(|t| t.is_some()).count();
        if recorded_cum_times != split_times.len() {
            return Err(ParseError::invalid(format!(
                "Cumulative and split times do not have the same length: {} cumulative times, {} split times",
                recorded_cum_times,
                split_times.len()
            )));
        }

        Ok(CompetitorParseRecord {
            name,
            club,
            class_name,
            total_time,
            cum_times,
            competitive,
        })
    }
}

static OEVENT_NBSP_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<tr[^>]*><td colspan=[^>]*>&nbsp;</td></tr>").unwrap());
static OEVENT_COURSE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+\((\d+)m,\s*(\d+)m\)$").unwrap());

/// OEvent tabular exports: exactly two tables, the second holding every
/// course, with rank cells between the times
#[derive(Debug, Default)]
struct OEventTabularRecognizer {
    uses_classes: bool,
}

impl OEventTabularRecognizer {
    fn first_time_column(&self) -> usize {
        if self.uses_classes {
            5
        } else {
            4
        }
    }

    fn read_competitor_split_data_line(&self, bits: &[String]) -> Vec<String> {
        let end = bits.iter().rposition(|bit| !bit.is_empty()).map_or(0, |pos| pos + 1);
        // Alternate cells hold ranks
        bits.iter()
            .take(end)
            .skip(self.first_time_column())
            .step_by(2)
            .filter(|bit| !bit.is_empty())
            .cloned()
            .collect()
    }
}

impl Recognizer for OEventTabularRecognizer {
    fn is_text_of_this_format(&self, text: &str) -> bool {
        text.matches("<table").count() == 2
    }

    fn preprocess(&mut self, text: &str) -> Result<String> {
        let table_end = text
            .find("</table>")
            .ok_or_else(|| ParseError::invalid("Could not find any closing </table> tags"))?;

        // 25 columns with classes, 24 without
        self.uses_classes = text.contains(r#"<td colspan="25">"#);

        let text = &text[table_end + "</table>".len()..];
        let text = OEVENT_NBSP_ROW.replace_all(text, "");
        Ok(text
            .replacen("</body>", "", 1)
            .replacen("</html>", "", 1)
            .trim()
            .to_string())
    }

    fn can_ignore_this_line(&mut self, line: &str) -> bool {
        line.is_empty() || line.contains("<table") || line.contains("</table>") || line.contains("<hr>")
    }

    fn is_course_header_line(&self, line: &str) -> bool {
        line.contains(r#"<tr class="clubName""#)
    }

    fn parse_course_header_line(&self, line: &str) -> Result<CourseHeader> {
        let data_bits = non_empty_table_data_bits(line);
        let part = data_bits
            .first()
            .ok_or_else(|| ParseError::invalid("No parts found in course header line"))?;

        Ok(match OEVENT_COURSE_HEADER.captures(part) {
            Some(caps) => CourseHeader {
                name: caps[1].trim().to_string(),
                distance: caps[2].parse::<f64>().ok().map(|metres| metres / 1000.0),
                climb: caps[3].parse().ok(),
            },
            None => CourseHeader {
                name: part.trim().to_string(),
                distance: None,
                climb: None,
            },
        })
    }

    fn parse_controls_line(&self, line: &str) -> Result<Vec<Option<String>>> {
        Ok(non_empty_table_data_bits(line)
            .iter()
            .map(|bit| bit.split_once('-').map(|(_, code)| code.to_string()))
            .collect())
    }

    fn parse_competitor(&mut self, first_line: &str, second_line: &str) -> Result<CompetitorParseRecord> {
        let first_line_bits = table_data_bits(first_line);
        let mut second_line_bits = table_data_bits(second_line);

        let competitive = has_number(bit(&first_line_bits, 0)?);
        let name = bit(&first_line_bits, 2)?.to_string();
        let total_time = bit(&first_line_bits, if self.uses_classes { 4 } else { 3 })?.to_string();
        let class_name = if self.uses_classes && !name.is_empty() {
            Some(bit(&first_line_bits, 3)?.to_string())
        } else {
            None
        };
        let club = bit(&second_line_bits, 2)?.to_string();

        // A cumulative time with no split usually means the previous control
        // was missed
        let columns = first_line_bits.len().min(second_line_bits.len());
        for index in (self.first_time_column()..columns).step_by(2) {
            if !first_line_bits[index].is_empty() && second_line_bits[index].is_empty() {
                second_line_bits[index] = "----".to_string();
            }
        }

        let mut cum_times: Vec<Option<f64>> = self
            .read_competitor_split_data_line(&first_line_bits)
            .iter()
            .map(|time| parse_time(time))
            .collect();
        let mut split_times = self.read_competitor_split_data_line(&second_line_bits);
        remove_extra_controls(&mut cum_times, &mut split_times);

        if cum_times.len() != split_times.len() {
            return Err(ParseError::invalid(format!(
                "Cumulative and split times do not have the same length: {} cumulative times, {} split times",
                cum_times.len(),
                split_times.len()
            )));
        }

        Ok(CompetitorParseRecord {
            name,
            club,
            class_name,
            total_time,
            cum_times,
            competitive,
        })
    }
}

fn recognizers() -> Vec<(&'static str, Box<dyn Recognizer>)> {
    let preformatted: Box<dyn Recognizer> = Box::new(PreformattedRecognizer::default());
    let multi_table: Box<dyn Recognizer> = Box::new(MultiTableRecognizer::default());
    let oevent: Box<dyn Recognizer> = Box::new(OEventTabularRecognizer::default());
    vec![("preformatted", preformatted), ("multi-table", multi_table), ("OEvent tabular", oevent)]
}

// ============================================================================
// PARSER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// No course header seen yet
    AwaitingCourse,
    /// Reading control lines until one ends with the finish
    ReadingControls,
    /// Reading competitors in pairs of lines
    ReadingCompetitors,
}

struct HtmlFormatParser<'a> {
    recognizer: Box<dyn Recognizer>,
    lines: std::str::Split<'a, char>,
    state: ParserState,
    courses: Vec<CourseParseRecord>,
    current_course: Option<CourseParseRecord>,
    current_competitor: Option<CompetitorParseRecord>,
}

impl<'a> HtmlFormatParser<'a> {
    fn new(recognizer: Box<dyn Recognizer>, text: &'a str) -> Self {
        HtmlFormatParser {
            recognizer,
            lines: text.split('\n'),
            state: ParserState::AwaitingCourse,
            courses: Vec::new(),
            current_course: None,
            current_competitor: None,
        }
    }

    fn add_current_competitor_if_necessary(&mut self) -> Result<()> {
        if let Some(competitor) = self.current_competitor.take() {
            if let Some(course) = self.current_course.as_mut() {
                course.add_competitor(competitor)?;
            }
        }
        Ok(())
    }

    fn add_current_competitor_and_course_if_necessary(&mut self) -> Result<()> {
        self.add_current_competitor_if_necessary()?;
        if let Some(course) = self.current_course.take() {
            self.courses.push(course);
        }
        Ok(())
    }

    fn read_competitor_lines(&mut self, first_line: &str) -> Result<()> {
        let Some(second_line) = self.lines.next() else {
            return Err(ParseError::invalid(format!(
                "Hit end of input data unexpectedly while parsing competitor: first line was '{}'",
                first_line
            )));
        };

        let record = self.recognizer.parse_competitor(first_line, second_line)?;
        if record.is_continuation() {
            match self.current_competitor.as_mut() {
                Some(current) => current.append(record),
                None => return Err(ParseError::invalid("First row of competitor data has no name nor time")),
            }
        } else {
            self.add_current_competitor_if_necessary()?;
            self.current_competitor = Some(record);
        }
        Ok(())
    }

    fn parse(mut self) -> Result<Event> {
        while let Some(line) = self.lines.next() {
            if self.recognizer.can_ignore_this_line(line) {
                continue;
            }

            if self.recognizer.is_course_header_line(line) {
                self.add_current_competitor_and_course_if_necessary()?;
                let header = self.recognizer.parse_course_header_line(line)?;
                self.current_course = Some(CourseParseRecord::new(header));
                self.state = ParserState::ReadingControls;
                continue;
            }

            match self.state {
                ParserState::AwaitingCourse => {}
                ParserState::ReadingCompetitors => self.read_competitor_lines(line)?,
                ParserState::ReadingControls => {
                    let controls = self.recognizer.parse_controls_line(line)?;
                    if let Some(course) = self.current_course.as_mut() {
                        course.controls.extend(controls);
                        if course.has_all_controls() {
                            self.state = ParserState::ReadingCompetitors;
                        }
                    }
                }
            }
        }

        self.add_current_competitor_and_course_if_necessary()?;
        if self.courses.is_empty() {
            return Err(ParseError::invalid("No competitor data was found"));
        }
        create_overall_event(self.courses)
    }
}

/// Whether no class name turns up on more than one course
fn are_classes_unique_within_courses(courses: &[CourseParseRecord]) -> bool {
    let mut class_courses: Vec<(&Option<String>, &str)> = Vec::new();
    for course in courses {
        for competitor in &course.competitors {
            match class_courses.iter().find(|(class, _)| *class == &competitor.class_name) {
                Some((_, course_name)) if *course_name != course.header.name => return false,
                Some(_) => {}
                None => class_courses.push((&competitor.class_name, course.header.name.as_str())),
            }
        }
    }
    true
}

/// Uses the competitors' own classes when every competitor has one and no
/// class spans courses. Otherwise each course becomes a single class.
fn create_overall_event(courses: Vec<CourseParseRecord>) -> Result<Event> {
    let classes_unique_within_courses = are_classes_unique_within_courses(&courses);
    let competitors_have_classes = courses
        .iter()
        .all(|course| course.competitors.iter().all(|c| c.class_name.is_some()));
    let use_competitor_classes = competitors_have_classes && classes_unique_within_courses;

    let mut classes = Vec::new();
    let mut new_courses = Vec::with_capacity(courses.len());
    for course in courses {
        let num_controls = course.controls.len().saturating_sub(1);

        let mut by_class: Vec<(String, Vec<CompetitorParseRecord>)> = Vec::new();
        for competitor in course.competitors {
            let class_name = match (&competitor.class_name, use_competitor_classes) {
                (Some(class_name), true) => class_name.clone(),
                _ => course.header.name.clone(),
            };
            match by_class.iter_mut().find(|(name, _)| *name == class_name) {
                Some((_, competitors)) => competitors.push(competitor),
                None => by_class.push((class_name, vec![competitor])),
            }
        }

        let mut class_indexes = Vec::with_capacity(by_class.len());
        for (class_name, records) in by_class {
            let mut competitors = records
                .into_iter()
                .enumerate()
                .map(|(index, record)| record.into_competitor(index + 1))
                .collect::<Result<Vec<_>>>()?;
            competitors.sort_by(compare_competitors);
            class_indexes.push(classes.len());
            classes.push(CourseClass::new(class_name, num_controls, competitors));
        }

        let controls = course
            .controls
            .into_iter()
            .take(num_controls)
            .map(Option::unwrap_or_default)
            .collect();
        new_courses.push(Course::new(
            course.header.name,
            class_indexes,
            course.header.distance,
            course.header.climb,
            Some(controls),
        ));
    }

    Ok(Event::new(classes, new_courses))
}

// ============================================================================
// READER
// ============================================================================

/// Reads HTML results pages in any of the three supported layouts
pub struct HtmlReader;

impl EventReader for HtmlReader {
    fn name(&self) -> &'static str {
        "HTML"
    }

    fn sniff(&self, text: &str) -> bool {
        recognizers().iter().any(|(_, r)| r.is_text_of_this_format(text))
    }

    fn parse(&self, text: &str) -> Result<Event> {
        parse_html_event(text)
    }
}

pub fn parse_html_event(text: &str) -> Result<Event> {
    let text = normalise_line_endings(text);
    for (name, mut recognizer) in recognizers() {
        if recognizer.is_text_of_this_format(&text) {
            debug!(recognizer = name, "HTML recognizer chosen");
            let text = recognizer.preprocess(&text)?;
            return HtmlFormatParser::new(recognizer, &text).parse();
        }
    }

    Err(ParseError::wrong_format(
        "No HTML recognizers recognised this as HTML they could parse",
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PREFORMATTED: &str = "<html><head><title>Results</title></head><body>\n\
<pre>\n\
<font size=\"2\"><b>Course 1 (2)</b></font>  <font size=\"2\">4.1 km 140 m</font>\n\
                                                       1(208)   2(227)   F\n\
<font>1</font> <font></font> <font>John Smith</font> M21 <font>06:33</font>   01:05   03:41\n\
<font></font> <font></font> <font>ABC</font> <font></font>   01:05   02:36\n\
<font></font> <font></font> <font></font> <font></font>   06:33\n\
<font></font> <font></font> <font></font> <font></font>   02:52\n\
\n\
<font>2</font> <font></font> <font>Fred Baker</font> M21 <font>07:01</font>   01:10   04:00   07:01\n\
<font></font> <font></font> <font>DEF</font> <font></font>   01:10   02:50   03:01\n\
</pre>\n\
</body></html>\n";

    #[test]
    fn test_preformatted_format() {
        let event = parse_html_event(PREFORMATTED).unwrap();
        assert_eq!(event.courses.len(), 1);
        let course = &event.courses[0];
        assert_eq!(course.name, "Course 1");
        assert_eq!(course.length, Some(4.1));
        assert_eq!(course.climb, Some(140));
        assert_eq!(course.controls, Some(vec!["208".to_string(), "227".to_string()]));

        assert_eq!(event.classes.len(), 1);
        let class = &event.classes[0];
        assert_eq!(class.name, "M21");
        assert_eq!(class.num_controls, 2);
        let john = &class.competitors[0];
        assert_eq!(john.name, "John Smith");
        assert_eq!(john.club, "ABC");
        assert_eq!(john.start_time, None);
        assert_eq!(
            john.all_original_cumulative_times(),
            &[Some(0.0), Some(65.0), Some(221.0), Some(393.0)]
        );
        assert_eq!(class.competitors[1].name, "Fred Baker");
    }

    fn multi_table(course_has_class: bool) -> String {
        let (class_header, class_cell) = if course_has_class {
            ("<th>Class</th>", "<td>M21</td>")
        } else {
            ("", "")
        };
        let course = |name: &str| {
            format!(
                "<table><tr><td id=\"header\">{name} (2)</td><td>4.1 km</td><td>140 m</td></tr></table>\n\
                 <table>\n\
                 <tr><th>Pl</th><th>Stno</th><th>Name</th>{class_header}<th>Time</th></tr>\n\
                 <tr><td></td><td></td><td></td>{empty}<td></td><td>1(208)</td><td>2(227)</td><td>Finish</td></tr>\n\
                 <tr><td>1</td><td>123</td><td>John Smith</td>{class_cell}<td>06:33</td><td>01:05</td><td>03:41</td><td>06:33</td></tr>\n\
                 <tr><td></td><td></td><td>ABC</td>{empty}<td></td><td>01:05</td><td>02:36</td><td>02:52</td></tr>\n\
                 <tr><td>mp</td><td>124</td><td>Fred Baker</td>{class_cell}<td></td><td>01:10</td><td>-----</td><td>07:01</td></tr>\n\
                 <tr><td></td><td></td><td>DEF</td>{empty}<td></td><td>01:10</td><td></td><td>05:51</td></tr>\n\
                 </table>\n",
                empty = if course_has_class { "<td></td>" } else { "" },
            )
        };
        format!(
            "<html><body>\n<div><table><tr><td>Event</td></tr></table></div>\n{}{}</body></html>",
            course("Course 1"),
            course("Course 2")
        )
    }

    #[test]
    fn test_multi_table_format() {
        let event = parse_html_event(&multi_table(false)).unwrap();
        assert_eq!(event.courses.len(), 2);
        assert_eq!(event.classes.len(), 2);
        assert_eq!(event.classes[0].name, "Course 1");
        assert_eq!(event.courses[1].length, Some(4.1));
        assert_eq!(event.courses[1].climb, Some(140));

        let class = &event.classes[0];
        let john = &class.competitors[0];
        assert_eq!(john.club, "ABC");
        assert_eq!(john.total_time(), Some(393.0));
        let fred = &class.competitors[1];
        assert_eq!(
            fred.all_original_cumulative_times(),
            &[Some(0.0), Some(70.0), None, Some(421.0)]
        );
        assert!(!fred.is_non_competitive);
    }

    #[test]
    fn test_multi_table_class_repeated_across_courses_uses_course_names() {
        let event = parse_html_event(&multi_table(true)).unwrap();
        let names: Vec<&str> = event.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Course 1", "Course 2"]);
    }

    const OEVENT: &str = "<html><body>\n\
<table><tr><td>Event title</td></tr></table>\n\
<table>\n\
<tr class=\"clubName\"><td colspan=\"24\">Course 1 (4100m, 140m)</td></tr>\n\
<tr><td></td><td></td><td></td><td></td><td>1-208</td><td></td><td>2-227</td><td></td><td>F</td></tr>\n\
<tr><td>1</td><td>123</td><td>John Smith</td><td>06:33</td><td>01:05</td><td>1</td><td>03:41</td><td>1</td><td>06:33</td><td>1</td></tr>\n\
<tr><td></td><td></td><td>ABC</td><td></td><td>01:05</td><td>1</td><td>02:36</td><td>1</td><td>02:52</td><td>1</td></tr>\n\
<tr><td>mp</td><td>124</td><td>Fred Baker</td><td></td><td>01:10</td><td>2</td><td>-----</td><td></td><td>07:00</td><td></td></tr>\n\
<tr><td></td><td></td><td>DEF</td><td></td><td>01:10</td><td>2</td><td></td><td></td><td></td><td></td></tr>\n\
<tr><td colspan=\"24\">&nbsp;</td></tr>\n\
</table>\n\
</body></html>\n";

    #[test]
    fn test_oevent_tabular_format() {
        let event = parse_html_event(OEVENT).unwrap();
        assert_eq!(event.courses.len(), 1);
        let course = &event.courses[0];
        assert_eq!(course.name, "Course 1");
        assert_eq!(course.length, Some(4.1));
        assert_eq!(course.climb, Some(140));
        assert_eq!(course.controls, Some(vec!["208".to_string(), "227".to_string()]));

        let class = &event.classes[0];
        assert_eq!(class.name, "Course 1");
        assert_eq!(
            class.competitors[0].all_original_cumulative_times(),
            &[Some(0.0), Some(65.0), Some(221.0), Some(393.0)]
        );
        assert_eq!(
            class.competitors[1].all_original_cumulative_times(),
            &[Some(0.0), Some(70.0), None, Some(420.0)]
        );
    }

    #[test]
    fn test_read_control_codes() {
        let labels: Vec<String> = ["1(208)", "2(227)", "F"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            read_control_codes(&labels).unwrap(),
            vec![Some("208".to_string()), Some("227".to_string()), None]
        );

        let bad: Vec<String> = ["1(208)", "oops", "F"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(read_control_codes(&bad), Err(ParseError::InvalidData(_))));
    }

    #[test]
    fn test_remove_extra_controls() {
        let mut cum_times = vec![Some(65.0), Some(100.0), Some(120.0)];
        let mut split_times = vec!["01:05".to_string(), "*00:35".to_string(), "*00:20".to_string()];
        remove_extra_controls(&mut cum_times, &mut split_times);
        assert_eq!(cum_times, vec![Some(65.0)]);
        assert_eq!(split_times, vec!["01:05".to_string()]);
    }

    #[test]
    fn test_extraction_helpers() {
        assert_eq!(font_bits("<font a=\"1\"><b>x</b></font> y <font>z</font>"), vec!["x", "z"]);
        assert_eq!(table_data_bits("<tr><td> a </td><td></td><td><b>c</b></td></tr>"), vec!["a", "", "c"]);
        assert_eq!(try_read_distance("Length 5,3 km"), Some(5.3));
        assert_eq!(try_read_climb("Climb 210 m"), Some(210));
        assert!(has_number(" 12 "));
        assert!(!has_number("mp"));
        assert!(!has_number(""));
    }

    #[test]
    fn test_truncated_competitor_is_invalid() {
        let text = PREFORMATTED.replace("<font></font> <font></font> <font>DEF</font> <font></font>   01:10   02:50   03:01\n", "");
        assert!(matches!(parse_html_event(&text), Err(ParseError::InvalidData(_))));
    }

    #[test]
    fn test_unrecognised_html_is_wrong_format() {
        let err = parse_html_event("<html><body><p>Nothing here</p></body></html>").unwrap_err();
        assert!(err.is_wrong_format());
    }
}
