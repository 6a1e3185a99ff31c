use std::error::Error;
use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::competitor::Competitor;
use crate::course::Course;
use crate::event::Event;
use crate::utils::format_time;

// ============================================================================
// OUTPUT FORMATTING
// ============================================================================

/// Configuration for output display
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub show_courses: bool,
    /// Print each competitor's split times under their total
    pub show_splits: bool,
    /// Print time lost at each control (needs time losses computed first)
    pub show_time_losses: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            show_courses: true,
            show_splits: true,
            show_time_losses: false,
        }
    }
}

fn course_line(course: &Course) -> String {
    let length = course.length.map(|l| format!("{:.1}km", l)).unwrap_or_else(|| "?km".to_string());
    let climb = course.climb.map(|c| format!("{}m", c)).unwrap_or_else(|| "?m".to_string());
    let controls = match &course.controls {
        Some(controls) => controls.join("-"),
        None => "controls unknown".to_string(),
    };
    format!("Course: {} {} {} ({})", course.name, length, climb, controls)
}

fn status_text(competitor: &Competitor) -> Option<&'static str> {
    if competitor.is_non_starter {
        Some("dns")
    } else if competitor.is_non_finisher {
        Some("dnf")
    } else if competitor.is_disqualified {
        Some("dsq")
    } else if competitor.is_over_max_time {
        Some("over time")
    } else if competitor.is_non_competitive {
        Some("n/c")
    } else {
        None
    }
}

/// The lines `print_event_summary` prints
pub fn event_summary_lines(event: &Event, options: &OutputOptions) -> Vec<String> {
    let mut lines = Vec::new();

    if options.show_courses {
        for course in &event.courses {
            lines.push(course_line(course));
        }
    }

    for class in &event.classes {
        lines.push(String::new());
        let course_name = event.course_of(class).map(|c| c.name.as_str()).unwrap_or("?");
        lines.push(format!("Class: {} [{}] {} controls", class.name, course_name, class.num_controls));
        lines.push(format!("{:-<80}", ""));

        for competitor in &class.competitors {
            let mut line = format!(
                "{:25} {:20} {:>9}",
                competitor.name,
                competitor.club,
                format_time(competitor.total_time(), None)
            );
            if let Some(status) = status_text(competitor) {
                line.push_str(&format!(" ({})", status));
            }
            lines.push(line);

            if options.show_splits && competitor.has_any_times() {
                let splits: Vec<String> = competitor.split_times().iter().map(|s| format_time(*s, None)).collect();
                lines.push(format!("    Splits: {}", splits.join(" ")));
            }

            if options.show_time_losses {
                let losses: Vec<String> = (1..=class.num_controls + 1)
                    .map(|control| format_time(competitor.get_time_loss_at(control), None))
                    .collect();
                lines.push(format!("    Losses: {}", losses.join(" ")));
            }
        }
    }

    lines
}

/// Prints courses, then each class with its competitors, to stdout
pub fn print_event_summary(event: &Event, options: &OutputOptions) {
    for line in event_summary_lines(event, options) {
        println!("{}", line);
    }
}

// ============================================================================
// SPLITS CSV OUTPUT
// ============================================================================

/// One competitor's row; cumulative times follow as extra columns
#[derive(Debug, Serialize)]
struct SplitsRow<'a> {
    class: &'a str,
    course: &'a str,
    name: &'a str,
    club: &'a str,
    start: String,
    total: String,
    cumulative_times: Vec<String>,
}

/// Writes one row per competitor with class, course, name, club, start,
/// total and cumulative times
pub fn write_splits_csv(event: &Event, path: &Path) -> Result<(), Box<dyn Error>> {
    let max_controls = event.classes.iter().map(|c| c.num_controls).max().unwrap_or(0);

    let file = File::create(path)?;
    // The header is written by hand since rows have a variable-width tail
    let mut writer = csv::WriterBuilder::new().has_headers(false).flexible(true).from_writer(file);

    let mut header: Vec<String> = ["class", "course", "name", "club", "start", "total"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend((1..=max_controls).map(|i| format!("control{}", i)));
    header.push("finish".to_string());
    writer.write_record(&header)?;

    for class in &event.classes {
        let course = event.course_of(class).map(|c| c.name.as_str()).unwrap_or_default();
        for competitor in &class.competitors {
            let cumulative_times = competitor
                .all_cumulative_times()
                .iter()
                .skip(1)
                .map(|t| format_time(*t, None))
                .collect();

            writer.serialize(SplitsRow {
                class: &class.name,
                course,
                name: &competitor.name,
                club: &competitor.club,
                start: competitor.start_time.map(|t| format_time(Some(t), None)).unwrap_or_default(),
                total: format_time(competitor.total_time(), None),
                cumulative_times,
            })?;
        }
    }

    writer.flush()?;
    println!("Splits written to {}", path.display());
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_class::CourseClass;

    fn sample_event() -> Event {
        let times = |t: &[f64]| t.iter().map(|&v| Some(v)).collect::<Vec<_>>();
        let john = Competitor::from_cum_times(1, "John Smith", "ABC", Some(36000.0), times(&[0.0, 65.0, 221.0, 393.0])).unwrap();
        let mut fred =
            Competitor::from_cum_times(2, "Fred Baker", "DEF", None, vec![Some(0.0), None, Some(210.0), Some(380.0)]).unwrap();
        fred.is_disqualified = true;

        let classes = vec![CourseClass::new("M21", 2, vec![john, fred])];
        let courses = vec![Course::new(
            "Course 1",
            vec![0],
            Some(4.1),
            Some(140),
            Some(vec!["208".to_string(), "227".to_string()]),
        )];
        Event::new(classes, courses)
    }

    #[test]
    fn test_summary_lines() {
        let lines = event_summary_lines(&sample_event(), &OutputOptions::default());
        assert_eq!(lines[0], "Course: Course 1 4.1km 140m (208-227)");
        assert_eq!(lines[2], "Class: M21 [Course 1] 2 controls");
        assert!(lines[4].starts_with("John Smith"));
        assert!(lines[4].ends_with("06:33"));
        assert_eq!(lines[5], "    Splits: 01:05 02:36 02:52");
        assert!(lines[6].ends_with("----- (dsq)"));
        assert_eq!(lines[7], "    Splits: ----- ----- 02:50");
    }

    #[test]
    fn test_summary_without_courses_or_splits() {
        let options = OutputOptions {
            show_courses: false,
            show_splits: false,
            show_time_losses: false,
        };
        let lines = event_summary_lines(&sample_event(), &options);
        assert_eq!(lines.len(), 5);
        assert!(lines.iter().all(|line| !line.starts_with("Course:")));
    }

    #[test]
    fn test_write_splits_csv() {
        let path = std::env::temp_dir().join(format!("splits_ingest_output_{}.csv", std::process::id()));
        write_splits_csv(&sample_event(), &path).unwrap();

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["class", "course", "name", "club", "start", "total", "control1", "control2", "finish"]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].iter().collect::<Vec<_>>(),
            vec!["M21", "Course 1", "John Smith", "ABC", "10:00:00", "06:33", "01:05", "03:41", "06:33"]
        );
        assert_eq!(&rows[1][4], "");
        assert_eq!(&rows[1][5], "-----");

        std::fs::remove_file(&path).unwrap();
    }
}
