pub mod alt_csv_handler;
pub mod competitor;
pub mod course;
pub mod course_class;
pub mod csv_handler;
pub mod error;
pub mod event;
pub mod html_handler;
pub mod oe_handler;
pub mod output;
pub mod reader;
pub mod si_handler;
pub mod utils;
pub mod xml_handler;

// ============================================================================
// DATA MODEL RE-EXPORTS
// ============================================================================
pub use competitor::{compare_competitors, Competitor, ControlIndexRange, Gender};
pub use course::{ControlCode, Course, LegFastestSplit};
pub use course_class::{CompetitorAtControl, CourseClass, FastestSplit};
pub use error::{ParseError, Result};
pub use event::{Event, NextControls};

// ============================================================================
// READER RE-EXPORTS
// ============================================================================
pub use alt_csv_handler::{parse_triple_column_event, AltCsvReader};
pub use csv_handler::{parse_csv_event, CsvReader};
pub use html_handler::{parse_html_event, HtmlReader};
pub use oe_handler::{parse_oe_event, OeReader};
pub use si_handler::{parse_si_event, SiReader};
pub use xml_handler::{parse_iof_xml_event, IofXmlReader};

// ============================================================================
// EVENT PROCESSING (dispatcher)
// ============================================================================
pub use reader::{parse_event_data, readers, EventReader, ReadOutcome};

// ============================================================================
// OUTPUT
// ============================================================================
pub use output::{print_event_summary, write_splits_csv, OutputOptions};
pub use utils::format_time;
