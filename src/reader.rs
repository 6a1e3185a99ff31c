use tracing::{debug, info};

use crate::alt_csv_handler::AltCsvReader;
use crate::csv_handler::CsvReader;
use crate::error::{ParseError, Result};
use crate::event::Event;
use crate::html_handler::HtmlReader;
use crate::oe_handler::OeReader;
use crate::si_handler::SiReader;
use crate::xml_handler::IofXmlReader;

/// What came of offering some text to one reader
#[derive(Debug)]
pub enum ReadOutcome {
    /// The reader understood the text
    Recognized(Event),
    /// The text is not in this reader's format; another reader may take it
    NotThisFormat(String),
    /// The text is in this reader's format but its data is broken
    Malformed(String),
}

/// A reader for one family of results file formats
pub trait EventReader {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Cheap check on the raw text, made before attempting a full parse
    fn sniff(&self, text: &str) -> bool;

    /// Parses the text into an event. Text found not to be in this format
    /// after all gives `WrongFileFormat`.
    fn parse(&self, text: &str) -> Result<Event>;

    /// Sniffs, then parses, classifying the result
    fn read(&self, text: &str) -> ReadOutcome {
        if !self.sniff(text) {
            return ReadOutcome::NotThisFormat(format!("{} reader does not recognise the data", self.name()));
        }

        match self.parse(text) {
            Ok(event) => ReadOutcome::Recognized(event),
            Err(ParseError::WrongFileFormat(message)) => {
                debug!(reader = self.name(), %message, "reader declined data after sniffing it");
                ReadOutcome::NotThisFormat(message)
            }
            Err(ParseError::InvalidData(message)) => ReadOutcome::Malformed(message),
        }
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Every reader, in the order they are offered data
pub fn readers() -> Vec<Box<dyn EventReader>> {
    vec![
        Box::new(CsvReader),
        Box::new(OeReader),
        Box::new(SiReader),
        Box::new(HtmlReader),
        Box::new(AltCsvReader),
        Box::new(IofXmlReader),
    ]
}

/// Offers the text to each reader in turn. Returns the first event read,
/// or `None` if no reader recognises the text. Data that a reader
/// recognises but finds broken stops the search.
pub fn parse_event_data(text: &str) -> Result<Option<Event>> {
    for reader in readers() {
        match reader.read(text) {
            ReadOutcome::Recognized(event) => {
                info!(
                    reader = reader.name(),
                    classes = event.classes.len(),
                    courses = event.courses.len(),
                    "read event"
                );
                return Ok(Some(event));
            }
            ReadOutcome::NotThisFormat(_) => continue,
            ReadOutcome::Malformed(message) => return Err(ParseError::InvalidData(message)),
        }
    }

    debug!("no reader recognised the data");
    Ok(None)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReader(Result<Event>);

    impl EventReader for FixedReader {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn sniff(&self, text: &str) -> bool {
            !text.is_empty()
        }

        fn parse(&self, _text: &str) -> Result<Event> {
            self.0.clone()
        }
    }

    #[test]
    fn test_read_classifies_outcomes() {
        assert!(matches!(
            FixedReader(Ok(Event::default())).read("x"),
            ReadOutcome::Recognized(_)
        ));
        assert!(matches!(
            FixedReader(Ok(Event::default())).read(""),
            ReadOutcome::NotThisFormat(_)
        ));
        assert!(matches!(
            FixedReader(Err(ParseError::wrong_format("no"))).read("x"),
            ReadOutcome::NotThisFormat(_)
        ));
        match FixedReader(Err(ParseError::invalid("broken"))).read("x") {
            ReadOutcome::Malformed(message) => assert_eq!(message, "broken"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_reader_order() {
        let names: Vec<&str> = readers().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["CSV", "OE", "SI", "HTML", "alternative CSV", "IOF XML"]);
    }

    #[test]
    fn test_unrecognised_data_gives_none() {
        assert!(parse_event_data("").unwrap().is_none());
        assert!(parse_event_data("just some words").unwrap().is_none());
    }
}
