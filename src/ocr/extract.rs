use anyhow::Result;
use regex::Regex;
use tracing::debug;

/// Pattern for one labelled amount:
/// - one of the category labels
/// - optional separators: hyphen and dash variants, underscore, colon
/// - the `R$` currency marker
/// - digits grouped by `.` or `,`
const RECORD_PATTERN: &str = r"(?i)(?P<category>ESTRANGEIROS|INSTITUCIONAIS|PESSOA\s+F[IÍ]SICA)\s*[-\u{2014}\u{2013}_:]*\s*R\$\s*(?P<value>[\d.,]+)";

/// Investor category of an extracted amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// "ESTRANGEIROS"
    Foreigners,
    /// "INSTITUCIONAIS"
    Institutional,
    /// "PESSOA FISICA"
    Individual,
}

impl Category {
    /// Maps a matched label to its category, ignoring case, accents and spacing.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase()
            .replace('Í', "I");

        match normalized.as_str() {
            "ESTRANGEIROS" => Some(Self::Foreigners),
            "INSTITUCIONAIS" => Some(Self::Institutional),
            "PESSOA FISICA" => Some(Self::Individual),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foreigners => write!(f, "Foreigners"),
            Self::Institutional => write!(f, "Institutional"),
            Self::Individual => write!(f, "Individual"),
        }
    }
}

/// One (category, amount) pair read from the screen.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedRecord {
    pub category: Category,
    /// Label exactly as recognized, trimmed
    pub label: String,
    /// Whole-unit amount with group separators stripped
    pub value: f64,
}

impl ExtractedRecord {
    /// Display line: `"LABEL: R$ N"` with the value rounded to a whole number.
    pub fn display_line(&self) -> String {
        format!("{}: R$ {}", self.label, self.value.round())
    }
}

/// Turns raw OCR text into records.
#[derive(Clone, Debug)]
pub struct RecordParser {
    pattern: Regex,
}

impl RecordParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(RECORD_PATTERN)?,
        })
    }

    /// Extracts every labelled amount in text order.
    ///
    /// Matches whose amount does not parse are dropped one by one; a garbled
    /// amount never hides the valid matches around it. Repeated categories
    /// are kept as separate records.
    pub fn parse(&self, text: &str) -> Vec<ExtractedRecord> {
        let normalized = normalize_whitespace(text);
        let mut records = Vec::new();

        for caps in self.pattern.captures_iter(&normalized) {
            let label = caps["category"].trim();
            let raw_value = &caps["value"];

            let Some(category) = Category::from_label(label) else {
                continue;
            };

            match parse_amount(raw_value) {
                Some(value) => records.push(ExtractedRecord {
                    category,
                    label: label.to_string(),
                    value,
                }),
                None => debug!("Dropping unreadable amount for {}: {:?}", label, raw_value),
            }
        }

        records
    }
}

/// Collapses whitespace runs (including newlines) to one space and trims.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses an amount token, treating both `.` and `,` as group separators.
///
/// There is no fractional part: `"1.234,00"` is 123400.
pub fn parse_amount(token: &str) -> Option<f64> {
    let digits: String = token
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    digits.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ExtractedRecord> {
        RecordParser::new().unwrap().parse(text)
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.234,00"), Some(123400.0));
        assert_eq!(parse_amount("12,345"), Some(12345.0));
        assert_eq!(parse_amount("1.234.567"), Some(1234567.0));
        assert_eq!(parse_amount("R$ 500"), Some(500.0));
        assert_eq!(parse_amount(".,"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_individual_amount_with_cents_is_whole_units() {
        let records = parse("PESSOA FISICA - R$ 1.234,00");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Individual);
        assert_eq!(records[0].label, "PESSOA FISICA");
        assert_eq!(records[0].value, 123400.0);
    }

    #[test]
    fn test_all_categories_in_text_order() {
        let text = "Fluxo do dia\nINSTITUCIONAIS — R$ 2.000\n\
                    ESTRANGEIROS_R$ 15.300,50\n  pessoa   fisica – R$98";
        let records = parse(text);

        let categories: Vec<Category> = records.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![Category::Institutional, Category::Foreigners, Category::Individual]
        );
        assert_eq!(records[0].value, 2000.0);
        assert_eq!(records[1].value, 1530050.0);
        assert_eq!(records[2].value, 98.0);
        // Label keeps the recognized casing, whitespace collapsed
        assert_eq!(records[2].label, "pessoa fisica");
    }

    #[test]
    fn test_label_split_across_lines() {
        let records = parse("PESSOA\nFISICA R$ 10");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Individual);
        assert_eq!(records[0].label, "PESSOA FISICA");
    }

    #[test]
    fn test_accented_label() {
        let records = parse("PESSOA FÍSICA - R$ 7");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Individual);
    }

    #[test]
    fn test_non_numeric_amount_yields_nothing() {
        assert!(parse("ESTRANGEIROS - R$ abc").is_empty());
        assert!(parse("ESTRANGEIROS - R$ .,.").is_empty());
    }

    #[test]
    fn test_malformed_amount_does_not_hide_others() {
        let records = parse("ESTRANGEIROS R$ ., INSTITUCIONAIS R$ 1.000");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, Category::Institutional);
        assert_eq!(records[0].value, 1000.0);
    }

    #[test]
    fn test_duplicates_preserved() {
        let records = parse("ESTRANGEIROS R$ 1 ESTRANGEIROS R$ 2");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, 1.0);
        assert_eq!(records[1].value, 2.0);
    }

    #[test]
    fn test_no_currency_marker_no_match() {
        assert!(parse("ESTRANGEIROS 1.000").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_display_line_round_trips() {
        let parser = RecordParser::new().unwrap();
        for text in [
            "PESSOA FISICA - R$ 1.234,00",
            "INSTITUCIONAIS — R$ 98.765.432",
            "estrangeiros_R$7",
        ] {
            let original = parser.parse(text);
            assert_eq!(original.len(), 1, "{text}");

            let line = original[0].display_line();
            let reparsed = parser.parse(&line);
            assert_eq!(reparsed.len(), 1, "{line}");
            assert_eq!(reparsed[0].category, original[0].category);
            assert_eq!(reparsed[0].value, original[0].value);
        }
    }

    #[test]
    fn test_display_line_format() {
        let record = ExtractedRecord {
            category: Category::Foreigners,
            label: "ESTRANGEIROS".to_string(),
            value: 1530050.0,
        };
        assert_eq!(record.display_line(), "ESTRANGEIROS: R$ 1530050");
    }

    #[test]
    fn test_category_from_label() {
        assert_eq!(Category::from_label("Institucionais"), Some(Category::Institutional));
        assert_eq!(Category::from_label("pessoa  física"), Some(Category::Individual));
        assert_eq!(Category::from_label("bancos"), None);
    }
}
