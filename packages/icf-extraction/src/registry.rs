//! Variable registry - the ICF template breakdown CSV.
//!
//! Headers are matched case-insensitively with surrounding whitespace
//! ignored. Labels that do not map onto [`Complexity`] or [`Availability`]
//! are fatal: a silently defaulted label would change the search budget.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::types::variable::{Availability, Complexity, Variable};

const SECTION_ID: &str = "Section ID";
const HEADING: &str = "Heading";
const SUB_SECTION: &str = "Sub-Section";
const INSTRUCTIONS: &str = "Instructions for Filling";
const REQUIRED_TEXT: &str = "Required Text in ICF Template";
const SUGGESTED_TEXT: &str = "Suggested Text";
const PROTOCOL_SECTION: &str = "UHN Protocol Section";
const SPONSOR_SECTION: &str = "Sponsor Protocol Section";
const COMPLEXITY: &str = "Complexity";
const AVAILABILITY: &str = "Conventionally in protocol?";
const STATUS: &str = "Status";

const REQUIRED_COLUMNS: [&str; 5] = [SECTION_ID, HEADING, INSTRUCTIONS, COMPLEXITY, AVAILABILITY];

/// Column positions by normalized header name.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> RegistryResult<Self> {
        let map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (header_key(h), i))
            .collect();

        for column in REQUIRED_COLUMNS {
            if !map.contains_key(&header_key(column)) {
                return Err(RegistryError::MissingColumn { column });
            }
        }

        Ok(Self(map))
    }

    /// Cell text, entity-decoded and trimmed. Missing columns read as empty.
    fn get(&self, record: &csv::StringRecord, column: &str) -> String {
        self.0
            .get(&header_key(column))
            .and_then(|&i| record.get(i))
            .map(|cell| decode_entities(cell.trim()))
            .unwrap_or_default()
    }
}

fn header_key(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').to_lowercase()
}

/// Decode the HTML entities spreadsheet exports leave in cells.
/// Non-breaking spaces become plain spaces.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    html_escape::decode_html_entities(text).replace('\u{a0}', " ")
}

/// Tags from a complexity cell: plain text or `['Easy mapping', 'Standard text']`.
fn complexity_tags(raw: &str) -> Vec<String> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);

    inner
        .split(',')
        .map(|tag| {
            tag.trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .trim()
                .to_lowercase()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Map complexity tags to a complexity and the standard-text flag.
///
/// With several mapping tags the most demanding one wins. "Not in
/// protocol" only applies when no mapping tag is present.
fn parse_complexity(section_id: &str, raw: &str) -> RegistryResult<(Complexity, bool)> {
    let unknown = || RegistryError::UnknownComplexity {
        section_id: section_id.to_string(),
        label: raw.to_string(),
    };

    let tags = complexity_tags(raw);
    if tags.is_empty() {
        return Err(unknown());
    }

    let mut standard_text = false;
    let mut not_in_protocol = false;
    let mut mapped: Option<Complexity> = None;
    let rank = |c: Complexity| match c {
        Complexity::Easy => 0,
        Complexity::Moderate => 1,
        Complexity::Complex => 2,
        Complexity::NotInProtocol => -1,
    };

    for tag in &tags {
        let complexity = if tag.contains("standard text") {
            standard_text = true;
            continue;
        } else if tag.contains("potentially in protocol") {
            Complexity::Moderate
        } else if tag.contains("not in protocol") {
            not_in_protocol = true;
            continue;
        } else if tag.contains("complex") {
            Complexity::Complex
        } else if tag.contains("moderate") {
            Complexity::Moderate
        } else if tag.contains("easy") {
            Complexity::Easy
        } else {
            return Err(RegistryError::UnknownComplexity {
                section_id: section_id.to_string(),
                label: tag.clone(),
            });
        };

        if mapped.map_or(true, |current| rank(complexity) > rank(current)) {
            mapped = Some(complexity);
        }
    }

    let complexity = match (mapped, not_in_protocol) {
        (Some(c), _) => c,
        (None, true) => Complexity::NotInProtocol,
        (None, false) => Complexity::Easy,
    };

    Ok((complexity, standard_text))
}

fn parse_availability(section_id: &str, raw: &str) -> RegistryResult<Availability> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(Availability::Yes),
        "no" | "n" | "false" => Ok(Availability::No),
        "partially" | "partial" => Ok(Availability::Partially),
        _ => Err(RegistryError::UnknownAvailability {
            section_id: section_id.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn is_always_skip(instructions: &str) -> bool {
    let lower = instructions.trim().to_lowercase();
    lower.starts_with("n/a") || lower.contains("[skip]") || lower.contains("not applicable")
}

/// Parse a registry from any CSV reader. `source` names it in errors.
pub fn parse_registry<R: Read>(reader: R, source: &Path) -> RegistryResult<Vec<Variable>> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let columns = Columns::from_headers(csv.headers()?)?;
    let mut seen = HashSet::new();
    let mut variables = Vec::new();

    for (idx, record) in csv.records().enumerate() {
        let record = record?;
        // Header is row 1
        let row = idx + 2;

        let section_id = columns.get(&record, SECTION_ID);
        if section_id.is_empty() {
            continue;
        }
        if columns.get(&record, STATUS).eq_ignore_ascii_case("excluded") {
            debug!(section_id = %section_id, "Skipping excluded registry row");
            continue;
        }
        if !seen.insert(section_id.clone()) {
            return Err(RegistryError::DuplicateSection { section_id, row });
        }

        let (complexity, standard_text) =
            parse_complexity(&section_id, &columns.get(&record, COMPLEXITY))?;
        let availability = parse_availability(&section_id, &columns.get(&record, AVAILABILITY))?;
        let instructions = columns.get(&record, INSTRUCTIONS);
        let sub_section = columns.get(&record, SUB_SECTION);

        let mut variable = Variable::new(
            section_id,
            columns.get(&record, HEADING),
            complexity,
            availability,
        )
        .with_template(columns.get(&record, REQUIRED_TEXT))
        .with_suggested_text(columns.get(&record, SUGGESTED_TEXT))
        .with_location_hints(
            columns.get(&record, PROTOCOL_SECTION),
            columns.get(&record, SPONSOR_SECTION),
        );

        if !sub_section.is_empty() {
            variable = variable.with_sub_section(sub_section);
        }
        if standard_text {
            variable = variable.standard_text();
        }
        if is_always_skip(&instructions) {
            variable = variable.always_skip();
        }

        variables.push(variable.with_instructions(instructions));
    }

    if variables.is_empty() {
        return Err(RegistryError::Empty {
            path: source.to_path_buf(),
        });
    }

    Ok(variables)
}

/// Load the registry CSV at `path`.
pub fn load_registry(path: impl AsRef<Path>) -> RegistryResult<Vec<Variable>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RegistryError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| RegistryError::Csv(e.into()))?;
    let variables = parse_registry(file, path)?;

    info!(
        path = %path.display(),
        variables = variables.len(),
        standard_text = variables.iter().filter(|v| v.standard_text).count(),
        always_skip = variables.iter().filter(|v| v.always_skip).count(),
        "Loaded variable registry"
    );

    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Section ID,Heading,Sub-Section,Instructions for Filling,Required Text in ICF Template,Suggested Text,UHN Protocol Section,Sponsor Protocol Section,Complexity,Conventionally in protocol?\n";

    fn parse(rows: &str) -> RegistryResult<Vec<Variable>> {
        let csv = format!("{HEADER}{rows}");
        parse_registry(csv.as_bytes(), Path::new("registry.csv"))
    }

    #[test]
    fn test_parse_rows() {
        let vars = parse(
            "1,Title,,State the study title,{{ title }},,Title page,Cover,Easy mapping,Yes\n\
             8,Study Procedures,Visits,&quot;How often&quot; &amp; where,,,Section 6,,\"['Moderate mapping', 'Not in protocol']\",Partially\n\
             ,,,,,,,,,\n\
             6,Contact,,Use standard text,Call {{ phone }},,,,['Standard text'],yes\n\
             2,Sponsor slot,,N/A for investigator-initiated studies,,,,,Not in protocol,No\n",
        )
        .unwrap();

        assert_eq!(vars.len(), 4);

        assert_eq!(vars[0].section_id, "1");
        assert_eq!(vars[0].complexity, Complexity::Easy);
        assert_eq!(vars[0].required_template, "{{ title }}");
        assert!(vars[0].sub_section.is_none());

        assert_eq!(vars[1].instructions, "\"How often\" & where");
        assert_eq!(vars[1].complexity, Complexity::Moderate);
        assert_eq!(vars[1].availability, Availability::Partially);
        assert_eq!(vars[1].sub_section.as_deref(), Some("Visits"));

        assert!(vars[2].standard_text);
        assert_eq!(vars[2].complexity, Complexity::Easy);

        assert!(vars[3].always_skip);
        assert_eq!(vars[3].complexity, Complexity::NotInProtocol);
        assert_eq!(vars[3].availability, Availability::No);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let csv = "section id , HEADING,instructions for filling,complexity,CONVENTIONALLY IN PROTOCOL?\n3,Purpose,Why,Complex mapping,y\n";
        let vars = parse_registry(csv.as_bytes(), Path::new("r.csv")).unwrap();
        assert_eq!(vars[0].complexity, Complexity::Complex);
        assert_eq!(vars[0].availability, Availability::Yes);
        assert!(vars[0].suggested_text.is_empty());
    }

    #[test]
    fn test_unknown_complexity_is_fatal() {
        let err = parse("4,Risks,,List risks,,,,,Tricky,Yes\n").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnknownComplexity { ref section_id, ref label }
                if section_id == "4" && label == "tricky"
        ));
    }

    #[test]
    fn test_unknown_availability_is_fatal() {
        let err = parse("4,Risks,,List risks,,,,,Easy,Sometimes\n").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownAvailability { .. }));
    }

    #[test]
    fn test_duplicate_section_is_fatal() {
        let err = parse("4,Risks,,a,,,,,Easy,Yes\n4,Risks again,,b,,,,,Easy,Yes\n").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateSection { row: 3, .. }
        ));
    }

    #[test]
    fn test_missing_column() {
        let csv = "Section ID,Heading,Complexity\n1,Title,Easy\n";
        let err = parse_registry(csv.as_bytes(), Path::new("r.csv")).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MissingColumn { column: "Instructions for Filling" }
        ));
    }

    #[test]
    fn test_empty_registry() {
        assert!(matches!(parse(""), Err(RegistryError::Empty { .. })));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &#39;c&#39; &#x41;"), "a <b> 'c' A");
        assert_eq!(decode_entities("AT&T & co"), "AT&T & co");
        assert_eq!(
            decode_entities("Patient&rsquo;s care &ndash; &eacute;tude &hellip;"),
            "Patient\u{2019}s care \u{2013} \u{e9}tude \u{2026}"
        );
        assert_eq!(decode_entities("10&nbsp;mg"), "10 mg");
    }

    #[test]
    fn test_load_registry_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{HEADER}1,Title,,State the title,,,,,Easy,Yes\n").unwrap();

        let vars = load_registry(file.path()).unwrap();
        assert_eq!(vars.len(), 1);

        assert!(matches!(
            load_registry("/nonexistent/registry.csv"),
            Err(RegistryError::NotFound { .. })
        ));
    }
}
