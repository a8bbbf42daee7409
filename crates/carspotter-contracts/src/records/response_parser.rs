use log::warn;

use crate::error::ParseError;

use super::{BoundingBox, VehicleRecord};

const IDENTIFICATION_ARITY: usize = 4;
const BOX_ARITY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub year: String,
    pub make: String,
    pub model: String,
    pub color: String,
}

impl Identification {
    fn from_tokens(tokens: &[String]) -> Option<Self> {
        if tokens.len() < IDENTIFICATION_ARITY {
            return None;
        }
        Some(Self {
            year: tokens[0].clone(),
            make: tokens[1].clone(),
            model: tokens[2].clone(),
            color: tokens[3].clone(),
        })
    }

    fn into_record(self) -> VehicleRecord {
        VehicleRecord::new(self.year, self.make, self.model, self.color)
    }
}

/// Structural reading of a model reply, before box validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedShape {
    Basic(Identification),
    WithBox {
        identification: Identification,
        coords: [i64; BOX_ARITY],
    },
}

impl ParsedShape {
    pub fn into_outcome(self) -> ParseOutcome {
        match self {
            Self::Basic(identification) => ParseOutcome {
                record: identification.into_record(),
                degradation: None,
            },
            Self::WithBox {
                identification,
                coords,
            } => {
                let [x1, y1, x2, y2] = coords;
                let record = identification.into_record();
                match BoundingBox::new(x1, y1, x2, y2) {
                    Some(bounding_box) => ParseOutcome {
                        record: record.with_bounding_box(bounding_box),
                        degradation: None,
                    },
                    None => ParseOutcome {
                        record,
                        degradation: Some(Degradation::InvalidBoundingBox(coords)),
                    },
                }
            }
        }
    }
}

/// Part of the reply that was discarded while still producing a usable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degradation {
    InvalidBoundingBox([i64; BOX_ARITY]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub record: VehicleRecord,
    pub degradation: Option<Degradation>,
}

pub fn parse_response(raw: &str, expect_bbox: bool) -> Result<VehicleRecord, ParseError> {
    parse_response_detailed(raw, expect_bbox).map(|outcome| outcome.record)
}

pub fn parse_response_detailed(raw: &str, expect_bbox: bool) -> Result<ParseOutcome, ParseError> {
    let outcome = parse_shape(raw, expect_bbox)?.into_outcome();
    if let Some(Degradation::InvalidBoundingBox([x1, y1, x2, y2])) = outcome.degradation {
        warn!("dropping invalid bounding box ({x1}, {y1}, {x2}, {y2}) for {}", outcome.record.title());
    }
    Ok(outcome)
}

pub fn parse_shape(raw: &str, expect_bbox: bool) -> Result<ParsedShape, ParseError> {
    let line = response_line(raw);
    let body = strip_enclosing_parens(&line);
    let groups = split_groups(body);

    let id_tokens = split_tokens(groups[0]);
    let identification = Identification::from_tokens(&id_tokens).ok_or_else(|| {
        ParseError::malformed(
            raw,
            format!(
                "expected {IDENTIFICATION_ARITY} identification fields, found {}",
                id_tokens.len()
            ),
        )
    })?;

    if !expect_bbox {
        return Ok(ParsedShape::Basic(identification));
    }

    let Some(box_group) = groups.get(1) else {
        return Err(ParseError::malformed(
            raw,
            "missing `), (` boundary before bounding box",
        ));
    };
    let box_tokens = split_tokens(box_group);
    if box_tokens.len() < BOX_ARITY {
        return Err(ParseError::malformed(
            raw,
            format!(
                "expected {BOX_ARITY} box coordinates, found {}",
                box_tokens.len()
            ),
        ));
    }
    let mut coords = [0_i64; BOX_ARITY];
    for (slot, token) in coords.iter_mut().zip(&box_tokens) {
        *slot = parse_coordinate(token).ok_or_else(|| {
            ParseError::malformed(raw, format!("non-numeric box coordinate {token:?}"))
        })?;
    }
    Ok(ParsedShape::WithBox {
        identification,
        coords,
    })
}

fn response_line(raw: &str) -> String {
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect::<Vec<&str>>()
        .join(" ");
    trim_wrapping(&joined).to_string()
}

fn trim_wrapping(text: &str) -> &str {
    let mut current = text.trim();
    loop {
        let next = current
            .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`'))
            .trim_end_matches(|ch: char| matches!(ch, '.' | ';' | '!'))
            .trim();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_enclosing_parens(text: &str) -> &str {
    match text.strip_prefix('(') {
        Some(inner) => inner.strip_suffix(')').unwrap_or(inner).trim(),
        None => text,
    }
}

/// Splits on `), (` boundaries; parentheses inside a field do not split.
fn split_groups(body: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut cursor = 0;
    while let Some(offset) = body[cursor..].find(')') {
        let close = cursor + offset;
        let rest = body[close + 1..].trim_start();
        let next_group = rest
            .strip_prefix(',')
            .map(str::trim_start)
            .filter(|tail| tail.starts_with('('));
        match next_group {
            Some(tail) => {
                groups.push(&body[start..close]);
                start = body.len() - tail.len() + 1;
                cursor = start;
            }
            None => cursor = close + 1,
        }
    }
    groups.push(&body[start..]);
    groups
}

fn split_tokens(group: &str) -> Vec<String> {
    group
        .split(',')
        .map(|token| {
            token
                .trim()
                .trim_matches(|ch: char| matches!(ch, '"' | '`'))
                .trim()
                .to_string()
        })
        .collect()
}

fn parse_coordinate(token: &str) -> Option<i64> {
    token
        .trim_matches(|ch: char| ch == '(' || ch == ')' || ch.is_whitespace())
        .trim_end_matches('.')
        .parse::<i64>()
        .ok()
}

#[cfg(test)]
mod tests {
    use crate::error::ParseError;
    use crate::records::{BoundingBox, UNKNOWN};

    use super::{
        parse_response, parse_response_detailed, parse_shape, split_groups, Degradation,
        ParsedShape,
    };

    #[test]
    fn parses_plain_shape() -> anyhow::Result<()> {
        let record = parse_response("2023, Tesla, Model S, #000000", false)?;
        assert_eq!(record.year, "2023");
        assert_eq!(record.make, "Tesla");
        assert_eq!(record.model, "Model S");
        assert_eq!(record.color, "#000000");
        assert_eq!(record.bounding_box, None);
        assert_eq!(record.enrichment, None);
        Ok(())
    }

    #[test]
    fn parses_boxed_shape() -> anyhow::Result<()> {
        let record = parse_response("(2023, Tesla, Model S, #000000), (10, 20, 300, 250)", true)?;
        assert_eq!(record.title(), "2023 Tesla Model S");
        assert_eq!(record.color, "#000000");
        assert_eq!(
            record.bounding_box,
            Some(BoundingBox {
                x1: 10,
                y1: 20,
                x2: 300,
                y2: 250
            })
        );
        Ok(())
    }

    #[test]
    fn inverted_box_degrades_to_identification_only() -> anyhow::Result<()> {
        let outcome =
            parse_response_detailed("(2023, Tesla, Model S, #000000), (300, 20, 10, 250)", true)?;
        assert_eq!(outcome.record.make, "Tesla");
        assert_eq!(outcome.record.bounding_box, None);
        assert_eq!(
            outcome.degradation,
            Some(Degradation::InvalidBoundingBox([300, 20, 10, 250]))
        );

        let flat = parse_response("(2023, Tesla, Model S, #000000), (10, 250, 300, 250)", true)?;
        assert_eq!(flat.bounding_box, None);
        Ok(())
    }

    #[test]
    fn too_few_fields_is_malformed() {
        let err = parse_response("2023, Tesla", false).err();
        assert!(matches!(
            err,
            Some(ParseError::MalformedResponse { ref raw, .. }) if raw == "2023, Tesla"
        ));
        assert!(parse_response("", false).is_err());
    }

    #[test]
    fn missing_boundary_is_malformed_when_box_expected() {
        let err = parse_response("2023, Tesla, Model S, #000000", true)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("boundary"));
    }

    #[test]
    fn short_or_non_numeric_box_is_malformed() {
        assert!(parse_response("(2023, Tesla, Model S, red), (10, 20, 300)", true).is_err());
        let err = parse_response("(2023, Tesla, Model S, red), (10, twenty, 300, 250)", true)
            .err()
            .map(|err| err.raw().to_string());
        assert_eq!(
            err.as_deref(),
            Some("(2023, Tesla, Model S, red), (10, twenty, 300, 250)")
        );
    }

    #[test]
    fn tolerates_whitespace_quotes_and_trailing_punctuation() -> anyhow::Result<()> {
        let record = parse_response("  \"2019 ,  Porsche,911 Carrera ,  #c0c0c0 \".\n", false)?;
        assert_eq!(record.title(), "2019 Porsche 911 Carrera");
        assert_eq!(record.color, "#c0c0c0");

        let fenced = parse_response("```\n(2019, Porsche, 911, silver),(1, 2, 30, 40).\n```", true)?;
        assert_eq!(fenced.make, "Porsche");
        assert_eq!(fenced.bounding_box, BoundingBox::new(1, 2, 30, 40));
        Ok(())
    }

    #[test]
    fn extra_tokens_are_ignored() -> anyhow::Result<()> {
        let record = parse_response("2020, Ford, F-150, blue, pickup, 4x4", false)?;
        assert_eq!(record.model, "F-150");
        assert_eq!(record.color, "blue");

        let boxed = parse_response("(2020, Ford, F-150, blue, extra), (0, 0, 5, 5, 9)", true)?;
        assert_eq!(boxed.bounding_box, BoundingBox::new(0, 0, 5, 5));
        Ok(())
    }

    #[test]
    fn blank_identification_fields_become_unknown() -> anyhow::Result<()> {
        let record = parse_response("2020, , , ", false)?;
        assert_eq!(record.year, "2020");
        assert_eq!(record.make, UNKNOWN);
        assert_eq!(record.model, UNKNOWN);
        assert_eq!(record.color, UNKNOWN);
        Ok(())
    }

    #[test]
    fn parentheses_inside_fields_do_not_split_groups() -> anyhow::Result<()> {
        let record = parse_response("(2022, Tesla, Model S (Plaid), red), (1, 2, 3, 4)", true)?;
        assert_eq!(record.model, "Model S (Plaid)");
        assert_eq!(record.color, "red");
        assert_eq!(record.bounding_box, BoundingBox::new(1, 2, 3, 4));
        assert_eq!(
            split_groups("a, b (c), d), (1, 2"),
            vec!["a, b (c), d", "1, 2"]
        );
        Ok(())
    }

    #[test]
    fn boxed_reply_without_box_request_keeps_identification() -> anyhow::Result<()> {
        let shape = parse_shape("(2023, Tesla, Model S, #000000), (10, 20, 300, 250)", false)?;
        let ParsedShape::Basic(identification) = shape else {
            anyhow::bail!("expected basic shape");
        };
        assert_eq!(identification.color, "#000000");
        Ok(())
    }
}
