use crate::dataid::{FieldValue, LegacyDataId};
use crate::error::MigrateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentPart {
    Literal(String),
    Field(FieldSpec),
}

/// One compiled path segment: an alternation of literal runs and named
/// capture fields. Two capture fields must be separated by at least one
/// literal character or the segment is rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPattern {
    pub source: String,
    pub parts: Vec<SegmentPart>,
}

impl SegmentPattern {
    pub fn field_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, SegmentPart::Field(_)))
            .count()
    }

    pub fn is_literal(&self) -> bool {
        self.field_count() == 0
    }

    /// Match an entry name against this segment, extracting captured fields.
    /// Returns `None` on any mismatch; matching never fails with an error.
    pub fn match_name(&self, name: &str) -> Option<LegacyDataId> {
        match_parts(&self.parts, name)
    }
}

/// Part-sequence matching shared by segment patterns and compiled handlers.
pub fn match_parts(parts: &[SegmentPart], name: &str) -> Option<LegacyDataId> {
    let mut captured = LegacyDataId::new();
    let mut rest = name;
    let mut parts = parts.iter().peekable();
    while let Some(part) = parts.next() {
        match part {
            SegmentPart::Literal(lit) => {
                rest = rest.strip_prefix(lit.as_str())?;
            }
            SegmentPart::Field(spec) => {
                let raw = match (spec.ty, parts.peek()) {
                    (FieldType::Int, _) => {
                        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
                        &rest[..len]
                    }
                    (FieldType::Str, Some(SegmentPart::Literal(next))) => {
                        let idx = rest.find(next.as_str())?;
                        &rest[..idx]
                    }
                    (FieldType::Str, _) => rest,
                };
                if raw.is_empty() {
                    return None;
                }
                let value = match spec.ty {
                    FieldType::Int => FieldValue::Int(raw.parse().ok()?),
                    FieldType::Str => FieldValue::Str(raw.to_string()),
                };
                captured.insert(spec.name.clone(), value);
                rest = &rest[raw.len()..];
            }
        }
    }
    if rest.is_empty() { Some(captured) } else { None }
}

/// An ordered sequence of compiled segments, parsed once before traversal.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    pub source: String,
    pub segments: Vec<SegmentPattern>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, MigrateError> {
        if template.is_empty() {
            return Err(MigrateError::invalid_template(template, "empty template"));
        }
        let mut segments = Vec::new();
        for raw in template.split('/') {
            if raw.is_empty() {
                return Err(MigrateError::invalid_template(template, "empty segment"));
            }
            segments.push(parse_segment(template, raw)?);
        }
        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .flat_map(|seg| seg.parts.iter())
            .filter_map(|part| match part {
                SegmentPart::Field(spec) => Some(spec.name.as_str()),
                SegmentPart::Literal(_) => None,
            })
            .collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_names().contains(&name)
    }
}

fn parse_segment(template: &str, raw: &str) -> Result<SegmentPattern, MigrateError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                let mut body = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    body.push(inner);
                }
                if !closed {
                    return Err(MigrateError::invalid_template(template, "unclosed `{`"));
                }
                if !literal.is_empty() {
                    parts.push(SegmentPart::Literal(std::mem::take(&mut literal)));
                }
                let (name, ty) = match body.split_once(':') {
                    Some((name, "int")) => (name, FieldType::Int),
                    Some((name, "str")) => (name, FieldType::Str),
                    Some((_, other)) => {
                        return Err(MigrateError::invalid_template(
                            template,
                            format!("unknown field type `{other}`"),
                        ));
                    }
                    None => (body.as_str(), FieldType::Str),
                };
                if name.is_empty() {
                    return Err(MigrateError::invalid_template(template, "unnamed field"));
                }
                // Adjacent fields have no delimiter to split on, so any
                // split point would be ambiguous.
                if matches!(parts.last(), Some(SegmentPart::Field(_))) {
                    return Err(MigrateError::invalid_template(
                        template,
                        "adjacent capture fields without a literal separator",
                    ));
                }
                parts.push(SegmentPart::Field(FieldSpec {
                    name: name.to_string(),
                    ty,
                }));
            }
            '}' => {
                return Err(MigrateError::invalid_template(template, "unmatched `}`"));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(SegmentPart::Literal(literal));
    }
    Ok(SegmentPattern {
        source: raw.to_string(),
        parts,
    })
}
