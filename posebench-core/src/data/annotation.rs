//! Annotation table parsing.
//!
//! Annotation files are comma-separated with a header row. Columns are looked up
//! by name so the Pascal3D/ObjectNet3D, Pix3D and LineMod exports can share one reader.

use crate::error::PoseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

const IMAGE_COLUMNS: &[&str] = &["im_path", "image_path"];
const CATEGORY_COLUMNS: &[&str] = &["cat", "cat_id", "obj_id"];
const MODEL_COLUMNS: &[&str] = &["cad_index", "example_id"];

/// Object bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub upper: f64,
    pub right: f64,
    pub lower: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.lower - self.upper
    }
}

/// One annotated object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// 1-based line number in the source file.
    pub line: usize,
    pub image: String,
    pub category: String,
    pub model_id: String,
    /// Raw angles in degrees as annotated.
    pub azimuth: f64,
    pub elevation: f64,
    pub inplane: f64,
    pub bbox: BoundingBox,
    pub truncated: bool,
    pub occluded: bool,
    pub difficult: bool,
    pub has_keypoints: bool,
    pub split: Option<String>,
}

impl AnnotationRecord {
    /// Fully visible instance (not truncated, occluded or marked difficult).
    pub fn is_clean(&self) -> bool {
        !self.truncated && !self.occluded && !self.difficult
    }

    /// Whether the row belongs to the test split. Rows without a split are test rows.
    pub fn is_test_split(&self) -> bool {
        match self.split.as_deref() {
            None | Some("") => true,
            Some(split) => matches!(split, "val" | "test"),
        }
    }
}

struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    fn parse(line: &str) -> Self {
        let columns = split_fields(line)
            .into_iter()
            .enumerate()
            .map(|(idx, name)| (name.to_string(), idx))
            .collect();
        Self { columns }
    }

    fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|name| self.columns.get(*name).copied())
    }

    fn require(&self, aliases: &[&str], source: &str) -> Result<usize, PoseError> {
        self.find(aliases).ok_or_else(|| {
            PoseError::annotation(format!(
                "{source}: missing column '{}'",
                aliases.join("|")
            ))
        })
    }
}

struct Columns {
    image: usize,
    category: usize,
    model: Option<usize>,
    azimuth: usize,
    elevation: usize,
    inplane: usize,
    bbox: [usize; 4],
    truncated: Option<usize>,
    occluded: Option<usize>,
    difficult: Option<usize>,
    has_keypoints: Option<usize>,
    split: Option<usize>,
}

impl Columns {
    fn resolve(header: &Header, source: &str) -> Result<Self, PoseError> {
        Ok(Self {
            image: header.require(IMAGE_COLUMNS, source)?,
            category: header.require(CATEGORY_COLUMNS, source)?,
            model: header.find(MODEL_COLUMNS),
            azimuth: header.require(&["azimuth"], source)?,
            elevation: header.require(&["elevation"], source)?,
            inplane: header.require(&["inplane_rotation"], source)?,
            bbox: [
                header.require(&["left"], source)?,
                header.require(&["upper"], source)?,
                header.require(&["right"], source)?,
                header.require(&["lower"], source)?,
            ],
            truncated: header.find(&["truncated"]),
            occluded: header.find(&["occluded"]),
            difficult: header.find(&["difficult"]),
            has_keypoints: header.find(&["has_keypoints"]),
            split: header.find(&["set"]),
        })
    }
}

/// Split one line on commas outside double quotes; surrounding quotes are stripped.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                fields.push(unquote(&line[start..idx]));
                start = idx + 1;
            }
            _ => {}
        }
    }
    fields.push(unquote(&line[start..]));
    fields
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

struct Row<'a> {
    fields: Vec<&'a str>,
    line: usize,
    source: &'a str,
}

impl<'a> Row<'a> {
    fn text(&self, idx: usize) -> Result<&'a str, PoseError> {
        self.fields.get(idx).copied().ok_or_else(|| {
            PoseError::annotation(format!(
                "{}:{}: expected at least {} fields, found {}",
                self.source,
                self.line,
                idx + 1,
                self.fields.len()
            ))
        })
    }

    fn number(&self, idx: usize, column: &str) -> Result<f64, PoseError> {
        let raw = self.text(idx)?;
        raw.parse::<f64>().map_err(|_| {
            PoseError::annotation(format!(
                "{}:{}: column '{column}' is not a number: '{raw}'",
                self.source, self.line
            ))
        })
    }

    fn flag(&self, idx: Option<usize>, column: &str) -> Result<bool, PoseError> {
        let Some(idx) = idx else {
            return Ok(false);
        };
        let raw = self.text(idx)?;
        if raw.is_empty() {
            return Ok(false);
        }
        if raw.eq_ignore_ascii_case("true") {
            return Ok(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Ok(false);
        }
        raw.parse::<f64>().map(|v| v != 0.0).map_err(|_| {
            PoseError::annotation(format!(
                "{}:{}: column '{column}' is not a flag: '{raw}'",
                self.source, self.line
            ))
        })
    }
}

/// Parse annotation text. `source` names the file in error messages.
pub fn parse_annotations(content: &str, source: &str) -> Result<Vec<AnnotationRecord>, PoseError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines
        .next()
        .ok_or_else(|| PoseError::annotation(format!("{source}: empty annotation file")))?;
    let header = Header::parse(header_line);
    let cols = Columns::resolve(&header, source)?;

    let mut records = Vec::new();
    for (idx, line) in lines {
        let row = Row {
            fields: split_fields(line),
            line: idx + 1,
            source,
        };
        let category = row.text(cols.category)?.to_string();
        let model_id = match cols.model {
            Some(col) => row.text(col)?.to_string(),
            None => category.clone(),
        };
        let split = match cols.split {
            Some(col) => Some(row.text(col)?.to_string()),
            None => None,
        };
        records.push(AnnotationRecord {
            line: row.line,
            image: row.text(cols.image)?.to_string(),
            category,
            model_id,
            azimuth: row.number(cols.azimuth, "azimuth")?,
            elevation: row.number(cols.elevation, "elevation")?,
            inplane: row.number(cols.inplane, "inplane_rotation")?,
            bbox: BoundingBox {
                left: row.number(cols.bbox[0], "left")?,
                upper: row.number(cols.bbox[1], "upper")?,
                right: row.number(cols.bbox[2], "right")?,
                lower: row.number(cols.bbox[3], "lower")?,
            },
            truncated: row.flag(cols.truncated, "truncated")?,
            occluded: row.flag(cols.occluded, "occluded")?,
            difficult: row.flag(cols.difficult, "difficult")?,
            has_keypoints: row.flag(cols.has_keypoints, "has_keypoints")?,
            split,
        });
    }
    Ok(records)
}

/// Read and parse an annotation file.
pub async fn load_annotations(path: &Path) -> Result<Vec<AnnotationRecord>, PoseError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        PoseError::annotation(format!("failed to read {}: {e}", path.display()))
    })?;
    parse_annotations(&content, &path.display().to_string())
}
