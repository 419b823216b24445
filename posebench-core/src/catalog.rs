//! Benchmark datasets and the categories each one is evaluated on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A supported benchmark dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetKind {
    Pascal3D,
    ObjectNet3D,
    LineMod,
    Pix3D,
}

const PASCAL3D_CATEGORIES: &[&str] = &[
    "aeroplane",
    "bicycle",
    "boat",
    "bottle",
    "bus",
    "car",
    "chair",
    "diningtable",
    "motorbike",
    "sofa",
    "train",
    "tvmonitor",
];

const OBJECTNET3D_CATEGORIES: &[&str] = &[
    "bed",
    "bookshelf",
    "calculator",
    "cellphone",
    "computer",
    "door",
    "filing_cabinet",
    "guitar",
    "iron",
    "knife",
    "microwave",
    "pen",
    "pot",
    "rifle",
    "shoe",
    "slipper",
    "stove",
    "toilet",
    "tub",
    "wheelchair",
];

const LINEMOD_CATEGORIES: &[&str] = &[
    "1", "2", "4", "5", "6", "8", "9", "10", "11", "12", "13", "14", "15",
];

const PIX3D_CATEGORIES: &[&str] = &[
    "bed", "bookcase", "chair", "desk", "misc", "sofa", "table", "tool", "wardrobe",
];

/// Pix3D categories evaluated on the curated test split of Grabner et al. (arXiv:1811.07249).
const PIX3D_CURATED: &[&str] = &["bed", "chair", "desk"];

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Pascal3D,
        DatasetKind::ObjectNet3D,
        DatasetKind::LineMod,
        DatasetKind::Pix3D,
    ];

    /// Resolve a dataset from its command-line name. Names are case-sensitive.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Pascal3D => "Pascal3D",
            DatasetKind::ObjectNet3D => "ObjectNet3D",
            DatasetKind::LineMod => "LineMod",
            DatasetKind::Pix3D => "Pix3D",
        }
    }

    /// Categories in evaluation order.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Pascal3D => PASCAL3D_CATEGORIES,
            DatasetKind::ObjectNet3D => OBJECTNET3D_CATEGORIES,
            DatasetKind::LineMod => LINEMOD_CATEGORIES,
            DatasetKind::Pix3D => PIX3D_CATEGORIES,
        }
    }

    /// Annotation file used for a category.
    ///
    /// The Pix3D curated files apply to their own category only. A sticky override,
    /// where `bookcase` goes on reading `bed_annotation.txt`, is a known bug of older
    /// evaluation scripts and evaluates the wrong samples.
    pub fn annotation_file(&self, category: &str) -> String {
        match self {
            DatasetKind::Pix3D if PIX3D_CURATED.contains(&category) => {
                format!("{category}_annotation.txt")
            }
            _ => format!("{}.txt", self.name()),
        }
    }

    /// ObjectNet3D is only evaluated on samples annotated with keypoint anchors.
    pub fn requires_keypoints(&self) -> bool {
        matches!(self, DatasetKind::ObjectNet3D)
    }

    /// LineMod categories are object numbers and are compared numerically.
    pub fn numeric_categories(&self) -> bool {
        matches!(self, DatasetKind::LineMod)
    }

    /// Root directory of this dataset under `data_root`.
    pub fn root_dir(&self, data_root: &Path) -> PathBuf {
        data_root.join(self.name())
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!(DatasetKind::parse("Pascal3D"), Some(DatasetKind::Pascal3D));
        assert_eq!(
            DatasetKind::parse("ObjectNet3D"),
            Some(DatasetKind::ObjectNet3D)
        );
        assert_eq!(DatasetKind::parse("LineMod"), Some(DatasetKind::LineMod));
        assert_eq!(DatasetKind::parse("Pix3D"), Some(DatasetKind::Pix3D));
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(DatasetKind::parse("pascal3d"), None);
        assert_eq!(DatasetKind::parse("ShapeNet"), None);
        assert_eq!(DatasetKind::parse(""), None);
    }

    #[test]
    fn test_category_counts() {
        assert_eq!(DatasetKind::Pascal3D.categories().len(), 12);
        assert_eq!(DatasetKind::ObjectNet3D.categories().len(), 20);
        assert_eq!(DatasetKind::LineMod.categories().len(), 13);
        assert_eq!(DatasetKind::Pix3D.categories().len(), 9);
    }

    #[test]
    fn test_linemod_excludes_objects_3_and_7() {
        let cats = DatasetKind::LineMod.categories();
        assert!(!cats.contains(&"3"));
        assert!(!cats.contains(&"7"));
        assert!(cats.iter().all(|c| c.parse::<u32>().is_ok()));
    }

    #[test]
    fn test_pix3d_annotation_override_is_per_category() {
        let pix = DatasetKind::Pix3D;
        assert_eq!(pix.annotation_file("bed"), "bed_annotation.txt");
        assert_eq!(pix.annotation_file("bookcase"), "Pix3D.txt");
        assert_eq!(pix.annotation_file("desk"), "desk_annotation.txt");
        assert_eq!(pix.annotation_file("wardrobe"), "Pix3D.txt");
        assert_eq!(
            DatasetKind::Pascal3D.annotation_file("chair"),
            "Pascal3D.txt"
        );
    }

    #[test]
    fn test_only_linemod_compares_numerically() {
        assert!(DatasetKind::LineMod.numeric_categories());
        for kind in [DatasetKind::Pascal3D, DatasetKind::ObjectNet3D, DatasetKind::Pix3D] {
            assert!(!kind.numeric_categories());
        }
    }

    #[test]
    fn test_root_dir() {
        let root = DatasetKind::ObjectNet3D.root_dir(Path::new("data"));
        assert_eq!(root, PathBuf::from("data/ObjectNet3D"));
    }
}
