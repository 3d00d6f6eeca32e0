//! Declarative layout of the source spreadsheet.
//!
//! Each data row carries a material label and up to four measurement
//! blocks. A block is five adjacent columns starting at its offset:
//! cohesion, friction angle, unit weight, FoS, Ru.

use super::dataset::Season;

const COHESION: usize = 0;
const FRICTION_ANGLE: usize = 1;
const UNIT_WEIGHT: usize = 2;
const FOS: usize = 3;
const RU: usize = 4;

/// Where one block of measurements sits in a row, and what it represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub offset: usize,
    pub season: Season,
    pub ru_applied: bool,
}

impl BlockDescriptor {
    pub const fn new(offset: usize, season: Season, ru_applied: bool) -> Self {
        Self {
            offset,
            season,
            ru_applied,
        }
    }

    pub fn cohesion_column(&self) -> usize {
        self.offset + COHESION
    }

    pub fn friction_angle_column(&self) -> usize {
        self.offset + FRICTION_ANGLE
    }

    pub fn unit_weight_column(&self) -> usize {
        self.offset + UNIT_WEIGHT
    }

    pub fn fos_column(&self) -> usize {
        self.offset + FOS
    }

    pub fn ru_column(&self) -> usize {
        self.offset + RU
    }
}

/// Column layout of a sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSchema {
    pub label_column: usize,
    pub blocks: Vec<BlockDescriptor>,
    /// Label cells that mark header rows rather than materials.
    pub header_tokens: Vec<String>,
}

impl SheetSchema {
    pub fn is_header(&self, label: &str) -> bool {
        self.header_tokens.iter().any(|t| t == label)
    }
}

impl Default for SheetSchema {
    /// Layout of the field-survey workbook export.
    fn default() -> Self {
        let mut header_tokens = vec!["Material".to_string(), "Cohesion (kPa)".to_string()];
        header_tokens.extend((1..=10).map(|i| format!("Point {i}")));
        Self {
            label_column: 1,
            blocks: vec![
                BlockDescriptor::new(2, Season::PreMonsoon, false),
                BlockDescriptor::new(9, Season::PreMonsoon, true),
                BlockDescriptor::new(16, Season::PostMonsoon, false),
                BlockDescriptor::new(23, Season::PostMonsoon, true),
            ],
            header_tokens,
        }
    }
}
