//! Block-structured sheet extraction.

use super::dataset::{Dataset, Sample};
use super::schema::{BlockDescriptor, SheetSchema};
use super::sheet::{Cell, Sheet, read_sheet};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// What happened while turning a sheet into a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub rows_scanned: usize,
    /// Rows with a blank, header, or numeric label.
    pub rows_skipped: usize,
    pub label_rows: usize,
    pub blocks_extracted: usize,
    /// Blocks with no FoS cell; not a failure.
    pub blocks_absent: usize,
    /// Blocks present but unparseable.
    pub blocks_skipped: usize,
    pub duplicates_removed: usize,
    pub non_positive_fos_removed: usize,
    pub missing_values_removed: usize,
}

/// A cleaned dataset together with its extraction report.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub dataset: Dataset,
    pub report: ExtractionReport,
}

enum BlockOutcome {
    Absent,
    Extracted(Sample),
    Skipped(&'static str),
}

/// Turns sheets laid out per a [`SheetSchema`] into datasets.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    schema: SheetSchema,
}

impl Extractor {
    pub fn new(schema: SheetSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SheetSchema {
        &self.schema
    }

    pub fn extract_file(&self, path: &Path) -> Result<Extraction, MlError> {
        let sheet = read_sheet(path)?;
        let extraction = self.extract(&sheet);
        tracing::info!(
            path = %path.display(),
            samples = extraction.dataset.len(),
            rows_scanned = extraction.report.rows_scanned,
            blocks_skipped = extraction.report.blocks_skipped,
            duplicates_removed = extraction.report.duplicates_removed,
            "Extracted dataset"
        );
        Ok(extraction)
    }

    pub fn extract(&self, sheet: &Sheet) -> Extraction {
        let mut report = ExtractionReport::default();
        let mut samples = Vec::new();

        for (row_number, row) in sheet.iter().enumerate() {
            report.rows_scanned += 1;
            let Some(material) = self.material_label(row) else {
                report.rows_skipped += 1;
                continue;
            };
            report.label_rows += 1;

            for block in &self.schema.blocks {
                match extract_block(material, row, block) {
                    BlockOutcome::Absent => report.blocks_absent += 1,
                    BlockOutcome::Extracted(sample) => {
                        report.blocks_extracted += 1;
                        samples.push(sample);
                    }
                    BlockOutcome::Skipped(reason) => {
                        report.blocks_skipped += 1;
                        tracing::debug!(
                            row = row_number + 1,
                            offset = block.offset,
                            reason,
                            "Skipped block"
                        );
                    }
                }
            }
        }

        let dataset = clean(samples, &mut report);
        Extraction { dataset, report }
    }

    fn material_label<'a>(&self, row: &'a [Cell]) -> Option<&'a str> {
        let label = row.get(self.schema.label_column)?.as_text()?;
        if self.schema.is_header(label) {
            return None;
        }
        Some(label)
    }
}

fn extract_block(material: &str, row: &[Cell], block: &BlockDescriptor) -> BlockOutcome {
    let fos_cell = row.get(block.fos_column()).unwrap_or(&Cell::Empty);
    if fos_cell.is_blank() {
        return BlockOutcome::Absent;
    }
    let number = |column: usize| row.get(column).and_then(Cell::as_number);

    let Some(fos) = fos_cell.as_number() else {
        return BlockOutcome::Skipped("non-numeric fos");
    };
    let Some(cohesion) = number(block.cohesion_column()) else {
        return BlockOutcome::Skipped("non-numeric cohesion");
    };
    let Some(friction_angle) = number(block.friction_angle_column()) else {
        return BlockOutcome::Skipped("non-numeric friction angle");
    };
    let Some(unit_weight) = number(block.unit_weight_column()) else {
        return BlockOutcome::Skipped("non-numeric unit weight");
    };
    let ru = match row.get(block.ru_column()) {
        None | Some(Cell::Empty) => 0.0,
        Some(Cell::Number(v)) if (0.0..=1.0).contains(v) => *v,
        Some(Cell::Number(_)) => return BlockOutcome::Skipped("ru outside [0, 1]"),
        Some(Cell::Text(_)) => return BlockOutcome::Skipped("non-numeric ru"),
    };

    BlockOutcome::Extracted(Sample {
        material: material.to_string(),
        cohesion,
        friction_angle,
        unit_weight,
        ru,
        fos,
        season: block.season,
        ru_applied: block.ru_applied,
    })
}

/// Duplicates first, then non-positive FoS, then non-finite values.
fn clean(samples: Vec<Sample>, report: &mut ExtractionReport) -> Dataset {
    let mut seen = HashSet::new();
    let before = samples.len();
    let unique: Vec<Sample> = samples
        .into_iter()
        .filter(|s| seen.insert(s.key()))
        .collect();
    report.duplicates_removed = before - unique.len();

    let before = unique.len();
    let positive: Vec<Sample> = unique
        .into_iter()
        .filter(|s| s.fos > 0.0 || s.fos.is_nan())
        .collect();
    report.non_positive_fos_removed = before - positive.len();

    let before = positive.len();
    let finite: Vec<Sample> = positive.into_iter().filter(Sample::is_finite).collect();
    report.missing_values_removed = before - finite.len();

    Dataset::new(finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Season;
    use crate::data::sheet::parse_sheet;
    use pretty_assertions::assert_eq;

    /// Build a row: index, label, then four blocks separated by two gap columns.
    fn row(label: &str, blocks: [Option<[&str; 5]>; 4]) -> String {
        let mut cells = vec!["1".to_string(), label.to_string()];
        for (i, block) in blocks.iter().enumerate() {
            match block {
                Some(values) => cells.extend(values.iter().map(|v| v.to_string())),
                None => cells.extend(std::iter::repeat_n(String::new(), 5)),
            }
            if i < 3 {
                cells.extend(std::iter::repeat_n(String::new(), 2));
            }
        }
        cells.join(",")
    }

    #[test]
    fn test_four_blocks_from_one_row() {
        let csv = row(
            "Laterite",
            [
                Some(["25", "30", "18", "1.45", ""]),
                Some(["25", "30", "18", "1.20", "0.3"]),
                Some(["20", "28", "19", "1.10", ""]),
                Some(["20", "28", "19", "0.95", "0.5"]),
            ],
        );
        let extraction = Extractor::default().extract(&parse_sheet(&csv));
        let samples = extraction.dataset.samples();
        assert_eq!(samples.len(), 4);
        assert_eq!(extraction.report.blocks_extracted, 4);

        assert_eq!(samples[0].season, Season::PreMonsoon);
        assert!(!samples[0].ru_applied);
        assert_eq!(samples[0].ru, 0.0);
        assert_eq!(samples[1].ru, 0.3);
        assert!(samples[1].ru_applied);
        assert_eq!(samples[2].season, Season::PostMonsoon);
        assert_eq!(samples[3].fos, 0.95);
        assert_eq!(samples[3].ru, 0.5);
        assert!(samples.iter().all(|s| s.material == "Laterite"));
    }

    #[test]
    fn test_rows_with_header_blank_or_numeric_labels_are_skipped() {
        let block = Some(["25", "30", "18", "1.45", ""]);
        let csv = [
            row("Material", [block, None, None, None]),
            row("Point 3", [block, None, None, None]),
            row("", [block, None, None, None]),
            row("12.5", [block, None, None, None]),
            row("Clay", [block, None, None, None]),
        ]
        .join("\n");
        let extraction = Extractor::default().extract(&parse_sheet(&csv));
        assert_eq!(extraction.report.rows_scanned, 5);
        assert_eq!(extraction.report.rows_skipped, 4);
        assert_eq!(extraction.report.label_rows, 1);
        assert_eq!(extraction.dataset.len(), 1);
        assert_eq!(extraction.dataset.samples()[0].material, "Clay");
    }

    #[test]
    fn test_absent_and_skipped_blocks_are_counted_separately() {
        let csv = row(
            "Clay",
            [
                Some(["abc", "30", "18", "1.45", ""]),
                Some(["25", "30", "18", "1.20", "1.7"]),
                None,
                Some(["25", "30", "18", "1.30", "wet"]),
            ],
        );
        let extraction = Extractor::default().extract(&parse_sheet(&csv));
        assert!(extraction.dataset.is_empty());
        assert_eq!(extraction.report.blocks_absent, 1);
        assert_eq!(extraction.report.blocks_skipped, 3);
    }

    #[test]
    fn test_short_row_treats_trailing_blocks_as_absent() {
        let csv = "1,Sand,25,30,18,1.45";
        let extraction = Extractor::default().extract(&parse_sheet(csv));
        assert_eq!(extraction.dataset.len(), 1);
        assert_eq!(extraction.dataset.samples()[0].ru, 0.0);
        assert_eq!(extraction.report.blocks_absent, 3);
    }

    #[test]
    fn test_cleaning_order_and_counts() {
        let csv = [
            row("Clay", [Some(["25", "30", "18", "1.45", ""]), None, None, None]),
            row("Clay", [Some(["25", "30", "18", "1.45", ""]), None, None, None]),
            row("Silt", [Some(["25", "30", "18", "0", ""]), None, None, None]),
            row("Silt", [Some(["25", "30", "18", "-2", ""]), None, None, None]),
            row("Peat", [Some(["inf", "30", "18", "1.1", ""]), None, None, None]),
        ]
        .join("\n");
        let extraction = Extractor::default().extract(&parse_sheet(&csv));
        assert_eq!(extraction.report.duplicates_removed, 1);
        assert_eq!(extraction.report.non_positive_fos_removed, 2);
        assert_eq!(extraction.report.missing_values_removed, 1);
        assert_eq!(extraction.dataset.len(), 1);
        assert!(extraction.dataset.samples().iter().all(|s| s.fos > 0.0));
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let csv = [
            row(
                "Laterite",
                [
                    Some(["25", "30", "18", "1.45", ""]),
                    Some(["25", "30", "18", "1.20", "0.3"]),
                    None,
                    None,
                ],
            ),
            row("Clay", [None, None, Some(["12", "22", "17", "0.9", ""]), None]),
        ]
        .join("\n");
        let sheet = parse_sheet(&csv);
        let extractor = Extractor::default();
        assert_eq!(extractor.extract(&sheet), extractor.extract(&sheet));
    }

    #[test]
    fn test_extract_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(
            &path,
            row("Clay", [Some(["25", "30", "18", "1.45", ""]), None, None, None]),
        )
        .unwrap();
        let extraction = Extractor::default().extract_file(&path).unwrap();
        assert_eq!(extraction.dataset.len(), 1);
    }
}
