use crate::core::grid::peaks::PeakSnapshot;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// One CSV row per detected peak, strongest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRow {
    pub rank: usize,
    pub value: f64,
    /// Value relative to the strongest peak.
    pub relative: f64,
    pub frac_a: f64,
    pub frac_b: f64,
    pub frac_c: f64,
    pub grid_i: usize,
    pub grid_j: usize,
    pub grid_k: usize,
}

pub fn peak_rows(snapshot: &PeakSnapshot) -> Vec<PeakRow> {
    let max_value = snapshot.peaks().first().map(|p| p.value);
    snapshot
        .peaks()
        .iter()
        .zip(snapshot.fractional_positions())
        .enumerate()
        .map(|(rank, (peak, frac))| PeakRow {
            rank: rank + 1,
            value: peak.value,
            relative: max_value.map_or(1.0, |max| peak.value / max),
            frac_a: frac.x,
            frac_b: frac.y,
            frac_c: frac.z,
            grid_i: peak.grid_position[0],
            grid_j: peak.grid_position[1],
            grid_k: peak.grid_position[2],
        })
        .collect()
}

pub fn write_peak_snapshot(snapshot: &PeakSnapshot, writer: impl Write) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in peak_rows(snapshot) {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_peak_snapshot_path<P: AsRef<Path>>(
    snapshot: &PeakSnapshot,
    path: P,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_path(path)?;
    for row in peak_rows(snapshot) {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::peaks::Peak;
    use tempfile::tempdir;

    fn snapshot() -> PeakSnapshot {
        PeakSnapshot::new(
            [4, 4, 4],
            vec![
                Peak {
                    grid_position: [1, 2, 3],
                    value: 2.0,
                },
                Peak {
                    grid_position: [0, 0, 2],
                    value: 1.0,
                },
            ],
        )
    }

    #[test]
    fn rows_carry_rank_relative_value_and_positions() {
        let rows = peak_rows(&snapshot());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].relative, 0.5);
        assert_eq!((rows[0].frac_a, rows[0].frac_b, rows[0].frac_c), (0.25, 0.5, 0.75));
        assert_eq!(rows[1].grid_k, 2);
    }

    #[test]
    fn csv_file_has_header_and_one_line_per_peak() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peaks.csv");
        write_peak_snapshot_path(&snapshot(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(0), Some("rank"));
        assert_eq!(headers.get(3), Some("frac_a"));
        let rows: Vec<PeakRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, peak_rows(&snapshot()));
    }

    #[test]
    fn empty_snapshot_writes_no_rows() {
        let mut buffer = Vec::new();
        write_peak_snapshot(&PeakSnapshot::new([2, 2, 2], Vec::new()), &mut buffer).unwrap();
        assert!(buffer.is_empty());
    }
}
