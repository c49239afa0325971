//! CSV output for sweep results and nodal profiles.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::numerics::ac::AcPoint;
use crate::numerics::sweep::IvPoint;

/// Write equal-length columns under the given headers.
pub fn write_csv(path: impl AsRef<Path>, headers: &[&str], columns: &[Vec<f64>]) -> Result<()> {
    assert_eq!(headers.len(), columns.len());
    let n = columns.first().map_or(0, |c| c.len());
    debug_assert!(columns.iter().all(|c| c.len() == n));

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{}", headers.join(","))?;
    for i in 0..n {
        let row: Vec<String> = columns.iter().map(|c| c[i].to_string()).collect();
        writeln!(file, "{}", row.join(","))?;
    }
    Ok(())
}

pub fn write_xy(
    path: impl AsRef<Path>,
    x_name: &str,
    y_name: &str,
    x: &[f64],
    y: &[f64],
) -> Result<()> {
    write_csv(path, &[x_name, y_name], &[x.to_vec(), y.to_vec()])
}

/// Current-voltage table of a DC sweep.
pub fn write_iv(path: impl AsRef<Path>, points: &[IvPoint]) -> Result<()> {
    let v: Vec<f64> = points.iter().map(|p| p.v).collect();
    let i: Vec<f64> = points.iter().map(|p| p.i).collect();
    write_csv(path, &["bias_v", "current_a"], &[v, i])
}

/// Frequency, admittance and capacitance table of an AC sweep.
pub fn write_ac(path: impl AsRef<Path>, points: &[AcPoint]) -> Result<()> {
    let f: Vec<f64> = points.iter().map(|p| p.freq).collect();
    let g: Vec<f64> = points.iter().map(|p| p.y.re).collect();
    let b: Vec<f64> = points.iter().map(|p| p.y.im).collect();
    let c: Vec<f64> = points.iter().map(|p| p.c).collect();
    write_csv(
        path,
        &["freq_hz", "conductance_s", "susceptance_s", "capacitance_f"],
        &[f, g, b, c],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_roundtrip_shape() {
        let dir = std::env::temp_dir().join("semifvm_csv_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("xy.csv");
        write_xy(&path, "x", "y", &[0.0, 1.0], &[2.0, 3.0]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "x,y");
        assert_eq!(lines[2], "1,3");
    }
}
