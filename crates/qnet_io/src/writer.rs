use anyhow::{Context, Result};
use qnet_core::collector::FidelitySample;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const CSV_HEADER: &str = "path,round,time_ns,fidelity";

/// Writes `samples` as CSV, header first.
pub fn write_samples<W: Write>(mut out: W, samples: &[FidelitySample]) -> Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for s in samples {
        writeln!(out, "{},{},{},{}", s.path, s.round, s.time_ns, s.fidelity)?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `samples` to a CSV file, replacing any existing file.
pub fn save_samples<P: AsRef<Path>>(path: P, samples: &[FidelitySample]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create results file {}", path.display()))?;
    write_samples(BufWriter::new(file), samples)
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_per_sample() {
        let samples = [
            FidelitySample {
                path: 0,
                round: 0,
                time_ns: 150001.0,
                fidelity: 1.0,
            },
            FidelitySample {
                path: 1,
                round: 7,
                time_ns: 2.5,
                fidelity: 0.3125,
            },
        ];
        let mut buf = Vec::new();
        write_samples(&mut buf, &samples).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "path,round,time_ns,fidelity\n0,0,150001,1\n1,7,2.5,0.3125\n"
        );
    }
}
