use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes one `index value value ...` line per frame.
///
/// Values are written with Rust's shortest round-trip `f64` formatting so the
/// file can be parsed back without loss.
pub struct EnergyWriter<W: Write> {
    writer: W,
    lines_written: usize,
}

impl EnergyWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> EnergyWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines_written: 0,
        }
    }

    pub fn write_frame(&mut self, index: usize, values: &[f64]) -> io::Result<()> {
        write!(self.writer, "{}", index)?;
        for value in values {
            write!(self.writer, " {}", value)?;
        }
        writeln!(self.writer)?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    /// Flushes buffered output and returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_index_followed_by_values() {
        let mut writer = EnergyWriter::new(Vec::new());
        writer.write_frame(0, &[-1.5]).unwrap();
        writer.write_frame(1, &[2.0, 3.25, -0.125]).unwrap();
        assert_eq!(writer.lines_written(), 2);

        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(output, "0 -1.5\n1 2 3.25 -0.125\n");
    }

    #[test]
    fn values_round_trip_exactly() {
        let value = -12345.678901234567_f64;
        let mut writer = EnergyWriter::new(Vec::new());
        writer.write_frame(7, &[value]).unwrap();
        let output = String::from_utf8(writer.finish().unwrap()).unwrap();
        let parsed: f64 = output.trim().split(' ').nth(1).unwrap().parse().unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn create_writes_to_file_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("energy.txt");
        let mut writer = EnergyWriter::create(&path).unwrap();
        writer.write_frame(0, &[1.0]).unwrap();
        writer.finish().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "0 1\n");
    }
}
