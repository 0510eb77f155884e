// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::*;
use std::path::Path;

use crate::util;

// FrameTime = time of recording on the PC (µs since 1970).
// FrameRate is in frames per second, even though the header definitions say otherwise.
const COL_TIME:  &str = "FrameTime";
const COL_RATE:  &str = "FrameRate";
const COL_INDEX: &str = "FrameIndex";

/// Per-frame metadata of one ARIS recording, as written by the extraction step.
#[derive(Debug, Clone)]
pub struct FrameTable {
    times: Vec<i64>,
    rates: Vec<f64>,
    indices: Vec<i64>,
    headers: csv::StringRecord,
    rows: Vec<csv::StringRecord>,
}

impl FrameTable {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(f)).map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.as_ref().display())))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv.headers()?.clone();
        if !headers.iter().any(|h| h == COL_TIME) {
            return Err(util::invalid_data(format!("missing column {COL_TIME}")));
        }

        let mut ret = Self { times: Vec::new(), rates: Vec::new(), indices: Vec::new(), headers: headers.clone(), rows: Vec::new() };

        for row in csv.records() {
            let row = row?;
            let map = util::create_csv_map_hdr(&row, &headers);
            let position = ret.rows.len();

            let time = map.get(COL_TIME).and_then(|x| util::parse_micros(x))
                .ok_or_else(|| util::invalid_data(format!("row {position}: invalid {COL_TIME}")))?;
            if let Some(&prev) = ret.times.last() {
                if time <= prev {
                    return Err(util::invalid_data(format!("row {position}: {COL_TIME} {time} is not after {prev}")));
                }
            }
            ret.times.push(time);

            if let Some(rate) = crate::try_block!(f64, { map.get(COL_RATE)?.parse::<f64>().ok()? }) {
                if rate > 0.0 { ret.rates.push(rate); }
            }
            ret.indices.push(crate::try_block!(i64, { map.get(COL_INDEX)?.parse::<i64>().ok()? }).unwrap_or(position as i64));
            ret.rows.push(row);
        }

        if ret.times.is_empty() {
            return Err(util::invalid_data("frame table is empty"));
        }
        Ok(ret)
    }

    pub fn len(&self) -> usize { self.times.len() }
    pub fn is_empty(&self) -> bool { self.times.is_empty() }

    pub fn time_at(&self, position: usize) -> Option<i64> {
        self.times.get(position).copied()
    }
    pub fn times(&self) -> &[i64] { &self.times }

    pub fn first_time(&self) -> i64 { self.times[0] }
    pub fn last_time(&self)  -> i64 { self.times[self.times.len() - 1] }
    pub fn duration_us(&self) -> i64 { self.last_time() - self.first_time() }

    /// Sonar's own frame index for a row; falls back to the row number.
    pub fn frame_index(&self, position: usize) -> Option<i64> {
        self.indices.get(position).copied()
    }

    /// Mean frame period. Uses the recorded frame rate and falls back to the mean timestamp step.
    pub fn mean_period_us(&self) -> f64 {
        if let Some(rate) = util::mean(&self.rates) {
            return 1e6 / rate;
        }
        if self.times.len() > 1 {
            return self.duration_us() as f64 / (self.times.len() - 1) as f64;
        }
        0.0
    }

    /// Writes the header and the selected rows, unchanged.
    pub fn write_rows<W: Write>(&self, writer: W, positions: &[usize]) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.headers)?;
        for &p in positions {
            if let Some(row) = self.rows.get(p) {
                csv.write_record(row)?;
            }
        }
        csv.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "FrameIndex,FrameTime,FrameRate,SonarPan\n\
                         0,1000,10,1.5\n\
                         1,101000,10,1.5\n\
                         2,201000,10,1.6\n";

    #[test]
    fn reads_times_and_rates() {
        let t = FrameTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.time_at(1), Some(101000));
        assert_eq!(t.time_at(3), None);
        assert_eq!(t.duration_us(), 200000);
        assert_eq!(t.mean_period_us(), 100000.0);
        assert_eq!(t.frame_index(2), Some(2));
    }

    #[test]
    fn period_falls_back_to_timestamps() {
        let t = FrameTable::from_reader("FrameTime\n0\n50\n100\n".as_bytes()).unwrap();
        assert_eq!(t.mean_period_us(), 50.0);
        assert_eq!(t.frame_index(1), Some(1));
    }

    #[test]
    fn rejects_non_increasing_times() {
        let err = FrameTable::from_reader("FrameTime\n10\n10\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_empty_or_missing_column() {
        assert!(FrameTable::from_reader("FrameTime\n".as_bytes()).is_err());
        assert!(FrameTable::from_reader("Time\n1\n".as_bytes()).is_err());
    }

    #[test]
    fn writes_selected_rows() {
        let t = FrameTable::from_reader(TABLE.as_bytes()).unwrap();
        let mut out = Vec::new();
        t.write_rows(&mut out, &[0, 2]).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "FrameIndex,FrameTime,FrameRate,SonarPan\n0,1000,10,1.5\n2,201000,10,1.6\n");
    }
}
