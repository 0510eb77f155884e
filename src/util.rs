// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::io::*;
use std::path::Path;

pub fn folder_basename<P: AsRef<Path>>(path: P) -> String {
    // `Path::file_name` already ignores a trailing separator
    path.as_ref().file_name().map(|x| x.to_string_lossy().into_owned()).unwrap_or_default()
}

pub fn file_stem<P: AsRef<Path>>(path: P) -> String {
    path.as_ref().file_stem().map(|x| x.to_string_lossy().into_owned()).unwrap_or_default()
}

pub fn has_extension<P: AsRef<Path>>(path: P, ext: &str) -> bool {
    path.as_ref().extension().map(|x| x.to_string_lossy().eq_ignore_ascii_case(ext)).unwrap_or(false)
}

/// Lists entries of `dir` accepted by `filter`, in natural ("human") order.
pub fn list_sorted<P: AsRef<Path>, F: Fn(&Path) -> bool>(dir: P, filter: F) -> Result<Vec<std::path::PathBuf>> {
    let mut ret = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if filter(&path) {
            ret.push(path);
        }
    }
    ret.sort_by(|a, b| human_sort::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(ret)
}

pub fn create_csv_map_hdr<'a, 'b>(row: &'b csv::StringRecord, headers: &'a csv::StringRecord) -> BTreeMap<&'a str, &'b str> {
    headers.iter().zip(row).map(|(a, b)| (a, b.trim())).collect()
}

/// Parses a microsecond value written either as an integer or as a float ("1650000000123456.0").
pub fn parse_micros(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v.round() as i64) } else { None }
}

/// Serde adapter for [`parse_micros`], for CSV columns older tools wrote as floats.
pub fn deserialize_micros<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    let s = <String as serde::Deserialize>::deserialize(d)?;
    parse_micros(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid microseconds: {s}")))
}

pub fn split_microseconds(timestamp_us: i64) -> (i64, i64, i64) {
    let s  = timestamp_us.div_euclid(1_000_000);
    let ms = (timestamp_us - s * 1_000_000).div_euclid(1_000);
    let us = timestamp_us - s * 1_000_000 - ms * 1_000;
    (s, ms, us)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() { return None; }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Quantile with linear interpolation between order statistics, `q` in [0, 1].
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() { return None; }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Piecewise linear interpolation of `ys` over the increasing abscissa `xs`.
/// Values outside of `xs` hold the boundary sample.
pub fn interp(x: i64, xs: &[i64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() { return f64::NAN; }
    if x <= xs[0] { return ys[0]; }
    let last = xs.len() - 1;
    if x >= xs[last] { return ys[last]; }

    // First index with xs[i] > x, guaranteed to be in 1..=last here
    let i = xs.partition_point(|&t| t <= x);
    let (x0, x1) = (xs[i - 1], xs[i]);
    let (y0, y1) = (ys[i - 1], ys[i]);
    if x1 == x0 { return y1; }
    y0 + (y1 - y0) * ((x - x0) as f64 / (x1 - x0) as f64)
}

pub fn invalid_data<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> Error {
    Error::new(ErrorKind::InvalidData, e)
}

pub fn read_yaml<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let f = std::fs::File::open(path.as_ref())?;
    serde_yaml::from_reader(BufReader::new(f)).map_err(|e| invalid_data(format!("{}: {e}", path.as_ref().display())))
}

pub fn write_yaml<T: serde::Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let f = std::fs::File::create(path)?;
    serde_yaml::to_writer(BufWriter::new(f), value).map_err(invalid_data)
}

#[macro_export]
macro_rules! try_block {
    ($type:ty, $body:block) => {
        (|| -> Option<$type> {
            Some($body)
        }())
    };
    ($body:block) => {
        (|| -> Option<()> {
            $body
            Some(())
        }())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interp_holds_edges() {
        let xs = [10, 20, 40];
        let ys = [1.0, 2.0, 4.0];
        assert_eq!(interp(0, &xs, &ys), 1.0);
        assert_eq!(interp(10, &xs, &ys), 1.0);
        assert_eq!(interp(15, &xs, &ys), 1.5);
        assert_eq!(interp(30, &xs, &ys), 3.0);
        assert_eq!(interp(40, &xs, &ys), 4.0);
        assert_eq!(interp(1000, &xs, &ys), 4.0);
    }

    #[test]
    fn micros_accept_float_text() {
        assert_eq!(parse_micros("1000"), Some(1000));
        assert_eq!(parse_micros(" 1000.0 "), Some(1000));
        assert_eq!(parse_micros("-2500.4"), Some(-2500));
        assert_eq!(parse_micros("abc"), None);
    }

    #[test]
    fn splits_microseconds() {
        assert_eq!(split_microseconds(3_004_005), (3, 4, 5));
        assert_eq!(split_microseconds(999), (0, 0, 999));
    }

    #[test]
    fn quantile_matches_linear_definition() {
        let v = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&v, 0.5), Some(3.0));
        assert!((quantile(&v, 0.95).unwrap() - 4.8).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn basename_ignores_trailing_separator() {
        assert_eq!(folder_basename("data/aris/2022-05-10_101010/"), "2022-05-10_101010");
        assert_eq!(folder_basename("gantry/run_01.csv"), "run_01.csv");
    }
}
