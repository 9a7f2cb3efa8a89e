use anyhow::{bail, Context, Result};
use std::path::Path;
use std::str::FromStr;

use crate::signal::{Events, RRSeries};

/// Parse a one-value-per-line series, ignoring blank and `#` comment lines.
///
/// A non-numeric first line is treated as a column header, so single-column
/// tables such as `rr_intervals_<base>.csv` can be read back directly.
pub fn parse_series<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    let mut seen_line = false;
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let first = !seen_line;
        seen_line = true;
        match trimmed.parse::<T>() {
            Ok(val) => out.push(val),
            Err(_) if first => continue,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("line {} is not a valid {}: {}", idx + 1, what, trimmed)
                })
            }
        }
    }
    if out.is_empty() {
        bail!("no {} values found", what);
    }
    Ok(out)
}

/// RR intervals in seconds.
pub fn parse_rr_series(text: &str) -> Result<RRSeries> {
    Ok(RRSeries {
        rr: parse_series(text, "RR interval")?,
    })
}

/// R-peak sample indices; must be strictly increasing.
pub fn parse_peak_indices(text: &str) -> Result<Events> {
    let indices: Vec<usize> = parse_series(text, "peak index")?;
    if let Some(w) = indices.windows(2).find(|w| w[1] <= w[0]) {
        bail!("peak indices must be strictly increasing ({} then {})", w[0], w[1]);
    }
    Ok(Events::from_indices(indices))
}

pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_comments_are_skipped() {
        let rr = parse_rr_series("rr_intervals\n# first run\n0.8\n\n0.82\n").unwrap();
        assert_eq!(rr.rr, vec![0.8, 0.82]);
    }

    #[test]
    fn garbage_after_first_line_is_an_error() {
        let err = parse_rr_series("0.8\nfast\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn peaks_must_increase() {
        assert_eq!(
            parse_peak_indices("rpeaks\n0\n100\n200\n").unwrap().indices,
            vec![0, 100, 200]
        );
        assert!(parse_peak_indices("100\n100\n").is_err());
        assert!(parse_peak_indices("rpeaks\n").is_err());
    }
}
