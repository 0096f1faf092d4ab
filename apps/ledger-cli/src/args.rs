//! Value parsers for command-line flags.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use remedy_core::funding::AllocationRequest;
use remedy_core::{DateRange, Money};

/// Parses `SOURCE:AMOUNT[:ENTRY]`, e.g. `tx-a:300`, `tx-a:1,250.50:1`.
pub fn parse_allocation(value: &str) -> Result<AllocationRequest, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let (source, amount, entry) = match parts.as_slice() {
        [source, amount] => (*source, *amount, None),
        [source, amount, entry] => (*source, *amount, Some(*entry)),
        _ => return Err(format!("expected SOURCE:AMOUNT[:ENTRY], got '{}'", value)),
    };

    if source.trim().is_empty() {
        return Err("source transaction id is empty".to_string());
    }
    let amount: Money = amount.parse().map_err(|e| format!("{}", e))?;

    let request = AllocationRequest::new(source.trim(), amount);
    match entry {
        Some(entry) => {
            let index = entry
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("entry index must be a non-negative integer, got '{}'", entry))?;
            Ok(request.on_entry(index))
        }
        None => Ok(request),
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// Whole-day inclusive range; an open end is unbounded.
pub fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Option<DateRange>> {
    if from.is_none() && to.is_none() {
        return Ok(None);
    }

    let start = match from.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(start) => start.and_utc(),
        None => DateTime::<Utc>::MIN_UTC,
    };
    let end = match to.and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999)) {
        Some(end) => end.and_utc(),
        None => DateTime::<Utc>::MAX_UTC,
    };

    if start > end {
        bail!("--from must not be after --to");
    }
    Ok(Some(DateRange::new(start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_allocation() {
        let request = parse_allocation("tx-a:300").unwrap();
        assert_eq!(request.source_transaction_id, "tx-a");
        assert_eq!(request.amount, Money::from_units(300));
        assert_eq!(request.entry_index, None);

        let request = parse_allocation("tx-a:1,250.50:1").unwrap();
        assert_eq!(request.amount, Money::from_cents(125_050));
        assert_eq!(request.entry_index, Some(1));
    }

    #[test]
    fn test_parse_allocation_rejects_garbage() {
        assert!(parse_allocation("tx-a").is_err());
        assert!(parse_allocation(":300").is_err());
        assert!(parse_allocation("tx-a:abc").is_err());
        assert!(parse_allocation("tx-a:300:-1").is_err());
        assert!(parse_allocation("tx-a:300:1:2").is_err());
    }

    #[test]
    fn test_date_range_covers_whole_days() {
        let range = date_range(parse_date("2026-01-01").ok(), parse_date("2026-01-31").ok())
            .unwrap()
            .unwrap();
        assert!(range.contains(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_date_range_open_ends() {
        assert!(date_range(None, None).unwrap().is_none());

        let from_only = date_range(parse_date("2026-01-15").ok(), None).unwrap().unwrap();
        assert!(from_only.contains(Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()));
        assert!(!from_only.contains(Utc.with_ymd_and_hms(2026, 1, 14, 23, 0, 0).unwrap()));

        assert!(date_range(parse_date("2026-02-01").ok(), parse_date("2026-01-01").ok()).is_err());
    }
}
