use chrono::Utc;
use serde_json::Value;

use crate::models::{BookSnapshot, PriceLevel};

/// Parses one depth frame into a normalized snapshot.
///
/// Accepts the spot partial-depth payload (`bids`/`asks`), the futures
/// `depthUpdate` event (`b`/`a`) and either wrapped in a combined-stream
/// envelope. Returns `None` when the frame is not JSON, carries neither side,
/// or has a side that is not an array.
pub fn parse_depth_message(payload: &str) -> Option<BookSnapshot> {
    let value = serde_json::from_str::<Value>(payload).ok()?;
    let data = value.get("data").unwrap_or(&value);
    if !data.is_object() {
        return None;
    }

    let raw_bids = data.get("bids").or_else(|| data.get("b"));
    let raw_asks = data.get("asks").or_else(|| data.get("a"));
    // a side that is present must be an array; aggTrade frames carry an integer `a`
    let bids_ok = raw_bids.map_or(true, Value::is_array);
    let asks_ok = raw_asks.map_or(true, Value::is_array);
    let any_side = raw_bids.is_some_and(Value::is_array) || raw_asks.is_some_and(Value::is_array);
    if !(bids_ok && asks_ok && any_side) {
        return None;
    }

    let last_update_id = data
        .get("lastUpdateId")
        .or_else(|| data.get("u"))
        .and_then(parse_u64_lossy);

    Some(BookSnapshot {
        bids: normalize_side(parse_levels(raw_bids), true),
        asks: normalize_side(parse_levels(raw_asks), false),
        received_at: Utc::now(),
        last_update_id,
    })
}

/// Reads `[price, quantity]` pairs, skipping rows that do not convert to finite
/// numbers and rows whose quantity is zero or negative.
pub fn parse_levels(value: Option<&Value>) -> Vec<PriceLevel> {
    let Some(rows) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut output = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else {
            continue;
        };
        if row.len() < 2 {
            continue;
        }

        let Some(price) = row.first().and_then(parse_f64_lossy) else {
            continue;
        };
        let Some(quantity) = row.get(1).and_then(parse_f64_lossy) else {
            continue;
        };
        if !price.is_finite() || !quantity.is_finite() || quantity <= 0.0 {
            continue;
        }

        output.push(PriceLevel::new(price, quantity));
    }

    output
}

/// Sorts best-first and keeps one level per price; the later pair in the
/// payload wins a collision.
pub fn normalize_side(mut levels: Vec<PriceLevel>, descending: bool) -> Vec<PriceLevel> {
    // stable sort keeps payload order among equal prices
    if descending {
        levels.sort_by(|left, right| right.price.total_cmp(&left.price));
    } else {
        levels.sort_by(|left, right| left.price.total_cmp(&right.price));
    }

    let mut output: Vec<PriceLevel> = Vec::with_capacity(levels.len());
    for level in levels {
        match output.last_mut() {
            Some(previous) if previous.price == level.price => *previous = level,
            _ => output.push(level),
        }
    }

    output
}

pub fn parse_u64_lossy(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_i64()
                .and_then(|numeric| (numeric >= 0).then_some(numeric as u64))
        })
        .or_else(|| value.as_f64().and_then(|numeric| (numeric >= 0.0).then_some(numeric as u64)))
        .or_else(|| value.as_str().and_then(|text| text.trim().parse::<u64>().ok()))
}

pub fn parse_f64_lossy(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_i64().map(|numeric| numeric as f64))
        .or_else(|| value.as_u64().map(|numeric| numeric as f64))
        .or_else(|| value.as_str().and_then(|text| text.trim().parse::<f64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prices(levels: &[PriceLevel]) -> Vec<f64> {
        levels.iter().map(|level| level.price).collect()
    }

    #[test]
    fn parses_spot_partial_depth_payload() {
        let payload = json!({
            "lastUpdateId": 160,
            "bids": [["100.0", "1.5"], ["101.0", "2.0"], ["99.5", "0.25"]],
            "asks": [["102.5", "3.0"], ["102.0", "1.0"]],
        });

        let book = parse_depth_message(&payload.to_string()).expect("payload should parse");
        assert_eq!(prices(&book.bids), vec![101.0, 100.0, 99.5]);
        assert_eq!(prices(&book.asks), vec![102.0, 102.5]);
        assert_eq!(book.last_update_id, Some(160));
        assert_eq!(book.bids[0].quantity, 2.0);
    }

    #[test]
    fn parses_futures_depth_update_inside_combined_stream() {
        let payload = json!({
            "stream": "btcusdt@depth20@100ms",
            "data": {
                "e": "depthUpdate",
                "u": 42,
                "b": [["99.0", "1"]],
                "a": [["100.0", "2"]],
            }
        });

        let book = parse_depth_message(&payload.to_string()).expect("payload should parse");
        assert_eq!(book.best_bid(), Some(99.0));
        assert_eq!(book.best_ask(), Some(100.0));
        assert_eq!(book.last_update_id, Some(42));
    }

    #[test]
    fn discards_pairs_that_fail_numeric_conversion() {
        let payload = json!({
            "bids": [["abc", "1"], ["100.0", "x"], ["99.0"], "junk", ["98.0", "4.0"]],
            "asks": [["101.0", "-1"], ["102.0", "0"], ["103.0", "NaN"], ["104.0", "2"]],
        });

        let book = parse_depth_message(&payload.to_string()).expect("payload should parse");
        assert_eq!(prices(&book.bids), vec![98.0]);
        assert_eq!(prices(&book.asks), vec![104.0]);
    }

    #[test]
    fn deduplicates_levels_with_later_pair_winning() {
        let payload = json!({
            "bids": [["100.0", "1.0"], ["100.0", "3.0"]],
            "asks": [],
        });

        let book = parse_depth_message(&payload.to_string()).expect("payload should parse");
        assert_eq!(book.bids, vec![PriceLevel::new(100.0, 3.0)]);
        assert!(book.asks.is_empty());
    }

    #[test]
    fn rejects_non_json_and_frames_without_book_sides() {
        assert!(parse_depth_message("not json").is_none());
        assert!(parse_depth_message("[1,2,3]").is_none());
        assert!(parse_depth_message(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_depth_message(r#"{"lastUpdateId":3,"bids":"garbage","asks":null}"#).is_none());
        assert!(parse_depth_message(r#"{"bids":[["1","1"]],"asks":{"p":"2"}}"#).is_none());
        assert!(parse_depth_message(
            r#"{"e":"aggTrade","E":1,"s":"BTCUSDT","a":12345,"p":"64000.1","q":"0.1","T":1,"m":true}"#
        )
        .is_none());
    }

    #[test]
    fn accepts_a_single_array_side() {
        let book = parse_depth_message(r#"{"e":"depthUpdate","u":9,"b":[["100","2"]]}"#)
            .expect("one-sided frame should parse");
        assert_eq!(book.bids.len(), 1);
        assert!(book.asks.is_empty());
        assert_eq!(book.last_update_id, Some(9));
    }

    #[test]
    fn keeps_crossed_books_without_rejecting_them() {
        let payload = json!({
            "bids": [["105.0", "1"]],
            "asks": [["100.0", "1"]],
        });

        let book = parse_depth_message(&payload.to_string()).expect("payload should parse");
        assert!(book.is_crossed());
        assert_eq!(book.spread(), None);
    }
}
