use std::{fmt::Write as FmtWrite, time::Duration};

use chrono::Utc;

use crate::{
    depth::{aggregate_with_floor, DEFAULT_DEPTH_FLOOR, DEFAULT_DEPTH_LIMIT},
    history::{resample_candles, HistoryState},
    models::{BookSnapshot, Candle, ConnectionStatus, DepthProfile, PriceAlert, PriceLevel, PriceStat},
};

use super::canvas::{rasterize_depth, ASK_FILL, BID_FILL};

const MIN_CANDLE_CHART_HEIGHT: usize = 4;
const MAX_CANDLE_CHART_HEIGHT: usize = 40;
const DEPTH_BAR_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameLayout {
    /// Rows per side in the book table.
    pub levels: usize,
    pub depth_limit: usize,
    pub depth_floor: f64,
    pub chart_height: usize,
    pub chart_columns: usize,
    pub depth_chart_width: usize,
    pub depth_chart_height: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            levels: 10,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            depth_floor: DEFAULT_DEPTH_FLOOR,
            chart_height: 12,
            chart_columns: 72,
            depth_chart_width: 60,
            depth_chart_height: 10,
        }
    }
}

pub struct FrameInputs<'a> {
    pub symbol: &'a str,
    pub price: &'a PriceStat,
    pub connection: &'a ConnectionStatus,
    pub book: &'a BookSnapshot,
    pub history: &'a HistoryState,
    pub alert: Option<&'a PriceAlert>,
    pub frame_index: u64,
    pub elapsed: Duration,
}

pub fn build_frame(inputs: &FrameInputs<'_>, layout: &FrameLayout) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "depth view | symbol={} | frame={} | elapsed={}s",
        inputs.symbol,
        inputs.frame_index,
        inputs.elapsed.as_secs()
    );

    for line in build_header_lines(inputs.price, inputs.connection) {
        let _ = writeln!(output, "{line}");
    }
    if let Some(alert) = inputs.alert {
        let _ = writeln!(output, "{}", format_alert(alert));
    }
    let _ = writeln!(output);

    for line in build_book_table_lines(inputs.book, layout.levels) {
        let _ = writeln!(output, "{line}");
    }
    let _ = writeln!(output);

    let profile = aggregate_with_floor(inputs.book, layout.depth_limit, layout.depth_floor);
    for line in build_depth_chart_lines(
        &profile,
        layout.depth_chart_width,
        layout.depth_chart_height,
        layout.depth_limit,
    ) {
        let _ = writeln!(output, "{line}");
    }
    let _ = writeln!(output);

    match inputs.history {
        HistoryState::Loading => {
            let _ = writeln!(output, "history loading");
        }
        HistoryState::Unavailable(reason) => {
            let _ = writeln!(output, "history unavailable ({})", compact(reason));
        }
        HistoryState::Loaded(candles) => {
            let visible = resample_candles(candles, layout.chart_columns);
            for line in build_candle_chart_lines(&visible, layout.chart_height) {
                let _ = writeln!(output, "{line}");
            }
        }
    }

    output
}

pub fn build_header_lines(price: &PriceStat, connection: &ConnectionStatus) -> Vec<String> {
    let price_line = match price {
        PriceStat::Pending => "price: waiting for price".to_string(),
        PriceStat::Unavailable { reason, .. } => {
            format!("price: price unavailable ({})", compact(reason))
        }
        PriceStat::Live(quote) => format!(
            "price: {} | 24h: {} | updated {}",
            format_price(quote.last_price),
            format_change_pct(quote.change_24h_percent),
            quote.fetched_at.format("%H:%M:%S")
        ),
    };

    let mut stream_line = format!(
        "stream: {} | attempt {}",
        connection.state.as_str(),
        connection.attempt
    );
    if let Some(retry_in) = connection.retry_in {
        let _ = write!(stream_line, " | retry in {:.1}s", retry_in.as_secs_f64());
    }

    vec![price_line, stream_line]
}

#[derive(Debug, Clone, PartialEq)]
struct LevelRow {
    price: f64,
    size: f64,
    cumulative_size: f64,
}

fn level_rows(levels: &[PriceLevel], depth: usize) -> Vec<LevelRow> {
    let mut cumulative = 0.0;
    levels
        .iter()
        .take(depth)
        .map(|level| {
            cumulative += level.quantity.max(0.0);
            LevelRow {
                price: level.price,
                size: level.quantity,
                cumulative_size: cumulative,
            }
        })
        .collect()
}

/// Asks far to near, a MID divider, then bids near to far. Missing levels
/// render as `-` rows so the table height stays fixed.
pub fn build_book_table_lines(book: &BookSnapshot, levels: usize) -> Vec<String> {
    let ask_rows = level_rows(&book.asks, levels);
    let bid_rows = level_rows(&book.bids, levels);
    let max_cumulative = ask_rows
        .last()
        .map(|row| row.cumulative_size)
        .unwrap_or(0.0)
        .max(bid_rows.last().map(|row| row.cumulative_size).unwrap_or(0.0));

    let mut lines = Vec::with_capacity(levels * 2 + 3);
    let mut summary = format!(
        "best_bid={} best_ask={} spread={} spread_bps={}",
        format_optional(book.best_bid()),
        format_optional(book.best_ask()),
        format_optional(book.spread()),
        book.spread_bps()
            .map(|bps| format!("{bps:.2}"))
            .unwrap_or_else(|| "-".to_string()),
    );
    if book.is_crossed() {
        summary.push_str(" | CROSSED");
    }
    lines.push(summary);
    lines.push(format!(
        "{:>12} {:>12} {:>12} {:<w$}",
        "price",
        "size",
        "cum_size",
        "depth",
        w = DEPTH_BAR_WIDTH
    ));

    let asks_far_to_near = ask_rows.iter().rev().collect::<Vec<_>>();
    let padding = levels.saturating_sub(asks_far_to_near.len());
    for slot in 0..levels {
        let row = slot
            .checked_sub(padding)
            .and_then(|index| asks_far_to_near.get(index).copied());
        lines.push(format_book_row(row, max_cumulative));
    }

    let mid = book
        .mid_price()
        .map(format_price)
        .unwrap_or_else(|| "-".to_string());
    lines.push(format!("{:-^50}", format!(" MID {mid} ")));

    for slot in 0..levels {
        lines.push(format_book_row(bid_rows.get(slot), max_cumulative));
    }

    lines
}

fn format_book_row(row: Option<&LevelRow>, max_cumulative: f64) -> String {
    let Some(row) = row else {
        return format!("{:>12} {:>12} {:>12} {:<w$}", "-", "-", "-", "-", w = DEPTH_BAR_WIDTH);
    };

    format!(
        "{:>12} {:>12} {:>12} {}",
        format_price(row.price),
        format_size(row.size),
        format_size(row.cumulative_size),
        format_depth_bar(row.cumulative_size, max_cumulative, DEPTH_BAR_WIDTH),
    )
}

pub fn build_depth_chart_lines(
    profile: &DepthProfile,
    width: usize,
    height: usize,
    depth_limit: usize,
) -> Vec<String> {
    let mut lines = Vec::with_capacity(height + 3);
    lines.push(format!(
        "depth: {BID_FILL} bids | {ASK_FILL} asks | scale max={}",
        format_size(profile.max_quantity)
    ));

    let rows = rasterize_depth(profile, width, height, depth_limit);
    if rows.is_empty() {
        lines.push("(depth chart disabled)".to_string());
        return lines;
    }

    lines.extend(rows.into_iter().map(|row| format!("|{row}|")));

    let mid = width / 2;
    let mut axis = "-".repeat(width);
    if mid < width {
        axis.replace_range(mid..mid + 1, "+");
    }
    lines.push(format!("+{axis}+"));

    let bid_label = profile
        .bid_points
        .last()
        .map(|point| format!("bids {}", format_size(point.cumulative_quantity)))
        .unwrap_or_else(|| "bids -".to_string());
    let ask_label = profile
        .ask_points
        .last()
        .map(|point| format!("asks {}", format_size(point.cumulative_quantity)))
        .unwrap_or_else(|| "asks -".to_string());
    let gap = (width + 2).saturating_sub(bid_label.len() + ask_label.len()).max(1);
    lines.push(format!("{bid_label}{}{ask_label}", " ".repeat(gap)));

    lines
}

pub fn build_candle_chart_lines(candles: &[Candle], chart_height: usize) -> Vec<String> {
    if candles.is_empty() {
        return vec!["(no candles)".to_string()];
    }

    let height = chart_height.clamp(MIN_CANDLE_CHART_HEIGHT, MAX_CANDLE_CHART_HEIGHT);

    let mut low = candles
        .iter()
        .map(|candle| candle.low)
        .fold(f64::INFINITY, f64::min);
    let mut high = candles
        .iter()
        .map(|candle| candle.high)
        .fold(f64::NEG_INFINITY, f64::max);

    if !low.is_finite() || !high.is_finite() {
        return vec!["(invalid candle values)".to_string()];
    }

    if (high - low).abs() <= f64::EPSILON {
        high += 1.0;
        low -= 1.0;
    }

    let mut grid = vec![vec![' '; candles.len()]; height];
    for (index, candle) in candles.iter().enumerate() {
        let wick_top = price_to_chart_row(candle.high, high, low, height);
        let wick_bottom = price_to_chart_row(candle.low, high, low, height);
        for row in grid.iter_mut().take(wick_bottom + 1).skip(wick_top) {
            row[index] = '|';
        }

        let body_top = price_to_chart_row(candle.open.max(candle.close), high, low, height);
        let body_bottom = price_to_chart_row(candle.open.min(candle.close), high, low, height);
        let body_char = if (candle.close - candle.open).abs() <= f64::EPSILON {
            '='
        } else if candle.close > candle.open {
            '#'
        } else {
            '*'
        };
        for row in grid.iter_mut().take(body_bottom + 1).skip(body_top) {
            row[index] = body_char;
        }
    }

    let mut lines = Vec::with_capacity(height + 2);
    for (row, cells) in grid.iter().enumerate() {
        let ratio = if height <= 1 {
            0.0
        } else {
            row as f64 / (height - 1) as f64
        };
        let price = high - ((high - low) * ratio);
        lines.push(format!("{:>11} {}", format_price(price), cells.iter().collect::<String>()));
    }

    lines.push(format!("{:>11} {}", "", "-".repeat(candles.len())));

    let from = candles
        .first()
        .and_then(|candle| short_date(candle.timestamp_ms))
        .unwrap_or_else(|| "unknown".to_string());
    let to = candles
        .last()
        .and_then(|candle| short_date(candle.timestamp_ms))
        .unwrap_or_else(|| "unknown".to_string());
    lines.push(format!("history: {from} -> {to} ({} candles)", candles.len()));

    lines
}

/// Row 0 is `top`; prices outside the range are clamped onto the grid.
pub fn price_to_chart_row(price: f64, top: f64, bottom: f64, height: usize) -> usize {
    if height <= 1 {
        return 0;
    }

    let span = top - bottom;
    if span.abs() <= f64::EPSILON {
        return 0;
    }

    let normalized = ((top - price) / span).clamp(0.0, 1.0);
    (normalized * (height - 1) as f64).round() as usize
}

pub fn format_depth_bar(value: f64, max_value: f64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }

    if max_value <= 0.0 || value <= 0.0 {
        return " ".repeat(width);
    }

    let ratio = (value / max_value).clamp(0.0, 1.0);
    let filled = ((ratio * width as f64).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), " ".repeat(width - filled))
}

pub fn format_price(value: f64) -> String {
    if value.abs() >= 10_000.0 {
        return format!("{value:.2}");
    }
    if value.abs() >= 100.0 {
        return format!("{value:.4}");
    }
    format!("{value:.6}")
}

fn format_size(value: f64) -> String {
    if value.abs() >= 1_000.0 {
        return format!("{value:.1}");
    }
    format!("{value:.4}")
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_price).unwrap_or_else(|| "-".to_string())
}

fn format_change_pct(value: f64) -> String {
    format!("{value:+.2}%")
}

fn format_alert(alert: &PriceAlert) -> String {
    format!(
        "ALERT {} {:.2}% | {} -> {}",
        alert.direction.as_str(),
        alert.change_ratio * 100.0,
        format_price(alert.previous),
        format_price(alert.current)
    )
}

fn short_date(timestamp_ms: u64) -> Option<String> {
    chrono::DateTime::<Utc>::from_timestamp_millis(i64::try_from(timestamp_ms).ok()?)
        .map(|value| value.format("%Y-%m-%d").to_string())
}

fn compact(reason: &str) -> String {
    reason.replace('\n', " | ")
}
