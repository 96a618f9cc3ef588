use market_depth_view::config::{PriceApi, ViewConfig};

const USAGE: &str = r#"Usage:
  cargo run --bin depth_view -- [options]

Instrument:
  --symbol <symbol>          Exchange symbol for the book stream (default: BTCUSDT)
  --coin-id <id>             CoinGecko coin id (default: bitcoin)
  --vs <currency>            Quote currency for price and history (default: usd)
  --price-api <api>          `coingecko` or `binance` (default: coingecko)

Endpoints:
  --ws-url <url>             Book stream base URL
  --coingecko-url <url>      CoinGecko REST base URL
  --binance-url <url>        Binance REST base URL

View:
  --levels <count>           Depth levels to request and draw (default: 20, max: 20)
  --depth-floor <qty>        Minimum depth chart scale (default: 1000)
  --poll-ms <ms>             Price poll interval (default: 8000)
  --reconnect-ms <ms>        Fixed reconnect delay (default: 2000)
  --threshold <ratio>        Significant move threshold (default: 0.01)
  --history-days <days>      History lookback (default: 90)
  --render-ms <ms>           Repaint interval (default: 250)
  --timeout-ms <ms>          HTTP request timeout (default: 10000)
  --chart-height <rows>      Candle chart height (default: 12)
  --bell                     Ring the terminal bell on significant moves

Stop conditions:
  --duration-secs <secs>     Stop after this duration
  --iterations <count>       Stop after this many frames

Environment:
  DEPTH_VIEW_* variables set the same options; flags win.
  RUST_LOG controls stderr logging (default: warn).
"#;

#[derive(Debug)]
pub(crate) enum ParseResult {
    Help,
    Run(ViewConfig),
}

pub(crate) fn print_usage() {
    println!("{USAGE}");
}

pub(crate) fn parse_args(args: &[String], base: ViewConfig) -> Result<ParseResult, String> {
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        return Ok(ParseResult::Help);
    }

    let mut config = base;

    let mut index = 0usize;
    while index < args.len() {
        let flag = &args[index];
        let value = |i: &mut usize| -> Result<String, String> {
            let next = *i + 1;
            if next >= args.len() {
                return Err(format!("missing value for `{flag}`"));
            }
            *i = next;
            Ok(args[*i].clone())
        };

        match flag.as_str() {
            "--symbol" => {
                config.symbol = value(&mut index)?;
            }
            "--coin-id" => {
                config.coin_id = value(&mut index)?.trim().to_ascii_lowercase();
            }
            "--vs" => {
                config.vs_currency = value(&mut index)?.trim().to_ascii_lowercase();
            }
            "--price-api" => {
                let raw = value(&mut index)?;
                config.price_api = PriceApi::parse(&raw).ok_or_else(|| {
                    format!("invalid price api `{raw}` (expected `coingecko` or `binance`)")
                })?;
            }
            "--ws-url" => {
                config.ws_url = non_empty("--ws-url", &value(&mut index)?)?;
            }
            "--coingecko-url" => {
                config.coingecko_base_url = non_empty("--coingecko-url", &value(&mut index)?)?;
            }
            "--binance-url" => {
                config.binance_rest_url = non_empty("--binance-url", &value(&mut index)?)?;
            }
            "--levels" => {
                config.depth_limit = parse_u64_gt_zero("--levels", &value(&mut index)?)? as usize;
            }
            "--depth-floor" => {
                config.depth_floor = parse_non_negative("--depth-floor", &value(&mut index)?)?;
            }
            "--poll-ms" => {
                config.poll_interval_ms = parse_u64_gt_zero("--poll-ms", &value(&mut index)?)?;
            }
            "--reconnect-ms" => {
                config.reconnect_delay_ms =
                    parse_u64_gt_zero("--reconnect-ms", &value(&mut index)?)?;
            }
            "--threshold" => {
                config.significant_move_threshold =
                    parse_non_negative("--threshold", &value(&mut index)?)?;
            }
            "--history-days" => {
                let days = parse_u64_gt_zero("--history-days", &value(&mut index)?)?;
                config.history_days = u32::try_from(days)
                    .map_err(|_| "`--history-days` is too large".to_string())?;
            }
            "--render-ms" => {
                config.render_ms = parse_u64_gt_zero("--render-ms", &value(&mut index)?)?;
            }
            "--timeout-ms" => {
                config.request_timeout_ms = parse_u64_gt_zero("--timeout-ms", &value(&mut index)?)?;
            }
            "--chart-height" => {
                config.chart_height = parse_u64_gt_zero("--chart-height", &value(&mut index)?)? as usize;
            }
            "--bell" => {
                config.bell = true;
            }
            "--duration-secs" => {
                config.duration_secs =
                    Some(parse_u64_gt_zero("--duration-secs", &value(&mut index)?)?);
            }
            "--iterations" => {
                config.iterations = Some(parse_u64_gt_zero("--iterations", &value(&mut index)?)?);
            }
            _ => {
                return Err(format!("unknown argument `{flag}`"));
            }
        }

        index += 1;
    }

    config.validate().map_err(|err| err.to_string())?;
    Ok(ParseResult::Run(config))
}

fn non_empty(field: &str, value: &str) -> Result<String, String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(format!("`{field}` cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn parse_u64_gt_zero(field: &str, value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|_| format!("`{field}` expects a positive integer"))?;
    if parsed == 0 {
        return Err(format!("`{field}` must be greater than 0"));
    }
    Ok(parsed)
}

fn parse_non_negative(field: &str, value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|_| format!("`{field}` expects a number"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(format!("`{field}` must be a non-negative number"));
    }
    Ok(parsed)
}
