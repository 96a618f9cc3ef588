use market_depth_view::config::{PriceApi, ViewConfig};

use super::{parse_args, ParseResult};

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|value| value.to_string()).collect()
}

fn parse_run(args: &[&str]) -> ViewConfig {
    match parse_args(&to_args(args), ViewConfig::default()).expect("parse should succeed") {
        ParseResult::Run(config) => config,
        ParseResult::Help => panic!("expected ParseResult::Run"),
    }
}

fn parse_err(args: &[&str]) -> String {
    parse_args(&to_args(args), ViewConfig::default()).expect_err("parse should fail")
}

#[test]
fn no_arguments_runs_with_defaults() {
    let config = parse_run(&[]);
    assert_eq!(config, ViewConfig::default());
}

#[test]
fn parse_args_reads_instrument_and_view_flags() {
    let config = parse_run(&[
        "--symbol",
        "ETH/USDT",
        "--coin-id",
        "Ethereum",
        "--vs",
        "EUR",
        "--price-api",
        "binance",
        "--levels",
        "10",
        "--poll-ms",
        "5000",
        "--threshold",
        "0.02",
        "--bell",
        "--iterations",
        "3",
    ]);

    assert_eq!(config.symbol, "ETH/USDT");
    assert_eq!(config.coin_id, "ethereum");
    assert_eq!(config.vs_currency, "eur");
    assert_eq!(config.price_api, PriceApi::Binance);
    assert_eq!(config.depth_limit, 10);
    assert_eq!(config.poll_interval_ms, 5_000);
    assert_eq!(config.significant_move_threshold, 0.02);
    assert!(config.bell);
    assert_eq!(config.iterations, Some(3));
}

#[test]
fn flags_override_environment_base() {
    let base = ViewConfig {
        symbol: "SOLUSDT".to_string(),
        render_ms: 500,
        ..ViewConfig::default()
    };
    let parsed = parse_args(&to_args(&["--render-ms", "100"]), base).expect("parse should succeed");
    let ParseResult::Run(config) = parsed else {
        panic!("expected ParseResult::Run");
    };

    assert_eq!(config.symbol, "SOLUSDT");
    assert_eq!(config.render_ms, 100);
}

#[test]
fn levels_are_clamped_to_stream_maximum() {
    let config = parse_run(&["--levels", "100"]);
    assert_eq!(config.depth_limit, 20);
}

#[test]
fn help_wins_over_other_flags() {
    let parsed = parse_args(&to_args(&["--symbol", "BTCUSDT", "--help"]), ViewConfig::default())
        .expect("parse should succeed");
    assert!(matches!(parsed, ParseResult::Help));
}

#[test]
fn parse_args_rejects_bad_input() {
    assert_eq!(parse_err(&["--frobnicate"]), "unknown argument `--frobnicate`");
    assert_eq!(parse_err(&["--symbol"]), "missing value for `--symbol`");
    assert_eq!(parse_err(&["--poll-ms", "0"]), "`--poll-ms` must be greater than 0");
    assert_eq!(parse_err(&["--levels", "ten"]), "`--levels` expects a positive integer");
    assert!(parse_err(&["--price-api", "kraken"]).contains("invalid price api"));
    assert!(parse_err(&["--threshold", "-0.5"]).contains("non-negative"));
    assert_eq!(parse_err(&["--ws-url", "  "]), "`--ws-url` cannot be empty");
}
