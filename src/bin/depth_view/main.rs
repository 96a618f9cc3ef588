use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use market_depth_view::{
    config::{PriceApi, ViewConfig},
    history::{HistoryLoader, HistoryState},
    models::{BookSnapshot, PriceStat},
    poll::PollSupervisor,
    render::{frame::FrameLayout, RenderConfig, RenderSink, TerminalRenderer, ViewReceivers},
    sources::{
        BinanceDepthConnector, BinanceTickerPriceSource, BookStreamConnector, CoinGeckoHistorySource,
        CoinGeckoPriceSource, HistorySource, HttpJsonClient, PriceSource,
    },
    state::cell,
    stream::StreamSupervisor,
};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

mod cli;

#[cfg(test)]
mod tests;

use cli::{parse_args, print_usage, ParseResult};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let base = match ViewConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}\n");
            print_usage();
            std::process::exit(2);
        }
    };

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match parse_args(&args, base) {
        Ok(ParseResult::Help) => {
            print_usage();
            return Ok(());
        }
        Ok(ParseResult::Run(config)) => config,
        Err(err) => {
            eprintln!("error: {err}\n");
            print_usage();
            std::process::exit(2);
        }
    };

    run_view(config).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run_view(config: ViewConfig) -> anyhow::Result<()> {
    let http = HttpJsonClient::new(config.request_timeout_ms)
        .context("failed to build HTTP client")?;
    let connector: Arc<dyn BookStreamConnector> = Arc::new(
        BinanceDepthConnector::new(&config.ws_url, &config.symbol, config.depth_limit)
            .context("invalid book stream symbol")?,
    );
    let price_source: Arc<dyn PriceSource> = match config.price_api {
        PriceApi::CoinGecko => Arc::new(CoinGeckoPriceSource::new(
            http.clone(),
            &config.coingecko_base_url,
            &config.coin_id,
            &config.vs_currency,
        )),
        PriceApi::Binance => Arc::new(BinanceTickerPriceSource::new(
            http.clone(),
            &config.binance_rest_url,
            &config.symbol,
        )),
    };
    let history_source: Arc<dyn HistorySource> = Arc::new(CoinGeckoHistorySource::new(
        http,
        &config.coingecko_base_url,
        &config.coin_id,
        &config.vs_currency,
    ));

    tracing::info!(
        endpoint = %connector.endpoint(),
        price_api = config.price_api.as_str(),
        "starting depth view"
    );

    let (book, book_rx) = cell(Arc::new(BookSnapshot::empty()));
    let (price, price_rx) = cell(PriceStat::Pending);
    let (history, history_rx) = cell(HistoryState::Loading);
    let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();

    let stream = StreamSupervisor::connect(connector, book, config.stream_config());
    let poll = PollSupervisor::start(price_source, price, alerts_tx, config.poll_config());
    let history_loader = HistoryLoader::start(history_source, history, config.history_days);

    let views = ViewReceivers {
        book: book_rx,
        price: price_rx,
        connection: stream.status(),
        history: history_rx,
        alerts: alerts_rx,
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_tx.send_replace(true);
        }
    });

    let render_config = RenderConfig {
        symbol: config.symbol.clone(),
        interval: Duration::from_millis(config.render_ms),
        layout: FrameLayout {
            levels: config.depth_limit,
            depth_limit: config.depth_limit,
            depth_floor: config.depth_floor,
            chart_height: config.chart_height,
            depth_chart_width: config.depth_chart_width,
            depth_chart_height: config.depth_chart_height,
            ..FrameLayout::default()
        },
        bell: config.bell,
        max_frames: config.iterations,
        max_duration: config.duration_secs.map(Duration::from_secs),
        ..RenderConfig::default()
    };

    let outcome = {
        let renderer = TerminalRenderer::new().context("failed to initialize terminal")?;
        let mut sink = RenderSink::new(renderer, render_config);
        sink.run(views, stop_rx).await
    };

    ctrl_c.abort();
    stream.stop();
    poll.stop();
    history_loader.stop();
    let stream_stats = stream.stats();
    let poll_stats = poll.stats();
    stream.join().await;
    poll.join().await;
    history_loader.join().await;

    let outcome = outcome.context("render loop failed")?;
    println!(
        "stopped: {} after {} frames (connections={} reconnects={} dropped={} fetches={} fetch_failures={} alerts={})",
        outcome.reason.as_str(),
        outcome.frames,
        stream_stats.connections_opened,
        stream_stats.reconnects_scheduled,
        stream_stats.dropped_messages,
        poll_stats.fetches,
        poll_stats.failures,
        poll_stats.alerts,
    );

    Ok(())
}
