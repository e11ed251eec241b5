//! CLI definition and dispatch.

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_journal_adapter::CsvJournalAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::ports::config_port::ConfigPort;
use crate::adapters::mock_broker_adapter::MockBroker;
use crate::domain::backtest::{Bar, BacktestRunner, SignalSource};
use crate::domain::config_validation::{
    build_backtest_settings, build_execution_config, build_risk_thresholds, build_session_config,
    validate_config,
};
use crate::domain::error::TrademillError;
use crate::domain::execution::PriceSource;
use crate::domain::order::{Order, OrderSide};
use crate::domain::risk::RiskPolicy;
use crate::domain::session::{ExecutionMode, TradingSession};
use crate::ports::broker_port::BrokerConfig;
use crate::ports::journal_port::JournalPort;

#[derive(Parser, Debug)]
#[command(name = "trademill", about = "Trade execution and risk evaluation core")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay historical bars against a scheduled order file
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        bars: PathBuf,
        #[arg(long)]
        orders: PathBuf,
        /// Journal directory (artifacts land under backtests/)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        run_id: Option<String>,
        /// Run without persisting artifacts
        #[arg(long)]
        dry_run: bool,
    },
    /// Execute a scheduled order file through an incremental session
    Session {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        orders: PathBuf,
        /// Quote file (symbol,price); order limit prices are used otherwise
        #[arg(long)]
        quotes: Option<PathBuf>,
        /// Journal directory (records land under sessions/)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Route orders through the simulated broker instead of the engine
        #[arg(long)]
        live: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            bars,
            orders,
            output,
            run_id,
            dry_run,
        } => run_backtest(
            &config,
            &bars,
            &orders,
            output.as_ref(),
            run_id.as_deref(),
            dry_run,
        ),
        Command::Session {
            config,
            orders,
            quotes,
            output,
            live,
        } => run_session(&config, &orders, quotes.as_ref(), output.as_ref(), live),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = TrademillError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn run_backtest(
    config_path: &PathBuf,
    bars_path: &PathBuf,
    orders_path: &PathBuf,
    output: Option<&PathBuf>,
    run_id: Option<&str>,
    dry_run: bool,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let execution_config = match build_execution_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let settings = match build_backtest_settings(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let thresholds = match build_risk_thresholds(&adapter) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 2: Load market data and scheduled orders
    eprintln!("Loading bars from {}", bars_path.display());
    let bars = match load_bars(bars_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!("Loading orders from {}", orders_path.display());
    let orders = match load_orders(orders_path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!(
        "Running backtest: {} bars, {} scheduled orders",
        bars.len(),
        orders.len()
    );

    // Stage 3: Replay
    let journal_dir = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from("journal"));
    let journal: Option<CsvJournalAdapter> =
        (!dry_run).then(|| CsvJournalAdapter::new(journal_dir));

    let runner = BacktestRunner::new(settings.initial_cash, execution_config);
    let mut signals = ScheduledOrders::new(orders);
    let result = match runner.run(
        &bars,
        &mut signals,
        &settings.strategy_id,
        run_id,
        journal.as_ref().map(|j| j as &dyn JournalPort),
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 4: Summary
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Final cash:       {:.2}", result.account.cash);
    eprintln!("Final equity:     {:.2}", result.account.total_equity());
    eprintln!("Trades executed:  {}", result.trades.len());
    match &result.metrics {
        Some(m) => {
            eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
            eprintln!("Annualized:       {:.2}%", m.annual_return * 100.0);
            eprintln!("Max Drawdown:     {:.2}%", m.max_drawdown * 100.0);
            eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
        }
        None => eprintln!("No equity points; metrics unavailable"),
    }

    // Stage 5: Risk evaluation on the final state
    let policy = RiskPolicy::new(thresholds);
    let decision = policy.evaluate(
        &crate::domain::risk::records_from_curve(&result.account.equity_curve),
        &result.account.snapshot_positions(),
    );
    if !decision.proceed {
        eprintln!("\n=== Risk Alerts ===");
        for alert in &decision.alerts {
            eprintln!("  {}", alert);
        }
    }

    for (kind, path) in &result.artifacts {
        eprintln!("{} written to: {}", kind, path.display());
    }
    ExitCode::SUCCESS
}

fn run_session(
    config_path: &PathBuf,
    orders_path: &PathBuf,
    quotes_path: Option<&PathBuf>,
    output: Option<&PathBuf>,
    live: bool,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let session_config = match build_session_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let execution_config = match build_execution_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let thresholds = match build_risk_thresholds(&adapter) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 2: Load orders and quotes
    eprintln!("Loading orders from {}", orders_path.display());
    let orders = match load_orders(orders_path) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let quotes = match quotes_path {
        Some(path) => match load_quotes(path) {
            Ok(q) => q,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
        None => quotes_from_orders(&orders),
    };

    // Stage 3: Run one execution cycle per order timestamp
    let journal_dir = output
        .cloned()
        .unwrap_or_else(|| PathBuf::from("journal"));
    let journal = CsvJournalAdapter::new(journal_dir);

    let mode = if live {
        let broker_account = adapter
            .get_string("broker", "account")
            .unwrap_or_else(|| session_config.session_id.clone());
        ExecutionMode::Live(Box::new(MockBroker::new(
            BrokerConfig::new("mock", broker_account),
            quotes.clone(),
        )))
    } else {
        ExecutionMode::Sandbox
    };
    eprintln!(
        "Starting {} session {} (strategy {})",
        if live { "live" } else { "sandbox" },
        session_config.session_id,
        session_config.strategy_id
    );
    let mut session = TradingSession::with_mode(session_config, execution_config, &journal, mode);
    let policy = RiskPolicy::new(thresholds);

    let mut batches: BTreeMap<NaiveDateTime, Vec<Order>> = BTreeMap::new();
    for order in orders {
        batches.entry(order.created_at).or_default().push(order);
    }

    for (dt, mut batch) in batches {
        if let Err(e) = session.execute(dt, &mut batch, &quotes) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        let decision = session.evaluate_risk(&policy);
        if !decision.proceed {
            eprintln!("\n=== Risk Alerts at {} ===", dt);
            for alert in &decision.alerts {
                eprintln!("  {}", alert);
            }
            eprintln!("Halting order submission");
            break;
        }
    }

    // Stage 4: Summary
    eprintln!("\n=== Session Results ===");
    eprintln!("Cash:             {:.2}", session.account.cash);
    eprintln!("Equity:           {:.2}", session.account.total_equity());
    eprintln!("Trades executed:  {}", session.account.trades.len());
    for snapshot in session.snapshot_positions() {
        eprintln!(
            "  {}: {} @ {:.2}",
            snapshot.symbol, snapshot.volume, snapshot.cost_price
        );
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match validate_config(&adapter) {
        Ok(()) => {
            eprintln!("Config validated successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Emits scheduled orders whose creation timestamp matches the replay
/// timestamp.
struct ScheduledOrders {
    batches: BTreeMap<NaiveDateTime, Vec<Order>>,
}

impl ScheduledOrders {
    fn new(orders: Vec<Order>) -> Self {
        let mut batches: BTreeMap<NaiveDateTime, Vec<Order>> = BTreeMap::new();
        for order in orders {
            batches.entry(order.created_at).or_default().push(order);
        }
        ScheduledOrders { batches }
    }
}

impl SignalSource for ScheduledOrders {
    fn orders(
        &mut self,
        dt: NaiveDateTime,
        _bars: &HashMap<String, Bar>,
        _account: &crate::domain::account::Account,
    ) -> Vec<Order> {
        self.batches.remove(&dt).unwrap_or_default()
    }
}

/// Static quote table; symbols without a quote report 0.0 so valuation
/// falls back to cost basis.
#[derive(Clone)]
struct QuoteTable {
    prices: HashMap<String, f64>,
}

impl PriceSource for QuoteTable {
    fn price(&self, symbol: &str, _side: OrderSide) -> f64 {
        self.prices.get(symbol).copied().unwrap_or(0.0)
    }
}

fn quotes_from_orders(orders: &[Order]) -> QuoteTable {
    let mut prices = HashMap::new();
    for order in orders {
        prices.insert(order.symbol.clone(), order.price);
    }
    QuoteTable { prices }
}

pub fn parse_datetime(value: &str) -> Result<NaiveDateTime, TrademillError> {
    let trimmed = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }
    Err(TrademillError::Data {
        reason: format!("invalid timestamp: {}", trimmed),
    })
}

fn parse_side(value: &str) -> Result<OrderSide, TrademillError> {
    match value.trim().to_lowercase().as_str() {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(TrademillError::Data {
            reason: format!("invalid order side: {}", other),
        }),
    }
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str, TrademillError> {
    record.get(index).ok_or_else(|| TrademillError::Data {
        reason: format!("missing {} column", name),
    })
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
) -> Result<T, TrademillError>
where
    T::Err: std::fmt::Display,
{
    field(record, index, name)?
        .trim()
        .parse()
        .map_err(|e| TrademillError::Data {
            reason: format!("invalid {} value: {}", name, e),
        })
}

/// Load bars from a CSV with columns
/// `symbol,dt,open,high,low,close,volume`.
pub fn load_bars(path: &PathBuf) -> Result<Vec<Bar>, TrademillError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut bars = Vec::new();
    for result in reader.records() {
        let record = result?;
        bars.push(Bar {
            symbol: field(&record, 0, "symbol")?.trim().to_string(),
            dt: parse_datetime(field(&record, 1, "dt")?)?,
            open: parse_field(&record, 2, "open")?,
            high: parse_field(&record, 3, "high")?,
            low: parse_field(&record, 4, "low")?,
            close: parse_field(&record, 5, "close")?,
            volume: parse_field(&record, 6, "volume")?,
        });
    }
    Ok(bars)
}

/// Load scheduled orders from a CSV with columns
/// `order_id,symbol,side,volume,price,created_at`.
pub fn load_orders(path: &PathBuf) -> Result<Vec<Order>, TrademillError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut orders = Vec::new();
    for result in reader.records() {
        let record = result?;
        orders.push(Order::new(
            field(&record, 0, "order_id")?.trim().to_string(),
            field(&record, 1, "symbol")?.trim().to_string(),
            parse_side(field(&record, 2, "side")?)?,
            parse_field(&record, 3, "volume")?,
            parse_field(&record, 4, "price")?,
            parse_datetime(field(&record, 5, "created_at")?)?,
        ));
    }
    Ok(orders)
}

/// Load quotes from a CSV with columns `symbol,price`.
fn load_quotes(path: &PathBuf) -> Result<QuoteTable, TrademillError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut prices = HashMap::new();
    for result in reader.records() {
        let record = result?;
        let symbol = field(&record, 0, "symbol")?.trim().to_string();
        let price: f64 = parse_field(&record, 1, "price")?;
        prices.insert(symbol, price);
    }
    Ok(QuoteTable { prices })
}
