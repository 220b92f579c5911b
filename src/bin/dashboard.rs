//! Metrics dashboard - live view of a metrics relay
//!
//! Polls `GET /metrics` on a fixed period and displays:
//! - Status (fresh, stale, or baseline) with the last fetch error
//! - Metric tiles (scanned, anomalies, fps, normal, % anomalous, threshold)
//! - Precision / recall / F1 over epochs
//!
//! Usage:
//!   cargo run --bin metrics-dashboard -- --url http://127.0.0.1:8050/metrics
//!   cargo run --bin metrics-dashboard -- --headless

use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use metrics_relay::domain::record::{
    EPOCHS, F1, PERCENT_ANOMALOUS, PRECISION, RECALL, THRESHOLD, TOTAL_NORMAL,
};
use metrics_relay::infra::config::DEFAULT_CONFIG_PATH;
use metrics_relay::infra::logging::init_tracing;
use metrics_relay::infra::Config;
use metrics_relay::io::{ChannelRenderer, HttpMetricsClient, LogRenderer};
use metrics_relay::services::{DashboardFrame, DashboardPoller, Freshness, PollerSettings};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// UI redraw period
const UI_TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "metrics-dashboard", version)]
#[command(about = "Live dashboard for a metrics relay")]
struct Args {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Relay `/metrics` URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Poll period in milliseconds (overrides config and POLL_INTERVAL_MS)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log frames instead of drawing a terminal UI
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    if args.headless {
        init_tracing("info");
    }

    let mut config = Config::load_from_path(&args.config);
    if let Some(url) = args.url {
        config = config.with_dashboard_url(url);
    }
    if let Some(ms) = args.interval_ms {
        config = config.with_poll_interval_ms(ms);
    }

    let client = HttpMetricsClient::new(
        config.dashboard_url(),
        Duration::from_millis(config.dashboard_request_timeout_ms()),
    )?;
    let settings = PollerSettings {
        interval: Duration::from_millis(config.poll_interval_ms().max(1)),
        default_threshold: config.default_threshold(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if args.headless {
        info!(
            url = %config.dashboard_url(),
            poll_interval_ms = %config.poll_interval_ms(),
            request_timeout_ms = %config.dashboard_request_timeout_ms(),
            "config_loaded"
        );
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown_signal_received");
            let _ = shutdown_tx.send(true);
        });
        DashboardPoller::new(client, LogRenderer, settings).run(shutdown_rx).await;
        return Ok(());
    }

    let url = config.dashboard_url().to_string();
    let (renderer, frames) = ChannelRenderer::new();
    let poller = tokio::spawn(DashboardPoller::new(client, renderer, settings).run(shutdown_rx));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_ui(&mut terminal, frames, &url);

    let _ = shutdown_tx.send(true);
    let _ = poller.await;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    frames: watch::Receiver<Option<DashboardFrame>>,
    url: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let frame = frames.borrow().clone();
        terminal.draw(|f| draw_ui(f, frame.as_ref(), url))?;

        if event::poll(UI_TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn draw_ui(f: &mut Frame, frame: Option<&DashboardFrame>, url: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(4), // Tiles
            Constraint::Min(0),    // Chart
        ])
        .split(f.area());

    draw_header(f, chunks[0], frame, url);
    match frame {
        Some(frame) => {
            draw_tiles(f, chunks[1], frame);
            draw_scores(f, chunks[2], frame);
        }
        None => {
            let waiting = Paragraph::new("Waiting for first poll...")
                .block(Block::default().borders(Borders::ALL));
            f.render_widget(waiting, chunks[1]);
        }
    }
}

fn draw_header(f: &mut Frame, area: Rect, frame: Option<&DashboardFrame>, url: &str) {
    let (status_text, status_color) = match frame.map(|fr| &fr.freshness) {
        Some(Freshness::Fresh) => ("FRESH", Color::Green),
        Some(Freshness::Stale { .. }) => ("STALE", Color::Yellow),
        Some(Freshness::Baseline { .. }) => ("BASELINE", Color::Red),
        None => ("CONNECTING", Color::DarkGray),
    };

    let last_success = frame
        .and_then(|fr| fr.last_success)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::styled("Metrics Dashboard ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(format!(" | {url} | Tick: {}", frame.map(|fr| fr.tick).unwrap_or(0))),
        Span::raw(format!(" | Last ok: {last_success}")),
    ];
    if let Some(reason) = frame.and_then(|fr| fr.freshness.reason()) {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(reason.to_string(), Style::default().fg(Color::Red)));
    }
    spans.push(Span::raw(" | Press 'q' to quit"));

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn tile(f: &mut Frame, area: Rect, title: &str, value: String, color: Color) {
    let widget = Paragraph::new(Line::from(Span::styled(
        value,
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )))
    .block(Block::default().title(format!(" {title} ")).borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn draw_tiles(f: &mut Frame, area: Rect, frame: &DashboardFrame) {
    let record = &frame.record;
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 6); 6])
        .split(area);

    let percent = record.number(PERCENT_ANOMALOUS).unwrap_or(0.0);
    let percent_color = if percent < 2.0 {
        Color::Green
    } else if percent < 5.0 {
        Color::Yellow
    } else {
        Color::Red
    };

    tile(f, cols[0], "Scanned", record.scanned().to_string(), Color::White);
    tile(f, cols[1], "Anomalies", record.anomalies().to_string(), Color::Red);
    tile(f, cols[2], "FPS", format!("{:.2}", record.fps()), Color::Cyan);
    tile(
        f,
        cols[3],
        "Normal",
        record.count(TOTAL_NORMAL).unwrap_or(0).to_string(),
        Color::Green,
    );
    tile(f, cols[4], "% Anomalous", format!("{percent:.2}%"), percent_color);
    tile(
        f,
        cols[5],
        "Threshold",
        format!("{:.2}", record.number(THRESHOLD).unwrap_or(0.0)),
        Color::Magenta,
    );
}

fn draw_scores(f: &mut Frame, area: Rect, frame: &DashboardFrame) {
    let record = &frame.record;
    let epochs = record.series(EPOCHS);

    let points = |field: &str| -> Vec<(f64, f64)> {
        epochs.iter().copied().zip(record.series(field)).collect()
    };
    let precision = points(PRECISION);
    let recall = points(RECALL);
    let f1 = points(F1);

    let x_min = epochs.first().copied().unwrap_or(0.0);
    let x_max = epochs.last().copied().unwrap_or(1.0).max(x_min + 1.0);

    let datasets = vec![
        Dataset::default()
            .name("precision")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&precision),
        Dataset::default()
            .name("recall")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Yellow))
            .data(&recall),
        Dataset::default()
            .name("f1")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Green))
            .data(&f1),
    ];

    let chart = Chart::new(datasets)
        .block(Block::default().title(" Model scores by epoch ").borders(Borders::ALL))
        .x_axis(
            Axis::default()
                .title("epoch")
                .style(Style::default().fg(Color::Gray))
                .bounds([x_min, x_max])
                .labels(vec![Span::raw(format!("{x_min}")), Span::raw(format!("{x_max}"))]),
        )
        .y_axis(
            Axis::default()
                .title("score")
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, 1.0])
                .labels(vec![Span::raw("0.0"), Span::raw("0.5"), Span::raw("1.0")]),
        );

    f.render_widget(chart, area);
}
