use crate::config::TrackerConfig;
use crate::store::FileStore;
use crate::ui::theme::{change_color, Palette, Theme};
use crate::ui::view_model::{spark_line, AlertsView, CoinDetail, DashboardViewModel};
use chrono::{DateTime, Local, TimeZone, Utc};
use crossterm::{
    cursor::Show,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use num_format::{Locale, ToFormattedString};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    symbols,
    text::{Line, Span, Text},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::error::Error;
use std::io;
use std::time::{Duration, Instant};

type DynError = Box<dyn Error + Send + Sync>;

/// Longest the loop blocks on input before checking the refresh timer
const INPUT_POLL: Duration = Duration::from_millis(250);

/// Controller state owned by the event loop. Everything drawn comes from the
/// current [`DashboardViewModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub selected: Option<String>,
    pub theme: Theme,
    pub running: bool,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            selected: None,
            theme: Theme::default(),
            running: true,
        }
    }
}

/// Raw mode plus the alternate screen, undone on drop.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        disable_raw_mode().ok();
        execute!(io::stdout(), LeaveAlternateScreen, Show).ok();
    }
}

pub struct Dashboard {
    store: FileStore,
    poll_interval: Duration,
    top_n: usize,
    state: DashboardState,
    view: DashboardViewModel,
}

impl Dashboard {
    pub fn new(config: &TrackerConfig) -> Self {
        let store = FileStore::new(config);
        let view = DashboardViewModel::load(&store, None, config.top_n);
        Self {
            store,
            poll_interval: config.poll_interval,
            top_n: config.top_n,
            state: DashboardState::default(),
            view,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn view(&self) -> &DashboardViewModel {
        &self.view
    }

    /// Rebuild the view model from the files on disk.
    pub fn refresh(&mut self) {
        self.view =
            DashboardViewModel::load(&self.store, self.state.selected.as_deref(), self.top_n);
    }

    /// Take over the terminal until the user quits. Blocks the calling
    /// thread; the terminal is restored on every exit path.
    pub fn run(&mut self) -> Result<(), DynError> {
        let _guard = TerminalGuard::enter()?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        terminal.clear()?;

        self.event_loop(&mut terminal)
    }

    fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), DynError> {
        info!("Dashboard polling every {}s", self.poll_interval.as_secs());
        self.refresh();
        let mut last_refresh = Instant::now();

        while self.state.running {
            terminal.draw(|f| self.render(f))?;

            let until_refresh = self.poll_interval.saturating_sub(last_refresh.elapsed());
            if event::poll(until_refresh.min(INPUT_POLL))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press && self.handle_key(key.code) {
                        self.refresh();
                        last_refresh = Instant::now();
                    }
                }
            }

            if last_refresh.elapsed() >= self.poll_interval {
                self.refresh();
                last_refresh = Instant::now();
            }
        }
        Ok(())
    }

    /// Apply one key press. Returns true when the view must be rebuilt.
    pub fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.state.running = false;
                false
            }
            KeyCode::Char('t') => {
                self.state.theme = self.state.theme.toggle();
                true
            }
            KeyCode::Char('r') => true,
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            _ => false,
        }
    }

    fn move_selection(&mut self, step: isize) -> bool {
        if self.view.market.is_empty() {
            return false;
        }
        let last = self.view.market.len() - 1;
        let next = match self
            .state
            .selected
            .as_deref()
            .and_then(|id| self.view.position_of(id))
        {
            Some(current) => current.saturating_add_signed(step).min(last),
            None => 0,
        };
        self.state.selected = Some(self.view.market[next].id.clone());
        true
    }

    pub fn render(&self, f: &mut Frame) {
        let palette = self.state.theme.palette();
        let base = Style::default().fg(palette.text).bg(palette.card_bg);
        f.render_widget(Block::default().style(base), f.size());

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(12),
                Constraint::Min(8),
                Constraint::Length(9),
                Constraint::Length(2),
            ])
            .split(f.size());

        self.render_header(f, chunks[0], palette);

        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(33), Constraint::Percentage(67)])
            .split(chunks[1]);
        self.render_coin_card(f, top[0], palette);
        self.render_price_chart(f, top[1], palette);

        self.render_market_table(f, chunks[2], palette);
        self.render_alerts(f, chunks[3], palette);
        self.render_footer(f, chunks[4], palette);
    }

    fn render_header(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let status = if self.view.has_snapshot {
            Span::styled(
                format!("{} coins", self.view.market.len()),
                Style::default().fg(palette.accent),
            )
        } else {
            Span::styled("NO DATA", Style::default().fg(crate::ui::theme::LOSS))
        };

        let header = Paragraph::new(Text::from(vec![
            Line::from(vec![
                Span::styled(
                    "CRYPTO TRACKER ",
                    Style::default()
                        .fg(palette.accent)
                        .add_modifier(Modifier::BOLD),
                ),
                status,
            ]),
            Line::from(Span::styled(
                format!(
                    "Last refresh: {} | Poll: {}s | Theme: {}",
                    self.view.refreshed_at.with_timezone(&Local).format("%H:%M:%S"),
                    self.poll_interval.as_secs(),
                    self.state.theme.as_str()
                ),
                Style::default().fg(palette.grid),
            )),
        ]))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));

        f.render_widget(header, area);
    }

    fn render_coin_card(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.grid))
            .title("Coin");

        let Some(coin) = &self.view.coin else {
            let message = Paragraph::new("Select a coin (↑/↓)").block(block);
            f.render_widget(message, area);
            return;
        };

        let card = Paragraph::new(Text::from(vec![
            Line::from(Span::styled(
                format!("{} ({})", coin.name, coin.symbol.to_uppercase()),
                Style::default()
                    .fg(palette.accent)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                Self::format_price(coin.current_price),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("24h Change: {}", Self::format_change(coin.price_change_24h)),
                Style::default().fg(change_color(coin.price_change_24h)),
            )),
        ]))
        .block(block);

        f.render_widget(card, area);
    }

    fn render_price_chart(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.grid));

        let Some(coin) = &self.view.coin else {
            f.render_widget(block.title("Price History"), area);
            return;
        };

        let points = Self::chart_points(coin);
        let (x_min, x_max) = Self::padded_bounds(points.iter().map(|(x, _)| *x), 0.0, 60.0);
        let (y_min, y_max) = Self::padded_bounds(points.iter().map(|(_, y)| *y), 0.01, 1.0);

        let series = Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(palette.accent))
            .data(&points);

        let chart = Chart::new(vec![series])
            .block(block.title(format!("{} Price History", coin.name)))
            .x_axis(
                Axis::default()
                    .style(Style::default().fg(palette.grid))
                    .bounds([x_min, x_max])
                    .labels(vec![
                        Span::raw(Self::format_time(x_min)),
                        Span::raw(Self::format_time(x_max)),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .title("Price (USD)")
                    .style(Style::default().fg(palette.grid))
                    .bounds([y_min, y_max])
                    .labels(vec![
                        Span::raw(format!("{:.2}", y_min)),
                        Span::raw(format!("{:.2}", y_max)),
                    ]),
            );

        f.render_widget(chart, area);
    }

    fn render_market_table(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.grid))
            .title(format!("Market Overview (Top {})", self.top_n));

        if self.view.market.is_empty() {
            f.render_widget(Paragraph::new("No data available").block(block), area);
            return;
        }

        let selected = self.state.selected.as_deref();
        let rows = self.view.market.iter().map(|row| {
            let style = if Some(row.id.as_str()) == selected {
                Style::default()
                    .fg(palette.card_bg)
                    .bg(palette.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(row.name.clone()),
                Cell::from(row.symbol.to_uppercase()),
                Cell::from(Self::format_price(row.current_price)),
                Cell::from(Span::styled(
                    Self::format_change(row.price_change_24h),
                    Style::default().fg(change_color(row.price_change_24h)),
                )),
                Cell::from(Self::format_market_cap(row.market_cap)),
                Cell::from(spark_line(&row.trend)),
            ])
            .style(style)
        });

        let table = Table::new(
            rows,
            [
                Constraint::Length(20),
                Constraint::Length(8),
                Constraint::Length(16),
                Constraint::Length(9),
                Constraint::Length(22),
                Constraint::Length(9),
            ],
        )
        .header(
            Row::new(vec!["Name", "Symbol", "Price ($)", "24h %", "Market Cap", "Trend"])
                .style(Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)),
        )
        .block(block);

        f.render_widget(table, area);
    }

    fn render_alerts(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.grid));
        let header_style = Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD);

        let table = match &self.view.alerts {
            AlertsView::NoData => {
                let message = Paragraph::new("No data available")
                    .alignment(Alignment::Center)
                    .block(block.title("Recent Alerts"));
                f.render_widget(message, area);
                return;
            }
            AlertsView::Current(alerts) => {
                let rows = alerts.iter().map(|alert| {
                    Row::new(vec![
                        Cell::from(alert.id.clone()),
                        Cell::from(alert.symbol.to_uppercase()),
                        Cell::from(alert.name.clone()),
                        Cell::from(Self::format_price(alert.current_price)),
                        Cell::from(Span::styled(
                            Self::format_change(alert.price_change_24h),
                            Style::default().fg(change_color(alert.price_change_24h)),
                        )),
                        Cell::from(Self::format_timestamp(alert.alert_time)),
                    ])
                });
                Table::new(rows, Self::alert_widths(6))
                    .header(
                        Row::new(vec![
                            "id",
                            "symbol",
                            "name",
                            "current_price",
                            "price_change_24h",
                            "alert_time",
                        ])
                        .style(header_style),
                    )
                    .block(block.title(format!("Recent Alerts ({})", alerts.len())))
            }
            AlertsView::TopMovers(movers) => {
                let rows = movers.iter().map(|mover| {
                    Row::new(vec![
                        Cell::from(mover.id.clone()),
                        Cell::from(mover.symbol.to_uppercase()),
                        Cell::from(mover.name.clone()),
                        Cell::from(Self::format_price(mover.current_price)),
                        Cell::from(Span::styled(
                            Self::format_change(mover.price_change_pct),
                            Style::default().fg(change_color(mover.price_change_pct)),
                        )),
                    ])
                });
                Table::new(rows, Self::alert_widths(5))
                    .header(
                        Row::new(vec![
                            "id",
                            "symbol",
                            "name",
                            "current_price",
                            "price_change_pct",
                        ])
                        .style(header_style),
                    )
                    .block(block.title("Recent Alerts (no alert file, top movers)"))
            }
        };

        f.render_widget(table, area);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect, palette: Palette) {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let controls = vec![
            Span::raw("Controls: "),
            Span::styled("↑/↓", bold),
            Span::raw(" Select coin  "),
            Span::styled("t", bold),
            Span::raw(" Toggle theme (Light / Dark)  "),
            Span::styled("r", bold),
            Span::raw(" Refresh  "),
            Span::styled("q", bold),
            Span::raw(" Quit"),
        ];

        let footer = Paragraph::new(Line::from(controls))
            .style(Style::default().fg(palette.grid))
            .block(Block::default().borders(Borders::TOP));

        f.render_widget(footer, area);
    }

    fn alert_widths(columns: usize) -> Vec<Constraint> {
        let mut widths = vec![
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(18),
            Constraint::Length(16),
            Constraint::Length(17),
        ];
        if columns > widths.len() {
            widths.push(Constraint::Min(20));
        }
        widths
    }

    fn chart_points(coin: &CoinDetail) -> Vec<(f64, f64)> {
        coin.series
            .iter()
            .map(|(ts, price)| (ts.timestamp() as f64, *price))
            .collect()
    }

    /// Min/max of `values`. When they coincide the range is widened by
    /// `relative` of the value, but never less than `min_pad`.
    fn padded_bounds(
        values: impl Iterator<Item = f64>,
        relative: f64,
        min_pad: f64,
    ) -> (f64, f64) {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !min.is_finite() || !max.is_finite() {
            return (0.0, 1.0);
        }
        if max - min <= f64::EPSILON {
            let pad = (min.abs() * relative).max(min_pad);
            return (min - pad, max + pad);
        }
        (min, max)
    }

    fn format_time(epoch_secs: f64) -> String {
        Utc.timestamp_opt(epoch_secs as i64, 0)
            .single()
            .map(Self::format_timestamp)
            .unwrap_or_default()
    }

    fn format_timestamp(ts: DateTime<Utc>) -> String {
        ts.with_timezone(&Local).format("%m-%d %H:%M").to_string()
    }

    fn format_price(price: f64) -> String {
        if price.abs() >= 1000.0 {
            Self::format_usd(price, 2)
        } else if price.abs() >= 1.0 {
            format!("${:.2}", price)
        } else {
            format!("${:.6}", price)
        }
    }

    fn format_change(change: f64) -> String {
        format!("{:.2}%", change)
    }

    fn format_market_cap(market_cap: f64) -> String {
        Self::format_usd(market_cap, 0)
    }

    /// `$` amount with thousands separators.
    fn format_usd(value: f64, decimals: usize) -> String {
        let sign = if value < 0.0 { "-" } else { "" };
        let fixed = format!("{:.*}", decimals, value.abs());
        let (whole, fraction) = match fixed.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (fixed.as_str(), None),
        };
        let grouped = whole
            .parse::<u64>()
            .map(|w| w.to_formatted_string(&Locale::en))
            .unwrap_or_else(|_| whole.to_string());
        match fraction {
            Some(fraction) => format!("{}${}.{}", sign, grouped, fraction),
            None => format!("{}${}", sign, grouped),
        }
    }
}
