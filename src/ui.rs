use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use holdings_pivot::{
    export_columns, export_rows, BatchReport, ExportRow, FileOutcome, PivotTable, SortColumn,
    SortDirection, SortSpec,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Pivot,
    Report,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Pivot => Page::Report,
            Page::Report => Page::Pivot,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Pivot => "Holdings Pivot",
            Page::Report => "Import Report",
        }
    }
}

pub struct App {
    pub table: PivotTable,
    pub report: BatchReport,
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub sort: SortSpec,
    pub state: TableState,
    pub report_state: TableState,
    pub current_page: Page,
}

impl App {
    pub fn new(table: PivotTable, report: BatchReport) -> Self {
        let columns = export_columns(&table);
        let sort = SortSpec::default();
        let rows = export_rows(&table, &sort);

        let mut state = TableState::default();
        if !rows.is_empty() {
            state.select(Some(0));
        }

        let mut report_state = TableState::default();
        if !report.files.is_empty() {
            report_state.select(Some(0));
        }

        Self {
            table,
            report,
            columns,
            rows,
            sort,
            state,
            report_state,
            current_page: Page::Pivot,
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    fn sort_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c == self.sort.column.label())
            .unwrap_or(0)
    }

    fn apply_sort(&mut self, spec: SortSpec) {
        self.sort = spec;
        self.rows = export_rows(&self.table, &self.sort);
        if !self.rows.is_empty() {
            self.state.select(Some(0));
        }
    }

    /// Move the sort key one column right, wrapping around
    pub fn sort_next_column(&mut self) {
        let idx = (self.sort_index() + 1) % self.columns.len();
        let column = SortColumn::from_label(&self.columns[idx]);
        self.apply_sort(SortSpec::new(column, self.sort.direction));
    }

    /// Move the sort key one column left, wrapping around
    pub fn sort_previous_column(&mut self) {
        let idx = match self.sort_index() {
            0 => self.columns.len() - 1,
            i => i - 1,
        };
        let column = SortColumn::from_label(&self.columns[idx]);
        self.apply_sort(SortSpec::new(column, self.sort.direction));
    }

    pub fn toggle_direction(&mut self) {
        let spec = SortSpec::new(self.sort.column.clone(), self.sort.direction.toggle());
        self.apply_sort(spec);
    }

    fn active_len(&self) -> usize {
        match self.current_page {
            Page::Pivot => self.rows.len(),
            Page::Report => self.report.files.len(),
        }
    }

    fn active_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Pivot => &mut self.state,
            Page::Report => &mut self.report_state,
        }
    }

    pub fn next(&mut self) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.active_len();
        if len == 0 {
            return;
        }
        let state = self.active_state();
        let i = state.selected().map(|i| (i + PAGE_SIZE).min(len - 1)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let state = self.active_state();
        let i = state.selected().map(|i| i.saturating_sub(PAGE_SIZE)).unwrap_or(0);
        state.select(Some(i));
    }

    pub fn home(&mut self) {
        if self.active_len() > 0 {
            self.active_state().select(Some(0));
        }
    }

    pub fn end(&mut self) {
        let len = self.active_len();
        if len > 0 {
            self.active_state().select(Some(len - 1));
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Tab | KeyCode::BackTab => app.next_page(),
                KeyCode::Right | KeyCode::Char('l') if app.current_page == Page::Pivot => {
                    app.sort_next_column()
                }
                KeyCode::Left | KeyCode::Char('h') if app.current_page == Page::Pivot => {
                    app.sort_previous_column()
                }
                KeyCode::Char('s') if app.current_page == Page::Pivot => app.toggle_direction(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home => app.home(),
                KeyCode::End => app.end(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::Pivot => render_pivot(f, chunks[1], app),
        Page::Report => render_report(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Pivot, Page::Report].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Companies: {}", app.table.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Owners: {}", app.table.owners().len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", format_quantity(app.table.grand_total())),
        Style::default().fg(Color::Green),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_pivot(f: &mut Frame, area: Rect, app: &mut App) {
    let sort_label = app.sort.column.label().to_string();
    let arrow = match app.sort.direction {
        SortDirection::Asc => " ▲",
        SortDirection::Desc => " ▼",
    };

    let header_cells = app.columns.iter().map(|h| {
        let text = if *h == sort_label {
            format!("{}{}", h, arrow)
        } else {
            h.clone()
        };
        Cell::from(text).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let last = app.columns.len().saturating_sub(2);
    let rows = app.rows.iter().map(|row| {
        let mut cells = vec![Cell::from(truncate(&row.company, 38))];
        for (i, value) in row.values.iter().enumerate() {
            let style = if i == last {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else if *value == 0.0 {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            cells.push(Cell::from(format_quantity(*value)).style(style));
        }
        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(40)];
    widths.extend(app.columns.iter().skip(1).map(|_| Constraint::Length(16)));

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Holdings by Company "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_report(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["File", "Owner", "Status", "Records", "Detail"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.report.files.iter().map(|file| {
        let (status, color, detail) = match &file.outcome {
            FileOutcome::Imported { mapping, .. } => (
                "imported",
                Color::Green,
                format!(
                    "data row {}, company col {}, total col {}",
                    mapping.data_start_row, mapping.company_col, mapping.total_col
                ),
            ),
            FileOutcome::DecodeFailed { error } => ("failed", Color::Red, error.clone()),
            FileOutcome::NoDataFound { preview } => (
                "no data",
                Color::Yellow,
                format!("{} preview rows", preview.len()),
            ),
        };

        let cells = vec![
            Cell::from(truncate(&file.file_name, 38)),
            Cell::from(truncate(&file.owner, 22)),
            Cell::from(status).style(Style::default().fg(color)),
            Cell::from(format!("{}", file.records())),
            Cell::from(detail),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(40),
            Constraint::Length(24),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(
                " Import Report - {} imported, {} failed, {} empty ",
                app.report.imported(),
                app.report.failed(),
                app.report.empty()
            )),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.report_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Pivot => (app.state.selected(), app.rows.len()),
        Page::Report => (app.report_state.selected(), app.report.files.len()),
    };
    let selected = selected.map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, total),
        Style::default().fg(Color::Cyan),
    )];

    if app.current_page == Page::Pivot {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Sort column | "));
        status_spans.push(Span::styled("s", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Direction"));
    }

    status_spans.push(Span::raw(" | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Fast | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
