use humansize::{format_size, DECIMAL};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table, Tabs},
    Frame,
};
use swarmview_core::filter::FilterRow;
use swarmview_core::projection::{CellValue, CheckState, Icon, Role};
use swarmview_core::table::TableModel;

use crate::app::{App, DetailTab, Focus};

const HELP: &str = "q quit │ Tab pane │ 1-4 tab │ ←→ s sort │ space toggle │ Enter expand │ r rename │ x remove";

pub fn ui(f: &mut Frame, app: &mut App) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(24), Constraint::Min(20)])
        .split(outer[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main[1]);

    render_sidebar(f, app, main[0]);
    render_torrents(f, app, right[0]);
    render_detail(f, app, right[1]);
    render_status_bar(f, app, outer[1]);
}

fn pane_block(title: impl Into<String>, focused: bool) -> Block<'static> {
    let color = if focused { Color::Cyan } else { Color::DarkGray };
    Block::default()
        .borders(Borders::ALL)
        .title(title.into())
        .border_style(Style::default().fg(color))
}

fn glyph(icon: &Icon) -> String {
    match icon.0.as_str() {
        "folder" | "file" => String::new(),
        other => other.to_string(),
    }
}

fn display_text(cell: Option<CellValue>) -> String {
    match cell {
        Some(CellValue::Text(text)) => text,
        _ => String::new(),
    }
}

fn check_glyph(state: Option<CheckState>) -> &'static str {
    match state {
        Some(CheckState::Checked) => "[x]",
        Some(CheckState::PartiallyChecked) => "[~]",
        Some(CheckState::Unchecked) => "[ ]",
        None => "   ",
    }
}

fn table_cell(model: &TableModel<String>, row: usize, column: usize) -> String {
    let text = display_text(model.data(row, column, Role::Display));
    let icon = match model.data(row, column, Role::Icon) {
        Some(CellValue::Icon(icon)) => glyph(&icon),
        _ => String::new(),
    };
    match (icon.is_empty(), text.is_empty()) {
        (true, _) => text,
        (false, true) => icon,
        (false, false) => format!("{} {}", icon, text),
    }
}

fn model_table(model: &TableModel<String>, columns: &[usize], marked: &[usize]) -> (Vec<Row<'static>>, Vec<Constraint>) {
    let rows = (0..model.row_count())
        .map(|row| {
            let cells: Vec<Cell> = columns.iter().map(|&c| Cell::from(table_cell(model, row, c))).collect();
            let style = if marked.contains(&row) {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        })
        .collect();
    let widths = columns
        .iter()
        .map(|&c| Constraint::Length(model.column(c).map(|col| col.width()).unwrap_or(8)))
        .collect();
    (rows, widths)
}

fn render_sidebar(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .client
        .filters()
        .rows()
        .into_iter()
        .map(|row| match row {
            FilterRow::Category(category) => ListItem::new(Line::from(Span::styled(
                category.title().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ))),
            FilterRow::Value(_, value) => ListItem::new(format!("  {}", value.label())),
        })
        .collect();

    let list = List::new(items)
        .block(pane_block("Filters", app.focus == Focus::Filters))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));
    f.render_stateful_widget(list, area, &mut app.filter_state);
}

fn render_torrents(f: &mut Frame, app: &mut App, area: Rect) {
    let view = app.client.torrents();
    let model = view.model();
    let columns = view.visible_columns();
    let sort = model.sort_spec();

    let header = Row::new(columns.iter().enumerate().map(|(i, &c)| {
        let mut title = model.header(c).unwrap_or_default().to_string();
        if let Some(spec) = sort.filter(|spec| spec.column == c) {
            title.push_str(if spec.descending { " ▼" } else { " ▲" });
        }
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if app.focus == Focus::Torrents && i == app.sort_cursor {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        Cell::from(title).style(style)
    }));

    let marked = view.binding().selected_rows(model);
    let (rows, widths) = model_table(model, &columns, &marked);
    let title = format!("Torrents ({})", model.row_count());

    let table = Table::new(rows, widths)
        .header(header)
        .block(pane_block(title, app.focus == Focus::Torrents))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .column_spacing(1);
    f.render_stateful_widget(table, area, &mut app.torrent_state);
}

fn render_detail(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let titles: Vec<&str> = DetailTab::ALL.iter().map(|t| t.title()).collect();
    let tabs = Tabs::new(titles)
        .select(app.tab.index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[0]);

    let focused = app.focus == Focus::Detail;
    if app.tab == DetailTab::Settings {
        render_settings(f, app, chunks[1], focused);
        return;
    }
    if app.client.torrents().selected_torrent().is_none() {
        let empty = Paragraph::new("No torrent selected").block(pane_block(app.tab.title(), focused));
        f.render_widget(empty, chunks[1]);
        return;
    }
    match app.tab {
        DetailTab::Details => render_details(f, app, chunks[1], focused),
        DetailTab::Files => render_files(f, app, chunks[1], focused),
        DetailTab::Peers => render_peers(f, app, chunks[1], focused),
        DetailTab::Settings => {}
    }
}

fn render_details(f: &mut Frame, app: &App, area: Rect, focused: bool) {
    let block = pane_block("Details", focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let details = app.client.details();
    let ratio = details.progress().unwrap_or(0.0).clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio)
        .label(format!("{:.1}%", ratio * 100.0));
    f.render_widget(gauge, chunks[0]);

    let lines: Vec<Line> = details
        .lines()
        .into_iter()
        .filter(|(_, text)| !text.is_empty())
        .map(|(label, text)| {
            Line::from(vec![
                Span::styled(format!("{:>15}: ", label), Style::default().fg(Color::Gray)),
                Span::raw(text),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), chunks[1]);
}

fn render_files(f: &mut Frame, app: &mut App, area: Rect, focused: bool) {
    let files = app.client.files();
    let (Some(tree), Some(binding)) = (files.current(), files.current_binding()) else {
        f.render_widget(Paragraph::new("Loading…").block(pane_block("Files", focused)), area);
        return;
    };

    let rows: Vec<Row> = files
        .visible_nodes()
        .into_iter()
        .map(|(node, depth)| {
            let marker = if tree.is_file(node) {
                " "
            } else if binding.is_expanded(&node) {
                "▾"
            } else {
                "▸"
            };
            let name = match &app.rename {
                Some(edit) if edit.node == node => Span::styled(
                    format!("{}_", edit.buffer),
                    Style::default().fg(Color::Yellow),
                ),
                _ => Span::raw(tree.name(node).unwrap_or_default().to_string()),
            };
            let first = Line::from(vec![
                Span::raw(format!("{}{} {} ", "  ".repeat(depth), check_glyph(tree.check_state(node)), marker)),
                name,
            ]);
            let mut cells = vec![Cell::from(first)];
            cells.extend((1..tree.column_count()).map(|c| Cell::from(display_text(tree.data(node, c, Role::Display)))));
            Row::new(cells)
        })
        .collect();

    let header = Row::new((0..tree.column_count()).map(|c| {
        Cell::from(tree.header(c).unwrap_or_default().to_string()).style(Style::default().add_modifier(Modifier::BOLD))
    }));
    let widths = [
        Constraint::Min(20),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(10),
    ];
    let title = format!("Files ({})", tree.file_count());
    let table = Table::new(rows, widths)
        .header(header)
        .block(pane_block(title, focused))
        .highlight_style(Style::default().bg(Color::DarkGray));
    f.render_stateful_widget(table, area, &mut app.file_state);
}

fn render_peers(f: &mut Frame, app: &mut App, area: Rect, focused: bool) {
    let model = app.client.peers().model();
    let columns: Vec<usize> = (0..model.column_count()).collect();
    let header = Row::new(columns.iter().map(|&c| {
        Cell::from(model.header(c).unwrap_or_default().to_string()).style(Style::default().add_modifier(Modifier::BOLD))
    }));
    let (rows, widths) = model_table(model, &columns, &[]);
    let title = format!("Peers ({})", model.row_count());

    let table = Table::new(rows, widths)
        .header(header)
        .block(pane_block(title, focused))
        .highlight_style(Style::default().bg(Color::DarkGray));
    f.render_stateful_widget(table, area, &mut app.peer_state);
}

fn render_settings(f: &mut Frame, app: &App, area: Rect, focused: bool) {
    let cursor = app.settings.cursor();
    let lines: Vec<Line> = app
        .settings
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, (label, value))| {
            let style = if focused && i == cursor {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:>20}: ", label), Style::default().fg(Color::Gray)),
                Span::styled(value, style),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines).block(pane_block("Settings (←→ change)", focused)), area);
}

fn total_rate(model: &TableModel<String>, field: &str) -> String {
    let total: f64 = model
        .snapshot()
        .iter()
        .filter_map(|(_, record)| record.get(field).and_then(|v| v.as_f64()))
        .sum();
    format!("{}/s", format_size(total.max(0.0) as u64, DECIMAL))
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let model = app.client.torrents().model();
    let mut spans = vec![
        Span::styled(
            format!(
                " ↓ {}  ↑ {} ",
                total_rate(model, "download_payload_rate"),
                total_rate(model, "upload_payload_rate")
            ),
            Style::default().fg(Color::Green),
        ),
        Span::raw("│ "),
    ];
    if app.last_report.failed > 0 {
        spans.push(Span::styled(
            format!("{} fetch(es) failed │ ", app.last_report.failed),
            Style::default().fg(Color::Red),
        ));
    }
    match &app.last_message {
        Some(message) => spans.push(Span::styled(message.clone(), Style::default().fg(Color::Yellow))),
        None => spans.push(Span::styled(HELP, Style::default().fg(Color::DarkGray))),
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
