//! Main profiler dashboard UI.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use framescope::{DisplayData, ProfileEntry};

use crate::client::ConnectionState;

/// Dashboard state and rendering.
pub struct Dashboard {
    host: String,
    port: u16,
}

impl Dashboard {
    /// Create a new dashboard.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Render the dashboard.
    pub fn render(
        &self,
        frame: &mut Frame,
        connection_state: ConnectionState,
        snapshot: Option<&DisplayData>,
    ) {
        let area = frame.area();

        // Main layout: header, two scope tables, footer
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),      // Header
                Constraint::Percentage(55), // Render thread scopes
                Constraint::Min(8),         // Other thread scopes
                Constraint::Length(3),      // Footer
            ])
            .split(area);

        self.render_header(frame, sections[0], connection_state, snapshot);
        Self::render_scope_table(
            frame,
            sections[1],
            " Render Thread ",
            Color::Magenta,
            snapshot.map(|s| s.render_thread.as_slice()),
        );
        Self::render_scope_table(
            frame,
            sections[2],
            " Worker Threads ",
            Color::Green,
            snapshot.map(|s| s.other_threads.as_slice()),
        );
        Self::render_footer(frame, sections[3]);
    }

    fn render_header(
        &self,
        frame: &mut Frame,
        area: Rect,
        state: ConnectionState,
        snapshot: Option<&DisplayData>,
    ) {
        let (status_text, status_color) = match state {
            ConnectionState::Connected => ("Connected", Color::Green),
            ConnectionState::Connecting => ("Connecting...", Color::Yellow),
            ConnectionState::Disconnected => ("Disconnected", Color::Red),
        };

        let scope_count = snapshot.map_or(0, |s| s.render_thread.len() + s.other_threads.len());

        let title = Line::from(vec![
            Span::styled(
                " Framescope ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("| "),
            Span::styled(
                format!("{}:{}", self.host, self.port),
                Style::default().fg(Color::White),
            ),
            Span::raw(" | "),
            Span::styled(status_text, Style::default().fg(status_color)),
            Span::raw(" | Scopes: "),
            Span::styled(format!("{scope_count}"), Style::default().fg(Color::Yellow)),
        ]);

        let header = Paragraph::new(title).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );

        frame.render_widget(header, area);
    }

    fn render_scope_table(
        frame: &mut Frame,
        area: Rect,
        title: &str,
        border_color: Color,
        entries: Option<&[(String, ProfileEntry)]>,
    ) {
        let header_cells = ["Scope", "Avg", "Self", "Max", "Parent", "Total"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow)));
        let header = Row::new(header_cells)
            .style(Style::default().add_modifier(Modifier::BOLD))
            .height(1);

        let rows: Vec<Row> = entries.map_or_else(Vec::new, |entries| {
            entries
                .iter()
                .map(|(_, entry)| {
                    let indent = "  ".repeat(usize::from(entry.depth));
                    let name_color = if entry.depth == 0 {
                        Color::White
                    } else {
                        Color::Gray
                    };

                    Row::new(vec![
                        Cell::from(format!("{indent}{}", entry.display_name))
                            .style(Style::default().fg(name_color)),
                        Cell::from(format!("{:.2}ms", entry.rolling_average_time)),
                        Cell::from(format!("{:.2}ms", entry.rolling_self_time)),
                        Cell::from(format!("{:.2}ms", entry.max_time_in_last_second)),
                        Cell::from(format!("{:.1}%", entry.parent_percentage)),
                        Cell::from(format!("{:.1}%", entry.total_percentage)),
                    ])
                })
                .collect()
        });

        let widths = [
            Constraint::Min(24),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(8),
        ];

        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title.to_string())
                    .border_style(Style::default().fg(border_color)),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        frame.render_widget(table, area);
    }

    fn render_footer(frame: &mut Frame, area: Rect) {
        let footer = Paragraph::new(Line::from(vec![
            Span::styled(" [Q] ", Style::default().fg(Color::Yellow)),
            Span::raw("Quit"),
            Span::raw("  "),
            Span::styled("[I] ", Style::default().fg(Color::Yellow)),
            Span::raw("Refresh Now"),
            Span::raw("  "),
            Span::styled("[C] ", Style::default().fg(Color::Yellow)),
            Span::raw("Reconnect"),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );

        frame.render_widget(footer, area);
    }
}
