use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

use netrush::GamePhase;

use crate::server::ServerStats;

pub fn render(frame: &mut Frame, stats: ServerStats) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], &stats);
    render_game(frame, chunks[1], &stats);
    render_network(frame, chunks[2], &stats);
    render_help(frame, chunks[3]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let uptime = format_duration(stats.uptime_secs);
    let title = format!(" Grid Clash Server - Uptime: {} ", uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let phase = match stats.phase {
        GamePhase::Idle => Span::styled("IDLE", Style::default().fg(Color::Yellow)),
        GamePhase::Running => Span::styled("RUNNING", Style::default().fg(Color::Green)),
        GamePhase::GameOver => Span::styled(
            "GAME OVER",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };

    let text = Line::from(vec![
        Span::raw(format!("Snapshot: {}  |  ", stats.snapshot_id)),
        Span::raw("Phase: "),
        phase,
        Span::raw(format!("  |  Rate: {:.1} Hz", stats.update_hz)),
    ]);

    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_game(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Game ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(2),
        ])
        .split(inner);

    frame.render_widget(
        Paragraph::new(format!(
            "Clients: {}/{}",
            stats.clients, stats.max_clients
        )),
        rows[0],
    );

    let client_ratio = if stats.max_clients > 0 {
        stats.clients as f64 / stats.max_clients as f64
    } else {
        0.0
    };
    frame.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(client_ratio.clamp(0.0, 1.0)),
        rows[1],
    );

    frame.render_widget(
        Paragraph::new(format!(
            "Cells claimed: {}/{}",
            stats.claimed_cells, stats.total_cells
        )),
        rows[2],
    );

    let cell_ratio = if stats.total_cells > 0 {
        stats.claimed_cells as f64 / stats.total_cells as f64
    } else {
        0.0
    };
    frame.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Magenta))
            .ratio(cell_ratio.clamp(0.0, 1.0)),
        rows[3],
    );
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let net = &stats.network;
    let text = vec![
        Line::from(format!(
            "Sent: {} pkts / {} bytes",
            net.packets_sent, net.bytes_sent
        )),
        Line::from(format!(
            "Received: {} pkts / {} bytes",
            net.packets_received, net.bytes_received
        )),
        Line::from(format!("Dropped (bad frames): {}", net.packets_dropped)),
    ];

    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let text = Line::from(Span::styled(
        " q / Esc: quit ",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(text), area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
