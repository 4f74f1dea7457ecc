use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};

use crate::server::ServerStats;

pub fn render(frame: &mut Frame, stats: &ServerStats) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Min(0),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_throttle(frame, chunks[1], stats);
    render_mixer(frame, chunks[2], stats);
    render_network(frame, chunks[3], stats);
    render_help(frame, chunks[4]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let uptime = format_duration(stats.uptime_secs);
    let title = format!(" Plaza Mixer - Uptime: {} ", uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Peers: {}/{} ({} contributors, {} observers)  |  Avatars: {}  |  Ticks: {} @ {}Hz",
        stats.peer_count,
        stats.max_peers,
        stats.contributors,
        stats.observers,
        stats.avatars,
        stats.ticks,
        stats.tick_rate
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_throttle(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let ratio = stats.report.performance_throttling_ratio.clamp(0.0, 1.0) as f64;
    let color = if ratio == 0.0 {
        Color::Green
    } else if ratio < 0.5 {
        Color::Yellow
    } else {
        Color::Red
    };

    let block = Block::default()
        .title(" Throttling ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color));

    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(color))
        .ratio(ratio)
        .label(format!("{:.1}% of sources shed", ratio * 100.0));

    frame.render_widget(gauge, area);
}

fn render_mixer(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Mixer (last interval) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let report = &stats.report;
    let lines = vec![
        stat_line("Frames: ", format!("{}", report.frames)),
        stat_line(
            "Trailing sleep: ",
            format!("{:.1}%", report.trailing_sleep_percentage),
        ),
        stat_line(
            "Listeners/frame: ",
            format!("{:.1}", report.average_listeners_per_frame),
        ),
        stat_line(
            "Avatars/frame: ",
            format!(
                "{:.1} in {:.1} packets",
                report.average_avatar_records_per_frame, report.average_bulk_packets_per_frame
            ),
        ),
        stat_line(
            "Identity/frame: ",
            format!("{:.2}", report.average_identity_packets_per_frame),
        ),
        stat_line(
            "Billboard/frame: ",
            format!("{:.2}", report.average_billboard_packets_per_frame),
        ),
        stat_line(
            "Skips: ",
            format!(
                "{} contended, {} overruns",
                report.contention_skips, stats.overruns
            ),
        ),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network_stats;
    let lines = vec![
        stat_line(
            "Packets: ",
            format!("{} sent / {} recv", net.packets_sent, net.packets_received),
        ),
        stat_line(
            "Bytes: ",
            format!(
                "{} sent / {} recv",
                format_bytes(net.bytes_sent),
                format_bytes(net.bytes_received)
            ),
        ),
        Line::from(vec![
            Span::styled("Dropped: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} rejected / {} send failures",
                    net.packets_rejected, net.send_failures
                ),
                Style::default().fg(if net.send_failures > 0 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .title(" Controls ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let text = Paragraph::new("Press 'q' or ESC to quit")
        .block(block)
        .style(
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        );

    frame.render_widget(text, area);
}

fn stat_line(label: &'static str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(Color::White)),
    ])
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
