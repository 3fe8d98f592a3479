use crate::evaluate::ComparisonSeries;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::prelude::*;
use ratatui::widgets::{Axis, Block, Borders, Chart, Dataset, GraphType};
use std::io::{self, IsTerminal};

/// Restores the terminal even if drawing fails halfway.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(err) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err);
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Sorted predictions as a line, the matching targets as a scatter.
pub fn comparison_chart(series: &ComparisonSeries) -> Chart<'_> {
    let (min_y, max_y) = series.value_bounds();
    let window = (max_y - min_y).max(1e-9);
    let max_x = (series.len().saturating_sub(1) as f64).max(1.0);

    let datasets = vec![
        Dataset::default()
            .name("Expected output")
            .marker(symbols::Marker::Dot)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Red))
            .data(&series.scatter),
        Dataset::default()
            .name("Approximated model")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::White))
            .data(&series.line),
    ];

    Chart::new(datasets)
        .block(
            Block::default()
                .title("Thickness: expected vs approximated")
                .borders(Borders::ALL),
        )
        .x_axis(
            Axis::default()
                .title("Signal index")
                .bounds([0.0, max_x])
                .labels(vec![
                    Line::from("0"),
                    Line::from(format!("{:.0}", max_x)),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("Thickness")
                .bounds([min_y - window * 0.05, max_y + window * 0.05])
                .labels(vec![
                    Line::from(format!("{:.3}", min_y)),
                    Line::from(format!("{:.3}", max_y)),
                ]),
        )
}

pub fn draw_comparison<B: Backend>(
    terminal: &mut Terminal<B>,
    series: &ComparisonSeries,
) -> io::Result<()> {
    terminal.draw(|f| {
        f.render_widget(comparison_chart(series), f.area());
    })?;
    Ok(())
}

/// Shows the chart full-screen until a key is pressed.
///
/// Returns `Ok(false)` without touching the terminal when stdout is not a TTY.
pub fn show_comparison(series: &ComparisonSeries) -> io::Result<bool> {
    if !io::stdout().is_terminal() {
        log::info!("stdout is not a terminal; skipping the comparison plot");
        return Ok(false);
    }

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    draw_comparison(&mut terminal, series)?;

    loop {
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => break,
            Event::Resize(_, _) => draw_comparison(&mut terminal, series)?,
            _ => {}
        }
    }
    Ok(true)
}
