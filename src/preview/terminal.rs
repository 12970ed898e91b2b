// SPDX-License-Identifier: GPL-3.0-only

//! Terminal preview windows
//!
//! Renders each preview window as a titled pane using Unicode half-block
//! characters for improved vertical resolution.

use super::{PreviewKey, PreviewRaster, PreviewSink};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Widget},
};
use std::io::{self, Stdout, stdout};
use std::time::Duration;
use tracing::{debug, warn};

/// How long `poll_key` waits for input
const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Preview windows drawn in the terminal's alternate screen
pub struct TerminalPreview {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    windows: Vec<(String, PreviewRaster)>,
    frames_shown: u64,
}

impl TerminalPreview {
    /// Switch the terminal to raw mode and the alternate screen
    pub fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        debug!("Terminal preview started");
        Ok(Self {
            terminal,
            windows: Vec::new(),
            frames_shown: 0,
        })
    }

    fn draw(&mut self) -> io::Result<()> {
        let windows = &self.windows;
        let status = format!(
            "{} frames | 'q' stop export",
            self.frames_shown
        );
        self.terminal.draw(|f| {
            let area = f.area();
            let [panes_area, status_area] =
                Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(area);

            if windows.is_empty() {
                f.render_widget(RasterWidget { raster: None }, panes_area);
            } else {
                let panes = Layout::horizontal(
                    windows.iter().map(|_| Constraint::Ratio(1, windows.len() as u32)),
                )
                .split(panes_area);
                for ((title, raster), pane) in windows.iter().zip(panes.iter()) {
                    let block = Block::bordered().title(title.as_str());
                    let inner = block.inner(*pane);
                    f.render_widget(block, *pane);
                    f.render_widget(
                        RasterWidget {
                            raster: Some(raster),
                        },
                        inner,
                    );
                }
            }

            f.render_widget(StatusBar { message: &status }, status_area);
        })?;
        Ok(())
    }
}

impl PreviewSink for TerminalPreview {
    fn show_image(&mut self, window: &str, raster: PreviewRaster) -> io::Result<()> {
        self.frames_shown += 1;
        match self.windows.iter_mut().find(|(name, _)| name == window) {
            Some((_, slot)) => *slot = raster,
            None => self.windows.push((window.to_string(), raster)),
        }
        Ok(())
    }

    fn poll_key(&mut self) -> io::Result<Option<PreviewKey>> {
        self.draw()?;

        if event::poll(KEY_POLL_TIMEOUT)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let ctrl_c =
                key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
            if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                return Ok(Some(PreviewKey::Quit));
            }
            return Ok(Some(PreviewKey::Other));
        }
        Ok(None)
    }
}

impl Drop for TerminalPreview {
    fn drop(&mut self) {
        // Restore terminal
        let restored = disable_raw_mode()
            .and_then(|_| execute!(self.terminal.backend_mut(), LeaveAlternateScreen))
            .and_then(|_| self.terminal.show_cursor());
        if let Err(e) = restored {
            warn!(error = %e, "Failed to restore terminal");
        }
    }
}

/// Widget that renders a raster using half-block characters
struct RasterWidget<'a> {
    raster: Option<&'a PreviewRaster>,
}

impl Widget for RasterWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(raster) = self.raster.filter(|r| r.width > 0 && r.height > 0) else {
            // No frame yet - show placeholder
            let msg = "Waiting for frames...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, Style::default());
            }
            return;
        };
        if area.width == 0 || area.height == 0 {
            return;
        }

        // Each terminal cell displays 2 vertical pixels
        let aspect = raster.width as f64 / raster.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height * 2) as f64;

        let (display_width, display_height) = if term_width / term_height > aspect {
            let h = term_height;
            ((h * aspect) as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            (w as u16, (w / aspect / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;
        let x_scale = raster.width as f64 / display_width as f64;
        let y_scale = raster.height as f64 / (display_height * 2) as f64;

        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                let (r, g, b) = raster.pixel(src_x, src_y_top);
                let top = Color::Rgb(r, g, b);
                let (r, g, b) = raster.pixel(src_x, src_y_bottom);
                let bottom = Color::Rgb(r, g, b);

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(top);
                    cell.set_bg(bottom);
                }
            }
        }
    }
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            Style::default().fg(Color::White).bg(Color::DarkGray),
        );
    }
}
