use std::io::{self, IsTerminal, Stdout, Write};

use anyhow::Context;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    style::Print,
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand, QueueableCommand,
};

use super::FrameSink;

/// Alternate-screen writer. Only lines that differ from the previous frame
/// are rewritten; when stdout is not a TTY frames are printed as plain text.
pub struct TerminalRenderer {
    stdout: Stdout,
    previous_lines: Vec<String>,
    interactive: bool,
}

impl TerminalRenderer {
    pub fn new() -> anyhow::Result<Self> {
        let interactive = io::stdout().is_terminal();
        let mut stdout = io::stdout();

        if interactive {
            stdout
                .execute(EnterAlternateScreen)
                .context("failed to enter alternate terminal screen")?;
            stdout
                .execute(Hide)
                .context("failed to hide terminal cursor")?;
            stdout
                .execute(Clear(ClearType::All))
                .context("failed to clear terminal screen")?;
            stdout.flush().context("failed to flush terminal output")?;
        }

        Ok(Self {
            stdout,
            previous_lines: Vec::new(),
            interactive,
        })
    }

    fn draw(&mut self, frame: &str) -> anyhow::Result<()> {
        let lines = frame.lines().map(str::to_string).collect::<Vec<_>>();

        for (index, line) in changed_rows(&self.previous_lines, &lines) {
            let Ok(row) = u16::try_from(index) else {
                break;
            };
            self.stdout
                .queue(MoveTo(0, row))
                .context("failed to move cursor during frame render")?
                .queue(Clear(ClearType::CurrentLine))
                .context("failed to clear line during frame render")?;
            if let Some(line) = line {
                self.stdout
                    .queue(Print(line))
                    .context("failed to print frame line")?;
            }
        }

        self.stdout
            .flush()
            .context("failed to flush terminal frame")?;
        self.previous_lines = lines;
        Ok(())
    }
}

/// Rows to rewrite. `None` marks a stale row that only needs clearing.
fn changed_rows<'a>(previous: &[String], next: &'a [String]) -> Vec<(usize, Option<&'a str>)> {
    let mut rows = next
        .iter()
        .enumerate()
        .filter(|(index, line)| previous.get(*index) != Some(*line))
        .map(|(index, line)| (index, Some(line.as_str())))
        .collect::<Vec<_>>();
    rows.extend((next.len()..previous.len()).map(|index| (index, None)));
    rows
}

impl FrameSink for TerminalRenderer {
    fn present(&mut self, frame: &str) -> anyhow::Result<()> {
        if !self.interactive {
            println!("{frame}");
            return Ok(());
        }

        self.draw(frame)
    }

    fn bell(&mut self) -> anyhow::Result<()> {
        self.stdout
            .write_all(b"\x07")
            .context("failed to ring terminal bell")?;
        self.stdout.flush().context("failed to flush terminal bell")
    }
}

impl Drop for TerminalRenderer {
    fn drop(&mut self) {
        if !self.interactive {
            return;
        }

        let _ = self.stdout.execute(Show);
        let _ = self.stdout.execute(LeaveAlternateScreen);
        let _ = self.stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn rewrites_only_changed_rows() {
        let previous = lines(&["a", "b", "c"]);
        let next = lines(&["a", "B", "c"]);
        assert_eq!(changed_rows(&previous, &next), vec![(1, Some("B"))]);
    }

    #[test]
    fn clears_rows_left_over_from_a_taller_frame() {
        let previous = lines(&["a", "b", "c", "d"]);
        let next = lines(&["a", "x"]);
        assert_eq!(
            changed_rows(&previous, &next),
            vec![(1, Some("x")), (2, None), (3, None)]
        );
        assert_eq!(changed_rows(&[], &next), vec![(0, Some("a")), (1, Some("x"))]);
    }
}
