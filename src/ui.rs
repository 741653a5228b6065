use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveToColumn, MoveUp, Show};
use crossterm::queue;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use std::io::{self, Stdout, Write};

use crate::model::{SessionContext, SessionRequest};
use crate::select::{Line, RenderSink};

const FALLBACK_WIDTH: usize = 80;

/// Redraws the prompt in place below the cursor. Lines end in `\r\n` so output
/// reads the same in raw and cooked mode.
pub struct TerminalSink<W: Write> {
    out: W,
    drawn: u16,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: 0 }
    }

    fn erase(&mut self) -> Result<()> {
        if self.drawn == 0 {
            return Ok(());
        }
        queue!(self.out, MoveToColumn(0))?;
        if self.drawn > 1 {
            queue!(self.out, MoveUp(self.drawn - 1))?;
        }
        queue!(self.out, Clear(ClearType::FromCursorDown))?;
        self.drawn = 0;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for TerminalSink<W> {
    fn draw(&mut self, lines: &[Line]) -> Result<()> {
        self.erase()?;
        let width = terminal_width().saturating_sub(1).max(1);
        queue!(self.out, Hide)?;
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                queue!(self.out, Print("\r\n"))?;
            }
            let text = truncate(&line.text, width);
            if line.highlighted {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Reverse),
                    Print(text),
                    SetAttribute(Attribute::Reset)
                )?;
            } else {
                queue!(self.out, Print(text))?;
            }
        }
        self.drawn = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        self.out.flush().context("failed to flush prompt")
    }

    fn clear(&mut self) -> Result<()> {
        self.erase()?;
        queue!(self.out, Show)?;
        self.out.flush().context("failed to flush prompt")
    }

    fn notice(&mut self, text: &str) -> Result<()> {
        queue!(self.out, Print(text), Print("\r\n"))?;
        self.out.flush().context("failed to flush output")
    }
}

pub fn header_lines(profile: &str, cluster: &str) -> Vec<String> {
    vec![
        "ECS Interactive Shell".to_string(),
        format!("Profile: {profile} | Cluster: {cluster}"),
        String::new(),
    ]
}

pub fn connection_lines(context: &SessionContext, request: &SessionRequest) -> Vec<String> {
    vec![
        "Connecting to ECS task".to_string(),
        format!("  Profile:   {}", context.profile),
        format!("  Cluster:   {}", request.cluster),
        format!("  Task:      {}", request.task_id),
        format!("  Container: {}", request.container),
        format!(
            "Command: aws ecs execute-command --profile {} --region {} --cluster {} --task {} --container {} --interactive --command {}",
            context.profile,
            context.region,
            request.cluster,
            request.task_id,
            request.container,
            context.shell
        ),
        "─".repeat(terminal_width()),
    ]
}

fn terminal_width() -> usize {
    terminal::size()
        .map(|(columns, _)| usize::from(columns))
        .ok()
        .filter(|columns| *columns > 0)
        .unwrap_or(FALLBACK_WIDTH)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out = text.chars().take(width.saturating_sub(1)).collect::<String>();
    out.push('…');
    out
}
