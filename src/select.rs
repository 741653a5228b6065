use anyhow::Result;
use crossterm::event::KeyEvent;
use tracing::debug;

use crate::error::ShellError;
use crate::input::{PromptAction, map_key};
use crate::terminal::{RawModeGuard, TerminalMode};

pub trait KeySource {
    fn next_key(&mut self) -> Result<KeyEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub highlighted: bool,
}

impl Line {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            highlighted: false,
        }
    }
}

pub trait RenderSink {
    fn draw(&mut self, lines: &[Line]) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn notice(&mut self, text: &str) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum Selection<T> {
    Confirmed(T),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Confirmed(usize),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SelectionState {
    labels: Vec<String>,
    folded: Vec<String>,
    query: String,
    candidates: Vec<usize>,
    highlighted: usize,
}

impl SelectionState {
    pub fn new(labels: Vec<String>) -> Self {
        let folded = labels.iter().map(|label| label.to_lowercase()).collect();
        let candidates = (0..labels.len()).collect();
        Self {
            labels,
            folded,
            query: String::new(),
            candidates,
            highlighted: 0,
        }
    }

    #[cfg(test)]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[cfg(test)]
    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.candidates.get(self.highlighted).copied()
    }

    pub fn apply(&mut self, action: PromptAction) -> Step {
        match action {
            PromptAction::Cancel => return Step::Cancelled,
            PromptAction::Submit => {
                if let Some(index) = self.highlighted() {
                    return Step::Confirmed(index);
                }
            }
            PromptAction::Up => {
                let len = self.candidates.len();
                if len > 0 {
                    self.highlighted = (self.highlighted + len - 1) % len;
                }
            }
            PromptAction::Down => {
                let len = self.candidates.len();
                if len > 0 {
                    self.highlighted = (self.highlighted + 1) % len;
                }
            }
            PromptAction::InputChar(c) => {
                self.query.push(c);
                self.refilter();
            }
            PromptAction::Backspace => {
                if self.query.pop().is_some() {
                    self.refilter();
                }
            }
            PromptAction::ClearQuery => {
                if !self.query.is_empty() {
                    self.query.clear();
                    self.refilter();
                }
            }
        }
        Step::Continue
    }

    fn refilter(&mut self) {
        let needle = self.query.to_lowercase();
        self.candidates = self
            .folded
            .iter()
            .enumerate()
            .filter(|(_, label)| label.contains(&needle))
            .map(|(index, _)| index)
            .collect();
        self.highlighted = 0;
    }

    pub fn render(&self, title: &str, page_size: usize) -> Vec<Line> {
        let page_size = page_size.max(1);
        let mut lines = vec![Line::plain(format!("? {title}: {}", self.query))];

        if self.candidates.is_empty() {
            lines.push(Line::plain("  (no matches)"));
        } else {
            let offset = (self.highlighted + 1).saturating_sub(page_size);
            for (position, index) in self
                .candidates
                .iter()
                .enumerate()
                .skip(offset)
                .take(page_size)
            {
                let highlighted = position == self.highlighted;
                let marker = if highlighted { ">" } else { " " };
                lines.push(Line {
                    text: format!("{marker} {}", self.labels[*index]),
                    highlighted,
                });
            }
        }

        lines.push(Line::plain(format!(
            "  [{}/{}] up/down to move, type to filter, enter to select, esc to cancel",
            self.candidates.len(),
            self.labels.len()
        )));
        lines
    }
}

pub struct Selector {
    keys: Box<dyn KeySource>,
    sink: Box<dyn RenderSink>,
    terminal: Box<dyn TerminalMode>,
    page_size: usize,
}

impl Selector {
    pub fn new(
        keys: Box<dyn KeySource>,
        sink: Box<dyn RenderSink>,
        terminal: Box<dyn TerminalMode>,
        page_size: usize,
    ) -> Self {
        Self {
            keys,
            sink,
            terminal,
            page_size,
        }
    }

    /// Returns a reference into `items`, never a copy. The terminal mode in effect
    /// before the call is restored on every return path.
    pub fn prompt<'i, T, F>(
        &mut self,
        title: &str,
        items: &'i [T],
        display: F,
    ) -> Result<Selection<&'i T>, ShellError>
    where
        F: Fn(&T) -> String,
    {
        let mut state = SelectionState::new(items.iter().map(display).collect());

        let guard = RawModeGuard::acquire(self.terminal.as_mut()).map_err(terminal_error)?;
        let step = drive(
            self.keys.as_mut(),
            self.sink.as_mut(),
            &mut state,
            title,
            self.page_size,
        );
        let cleared = self.sink.clear();
        let released = guard.release();

        let step = step.map_err(terminal_error)?;
        cleared.map_err(terminal_error)?;
        released.map_err(terminal_error)?;

        match step {
            Step::Confirmed(index) => {
                debug!(title, index, "selection confirmed");
                Ok(Selection::Confirmed(&items[index]))
            }
            _ => {
                debug!(title, "selection cancelled");
                Ok(Selection::Cancelled)
            }
        }
    }

    pub fn notice(&mut self, text: &str) -> Result<(), ShellError> {
        self.sink.notice(text).map_err(terminal_error)
    }
}

fn drive(
    keys: &mut dyn KeySource,
    sink: &mut dyn RenderSink,
    state: &mut SelectionState,
    title: &str,
    page_size: usize,
) -> Result<Step> {
    sink.draw(&state.render(title, page_size))?;
    loop {
        let key = keys.next_key()?;
        let Some(action) = map_key(key) else {
            continue;
        };
        match state.apply(action) {
            Step::Continue => sink.draw(&state.render(title, page_size))?,
            done => return Ok(done),
        }
    }
}

fn terminal_error(source: anyhow::Error) -> ShellError {
    ShellError::Terminal { source }
}
