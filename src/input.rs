use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptAction {
    Up,
    Down,
    Submit,
    Cancel,
    Backspace,
    ClearQuery,
    InputChar(char),
}

pub fn map_key(key: KeyEvent) -> Option<PromptAction> {
    match key.code {
        KeyCode::Char('c') | KeyCode::Char('d')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(PromptAction::Cancel)
        }
        KeyCode::Esc => Some(PromptAction::Cancel),
        KeyCode::Enter => Some(PromptAction::Submit),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(PromptAction::Submit)
        }
        KeyCode::Up | KeyCode::BackTab => Some(PromptAction::Up),
        KeyCode::Down | KeyCode::Tab => Some(PromptAction::Down),
        KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(PromptAction::Up)
        }
        KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(PromptAction::Down)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(PromptAction::ClearQuery)
        }
        KeyCode::Backspace => Some(PromptAction::Backspace),
        KeyCode::Char('h') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(PromptAction::Backspace)
        }
        KeyCode::Char(c)
            if !key.modifiers.contains(KeyModifiers::CONTROL)
                && !key.modifiers.contains(KeyModifiers::ALT)
                && !c.is_control() =>
        {
            Some(PromptAction::InputChar(c))
        }
        _ => None,
    }
}
