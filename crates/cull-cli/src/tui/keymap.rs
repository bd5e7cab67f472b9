//! Key dispatch for the review screen.
//!
//! One global handler decides what a key press means given the open modal,
//! the display state and whether a text input has focus. Precedence, highest
//! first:
//!
//! 1. an active text input swallows every key;
//! 2. an open modal sees the key next, so `Esc` closes it instead of
//!    deciding anything;
//! 3. group selection moves its own highlight;
//! 4. the review shortcuts.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use cull_core::model::Outcome;
use cull_triage::{Command, DisplayState, Prompt};

/// What the screen looks like when the key arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    pub prompt: Prompt,
    pub display: DisplayState,
    pub text_input: bool,
}

/// Edits to the go-to-item input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEdit {
    Insert(char),
    Backspace,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward to the triage session.
    Session(Command),
    /// Move the group highlight in group selection.
    MoveHighlight(isize),
    /// Load the highlighted group.
    ChooseHighlighted,
    /// Open the go-to-item input.
    OpenGoto,
    Text(TextEdit),
    Ignore,
}

/// Map a key press to an action.
#[must_use]
pub fn dispatch(key: KeyEvent, ctx: KeyContext) -> Action {
    if ctx.text_input {
        return text_key(key);
    }
    match ctx.prompt {
        Prompt::Bulk => return bulk_key(key),
        Prompt::Permissions => return permissions_key(key),
        Prompt::Closed => {}
    }

    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => return Action::Session(Command::Quit),
        KeyCode::Char('q') => return Action::Session(Command::Quit),
        KeyCode::Char('p') => return Action::Session(Command::OpenPermissions),
        _ => {}
    }

    if ctx.display == DisplayState::GroupSelection {
        return group_selection_key(key);
    }
    review_key(key, ctx.display)
}

fn text_key(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Esc => Action::Text(TextEdit::Cancel),
        KeyCode::Enter => Action::Text(TextEdit::Submit),
        KeyCode::Backspace => Action::Text(TextEdit::Backspace),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            Action::Text(TextEdit::Insert(c))
        }
        _ => Action::Ignore,
    }
}

fn bulk_key(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Esc => Action::Session(Command::ClosePrompt),
        KeyCode::Char('k') => Action::Session(Command::BulkDecide(Outcome::Keep)),
        KeyCode::Char('r') => Action::Session(Command::BulkDecide(Outcome::Remove)),
        _ => Action::Ignore,
    }
}

fn permissions_key(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('p') => Action::Session(Command::ClosePrompt),
        _ => Action::Ignore,
    }
}

fn group_selection_key(key: KeyEvent) -> Action {
    match key.code {
        KeyCode::Up | KeyCode::Char('k') => Action::MoveHighlight(-1),
        KeyCode::Down | KeyCode::Char('j') => Action::MoveHighlight(1),
        KeyCode::Enter => Action::ChooseHighlighted,
        KeyCode::Right => Action::Session(Command::NextGroup),
        _ => Action::Ignore,
    }
}

fn review_key(key: KeyEvent, display: DisplayState) -> Action {
    match key.code {
        KeyCode::Esc | KeyCode::Delete => Action::Session(Command::Decide(Outcome::Remove)),
        KeyCode::Char(' ') => Action::Session(Command::Decide(Outcome::Keep)),
        KeyCode::Up => Action::Session(Command::Step(-1)),
        KeyCode::Down => Action::Session(Command::Step(1)),
        KeyCode::Left => Action::Session(Command::ReturnToGroups),
        KeyCode::Right => Action::Session(Command::NextGroup),
        KeyCode::Char('x') => Action::Session(Command::ToggleSelection),
        KeyCode::Char('b') => Action::Session(Command::OpenBulkPrompt),
        KeyCode::Char('g') if display != DisplayState::Done => Action::OpenGoto,
        _ => Action::Ignore,
    }
}
