//! Operator intents, as produced by the key dispatcher.

use cull_core::error::{Result, TriageError};
use cull_core::model::{GroupId, Outcome};
use std::fmt;
use tracing::debug;

use crate::session::{BulkReport, DecisionApplied, Prompt, TriageSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Decide the focused item.
    Decide(Outcome),
    Step(isize),
    ReturnToGroups,
    /// Next group, or the first group from group selection.
    NextGroup,
    SelectGroup(GroupId),
    /// Flip selection of the focused item.
    ToggleSelection,
    OpenBulkPrompt,
    BulkDecide(Outcome),
    OpenPermissions,
    ClosePrompt,
    Quit,
}

impl Command {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Decide(_) => "decide",
            Self::Step(_) => "step",
            Self::ReturnToGroups => "return_to_groups",
            Self::NextGroup => "next_group",
            Self::SelectGroup(_) => "select_group",
            Self::ToggleSelection => "toggle_selection",
            Self::OpenBulkPrompt => "open_bulk_prompt",
            Self::BulkDecide(_) => "bulk_decide",
            Self::OpenPermissions => "open_permissions",
            Self::ClosePrompt => "close_prompt",
            Self::Quit => "quit",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a command did, for the presentation layer's status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Nothing,
    Decided(DecisionApplied),
    Bulk(BulkReport),
    Selected { selected: bool },
    Quit,
}

impl TriageSession {
    /// Execute one command against the session.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation; the session is left
    /// as it was.
    pub async fn apply_command(&mut self, command: Command) -> Result<Effect> {
        debug!(command = %command, "applying command");
        match command {
            Command::Decide(outcome) => Ok(self
                .decide_focused(outcome)
                .await?
                .map_or(Effect::Nothing, Effect::Decided)),
            Command::Step(delta) => {
                self.step_by(delta).await;
                Ok(Effect::Nothing)
            }
            Command::ReturnToGroups => {
                self.return_to_group_selection();
                Ok(Effect::Nothing)
            }
            Command::NextGroup => {
                self.advance_to_next_group().await?;
                Ok(Effect::Nothing)
            }
            Command::SelectGroup(group) => {
                self.load_group(&group, None).await?;
                Ok(Effect::Nothing)
            }
            Command::ToggleSelection => {
                let Some(item) = self.focused().map(|item| item.id) else {
                    return Ok(Effect::Nothing);
                };
                Ok(Effect::Selected {
                    selected: self.toggle(item),
                })
            }
            Command::OpenBulkPrompt => {
                if self.selection().is_empty() {
                    return Err(TriageError::EmptySelection);
                }
                self.open_prompt(Prompt::Bulk);
                Ok(Effect::Nothing)
            }
            Command::BulkDecide(outcome) => Ok(Effect::Bulk(self.bulk_decide(outcome).await?)),
            Command::OpenPermissions => {
                self.open_prompt(Prompt::Permissions);
                Ok(Effect::Nothing)
            }
            Command::ClosePrompt => {
                self.close_prompt();
                Ok(Effect::Nothing)
            }
            Command::Quit => Ok(Effect::Quit),
        }
    }
}
