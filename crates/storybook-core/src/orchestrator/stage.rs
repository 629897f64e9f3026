use std::fmt;

use crate::error::{Error, Result};

/// Number of network-backed steps in a run
pub const TOTAL_STEPS: u32 = 4;

/// Where a generation run currently is
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunStage {
    #[default]
    Idle,
    WritingStory,
    LockingReference,
    BuildingCover,
    IllustratingPages,
    Done,
    Failed {
        message: String,
    },
}

impl RunStage {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// Position on the `step / TOTAL_STEPS` progress scale
    pub const fn step(&self) -> u32 {
        match self {
            Self::Idle | Self::Failed { .. } => 0,
            Self::WritingStory => 1,
            Self::LockingReference => 2,
            Self::BuildingCover => 3,
            Self::IllustratingPages | Self::Done => 4,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Idle => "Waiting".to_string(),
            Self::WritingStory => "Writing the story".to_string(),
            Self::LockingReference => "Locking the character reference".to_string(),
            Self::BuildingCover => "Painting the cover".to_string(),
            Self::IllustratingPages => "Illustrating pages".to_string(),
            Self::Done => "Your book is ready".to_string(),
            Self::Failed { message } => format!("Failed: {message}"),
        }
    }

    /// Legal moves: the four steps in order, or into `Failed` from anything not finished.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (from, Self::Failed { .. }) => !from.is_terminal(),
            (Self::Idle, Self::WritingStory)
            | (Self::WritingStory, Self::LockingReference)
            | (Self::LockingReference, Self::BuildingCover)
            | (Self::BuildingCover, Self::IllustratingPages)
            | (Self::IllustratingPages, Self::Done) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(&next) {
            return Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::WritingStory => "writing-story",
            Self::LockingReference => "locking-reference",
            Self::BuildingCover => "building-cover",
            Self::IllustratingPages => "illustrating-pages",
            Self::Done => "done",
            Self::Failed { .. } => "failed",
        };
        write!(f, "{name}")
    }
}

/// Observational progress of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub run: u64,
    pub step: u32,
    pub total: u32,
    pub label: String,
}

impl Progress {
    pub fn for_stage(run: u64, stage: &RunStage, previous_step: u32) -> Self {
        // Failing keeps the bar where it stopped
        let step = if matches!(stage, RunStage::Failed { .. }) {
            previous_step
        } else {
            stage.step()
        };

        Self {
            run,
            step,
            total: TOTAL_STEPS,
            label: stage.label(),
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::for_stage(0, &RunStage::Idle, 0)
    }
}
