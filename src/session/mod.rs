use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::content::{Question, QuestionOrigin};

pub mod manager;

pub use manager::{SessionManagerHandle, SessionView};

/// Phase of one playthrough. The landing view ("Idle") is simply the absence
/// of a session in the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    InProgress,
    Answered { selected: Option<usize> },
    Finished,
}

/// A question as held by an active session: options independently shuffled at
/// session start, with the correct answer carried by *text* so the shuffle
/// can never invalidate it.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(skip_serializing)]
    pub correct_text: String,
    pub topic: String,
    pub difficulty: String,
    pub origin: QuestionOrigin,
}

/// Visual classification of one option after an answer is locked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionMark {
    Correct,
    Wrong,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// First input for this question; the answer is locked in.
    Accepted { correct: bool },
    /// Input arrived outside `InProgress` or out of range and was dropped.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    TimedOut,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    NextQuestion,
    Finished,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub score: u32,
    pub total: usize,
    pub topics: Vec<String>,
}

/// One quiz playthrough, owned by the manager and mutated only through the
/// transition methods below. `generation` advances on every transition;
/// timers carry the generation they were armed with, so a stale firing can
/// never touch a state it wasn't armed for.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    questions: Vec<ActiveQuestion>,
    current: usize,
    score: u32,
    phase: Phase,
    generation: u64,
    pub origin: Option<QuestionOrigin>,
    pub degraded: bool,
}

impl Session {
    /// Builds a session from an acquired batch: question order shuffled, each
    /// question's options shuffled with the correct answer captured by value
    /// in the same step.
    pub fn new(questions: Vec<Question>, origin: Option<QuestionOrigin>, degraded: bool) -> Self {
        let mut rng = thread_rng();
        let mut source = questions;
        source.shuffle(&mut rng);

        let questions: Vec<ActiveQuestion> = source
            .into_iter()
            .map(|q| {
                let correct_text = q.correct_text().to_string();
                let mut options = q.options;
                options.shuffle(&mut rng);
                ActiveQuestion {
                    prompt: q.prompt,
                    options,
                    correct_text,
                    topic: q.topic,
                    difficulty: q.difficulty,
                    origin: q.origin,
                }
            })
            .collect();

        let phase = if questions.is_empty() {
            Phase::Finished
        } else {
            Phase::InProgress
        };

        Self {
            id: Uuid::new_v4(),
            questions,
            current: 0,
            score: 0,
            phase,
            generation: 0,
            origin,
            degraded,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn current_question(&self) -> Option<&ActiveQuestion> {
        self.questions.get(self.current)
    }

    /// 0 before the first question resolves, 100 only once finished.
    pub fn progress_percent(&self) -> u8 {
        if self.questions.is_empty() {
            return 100;
        }
        ((self.current * 100) / self.questions.len()) as u8
    }

    /// Locks in the first selection for the current question. Later input on
    /// the same question, or input outside `InProgress`, is ignored.
    pub fn select(&mut self, option: usize) -> SelectOutcome {
        if self.phase != Phase::InProgress {
            return SelectOutcome::Ignored;
        }
        let Some(question) = self.questions.get(self.current) else {
            return SelectOutcome::Ignored;
        };
        let Some(chosen) = question.options.get(option) else {
            return SelectOutcome::Ignored;
        };

        // Value comparison, not index comparison: options were shuffled per
        // question at session start.
        let correct = *chosen == question.correct_text;
        if correct {
            self.score += 1;
        }
        self.phase = Phase::Answered {
            selected: Some(option),
        };
        self.generation += 1;
        SelectOutcome::Accepted { correct }
    }

    /// Timer expiry with no selection: counts as incorrect, same reveal as a
    /// wrong manual answer.
    pub fn timeout(&mut self) -> TimeoutOutcome {
        if self.phase != Phase::InProgress {
            return TimeoutOutcome::Ignored;
        }
        self.phase = Phase::Answered { selected: None };
        self.generation += 1;
        TimeoutOutcome::TimedOut
    }

    /// Moves past an answered question, finishing the session when the last
    /// one is exhausted.
    pub fn advance(&mut self) -> AdvanceOutcome {
        let Phase::Answered { .. } = self.phase else {
            return AdvanceOutcome::Ignored;
        };
        self.current += 1;
        self.generation += 1;
        if self.current >= self.questions.len() {
            self.phase = Phase::Finished;
            AdvanceOutcome::Finished
        } else {
            self.phase = Phase::InProgress;
            AdvanceOutcome::NextQuestion
        }
    }

    /// Classifies every option of the current question once an answer is
    /// locked in. Pure function of state: recomputing yields the same marks.
    pub fn reveal(&self) -> Option<Vec<OptionMark>> {
        let Phase::Answered { selected } = &self.phase else {
            return None;
        };
        let question = self.questions.get(self.current)?;
        let marks = question
            .options
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                if *text == question.correct_text {
                    OptionMark::Correct
                } else if *selected == Some(idx) {
                    OptionMark::Wrong
                } else {
                    OptionMark::Disabled
                }
            })
            .collect();
        Some(marks)
    }

    /// Final score, total count, and the distinct topics covered (sorted,
    /// duplicates across questions collapsed).
    pub fn summary(&self) -> SessionSummary {
        let topics: BTreeSet<String> = self.questions.iter().map(|q| q.topic.clone()).collect();
        SessionSummary {
            score: self.score,
            total: self.questions.len(),
            topics: topics.into_iter().collect(),
        }
    }
}
