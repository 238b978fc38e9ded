use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant, sleep};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::content::{Question, QuestionOrigin};
use crate::session::{
    AdvanceOutcome, OptionMark, Phase, SelectOutcome, Session, SessionSummary, TimeoutOutcome,
};

/// Snapshot handed to the presentation layer. Never carries the correct
/// answer directly; reveal marks expose it only once the question is locked.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: Phase,
    pub question: Option<QuestionView>,
    pub current_index: usize,
    pub total: usize,
    pub score: u32,
    pub progress_percent: u8,
    pub seconds_remaining: u64,
    pub reveal: Option<Vec<OptionMark>>,
    pub origin: Option<QuestionOrigin>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    pub topic: String,
    pub difficulty: String,
}

#[derive(Debug)]
pub enum FinishReply {
    NotFound,
    NotFinished,
    Summary(SessionSummary),
}

#[derive(Debug)]
enum SessionCommand {
    Start {
        questions: Vec<Question>,
        origin: Option<QuestionOrigin>,
        degraded: bool,
        respond_to: oneshot::Sender<SessionView>,
    },
    Get {
        id: Uuid,
        respond_to: oneshot::Sender<Option<SessionView>>,
    },
    Select {
        id: Uuid,
        option: usize,
        respond_to: oneshot::Sender<Option<SessionView>>,
    },
    Finish {
        id: Uuid,
        respond_to: oneshot::Sender<FinishReply>,
    },
    // Internal timer firings; tagged with the generation they were armed
    // with, so a late firing against newer state is dropped.
    QuestionTimedOut {
        id: Uuid,
        generation: u64,
    },
    AdvanceDue {
        id: Uuid,
        generation: u64,
    },
    // Collects a finished session whose result was never claimed, so the
    // session map stays bounded on a long-lived server.
    CollectDue {
        id: Uuid,
        generation: u64,
    },
}

struct SessionEntry {
    session: Session,
    /// Countdown deadline for the live question; None outside `InProgress`.
    deadline: Option<Instant>,
}

struct SessionManagerActor {
    receiver: mpsc::Receiver<SessionCommand>,
    self_sender: mpsc::Sender<SessionCommand>,
    sessions: HashMap<Uuid, SessionEntry>,
    config: SessionConfig,
}

impl SessionManagerActor {
    fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        self_sender: mpsc::Sender<SessionCommand>,
        config: SessionConfig,
    ) -> Self {
        Self {
            receiver,
            self_sender,
            sessions: HashMap::new(),
            config,
        }
    }

    async fn run(mut self) {
        tracing::info!(
            session.question_seconds = self.config.question_seconds,
            session.advance_delay_ms = self.config.advance_delay_ms,
            "SessionManagerActor started"
        );
        while let Some(command) = self.receiver.recv().await {
            self.handle_command(command);
        }
        tracing::info!("SessionManagerActor stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start {
                questions,
                origin,
                degraded,
                respond_to,
            } => {
                let session = Session::new(questions, origin, degraded);
                let id = session.id;
                tracing::info!(
                    session.id = %id,
                    session.questions = session.len(),
                    session.origin = ?origin,
                    session.degraded = degraded,
                    "Session started"
                );

                let deadline = if *session.phase() == Phase::InProgress {
                    self.arm_question_timer(id, session.generation());
                    Some(Instant::now() + Duration::from_secs(self.config.question_seconds))
                } else {
                    // An empty batch is born finished; schedule its collection.
                    self.arm_collect_timer(id, session.generation());
                    None
                };

                let entry = SessionEntry { session, deadline };
                let view = self.view_of(&entry);
                self.sessions.insert(id, entry);
                let _ = respond_to.send(view);
            }
            SessionCommand::Get { id, respond_to } => {
                let view = self.sessions.get(&id).map(|entry| self.view_of(entry));
                let _ = respond_to.send(view);
            }
            SessionCommand::Select {
                id,
                option,
                respond_to,
            } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    let _ = respond_to.send(None);
                    return;
                };
                match entry.session.select(option) {
                    SelectOutcome::Accepted { correct } => {
                        entry.deadline = None;
                        let generation = entry.session.generation();
                        tracing::debug!(
                            session.id = %id,
                            option.index = option,
                            answer.correct = correct,
                            "Answer locked in"
                        );
                        self.arm_advance_timer(id, generation);
                    }
                    SelectOutcome::Ignored => {
                        tracing::debug!(
                            session.id = %id,
                            option.index = option,
                            "Ignored input on locked or missing question"
                        );
                    }
                }
                let view = self.sessions.get(&id).map(|entry| self.view_of(entry));
                let _ = respond_to.send(view);
            }
            SessionCommand::Finish { id, respond_to } => {
                let reply = match self.sessions.get(&id) {
                    None => FinishReply::NotFound,
                    Some(entry) if *entry.session.phase() != Phase::Finished => {
                        FinishReply::NotFinished
                    }
                    Some(entry) => {
                        let summary = entry.session.summary();
                        self.sessions.remove(&id);
                        tracing::info!(
                            session.id = %id,
                            score = summary.score,
                            total = summary.total,
                            "Session finished and collected"
                        );
                        FinishReply::Summary(summary)
                    }
                };
                let _ = respond_to.send(reply);
            }
            SessionCommand::QuestionTimedOut { id, generation } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    return;
                };
                if entry.session.generation() != generation {
                    tracing::trace!(session.id = %id, "Dropping stale question timer");
                    return;
                }
                if entry.session.timeout() == TimeoutOutcome::TimedOut {
                    entry.deadline = None;
                    let generation = entry.session.generation();
                    tracing::debug!(session.id = %id, "Question timed out with no selection");
                    self.arm_advance_timer(id, generation);
                }
            }
            SessionCommand::AdvanceDue { id, generation } => {
                let Some(entry) = self.sessions.get_mut(&id) else {
                    return;
                };
                if entry.session.generation() != generation {
                    tracing::trace!(session.id = %id, "Dropping stale advance timer");
                    return;
                }
                match entry.session.advance() {
                    AdvanceOutcome::NextQuestion => {
                        let generation = entry.session.generation();
                        entry.deadline = Some(
                            Instant::now() + Duration::from_secs(self.config.question_seconds),
                        );
                        self.arm_question_timer(id, generation);
                    }
                    AdvanceOutcome::Finished => {
                        entry.deadline = None;
                        let generation = entry.session.generation();
                        tracing::info!(
                            session.id = %id,
                            score = entry.session.score(),
                            "All questions exhausted"
                        );
                        self.arm_collect_timer(id, generation);
                    }
                    AdvanceOutcome::Ignored => {}
                }
            }
            SessionCommand::CollectDue { id, generation } => {
                let Some(entry) = self.sessions.get(&id) else {
                    return;
                };
                if entry.session.generation() != generation
                    || *entry.session.phase() != Phase::Finished
                {
                    return;
                }
                self.sessions.remove(&id);
                tracing::info!(session.id = %id, "Collected unclaimed finished session");
            }
        }
    }

    fn arm_question_timer(&self, id: Uuid, generation: u64) {
        let sender = self.self_sender.clone();
        let budget = Duration::from_secs(self.config.question_seconds);
        tokio::spawn(async move {
            sleep(budget).await;
            let _ = sender
                .send(SessionCommand::QuestionTimedOut { id, generation })
                .await;
        });
    }

    fn arm_advance_timer(&self, id: Uuid, generation: u64) {
        let sender = self.self_sender.clone();
        let delay = Duration::from_millis(self.config.advance_delay_ms);
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = sender
                .send(SessionCommand::AdvanceDue { id, generation })
                .await;
        });
    }

    fn arm_collect_timer(&self, id: Uuid, generation: u64) {
        let sender = self.self_sender.clone();
        let grace = Duration::from_secs(self.config.finished_ttl_secs);
        tokio::spawn(async move {
            sleep(grace).await;
            let _ = sender
                .send(SessionCommand::CollectDue { id, generation })
                .await;
        });
    }

    fn view_of(&self, entry: &SessionEntry) -> SessionView {
        let session = &entry.session;
        let seconds_remaining = match (session.phase(), entry.deadline) {
            (Phase::InProgress, Some(deadline)) => {
                let left = deadline.saturating_duration_since(Instant::now());
                // Round up so a freshly started question shows the full budget.
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            }
            _ => 0,
        };

        SessionView {
            id: session.id,
            phase: session.phase().clone(),
            question: session.current_question().map(|q| QuestionView {
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                topic: q.topic.clone(),
                difficulty: q.difficulty.clone(),
            }),
            current_index: session.current_index(),
            total: session.len(),
            score: session.score(),
            progress_percent: session.progress_percent(),
            seconds_remaining,
            reveal: session.reveal(),
            origin: session.origin,
            degraded: session.degraded,
        }
    }
}

#[derive(Clone)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionManagerHandle {
    pub fn new(buffer: usize, config: SessionConfig) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        let actor = SessionManagerActor::new(receiver, sender.clone(), config);
        tokio::spawn(actor.run());
        Self { sender }
    }

    pub async fn start_session(
        &self,
        questions: Vec<Question>,
        origin: Option<QuestionOrigin>,
        degraded: bool,
    ) -> Result<SessionView, String> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::Start {
                questions,
                origin,
                degraded,
                respond_to,
            })
            .await
            .map_err(|e| format!("Session manager unavailable: {}", e))?;
        response
            .await
            .map_err(|e| format!("Session manager dropped response: {}", e))
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionView> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::Get { id, respond_to })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    pub async fn select(&self, id: Uuid, option: usize) -> Option<SessionView> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(SessionCommand::Select {
                id,
                option,
                respond_to,
            })
            .await
            .ok()?;
        response.await.ok().flatten()
    }

    pub async fn finish(&self, id: Uuid) -> FinishReply {
        let (respond_to, response) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Finish { id, respond_to })
            .await
            .is_err()
        {
            return FinishReply::NotFound;
        }
        response.await.unwrap_or(FinishReply::NotFound)
    }
}
