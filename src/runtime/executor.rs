//! Per-user runtime: applies transitions and executes their effects

use super::{Inbound, Registry, RuntimeDeps};
use crate::lifecycle;
use crate::session::{SessionStore, StorageError};
use crate::state_machine::transition::STORAGE_FAILED_TEXT;
use crate::state_machine::{
    transition, BotState, ChatId, Effect, Event, Session, SessionContext, TransitionError, UserId,
};
use crate::transport::{ChatTransport, PhotoSource, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// File name of delivered results
const RESULT_FILE_NAME: &str = "result.jpg";

/// Failure while executing a single effect
#[derive(Debug, Error)]
enum EffectError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Event loop for one user
pub struct UserRuntime<S, T> {
    user_id: UserId,
    deps: RuntimeDeps<S, T>,
    event_rx: mpsc::Receiver<Inbound>,
    /// Handed to the job runner so completions come back through this loop
    event_tx: mpsc::Sender<Inbound>,
    registry: Registry,
    /// Dispatches currently sending to this runtime
    in_flight: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl<S, T> UserRuntime<S, T>
where
    S: SessionStore + 'static,
    T: ChatTransport + 'static,
{
    pub fn new(
        user_id: UserId,
        deps: RuntimeDeps<S, T>,
        event_rx: mpsc::Receiver<Inbound>,
        event_tx: mpsc::Sender<Inbound>,
        registry: Registry,
        in_flight: Arc<AtomicUsize>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            user_id,
            deps,
            event_rx,
            event_tx,
            registry,
            in_flight,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(user_id = self.user_id, "Starting user runtime");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,

                inbound = self.event_rx.recv() => match inbound {
                    Some(inbound) => {
                        if self.process(inbound).await && self.retire().await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        tracing::debug!(user_id = self.user_id, "User runtime stopped");
    }

    /// Leave the registry if nothing is queued or being dispatched. Holding the
    /// write lock keeps new dispatches out while deciding.
    async fn retire(&mut self) -> bool {
        let mut runtimes = self.registry.write().await;
        if self.in_flight.load(Ordering::SeqCst) > 0 || !self.event_rx.is_empty() {
            return false;
        }
        if runtimes
            .get(&self.user_id)
            .is_some_and(|slot| slot.tx.same_channel(&self.event_tx))
        {
            runtimes.remove(&self.user_id);
        }
        drop(runtimes);

        // Any job still running for an idle user is stale
        self.event_rx.close();
        tracing::debug!(user_id = self.user_id, "User runtime retired");
        true
    }

    /// Apply one inbound event, plus any events its effects generate.
    /// Returns whether the user ended up idle.
    async fn process(&self, inbound: Inbound) -> bool {
        let Inbound {
            user_id,
            chat_id,
            event,
        } = inbound;
        let ctx = SessionContext::new(
            user_id,
            chat_id,
            lifecycle::content_path(&self.deps.work_dir, user_id),
            self.deps.catalog.clone(),
        );

        let mut session = match self.deps.store.get(user_id).await {
            Ok(session) => session.unwrap_or_else(|| Session::idle(user_id)),
            Err(e) => {
                tracing::error!(user_id, chat_id, error = %e, "Failed to load session");
                if let Err(e) = self
                    .deps
                    .transport
                    .send_text(chat_id, STORAGE_FAILED_TEXT, None)
                    .await
                {
                    tracing::warn!(user_id, chat_id, error = %e, "Failed to notify user");
                }
                return false;
            }
        };

        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let recovering = matches!(event, Event::StorageFailed { .. });
            let kind = event.kind();

            let result = match transition(&session, &ctx, event) {
                Ok(result) => result,
                Err(e @ TransitionError::StaleJob(_)) => {
                    tracing::info!(user_id, error = %e, "Dropping job result");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(user_id, state = session.state.name(), event = kind, error = %e, "Event ignored");
                    continue;
                }
            };

            let from = session.state.name();
            session = result.new_session;
            tracing::debug!(user_id, from, to = session.state.name(), event = kind, "Transition");
            if session.state.name() != from {
                log_milestone(user_id, chat_id, &session.state);
            }

            for effect in result.effects {
                let effect_kind = effect.kind();
                match self.execute_effect(&ctx, &session, effect).await {
                    Ok(()) => {}
                    Err(EffectError::Transport(e)) => {
                        tracing::warn!(user_id, chat_id, effect = effect_kind, error = %e, "Transport call failed");
                    }
                    Err(EffectError::Storage(e)) if recovering => {
                        tracing::error!(user_id, effect = effect_kind, error = %e, "Storage failed during recovery");
                    }
                    Err(EffectError::Storage(e)) => {
                        tracing::error!(user_id, effect = effect_kind, error = %e, "Storage failed, abandoning flow");
                        pending.push_back(Event::StorageFailed {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
        }
        session.is_idle()
    }

    async fn execute_effect(
        &self,
        ctx: &SessionContext,
        session: &Session,
        effect: Effect,
    ) -> Result<(), EffectError> {
        let transport = &self.deps.transport;
        match effect {
            Effect::PersistSession => {
                self.deps.store.set(ctx.user_id, session.clone()).await?;
            }

            Effect::ClearSession => {
                self.deps.store.clear(ctx.user_id).await?;
            }

            Effect::SendText { text, reply_to } => {
                transport.send_text(ctx.chat_id, &text, reply_to).await?;
            }

            Effect::SendMenu { menu } => {
                transport
                    .send_photo(
                        ctx.chat_id,
                        PhotoSource::Path(menu.photo),
                        Some(&menu.caption),
                        Some(&menu.keyboard),
                    )
                    .await?;
            }

            Effect::EditMenu { message_id, menu } => {
                transport
                    .edit_photo(
                        ctx.chat_id,
                        message_id,
                        PhotoSource::Path(menu.photo),
                        Some(&menu.keyboard),
                    )
                    .await?;
            }

            Effect::AnswerCallback { callback_id } => {
                transport.answer_callback(&callback_id).await?;
            }

            Effect::SendTyping => {
                transport.send_typing(ctx.chat_id).await?;
            }

            Effect::StoreContent { file_id } => {
                let bytes = transport
                    .download_file(&file_id)
                    .await
                    .map_err(|e| StorageError::Download(e.to_string()))?;
                tokio::fs::write(&ctx.content_path, &bytes)
                    .await
                    .map_err(|e| StorageError::io(&ctx.content_path, e))?;
                tracing::debug!(user_id = ctx.user_id, bytes = bytes.len(), "Stored content image");
            }

            Effect::SubmitJob { job } => {
                tracing::info!(user_id = ctx.user_id, job_id = %job.job_id, flow = %job.flow, "Submitting job");
                self.deps.runner.submit(job, self.event_tx.clone());
            }

            Effect::DeliverResult { jpeg, caption } => {
                transport
                    .send_photo(
                        ctx.chat_id,
                        PhotoSource::jpeg(jpeg, RESULT_FILE_NAME),
                        Some(&caption),
                        None,
                    )
                    .await?;
                tracing::info!(user_id = ctx.user_id, chat_id = ctx.chat_id, "Result delivered");
            }

            Effect::PurgeUserFiles => {
                lifecycle::purge_user_files(&self.deps.work_dir, ctx.user_id).await?;
            }
        }
        Ok(())
    }
}

fn log_milestone(user_id: UserId, chat_id: ChatId, state: &BotState) {
    match state {
        BotState::SelectingStyle => tracing::info!(user_id, chat_id, "Selecting style"),
        BotState::AwaitingContentImage | BotState::AwaitingContentImageGnst => {
            tracing::info!(user_id, chat_id, flow = ?state.flow(), "Uploading content");
        }
        BotState::RunningStyleJob { job_id } | BotState::RunningPaintJob { job_id } => {
            tracing::info!(user_id, chat_id, job_id = %job_id, "Running job");
        }
        BotState::Idle => {}
    }
}
