//! Background answer submission.
//!
//! The local ledger is the source of truth and the backend converges to it.
//! Each `(exam, question)` pair has at most one worker. The worker always sends
//! the newest queued value and stops retrying a value once a newer one is
//! queued, so an older answer can never land after a newer one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use backend::{AnswerSink, ApiError};
use exam_core::model::{AnswerValue, ExamId, QuestionId};

use crate::retry::{RetryConfig, retry_async_when};

type SlotKey = (ExamId, QuestionId);

#[derive(Debug, Default)]
struct Slot {
    pending: Option<AnswerValue>,
    generation: u64,
}

#[derive(Default)]
pub(crate) struct SubmissionQueue {
    slots: Mutex<HashMap<SlotKey, Slot>>,
    workers: Mutex<HashMap<ExamId, Vec<JoinHandle<()>>>>,
}

impl SubmissionQueue {
    fn slots(&self) -> MutexGuard<'_, HashMap<SlotKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<ExamId, Vec<JoinHandle<()>>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `answer` as the value the backend should end up with.
    ///
    /// Returns `false` when there is no runtime to submit on.
    pub(crate) fn enqueue(
        self: &Arc<Self>,
        sink: &Arc<dyn AnswerSink>,
        retry: RetryConfig,
        exam_id: ExamId,
        question_id: QuestionId,
        answer: AnswerValue,
    ) -> bool {
        let Ok(runtime) = Handle::try_current() else {
            warn!(%question_id, "no async runtime; answer not submitted");
            return false;
        };

        let start_worker = {
            let mut slots = self.slots();
            let start_worker = !slots.contains_key(&(exam_id, question_id));
            let slot = slots.entry((exam_id, question_id)).or_default();
            slot.pending = Some(answer);
            slot.generation += 1;
            start_worker
        };
        if start_worker {
            let worker = Arc::clone(self).run(Arc::clone(sink), retry, exam_id, question_id);
            let handle = runtime.spawn(worker);
            self.workers().entry(exam_id).or_default().push(handle);
        }
        true
    }

    /// Wait until every worker of `exam_id` has finished.
    pub(crate) async fn settle(&self, exam_id: ExamId) {
        loop {
            let handles = self.workers().remove(&exam_id).unwrap_or_default();
            if handles.is_empty() {
                return;
            }
            for joined in join_all(handles).await {
                if let Err(err) = joined {
                    warn!(%exam_id, error = %err, "answer submission task failed");
                }
            }
        }
    }

    /// Next value to send, or `None` after removing the idle slot.
    fn next(&self, key: SlotKey) -> Option<(AnswerValue, u64)> {
        let mut slots = self.slots();
        let slot = slots.get_mut(&key)?;
        match slot.pending.take() {
            Some(answer) => Some((answer, slot.generation)),
            None => {
                slots.remove(&key);
                None
            }
        }
    }

    fn is_superseded(&self, key: SlotKey, generation: u64) -> bool {
        self.slots()
            .get(&key)
            .is_some_and(|slot| slot.generation != generation)
    }

    async fn run(
        self: Arc<Self>,
        sink: Arc<dyn AnswerSink>,
        retry: RetryConfig,
        exam_id: ExamId,
        question_id: QuestionId,
    ) {
        let key = (exam_id, question_id);
        while let Some((answer, generation)) = self.next(key) {
            let queue = &*self;
            let sink = &*sink;
            let answer = &answer;
            let outcome = retry_async_when(
                retry,
                move || async move {
                    if queue.is_superseded(key, generation) {
                        return Ok(false);
                    }
                    sink.submit_answer(exam_id, question_id, answer)
                        .await
                        .map(|()| true)
                },
                ApiError::is_transient,
            )
            .await;
            match outcome {
                Ok(true) => debug!(%exam_id, %question_id, "answer submitted"),
                Ok(false) => debug!(%exam_id, %question_id, "answer superseded before resend"),
                Err(err) => warn!(%exam_id, %question_id, error = %err, "answer submission failed"),
            }
        }
    }
}
