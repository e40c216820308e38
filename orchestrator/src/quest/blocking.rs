//! `BlockingContext`: the per-quest rendezvous `ask_question` and
//! `propose_objective` suspend on. At most one call may be outstanding
//! per quest; `DeliverAnswer`/cancellation wake it with the tool's result.

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::events::ChannelPublisher;
use crate::tools::BlockingGateway;

struct PendingCall {
    sender: oneshot::Sender<Result<String, ()>>,
}

pub struct BlockingContext {
    pending: Mutex<Option<PendingCall>>,
    publisher: ChannelPublisher,
}

impl BlockingContext {
    pub fn new(publisher: ChannelPublisher) -> Self {
        Self { pending: Mutex::new(None), publisher }
    }

    async fn suspend(&self, kind: &str, payload: serde_json::Value) -> eyre::Result<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.pending.lock().await;
            if slot.is_some() {
                return Err(eyre::eyre!("a blocking call is already outstanding for this quest"));
            }
            *slot = Some(PendingCall { sender: tx });
        }
        debug!(%kind, "BlockingContext::suspend: broadcasting and waiting");
        self.publisher.publish(kind, payload);
        match rx.await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(())) => Err(eyre::eyre!("quest was cancelled while waiting for an answer")),
            Err(_) => Err(eyre::eyre!("blocking call was dropped without an answer")),
        }
    }

    /// Delivers `answer` to the single outstanding call, if any. Returns
    /// `false` if nothing was waiting (a stale or duplicate delivery).
    pub async fn deliver_answer(&self, answer: String) -> bool {
        let slot = self.pending.lock().await.take();
        match slot {
            Some(call) => call.sender.send(Ok(answer)).is_ok(),
            None => false,
        }
    }

    /// Wakes the outstanding call, if any, with a cancellation error.
    pub async fn cancel(&self) {
        if let Some(call) = self.pending.lock().await.take() {
            let _ = call.sender.send(Err(()));
        }
    }

    pub async fn has_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}

#[async_trait]
impl BlockingGateway for BlockingContext {
    async fn ask_question(&self, question: &str, options: Option<Vec<String>>) -> eyre::Result<String> {
        self.suspend("quest.question", serde_json::json!({ "question": question, "options": options }))
            .await
    }

    async fn propose_objective(&self, draft_json: serde_json::Value) -> eyre::Result<String> {
        self.suspend("quest.objective_draft", draft_json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::create_event_bus;

    #[tokio::test]
    async fn deliver_answer_wakes_the_waiting_call() {
        let bus = create_event_bus();
        let ctx = std::sync::Arc::new(BlockingContext::new(bus.channel("quest:1")));

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.ask_question("which db?", None).await })
        };

        while !ctx.has_pending().await {
            tokio::task::yield_now().await;
        }
        assert!(ctx.deliver_answer("sqlite".to_string()).await);

        let answer = waiter.await.unwrap().unwrap();
        assert_eq!(answer, "sqlite");
    }

    #[tokio::test]
    async fn cancel_wakes_the_waiting_call_with_an_error() {
        let bus = create_event_bus();
        let ctx = std::sync::Arc::new(BlockingContext::new(bus.channel("quest:1")));

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.ask_question("which db?", None).await })
        };

        while !ctx.has_pending().await {
            tokio::task::yield_now().await;
        }
        ctx.cancel().await;

        assert!(waiter.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn only_one_call_may_be_outstanding_at_a_time() {
        let bus = create_event_bus();
        let ctx = BlockingContext::new(bus.channel("quest:1"));

        let _waiter = {
            let (tx, _rx) = oneshot::channel();
            *ctx.pending.lock().await = Some(PendingCall { sender: tx });
        };

        let result = ctx.ask_question("another question?", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn deliver_answer_with_nothing_pending_returns_false() {
        let bus = create_event_bus();
        let ctx = BlockingContext::new(bus.channel("quest:1"));
        assert!(!ctx.deliver_answer("x".to_string()).await);
    }
}
