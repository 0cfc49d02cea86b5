//! Batched, bounded-concurrency scheduling of leaf answering.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::checklist::{Block, LeafStatus};

use super::answerer::LeafAnswerer;
use super::progress::RunProgress;

/// Number of leaves answered per sequential batch when no override is configured.
pub const DEFAULT_ANSWER_BATCH_SIZE: usize = 50;

/// Maximum concurrent in-flight answer calls within a batch.
pub const DEFAULT_ANSWER_MAX_WORKERS: usize = 10;

/// Answer every leaf, preserving input order in the returned list.
///
/// Leaves are processed in sequential batches of `batch_size`; within a batch at most
/// `max_workers` answer calls are in flight at once, and a batch must fully resolve before
/// the next one starts. A failing leaf gets `status = error` and keeps its place; it never
/// aborts siblings or later batches.
pub async fn process_all(
    answerer: Arc<dyn LeafAnswerer>,
    leaves: Vec<Block>,
    request_id: &str,
    batch_size: usize,
    max_workers: usize,
    progress: Arc<RunProgress>,
) -> Vec<Block> {
    let batch_size = batch_size.max(1);
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let total = leaves.len();
    let mut results = Vec::with_capacity(total);

    let mut remaining = leaves.into_iter().peekable();
    let mut batch_number = 0usize;
    while remaining.peek().is_some() {
        let batch: Vec<Block> = remaining.by_ref().take(batch_size).collect();
        batch_number += 1;
        tracing::info!(batch = batch_number, size = batch.len(), "Processing batch");

        let mut join_set = JoinSet::new();
        for (position, leaf) in batch.iter().cloned().enumerate() {
            let answerer = Arc::clone(&answerer);
            let semaphore = Arc::clone(&semaphore);
            let request_id = request_id.to_string();
            join_set.spawn(async move {
                // Closing the semaphore is never done here, so acquire cannot fail.
                let _permit = semaphore.acquire_owned().await;
                (position, answerer.answer_leaf(leaf, &request_id).await)
            });
        }

        let mut slots: Vec<Option<Block>> = batch.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, Ok(answered))) => {
                    progress.record_processed();
                    slots[position] = Some(answered);
                }
                Ok((position, Err(error))) => {
                    tracing::error!(
                        block_id = %batch[position].block_id,
                        error = %error,
                        "Failed to answer leaf"
                    );
                    progress.record_failed();
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Answer task aborted");
                }
            }
        }

        // Failed and aborted positions fall back to the input leaf marked as errored.
        for (position, slot) in slots.into_iter().enumerate() {
            results.push(slot.unwrap_or_else(|| {
                let mut leaf = batch[position].clone();
                leaf.status = Some(LeafStatus::Error);
                leaf
            }));
        }

        let snapshot = progress.snapshot();
        tracing::info!(
            processed = snapshot.processed,
            failed = snapshot.failed,
            total,
            "Batch completed"
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::answerer::AnswerError;
    use crate::answer::chat::ChatError;
    use crate::checklist::BlockType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubAnswerer {
        fail_block: Option<String>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl StubAnswerer {
        fn new(fail_block: Option<&str>) -> Self {
            Self {
                fail_block: fail_block.map(str::to_string),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LeafAnswerer for StubAnswerer {
        async fn answer_leaf(&self, mut leaf: Block, _request_id: &str) -> Result<Block, AnswerError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_block.as_deref() == Some(leaf.block_id.as_str()) {
                return Err(AnswerError::Chat(ChatError::InvalidResponse(
                    "scripted failure".into(),
                )));
            }
            leaf.answer = Some("Yes".into());
            leaf.rationale = Some(format!("rationale for {}", leaf.block_id));
            leaf.status = Some(LeafStatus::Processed);
            Ok(leaf)
        }
    }

    fn leaves(count: usize) -> Vec<Block> {
        (0..count)
            .map(|i| Block {
                block_id: format!("b{i}"),
                block_type: BlockType::RadioQuestion,
                title: format!("Question {i}"),
                response_options: vec!["Yes".into(), "No".into()],
                guidance_text: String::new(),
                blocks: vec![],
                parent_block_id: None,
                is_ai_response_expected: true,
                answer: None,
                rationale: None,
                status: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn preserves_order_and_demotes_failures() {
        let answerer = Arc::new(StubAnswerer::new(Some("b4")));
        let progress = Arc::new(RunProgress::new());
        let results = process_all(
            answerer,
            leaves(7),
            "req-1",
            3,
            2,
            Arc::clone(&progress),
        )
        .await;

        assert_eq!(results.len(), 7);
        for (i, block) in results.iter().enumerate() {
            assert_eq!(block.block_id, format!("b{i}"));
        }
        assert_eq!(results[4].status, Some(LeafStatus::Error));
        assert!(results[4].answer.is_none());
        let answered = results
            .iter()
            .filter(|b| b.status == Some(LeafStatus::Processed))
            .count();
        assert_eq!(answered, 6);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.processed, 6);
        assert_eq!(snapshot.failed, 1);
    }

    #[tokio::test]
    async fn respects_worker_bound() {
        let answerer = Arc::new(StubAnswerer::new(None));
        let progress = Arc::new(RunProgress::new());
        process_all(
            Arc::clone(&answerer) as Arc<dyn LeafAnswerer>,
            leaves(12),
            "req-1",
            12,
            3,
            progress,
        )
        .await;

        assert!(answerer.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let answerer = Arc::new(StubAnswerer::new(None));
        let progress = Arc::new(RunProgress::new());
        let results = process_all(answerer, Vec::new(), "req-1", 50, 10, progress).await;
        assert!(results.is_empty());
    }
}
