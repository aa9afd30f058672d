//! Unit tests for batch fan-out edge cases

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helpdesk_sync::client::ApiError;
use helpdesk_sync::sweep::batch::{process_batches, ItemOutcome};

#[tokio::test]
async fn test_empty_id_list_is_complete() {
    let outcome = process_batches(&[], 10, |id| async move { Ok(ItemOutcome::Item(id)) }).await;
    assert!(outcome.is_complete());
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_interruption_in_first_chunk_leaves_all_later_chunks() {
    let ids: Vec<u64> = (1..=6).collect();
    let outcome = process_batches(&ids, 2, |id| async move {
        if id == 1 {
            Ok(ItemOutcome::RateLimited {
                retry_after_secs: 10,
            })
        } else {
            Ok(ItemOutcome::Item(id))
        }
    })
    .await;

    let interruption = outcome.interruption.expect("interrupted");
    assert_eq!(interruption.remaining_ids, vec![3, 4, 5, 6]);
    // The sibling in the interrupted chunk still settled and is kept.
    assert_eq!(outcome.results, vec![2]);
}

#[tokio::test]
async fn test_interruption_in_final_chunk_has_no_remaining_ids() {
    let ids: Vec<u64> = (1..=4).collect();
    let outcome = process_batches(&ids, 2, |id| async move {
        if id == 4 {
            Ok(ItemOutcome::RateLimited {
                retry_after_secs: 10,
            })
        } else {
            Ok(ItemOutcome::Item(id))
        }
    })
    .await;

    let interruption = outcome.interruption.expect("interrupted");
    assert!(interruption.remaining_ids.is_empty());
    assert_eq!(outcome.results, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_no_fetches_issued_past_interrupted_chunk() {
    let issued = Arc::new(AtomicUsize::new(0));
    let ids: Vec<u64> = (1..=30).collect();
    let outcome = {
        let issued = issued.clone();
        process_batches(&ids, 10, move |id| {
            let issued = issued.clone();
            async move {
                issued.fetch_add(1, Ordering::SeqCst);
                if id == 5 {
                    Ok(ItemOutcome::RateLimited {
                        retry_after_secs: 60,
                    })
                } else {
                    Ok(ItemOutcome::Item(id))
                }
            }
        })
        .await
    };

    assert!(!outcome.is_complete());
    assert_eq!(issued.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_first_rate_limit_hint_wins_within_chunk() {
    let ids: Vec<u64> = (1..=3).collect();
    let outcome = process_batches(&ids, 3, |id| async move {
        match id {
            2 => Ok(ItemOutcome::RateLimited {
                retry_after_secs: 20,
            }),
            3 => Ok(ItemOutcome::RateLimited {
                retry_after_secs: 99,
            }),
            _ => Ok(ItemOutcome::Item(id)),
        }
    })
    .await;

    assert_eq!(outcome.interruption.unwrap().retry_after_secs, 20);
}

#[tokio::test]
async fn test_errors_and_skips_coexist_with_interruption() {
    let ids: Vec<u64> = (1..=4).collect();
    let outcome = process_batches(&ids, 4, |id| async move {
        match id {
            1 => Ok(ItemOutcome::Item(id)),
            2 => Ok(ItemOutcome::Skipped),
            3 => Err(ApiError::Network("reset".to_string())),
            _ => Ok(ItemOutcome::RateLimited {
                retry_after_secs: 5,
            }),
        }
    })
    .await;

    assert_eq!(outcome.results, vec![1]);
    let interruption = outcome.interruption.expect("interrupted");
    assert_eq!(interruption.retry_after_secs, 5);
    assert!(interruption.remaining_ids.is_empty());
}
